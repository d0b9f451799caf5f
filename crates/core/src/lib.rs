#![deny(unsafe_code)]
//! Core types for the tensor-field city generator.
//!
//! Provides the `GenError` type, `Xorshift64` PRNG, reproducible `Seed`,
//! parameter helpers, geometry primitives, polygon slicing/shrinking/
//! subdivision, `Tensor`, basis fields, the `TensorField` sampler and the
//! `Generator` trait.

pub mod basis;
pub mod error;
pub mod generator;
pub mod geometry;
pub mod params;
pub mod polygon;
pub mod prng;
pub mod seed;
pub mod tensor;
pub mod tensor_field;

pub use basis::{BasisField, BasisSpec, GridField, OvalField, RadialField};
pub use error::GenError;
pub use generator::Generator;
pub use geometry::{Bounds, Polygon, Polyline};
pub use prng::Xorshift64;
pub use seed::Seed;
pub use tensor::Tensor;
pub use tensor_field::{Masks, NoiseParams, TensorField};
