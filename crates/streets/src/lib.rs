#![deny(unsafe_code)]
//! Street network generation over a tensor field.
//!
//! The pipeline traces major and minor streamlines ([`streamlines`]),
//! intersects them into a planar road [`graph`], and walks the graph's faces
//! into blocks and lots ([`polygon_finder`]). [`pipeline`] wires the stages
//! together as free functions and as the stepped [`CityGenerator`].

pub mod config;
pub mod graph;
pub mod grid_storage;
pub mod integrator;
pub mod pipeline;
pub mod polygon_finder;
pub mod presets;
pub mod streamlines;

pub use config::{CityConfig, TierConfig};
pub use graph::{Graph, GraphParams, Node};
pub use grid_storage::GridStorage;
pub use integrator::{FieldIntegrator, IntegratorKind};
pub use pipeline::{
    build_field, build_graph, find_polygons, generate_streamlines, City, CityGenerator, CitySummary,
};
pub use polygon_finder::{PolygonFinder, PolygonLayers, PolygonParams};
pub use presets::Preset;
pub use streamlines::{StreamlineGenerator, StreamlineParams, Streamlines};
