//! Symmetric traceless 2×2 tensors.
//!
//! A [`Tensor`] is stored as a magnitude `r` and a pair `m = (m0, m1)`; the
//! tensor components are `(a, b) = r·m` and the major eigenvector points at
//! `θ = atan2(b, a) / 2`. The minor eigenvector is perpendicular.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Road-orientation tensor. `r == 0` is degenerate and has no direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    r: f64,
    m: [f64; 2],
}

impl Tensor {
    /// The degenerate tensor returned off land.
    pub const ZERO: Self = Self { r: 0.0, m: [0.0, 0.0] };

    pub fn new(r: f64, m: [f64; 2]) -> Self {
        Self { r, m }
    }

    /// Unit tensor whose major eigenvector points at `theta` radians.
    pub fn from_angle(theta: f64) -> Self {
        Self::new(1.0, [(2.0 * theta).cos(), (2.0 * theta).sin()])
    }

    pub fn r(&self) -> f64 {
        self.r
    }

    pub fn m(&self) -> [f64; 2] {
        self.m
    }

    /// Components `(a, b) = r·m`.
    pub fn components(&self) -> DVec2 {
        DVec2::new(self.m[0], self.m[1]) * self.r
    }

    pub fn is_degenerate(&self) -> bool {
        self.r == 0.0
    }

    /// Major eigenvector angle in radians.
    pub fn theta(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        self.m[1].atan2(self.m[0]) / 2.0
    }

    /// Accumulates `other` into `self`.
    ///
    /// The pairs are summed weighted by their magnitudes. Smooth mode then
    /// renormalises so that `r = |m|` and `m` is a unit pair; otherwise the
    /// magnitude is reset to 1 and the summed pair is kept as is.
    pub fn add(&mut self, other: &Tensor, smooth: bool) -> &mut Self {
        let summed = [
            self.m[0] * self.r + other.m[0] * other.r,
            self.m[1] * self.r + other.m[1] * other.r,
        ];
        if smooth {
            let len = summed[0].hypot(summed[1]);
            self.r = len;
            self.m = if len > 0.0 {
                [summed[0] / len, summed[1] / len]
            } else {
                [0.0, 0.0]
            };
        } else {
            self.r = 1.0;
            self.m = summed;
        }
        self
    }

    /// Scales the magnitude, leaving the orientation untouched.
    pub fn scale(&mut self, s: f64) -> &mut Self {
        self.r *= s;
        self
    }

    /// Rotates the eigenvectors by `angle` radians.
    ///
    /// `|m|` is preserved and the new major angle is wrapped into `[0, π)`.
    pub fn rotate(&mut self, angle: f64) -> &mut Self {
        if angle == 0.0 || self.is_degenerate() {
            return self;
        }
        let len = self.m[0].hypot(self.m[1]);
        let theta = (self.theta() + angle).rem_euclid(PI);
        self.m = [len * (2.0 * theta).cos(), len * (2.0 * theta).sin()];
        self
    }

    /// Unit major eigenvector, or zero for a degenerate tensor.
    pub fn major(&self) -> DVec2 {
        if self.is_degenerate() {
            return DVec2::ZERO;
        }
        let theta = self.theta();
        DVec2::new(theta.cos(), theta.sin())
    }

    /// Unit minor eigenvector, or zero for a degenerate tensor.
    pub fn minor(&self) -> DVec2 {
        if self.is_degenerate() {
            return DVec2::ZERO;
        }
        let theta = self.theta() + FRAC_PI_2;
        DVec2::new(theta.cos(), theta.sin())
    }

    /// Major or minor eigenvector depending on `major`.
    pub fn direction(&self, major: bool) -> DVec2 {
        if major {
            self.major()
        } else {
            self.minor()
        }
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Self::ZERO
    }
}
