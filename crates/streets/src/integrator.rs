//! Step integrators that trace eigenvector field lines.

use citygen_core::TensorField;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Integration scheme selected by `StreamlineParams::integrator`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    Euler,
    #[default]
    Rk4,
}

impl IntegratorKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "euler" => Some(Self::Euler),
            "rk4" => Some(Self::Rk4),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::Rk4 => "rk4",
        }
    }

    /// Builds the integrator over `field` with step length `dstep`.
    pub fn build(self, field: Arc<TensorField>, dstep: f64) -> Box<dyn FieldIntegrator> {
        match self {
            Self::Euler => Box::new(EulerIntegrator::new(field, dstep)),
            Self::Rk4 => Box::new(Rk4Integrator::new(field, dstep)),
        }
    }
}

/// Produces one step along the major or minor eigenvector field.
///
/// Integrators are stateless; the result depends only on the field.
pub trait FieldIntegrator: Send + Sync {
    /// Displacement of length about `dstep` from `p`.
    fn integrate(&self, p: DVec2, major: bool) -> DVec2;

    fn field(&self) -> &TensorField;

    /// Unit eigenvector at `p`, or zero where the tensor is degenerate.
    fn sample_dir(&self, p: DVec2, major: bool) -> DVec2 {
        self.field().sample(p).direction(major)
    }

    fn on_land(&self, p: DVec2) -> bool {
        self.field().on_land(p)
    }
}

pub struct EulerIntegrator {
    field: Arc<TensorField>,
    dstep: f64,
}

impl EulerIntegrator {
    pub fn new(field: Arc<TensorField>, dstep: f64) -> Self {
        Self { field, dstep }
    }
}

impl FieldIntegrator for EulerIntegrator {
    fn integrate(&self, p: DVec2, major: bool) -> DVec2 {
        self.sample_dir(p, major) * self.dstep
    }

    fn field(&self) -> &TensorField {
        &self.field
    }
}

/// Fourth-order Runge–Kutta with the two midpoint samples merged.
pub struct Rk4Integrator {
    field: Arc<TensorField>,
    dstep: f64,
}

impl Rk4Integrator {
    pub fn new(field: Arc<TensorField>, dstep: f64) -> Self {
        Self { field, dstep }
    }
}

/// Flips `v` onto the same half-plane as `reference`.
fn align(v: DVec2, reference: DVec2) -> DVec2 {
    if v.dot(reference) < 0.0 {
        -v
    } else {
        v
    }
}

impl FieldIntegrator for Rk4Integrator {
    fn integrate(&self, p: DVec2, major: bool) -> DVec2 {
        let k1 = self.sample_dir(p, major);
        let k23 = align(self.sample_dir(p + k1 * (self.dstep / 2.0), major), k1);
        let k4 = align(self.sample_dir(p + k23 * self.dstep, major), k1);
        (k1 + k23 * 4.0 + k4) * (self.dstep / 6.0)
    }

    fn field(&self) -> &TensorField {
        &self.field
    }
}
