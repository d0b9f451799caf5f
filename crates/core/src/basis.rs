//! Basis fields: localised tensor contributions that are superposed into a
//! [`TensorField`](crate::tensor_field::TensorField).
//!
//! Every basis field has a center, a radius (`size`) and a decay exponent.
//! Its influence at `p` is `(1 − dist/size)^decay` inside the radius and zero
//! outside. Angles are configured in degrees and stored in radians.

use crate::error::GenError;
use crate::tensor::Tensor;
use glam::DVec2;
use serde::{Deserialize, Serialize};

/// A parametric tensor contribution centred on a point.
pub trait BasisField: Send + Sync {
    fn center(&self) -> DVec2;

    fn size(&self) -> f64;

    fn decay(&self) -> f64;

    /// Unweighted tensor at `p`.
    fn tensor(&self, p: DVec2) -> Tensor;

    /// Distance from the center used for weighting.
    fn distance(&self, p: DVec2) -> f64 {
        (p - self.center()).length()
    }

    /// Falloff weight at `p`. Smooth mode takes the square root.
    fn weight(&self, p: DVec2, smooth: bool) -> f64 {
        let dist = self.distance(p);
        if dist > self.size() {
            return 0.0;
        }
        let w = (1.0 - dist / self.size()).powf(self.decay());
        if smooth {
            w.sqrt()
        } else {
            w
        }
    }

    fn weighted_tensor(&self, p: DVec2, smooth: bool) -> Tensor {
        let mut t = self.tensor(p);
        t.scale(self.weight(p, smooth));
        t
    }
}

fn validate(size: f64, decay: f64) -> Result<(), GenError> {
    if !size.is_finite() || size <= 0.0 {
        return Err(GenError::InvalidParam {
            name: "size".into(),
            reason: format!("must be positive, got {size}"),
        });
    }
    if decay < 0.0 || decay.is_nan() {
        return Err(GenError::NegativeDecay(decay));
    }
    Ok(())
}

/// Radial tensor for the offset `v` from a center, normalised to unit
/// magnitude. A zero offset has no orientation.
fn radial_tensor(v: DVec2) -> Tensor {
    let len_sq = v.length_squared();
    if len_sq == 0.0 {
        return Tensor::ZERO;
    }
    let a = v.y * v.y - v.x * v.x;
    let b = -2.0 * v.x * v.y;
    Tensor::new(1.0, [a / len_sq, b / len_sq])
}

/// Constant orientation inside its radius.
#[derive(Debug, Clone)]
pub struct GridField {
    center: DVec2,
    size: f64,
    decay: f64,
    theta: f64,
}

impl GridField {
    /// `theta_deg` is the major road direction in degrees.
    pub fn new(center: DVec2, size: f64, decay: f64, theta_deg: f64) -> Result<Self, GenError> {
        validate(size, decay)?;
        Ok(Self {
            center,
            size,
            decay,
            theta: theta_deg.to_radians(),
        })
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }
}

impl BasisField for GridField {
    fn center(&self) -> DVec2 {
        self.center
    }

    fn size(&self) -> f64 {
        self.size
    }

    fn decay(&self) -> f64 {
        self.decay
    }

    fn tensor(&self, _p: DVec2) -> Tensor {
        Tensor::from_angle(self.theta)
    }
}

/// Concentric major roads around the center, spokes as minor roads.
#[derive(Debug, Clone)]
pub struct RadialField {
    center: DVec2,
    size: f64,
    decay: f64,
}

impl RadialField {
    pub fn new(center: DVec2, size: f64, decay: f64) -> Result<Self, GenError> {
        validate(size, decay)?;
        Ok(Self {
            center,
            size,
            decay,
        })
    }
}

impl BasisField for RadialField {
    fn center(&self) -> DVec2 {
        self.center
    }

    fn size(&self) -> f64 {
        self.size
    }

    fn decay(&self) -> f64 {
        self.decay
    }

    fn tensor(&self, p: DVec2) -> Tensor {
        radial_tensor(p - self.center)
    }
}

/// Radial field stretched along a rotated axis. Tends to produce spirals.
#[derive(Debug, Clone)]
pub struct OvalField {
    center: DVec2,
    size: f64,
    decay: f64,
    theta: f64,
    ratio: f64,
}

impl OvalField {
    pub fn new(
        center: DVec2,
        size: f64,
        decay: f64,
        theta_deg: f64,
        ratio: f64,
    ) -> Result<Self, GenError> {
        validate(size, decay)?;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(GenError::InvalidParam {
                name: "ratio".into(),
                reason: format!("must be positive, got {ratio}"),
            });
        }
        Ok(Self {
            center,
            size,
            decay,
            theta: theta_deg.to_radians(),
            ratio,
        })
    }

    /// Offset from the center rotated by `−θ` with x scaled by the ratio.
    fn distorted(&self, p: DVec2) -> DVec2 {
        let v = DVec2::from_angle(-self.theta).rotate(p - self.center);
        DVec2::new(v.x * self.ratio, v.y)
    }
}

impl BasisField for OvalField {
    fn center(&self) -> DVec2 {
        self.center
    }

    fn size(&self) -> f64 {
        self.size
    }

    fn decay(&self) -> f64 {
        self.decay
    }

    fn tensor(&self, p: DVec2) -> Tensor {
        radial_tensor(self.distorted(p))
    }

    fn distance(&self, p: DVec2) -> f64 {
        self.distorted(p).length()
    }
}

/// Serialisable description of a basis field, tagged by `"type"`.
///
/// ```json
/// {"type": "grid", "center": [800, 600], "size": 400, "decay": 20.5, "theta": 45}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BasisSpec {
    Grid {
        center: DVec2,
        size: f64,
        decay: f64,
        #[serde(default)]
        theta: f64,
    },
    Radial {
        center: DVec2,
        size: f64,
        decay: f64,
    },
    Oval {
        center: DVec2,
        size: f64,
        decay: f64,
        #[serde(default)]
        theta: f64,
        #[serde(default = "default_ratio")]
        ratio: f64,
    },
}

fn default_ratio() -> f64 {
    1.0
}

impl BasisSpec {
    /// Builds the field, rejecting negative decay and non-positive sizes.
    pub fn into_field(&self) -> Result<Box<dyn BasisField>, GenError> {
        Ok(match *self {
            BasisSpec::Grid {
                center,
                size,
                decay,
                theta,
            } => Box::new(GridField::new(center, size, decay, theta)?),
            BasisSpec::Radial {
                center,
                size,
                decay,
            } => Box::new(RadialField::new(center, size, decay)?),
            BasisSpec::Oval {
                center,
                size,
                decay,
                theta,
                ratio,
            } => Box::new(OvalField::new(center, size, decay, theta, ratio)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(x: f64, y: f64) -> DVec2 {
        DVec2::new(x, y)
    }

    #[test]
    fn weight_is_one_at_center_and_zero_outside() {
        let f = GridField::new(v(0.0, 0.0), 100.0, 2.0, 0.0).unwrap();
        assert!((f.weight(v(0.0, 0.0), false) - 1.0).abs() < 1e-12);
        assert_eq!(f.weight(v(150.0, 0.0), false), 0.0);
    }

    #[test]
    fn weight_follows_decay_curve() {
        let f = GridField::new(v(0.0, 0.0), 100.0, 2.0, 0.0).unwrap();
        assert!((f.weight(v(50.0, 0.0), false) - 0.25).abs() < 1e-12);
        assert!((f.weight(v(50.0, 0.0), true) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_decay_is_flat_inside_radius() {
        let f = RadialField::new(v(0.0, 0.0), 10.0, 0.0).unwrap();
        assert_eq!(f.weight(v(9.0, 0.0), false), 1.0);
        assert_eq!(f.weight(v(11.0, 0.0), false), 0.0);
    }

    #[test]
    fn negative_decay_is_rejected() {
        let err = GridField::new(v(0.0, 0.0), 10.0, -1.0, 0.0).unwrap_err();
        assert!(matches!(err, GenError::NegativeDecay(_)));
    }

    #[test]
    fn non_positive_size_is_rejected() {
        assert!(RadialField::new(v(0.0, 0.0), 0.0, 1.0).is_err());
    }

    #[test]
    fn grid_theta_is_in_degrees() {
        let f = GridField::new(v(0.0, 0.0), 10.0, 1.0, 90.0).unwrap();
        let major = f.tensor(v(1.0, 1.0)).major();
        assert!(major.x.abs() < 1e-12);
        assert!((major.y.abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn radial_major_is_tangential() {
        let f = RadialField::new(v(100.0, 100.0), 50.0, 1.0).unwrap();
        for p in [v(130.0, 100.0), v(100.0, 80.0), v(90.0, 115.0)] {
            let radial = (p - v(100.0, 100.0)).normalize();
            let t = f.tensor(p);
            assert!(t.major().dot(radial).abs() < 1e-9, "major not tangential at {p}");
            assert!((t.minor().dot(radial).abs() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn radial_tensor_at_center_is_degenerate() {
        let f = RadialField::new(v(5.0, 5.0), 50.0, 1.0).unwrap();
        assert!(f.tensor(v(5.0, 5.0)).is_degenerate());
    }

    #[test]
    fn oval_with_unit_ratio_matches_radial() {
        let oval = OvalField::new(v(0.0, 0.0), 50.0, 1.0, 0.0, 1.0).unwrap();
        let radial = RadialField::new(v(0.0, 0.0), 50.0, 1.0).unwrap();
        let p = v(12.0, -7.0);
        assert!((oval.tensor(p).components() - radial.tensor(p).components()).length() < 1e-12);
        assert!((oval.weight(p, false) - radial.weight(p, false)).abs() < 1e-12);
    }

    #[test]
    fn oval_weight_uses_distorted_distance() {
        let oval = OvalField::new(v(0.0, 0.0), 50.0, 1.0, 0.0, 2.0).unwrap();
        // Stretched x axis: 30 units along x count as 60.
        assert_eq!(oval.weight(v(30.0, 0.0), false), 0.0);
        assert!((oval.weight(v(0.0, 30.0), false) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn spec_deserialises_tagged_json() {
        let spec: BasisSpec = serde_json::from_value(json!({
            "type": "grid", "center": [800.0, 600.0], "size": 400.0, "decay": 20.5, "theta": 45.0
        }))
        .unwrap();
        assert_eq!(
            spec,
            BasisSpec::Grid {
                center: v(800.0, 600.0),
                size: 400.0,
                decay: 20.5,
                theta: 45.0
            }
        );
        let oval: BasisSpec = serde_json::from_value(json!({
            "type": "oval", "center": [0, 0], "size": 10, "decay": 1
        }))
        .unwrap();
        assert!(matches!(oval, BasisSpec::Oval { ratio, .. } if ratio == 1.0));
    }

    #[test]
    fn spec_into_field_propagates_negative_decay() {
        let spec = BasisSpec::Radial {
            center: v(0.0, 0.0),
            size: 10.0,
            decay: -0.5,
        };
        assert!(matches!(spec.into_field(), Err(GenError::NegativeDecay(d)) if d == -0.5));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn weight_is_within_unit_interval(
                x in -500.0_f64..500.0,
                y in -500.0_f64..500.0,
                size in 1.0_f64..400.0,
                decay in 0.0_f64..30.0,
                smooth: bool,
            ) {
                let f = RadialField::new(DVec2::ZERO, size, decay).unwrap();
                let w = f.weight(DVec2::new(x, y), smooth);
                prop_assert!((0.0..=1.0).contains(&w), "weight {w}");
            }
        }
    }
}
