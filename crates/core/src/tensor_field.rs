//! Weighted superposition of basis fields, masked by water and rotated by
//! noise inside parks.

use crate::basis::{BasisField, BasisSpec};
use crate::error::GenError;
use crate::geometry::{point_in_polygon, Polygon};
use crate::params::{param_bool, param_f64, param_usize};
use crate::tensor::Tensor;
use glam::DVec2;
use noise::{NoiseFn, OpenSimplex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Rotational noise configuration. Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub seed: u32,
    pub park_size: f64,
    pub park_angle: f64,
    pub global_size: f64,
    pub global_angle: f64,
    pub global_enabled: bool,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 0,
            park_size: 20.0,
            park_angle: 90.0,
            global_size: 30.0,
            global_angle: 20.0,
            global_enabled: false,
        }
    }
}

impl NoiseParams {
    /// Reads `noise_*` keys from a flat params object.
    pub fn from_json(params: &Value) -> Self {
        let d = Self::default();
        Self {
            seed: param_usize(params, "noise_seed", d.seed as usize) as u32,
            park_size: param_f64(params, "noise_park_size", d.park_size),
            park_angle: param_f64(params, "noise_park_angle", d.park_angle),
            global_size: param_f64(params, "noise_global_size", d.global_size),
            global_angle: param_f64(params, "noise_global_angle", d.global_angle),
            global_enabled: param_bool(params, "noise_global", d.global_enabled),
        }
    }

    pub fn param_schema() -> Value {
        json!({
            "noise_seed": {"type": "integer", "min": 0, "max": u32::MAX, "default": 0,
                "description": "Seed of the rotational noise"},
            "noise_park_size": {"type": "number", "min": 1.0, "max": 500.0, "default": 20.0,
                "description": "Noise feature size inside parks"},
            "noise_park_angle": {"type": "number", "min": 0.0, "max": 180.0, "default": 90.0,
                "description": "Maximum noise rotation inside parks (degrees)"},
            "noise_global_size": {"type": "number", "min": 1.0, "max": 500.0, "default": 30.0,
                "description": "Noise feature size everywhere"},
            "noise_global_angle": {"type": "number", "min": 0.0, "max": 180.0, "default": 20.0,
                "description": "Maximum noise rotation everywhere (degrees)"},
            "noise_global": {"type": "boolean", "default": false,
                "description": "Rotate the whole field by noise"}
        })
    }
}

/// Polygon sets that mask where roads may be drawn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Masks {
    pub parks: Vec<Polygon>,
    pub sea: Vec<Polygon>,
    pub river: Vec<Polygon>,
}

/// The city's tensor field.
///
/// Sampling is pure: the result depends only on the point, the basis list,
/// the masks and the noise configuration.
pub struct TensorField {
    basis: Vec<Box<dyn BasisField>>,
    masks: Masks,
    ignore_river: bool,
    smooth: bool,
    noise_params: NoiseParams,
    noise: OpenSimplex,
}

impl TensorField {
    pub fn new(noise_params: NoiseParams, smooth: bool) -> Self {
        Self {
            basis: Vec::new(),
            masks: Masks::default(),
            ignore_river: false,
            smooth,
            noise: OpenSimplex::new(noise_params.seed),
            noise_params,
        }
    }

    /// Builds a field from serialised specs, failing on the first invalid one.
    pub fn from_specs(
        specs: &[BasisSpec],
        noise_params: NoiseParams,
        smooth: bool,
    ) -> Result<Self, GenError> {
        let mut field = Self::new(noise_params, smooth);
        for spec in specs {
            field.add(spec.into_field()?);
        }
        Ok(field)
    }

    /// Appends a basis field and returns its index.
    pub fn add(&mut self, field: Box<dyn BasisField>) -> usize {
        self.basis.push(field);
        self.basis.len() - 1
    }

    /// Removes the basis field at `index`, shifting later ones down.
    pub fn remove(&mut self, index: usize) -> Option<Box<dyn BasisField>> {
        (index < self.basis.len()).then(|| self.basis.remove(index))
    }

    pub fn basis_len(&self) -> usize {
        self.basis.len()
    }

    pub fn set_masks(&mut self, masks: Masks) {
        self.masks = masks;
    }

    pub fn masks(&self) -> &Masks {
        &self.masks
    }

    pub fn set_ignore_river(&mut self, ignore: bool) {
        self.ignore_river = ignore;
    }

    pub fn smooth(&self) -> bool {
        self.smooth
    }

    pub fn noise_params(&self) -> &NoiseParams {
        &self.noise_params
    }

    /// True outside every sea polygon and, unless rivers are ignored,
    /// outside every river polygon.
    pub fn on_land(&self, p: DVec2) -> bool {
        let in_any = |polys: &[Polygon]| polys.iter().any(|poly| point_in_polygon(p, poly));
        if in_any(&self.masks.sea) {
            return false;
        }
        self.ignore_river || !in_any(&self.masks.river)
    }

    pub fn in_parks(&self, p: DVec2) -> bool {
        self.masks.parks.iter().any(|poly| point_in_polygon(p, poly))
    }

    /// Noise rotation at `p` in radians.
    fn rotational_noise(&self, p: DVec2, size: f64, angle_deg: f64) -> f64 {
        self.noise.get([p.x / size, p.y / size]) * angle_deg.to_radians()
    }

    /// Tensor at `p`.
    ///
    /// Water gives the zero tensor. With no basis fields the result is the
    /// axis-aligned `Tensor(r = 1, m = (0, 0))`.
    pub fn sample(&self, p: DVec2) -> Tensor {
        if !self.on_land(p) {
            return Tensor::ZERO;
        }
        if self.basis.is_empty() {
            return Tensor::new(1.0, [0.0, 0.0]);
        }

        let mut acc = Tensor::ZERO;
        for field in &self.basis {
            acc.add(&field.weighted_tensor(p, self.smooth), self.smooth);
        }

        if self.in_parks(p) {
            acc.rotate(self.rotational_noise(
                p,
                self.noise_params.park_size,
                self.noise_params.park_angle,
            ));
        }
        if self.noise_params.global_enabled {
            acc.rotate(self.rotational_noise(
                p,
                self.noise_params.global_size,
                self.noise_params.global_angle,
            ));
        }
        acc
    }

    /// Sum of basis weights at `p`; bounds the magnitude of `sample(p)`.
    pub fn total_weight(&self, p: DVec2) -> f64 {
        self.basis.iter().map(|f| f.weight(p, self.smooth)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{GridField, RadialField};
    use serde_json::json;

    fn v(x: f64, y: f64) -> DVec2 {
        DVec2::new(x, y)
    }

    fn square(x0: f64, y0: f64, s: f64) -> Polygon {
        vec![v(x0, y0), v(x0 + s, y0), v(x0 + s, y0 + s), v(x0, y0 + s)]
    }

    fn two_grids() -> TensorField {
        let specs = vec![
            BasisSpec::Grid {
                center: v(800.0, 600.0),
                size: 400.0,
                decay: 20.5,
                theta: 45.0,
            },
            BasisSpec::Grid {
                center: v(1200.0, 1000.0),
                size: 400.0,
                decay: 20.5,
                theta: -45.0,
            },
        ];
        TensorField::from_specs(&specs, NoiseParams::default(), false).unwrap()
    }

    #[test]
    fn empty_field_is_axis_aligned_identity() {
        let field = TensorField::new(NoiseParams::default(), false);
        let t = field.sample(v(3.0, 4.0));
        assert_eq!(t, Tensor::new(1.0, [0.0, 0.0]));
        assert!((t.major() - DVec2::X).length() < 1e-12);
    }

    #[test]
    fn sea_gives_zero_tensor() {
        let mut field = two_grids();
        field.set_masks(Masks {
            sea: vec![square(700.0, 500.0, 200.0)],
            ..Masks::default()
        });
        assert_eq!(field.sample(v(800.0, 600.0)), Tensor::ZERO);
        assert!(!field.sample(v(1200.0, 1000.0)).is_degenerate());
    }

    #[test]
    fn river_masks_unless_ignored() {
        let mut field = two_grids();
        field.set_masks(Masks {
            river: vec![square(0.0, 0.0, 10.0)],
            ..Masks::default()
        });
        assert!(!field.on_land(v(5.0, 5.0)));
        field.set_ignore_river(true);
        assert!(field.on_land(v(5.0, 5.0)));
    }

    #[test]
    fn grid_center_follows_its_angle() {
        let field = two_grids();
        let major = field.sample(v(800.0, 600.0)).major();
        let d = std::f64::consts::FRAC_1_SQRT_2;
        assert!((major - v(d, d)).length() < 1e-9, "major {major}");
        let other = field.sample(v(1200.0, 1000.0)).major();
        assert!((other - v(d, -d)).length() < 1e-9, "major {other}");
    }

    #[test]
    fn add_and_remove_shift_indices() {
        let mut field = TensorField::new(NoiseParams::default(), false);
        let a = field.add(Box::new(GridField::new(v(0.0, 0.0), 10.0, 1.0, 0.0).unwrap()));
        let b = field.add(Box::new(RadialField::new(v(0.0, 0.0), 10.0, 1.0).unwrap()));
        assert_eq!((a, b), (0, 1));
        assert!(field.remove(0).is_some());
        assert_eq!(field.basis_len(), 1);
        assert!(field.remove(5).is_none());
    }

    #[test]
    fn from_specs_rejects_negative_decay() {
        let specs = vec![BasisSpec::Grid {
            center: v(0.0, 0.0),
            size: 10.0,
            decay: -2.0,
            theta: 0.0,
        }];
        let result = TensorField::from_specs(&specs, NoiseParams::default(), false);
        assert!(matches!(result, Err(GenError::NegativeDecay(_))));
    }

    #[test]
    fn park_noise_rotates_inside_parks_only() {
        let plain = two_grids();
        let mut parked = two_grids();
        parked.set_masks(Masks {
            parks: vec![square(700.0, 500.0, 200.0)],
            ..Masks::default()
        });
        let outside = v(1200.0, 1000.0);
        assert_eq!(plain.sample(outside), parked.sample(outside));
        assert!(parked.in_parks(v(810.0, 610.0)));

        // The noise is not zero everywhere inside the park.
        let rotated = (0..20).any(|i| {
            let p = v(710.0 + i as f64 * 9.3, 520.0 + i as f64 * 7.1);
            (plain.sample(p).theta() - parked.sample(p).theta()).abs() > 1e-9
        });
        assert!(rotated);
    }

    #[test]
    fn sampling_is_deterministic() {
        let mut params = NoiseParams::default();
        params.global_enabled = true;
        let specs = vec![BasisSpec::Radial {
            center: v(300.0, 100.0),
            size: 800.0,
            decay: 2.0,
        }];
        let a = TensorField::from_specs(&specs, params.clone(), true).unwrap();
        let b = TensorField::from_specs(&specs, params, true).unwrap();
        for i in 0..50 {
            let p = v(i as f64 * 13.7, i as f64 * 3.1);
            assert_eq!(a.sample(p), b.sample(p));
        }
    }

    #[test]
    fn noise_params_from_json_reads_prefixed_keys() {
        let params = json!({"noise_global": true, "noise_park_angle": 45.0, "noise_seed": 7});
        let n = NoiseParams::from_json(&params);
        assert!(n.global_enabled);
        assert_eq!(n.park_angle, 45.0);
        assert_eq!(n.seed, 7);
        assert_eq!(n.global_size, 30.0);
    }

    #[test]
    fn masks_deserialise_from_point_arrays() {
        let masks: Masks = serde_json::from_value(json!({
            "parks": [[[0, 0], [10, 0], [10, 10]]]
        }))
        .unwrap();
        assert_eq!(masks.parks.len(), 1);
        assert!(masks.sea.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sample_magnitude_bounded_by_total_weight(
                x in 300.0_f64..1700.0,
                y in 200.0_f64..1400.0,
            ) {
                let field = two_grids();
                let p = DVec2::new(x, y);
                let a_b = field.sample(p).components();
                let r_max = field.total_weight(p);
                prop_assert!(a_b.length_squared() <= r_max * r_max + 1e-12);
            }
        }
    }
}
