//! Full configuration of one city: field, masks, road tiers, graph and
//! polygon parameters, read from a single flat JSON params object.

use crate::graph::GraphParams;
use crate::grid_storage::GridStorage;
use crate::polygon_finder::PolygonParams;
use crate::streamlines::StreamlineParams;
use citygen_core::error::GenError;
use citygen_core::params::{param_bool, param_string, param_typed};
use citygen_core::{BasisSpec, Bounds, Masks, NoiseParams};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One road tier. Later tiers keep their distance from earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub name: String,
    pub streamlines: StreamlineParams,
}

impl TierConfig {
    pub fn new(name: &str, streamlines: StreamlineParams) -> Self {
        Self {
            name: name.to_string(),
            streamlines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityConfig {
    pub bounds: Bounds,
    pub basis: Vec<BasisSpec>,
    pub noise: NoiseParams,
    pub masks: Masks,
    pub smooth: bool,
    pub ignore_river: bool,
    pub tiers: Vec<TierConfig>,
    pub graph: GraphParams,
    pub polygons: PolygonParams,
}

impl CityConfig {
    /// Defaults everywhere: no basis fields, no masks, one `main` tier.
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            basis: Vec::new(),
            noise: NoiseParams::default(),
            masks: Masks::default(),
            smooth: false,
            ignore_river: false,
            tiers: vec![TierConfig::new("main", StreamlineParams::default())],
            graph: GraphParams::default(),
            polygons: PolygonParams::default(),
        }
    }

    /// Reads the configuration from a flat params object.
    ///
    /// Streamline keys at the top level describe a single `main` tier; a
    /// `tiers` array of objects (each with an optional `name`) replaces it.
    pub fn from_json(bounds: Bounds, params: &Value) -> Result<Self, GenError> {
        let tiers = match params.get("tiers") {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let name = param_string(item, "name", &format!("tier{i}"));
                    TierConfig::new(&name, StreamlineParams::from_json(item))
                })
                .collect(),
            Some(other) => {
                return Err(GenError::ParamTypeMismatch {
                    name: "tiers".into(),
                    expected: "array".into(),
                    got: json_type(other).into(),
                })
            }
            None => vec![TierConfig::new("main", StreamlineParams::from_json(params))],
        };
        let config = Self {
            bounds,
            basis: param_typed(params, "basis")?.unwrap_or_default(),
            noise: NoiseParams::from_json(params),
            masks: param_typed(params, "masks")?.unwrap_or_default(),
            smooth: param_bool(params, "smooth", false),
            ignore_river: param_bool(params, "ignore_river", false),
            tiers,
            graph: GraphParams::from_json(params),
            polygons: PolygonParams::from_json(params),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GenError> {
        if self.tiers.is_empty() {
            return Err(GenError::InvalidParam {
                name: "tiers".into(),
                reason: "at least one road tier is required".into(),
            });
        }
        for tier in &self.tiers {
            tier.streamlines.validate()?;
            GridStorage::dimensions(self.bounds, tier.streamlines.dsep)?;
        }
        let min_area = self.polygons.min_area;
        if !min_area.is_finite() || min_area <= 0.0 {
            return Err(GenError::InvalidParam {
                name: "min_area".into(),
                reason: format!("must be positive, got {min_area}"),
            });
        }
        if !(0.0..=1.0).contains(&self.polygons.chance_no_divide) {
            return Err(GenError::InvalidParam {
                name: "chance_no_divide".into(),
                reason: format!("must be a probability, got {}", self.polygons.chance_no_divide),
            });
        }
        if self.graph.node_radius.is_nan() || self.graph.node_radius <= 0.0 {
            return Err(GenError::InvalidParam {
                name: "node_radius".into(),
                reason: format!("must be positive, got {}", self.graph.node_radius),
            });
        }
        Ok(())
    }

    /// Schema of every key accepted by [`from_json`](Self::from_json).
    pub fn param_schema() -> Value {
        let mut schema = Map::new();
        for part in [
            StreamlineParams::param_schema(),
            NoiseParams::param_schema(),
            GraphParams::param_schema(),
            PolygonParams::param_schema(),
        ] {
            if let Value::Object(entries) = part {
                schema.extend(entries);
            }
        }
        schema.insert(
            "basis".into(),
            json!({"type": "array", "default": [],
                "description": "Basis fields: objects tagged grid, radial or oval"}),
        );
        schema.insert(
            "masks".into(),
            json!({"type": "object", "default": {"parks": [], "sea": [], "river": []},
                "description": "Park, sea and river polygons"}),
        );
        schema.insert(
            "tiers".into(),
            json!({"type": "array", "default": [],
                "description": "Road tiers, coarse to fine; each accepts the streamline keys and a name"}),
        );
        schema.insert(
            "smooth".into(),
            json!({"type": "boolean", "default": false,
                "description": "Keep the summed tensor magnitude instead of normalising it"}),
        );
        schema.insert(
            "ignore_river".into(),
            json!({"type": "boolean", "default": false,
                "description": "Allow roads across river polygons"}),
        );
        Value::Object(schema)
    }
}

/// Shallow merge: keys of `overrides` replace those of `base`.
pub fn merge_params(base: &Value, overrides: &Value) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(map) = overrides {
        for (k, v) in map {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn bounds() -> Bounds {
        Bounds::new(DVec2::ZERO, DVec2::new(500.0, 500.0)).unwrap()
    }

    #[test]
    fn empty_params_give_defaults() {
        let config = CityConfig::from_json(bounds(), &json!({})).unwrap();
        assert_eq!(config, CityConfig::new(bounds()));
    }

    #[test]
    fn top_level_keys_configure_single_tier() {
        let config = CityConfig::from_json(bounds(), &json!({"dsep": 40.0, "dtest": 30.0})).unwrap();
        assert_eq!(config.tiers.len(), 1);
        assert_eq!(config.tiers[0].name, "main");
        assert_eq!(config.tiers[0].streamlines.dsep, 40.0);
    }

    #[test]
    fn tiers_array_replaces_main_tier() {
        let params = json!({
            "dsep": 99.0,
            "tiers": [
                {"name": "major", "dsep": 100.0, "dtest": 30.0},
                {"dsep": 20.0}
            ]
        });
        let config = CityConfig::from_json(bounds(), &params).unwrap();
        assert_eq!(config.tiers.len(), 2);
        assert_eq!(config.tiers[0].name, "major");
        assert_eq!(config.tiers[0].streamlines.dsep, 100.0);
        assert_eq!(config.tiers[1].name, "tier1");
    }

    #[test]
    fn basis_and_masks_deserialise() {
        let params = json!({
            "basis": [
                {"type": "grid", "center": [800.0, 600.0], "size": 400.0, "decay": 20.5, "theta": 45.0},
                {"type": "radial", "center": [1400.0, 1400.0], "size": 300.0, "decay": 20.5}
            ],
            "masks": {"parks": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]]}
        });
        let config = CityConfig::from_json(bounds(), &params).unwrap();
        assert_eq!(config.basis.len(), 2);
        assert!(matches!(config.basis[1], BasisSpec::Radial { .. }));
        assert_eq!(config.masks.parks.len(), 1);
        assert!(config.masks.sea.is_empty());
    }

    #[test]
    fn malformed_basis_is_a_type_mismatch() {
        let result = CityConfig::from_json(bounds(), &json!({"basis": [{"type": "spiral"}]}));
        assert!(matches!(result, Err(GenError::ParamTypeMismatch { .. })));
        let result = CityConfig::from_json(bounds(), &json!({"tiers": 3}));
        assert!(matches!(result, Err(GenError::ParamTypeMismatch { .. })));
    }

    #[test]
    fn invalid_tier_is_rejected() {
        let result = CityConfig::from_json(bounds(), &json!({"tiers": [{"dsep": 1.0, "dstep": 2.0}]}));
        assert!(matches!(result, Err(GenError::StepExceedsSeparation { .. })));
        let result = CityConfig::from_json(bounds(), &json!({"tiers": []}));
        assert!(matches!(result, Err(GenError::InvalidParam { .. })));
    }

    #[test]
    fn non_positive_min_area_is_rejected() {
        for min_area in [0.0, -5.0] {
            let result = CityConfig::from_json(bounds(), &json!({ "min_area": min_area }));
            assert!(
                matches!(result, Err(GenError::InvalidParam { ref name, .. }) if name == "min_area"),
                "min_area {min_area} accepted"
            );
        }
    }

    #[test]
    fn separation_too_fine_for_world_is_rejected() {
        let world = Bounds::new(DVec2::ZERO, DVec2::new(2000.0, 2000.0)).unwrap();
        let result = CityConfig::from_json(world, &json!({"dsep": 1e-6, "dtest": 1e-6, "dstep": 1e-7}));
        assert!(matches!(result, Err(GenError::InvalidParam { ref name, .. }) if name == "dsep"));
    }

    #[test]
    fn schema_covers_every_section() {
        let schema = CityConfig::param_schema();
        for key in ["dsep", "noise_seed", "node_radius", "min_area", "basis", "masks", "tiers", "smooth"] {
            assert!(schema.get(key).is_some(), "schema missing {key}");
            assert!(schema[key].get("type").is_some(), "{key} missing 'type'");
        }
    }

    #[test]
    fn merge_params_overrides_shallowly() {
        let merged = merge_params(&json!({"a": 1, "b": {"c": 2}}), &json!({"b": 3, "d": 4}));
        assert_eq!(merged, json!({"a": 1, "b": 3, "d": 4}));
        assert_eq!(merge_params(&Value::Null, &json!({"a": 1})), json!({"a": 1}));
    }
}
