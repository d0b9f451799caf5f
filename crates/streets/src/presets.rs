//! Named starting configurations.

use citygen_core::error::GenError;
use citygen_core::Seed;
use serde_json::{json, Value};

/// All available preset names.
const PRESET_NAMES: &[&str] = &["twin-grids", "radial", "empty"];

/// A named basis-field layout with its reference world rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Two grid fields rotated 90° from each other.
    TwinGrids,
    /// A large and a small radial field.
    Radial,
    /// No basis fields: the identity tensor everywhere.
    Empty,
}

impl Preset {
    /// Returns `GenError::UnknownPreset` if the name is not recognized.
    pub fn from_name(name: &str) -> Result<Self, GenError> {
        match name {
            "twin-grids" => Ok(Preset::TwinGrids),
            "radial" => Ok(Preset::Radial),
            "empty" => Ok(Preset::Empty),
            _ => Err(GenError::UnknownPreset(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::TwinGrids => "twin-grids",
            Preset::Radial => "radial",
            Preset::Empty => "empty",
        }
    }

    pub fn list() -> &'static [&'static str] {
        PRESET_NAMES
    }

    /// Base params; user params are merged over these.
    pub fn params(&self) -> Value {
        match self {
            Preset::TwinGrids => json!({
                "basis": [
                    {"type": "grid", "center": [800.0, 600.0], "size": 400.0, "decay": 20.5, "theta": 45.0},
                    {"type": "grid", "center": [1200.0, 1000.0], "size": 400.0, "decay": 20.5, "theta": -45.0}
                ]
            }),
            Preset::Radial => json!({
                "basis": [
                    {"type": "radial", "center": [1400.0, 1400.0], "size": 300.0, "decay": 20.5},
                    {"type": "radial", "center": [1200.0, 1200.0], "size": 150.0, "decay": 20.5}
                ]
            }),
            Preset::Empty => json!({}),
        }
    }

    /// Seed over the preset's reference rectangle, origin `(500, 500)` and
    /// size `2000 × 2000`.
    pub fn default_seed(&self, seed: u64) -> Seed {
        Seed::new(self.name(), 2000.0, 2000.0, seed).with_origin(500.0, 500.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_resolves() {
        for name in Preset::list() {
            let preset = Preset::from_name(name).unwrap();
            assert_eq!(preset.name(), *name);
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        assert!(matches!(Preset::from_name("manhattan"), Err(GenError::UnknownPreset(_))));
    }

    #[test]
    fn params_carry_basis_fields() {
        assert_eq!(Preset::TwinGrids.params()["basis"].as_array().map(Vec::len), Some(2));
        assert_eq!(Preset::Radial.params()["basis"].as_array().map(Vec::len), Some(2));
        assert!(Preset::Empty.params().get("basis").is_none());
    }

    #[test]
    fn default_seed_uses_reference_rectangle() {
        let seed = Preset::Radial.default_seed(1234);
        assert_eq!(seed.preset, "radial");
        assert_eq!(seed.origin, [500.0, 500.0]);
        assert_eq!((seed.width, seed.height), (2000.0, 2000.0));
        assert!(seed.validate().is_ok());
    }
}
