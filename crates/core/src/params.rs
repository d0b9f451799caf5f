//! Helpers for pulling typed values out of a JSON params object.
//!
//! Scalar helpers fall back to the supplied default when the key is missing or
//! has the wrong type. Structured values (basis field lists, polygon masks)
//! go through [`param_typed`], which reports a type mismatch instead of
//! silently ignoring a malformed entry.

use crate::error::GenError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Extracts an `f64` from `params[name]`, returning `default` if missing or wrong type.
pub fn param_f64(params: &Value, name: &str, default: f64) -> f64 {
    params.get(name).and_then(Value::as_f64).unwrap_or(default)
}

/// Extracts a `usize` from `params[name]`, returning `default` if missing or
/// not a non-negative integer.
pub fn param_usize(params: &Value, name: &str, default: usize) -> usize {
    params
        .get(name)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// Extracts a `bool` from `params[name]`, returning `default` if missing or wrong type.
pub fn param_bool(params: &Value, name: &str, default: bool) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(default)
}

/// Extracts a `String` from `params[name]`, returning `default` if missing or wrong type.
pub fn param_string(params: &Value, name: &str, default: &str) -> String {
    params
        .get(name)
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| default.to_owned())
}

/// Deserialises `params[name]` into `T`.
///
/// Returns `Ok(None)` if the key is absent or null and
/// `GenError::ParamTypeMismatch` if it is present but does not match `T`.
pub fn param_typed<T: DeserializeOwned>(params: &Value, name: &str) -> Result<Option<T>, GenError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| GenError::ParamTypeMismatch {
                name: name.to_owned(),
                expected: std::any::type_name::<T>().to_owned(),
                got: e.to_string(),
            }),
    }
}
