//! The `Generator` trait implemented by staged city generators.
//!
//! The trait is object-safe so a front end can drive any generator as
//! `dyn Generator`, one cooperative step at a time.

use crate::error::GenError;
use serde_json::Value;

/// A generator that advances through its stages in small steps.
///
/// Stepping is single-threaded and explicit: each call does a bounded amount
/// of work (for a street generator, one streamline or one pipeline stage)
/// and reports whether more work remains.
pub trait Generator {
    /// Performs one unit of work.
    ///
    /// Returns `Ok(true)` while work remains and `Ok(false)` once finished.
    /// Calling `step` after completion is a no-op returning `Ok(false)`.
    fn step(&mut self) -> Result<bool, GenError>;

    /// Current parameter values as a JSON object.
    fn params(&self) -> Value;

    /// Schema describing all available parameters, their types, ranges, and defaults.
    fn param_schema(&self) -> Value;

    /// Steps until finished.
    fn run(&mut self) -> Result<(), GenError> {
        while self.step()? {}
        Ok(())
    }
}
