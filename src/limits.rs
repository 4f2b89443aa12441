//! Capacity configuration.
//!
//! Every bounded container in the engine is sized from a `Limits` value.
//! Hosts can build one in code or load it from JSON.

use crate::error::AttribError;
use serde::{Deserialize, Serialize};

/// Default maximum number of formulas in one store.
pub const EXPRESSION_MAX: usize = 16;

/// Default number of addressable registers.
pub const REGISTER_MAX: usize = 64;

/// Default maximum operand stack depth of one compiled formula.
pub const STACK_DEPTH_MAX: usize = 256;

/// Default maximum instruction count of one compiled formula.
pub const PROGRAM_MAX: usize = 256;

/// Largest `register_max` a configuration may ask for. Every attached
/// context allocates this many slots, so it is kept well below `u32`.
pub const REGISTER_LIMIT: usize = 1 << 16;

/// Capacity bounds for stores, contexts and the compiler.
///
/// Missing fields take their defaults when deserializing.
///
/// # Examples
///
/// ```rust
/// use zzattrib::Limits;
///
/// let limits = Limits::from_json(r#"{ "register_max": 128 }"#).unwrap();
/// assert_eq!(limits.register_max, 128);
/// assert_eq!(limits.expression_max, zzattrib::EXPRESSION_MAX);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of formulas a store accepts.
    pub expression_max: usize,
    /// Register indices must be below this bound.
    pub register_max: usize,
    /// Maximum operand stack depth of a compiled formula.
    pub stack_depth_max: usize,
    /// Maximum instruction count of a compiled formula.
    pub program_max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            expression_max: EXPRESSION_MAX,
            register_max: REGISTER_MAX,
            stack_depth_max: STACK_DEPTH_MAX,
            program_max: PROGRAM_MAX,
        }
    }
}

impl Limits {
    /// Parse limits from a JSON object and validate them.
    pub fn from_json(json: &str) -> Result<Self, AttribError> {
        let limits: Limits =
            serde_json::from_str(json).map_err(|e| AttribError::InvalidLimits(e.to_string()))?;
        limits.validate()?;
        Ok(limits)
    }

    /// Check that every bound is non-zero and `register_max` does not
    /// exceed [`REGISTER_LIMIT`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzattrib::{Limits, REGISTER_LIMIT};
    ///
    /// let huge = Limits {
    ///     register_max: REGISTER_LIMIT + 1,
    ///     ..Limits::default()
    /// };
    /// assert!(huge.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), AttribError> {
        for (name, value) in [
            ("expression_max", self.expression_max),
            ("register_max", self.register_max),
            ("stack_depth_max", self.stack_depth_max),
            ("program_max", self.program_max),
        ] {
            if value == 0 {
                return Err(AttribError::InvalidLimits(format!("{name} must be positive")));
            }
        }
        if self.register_max > REGISTER_LIMIT {
            return Err(AttribError::InvalidLimits(format!(
                "register_max must not exceed {REGISTER_LIMIT}"
            )));
        }
        Ok(())
    }
}
