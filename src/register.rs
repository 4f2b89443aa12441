//! Register identifier module.
//!
//! Provides the `Register` type, a plain index into the register file
//! of an evaluation context. Formulas address registers as `R<n>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Index of a float-valued register slot.
///
/// A register is either *free* (only written from outside) or *derived*
/// (the output of exactly one compiled formula).
///
/// # Examples
///
/// ```rust
/// use zzattrib::Register;
///
/// let r3 = Register::new(3);
/// let parsed: Register = "R3".parse().unwrap();
///
/// assert_eq!(r3, parsed);
/// assert_eq!(r3.to_string(), "R3");
/// assert_eq!(r3.index(), 3);
/// ```
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Register(u32);

impl Serialize for Register {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Register {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let n = u32::deserialize(deserializer)?;
        Ok(Register(n))
    }
}

impl Register {
    /// Create a register from its numeric index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The register's index as a `usize`, for addressing register arrays.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for Register {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

impl From<Register> for u32 {
    fn from(r: Register) -> Self {
        r.0
    }
}

/// Error returned when parsing a `Register` from text fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRegisterError;

impl fmt::Display for ParseRegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected a register of the form R<digits>")
    }
}

impl std::error::Error for ParseRegisterError {}

impl FromStr for Register {
    type Err = ParseRegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('R').ok_or(ParseRegisterError)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseRegisterError);
        }
        digits.parse().map(Register).map_err(|_| ParseRegisterError)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}
