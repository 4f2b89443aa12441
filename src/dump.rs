//! Diagnostic dump of an expression store.
//!
//! Contains the `StoreDump` type, a read-only projection of a store's
//! programs and dependency lists for debugging.

use crate::register::Register;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Programs and dependency lists of an expression store.
///
/// `Display` prints one line per program (`R2 = R3 R0 +`) followed by
/// one line per register with dependents (`R3 : R0 R1 R2`).
///
/// # Examples
///
/// ```rust
/// use zzattrib::ExpressionStore;
///
/// let mut store = ExpressionStore::new();
/// store.push(1, "R0*2").unwrap();
/// store.finalize().unwrap();
///
/// let dump = store.dump();
/// assert_eq!(dump.to_string(), "R1 = R0 2 *\nR0 : R1\n");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreDump {
    /// Each entry is `(output_register, postfix_text)`, in store order.
    pub expressions: Vec<(Register, String)>,

    /// Each entry is `(register, registers_to_invalidate)`, by register.
    pub dependencies: Vec<(Register, Vec<Register>)>,
}

impl StoreDump {
    /// Create an empty dump.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a program line.
    pub fn add_expression(&mut self, register: Register, rpn: impl Into<String>) {
        self.expressions.push((register, rpn.into()));
    }

    /// Add a dependency list line.
    pub fn add_dependencies(&mut self, register: Register, dependents: Vec<Register>) {
        self.dependencies.push((register, dependents));
    }

    /// Serialize the dump as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for StoreDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (register, rpn) in &self.expressions {
            writeln!(f, "{register} = {rpn}")?;
        }
        for (register, dependents) in &self.dependencies {
            write!(f, "{register} :")?;
            for d in dependents {
                write!(f, " {d}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_display() {
        let mut dump = StoreDump::new();
        dump.add_expression(Register::new(1), "R3 ^");
        dump.add_expression(Register::new(2), "R3 R1 +");
        dump.add_dependencies(Register::new(3), vec![Register::new(1), Register::new(2)]);

        assert_eq!(
            dump.to_string(),
            "R1 = R3 ^\nR2 = R3 R1 +\nR3 : R1 R2\n"
        );
    }

    #[test]
    fn test_dump_empty() {
        assert_eq!(StoreDump::new().to_string(), "");
    }

    #[test]
    fn test_dump_json() {
        let mut dump = StoreDump::new();
        dump.add_expression(Register::new(0), "1");
        dump.add_dependencies(Register::new(4), vec![Register::new(0)]);

        let json = dump.to_json().unwrap();
        let back: StoreDump = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dump);
        assert!(json.contains("expressions"));
    }
}
