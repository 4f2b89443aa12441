//! Error types for formula compilation and store management.
//!
//! Compile failures are represented by `CompileError`; everything the
//! store and context can report is an `AttribError`.

use crate::register::Register;
use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[Register]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Reasons a formula fails to compile.
///
/// # Examples
///
/// ```rust
/// use zzattrib::{compile, CompileError};
///
/// assert_eq!(compile("(R1").unwrap_err(), CompileError::CloseBracketMismatch);
/// assert_eq!(CompileError::EmptyExpression.to_string(), "Empty expression");
/// ```
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CompileError {
    /// `R` not followed by a decimal index.
    #[error("Register syntax error")]
    RegisterSyntax,

    /// Operators and operands do not combine into a single value.
    #[error("Operator syntax error")]
    OperatorSyntax,

    /// The formula contains no operand.
    #[error("Empty expression")]
    EmptyExpression,

    /// A `)` without a matching `(`.
    #[error("Open bracket mismatch")]
    OpenBracketMismatch,

    /// A `(` that is never closed.
    #[error("Close bracket mismatch")]
    CloseBracketMismatch,

    /// A character outside the formula alphabet (this includes whitespace).
    #[error("Invalid character")]
    InvalidCharacter,

    /// Evaluating the formula would need a deeper stack than allowed.
    #[error("Stack depth exceeds limit of {max}")]
    StackCapacity { max: usize },

    /// The compiled program would hold more instructions than allowed.
    #[error("Program length exceeds limit of {max}")]
    ProgramCapacity { max: usize },
}

/// Errors reported by the expression store and evaluation context.
///
/// # Examples
///
/// ```rust
/// use zzattrib::{AttribError, Register};
///
/// let err = AttribError::Duplicate(Register::new(3));
/// assert_eq!(err.to_string(), "Duplicate expression for R3");
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttribError {
    /// The formula text failed to compile.
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// The register already has a bound formula.
    #[error("Duplicate expression for {0}")]
    Duplicate(Register),

    /// The register-reference graph has a cycle.
    ///
    /// Contains the cycle as a closed path: if R0 reads R1 and R1 reads
    /// R0, the path is `[R0, R1, R0]` or `[R1, R0, R1]`.
    #[error("Circular reference detected: {}", format_cycle_path(.path))]
    Cycle { path: Vec<Register> },

    /// The store already holds the maximum number of formulas.
    #[error("Expression store is full ({max} expressions)")]
    ExpressionCapacity { max: usize },

    /// A register index is not below the configured register bound.
    #[error("Register {register} out of range (limit {max})")]
    RegisterOutOfRange { register: Register, max: usize },

    /// The store was already finalized (successfully or not).
    #[error("Expression store already finalized")]
    AlreadyFinalized,

    /// The store has not been successfully finalized.
    #[error("Expression store is not finalized")]
    NotFinalized,

    /// The context is already bound to a store.
    #[error("Context is already attached to a store")]
    AlreadyAttached,

    /// A limits configuration was rejected.
    #[error("Invalid limits: {0}")]
    InvalidLimits(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_messages() {
        assert_eq!(CompileError::RegisterSyntax.to_string(), "Register syntax error");
        assert_eq!(CompileError::OperatorSyntax.to_string(), "Operator syntax error");
        assert_eq!(CompileError::OpenBracketMismatch.to_string(), "Open bracket mismatch");
        assert_eq!(
            CompileError::CloseBracketMismatch.to_string(),
            "Close bracket mismatch"
        );
        assert_eq!(CompileError::InvalidCharacter.to_string(), "Invalid character");
        assert!(CompileError::StackCapacity { max: 256 }
            .to_string()
            .contains("256"));
        assert_eq!(
            CompileError::ProgramCapacity { max: 4 }.to_string(),
            "Program length exceeds limit of 4"
        );
    }

    #[test]
    fn test_compile_error_converts() {
        let err: AttribError = CompileError::EmptyExpression.into();
        assert_eq!(err, AttribError::Compile(CompileError::EmptyExpression));
        assert!(err.to_string().contains("Empty expression"));
    }

    #[test]
    fn test_cycle_error_display() {
        let a = Register::new(0);
        let b = Register::new(1);
        let err = AttribError::Cycle {
            path: vec![a, b, a],
        };
        let display = err.to_string();
        assert!(display.contains("Circular reference"));
        assert!(display.contains("R0 -> R1 -> R0"));
    }

    #[test]
    fn test_empty_cycle_display() {
        let err = AttribError::Cycle { path: Vec::new() };
        assert!(err.to_string().contains("(empty cycle)"));
    }
}
