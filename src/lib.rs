//! # zzattrib - Lazy Incremental Attribute Engine
//!
//! A small reactive engine for derived stats such as
//! `armor = base + bonuses`. Formulas over numbered registers are compiled
//! to postfix bytecode, ordered by their dependencies, and re-evaluated
//! lazily on read, only when something they depend on has changed.
//!
//! ## Core Concepts
//!
//! ```text
//! formula text → [compile] → Program → [ExpressionStore::finalize] → [EvalContext]
//! ```
//!
//! 1. **Programs** are compiled formulas (`R0 = R1*2+R3^`) writing one register
//! 2. **ExpressionStore** orders programs topologically and computes, per
//!    register, the full set of registers derived from it
//! 3. **EvalContext** holds register values and dirty flags; writes mark
//!    dirty, reads recompute every dirty register in one pass
//!
//! ## Formula Syntax
//!
//! - Literals: `12`, `0.5`, `.5`
//! - Registers: `R0`, `R17`
//! - Binary operators: `+ - * /` (left-associative, `*` `/` bind tighter)
//! - Prefix negation: `-R1`
//! - Postfix square: `R1^`
//! - Brackets: `(R1+R2)*3`
//!
//! Whitespace is not allowed.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use zzattrib::*;
//!
//! let mut store = ExpressionStore::new();
//! store.push(0, "-(-R1*(2+R3/(1.2-0.3)))").unwrap();
//! store.push(1, "R3^").unwrap();
//! store.push(2, "R3+R0").unwrap();
//! store.finalize().unwrap();
//!
//! let mut ctx = EvalContext::attached(Arc::new(store)).unwrap();
//! ctx.write(3, 8.0);
//! assert_eq!(ctx.read(1), 64.0);
//! assert!((ctx.read(0) - 696.888_9).abs() < 1e-3);
//! ```
//!
//! ## Modules
//!
//! - [`register`] - Register identifier type
//! - [`compiler`] - Formula compiler
//! - [`program`] - Compiled bytecode and evaluator
//! - [`store`] - Expression store, ordering and dependency closure
//! - [`graph`] - Register dependency graph
//! - [`context`] - Evaluation context with lazy recomputation
//! - [`dump`] - Diagnostic dump
//! - [`limits`] - Capacity configuration
//! - [`error`] - Error types

pub mod compiler;
pub mod context;
pub mod dump;
pub mod error;
pub mod graph;
pub mod limits;
pub mod program;
pub mod register;
pub mod store;

// Re-export main types for convenience
pub use compiler::{compile, compile_with_limits};
pub use context::{EvalContext, EvalStats};
pub use dump::StoreDump;
pub use error::{AttribError, CompileError};
pub use limits::{
    Limits, EXPRESSION_MAX, PROGRAM_MAX, REGISTER_LIMIT, REGISTER_MAX, STACK_DEPTH_MAX,
};
pub use program::{Instruction, OpCode, Program};
pub use register::Register;
pub use store::ExpressionStore;
