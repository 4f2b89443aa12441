//! Expression store module.
//!
//! Provides the `ExpressionStore` type, which owns the compiled formulas,
//! orders them so every formula runs after the formulas it reads, and
//! records for each register the full set of registers derived from it.

use crate::compiler::compile_with_limits;
use crate::dump::StoreDump;
use crate::error::AttribError;
use crate::graph::RegisterGraph;
use crate::limits::Limits;
use crate::program::Program;
use crate::register::Register;
use tracing::{debug, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Building,
    Finalized,
    Failed,
}

/// Collection of compiled formulas, one per output register.
///
/// A store is filled with [`push`](Self::push), sealed once with
/// [`finalize`](Self::finalize), and is read-only afterwards. Contexts
/// share a finalized store through an `Arc`, so it is released only when
/// the last context referencing it is gone.
///
/// # Examples
///
/// ```rust
/// use zzattrib::{ExpressionStore, Register};
///
/// let mut store = ExpressionStore::new();
/// store.push(2, "R0+R1").unwrap();
/// store.push(3, "R2*2").unwrap();
/// store.finalize().unwrap();
///
/// assert_eq!(store.register_count(), 4);
/// assert_eq!(store.dependents(Register::new(0)), &[Register::new(2), Register::new(3)]);
/// ```
#[derive(Debug, Clone)]
pub struct ExpressionStore {
    limits: Limits,

    /// Programs in push order until finalized, topological order after.
    programs: Vec<Program>,

    /// Dependency closure per register, indexed by register.
    dependents: Vec<Vec<Register>>,

    /// Highest register mentioned anywhere, plus one.
    register_count: usize,

    state: State,
}

impl ExpressionStore {
    /// Create an empty store with the default limits.
    pub fn new() -> Self {
        Self::build(Limits::default())
    }

    /// Create an empty store with custom limits.
    ///
    /// # Arguments
    ///
    /// * `limits` - Capacity bounds for formulas, registers and programs
    ///
    /// # Returns
    ///
    /// The empty store, or `InvalidLimits` if `limits` fails
    /// [`Limits::validate`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzattrib::{AttribError, ExpressionStore, Limits};
    ///
    /// let limits = Limits {
    ///     expression_max: 2,
    ///     ..Limits::default()
    /// };
    /// let store = ExpressionStore::with_limits(limits).unwrap();
    /// assert_eq!(store.limits().expression_max, 2);
    ///
    /// let broken = Limits {
    ///     register_max: 0,
    ///     ..Limits::default()
    /// };
    /// assert!(matches!(
    ///     ExpressionStore::with_limits(broken),
    ///     Err(AttribError::InvalidLimits(_))
    /// ));
    /// ```
    pub fn with_limits(limits: Limits) -> Result<Self, AttribError> {
        limits.validate()?;
        Ok(Self::build(limits))
    }

    fn build(limits: Limits) -> Self {
        Self {
            limits,
            programs: Vec::new(),
            dependents: Vec::new(),
            register_count: 0,
            state: State::Building,
        }
    }

    /// Compile `formula` and bind it to `register`.
    ///
    /// On any error the store is left unchanged.
    ///
    /// # Arguments
    ///
    /// * `register` - The output register the formula computes
    /// * `formula` - Formula text such as `R0*2+1`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzattrib::{AttribError, ExpressionStore, Register};
    ///
    /// let mut store = ExpressionStore::new();
    /// store.push(1, "R0*2").unwrap();
    ///
    /// assert_eq!(
    ///     store.push(1, "R0+1").unwrap_err(),
    ///     AttribError::Duplicate(Register::new(1))
    /// );
    /// assert_eq!(store.len(), 1);
    /// ```
    ///
    /// # Errors
    ///
    /// * `AlreadyFinalized` if [`finalize`](Self::finalize) was called
    /// * `Duplicate` if `register` already has a formula
    /// * `ExpressionCapacity` if the store is full
    /// * `RegisterOutOfRange` if `register` or a register the formula
    ///   reads is not below `register_max`
    /// * `Compile` if the formula does not compile
    pub fn push(&mut self, register: u32, formula: &str) -> Result<(), AttribError> {
        let register = Register::new(register);
        if self.state != State::Building {
            return Err(AttribError::AlreadyFinalized);
        }
        if self.programs.iter().any(|p| p.output() == register) {
            return Err(AttribError::Duplicate(register));
        }
        if self.programs.len() >= self.limits.expression_max {
            return Err(AttribError::ExpressionCapacity {
                max: self.limits.expression_max,
            });
        }
        self.check_register(register)?;

        let program = compile_with_limits(formula, &self.limits)?.bind(register);
        for read in program.reads() {
            self.check_register(read)?;
        }

        trace!(register = %register, program = %program, "expression pushed");
        self.programs.push(program);
        Ok(())
    }

    fn check_register(&self, register: Register) -> Result<(), AttribError> {
        if register.index() >= self.limits.register_max {
            return Err(AttribError::RegisterOutOfRange {
                register,
                max: self.limits.register_max,
            });
        }
        Ok(())
    }

    /// Order the programs topologically and compute dependency closures.
    ///
    /// Can run only once. After a cycle is reported the store keeps its
    /// programs for inspection but can never be attached to a context.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzattrib::{AttribError, ExpressionStore};
    ///
    /// let mut store = ExpressionStore::new();
    /// store.push(0, "R1+1").unwrap();
    /// store.push(1, "R0+1").unwrap();
    ///
    /// match store.finalize() {
    ///     Err(AttribError::Cycle { path }) => assert_eq!(path.len(), 3),
    ///     other => panic!("expected a cycle, got {other:?}"),
    /// }
    /// assert!(!store.is_finalized());
    /// ```
    ///
    /// # Errors
    ///
    /// * `Cycle` with the offending path if formulas read each other
    /// * `AlreadyFinalized` on a second call
    #[instrument(level = "debug", skip(self), fields(expressions = self.programs.len()))]
    pub fn finalize(&mut self) -> Result<(), AttribError> {
        if self.state != State::Building {
            return Err(AttribError::AlreadyFinalized);
        }

        self.register_count = self
            .programs
            .iter()
            .map(|p| p.max_register().index() + 1)
            .max()
            .unwrap_or(0);

        if let Err(err) = self.sort_programs() {
            self.state = State::Failed;
            return Err(err);
        }

        let mut graph = RegisterGraph::new();
        for program in &self.programs {
            for read in program.reads() {
                graph.add_dependency(program.output(), read);
            }
        }
        self.dependents = (0..self.register_count)
            .map(|i| graph.dependents_of(Register::new(i as u32)))
            .collect();

        self.state = State::Finalized;
        debug!(
            expressions = self.programs.len(),
            registers = self.register_count,
            "expression store finalized"
        );
        Ok(())
    }

    /// Reorder programs by repeated passes: a program is placed once none
    /// of the registers it reads is still produced by an unplaced program.
    fn sort_programs(&mut self) -> Result<(), AttribError> {
        let mut unresolved = vec![false; self.register_count];
        for program in &self.programs {
            unresolved[program.output().index()] = true;
        }

        let total = self.programs.len();
        let mut remaining: Vec<Option<Program>> =
            std::mem::take(&mut self.programs).into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(total);

        while ordered.len() < total {
            let placed_before = ordered.len();
            for slot in remaining.iter_mut() {
                let ready = slot
                    .as_ref()
                    .is_some_and(|p| p.reads().all(|r| !unresolved[r.index()]));
                if !ready {
                    continue;
                }
                if let Some(program) = slot.take() {
                    unresolved[program.output().index()] = false;
                    ordered.push(program);
                }
            }

            if ordered.len() == placed_before {
                let stuck: Vec<Program> = remaining.into_iter().flatten().collect();
                let err = cycle_among(&stuck, &unresolved);
                self.programs = ordered;
                self.programs.extend(stuck);
                return Err(err);
            }
        }

        self.programs = ordered;
        Ok(())
    }

    /// Render the programs and dependency lists for diagnostics.
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
    /// assert_eq!(store.dump().to_string(), "R1 = R0 2 *\nR0 : R1\n");
    /// ```
    pub fn dump(&self) -> StoreDump {
        let mut dump = StoreDump::new();
        for program in &self.programs {
            dump.add_expression(program.output(), program.to_string());
        }
        for (index, list) in self.dependents.iter().enumerate() {
            if !list.is_empty() {
                dump.add_dependencies(Register::new(index as u32), list.clone());
            }
        }
        dump
    }

    /// Programs in their current order (topological once finalized).
    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    /// The program bound to `register`, if any.
    pub fn program_for(&self, register: Register) -> Option<&Program> {
        self.programs.iter().find(|p| p.output() == register)
    }

    /// Registers that must be invalidated when `register` changes.
    ///
    /// Empty before finalize and for registers nothing reads.
    ///
    /// # Returns
    ///
    /// The transitive dependency closure, sorted by register index. A
    /// register is listed once even when reached along several paths.
    pub fn dependents(&self, register: Register) -> &[Register] {
        self.dependents
            .get(register.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Highest register index referenced by any program, plus one.
    /// Zero until finalized.
    pub fn register_count(&self) -> usize {
        self.register_count
    }

    /// `true` once [`finalize`](Self::finalize) has succeeded.
    pub fn is_finalized(&self) -> bool {
        self.state == State::Finalized
    }

    /// Number of bound formulas.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// `true` if no formula has been bound.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// The limits this store was created with.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl Default for ExpressionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the read graph among programs that could not be placed and
/// extract one cycle from it.
fn cycle_among(stuck: &[Program], unresolved: &[bool]) -> AttribError {
    let mut graph = RegisterGraph::new();
    for program in stuck {
        for read in program.reads().filter(|r| unresolved[r.index()]) {
            graph.add_dependency(program.output(), read);
        }
    }
    match graph.detect_cycles() {
        Err(err) => err,
        Ok(()) => AttribError::Cycle { path: Vec::new() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;

    fn r(n: u32) -> Register {
        Register::new(n)
    }

    fn position(store: &ExpressionStore, register: Register) -> usize {
        store
            .programs()
            .iter()
            .position(|p| p.output() == register)
            .unwrap()
    }

    #[test]
    fn test_push_binds_program() {
        let mut store = ExpressionStore::new();
        store.push(1, "R0*2").unwrap();

        assert_eq!(store.len(), 1);
        let program = store.program_for(r(1)).unwrap();
        assert_eq!(program.output(), r(1));
        assert_eq!(program.to_string(), "R0 2 *");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut store = ExpressionStore::new();
        store.push(1, "R0+1").unwrap();

        let err = store.push(1, "R0+2").unwrap_err();
        assert_eq!(err, AttribError::Duplicate(r(1)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.program_for(r(1)).unwrap().to_string(), "R0 1 +");
    }

    #[test]
    fn test_compile_error_leaves_store_unchanged() {
        let mut store = ExpressionStore::new();
        let err = store.push(1, "R0+").unwrap_err();

        assert_eq!(err, AttribError::Compile(CompileError::OperatorSyntax));
        assert!(store.is_empty());
        // The register is still free to bind
        store.push(1, "R0").unwrap();
    }

    #[test]
    fn test_expression_capacity() {
        let mut store = ExpressionStore::with_limits(Limits {
            expression_max: 2,
            ..Limits::default()
        })
        .unwrap();
        store.push(0, "1").unwrap();
        store.push(1, "2").unwrap();

        assert_eq!(
            store.push(2, "3").unwrap_err(),
            AttribError::ExpressionCapacity { max: 2 }
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_register_out_of_range() {
        let mut store = ExpressionStore::with_limits(Limits {
            register_max: 8,
            ..Limits::default()
        })
        .unwrap();

        assert_eq!(
            store.push(8, "1").unwrap_err(),
            AttribError::RegisterOutOfRange {
                register: r(8),
                max: 8
            }
        );
        assert_eq!(
            store.push(0, "R9+1").unwrap_err(),
            AttribError::RegisterOutOfRange {
                register: r(9),
                max: 8
            }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_with_limits_validates() {
        let oversized = Limits {
            register_max: crate::limits::REGISTER_LIMIT + 1,
            ..Limits::default()
        };
        assert!(matches!(
            ExpressionStore::with_limits(oversized),
            Err(AttribError::InvalidLimits(_))
        ));

        let empty_programs = Limits {
            program_max: 0,
            ..Limits::default()
        };
        assert!(ExpressionStore::with_limits(empty_programs).is_err());
    }

    #[test]
    fn test_finalize_orders_programs() {
        let mut store = ExpressionStore::new();
        // Pushed in reverse dependency order
        store.push(3, "R2+1").unwrap();
        store.push(2, "R1*2").unwrap();
        store.push(1, "R0^").unwrap();
        store.finalize().unwrap();

        assert!(position(&store, r(1)) < position(&store, r(2)));
        assert!(position(&store, r(2)) < position(&store, r(3)));
        assert_eq!(store.register_count(), 4);
    }

    #[test]
    fn test_finalize_closure() {
        let mut store = ExpressionStore::new();
        store.push(0, "-(-R1*(2+R3/(1.2-0.3)))").unwrap();
        store.push(1, "R3^").unwrap();
        store.push(2, "R3+R0").unwrap();
        store.finalize().unwrap();

        assert_eq!(store.dependents(r(3)), &[r(0), r(1), r(2)]);
        assert_eq!(store.dependents(r(1)), &[r(0), r(2)]);
        assert_eq!(store.dependents(r(0)), &[r(2)]);
        assert!(store.dependents(r(2)).is_empty());
        assert!(store.dependents(r(40)).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let mut store = ExpressionStore::new();
        store.push(0, "R1+1").unwrap();
        store.push(1, "R0+1").unwrap();

        match store.finalize() {
            Err(AttribError::Cycle { path }) => {
                assert_eq!(path.len(), 3);
                assert_eq!(path[0], path[2]);
            }
            other => panic!("Expected Cycle error, got {other:?}"),
        }
        assert!(!store.is_finalized());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut store = ExpressionStore::new();
        store.push(0, "R0+1").unwrap();

        assert!(matches!(store.finalize(), Err(AttribError::Cycle { .. })));
    }

    #[test]
    fn test_cycle_path_skips_acyclic_programs() {
        let mut store = ExpressionStore::new();
        store.push(5, "R4*2").unwrap();
        store.push(0, "R2+R9").unwrap();
        store.push(1, "R0").unwrap();
        store.push(2, "R1").unwrap();

        match store.finalize() {
            Err(AttribError::Cycle { path }) => {
                assert!(!path.contains(&r(5)));
                assert!(!path.contains(&r(9)));
                assert_eq!(path.len(), 4);
            }
            other => panic!("Expected Cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_finalize_once() {
        let mut store = ExpressionStore::new();
        store.push(0, "1").unwrap();
        store.finalize().unwrap();

        assert_eq!(store.finalize().unwrap_err(), AttribError::AlreadyFinalized);
        assert_eq!(store.push(1, "2").unwrap_err(), AttribError::AlreadyFinalized);
    }

    #[test]
    fn test_push_after_failed_finalize() {
        let mut store = ExpressionStore::new();
        store.push(0, "R0").unwrap();
        assert!(store.finalize().is_err());

        assert_eq!(store.push(1, "2").unwrap_err(), AttribError::AlreadyFinalized);
        assert_eq!(store.finalize().unwrap_err(), AttribError::AlreadyFinalized);
    }

    #[test]
    fn test_empty_store_finalizes() {
        let mut store = ExpressionStore::new();
        store.finalize().unwrap();

        assert!(store.is_finalized());
        assert_eq!(store.register_count(), 0);
    }
}
