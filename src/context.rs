//! Evaluation context module.
//!
//! An `EvalContext` holds live register values and dirty flags for one
//! finalized `ExpressionStore`. Writes only mark registers dirty; the
//! next read recomputes every dirty derived register in one pass.

use crate::error::AttribError;
use crate::register::Register;
use crate::store::ExpressionStore;
use std::sync::Arc;
use tracing::{trace, warn};

/// Counters describing how much recomputation a context has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Number of recompute passes run by reads.
    pub passes: u64,
    /// Number of programs evaluated across all passes.
    pub evaluations: u64,
}

/// Live register state bound to one expression store.
///
/// Several contexts may share the same finalized store, each with its
/// own values and dirty flags. The register file covers
/// `register_max` slots of the store's limits.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use zzattrib::{EvalContext, ExpressionStore};
///
/// let mut store = ExpressionStore::new();
/// store.push(1, "R0*2+1").unwrap();
/// store.finalize().unwrap();
///
/// let mut ctx = EvalContext::attached(Arc::new(store)).unwrap();
/// ctx.write(0, 10.0);
/// assert_eq!(ctx.read(1), 21.0);
/// ```
#[derive(Debug, Default)]
pub struct EvalContext {
    store: Option<Arc<ExpressionStore>>,
    values: Vec<f32>,
    dirty: Vec<bool>,
    clean: bool,
    stats: EvalStats,
}

impl EvalContext {
    /// Create an unattached context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context already attached to `store`.
    pub fn attached(store: Arc<ExpressionStore>) -> Result<Self, AttribError> {
        let mut ctx = Self::new();
        ctx.attach(store)?;
        Ok(ctx)
    }

    /// Bind this context to a finalized store.
    ///
    /// Zeroes every register and marks every register the store knows
    /// about dirty, so the first read computes all formulas. The register
    /// file has `register_max` slots, which [`Limits::validate`] bounds by
    /// [`REGISTER_LIMIT`](crate::limits::REGISTER_LIMIT).
    ///
    /// [`Limits::validate`]: crate::limits::Limits::validate
    ///
    /// # Errors
    ///
    /// * `AlreadyAttached` if the context is already bound
    /// * `NotFinalized` if the store was not successfully finalized
    pub fn attach(&mut self, store: Arc<ExpressionStore>) -> Result<(), AttribError> {
        if self.store.is_some() {
            return Err(AttribError::AlreadyAttached);
        }
        if !store.is_finalized() {
            return Err(AttribError::NotFinalized);
        }

        let slots = store.limits().register_max;
        self.values = vec![0.0; slots];
        self.dirty = vec![false; slots];
        self.dirty[..store.register_count()].fill(true);
        self.clean = false;
        self.store = Some(store);
        Ok(())
    }

    /// Store a value and return the previous one.
    ///
    /// A changed value marks the register and its whole dependency list
    /// dirty. Nothing is recomputed until the next [`read`](Self::read).
    /// Writes outside the register file are ignored and return `0.0`.
    ///
    /// # Arguments
    ///
    /// * `register` - Index of the register to write
    /// * `value` - The new value
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use zzattrib::{EvalContext, ExpressionStore, Register};
    ///
    /// let mut store = ExpressionStore::new();
    /// store.push(1, "R0+1").unwrap();
    /// store.finalize().unwrap();
    /// let mut ctx = EvalContext::attached(Arc::new(store)).unwrap();
    /// ctx.read(1);
    ///
    /// assert_eq!(ctx.write(0, 5.0), 0.0);
    /// assert!(ctx.is_dirty(Register::new(1)));
    /// assert_eq!(ctx.write(0, 6.0), 5.0);
    /// ```
    pub fn write(&mut self, register: u32, value: f32) -> f32 {
        let register = Register::new(register);
        let Some(store) = &self.store else {
            warn!(register = %register, "write to unattached context ignored");
            return 0.0;
        };
        let idx = register.index();
        let Some(slot) = self.values.get_mut(idx) else {
            warn!(register = %register, "write outside register file ignored");
            return 0.0;
        };

        let previous = *slot;
        if previous != value {
            *slot = value;
            if !self.dirty[idx] {
                self.dirty[idx] = true;
                for dependent in store.dependents(register) {
                    self.dirty[dependent.index()] = true;
                }
            }
            self.clean = false;
        }
        previous
    }

    /// Return a register's current value, recomputing first if needed.
    ///
    /// Registers outside the register file read as `0.0`.
    ///
    /// # Returns
    ///
    /// The register's value after at most one recompute pass.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use zzattrib::{EvalContext, ExpressionStore};
    ///
    /// let mut store = ExpressionStore::new();
    /// store.push(2, "R0*R1").unwrap();
    /// store.finalize().unwrap();
    /// let mut ctx = EvalContext::attached(Arc::new(store)).unwrap();
    ///
    /// ctx.write(0, 3.0);
    /// ctx.write(1, 4.0);
    /// assert_eq!(ctx.read(2), 12.0);
    /// assert_eq!(ctx.stats().passes, 1);
    ///
    /// assert_eq!(ctx.read(1_000), 0.0);
    /// assert_eq!(ctx.stats().passes, 1);
    /// ```
    pub fn read(&mut self, register: u32) -> f32 {
        if !self.clean {
            self.recompute();
        }
        self.values
            .get(Register::new(register).index())
            .copied()
            .unwrap_or(0.0)
    }

    /// Evaluate every dirty program in topological order, then mark all
    /// registers clean.
    fn recompute(&mut self) {
        let Some(store) = &self.store else {
            return;
        };

        let mut evaluated = 0u64;
        for program in store.programs() {
            let out = program.output().index();
            if self.dirty[out] {
                self.values[out] = program.evaluate(&self.values);
                evaluated += 1;
            }
        }

        self.dirty.fill(false);
        self.clean = true;
        self.stats.passes += 1;
        self.stats.evaluations += evaluated;
        trace!(evaluated, pass = self.stats.passes, "recompute pass");
    }

    /// `true` when no register is waiting for recomputation.
    pub fn is_clean(&self) -> bool {
        self.clean
    }

    /// `true` if the register is marked dirty.
    pub fn is_dirty(&self, register: Register) -> bool {
        self.dirty.get(register.index()).copied().unwrap_or(false)
    }

    /// The store this context is bound to.
    pub fn store(&self) -> Option<&Arc<ExpressionStore>> {
        self.store.as_ref()
    }

    /// Recomputation counters.
    pub fn stats(&self) -> EvalStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalized(formulas: &[(u32, &str)]) -> Arc<ExpressionStore> {
        let mut store = ExpressionStore::new();
        for (register, formula) in formulas {
            store.push(*register, formula).unwrap();
        }
        store.finalize().unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_attach_marks_known_registers_dirty() {
        let store = finalized(&[(1, "R3+1")]);
        let ctx = EvalContext::attached(store).unwrap();

        assert!(!ctx.is_clean());
        for i in 0..4 {
            assert!(ctx.is_dirty(Register::new(i)));
        }
        assert!(!ctx.is_dirty(Register::new(4)));
    }

    #[test]
    fn test_attach_requires_finalized_store() {
        let mut store = ExpressionStore::new();
        store.push(0, "1").unwrap();

        let err = EvalContext::attached(Arc::new(store)).unwrap_err();
        assert_eq!(err, AttribError::NotFinalized);
    }

    #[test]
    fn test_attach_rejects_failed_store() {
        let mut store = ExpressionStore::new();
        store.push(0, "R0").unwrap();
        assert!(store.finalize().is_err());

        let err = EvalContext::attached(Arc::new(store)).unwrap_err();
        assert_eq!(err, AttribError::NotFinalized);
    }

    #[test]
    fn test_attach_twice() {
        let store = finalized(&[(0, "1")]);
        let mut ctx = EvalContext::attached(store.clone()).unwrap();

        assert_eq!(ctx.attach(store).unwrap_err(), AttribError::AlreadyAttached);
    }

    #[test]
    fn test_write_returns_previous() {
        let store = finalized(&[(1, "R0")]);
        let mut ctx = EvalContext::attached(store).unwrap();

        assert_eq!(ctx.write(0, 5.0), 0.0);
        assert_eq!(ctx.write(0, 7.0), 5.0);
        assert_eq!(ctx.read(1), 7.0);
    }

    #[test]
    fn test_unchanged_write_keeps_clean() {
        let store = finalized(&[(1, "R0")]);
        let mut ctx = EvalContext::attached(store).unwrap();
        ctx.write(0, 2.0);
        ctx.read(1);
        assert!(ctx.is_clean());

        ctx.write(0, 2.0);
        assert!(ctx.is_clean());
        assert!(!ctx.is_dirty(Register::new(0)));
    }

    #[test]
    fn test_write_is_lazy() {
        let store = finalized(&[(1, "R0*3")]);
        let mut ctx = EvalContext::attached(store).unwrap();
        ctx.read(1);
        let passes = ctx.stats().passes;

        ctx.write(0, 4.0);
        assert_eq!(ctx.stats().passes, passes);
        assert!(ctx.is_dirty(Register::new(1)));

        assert_eq!(ctx.read(1), 12.0);
        assert_eq!(ctx.stats().passes, passes + 1);
    }

    #[test]
    fn test_out_of_range_access() {
        let store = finalized(&[(1, "R0")]);
        let mut ctx = EvalContext::attached(store).unwrap();

        assert_eq!(ctx.write(64, 3.0), 0.0);
        assert_eq!(ctx.read(64), 0.0);
        assert_eq!(ctx.read(u32::MAX), 0.0);
    }

    #[test]
    fn test_free_register_beyond_formulas() {
        let store = finalized(&[(1, "R0")]);
        let mut ctx = EvalContext::attached(store).unwrap();

        ctx.write(40, 9.5);
        assert_eq!(ctx.read(40), 9.5);
    }

    #[test]
    fn test_unattached_context() {
        let mut ctx = EvalContext::new();

        assert_eq!(ctx.write(0, 1.0), 0.0);
        assert_eq!(ctx.read(0), 0.0);
        assert!(ctx.store().is_none());
        assert_eq!(ctx.stats(), EvalStats::default());
    }
}
