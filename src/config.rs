//! Solver configuration and validation.
//!
//! Block size, requested eigenpair count, restart budget and per-cycle step
//! budget are all capped by hard limits, and a configuration
//! violating any of them is rejected with
//! [`InvalidConfiguration`](crate::error::SolverError) before any iteration
//! state or accelerator memory is created.

use crate::algorithms::{DOUBLE_TOL, MAX_BLOCK_SIZE, MAX_NUM_EIGS, MAX_RESTARTS, MAX_STEP_SIZE};
use crate::error::{SolverError, SolverErrorKind};
use serde::Serialize;

/// Which end of the spectrum the solver targets.
///
/// Ritz pairs are sorted best-first according to this target; convergence is
/// counted over the leading sorted pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpectrumTarget {
    /// Algebraically largest eigenvalues.
    Largest,
    /// Algebraically smallest eigenvalues.
    Smallest,
    /// Eigenvalues of largest absolute value.
    LargestMagnitude,
}

impl SpectrumTarget {
    /// Comparator placing the preferred eigenvalue first.
    pub(crate) fn better(&self, a: f64, b: f64) -> std::cmp::Ordering {
        match self {
            SpectrumTarget::Largest => b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal),
            SpectrumTarget::Smallest => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
            SpectrumTarget::LargestMagnitude => b
                .abs()
                .partial_cmp(&a.abs())
                .unwrap_or(std::cmp::Ordering::Equal),
        }
    }
}

/// Configuration of a single solve.
///
/// Construct with [`SolverConfig::new`] and adjust fields directly; all fields
/// are plain data. [`SolverConfig::validate`] is called by the solver entry
/// points before anything else happens.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Operator dimension. Fixed for the solver lifetime.
    pub n: usize,
    /// Number of vectors advanced per Lanczos step (1..=3).
    pub block_size: usize,
    /// Number of eigenpairs requested (1..=100).
    pub num_eigs: usize,
    /// Which end of the spectrum to compute.
    pub target: SpectrumTarget,
    /// Relative convergence tolerance. A Ritz pair is converged when its
    /// residual estimate falls below `tolerance * max(1, |eval|)`.
    pub tolerance: f64,
    /// Maximum number of implicit restarts (1..=20).
    pub max_restarts: usize,
    /// Maximum number of block expansions per restart cycle (1..=30).
    pub max_step_size: usize,
    /// Seed for the starting block and breakdown-recovery draws. `None` uses
    /// OS entropy; a fixed seed makes the solve reproducible.
    pub seed: Option<u64>,
    /// Accelerator memory pool capacity in bytes. `None` sizes the pool to
    /// exactly what the solve needs.
    pub device_capacity: Option<usize>,
}

impl SolverConfig {
    /// A configuration with the standard defaults: block size 1, largest
    /// eigenvalues, machine-precision tolerance, full restart and step
    /// budgets.
    pub fn new(n: usize, num_eigs: usize) -> Self {
        Self {
            n,
            block_size: 1,
            num_eigs,
            target: SpectrumTarget::Largest,
            tolerance: DOUBLE_TOL,
            max_restarts: MAX_RESTARTS,
            max_step_size: MAX_STEP_SIZE,
            seed: None,
            device_capacity: None,
        }
    }

    /// Checks every bound of the data model. Called before any allocation or
    /// accelerator dispatch.
    pub fn validate(&self) -> Result<(), SolverError> {
        let fail = |msg: String| Err(SolverErrorKind::InvalidConfiguration(msg).into());

        if self.n == 0 {
            return fail("operator dimension n must be positive".to_string());
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return fail(format!(
                "block_size must be between 1 and {}, got {}",
                MAX_BLOCK_SIZE, self.block_size
            ));
        }
        // The basis must hold one projected block plus its pending successor
        // with at least one column left over; at n == 2 * block_size every
        // restart would have to discard the entire projection and the solve
        // could never make progress.
        if 2 * self.block_size >= self.n {
            return fail(format!(
                "operator dimension {} is too small for block_size {} (needs more than {})",
                self.n,
                self.block_size,
                2 * self.block_size
            ));
        }
        if self.num_eigs == 0 || self.num_eigs > MAX_NUM_EIGS {
            return fail(format!(
                "num_eigs must be between 1 and {}, got {}",
                MAX_NUM_EIGS, self.num_eigs
            ));
        }
        // The projection never grows past n - block_size columns (the pending
        // block always occupies the rest), so more requested pairs than that
        // can never all converge.
        if self.num_eigs + self.block_size > self.n {
            return fail(format!(
                "num_eigs {} cannot be resolved in dimension {} with block_size {}",
                self.num_eigs, self.n, self.block_size
            ));
        }
        if !(self.tolerance > 0.0) {
            return fail(format!("tolerance must be positive, got {}", self.tolerance));
        }
        if self.max_restarts == 0 || self.max_restarts > MAX_RESTARTS {
            return fail(format!(
                "max_restarts must be between 1 and {}, got {}",
                MAX_RESTARTS, self.max_restarts
            ));
        }
        if self.max_step_size == 0 || self.max_step_size > MAX_STEP_SIZE {
            return fail(format!(
                "max_step_size must be between 1 and {}, got {}",
                MAX_STEP_SIZE, self.max_step_size
            ));
        }
        Ok(())
    }

    /// Upper bound on the number of retained Ritz columns after a restart:
    /// every converged pair plus up to `num_eigs` unconverged ones.
    pub(crate) fn keep_cap(&self) -> usize {
        self.num_eigs + self.num_eigs.max(self.block_size)
    }

    /// Total column capacity of the basis: the retained prefix plus a full
    /// cycle of fresh blocks plus the pending block, capped by the operator
    /// dimension.
    pub(crate) fn basis_capacity(&self) -> usize {
        let cap = self.keep_cap() + (self.max_step_size + 1) * self.block_size;
        cap.min(self.n)
    }
}
