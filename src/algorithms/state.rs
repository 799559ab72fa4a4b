//! The solver state aggregate.
//!
//! One [`SolverState`] holds everything a solve mutates: the mirrored Krylov
//! basis, the banded projection, the Schur-vector rotation of the last
//! analysis, and the convergence bookkeeping (`evals`, `res`, `index`,
//! `nconv`, `stop`). The host copies are canonical; the device mirrors are
//! transient and always re-derivable. A single control thread mutates this
//! struct between the synchronization points of [`crate::mirror`]; nothing
//! here is shared.
//!
//! Basis column layout:
//!
//! ```text
//!   [ 0 .. stop )          locked (converged) Ritz columns
//!   [ stop .. ncols )      active columns (retained Ritz + Lanczos blocks)
//!   [ ncols .. ncols+b )   pending block, orthonormal, not yet projected
//! ```

use crate::algorithms::bands::BlockBands;
use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::mirror::{DeviceArena, Mirrored};
use faer::MatRef;

/// All iteration state of one solve. Host-resident and exclusively owned by
/// the restart controller.
#[derive(Debug)]
pub struct SolverState {
    /// Operator dimension; fixed for the solver lifetime.
    pub n: usize,
    /// Block size.
    pub bsize: usize,
    /// Blocks currently in the basis (retained prefix counted in block
    /// units, rounded up).
    pub nblocks: usize,
    /// Converged/locked column boundary.
    pub stop: usize,
    /// Leading converged eigenpairs, capped at the requested count.
    pub nconv: usize,
    /// `index[i]` is the Schur-vector column of sorted Ritz pair `i`.
    pub index: Vec<usize>,
    /// Ritz values in sorted (best-first) order.
    pub evals: Vec<f64>,
    /// Residual estimate per sorted Ritz value.
    pub res: Vec<f64>,
    /// The banded projected matrix.
    pub bands: BlockBands,
    /// Krylov basis, `n x capacity`, mirrored host/device.
    pub vecs: Mirrored,
    /// Eigenvector matrix of the last projected eigenproblem (the restart
    /// rotation), `capacity x capacity`, mirrored.
    pub schurvecs: Mirrored,
    /// Device workspace for operator outputs and rotation results,
    /// `n x max(bsize, keep_cap)`, mirrored.
    pub dtemp: Mirrored,
    /// Active basis columns (excludes the pending block).
    pub ncols: usize,
    /// Block expansions since the last restart.
    pub steps_this_cycle: usize,
    capacity: usize,
}

impl SolverState {
    /// Allocates the state for a validated configuration, reserving all
    /// device mirrors up front so resource exhaustion surfaces before the
    /// first iteration.
    pub fn new(cfg: &SolverConfig, arena: &mut DeviceArena) -> Result<Self, SolverError> {
        let capacity = cfg.basis_capacity();
        let temp_cols = cfg.block_size.max(cfg.keep_cap().min(capacity));
        Ok(Self {
            n: cfg.n,
            bsize: cfg.block_size,
            nblocks: 0,
            stop: 0,
            nconv: 0,
            index: Vec::new(),
            evals: Vec::new(),
            res: Vec::new(),
            bands: BlockBands::new(cfg.block_size),
            vecs: Mirrored::new(arena, cfg.n, capacity)?,
            schurvecs: Mirrored::new(arena, capacity, capacity)?,
            dtemp: Mirrored::new(arena, cfg.n, temp_cols)?,
            ncols: 0,
            steps_this_cycle: 0,
            capacity,
        })
    }

    /// Total column capacity of the basis.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when no further expansion fits this cycle: the per-cycle step
    /// budget is spent, or accepting another block would leave no room for
    /// its pending successor.
    pub fn is_full(&self, cfg: &SolverConfig) -> bool {
        self.steps_this_cycle >= cfg.max_step_size
            || self.ncols + 2 * self.bsize > self.capacity
    }

    /// Releases the device mirrors back to the arena. The host copies stay
    /// readable for diagnostics.
    pub fn free_device(&mut self, arena: &mut DeviceArena) {
        self.vecs.free_device(arena);
        self.schurvecs.free_device(arena);
        self.dtemp.free_device(arena);
    }

    /// Largest off-diagonal inner product among the first `ncols` basis
    /// columns. Test and diagnostics hook for the orthogonality invariant.
    pub fn max_offdiag_inner_product(&self, ncols: usize) -> f64 {
        let v: MatRef<'_, f64> = self.vecs.host();
        let mut worst: f64 = 0.0;
        for i in 0..ncols {
            for j in 0..i {
                let mut dot = 0.0;
                for r in 0..self.n {
                    dot += v[(r, i)] * v[(r, j)];
                }
                worst = worst.max(dot.abs());
            }
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_allocation_shapes() {
        let cfg = SolverConfig::new(50, 4);
        let mut arena = DeviceArena::new(1 << 24);
        let state = SolverState::new(&cfg, &mut arena).unwrap();
        assert_eq!(state.vecs.nrows(), 50);
        assert_eq!(state.vecs.ncols(), state.capacity());
        assert_eq!(state.schurvecs.nrows(), state.capacity());
        assert_eq!(state.ncols, 0);
        assert_eq!(state.nconv, 0);
        assert!(arena.in_use() > 0);
    }

    #[test]
    fn test_allocation_failure_reports_exhaustion() {
        let cfg = SolverConfig::new(5000, 10);
        let mut arena = DeviceArena::new(1024);
        let err = SolverState::new(&cfg, &mut arena).unwrap_err();
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_fullness_uses_step_budget_and_capacity() {
        let mut cfg = SolverConfig::new(10, 3);
        cfg.max_step_size = 30;
        let mut arena = DeviceArena::new(1 << 24);
        let mut state = SolverState::new(&cfg, &mut arena).unwrap();
        // Capacity is dimension-capped at 10; with bsize 1 the basis is full
        // once 9 columns would be active.
        assert!(!state.is_full(&cfg));
        state.ncols = 8;
        assert!(!state.is_full(&cfg));
        state.ncols = 9;
        assert!(state.is_full(&cfg));
        state.ncols = 2;
        state.steps_this_cycle = 30;
        assert!(state.is_full(&cfg));
    }
}
