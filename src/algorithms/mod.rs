//! Core iteration machinery: solver state, basis management, banded
//! projection, Ritz analysis and the restart state machine.
//!
//! The submodules are layered leaf-first: [`bands`] and [`state`] hold data,
//! [`basis`] extends the Krylov basis one block at a time, [`ritz`] analyzes
//! the projected eigenproblem, and [`restart`] drives the whole loop. The
//! public solve entry points in [`crate::solvers`] are thin wrappers over
//! [`restart::RestartController`].

pub mod bands;
pub mod basis;
pub mod restart;
pub mod ritz;
pub mod state;

pub(crate) use crate::mirror::kernels;

/// Machine-precision tolerance, `2^-52`. Default convergence tolerance and
/// the scale of every orthogonality threshold.
pub const DOUBLE_TOL: f64 = f64::EPSILON;

/// Maximum number of computed eigenpairs.
pub const MAX_NUM_EIGS: usize = 100;

/// Maximum block size (vectors advanced per Lanczos step).
pub const MAX_BLOCK_SIZE: usize = 3;

/// Maximum number of implicit restarts.
pub const MAX_RESTARTS: usize = 20;

/// Maximum number of block expansions per restart cycle.
pub const MAX_STEP_SIZE: usize = 30;

/// Upper bound on the total number of blocks the basis may ever hold.
pub const MAX_NUM_BLOCKS: usize = MAX_RESTARTS * MAX_STEP_SIZE;

/// Maximum Gram-Schmidt pass count, and the maximum number of consecutive
/// random-replacement attempts before a breakdown escalates to a fatal error.
/// Iterated classical Gram-Schmidt settles in two passes when the block is
/// independent; the third pass is the escape margin.
pub const MAX_ORTH_DEPTH: usize = 3;

/// States of the restart controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Extending the basis by one filtered block.
    Expanding,
    /// Appending the new inner-product blocks to the banded projection.
    Projecting,
    /// Ritz analysis and convergence bookkeeping.
    Checking,
    /// Compacting the basis via the Schur-vector rotation.
    Restarting,
    /// Terminal: the requested eigenpairs converged.
    Converged,
    /// Terminal: restart budget spent without meeting the target.
    Exhausted,
    /// Terminal: unrecoverable failure.
    Fatal,
}

impl Phase {
    /// True for the three states that end the solve.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Converged | Phase::Exhausted | Phase::Fatal)
    }
}

/// Threshold below which a vector of length `n` with the given magnitude
/// scale counts as numerically zero.
pub(crate) fn breakdown_tolerance(n: usize, scale: f64) -> f64 {
    (n as f64).sqrt() * DOUBLE_TOL * scale.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_match_data_model() {
        assert_eq!(MAX_NUM_BLOCKS, 600);
        assert_eq!(DOUBLE_TOL, 2.0f64.powi(-52));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Converged.is_terminal());
        assert!(Phase::Exhausted.is_terminal());
        assert!(Phase::Fatal.is_terminal());
        assert!(!Phase::Expanding.is_terminal());
        assert!(!Phase::Checking.is_terminal());
    }

    #[test]
    fn test_breakdown_tolerance_scales() {
        assert!(breakdown_tolerance(100, 1.0) > breakdown_tolerance(10, 1.0));
        assert!(breakdown_tolerance(10, 100.0) > breakdown_tolerance(10, 1.0));
        // Sub-unit scales are clamped so the threshold never collapses.
        assert_eq!(
            breakdown_tolerance(10, 0.001),
            breakdown_tolerance(10, 1.0)
        );
    }
}
