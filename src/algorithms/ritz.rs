//! Ritz analysis of the projected eigenproblem and convergence bookkeeping.
//!
//! The banded projection is assembled (order `k`, a few hundred at most) and
//! eigendecomposed with `faer`. The residual of a Ritz pair is estimated from
//! the banded data alone: if `s` is the Ritz vector of the projection and
//! `beta` the coupling block to the pending basis block, then
//!
//! ```text
//! || A x - theta x || = || beta * s[tail bsize rows] ||
//! ```
//!
//! so no `n`-length residual vector is ever formed. A pair counts as
//! converged when that estimate drops below `tol * max(1, |theta|)`; the
//! convergence count is the number of *leading* converged pairs in the sorted
//! order, since an unconverged pair ahead of converged ones means the
//! requested set is not yet resolved.

use crate::algorithms::state::SolverState;
use crate::config::SolverConfig;
use crate::error::{SolverError, SolverErrorKind};
use faer::Side;

/// Outcome of one projected-eigenproblem analysis. `values` are in the
/// eigendecomposition's own (slot) order; `order` maps sorted position to
/// slot.
#[derive(Debug)]
pub(crate) struct RitzReport {
    /// Order of the projected eigenproblem at analysis time.
    pub k: usize,
    /// Ritz values, slot order.
    pub values: Vec<f64>,
    /// Sorted position -> slot, best-first per the spectrum target.
    pub order: Vec<usize>,
}

/// Diagonalizes the current projection, refreshes the Schur-vector mirror
/// and the convergence bookkeeping in `state`, and returns the full report
/// (the restart controller needs the complete sorted order, not just the
/// reported prefix).
pub(crate) fn analyze(
    state: &mut SolverState,
    cfg: &SolverConfig,
) -> Result<RitzReport, SolverError> {
    let b = state.bsize;
    let t = state.bands.assemble_dense();
    let k = t.nrows();
    debug_assert!(k > 0, "analysis before any projection step");

    let evd = t
        .as_ref()
        .self_adjoint_eigen(Side::Upper)
        .map_err(|e| SolverError::from(SolverErrorKind::EvdError(e)))?;
    let s = evd.U();
    let lam = evd.S();

    // The eigenvector matrix of the projection is the Schur-vector rotation
    // used by the next restart; keep the host mirror current.
    {
        let mut sh = state.schurvecs.host_mut();
        for j in 0..k {
            for i in 0..k {
                sh[(i, j)] = s[(i, j)];
            }
        }
    }

    let values: Vec<f64> = (0..k).map(|i| lam[i]).collect();
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| cfg.target.better(values[a], values[b]));

    // Residual bound from the coupling to the pending block.
    let beta = state
        .bands
        .last_beta()
        .expect("analysis requires at least one step this cycle");
    let residuals: Vec<f64> = order
        .iter()
        .map(|&slot| {
            let mut sq = 0.0;
            for i in 0..b {
                let mut ri = 0.0;
                for j in 0..b {
                    ri += beta.as_ref()[(i, j)] * s[(k - b + j, slot)];
                }
                sq += ri * ri;
            }
            sq.sqrt()
        })
        .collect();

    // Leading consecutive converged pairs, capped at the requested count.
    let mut nconv = 0usize;
    for (pos, &slot) in order.iter().enumerate() {
        if nconv >= cfg.num_eigs {
            break;
        }
        let theta = values[slot];
        if residuals[pos] < cfg.tolerance * theta.abs().max(1.0) {
            nconv += 1;
        } else {
            break;
        }
    }

    // Reported prefix of the bookkeeping arrays.
    let m = k.min(crate::algorithms::MAX_NUM_EIGS);
    state.evals = order[..m].iter().map(|&slot| values[slot]).collect();
    state.res = residuals[..m].to_vec();
    state.index = order[..m].to_vec();
    state.nconv = nconv;

    log::trace!(
        "ritz analysis: k={k}, nconv={nconv}, best={:.6e}, res0={:.3e}",
        state.evals[0],
        state.res[0]
    );

    Ok(RitzReport { k, values, order })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpectrumTarget;
    use crate::mirror::DeviceArena;
    use faer::mat;

    fn small_state(cfg: &SolverConfig) -> (SolverState, DeviceArena) {
        let mut arena = DeviceArena::new(1 << 24);
        let state = SolverState::new(cfg, &mut arena).unwrap();
        (state, arena)
    }

    #[test]
    fn test_diagonal_projection_sorts_and_converges() {
        let mut cfg = SolverConfig::new(32, 2);
        cfg.tolerance = 1e-10;
        let (mut state, _arena) = small_state(&cfg);

        // Two decoupled steps with a vanishing final coupling: the projection
        // is diag(4, 1) and both Ritz pairs are exact.
        state.bands.append(mat![[4.0]], mat![[0.0]]);
        state.bands.append(mat![[1.0]], mat![[0.0]]);

        let report = analyze(&mut state, &cfg).unwrap();
        assert_eq!(report.k, 2);
        assert_eq!(state.nconv, 2);
        assert_eq!(state.evals, vec![4.0, 1.0]);
        assert!(state.res.iter().all(|&r| r < 1e-12));
        // index maps sorted position to eigendecomposition slot.
        assert_eq!(state.evals[0], report.values[state.index[0]]);
    }

    #[test]
    fn test_nonzero_coupling_blocks_convergence() {
        let mut cfg = SolverConfig::new(32, 2);
        cfg.tolerance = 1e-10;
        let (mut state, _arena) = small_state(&cfg);

        state.bands.append(mat![[4.0]], mat![[0.5]]);
        analyze(&mut state, &cfg).unwrap();
        assert_eq!(state.nconv, 0);
        assert!(state.res[0] > 0.4);
    }

    #[test]
    fn test_smallest_target_reverses_order() {
        let mut cfg = SolverConfig::new(32, 2);
        cfg.target = SpectrumTarget::Smallest;
        cfg.tolerance = 1e-10;
        let (mut state, _arena) = small_state(&cfg);

        state.bands.append(mat![[4.0]], mat![[0.0]]);
        state.bands.append(mat![[1.0]], mat![[0.0]]);
        analyze(&mut state, &cfg).unwrap();
        assert_eq!(state.evals, vec![1.0, 4.0]);
    }

    #[test]
    fn test_convergence_count_stops_at_first_unconverged() {
        let mut cfg = SolverConfig::new(32, 3);
        cfg.tolerance = 1e-10;
        let (mut state, _arena) = small_state(&cfg);

        // diag(5, 3) resolved exactly, then a strongly coupled step: the
        // eigenvalues of the trailing 1x1 block cannot converge, and nothing
        // past the first unconverged sorted position may count.
        state.bands.reset_cycle(vec![5.0, 3.0], mat![[0.0, 0.0]]);
        state.bands.append(mat![[4.0]], mat![[1.0]]);
        analyze(&mut state, &cfg).unwrap();

        // Sorted order is 5, 4, 3; the pair at 4 has residual 1.
        assert_eq!(state.nconv, 1);
        assert!((state.evals[0] - 5.0).abs() < 1e-12);
    }
}
