//! Krylov basis extension and re-orthogonalization.
//!
//! One expansion step consumes the pending block: the filtered operator is
//! applied to it, the raw output yields the new diagonal block of the
//! projection, and the output is then re-orthogonalized against the whole
//! basis (iterated classical Gram-Schmidt on the device, up to
//! [`MAX_ORTH_DEPTH`] passes) and orthonormalized within the block (modified
//! Gram-Schmidt on the host). The orthonormal result becomes the next pending
//! block; the triangular factor of the within-block step is the off-diagonal
//! coupling `beta`.
//!
//! Breakdown recovery happens here, per column:
//!
//! * a numerically zero operator output carries no spectral information; the
//!   column is replaced by a random vector orthogonalized against the basis
//!   and its `beta` diagonal entry is set to 1, so no Ritz pair can claim
//!   convergence through the fabricated direction;
//! * a nonzero output whose projection onto the orthogonal complement
//!   vanishes means an invariant subspace has been resolved exactly; the
//!   replacement column opens a new direction and the `beta` column is 0.
//!
//! A replacement draw that itself stays dependent [`MAX_ORTH_DEPTH`] times in
//! a row escalates to a fatal [`NumericalBreakdown`](crate::error::SolverError).

use crate::algorithms::state::SolverState;
use crate::algorithms::{DOUBLE_TOL, MAX_ORTH_DEPTH, breakdown_tolerance, kernels};
use crate::error::{SolverError, SolverErrorKind};
use crate::operator::FilteredOperator;
use crate::utils::random::random_block;
use faer::{Mat, MatRef};
use rand::rngs::StdRng;

/// Result of one basis extension, handed to the projector.
#[derive(Debug)]
pub(crate) struct ExpansionOutcome {
    /// Symmetric diagonal block `V_j^T A V_j`.
    pub alpha: Mat<f64>,
    /// Upper-triangular coupling to the new pending block.
    pub beta: Mat<f64>,
    /// Columns recovered by random replacement this step.
    pub breakdowns: usize,
}

/// Installs the starting block into columns `[0, bsize)`: the caller-supplied
/// block if given, otherwise random. The block is orthonormalized in place
/// (degenerate columns, e.g. an all-zero start, are replaced by random
/// draws), then pushed to the device mirror.
pub(crate) fn init_starting_block(
    state: &mut SolverState,
    start: Option<MatRef<'_, f64>>,
    rng: &mut StdRng,
) -> Result<(), SolverError> {
    let n = state.n;
    let b = state.bsize;

    let raw = match start {
        Some(v0) => v0.to_owned(),
        None => random_block(rng, n, b),
    };

    let empty = Mat::<f64>::zeros(n, 0);
    let (q, _beta, _breakdowns) = orthonormalize_block(empty.as_ref(), raw, n, rng)?;
    state
        .vecs
        .host_mut()
        .subcols_mut(0, b)
        .copy_from(q.as_ref());
    state.vecs.push_cols(0, b);
    state.ncols = 0;
    Ok(())
}

/// Extends the basis by one filtered block.
///
/// On return the new pending block sits in columns
/// `[ncols + bsize, ncols + 2 bsize)` of the (synced) basis; the counters are
/// advanced by the projection phase, not here.
pub(crate) fn expand<O: FilteredOperator>(
    state: &mut SolverState,
    op: &O,
    rng: &mut StdRng,
) -> Result<ExpansionOutcome, SolverError> {
    let n = state.n;
    let b = state.bsize;
    let k = state.ncols;
    debug_assert!(k + 2 * b <= state.capacity());

    // Apply the filtered operator to the pending block, staging the output
    // through the device workspace for the Gram-Schmidt kernels.
    {
        let vecs = &state.vecs;
        let dtemp = &mut state.dtemp;
        op.apply_block(
            vecs.host().subcols(k, b),
            dtemp.host_mut().subcols_mut(0, b),
        );
        dtemp.push_cols(0, b);
    }

    // Column scales of the raw output, for the breakdown thresholds.
    let pre_norms: Vec<f64> = (0..b)
        .map(|j| state.dtemp.host().col(j).norm_l2())
        .collect();
    let block_scale = pre_norms.iter().cloned().fold(1.0f64, f64::max);

    // Raw diagonal block, before any orthogonalization: alpha = V_j^T w.
    let mut alpha = Mat::<f64>::zeros(b, b);
    kernels::gemm_tn(
        alpha.as_mut(),
        state.vecs.device().subcols(k, b),
        state.dtemp.device().subcols(0, b),
        1.0,
        false,
    );
    // The projection is symmetric in exact arithmetic; enforce it.
    for j in 0..b {
        for i in 0..j {
            let s = 0.5 * (alpha.as_ref()[(i, j)] + alpha.as_ref()[(j, i)]);
            alpha.as_mut()[(i, j)] = s;
            alpha.as_mut()[(j, i)] = s;
        }
    }

    // Iterated classical Gram-Schmidt of the output against every existing
    // column (locked, active and pending). Two passes settle the block when
    // it is independent; the loop exits early once the correction is at
    // round-off level.
    let total = k + b;
    let mut g = Mat::<f64>::zeros(total, b);
    for _pass in 0..MAX_ORTH_DEPTH {
        let vecs = &state.vecs;
        let dtemp = &mut state.dtemp;
        kernels::gemm_tn(
            g.as_mut(),
            vecs.device().subcols(0, total),
            dtemp.device().subcols(0, b),
            1.0,
            false,
        );
        kernels::gemm(
            dtemp.device_mut().subcols_mut(0, b),
            vecs.device().subcols(0, total),
            g.as_ref(),
            -1.0,
            true,
        );
        if g.norm_l2() <= DOUBLE_TOL * block_scale {
            break;
        }
    }
    state.dtemp.pull_cols(0, b);

    // Within-block orthonormalization and breakdown recovery run on the
    // host; the block is tiny.
    let w = state.dtemp.host().subcols(0, b).to_owned();
    let basis = state.vecs.host().subcols(0, total).to_owned();
    let (q, beta, breakdowns) =
        orthonormalize_block_with_scales(basis.as_ref(), w, &pre_norms, n, rng)?;

    state
        .vecs
        .host_mut()
        .subcols_mut(total, b)
        .copy_from(q.as_ref());
    state.vecs.push_cols(total, b);

    Ok(ExpansionOutcome {
        alpha,
        beta,
        breakdowns,
    })
}

/// Orthonormalizes `w` against `basis` and within itself, with all columns
/// treated as genuine (used for the starting block).
fn orthonormalize_block(
    basis: MatRef<'_, f64>,
    w: Mat<f64>,
    n: usize,
    rng: &mut StdRng,
) -> Result<(Mat<f64>, Mat<f64>, usize), SolverError> {
    let pre_norms: Vec<f64> = (0..w.ncols()).map(|j| w.as_ref().col(j).norm_l2()).collect();
    orthonormalize_block_with_scales(basis, w, &pre_norms, n, rng)
}

/// Modified Gram-Schmidt within the block, producing the orthonormal block
/// `q` and the upper-triangular factor `beta`. Dependent columns are replaced
/// by random draws orthogonalized against `basis` and the finalized part of
/// `q`; the corresponding `beta` entries encode the breakdown kind (unit
/// diagonal for zero output, zero column for resolved invariance).
fn orthonormalize_block_with_scales(
    basis: MatRef<'_, f64>,
    mut w: Mat<f64>,
    pre_norms: &[f64],
    n: usize,
    rng: &mut StdRng,
) -> Result<(Mat<f64>, Mat<f64>, usize), SolverError> {
    let b = w.ncols();
    let mut q = Mat::<f64>::zeros(n, b);
    let mut beta = Mat::<f64>::zeros(b, b);
    let mut genuine = vec![true; b];
    let mut breakdowns = 0usize;
    let zero_tol = breakdown_tolerance(n, 1.0);

    for j in 0..b {
        // Orthogonalize against the finalized columns of this block.
        for l in 0..j {
            let mut r = 0.0;
            for i in 0..n {
                r += q.as_ref()[(i, l)] * w.as_ref()[(i, j)];
            }
            if genuine[l] {
                beta.as_mut()[(l, j)] = r;
            }
            for i in 0..n {
                w.as_mut()[(i, j)] -= r * q.as_ref()[(i, l)];
            }
        }

        let degenerate = pre_norms[j] <= zero_tol;
        let rjj = w.as_ref().col(j).norm_l2();
        let dependent = rjj <= breakdown_tolerance(n, pre_norms[j]);

        if degenerate || dependent {
            if degenerate {
                log::warn!(
                    "numerical breakdown: operator output column {j} is zero; deflating by random restart"
                );
            } else {
                log::debug!("invariant direction resolved at column {j}; opening a random direction");
            }
            let col = random_orthonormal_column(basis, q.as_ref().subcols(0, j), rng)?;
            q.as_mut().col_mut(j).copy_from(col.as_ref().col(0));
            for l in 0..j {
                beta.as_mut()[(l, j)] = 0.0;
            }
            // Unit diagonal blocks convergence claims through a fabricated
            // direction; a resolved invariant direction keeps the exact zero.
            beta.as_mut()[(j, j)] = if degenerate { 1.0 } else { 0.0 };
            genuine[j] = false;
            breakdowns += 1;
        } else {
            beta.as_mut()[(j, j)] = rjj;
            for i in 0..n {
                q.as_mut()[(i, j)] = w.as_ref()[(i, j)] / rjj;
            }
        }
    }

    Ok((q, beta, breakdowns))
}

/// Draws a random vector and orthogonalizes it against `basis` and `block`,
/// retrying with fresh draws up to [`MAX_ORTH_DEPTH`] times. Failure means no
/// usable orthogonal direction remains.
fn random_orthonormal_column(
    basis: MatRef<'_, f64>,
    block: MatRef<'_, f64>,
    rng: &mut StdRng,
) -> Result<Mat<f64>, SolverError> {
    let n = basis.nrows();
    // A random vector projected onto a nonempty orthogonal complement keeps
    // a norm far above this; anything smaller means the complement is gone.
    let accept = 1e-8 * (n as f64).sqrt();

    for _attempt in 0..MAX_ORTH_DEPTH {
        let mut v = random_block(rng, n, 1);
        // Two classical Gram-Schmidt passes against both column sets.
        for _pass in 0..2 {
            for set in [basis, block] {
                for l in 0..set.ncols() {
                    let mut r = 0.0;
                    for i in 0..n {
                        r += set[(i, l)] * v.as_ref()[(i, 0)];
                    }
                    for i in 0..n {
                        v.as_mut()[(i, 0)] -= r * set[(i, l)];
                    }
                }
            }
        }
        let norm = v.as_ref().col(0).norm_l2();
        if norm > accept {
            for i in 0..n {
                v.as_mut()[(i, 0)] /= norm;
            }
            return Ok(v);
        }
    }
    Err(SolverErrorKind::NumericalBreakdown {
        block: basis.ncols(),
        attempts: MAX_ORTH_DEPTH,
    }
    .into())
}
