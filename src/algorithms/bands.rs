//! Banded storage for the projected block-tridiagonal matrix.
//!
//! The projection of the operator onto the Krylov basis is kept as blocks,
//! never as a dense `k x k` matrix: memory and append cost are
//! `O(bsize^2 * nblocks)`. After a thick restart the leading part of the
//! projection is no longer tridiagonal: it is the diagonal of retained Ritz
//! values plus a single coupling block (the "arrow") between those values and
//! the first post-restart Lanczos block. The storage reflects that shape
//! directly:
//!
//! ```text
//!   [ diag(ritz)   arrow^T                      ]
//!   [ arrow        alpha_0   beta_0^T           ]
//!   [              beta_0    alpha_1   beta_1^T ]
//!   [                        beta_1    ...      ]
//! ```
//!
//! The most recent `beta` couples the basis to the pending (not yet
//! projected) block; it enters the residual estimates but not the assembled
//! eigenproblem.

use faer::Mat;

/// The banded projected matrix.
#[derive(Debug)]
pub struct BlockBands {
    bsize: usize,
    /// Retained Ritz values from the last restart (empty in the first cycle).
    ritz_diag: Vec<f64>,
    /// `bsize x ritz_diag.len()` coupling between the retained columns and
    /// the first post-restart block.
    arrow: Mat<f64>,
    /// Symmetric `bsize x bsize` diagonal blocks, one per Lanczos step this
    /// cycle.
    alphas: Vec<Mat<f64>>,
    /// Upper-triangular `bsize x bsize` off-diagonal blocks; `betas[j]`
    /// couples block `j` to block `j + 1`. The last entry couples to the
    /// pending block.
    betas: Vec<Mat<f64>>,
}

impl BlockBands {
    /// Empty projection for a fresh solve.
    pub fn new(bsize: usize) -> Self {
        Self {
            bsize,
            ritz_diag: Vec::new(),
            arrow: Mat::zeros(bsize, 0),
            alphas: Vec::new(),
            betas: Vec::new(),
        }
    }

    /// Replaces the projection after a thick restart: the retained Ritz
    /// values become the leading diagonal and `arrow` their coupling to the
    /// continuation block; the block-tridiagonal part starts empty.
    pub fn reset_cycle(&mut self, ritz_diag: Vec<f64>, arrow: Mat<f64>) {
        debug_assert_eq!(arrow.nrows(), self.bsize);
        debug_assert_eq!(arrow.ncols(), ritz_diag.len());
        self.ritz_diag = ritz_diag;
        self.arrow = arrow;
        self.alphas.clear();
        self.betas.clear();
    }

    /// Appends one step's diagonal and off-diagonal blocks.
    ///
    /// `alpha` must be symmetric (the caller symmetrizes the raw inner
    /// products); `beta` is the upper-triangular factor coupling to the new
    /// pending block.
    pub fn append(&mut self, alpha: Mat<f64>, beta: Mat<f64>) {
        debug_assert_eq!(alpha.nrows(), self.bsize);
        debug_assert_eq!(alpha.ncols(), self.bsize);
        debug_assert_eq!(beta.nrows(), self.bsize);
        debug_assert_eq!(beta.ncols(), self.bsize);
        #[cfg(debug_assertions)]
        for i in 0..self.bsize {
            for j in 0..i {
                let asym = (alpha.as_ref()[(i, j)] - alpha.as_ref()[(j, i)]).abs();
                debug_assert!(asym < 1e-8 * (1.0 + alpha.as_ref()[(i, j)].abs()));
            }
        }
        self.alphas.push(alpha);
        self.betas.push(beta);
    }

    /// Number of Lanczos blocks appended this cycle.
    pub fn nsteps(&self) -> usize {
        self.alphas.len()
    }

    /// Number of retained Ritz columns at the head of the projection.
    pub fn nretained(&self) -> usize {
        self.ritz_diag.len()
    }

    /// Order of the projected eigenproblem (active basis columns).
    pub fn active_size(&self) -> usize {
        self.ritz_diag.len() + self.alphas.len() * self.bsize
    }

    /// The coupling block between the basis and the pending block, used for
    /// the residual estimates. `None` before the first step of a cycle.
    pub fn last_beta(&self) -> Option<&Mat<f64>> {
        self.betas.last()
    }

    /// Assembles the dense symmetric projection of order
    /// [`active_size`](Self::active_size) for the small eigenproblem. The
    /// final `beta` (coupling to the pending block) is excluded.
    pub fn assemble_dense(&self) -> Mat<f64> {
        let r = self.ritz_diag.len();
        let b = self.bsize;
        let k = self.active_size();
        let mut t = Mat::zeros(k, k);

        for (j, &lambda) in self.ritz_diag.iter().enumerate() {
            t.as_mut()[(j, j)] = lambda;
        }
        if !self.alphas.is_empty() {
            for j in 0..r {
                for i in 0..b {
                    let v = self.arrow.as_ref()[(i, j)];
                    t.as_mut()[(r + i, j)] = v;
                    t.as_mut()[(j, r + i)] = v;
                }
            }
        }
        for (m, alpha) in self.alphas.iter().enumerate() {
            let off = r + m * b;
            for j in 0..b {
                for i in 0..b {
                    t.as_mut()[(off + i, off + j)] = alpha.as_ref()[(i, j)];
                }
            }
        }
        // Off-diagonal couplings between consecutive blocks; the last beta
        // belongs to the pending block and stays out.
        for m in 0..self.alphas.len().saturating_sub(1) {
            let beta = &self.betas[m];
            let row_off = r + (m + 1) * b;
            let col_off = r + m * b;
            for j in 0..b {
                for i in 0..b {
                    let v = beta.as_ref()[(i, j)];
                    t.as_mut()[(row_off + i, col_off + j)] = v;
                    t.as_mut()[(col_off + j, row_off + i)] = v;
                }
            }
        }
        t
    }
}
