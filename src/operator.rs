//! This module defines the core abstraction for the (filtered) operator.
//!
//! The solver never inspects matrix entries. Its only interaction with the
//! problem is the block matrix-vector product: hand the operator `bsize`
//! vectors of length `n`, receive the operator applied to them. Anything that
//! can perform this action can drive the solver: a dense matrix, a sparse
//! matrix, or a matrix-free routine wrapping a simulation code.
//!
//! When Chebyshev acceleration is wanted, the caller wraps the base operator
//! in a [`ChebyshevFilter`] built from an externally generated coefficient
//! sequence. The solver treats the filtered operator exactly like any other;
//! the reported Ritz values are then values of the filter polynomial applied
//! to the base operator, and mapping them back is the caller's side of the
//! filter contract.

use crate::algorithms::kernels;
use faer::prelude::{Reborrow, ReborrowMut};
use faer::{Mat, MatMut, MatRef};

/// A symmetric linear operator applied one block of vectors at a time.
///
/// Implementations must be symmetric (self-adjoint) for the solver's
/// projection to be meaningful; this is a contract, not something the solver
/// can check cheaply.
pub trait FilteredOperator {
    /// Dimension `n` of the operator.
    fn dim(&self) -> usize;

    /// Computes `out = A * block`.
    ///
    /// `block` and `out` are `n x bsize` with `bsize` between 1 and the
    /// configured block size.
    ///
    /// # Panics
    ///
    /// Implementations are expected to panic if the dimensions of `block` or
    /// `out` do not match the operator.
    fn apply_block(&self, block: MatRef<'_, f64>, out: MatMut<'_, f64>);
}

/// Dense matrices act as operators directly. This is the primary concrete
/// implementation that the generic algorithm is tested against.
impl<'a> FilteredOperator for MatRef<'a, f64> {
    #[inline]
    fn dim(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn apply_block(&self, block: MatRef<'_, f64>, out: MatMut<'_, f64>) {
        assert_eq!(
            self.ncols(),
            block.nrows(),
            "Dimension mismatch: operator columns ({}) do not match block rows ({}).",
            self.ncols(),
            block.nrows(),
        );
        // Defer to faer's optimized matrix multiplication routine, writing
        // directly into the caller's buffer.
        kernels::gemm(out, *self, block, 1.0, false);
    }
}

impl<'a> FilteredOperator for MatMut<'a, f64> {
    #[inline]
    fn dim(&self) -> usize {
        self.rb().nrows()
    }

    #[inline]
    fn apply_block(&self, block: MatRef<'_, f64>, out: MatMut<'_, f64>) {
        self.rb().apply_block(block, out);
    }
}

impl FilteredOperator for Mat<f64> {
    #[inline]
    fn dim(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn apply_block(&self, block: MatRef<'_, f64>, out: MatMut<'_, f64>) {
        self.as_ref().apply_block(block, out);
    }
}

/// Adapter turning a closure into an operator, for matrix-free callers.
///
/// The closure receives the input block and the output buffer; it must fill
/// the whole output.
pub struct OpFn<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>),
{
    n: usize,
    f: F,
}

impl<F> OpFn<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>),
{
    /// Wraps `f` as an operator of dimension `n`.
    pub fn new(n: usize, f: F) -> Self {
        Self { n, f }
    }
}

impl<F> FilteredOperator for OpFn<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>),
{
    #[inline]
    fn dim(&self) -> usize {
        self.n
    }

    fn apply_block(&self, block: MatRef<'_, f64>, out: MatMut<'_, f64>) {
        assert_eq!(block.nrows(), self.n);
        (self.f)(block, out);
    }
}

/// Applies a Chebyshev polynomial in a base operator.
///
/// Given a coefficient sequence `c_0..c_d` (generated externally) and a
/// spectral interval `[a, b]` containing the spectrum of the base operator,
/// this adapter computes
///
/// ```text
/// p(A) x = sum_j c_j T_j(B) x,   B = (2 A - (a + b) I) / (b - a)
/// ```
///
/// via the three-term recurrence `T_{j+1}(B) x = 2 B T_j(B) x - T_{j-1}(B) x`.
/// Each application costs `d` base-operator products.
pub struct ChebyshevFilter<'a, O: FilteredOperator> {
    base: &'a O,
    coeffs: &'a [f64],
    lower: f64,
    upper: f64,
}

impl<'a, O: FilteredOperator> ChebyshevFilter<'a, O> {
    /// Builds the filter. `coeffs` must be non-empty and `interval` must be a
    /// proper interval `(a, b)` with `a < b`.
    pub fn new(base: &'a O, coeffs: &'a [f64], interval: (f64, f64)) -> Self {
        assert!(!coeffs.is_empty(), "Chebyshev filter needs at least one coefficient.");
        assert!(
            interval.0 < interval.1,
            "Chebyshev interval must satisfy a < b, got [{}, {}].",
            interval.0,
            interval.1
        );
        Self {
            base,
            coeffs,
            lower: interval.0,
            upper: interval.1,
        }
    }

    /// Polynomial degree of the filter.
    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// `B x = (2 A x - (a + b) x) / (b - a)`, the affine map of the spectrum
    /// onto [-1, 1].
    fn apply_scaled(&self, x: MatRef<'_, f64>, mut out: MatMut<'_, f64>) {
        self.base.apply_block(x, out.rb_mut());
        let center = 0.5 * (self.upper + self.lower);
        let half_width = 0.5 * (self.upper - self.lower);
        for j in 0..out.ncols() {
            for i in 0..out.nrows() {
                out.rb_mut()[(i, j)] = (out.rb()[(i, j)] - center * x[(i, j)]) / half_width;
            }
        }
    }
}

impl<'a, O: FilteredOperator> FilteredOperator for ChebyshevFilter<'a, O> {
    #[inline]
    fn dim(&self) -> usize {
        self.base.dim()
    }

    fn apply_block(&self, block: MatRef<'_, f64>, mut out: MatMut<'_, f64>) {
        let n = block.nrows();
        let b = block.ncols();

        // T_0(B) x = x.
        let mut t_prev: Mat<f64> = block.to_owned();
        // out = c_0 x.
        for j in 0..b {
            for i in 0..n {
                out.rb_mut()[(i, j)] = self.coeffs[0] * block[(i, j)];
            }
        }
        if self.coeffs.len() == 1 {
            return;
        }

        // T_1(B) x = B x.
        let mut t_curr: Mat<f64> = Mat::zeros(n, b);
        self.apply_scaled(block, t_curr.as_mut());
        for j in 0..b {
            for i in 0..n {
                out.rb_mut()[(i, j)] += self.coeffs[1] * t_curr.as_ref()[(i, j)];
            }
        }

        let mut t_next: Mat<f64> = Mat::zeros(n, b);
        for c in self.coeffs.iter().skip(2) {
            // T_{j+1} = 2 B T_j - T_{j-1}.
            self.apply_scaled(t_curr.as_ref(), t_next.as_mut());
            for j in 0..b {
                for i in 0..n {
                    let v = 2.0 * t_next.as_ref()[(i, j)] - t_prev.as_ref()[(i, j)];
                    t_next.as_mut()[(i, j)] = v;
                    out.rb_mut()[(i, j)] += c * v;
                }
            }
            std::mem::swap(&mut t_prev, &mut t_curr);
            std::mem::swap(&mut t_curr, &mut t_next);
        }
    }
}
