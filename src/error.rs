//! Solver error types.
//!
//! Every failure mode of a solve lives in the private [`SolverErrorKind`]
//! enum; callers only ever see the opaque [`SolverError`] wrapper plus the
//! `is_*` predicates, so variants can be added without breaking downstream
//! matches. Display formatting comes from [`thiserror`].
//! [`faer::linalg::evd::EvdError`] does not implement
//! [`std::error::Error`], so the projected-eigenproblem failure carries it as
//! plain data and reports it in its `Debug` form.
use thiserror::Error;

/// Represents all possible errors that can occur during a solve.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct SolverError(#[from] pub(crate) SolverErrorKind);

/// The distinct failure kinds, kept private behind [`SolverError`].
#[derive(Error, Debug, PartialEq)]
pub(crate) enum SolverErrorKind {
    /// A configuration parameter violates the documented bounds. Rejected
    /// before any iteration starts or accelerator memory is touched.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A Krylov block collapsed to numerical zero and could not be recovered
    /// by random replacement after the maximum number of consecutive attempts.
    #[error(
        "Numerical breakdown at block {block}: random replacement failed {attempts} consecutive times. The basis cannot be extended."
    )]
    NumericalBreakdown { block: usize, attempts: usize },

    /// The accelerator memory pool could not satisfy an allocation or copy.
    /// Always fatal; the host state is the last consistent one.
    #[error(
        "Accelerator resource exhaustion: requested {requested} bytes with {available} bytes available."
    )]
    ResourceExhaustion { requested: usize, available: usize },

    /// Indicates that the dimensions of the operator and a supplied block are
    /// incompatible.
    #[error(
        "Dimension mismatch: operator has dimension {operator_dim} but block has {block_rows} rows."
    )]
    DimensionMismatch {
        operator_dim: usize,
        block_rows: usize,
    },

    /// Wraps an error originating from [`faer`]'s eigendecomposition of the
    /// projected matrix.
    #[error("A numerical error occurred during the eigendecomposition of the projection: {0:?}")]
    EvdError(faer::linalg::evd::EvdError),
}

// Equality of the public wrapper is equality of the inner kind.
impl PartialEq for SolverError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl SolverError {
    /// True if this error is a configuration rejection (as opposed to a
    /// runtime failure).
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self.0, SolverErrorKind::InvalidConfiguration(_))
    }

    /// True if this error is an accelerator resource failure.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self.0, SolverErrorKind::ResourceExhaustion { .. })
    }

    /// True if this error is an unrecovered numerical breakdown.
    pub fn is_numerical_breakdown(&self) -> bool {
        matches!(self.0, SolverErrorKind::NumericalBreakdown { .. })
    }
}
