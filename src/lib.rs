//! Restarted block Lanczos eigensolver for large symmetric operators.
//!
//! This crate computes a few extreme eigenpairs of a large symmetric linear
//! operator with a block Lanczos iteration, implicit (thick) restarts and
//! optional Chebyshev polynomial filtering. It targets matrix-free problems:
//! the operator is anything implementing [`operator::FilteredOperator`], which
//! asks only for the block matrix-vector product.
//!
//! Built on the [`faer`] linear algebra framework for all dense kernels
//! (block Gram-Schmidt panels, the projected eigendecomposition, the restart
//! rotation).
//!
//! ## Method
//!
//! Each iteration extends an orthonormal Krylov basis by one block of
//! `block_size` vectors, projecting the operator onto the basis as a banded
//! block-tridiagonal matrix. Ritz pairs of the projection approximate
//! eigenpairs of the operator, with residuals estimated from the banded data
//! alone. When the basis reaches its per-cycle budget, a thick restart keeps
//! the best Ritz vectors (converged pairs are locked) and discards the rest,
//! so memory stays bounded at O(n * basis capacity) regardless of how many
//! restarts convergence takes.
//!
//! For operators with clustered spectra, wrapping the operator in a
//! [`operator::ChebyshevFilter`] amplifies the wanted end of the spectrum;
//! the solver then converges on filter-polynomial values, which the caller
//! maps back to the base spectrum.
//!
//! ## Example Usage
//!
//! Computing the two largest eigenpairs of a small symmetric matrix:
//!
//! ```rust
//! use faer::Mat;
//! use cheb_block_lanczos::{SolverConfig, TerminationStatus, solve};
//!
//! // A symmetric tridiagonal matrix.
//! let n = 64;
//! let a = Mat::from_fn(n, n, |i, j| {
//!     if i == j { 2.0 }
//!     else if (i as isize - j as isize).abs() == 1 { -1.0 }
//!     else { 0.0 }
//! });
//!
//! let mut config = SolverConfig::new(n, 2);
//! config.tolerance = 1e-10;
//! config.seed = Some(7);
//!
//! let report = solve(&a, &config).unwrap();
//! assert_eq!(report.status, TerminationStatus::Converged);
//! assert!(report.eigenvalues[0] > report.eigenvalues[1]);
//! assert!(report.residuals.iter().all(|&r| r < 1e-9));
//! ```
//!
//! ## Memory model
//!
//! All large arrays are [`mirror::Mirrored`] buffers: a canonical host copy
//! paired with an accelerator mirror, synchronized by explicit blocking
//! push/pull calls and accounted against a [`mirror::DeviceArena`] byte pool.
//! The reference backend executes the "device" kernels on host memory; the
//! consistency protocol is the same one a real accelerator backend would use.

// Declare the modules that form the crate's API structure.
pub mod algorithms;
pub mod config;
pub mod error;
pub mod mirror;
pub mod operator;
pub mod solvers;
pub mod utils;

// Re-export the main API for convenient access.
pub use config::{SolverConfig, SpectrumTarget};
pub use error::SolverError;
pub use operator::{ChebyshevFilter, FilteredOperator, OpFn};
pub use solvers::{EigenReport, SolveSummary, TerminationStatus, solve, solve_with_start};
