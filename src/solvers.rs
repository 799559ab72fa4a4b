//! This module provides the high-level, user-friendly API for computing a few
//! extreme eigenpairs of a large symmetric operator.
//!
//! [`solve`] draws a random starting block; [`solve_with_start`] accepts a
//! caller-supplied one (a warm start from a previous solve, or a block with
//! known components in the wanted eigenspace). Both validate everything up
//! front, reserve the accelerator pool, run the restart state machine to a
//! terminal phase and return an [`EigenReport`].
//!
//! The eigenpairs reported are those of the operator actually supplied. When
//! that operator is a [`ChebyshevFilter`](crate::operator::ChebyshevFilter),
//! the values are filter-polynomial values and mapping them back to the base
//! operator's spectrum is the caller's side of the filter contract.

use crate::algorithms::Phase;
use crate::algorithms::kernels;
use crate::algorithms::restart::RestartController;
use crate::config::SolverConfig;
use crate::error::{SolverError, SolverErrorKind};
use crate::mirror::DeviceArena;
use crate::operator::FilteredOperator;
use faer::{Mat, MatRef};
use serde::Serialize;

/// How a solve ended. Fatal failures are reported as `Err`, not as a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationStatus {
    /// All requested eigenpairs met the tolerance.
    Converged,
    /// The restart budget ran out first; the report holds the best
    /// approximations found.
    Exhausted,
}

/// Result of a solve.
#[derive(Debug)]
pub struct EigenReport {
    /// How the solve ended.
    pub status: TerminationStatus,
    /// Computed eigenvalues, best-first per the configured spectrum target.
    /// Of the supplied operator; see the module docs for filtered operators.
    pub eigenvalues: Vec<f64>,
    /// Residual estimate per eigenvalue, same order.
    pub residuals: Vec<f64>,
    /// Eigenvectors as columns, same order, `n x eigenvalues.len()`.
    pub eigenvectors: Mat<f64>,
    /// How many leading pairs met the tolerance.
    pub nconv: usize,
    /// Restarts performed.
    pub restarts: usize,
    /// Operator applications, counted in columns.
    pub matvecs: usize,
}

/// Serializable digest of an [`EigenReport`] (everything but the vectors),
/// for logging and experiment pipelines.
#[derive(Debug, Clone, Serialize)]
pub struct SolveSummary {
    pub status: TerminationStatus,
    pub eigenvalues: Vec<f64>,
    pub residuals: Vec<f64>,
    pub nconv: usize,
    pub restarts: usize,
    pub matvecs: usize,
}

impl EigenReport {
    /// The serializable digest of this report.
    pub fn summary(&self) -> SolveSummary {
        SolveSummary {
            status: self.status,
            eigenvalues: self.eigenvalues.clone(),
            residuals: self.residuals.clone(),
            nconv: self.nconv,
            restarts: self.restarts,
            matvecs: self.matvecs,
        }
    }
}

/// Computes the requested eigenpairs starting from a random block.
///
/// # Arguments
/// * `operator`: The symmetric operator, possibly Chebyshev-filtered.
/// * `config`: Problem sizes, spectrum target, tolerance and budgets.
///
/// # Returns
/// An [`EigenReport`] for both `Converged` and `Exhausted` runs; `Err` only
/// for invalid input, resource exhaustion or an unrecoverable numerical
/// breakdown.
pub fn solve<O: FilteredOperator>(
    operator: &O,
    config: &SolverConfig,
) -> Result<EigenReport, SolverError> {
    solve_with_start(operator, config, None)
}

/// Like [`solve`], but with a caller-supplied starting block.
///
/// `start` must be `n x block_size`. It does not need to be orthonormal (the
/// solver orthonormalizes it) but must not be numerically zero.
pub fn solve_with_start<O: FilteredOperator>(
    operator: &O,
    config: &SolverConfig,
    start: Option<MatRef<'_, f64>>,
) -> Result<EigenReport, SolverError> {
    config.validate()?;
    if operator.dim() != config.n {
        return Err(SolverErrorKind::DimensionMismatch {
            operator_dim: operator.dim(),
            block_rows: config.n,
        }
        .into());
    }
    if let Some(s) = start {
        if s.nrows() != config.n || s.ncols() != config.block_size {
            return Err(SolverErrorKind::InvalidConfiguration(format!(
                "starting block must be {} x {}, got {} x {}",
                config.n,
                config.block_size,
                s.nrows(),
                s.ncols()
            ))
            .into());
        }
    }

    let mut arena = DeviceArena::new(match config.device_capacity {
        Some(cap) => cap,
        None => exact_device_need(config),
    });

    let mut controller = RestartController::new(operator, config, &mut arena, start)?;
    let phase = controller.run()?;
    let status = match phase {
        Phase::Converged => TerminationStatus::Converged,
        Phase::Exhausted => TerminationStatus::Exhausted,
        _ => unreachable!("run returned a non-terminal phase"),
    };

    let restarts = controller.restarts;
    let matvecs = controller.matvecs;
    let state = &mut controller.state;

    // Lift the reported Ritz vectors back to the operator's space:
    // x_i = V[:, 0..k] * s_{index[i]}, with k the order of the last analysis.
    let k = state.ncols;
    let nreport = config.num_eigs.min(state.evals.len());
    let sh = state.schurvecs.host();
    let mut sel = Mat::<f64>::zeros(k, nreport);
    for (j, &slot) in state.index[..nreport].iter().enumerate() {
        for i in 0..k {
            sel.as_mut()[(i, j)] = sh[(i, slot)];
        }
    }
    let mut eigenvectors = Mat::<f64>::zeros(config.n, nreport);
    kernels::gemm(
        eigenvectors.as_mut(),
        state.vecs.host().subcols(0, k),
        sel.as_ref(),
        1.0,
        false,
    );

    let report = EigenReport {
        status,
        eigenvalues: state.evals[..nreport].to_vec(),
        residuals: state.res[..nreport].to_vec(),
        eigenvectors,
        nconv: state.nconv,
        restarts,
        matvecs,
    };
    state.free_device(&mut arena);
    Ok(report)
}

/// Device bytes one solve needs: the basis mirror, the rotation mirror and
/// the workspace.
fn exact_device_need(cfg: &SolverConfig) -> usize {
    let cap = cfg.basis_capacity();
    let temp = cfg.block_size.max(cfg.keep_cap().min(cap));
    std::mem::size_of::<f64>() * (cfg.n * cap + cap * cap + cfg.n * temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OpFn;
    use faer::MatMut;

    fn diag_operator(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| if i == j { (i + 1) as f64 } else { 0.0 })
    }

    #[test]
    fn test_solve_reports_eigenpairs_with_vectors() {
        let a = diag_operator(30);
        let mut cfg = SolverConfig::new(30, 2);
        cfg.tolerance = 1e-10;
        cfg.seed = Some(5);
        let report = solve(&a, &cfg).unwrap();

        assert_eq!(report.status, TerminationStatus::Converged);
        assert_eq!(report.eigenvalues.len(), 2);
        assert!((report.eigenvalues[0] - 30.0).abs() < 1e-7);
        assert!((report.eigenvalues[1] - 29.0).abs() < 1e-7);
        assert_eq!(report.eigenvectors.nrows(), 30);
        assert_eq!(report.eigenvectors.ncols(), 2);

        // The leading eigenvector of diag(1..30) is +-e_30.
        let v0 = report.eigenvectors.as_ref().col(0);
        assert!((v0[29].abs() - 1.0).abs() < 1e-6);
        assert!(report.matvecs > 0);
    }

    #[test]
    fn test_operator_dimension_mismatch_rejected() {
        let a = diag_operator(10);
        let cfg = SolverConfig::new(12, 2);
        let err = solve(&a, &cfg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: operator has dimension 10 but block has 12 rows."
        );
    }

    #[test]
    fn test_malformed_starting_block_rejected() {
        let a = diag_operator(10);
        let cfg = SolverConfig::new(10, 2);
        let start = Mat::<f64>::zeros(10, 2);
        // Wrong column count for block_size 1.
        let err = solve_with_start(&a, &cfg, Some(start.as_ref())).unwrap_err();
        assert!(err.is_invalid_configuration());
    }

    #[test]
    fn test_warm_start_converges() {
        let a = diag_operator(20);
        let mut cfg = SolverConfig::new(20, 1);
        cfg.tolerance = 1e-10;
        cfg.seed = Some(2);
        // Start exactly on the wanted eigenvector.
        let start = Mat::from_fn(20, 1, |i, _| if i == 19 { 1.0 } else { 0.0 });
        let report = solve_with_start(&a, &cfg, Some(start.as_ref())).unwrap();
        assert_eq!(report.status, TerminationStatus::Converged);
        assert!((report.eigenvalues[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_undersized_device_pool_is_exhaustion() {
        let a = diag_operator(40);
        let mut cfg = SolverConfig::new(40, 2);
        cfg.device_capacity = Some(64);
        let err = solve(&a, &cfg).unwrap_err();
        assert!(err.is_resource_exhaustion());
    }

    #[test]
    fn test_zero_operator_exhausts_restart_budget() {
        let zero = OpFn::new(16, |_x: MatRef<'_, f64>, mut y: MatMut<'_, f64>| {
            y.fill(0.0);
        });
        let mut cfg = SolverConfig::new(16, 1);
        cfg.max_restarts = 3;
        cfg.seed = Some(9);
        let report = solve(&zero, &cfg).unwrap();
        assert_eq!(report.status, TerminationStatus::Exhausted);
        assert_eq!(report.restarts, 3);
        assert_eq!(report.nconv, 0);
    }

    #[test]
    fn test_summary_mirrors_report() {
        let a = diag_operator(25);
        let mut cfg = SolverConfig::new(25, 2);
        cfg.tolerance = 1e-9;
        cfg.seed = Some(13);
        let report = solve(&a, &cfg).unwrap();
        let summary = report.summary();
        assert_eq!(summary.status, report.status);
        assert_eq!(summary.eigenvalues, report.eigenvalues);
        assert_eq!(summary.matvecs, report.matvecs);
    }
}
