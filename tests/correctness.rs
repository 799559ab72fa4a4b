//! Integration test suite to verify the mathematical correctness of the solver.
//!
//! # Test Methodology
//!
//! The core principle of this test suite is to validate the computed eigenpairs against a
//! ground truth that is known analytically. Diagonal operators are used throughout: for
//! `A = diag(λ_1, ..., λ_n)` the eigenvalues are the diagonal entries and the eigenvectors
//! are coordinate axes, so every claim the solver makes can be checked exactly.
//!
//! The methodology consists of the following steps:
//! 1.  **Construct a Test Problem:** A symmetric operator with analytically known spectrum.
//! 2.  **Run the Solver:** With a fixed seed so every test is deterministic.
//! 3.  **Verify the Claims:** Reported eigenvalues match the ground truth, reported
//!     residual estimates are consistent with the true residual `||A x - θ x||` computed
//!     directly against the operator, and the termination status is the expected one.
//!
//! Beyond the happy path, the suite exercises the documented failure modes: invalid
//! configurations, an undersized accelerator pool, and a pathological operator that can
//! never converge and must exhaust its restart budget gracefully.

use anyhow::{Result, ensure};
use cheb_block_lanczos::{
    ChebyshevFilter, OpFn, SolverConfig, SpectrumTarget, TerminationStatus, solve,
    solve_with_start,
};
use faer::{Mat, MatMut, MatRef, Scale};

/// Tolerance used when comparing converged eigenvalues against the analytic ground truth.
/// The solver stops at its configured residual tolerance, so eigenvalue errors are a
/// little smaller than the residual bound but not machine precision.
const GROUND_TRUTH_TOLERANCE: f64 = 1e-6;

/// A diagonal operator with entries `1..=n`.
fn diag_problem(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| if i == j { (i + 1) as f64 } else { 0.0 })
}

/// A diagonal operator with the given entries.
fn diag_from(entries: &[f64]) -> Mat<f64> {
    let n = entries.len();
    Mat::from_fn(n, n, |i, j| if i == j { entries[i] } else { 0.0 })
}

/// The true relative residual `||A x - θ x|| / max(1, |θ|)` of a reported pair,
/// computed against the actual operator rather than the solver's internal estimate.
fn true_relative_residual(a: MatRef<'_, f64>, theta: f64, x: MatRef<'_, f64>) -> f64 {
    let ax = a * x;
    let diff = &ax - &(x * Scale(theta));
    diff.norm_l2() / theta.abs().max(1.0)
}

#[test]
fn test_largest_eigenpairs_of_diagonal_operator() -> Result<()> {
    let n = 100;
    let a = diag_problem(n);
    let mut cfg = SolverConfig::new(n, 4);
    cfg.tolerance = 1e-9;
    cfg.seed = Some(42);

    let report = solve(&a, &cfg)?;
    ensure!(report.status == TerminationStatus::Converged);
    ensure!(report.nconv == 4);
    ensure!(report.eigenvalues.len() == 4);

    for (i, expected) in [100.0, 99.0, 98.0, 97.0].iter().enumerate() {
        ensure!(
            (report.eigenvalues[i] - expected).abs() < GROUND_TRUTH_TOLERANCE,
            "eigenvalue {i}: expected {expected}, got {}",
            report.eigenvalues[i]
        );
        let x = report.eigenvectors.as_ref().subcols(i, 1);
        let res = true_relative_residual(a.as_ref(), report.eigenvalues[i], x);
        ensure!(
            res < 1e-7,
            "pair {i}: true residual {res} inconsistent with convergence claim"
        );
    }
    Ok(())
}

#[test]
fn test_smallest_eigenpairs_of_diagonal_operator() -> Result<()> {
    let n = 80;
    let a = diag_problem(n);
    let mut cfg = SolverConfig::new(n, 3);
    cfg.target = SpectrumTarget::Smallest;
    cfg.tolerance = 1e-9;
    cfg.seed = Some(17);

    let report = solve(&a, &cfg)?;
    ensure!(report.status == TerminationStatus::Converged);
    for (i, expected) in [1.0, 2.0, 3.0].iter().enumerate() {
        ensure!((report.eigenvalues[i] - expected).abs() < GROUND_TRUTH_TOLERANCE);
    }
    Ok(())
}

#[test]
fn test_largest_magnitude_with_indefinite_spectrum() -> Result<()> {
    // Mixed-sign spectrum: the largest-magnitude pairs are -90 and 75, not the
    // algebraically largest ones.
    let mut entries: Vec<f64> = (1..=60).map(|i| i as f64).collect();
    entries[0] = -90.0;
    entries[1] = 75.0;
    let a = diag_from(&entries);

    let mut cfg = SolverConfig::new(60, 2);
    cfg.target = SpectrumTarget::LargestMagnitude;
    cfg.tolerance = 1e-9;
    cfg.seed = Some(8);

    let report = solve(&a, &cfg)?;
    ensure!(report.status == TerminationStatus::Converged);
    ensure!((report.eigenvalues[0] - (-90.0)).abs() < GROUND_TRUTH_TOLERANCE);
    ensure!((report.eigenvalues[1] - 75.0).abs() < GROUND_TRUTH_TOLERANCE);
    Ok(())
}

#[test]
fn test_small_problem_converges_without_restarting() -> Result<()> {
    // diag(1..10) with 3 requested pairs fits entirely in one cycle: the basis
    // capacity is dimension-capped at 10, and a 9-column Krylov space of a
    // 10-dimensional diagonal operator resolves the top three pairs exactly.
    let a = diag_problem(10);
    let mut cfg = SolverConfig::new(10, 3);
    cfg.tolerance = 1e-8;
    cfg.seed = Some(1);

    let report = solve(&a, &cfg)?;
    ensure!(report.status == TerminationStatus::Converged);
    ensure!(
        report.restarts <= 1,
        "expected at most one restart, got {}",
        report.restarts
    );
    for (i, expected) in [10.0, 9.0, 8.0].iter().enumerate() {
        ensure!((report.eigenvalues[i] - expected).abs() < 1e-7);
    }
    Ok(())
}

#[test]
fn test_block_iteration_resolves_clustered_pairs() -> Result<()> {
    // A tight cluster at the top of the spectrum; a block of 2 converges both
    // members of the cluster together.
    let mut entries: Vec<f64> = (1..=70).map(|i| i as f64).collect();
    entries[69] = 70.0;
    entries[68] = 69.999;
    let a = diag_from(&entries);

    let mut cfg = SolverConfig::new(70, 2);
    cfg.block_size = 2;
    cfg.tolerance = 1e-9;
    cfg.seed = Some(23);

    let report = solve(&a, &cfg)?;
    ensure!(report.status == TerminationStatus::Converged);
    ensure!((report.eigenvalues[0] - 70.0).abs() < 1e-5);
    ensure!((report.eigenvalues[1] - 69.999).abs() < 1e-5);
    for i in 0..2 {
        let x = report.eigenvectors.as_ref().subcols(i, 1);
        let res = true_relative_residual(a.as_ref(), report.eigenvalues[i], x);
        ensure!(res < 1e-6);
    }
    Ok(())
}

#[test]
fn test_oversized_block_is_rejected() -> Result<()> {
    let a = diag_problem(50);
    let mut cfg = SolverConfig::new(50, 3);
    cfg.block_size = 4;
    let err = solve(&a, &cfg).unwrap_err();
    ensure!(err.is_invalid_configuration());
    Ok(())
}

#[test]
fn test_minimum_dimension_is_rejected_before_dispatch() -> Result<()> {
    // At n == 2 * block_size the basis fills after one step and a restart
    // cannot retain any Ritz column, so no operator could ever converge.
    // The configuration is rejected up front instead of burning the whole
    // restart budget without progress.
    let a = diag_from(&[1.0, 2.0]);
    let cfg = SolverConfig::new(2, 1);
    let err = solve(&a, &cfg).unwrap_err();
    ensure!(err.is_invalid_configuration());
    Ok(())
}

#[test]
fn test_undersized_device_pool_reports_exhaustion() -> Result<()> {
    let a = diag_problem(50);
    let mut cfg = SolverConfig::new(50, 3);
    cfg.device_capacity = Some(256);
    let err = solve(&a, &cfg).unwrap_err();
    ensure!(err.is_resource_exhaustion());
    Ok(())
}

#[test]
fn test_zero_operator_exhausts_restart_budget() -> Result<()> {
    // An operator that maps everything to zero produces no usable Krylov
    // directions; every expansion falls back to random replacement columns and
    // nothing can ever converge. The solve must cycle through its restart
    // budget and end gracefully, not hang or abort.
    let n = 24;
    let zero = OpFn::new(n, |_x: MatRef<'_, f64>, mut y: MatMut<'_, f64>| {
        y.fill(0.0);
    });
    let mut cfg = SolverConfig::new(n, 2);
    cfg.max_restarts = 5;
    cfg.seed = Some(31);

    let report = solve(&zero, &cfg)?;
    ensure!(report.status == TerminationStatus::Exhausted);
    ensure!(report.restarts == 5);
    ensure!(report.nconv == 0);
    Ok(())
}

#[test]
fn test_fixed_seed_is_reproducible() -> Result<()> {
    let a = diag_problem(64);
    let mut cfg = SolverConfig::new(64, 3);
    cfg.tolerance = 1e-9;
    cfg.seed = Some(777);

    let first = solve(&a, &cfg)?;
    let second = solve(&a, &cfg)?;
    ensure!(first.eigenvalues == second.eigenvalues);
    ensure!(first.residuals == second.residuals);
    ensure!(first.matvecs == second.matvecs);
    ensure!(first.restarts == second.restarts);
    Ok(())
}

#[test]
fn test_warm_start_on_exact_eigenvector() -> Result<()> {
    let n = 40;
    let a = diag_problem(n);
    let mut cfg = SolverConfig::new(n, 1);
    cfg.tolerance = 1e-10;
    cfg.seed = Some(4);

    let start = Mat::from_fn(n, 1, |i, _| if i == n - 1 { 1.0 } else { 0.0 });
    let report = solve_with_start(&a, &cfg, Some(start.as_ref()))?;
    ensure!(report.status == TerminationStatus::Converged);
    ensure!((report.eigenvalues[0] - 40.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_linear_chebyshev_filter_is_transparent() -> Result<()> {
    // With coefficients {(a+b)/2, (b-a)/2} the filter polynomial is the
    // identity, so solving the filtered operator must reproduce the base
    // operator's eigenpairs exactly.
    let n = 50;
    let a = diag_problem(n);
    let (lo, hi) = (0.0, 51.0);
    let coeffs = [0.5 * (lo + hi), 0.5 * (hi - lo)];
    let filtered = ChebyshevFilter::new(&a, &coeffs, (lo, hi));

    let mut cfg = SolverConfig::new(n, 2);
    cfg.tolerance = 1e-9;
    cfg.seed = Some(12);

    let report = solve(&filtered, &cfg)?;
    ensure!(report.status == TerminationStatus::Converged);
    ensure!((report.eigenvalues[0] - 50.0).abs() < GROUND_TRUTH_TOLERANCE);
    ensure!((report.eigenvalues[1] - 49.0).abs() < GROUND_TRUTH_TOLERANCE);
    // The filter costs one base product per coefficient beyond the first.
    ensure!(report.matvecs > 0);
    Ok(())
}

#[test]
fn test_chebyshev_filter_reports_polynomial_values() -> Result<()> {
    // For a diagonal base operator the filtered eigenvalues are p(λ_i)
    // entrywise, so the reported values can be checked against the polynomial
    // evaluated directly.
    let n = 30;
    let a = diag_problem(n);
    let (lo, hi) = (0.0, 31.0);
    let coeffs = [0.2, 0.9, 0.4];
    let filtered = ChebyshevFilter::new(&a, &coeffs, (lo, hi));

    let p = |lambda: f64| {
        let t = (2.0 * lambda - (lo + hi)) / (hi - lo);
        coeffs[0] + coeffs[1] * t + coeffs[2] * (2.0 * t * t - 1.0)
    };
    let mut filtered_values: Vec<f64> = (1..=n).map(|i| p(i as f64)).collect();
    filtered_values.sort_by(|x, y| y.partial_cmp(x).unwrap());

    let mut cfg = SolverConfig::new(n, 2);
    cfg.tolerance = 1e-9;
    cfg.seed = Some(6);

    let report = solve(&filtered, &cfg)?;
    ensure!(report.status == TerminationStatus::Converged);
    ensure!((report.eigenvalues[0] - filtered_values[0]).abs() < GROUND_TRUTH_TOLERANCE);
    ensure!((report.eigenvalues[1] - filtered_values[1]).abs() < GROUND_TRUTH_TOLERANCE);
    Ok(())
}
