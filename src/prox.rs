use core::fmt;
use std::time::{Duration, Instant};

use crate::jacobian::Jacobian;
use crate::report::{
    emit_line, Diagnostic, IterationReport, ProxStats, ProxStatus, Reporter, StdoutReporter,
};
use crate::state::Scratch;

/// Factorization used for the regularized system `(A A^T + alpha I) s = -g`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxMethod {
    /// Cholesky of the Gram matrix `A A^T + alpha I`.
    #[default]
    Cholesky,
    /// QR of the augmented matrix `[A^T; sqrt(alpha) I]`.
    Qr,
}

/// Options controlling a prox evaluation.
#[derive(Debug, Clone)]
pub struct ProxOptions {
    /// Maximum number of Newton refactorizations.
    pub max_iters: usize,
    /// Converge when `| ||s|| - lambda * sigma | <= tol`, never tighter than 4 ulps of the radius.
    pub tol: f64,
    pub method: ProxMethod,
    /// One step of iterative refinement after each QR solve.
    pub refine: bool,
    /// Regularization used after a singular Gram matrix; defaults to `||g|| / (lambda * sigma)`.
    pub initial_regularization: Option<f64>,
    /// Emit the iteration table and timing to stdout by default.
    pub verbose: bool,
}

impl Default for ProxOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            tol: 1e-16,
            method: ProxMethod::Cholesky,
            refine: true,
            initial_regularization: None,
            verbose: false,
        }
    }
}

/// Errors from a prox or value evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxError {
    /// The penalty has no base point; shift it first.
    NotShifted,
    /// An input vector has the wrong length.
    DimensionMismatch { expected: usize, actual: usize },
    /// sigma must be positive and finite.
    InvalidStepSize { sigma: f64 },
    /// A, b or q holds a NaN or infinite entry.
    NonFiniteInput,
    /// The regularized system could not be factorized.
    Factorization { method: ProxMethod, alpha: f64 },
}

impl fmt::Display for ProxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotShifted => write!(f, "prox requires a shifted penalty"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "vector length {actual} does not match expected {expected}")
            }
            Self::InvalidStepSize { sigma } => {
                write!(f, "step size must be positive and finite (got {sigma})")
            }
            Self::NonFiniteInput => write!(f, "non-finite entry in jacobian, constraint or q"),
            Self::Factorization { method, alpha } => {
                write!(f, "{method:?} factorization failed at alpha = {alpha:e}")
            }
        }
    }
}

impl std::error::Error for ProxError {}

/// The factorization found `A A^T + alpha I` singular.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Singular;

/// Solves `(A A^T + alpha I) sol = rhs` using `scratch.rhs` and `scratch.sol`.
///
/// Returns `||L^{-1} sol||`, where `L L^T = A A^T + alpha I`.
pub(crate) trait RegularizedSolve {
    fn solve(&mut self, jac: &Jacobian, alpha: f64, scratch: &mut Scratch) -> Result<f64, Singular>;
}

pub(crate) enum ReporterSlot<'a> {
    External(&'a mut dyn Reporter),
    Local(StdoutReporter),
    None,
}

impl<'a> ReporterSlot<'a> {
    pub(crate) fn new(reporter: Option<&'a mut dyn Reporter>, verbose: bool) -> Self {
        match reporter {
            Some(r) => Self::External(r),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    fn as_mut(&mut self) -> Option<&mut dyn Reporter> {
        match self {
            Self::External(r) => Some(*r),
            Self::Local(r) => Some(r),
            Self::None => None,
        }
    }

    fn iteration(&mut self, report: &IterationReport) {
        if let Some(reporter) = self.as_mut() {
            reporter.on_iteration(report);
        }
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        log::warn!("{diagnostic}");
        if let Some(reporter) = self.as_mut() {
            reporter.on_diagnostic(diagnostic);
        }
    }
}

/// Newton step on the secular equation `1/||s(alpha)|| = 1/radius`.
pub(crate) fn secular_step(step_norm: f64, w_norm: f64, radius: f64) -> f64 {
    let ratio = step_norm / w_norm;
    ratio * ratio * (step_norm - radius) / radius
}

/// Smallest alpha used once A A^T is known to be singular.
fn regularization_floor(jac: &Jacobian) -> f64 {
    let scale = jac.frobenius_norm_sq() / jac.nrows().max(1) as f64;
    f64::EPSILON.sqrt() * scale.max(1.0)
}

/// Finds alpha >= 0 such that `s = -(A A^T + alpha I)^{-1} g` is interior or has norm `radius`.
///
/// Expects `scratch.g` to hold `g = A q + b`; leaves the correction in `scratch.sol`.
pub(crate) fn radius_search<S: RegularizedSolve>(
    solver: &mut S,
    jac: &Jacobian,
    scratch: &mut Scratch,
    radius: f64,
    options: &ProxOptions,
    reporter: &mut ReporterSlot<'_>,
) -> Result<ProxStats, ProxError> {
    for (rhs, g) in scratch.rhs.iter_mut().zip(&scratch.g) {
        *rhs = -g;
    }
    let g_norm = l2_norm(&scratch.g);
    let mut stats = ProxStats {
        status: ProxStatus::Interior,
        iterations: 0,
        alpha: 0.0,
        step_norm: 0.0,
        radius,
        rank_deficient: false,
    };
    if g_norm == 0.0 {
        scratch.sol.fill(0.0);
        return Ok(stats);
    }

    let factorization = |alpha| ProxError::Factorization {
        method: options.method,
        alpha,
    };

    let mut alpha = 0.0;
    let mut floor = 0.0;
    let mut w_norm = match solver.solve(jac, alpha, scratch) {
        Ok(w_norm) => w_norm,
        Err(Singular) => {
            stats.rank_deficient = true;
            floor = regularization_floor(jac);
            alpha = options
                .initial_regularization
                .unwrap_or(g_norm / radius)
                .max(floor);
            reporter.diagnostic(&Diagnostic::RankDeficient { alpha });
            solver
                .solve(jac, alpha, scratch)
                .map_err(|_| factorization(alpha))?
        }
    };
    let mut step_norm = l2_norm(&scratch.sol);

    if !stats.rank_deficient && step_norm <= radius {
        stats.step_norm = step_norm;
        return Ok(stats);
    }

    // A gap below a few ulps of the radius is rounding, whatever `tol` asks for.
    let tol = options.tol.max(4.0 * f64::EPSILON * radius);
    let mut iterations = 0;
    let status = loop {
        let gap = step_norm - radius;
        if gap.abs() <= tol {
            break ProxStatus::Boundary;
        }
        if alpha <= floor && step_norm <= radius {
            break ProxStatus::Interior;
        }
        if iterations >= options.max_iters {
            reporter.diagnostic(&Diagnostic::MaxIterations { iterations, gap });
            break ProxStatus::MaxIterations;
        }

        let next = (alpha + secular_step(step_norm, w_norm, radius)).max(floor);
        reporter.iteration(&IterationReport {
            iteration: iterations,
            alpha,
            step_norm,
            radius,
            alpha_step: next - alpha,
        });
        if (next - alpha).abs() <= f64::EPSILON * alpha || !next.is_finite() {
            log::debug!("radius search stalled at alpha = {alpha:e}, gap = {gap:e}");
            break ProxStatus::Stalled;
        }

        alpha = next;
        w_norm = solver
            .solve(jac, alpha, scratch)
            .map_err(|_| factorization(alpha))?;
        step_norm = l2_norm(&scratch.sol);
        iterations += 1;
    };

    stats.status = status;
    stats.iterations = iterations;
    stats.alpha = alpha;
    stats.step_norm = step_norm;
    Ok(stats)
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

pub(crate) fn l2_norm(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.3} us", secs * 1e6)
    } else {
        format!("{:.0} ns", secs * 1e9)
    }
}

pub(crate) fn finish_stats(
    stats: ProxStats,
    start_time: Option<Instant>,
    reporter: &mut ReporterSlot<'_>,
) -> ProxStats {
    if let Some(reporter) = reporter.as_mut() {
        reporter.on_finish();
    }
    if let Some(start) = start_time {
        let elapsed = format_duration(start.elapsed());
        emit_line(&format!(
            "prox: {:?} after {} iterations, alpha = {:.3e}, time: {elapsed}",
            stats.status, stats.iterations, stats.alpha
        ));
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Diagonal A with closed-form solves, so the loop can be checked in isolation.
    struct Diagonal {
        d: Vec<f64>,
        singular_at_zero: bool,
    }

    impl RegularizedSolve for Diagonal {
        fn solve(&mut self, _jac: &Jacobian, alpha: f64, scratch: &mut Scratch) -> Result<f64, Singular> {
            if alpha == 0.0 && self.singular_at_zero {
                return Err(Singular);
            }
            let mut w_sq = 0.0;
            for (i, &d) in self.d.iter().enumerate() {
                let c = d * d + alpha;
                scratch.sol[i] = scratch.rhs[i] / c;
                w_sq += scratch.sol[i] * scratch.sol[i] / c;
            }
            Ok(w_sq.sqrt())
        }
    }

    /// Reports an unbounded `||w||`, so every Newton step is zero.
    struct Flat;

    impl RegularizedSolve for Flat {
        fn solve(&mut self, _jac: &Jacobian, _alpha: f64, scratch: &mut Scratch) -> Result<f64, Singular> {
            scratch.sol.copy_from_slice(&scratch.rhs);
            Ok(f64::INFINITY)
        }
    }

    fn run(
        d: Vec<f64>,
        g: &[f64],
        radius: f64,
        singular_at_zero: bool,
        options: &ProxOptions,
    ) -> (ProxStats, Vec<f64>) {
        let m = d.len();
        let mut row_major = vec![0.0; m * m];
        for (i, &di) in d.iter().enumerate() {
            row_major[i * m + i] = di;
        }
        let jac = Jacobian::from_dense(m, m, &row_major).unwrap();
        let mut scratch = Scratch::new(m, m);
        scratch.g.copy_from_slice(g);
        let mut solver = Diagonal {
            d,
            singular_at_zero,
        };
        let mut reporter = ReporterSlot::None;
        let stats =
            radius_search(&mut solver, &jac, &mut scratch, radius, options, &mut reporter).unwrap();
        (stats, scratch.sol.clone())
    }

    #[test]
    fn secular_step_is_exact_for_identity() {
        // s(alpha) = -g / (1 + alpha), so one step from alpha = 0 lands on the root.
        let step = secular_step(2.0, 2.0, 1.0);
        assert_eq!(step, 1.0);
    }

    #[test]
    fn interior_returns_without_iterations() {
        let (stats, sol) = run(vec![1.0, 1.0], &[0.2, 0.0], 1.0, false, &ProxOptions::default());
        assert_eq!(stats.status, ProxStatus::Interior);
        assert_eq!(stats.iterations, 0);
        assert_eq!(sol, vec![-0.2, 0.0]);
    }

    #[test]
    fn boundary_converges_to_radius() {
        let options = ProxOptions {
            tol: 1e-12,
            ..ProxOptions::default()
        };
        let (stats, sol) = run(vec![1.0, 3.0], &[2.0, 6.0], 1.0, false, &options);
        assert_eq!(stats.status, ProxStatus::Boundary);
        assert!((l2_norm(&sol) - 1.0).abs() <= 1e-12);
        assert!(stats.alpha > 0.0);
    }

    #[test]
    fn zero_gradient_is_interior() {
        let (stats, sol) = run(vec![1.0], &[0.0], 1.0, true, &ProxOptions::default());
        assert_eq!(stats.status, ProxStatus::Interior);
        assert!(!stats.rank_deficient);
        assert_eq!(sol, vec![0.0]);
    }

    #[test]
    fn singular_start_recovers_from_the_right() {
        let options = ProxOptions {
            tol: 1e-12,
            ..ProxOptions::default()
        };
        let (stats, sol) = run(vec![1.0, 0.0], &[3.0, 0.0], 1.0, true, &options);
        assert!(stats.rank_deficient);
        assert_eq!(stats.status, ProxStatus::Boundary);
        assert!((l2_norm(&sol) - 1.0).abs() <= 1e-12);
    }

    #[test]
    fn singular_interior_stops_at_floor() {
        let (stats, sol) = run(vec![1.0, 0.0], &[0.5, 0.0], 1.0, true, &ProxOptions::default());
        assert!(stats.rank_deficient);
        assert_eq!(stats.status, ProxStatus::Interior);
        assert!((sol[0] + 0.5).abs() <= 1e-6);
    }

    #[test]
    fn zero_newton_step_stalls() {
        let jac = Jacobian::from_dense(1, 1, &[1.0]).unwrap();
        let mut scratch = Scratch::new(1, 1);
        scratch.g[0] = 3.0;
        let mut reporter = ReporterSlot::None;
        let options = ProxOptions::default();
        let stats =
            radius_search(&mut Flat, &jac, &mut scratch, 1.0, &options, &mut reporter).unwrap();
        assert_eq!(stats.status, ProxStatus::Stalled);
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.alpha, 0.0);
        assert_eq!(stats.step_norm, 3.0);
    }

    #[test]
    fn rounding_level_gap_counts_as_converged() {
        // Default tol is below one ulp of a radius of 3.
        let (stats, sol) = run(vec![1.0, 2.0], &[40.0, -30.0], 3.0, false, &ProxOptions::default());
        assert!(
            matches!(stats.status, ProxStatus::Boundary | ProxStatus::Stalled),
            "{stats:?}"
        );
        assert!(stats.iterations < 20);
        assert!((l2_norm(&sol) - 3.0).abs() <= 1e-13);
    }
}
