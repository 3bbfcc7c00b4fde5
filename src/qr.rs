use faer::linalg::solvers::Qr;
use faer::Mat;

use crate::jacobian::Jacobian;
use crate::prox::{l2_norm, RegularizedSolve, Singular};
use crate::state::Scratch;

/// QR solver: factors `[A^T; sqrt(alpha) I]`, whose R satisfies `R^T R = A A^T + alpha I`.
///
/// Avoids forming the Gram matrix, so the condition number is not squared.
pub(crate) struct QrSolver {
    augmented: Mat<f64>,
    refine: bool,
}

impl QrSolver {
    pub(crate) fn new(jac: &Jacobian) -> Self {
        let m = jac.nrows();
        Self {
            augmented: Mat::zeros(jac.ncols() + m, m),
            refine: true,
        }
    }

    pub(crate) fn set_refine(&mut self, refine: bool) {
        self.refine = refine;
    }

    fn assemble(&mut self, jac: &Jacobian, alpha: f64) {
        let m = jac.nrows();
        let n = jac.ncols();
        for j in 0..m {
            for i in 0..n + m {
                self.augmented[(i, j)] = 0.0;
            }
        }
        let pattern = jac.pattern();
        for col in 0..n {
            for idx in pattern.col_range(col) {
                self.augmented[(col, pattern.row_indices()[idx])] = jac.values()[idx];
            }
        }
        let diag = alpha.sqrt();
        for i in 0..m {
            self.augmented[(n + i, i)] = diag;
        }
    }
}

/// Solves R^T x = b in place (the transposed application).
fn solve_transposed(r: &Mat<f64>, x: &mut [f64]) {
    for i in 0..x.len() {
        let mut v = x[i];
        for k in 0..i {
            v -= r[(k, i)] * x[k];
        }
        x[i] = v / r[(i, i)];
    }
}

/// Solves R x = b in place.
fn solve_upper(r: &Mat<f64>, x: &mut [f64]) {
    for i in (0..x.len()).rev() {
        let mut v = x[i];
        for k in i + 1..x.len() {
            v -= r[(i, k)] * x[k];
        }
        x[i] = v / r[(i, i)];
    }
}

fn is_singular(r: &Mat<f64>) -> bool {
    let m = r.ncols();
    let largest = (0..m).map(|i| r[(i, i)].abs()).fold(0.0, f64::max);
    let threshold = largest * m as f64 * f64::EPSILON;
    largest == 0.0 || (0..m).any(|i| r[(i, i)].abs() <= threshold)
}

impl RegularizedSolve for QrSolver {
    fn solve(&mut self, jac: &Jacobian, alpha: f64, scratch: &mut Scratch) -> Result<f64, Singular> {
        self.assemble(jac, alpha);
        let qr = Qr::new(self.augmented.as_ref());
        let r = qr.thin_R().to_owned();
        if is_singular(&r) {
            return Err(Singular);
        }

        scratch.sol.copy_from_slice(&scratch.rhs);
        solve_transposed(&r, &mut scratch.sol);
        solve_upper(&r, &mut scratch.sol);

        if self.refine {
            // res = rhs - (A A^T + alpha I) sol
            jac.mul_transpose(&scratch.sol, &mut scratch.at_s);
            jac.mul(&scratch.at_s, &mut scratch.res);
            for ((res, rhs), sol) in scratch.res.iter_mut().zip(&scratch.rhs).zip(&scratch.sol) {
                *res = rhs - *res - alpha * sol;
            }
            let tol = f64::EPSILON.powf(0.75) * l2_norm(&scratch.rhs).max(1.0);
            if l2_norm(&scratch.res) > tol {
                scratch.dsol.copy_from_slice(&scratch.res);
                solve_transposed(&r, &mut scratch.dsol);
                solve_upper(&r, &mut scratch.dsol);
                for (sol, d) in scratch.sol.iter_mut().zip(&scratch.dsol) {
                    *sol += d;
                }
            }
        }

        // w = R^{-T} sol
        scratch.dsol.copy_from_slice(&scratch.sol);
        solve_transposed(&r, &mut scratch.dsol);
        Ok(l2_norm(&scratch.dsol))
    }
}
