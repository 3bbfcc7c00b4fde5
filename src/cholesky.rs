use faer::linalg::solvers::{Llt, Solve};
use faer::{Mat, MatRef, Side};

use crate::jacobian::Jacobian;
use crate::prox::{RegularizedSolve, Singular};
use crate::state::Scratch;

/// Normal-equations solver: Cholesky of `A A^T + alpha I`.
///
/// The Gram matrix is formed once per state; each solve refactors the shifted copy.
pub(crate) struct CholeskySolver {
    gram: Mat<f64>,
    shifted: Mat<f64>,
    column: Mat<f64>,
}

impl CholeskySolver {
    pub(crate) fn new(jac: &Jacobian) -> Self {
        let m = jac.nrows();
        Self {
            gram: gram(jac),
            shifted: Mat::zeros(m, m),
            column: Mat::zeros(m, 1),
        }
    }
}

/// Dense `A A^T` accumulated column by column from the sparse pattern.
fn gram(jac: &Jacobian) -> Mat<f64> {
    let m = jac.nrows();
    let pattern = jac.pattern();
    let mut gram = Mat::<f64>::zeros(m, m);
    for col in 0..jac.ncols() {
        let range = pattern.col_range(col);
        let rows = &pattern.row_indices()[range.clone()];
        let values = &jac.values()[range];
        // Rows are sorted, so (i, k) with k <= i fills the lower triangle.
        for (a, (&i, &vi)) in rows.iter().zip(values).enumerate() {
            for (&k, &vk) in rows[..=a].iter().zip(&values[..=a]) {
                gram[(i, k)] += vi * vk;
            }
        }
    }
    for j in 0..m {
        for i in j + 1..m {
            gram[(j, i)] = gram[(i, j)];
        }
    }
    gram
}

/// Rounding leaves duplicated rows with a tiny positive pivot instead of a zero one.
/// Flags `l_ii^2 <= 4 m eps max_j l_jj^2`; elimination noise on a pivot is a few eps.
fn has_tiny_pivot(l: MatRef<'_, f64>, m: usize) -> bool {
    let pivot = |i: usize| l[(i, i)] * l[(i, i)];
    let largest = (0..m).map(pivot).fold(0.0, f64::max);
    let threshold = largest * 4.0 * m as f64 * f64::EPSILON;
    largest == 0.0 || (0..m).any(|i| pivot(i) <= threshold)
}

impl RegularizedSolve for CholeskySolver {
    fn solve(&mut self, _jac: &Jacobian, alpha: f64, scratch: &mut Scratch) -> Result<f64, Singular> {
        let m = self.gram.nrows();
        for j in 0..m {
            for i in 0..m {
                self.shifted[(i, j)] = self.gram[(i, j)];
            }
            self.shifted[(j, j)] += alpha;
        }
        let llt = Llt::new(self.shifted.as_ref(), Side::Lower).map_err(|_| Singular)?;
        if has_tiny_pivot(llt.L(), m) {
            return Err(Singular);
        }

        for i in 0..m {
            self.column[(i, 0)] = scratch.rhs[i];
        }
        let sol = llt.solve(self.column.as_ref());
        for i in 0..m {
            scratch.sol[i] = sol[(i, 0)];
            self.column[(i, 0)] = sol[(i, 0)];
        }

        // ||L^{-1} s||^2 = s^T (L L^T)^{-1} s.
        let z = llt.solve(self.column.as_ref());
        let mut w_sq = 0.0;
        for i in 0..m {
            w_sq += scratch.sol[i] * z[(i, 0)];
        }
        Ok(w_sq.max(0.0).sqrt())
    }
}
