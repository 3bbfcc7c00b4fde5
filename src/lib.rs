//! Proximal operator of a shifted, linearized composite l2-norm penalty.
//!
//! For a constraint map `c(x)` with Jacobian `J(x)`, a trust-region or
//! proximal-gradient method linearized at `xk` needs
//!
//! ```text
//! y = argmin_y ||y - q||^2 / (2 sigma) + lambda * ||c(xk) + J(xk) y||_2
//! ```
//!
//! With `A = J(xk)`, `b = c(xk)` and `g = A q + b`, the solution is
//! `y = q + A^T s` where `(A A^T + alpha I) s = -g` and `alpha >= 0` is the
//! multiplier that keeps `||s|| <= lambda * sigma`.
//!
//! How it works (high level):
//! - Try `alpha = 0`; if `||s||` already fits the radius, done.
//! - Otherwise run Newton on the secular equation `1/||s(alpha)|| = 1/radius`.
//! - A singular `A A^T` (rank-deficient Jacobian) restarts regularized, with a warning.
//! - The system is solved by Cholesky of the Gram matrix, or by QR of
//!   `[A^T; sqrt(alpha) I]` with iterative refinement.
//!
//! Calling it:
//! - Describe the Jacobian sparsity with a `JacobianPattern` (or use a dense one).
//! - Implement `Constraint` (or wrap two closures in `FnConstraint`).
//! - Build a `CompositeNormL2`, `shift` it to `xk`, call `prox`.
//!
//! Example:
//! ```rust,no_run
//! use shifted_l2_prox::{CompositeNormL2, FnConstraint, Jacobian, JacobianValuesMut, ProxOptions};
//!
//! // c(x) = x0^2 + x1 - 1
//! let constraint = FnConstraint::new(
//!     |x: &[f64], out: &mut [f64]| out[0] = x[0] * x[0] + x[1] - 1.0,
//!     |x: &[f64], jac: &mut JacobianValuesMut<'_>| {
//!         jac.values_of_col_mut(0)[0] = 2.0 * x[0];
//!         jac.values_of_col_mut(1)[0] = 1.0;
//!     },
//! );
//! let jac = Jacobian::from_dense(1, 2, &[0.0, 0.0]).unwrap();
//! let psi = CompositeNormL2::new(1.0, constraint, jac, vec![0.0]).unwrap();
//! let mut shifted = psi.shift(&[1.0, 1.0]).unwrap();
//!
//! let mut y = vec![0.0; 2];
//! let stats = shifted
//!     .prox(&[0.5, -0.5], 1.0, &mut y, &ProxOptions::default(), None)
//!     .unwrap();
//! assert!(stats.step_norm.is_finite());
//! ```

mod cholesky;
mod constraint;
mod jacobian;
mod penalty;
mod prox;
mod qr;
mod report;
mod state;

pub use constraint::{Constraint, FnConstraint};
pub use jacobian::{Jacobian, JacobianPattern, JacobianValuesMut, PatternError};
pub use penalty::{CompositeNormL2, ConstructionError};
pub use prox::{ProxError, ProxMethod, ProxOptions};
pub use report::{Diagnostic, IterationReport, ProxStats, ProxStatus, Reporter, StdoutReporter};
