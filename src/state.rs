use crate::cholesky::CholeskySolver;
use crate::constraint::Constraint;
use crate::jacobian::Jacobian;
use crate::penalty::ConstructionError;
use crate::prox::{radius_search, ProxError, ProxMethod, ProxOptions, ReporterSlot};
use crate::qr::QrSolver;
use crate::report::ProxStats;

/// Buffers reused across prox calls. Contents carry no meaning between calls.
#[derive(Debug, Clone)]
pub(crate) struct Scratch {
    /// g = A q + b.
    pub(crate) g: Vec<f64>,
    /// Right-hand side of the regularized system.
    pub(crate) rhs: Vec<f64>,
    /// Current correction s.
    pub(crate) sol: Vec<f64>,
    /// Residual of the regularized system.
    pub(crate) res: Vec<f64>,
    /// Refinement correction.
    pub(crate) dsol: Vec<f64>,
    /// A^T s, length n.
    pub(crate) at_s: Vec<f64>,
}

impl Scratch {
    pub(crate) fn new(m: usize, n: usize) -> Self {
        Self {
            g: vec![0.0; m],
            rhs: vec![0.0; m],
            sol: vec![0.0; m],
            res: vec![0.0; m],
            dsol: vec![0.0; m],
            at_s: vec![0.0; n],
        }
    }
}

pub(crate) enum Backend {
    Cholesky(CholeskySolver),
    Qr(QrSolver),
}

impl Backend {
    fn new(jac: &Jacobian, method: ProxMethod) -> Self {
        log::debug!(
            "building {method:?} backend for a {}x{} jacobian",
            jac.nrows(),
            jac.ncols()
        );
        match method {
            ProxMethod::Cholesky => Self::Cholesky(CholeskySolver::new(jac)),
            ProxMethod::Qr => Self::Qr(QrSolver::new(jac)),
        }
    }

    fn method(&self) -> ProxMethod {
        match self {
            Self::Cholesky(_) => ProxMethod::Cholesky,
            Self::Qr(_) => ProxMethod::Qr,
        }
    }
}

/// Linearized constraint `b + A t` at one base point, with its working memory.
pub(crate) struct ConstraintState {
    jacobian: Jacobian,
    b: Vec<f64>,
    scratch: Scratch,
    backend: Option<Backend>,
}

impl ConstraintState {
    pub(crate) fn new(jacobian: Jacobian, b: Vec<f64>) -> Result<Self, ConstructionError> {
        if b.len() != jacobian.nrows() {
            return Err(ConstructionError::DimensionMismatch {
                rows: jacobian.nrows(),
                b_len: b.len(),
            });
        }
        let scratch = Scratch::new(jacobian.nrows(), jacobian.ncols());
        Ok(Self {
            jacobian,
            b,
            scratch,
            backend: None,
        })
    }

    /// Fresh state of the same shape with c and J evaluated at `xk`.
    pub(crate) fn evaluated_at<C: Constraint + ?Sized>(&self, constraint: &C, xk: &[f64]) -> Self {
        let mut jacobian = self.jacobian.zeros_like();
        let mut b = vec![0.0; self.b.len()];
        constraint.value_and_jacobian(xk, &mut b, &mut jacobian.values_mut());
        Self {
            jacobian,
            b,
            scratch: Scratch::new(self.b.len(), xk.len()),
            backend: None,
        }
    }

    pub(crate) fn jacobian(&self) -> &Jacobian {
        &self.jacobian
    }

    pub(crate) fn b(&self) -> &[f64] {
        &self.b
    }

    /// y = q + A^T s for the radius-matched correction s.
    pub(crate) fn prox(
        &mut self,
        q: &[f64],
        radius: f64,
        y: &mut [f64],
        options: &ProxOptions,
        reporter: &mut ReporterSlot<'_>,
    ) -> Result<ProxStats, ProxError> {
        let Self {
            jacobian,
            b,
            scratch,
            backend,
        } = self;
        if !jacobian.is_finite()
            || !b.iter().all(|v| v.is_finite())
            || !q.iter().all(|v| v.is_finite())
        {
            return Err(ProxError::NonFiniteInput);
        }

        jacobian.mul_add(q, b, &mut scratch.g);

        let backend = match backend.take() {
            Some(existing) if existing.method() == options.method => backend.insert(existing),
            _ => backend.insert(Backend::new(jacobian, options.method)),
        };
        let stats = match backend {
            Backend::Cholesky(solver) => {
                radius_search(solver, jacobian, scratch, radius, options, reporter)?
            }
            Backend::Qr(solver) => {
                solver.set_refine(options.refine);
                radius_search(solver, jacobian, scratch, radius, options, reporter)?
            }
        };

        jacobian.mul_transpose(&scratch.sol, &mut scratch.at_s);
        for ((y, q), step) in y.iter_mut().zip(q).zip(&scratch.at_s) {
            *y = q + step;
        }
        Ok(stats)
    }
}
