use core::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::constraint::Constraint;
use crate::jacobian::Jacobian;
use crate::prox::{finish_stats, l2_norm, ProxError, ProxOptions, ReporterSlot};
use crate::report::{ProxStats, Reporter};
use crate::state::ConstraintState;

/// Errors while building or shifting a penalty.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstructionError {
    /// b does not have one entry per Jacobian row.
    DimensionMismatch { rows: usize, b_len: usize },
    /// lambda must be positive and finite.
    InvalidWeight { lambda: f64 },
    /// The base point does not have one entry per Jacobian column.
    PointLength { expected: usize, actual: usize },
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { rows, b_len } => {
                write!(f, "b length {b_len} does not match jacobian rows {rows}")
            }
            Self::InvalidWeight { lambda } => {
                write!(f, "lambda must be positive and finite (got {lambda})")
            }
            Self::PointLength { expected, actual } => {
                write!(f, "xk length {actual} does not match expected {expected}")
            }
        }
    }
}

impl std::error::Error for ConstructionError {}

/// The penalty `lambda * ||c(x)||_2`, optionally linearized at a base point `xk`.
///
/// Unshifted, it only carries the weight, the constraint and buffers of the right
/// shape. Shifted, it represents `t -> lambda * ||c(xk) + J(xk) t||_2` and supports
/// [`CompositeNormL2::prox`]. Shifting never mutates: it returns a new penalty that
/// shares the weight, the constraint and the sparsity pattern.
pub struct CompositeNormL2<C> {
    lambda: f64,
    constraint: Arc<C>,
    state: ConstraintState,
    xk: Option<Vec<f64>>,
}

impl<C: Constraint> CompositeNormL2<C> {
    /// Unshifted penalty over externally supplied `A` and `b`.
    pub fn new(
        lambda: f64,
        constraint: C,
        jacobian: Jacobian,
        b: Vec<f64>,
    ) -> Result<Self, ConstructionError> {
        Self::with_shared(lambda, Arc::new(constraint), jacobian, b)
    }

    /// Like [`CompositeNormL2::new`] for a constraint already shared elsewhere.
    pub fn with_shared(
        lambda: f64,
        constraint: Arc<C>,
        jacobian: Jacobian,
        b: Vec<f64>,
    ) -> Result<Self, ConstructionError> {
        if !(lambda > 0.0 && lambda.is_finite()) {
            return Err(ConstructionError::InvalidWeight { lambda });
        }
        let state = ConstraintState::new(jacobian, b)?;
        Ok(Self {
            lambda,
            constraint,
            state,
            xk: None,
        })
    }

    /// Builds the penalty and shifts it to `xk` in one go.
    ///
    /// `jacobian` and `b` only provide the shape; their values are overwritten.
    pub fn shifted(
        lambda: f64,
        constraint: C,
        jacobian: Jacobian,
        b: Vec<f64>,
        xk: &[f64],
    ) -> Result<Self, ConstructionError> {
        Self::new(lambda, constraint, jacobian, b)?.shift(xk)
    }

    /// New penalty linearized at `xk`: c and J are evaluated into fresh buffers.
    pub fn shift(&self, xk: &[f64]) -> Result<Self, ConstructionError> {
        if xk.len() != self.ncols() {
            return Err(ConstructionError::PointLength {
                expected: self.ncols(),
                actual: xk.len(),
            });
        }
        Ok(Self {
            lambda: self.lambda,
            constraint: Arc::clone(&self.constraint),
            state: self.state.evaluated_at(self.constraint.as_ref(), xk),
            xk: Some(xk.to_vec()),
        })
    }

    /// Writes `argmin_y ||y - q||^2 / (2 sigma) + lambda * ||b + A y||_2` into `y`.
    ///
    /// Rank-deficient Jacobians and an exhausted iteration budget are reported as
    /// diagnostics (log warnings and [`Reporter::on_diagnostic`]), never as errors;
    /// `y` is still written. Check `ProxStats::status` for the quality of the result.
    pub fn prox(
        &mut self,
        q: &[f64],
        sigma: f64,
        y: &mut [f64],
        options: &ProxOptions,
        reporter: Option<&mut dyn Reporter>,
    ) -> Result<ProxStats, ProxError> {
        if self.xk.is_none() {
            return Err(ProxError::NotShifted);
        }
        let n = self.ncols();
        for len in [q.len(), y.len()] {
            if len != n {
                return Err(ProxError::DimensionMismatch {
                    expected: n,
                    actual: len,
                });
            }
        }
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(ProxError::InvalidStepSize { sigma });
        }

        let start_time = options.verbose.then(Instant::now);
        let mut reporter = ReporterSlot::new(reporter, options.verbose);
        let radius = self.lambda * sigma;
        let stats = self.state.prox(q, radius, y, options, &mut reporter)?;
        Ok(finish_stats(stats, start_time, &mut reporter))
    }
}

impl<C> CompositeNormL2<C> {
    /// `lambda * ||b + A y||_2`.
    pub fn value(&self, y: &[f64]) -> Result<f64, ProxError> {
        if self.xk.is_none() {
            return Err(ProxError::NotShifted);
        }
        if y.len() != self.ncols() {
            return Err(ProxError::DimensionMismatch {
                expected: self.ncols(),
                actual: y.len(),
            });
        }
        let mut out = vec![0.0; self.nrows()];
        self.state.jacobian().mul_add(y, self.state.b(), &mut out);
        Ok(self.lambda * l2_norm(&out))
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn constraint(&self) -> &C {
        &self.constraint
    }

    /// J(xk), or the construction-time buffer when unshifted.
    pub fn jacobian(&self) -> &Jacobian {
        self.state.jacobian()
    }

    /// c(xk), or the construction-time buffer when unshifted.
    pub fn b(&self) -> &[f64] {
        self.state.b()
    }

    pub fn xk(&self) -> Option<&[f64]> {
        self.xk.as_deref()
    }

    pub fn is_shifted(&self) -> bool {
        self.xk.is_some()
    }

    pub fn nrows(&self) -> usize {
        self.state.jacobian().nrows()
    }

    pub fn ncols(&self) -> usize {
        self.state.jacobian().ncols()
    }

    pub fn name(&self) -> &'static str {
        if self.is_shifted() {
            "shifted composite l2 norm"
        } else {
            "composite l2 norm"
        }
    }

    pub fn expression(&self) -> &'static str {
        if self.is_shifted() {
            "t ↦ λ‖c(xk) + J(xk)t‖₂"
        } else {
            "x ↦ λ‖c(x)‖₂"
        }
    }

    pub fn parameters(&self) -> String {
        match &self.xk {
            Some(xk) => format!("λ = {:e}, xk = {xk:?}", self.lambda),
            None => format!("λ = {:e}", self.lambda),
        }
    }
}

impl<C> fmt::Debug for CompositeNormL2<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeNormL2")
            .field("lambda", &self.lambda)
            .field("nrows", &self.nrows())
            .field("ncols", &self.ncols())
            .field("xk", &self.xk)
            .finish()
    }
}
