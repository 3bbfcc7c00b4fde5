use crate::jacobian::JacobianValuesMut;

/// Constraint map c(x) with Jacobian J(x), evaluated in place.
///
/// Implementations must write exactly `m` values and fill the Jacobian entries
/// of the pattern they were paired with. One constraint is shared by every
/// penalty shifted from it, hence `&self`.
pub trait Constraint {
    /// Fill c(x).
    fn value(&self, x: &[f64], out: &mut [f64]);
    /// Fill J(x) in column order for the paired sparsity pattern.
    fn jacobian(&self, x: &[f64], jacobian: &mut JacobianValuesMut<'_>);

    /// Optional combined evaluation; default calls value then jacobian.
    fn value_and_jacobian(&self, x: &[f64], out: &mut [f64], jacobian: &mut JacobianValuesMut<'_>) {
        self.value(x, out);
        self.jacobian(x, jacobian);
    }
}

/// Constraint built from a pair of closures.
#[derive(Debug, Clone)]
pub struct FnConstraint<V, J> {
    value: V,
    jacobian: J,
}

impl<V, J> FnConstraint<V, J>
where
    V: Fn(&[f64], &mut [f64]),
    J: Fn(&[f64], &mut JacobianValuesMut<'_>),
{
    pub fn new(value: V, jacobian: J) -> Self {
        Self { value, jacobian }
    }
}

impl<V, J> Constraint for FnConstraint<V, J>
where
    V: Fn(&[f64], &mut [f64]),
    J: Fn(&[f64], &mut JacobianValuesMut<'_>),
{
    fn value(&self, x: &[f64], out: &mut [f64]) {
        (self.value)(x, out);
    }

    fn jacobian(&self, x: &[f64], jacobian: &mut JacobianValuesMut<'_>) {
        (self.jacobian)(x, jacobian);
    }
}
