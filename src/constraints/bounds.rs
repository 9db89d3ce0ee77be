//! Scalar bounds expressed as equalities with a dummy variable.
//!
//! `l ≥ σ` becomes `l − σ − d² = 0` and `l ≤ σ` becomes `σ − l − d² = 0`,
//! with `d` a free scalar unknown. The reduced vector is `(l, d)`.
//!
//! `∂f/∂d = −2d`, so a dummy at 0 never moves and the bound degenerates to
//! `l = σ`. Unset or zero dummies start at [`LowerBound::dummy_value`] (resp.
//! [`UpperBound::dummy_value`]) of the current `l`.

use nalgebra::{DMatrix, DVector};

use crate::core::{LocalQuadraticForm, QuadraticConstraintType};

fn dummy_start(x_reduced: &DVector<f64>, assigned: &[bool], dummy: f64) -> Vec<(usize, f64)> {
    if !assigned[1] || x_reduced[1] == 0.0 {
        vec![(1, dummy)]
    } else {
        Vec::new()
    }
}

fn bound_form(sign: f64, bound: f64) -> LocalQuadraticForm {
    let mut hessian = DMatrix::zeros(2, 2);
    hessian[(1, 1)] = -2.0;
    LocalQuadraticForm::from_symmetric(
        hessian,
        DVector::from_vec(vec![sign, 0.0]),
        Some(-sign * bound),
    )
}

/// `l ≥ σ`
#[derive(Debug, Clone)]
pub struct LowerBound {
    bound: f64,
    form: LocalQuadraticForm,
}

impl LowerBound {
    pub fn new(bound: f64) -> Self {
        Self {
            bound,
            form: bound_form(1.0, bound),
        }
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// Dummy value satisfying the equality for `value`, or 0 when violated
    pub fn dummy_value(&self, value: f64) -> f64 {
        (value - self.bound).max(0.0).sqrt()
    }
}

impl QuadraticConstraintType for LowerBound {
    fn name(&self) -> &str {
        "LowerBound"
    }

    fn local_form(&self) -> &LocalQuadraticForm {
        &self.form
    }

    fn auxiliary_values(&self, x_reduced: &DVector<f64>, assigned: &[bool]) -> Vec<(usize, f64)> {
        dummy_start(x_reduced, assigned, self.dummy_value(x_reduced[0]))
    }
}

/// `l ≤ σ`
#[derive(Debug, Clone)]
pub struct UpperBound {
    bound: f64,
    form: LocalQuadraticForm,
}

impl UpperBound {
    pub fn new(bound: f64) -> Self {
        Self {
            bound,
            form: bound_form(-1.0, bound),
        }
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn dummy_value(&self, value: f64) -> f64 {
        (self.bound - value).max(0.0).sqrt()
    }
}

impl QuadraticConstraintType for UpperBound {
    fn name(&self) -> &str {
        "UpperBound"
    }

    fn local_form(&self) -> &LocalQuadraticForm {
        &self.form
    }

    fn auxiliary_values(&self, x_reduced: &DVector<f64>, assigned: &[bool]) -> Vec<(usize, f64)> {
        dummy_start(x_reduced, assigned, self.dummy_value(x_reduced[0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_bound_satisfied_with_dummy() {
        let bound = LowerBound::new(2.0);
        let d = bound.dummy_value(5.0);
        assert!((d * d - 3.0).abs() < 1e-12);
        let x = DVector::from_vec(vec![5.0, d]);
        assert!(bound.local_form().evaluate(&x).abs() < 1e-12);
    }

    #[test]
    fn test_lower_bound_violation() {
        let bound = LowerBound::new(2.0);
        assert_eq!(bound.dummy_value(1.0), 0.0);
        let x = DVector::from_vec(vec![1.0, 0.0]);
        assert_eq!(bound.local_form().evaluate(&x), -1.0);
    }

    #[test]
    fn test_unset_dummy_starts_at_dummy_value() {
        let bound = LowerBound::new(2.0);
        let x = DVector::from_vec(vec![6.0, 0.0]);
        assert_eq!(bound.auxiliary_values(&x, &[true, false]), vec![(1, 2.0)]);
        // a zero dummy is replaced even when set explicitly
        assert_eq!(bound.auxiliary_values(&x, &[true, true]), vec![(1, 2.0)]);

        let x = DVector::from_vec(vec![6.0, -2.0]);
        assert!(bound.auxiliary_values(&x, &[true, true]).is_empty());

        let upper = UpperBound::new(1.0);
        let x = DVector::from_vec(vec![3.0, 0.0]);
        assert_eq!(upper.auxiliary_values(&x, &[true, false]), vec![(1, 0.0)]);
    }

    #[test]
    fn test_upper_bound() {
        let bound = UpperBound::new(2.0);
        let d = bound.dummy_value(0.5);
        let x = DVector::from_vec(vec![0.5, d]);
        assert!(bound.local_form().evaluate(&x).abs() < 1e-12);
        assert_eq!(
            bound.local_form().evaluate(&DVector::from_vec(vec![3.0, 0.0])),
            -1.0
        );
    }
}
