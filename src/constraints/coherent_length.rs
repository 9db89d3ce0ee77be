use nalgebra::{DMatrix, DVector};

use crate::core::{LocalQuadraticForm, QuadraticConstraintType};

/// `|p1 − p0|² − l² = 0` on the reduced vector `(p0, p1, l)`.
///
/// The form is constant: the nonlinearity is carried by the bilinear
/// structure of `Hi`, so nothing is recomputed between iterations. Points may
/// have any dimension (3 by default).
///
/// `∂f/∂l = −2l`, so a length left at 0 is never moved by the solver. Unset
/// or zero lengths start at `|p1 − p0|`, and negative ones are flipped so
/// the run settles on the positive root.
#[derive(Debug, Clone)]
pub struct CoherentLength {
    point_dimension: usize,
    form: LocalQuadraticForm,
}

impl CoherentLength {
    pub fn new() -> Self {
        Self::with_dimension(3)
    }

    pub fn with_dimension(point_dimension: usize) -> Self {
        let d = point_dimension;
        let n = 2 * d + 1;
        let mut hessian = DMatrix::zeros(n, n);
        for k in 0..d {
            hessian[(k, k)] = 2.0;
            hessian[(d + k, d + k)] = 2.0;
            hessian[(k, d + k)] = -2.0;
            hessian[(d + k, k)] = -2.0;
        }
        hessian[(2 * d, 2 * d)] = -2.0;

        Self {
            point_dimension,
            form: LocalQuadraticForm::from_symmetric(hessian, DVector::zeros(n), None),
        }
    }

    pub fn point_dimension(&self) -> usize {
        self.point_dimension
    }
}

impl Default for CoherentLength {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadraticConstraintType for CoherentLength {
    fn name(&self) -> &str {
        "CoherentLength"
    }

    fn local_form(&self) -> &LocalQuadraticForm {
        &self.form
    }

    fn auxiliary_values(&self, x_reduced: &DVector<f64>, assigned: &[bool]) -> Vec<(usize, f64)> {
        let d = self.point_dimension;
        let length = x_reduced[2 * d];
        if !assigned[2 * d] || length == 0.0 {
            let p0 = x_reduced.rows(0, d);
            let p1 = x_reduced.rows(d, d);
            vec![(2 * d, (p1 - p0).norm())]
        } else if length < 0.0 {
            vec![(2 * d, -length)]
        } else {
            Vec::new()
        }
    }
}
