use nalgebra::{DMatrix, DVector};

use crate::core::{CoreError, CoreResult, LinearisedConstraintType};

const MIN_NORM: f64 = 1e-12;

/// `|v| − L = 0`, re-linearised about the current `v`.
///
/// At the iterate `v₀` the form is `Hi = 0`, `Bi = v₀ / |v₀|`, `Ci = −L`, so
/// `Bi · v + Ci` equals `|v| − L` exactly at `v₀`.
#[derive(Debug, Clone)]
pub struct FixedLength {
    dimension: usize,
    length: f64,
}

impl FixedLength {
    pub fn new(dimension: usize, length: f64) -> Self {
        Self { dimension, length }
    }

    pub fn length(&self) -> f64 {
        self.length
    }
}

impl LinearisedConstraintType for FixedLength {
    fn name(&self) -> &str {
        "FixedLength"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn constant(&self) -> Option<f64> {
        Some(-self.length)
    }

    fn calculate(&self, x_reduced: &DVector<f64>) -> CoreResult<(DMatrix<f64>, DVector<f64>)> {
        let norm = x_reduced.norm();
        if norm < MIN_NORM {
            return Err(CoreError::degenerate(
                self.name(),
                "zero-length vector has no direction",
            ));
        }
        Ok((
            DMatrix::zeros(self.dimension, self.dimension),
            x_reduced / norm,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LocalQuadraticForm;

    #[test]
    fn test_linearised_form_is_exact_at_iterate() {
        let constraint = FixedLength::new(3, 2.0);
        let v = DVector::from_vec(vec![3.0, 4.0, 0.0]);
        let (h, b) = constraint.calculate(&v).unwrap();
        let form = LocalQuadraticForm::new(h, b, constraint.constant()).unwrap();
        assert!((form.evaluate(&v) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_vector_is_degenerate() {
        let constraint = FixedLength::new(2, 1.0);
        assert!(matches!(
            constraint.calculate(&DVector::zeros(2)),
            Err(CoreError::Degenerate { .. })
        ));
    }
}
