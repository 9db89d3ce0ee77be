use nalgebra::DVector;

use crate::core::{CoreError, CoreResult, EnergyType};

/// Soft pull `x[component] − target` on a single variable of `dimension` components
#[derive(Debug, Clone)]
pub struct PointAnchor {
    dimension: usize,
    component: usize,
    target: f64,
}

impl PointAnchor {
    pub fn new(dimension: usize, component: usize, target: f64) -> CoreResult<Self> {
        if component >= dimension {
            return Err(CoreError::DimensionMismatch {
                term: "PointAnchor".to_string(),
                expected: dimension,
                actual: component + 1,
            });
        }
        Ok(Self {
            dimension,
            component,
            target,
        })
    }
}

impl EnergyType for PointAnchor {
    fn name(&self) -> &str {
        "PointAnchor"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn calculate(&self, _x_reduced: &DVector<f64>) -> CoreResult<(DVector<f64>, f64)> {
        let mut k = DVector::zeros(self.dimension);
        k[self.component] = 1.0;
        Ok((k, self.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_residual() {
        let anchor = PointAnchor::new(3, 2, 1.5).unwrap();
        let x = DVector::from_vec(vec![9.0, 9.0, 2.0]);
        let (k, s) = anchor.calculate(&x).unwrap();
        assert_eq!(k.dot(&x) - s, 0.5);
    }

    #[test]
    fn test_component_out_of_range() {
        assert!(PointAnchor::new(2, 2, 0.0).is_err());
        assert!(PointAnchor::new(2, 1, 0.0).is_ok());
    }
}
