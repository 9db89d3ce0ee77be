use nalgebra::DVector;

use crate::core::{CoreError, CoreResult, EnergyType};

/// Second difference `p0 − 2 p1 + p2` along one component of three consecutive points
#[derive(Debug, Clone)]
pub struct Fairness {
    point_dimension: usize,
    coefficients: DVector<f64>,
}

impl Fairness {
    pub fn new(point_dimension: usize, component: usize) -> CoreResult<Self> {
        if component >= point_dimension {
            return Err(CoreError::DimensionMismatch {
                term: "Fairness".to_string(),
                expected: point_dimension,
                actual: component + 1,
            });
        }
        let mut coefficients = DVector::zeros(3 * point_dimension);
        coefficients[component] = 1.0;
        coefficients[point_dimension + component] = -2.0;
        coefficients[2 * point_dimension + component] = 1.0;
        Ok(Self {
            point_dimension,
            coefficients,
        })
    }
}

impl EnergyType for Fairness {
    fn name(&self) -> &str {
        "Fairness"
    }

    fn dimension(&self) -> usize {
        3 * self.point_dimension
    }

    fn calculate(&self, _x_reduced: &DVector<f64>) -> CoreResult<(DVector<f64>, f64)> {
        Ok((self.coefficients.clone(), 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collinear_points_have_zero_fairness() {
        let energy = Fairness::new(2, 1).unwrap();
        let x = DVector::from_vec(vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        let (k, s) = energy.calculate(&x).unwrap();
        assert_eq!(k.dot(&x) - s, 0.0);

        let bent = DVector::from_vec(vec![0.0, 0.0, 1.0, 1.0, 2.0, 0.0]);
        assert_eq!(k.dot(&bent), -2.0);
    }
}
