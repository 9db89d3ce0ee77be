//! Local and globalized quadratic / linear forms.
//!
//! A constraint is the quadratic equation
//!
//! ```text
//! f(x) = ½ xᵀ H x + Bᵀ x + C = 0
//! ```
//!
//! on its reduced vector. An energy is the linear residual `Kᵀ x − S`.
//! Local forms are small dense nalgebra objects; globalized forms are sorted
//! sparse entry lists keyed by global index.

use nalgebra::{DMatrix, DVector};

use super::{CoreError, CoreResult, Converter};
use crate::linalg::{compress_entries, compress_pairs};

const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// Dense local form `(Hi, Bi, Ci)` on a reduced vector
#[derive(Debug, Clone, PartialEq)]
pub struct LocalQuadraticForm {
    hessian: DMatrix<f64>,
    linear: DVector<f64>,
    constant: Option<f64>,
}

impl LocalQuadraticForm {
    /// Validates shape and symmetry of `hessian`
    pub fn new(
        hessian: DMatrix<f64>,
        linear: DVector<f64>,
        constant: Option<f64>,
    ) -> CoreResult<Self> {
        let n = linear.len();
        if hessian.nrows() != n || hessian.ncols() != n {
            return Err(CoreError::DimensionMismatch {
                term: "local quadratic form".to_string(),
                expected: n,
                actual: hessian.nrows().max(hessian.ncols()),
            });
        }
        let scale = hessian.amax().max(1.0);
        if (&hessian - hessian.transpose()).amax() > SYMMETRY_TOLERANCE * scale {
            return Err(CoreError::NotSymmetric("local quadratic form".to_string()));
        }
        Ok(Self {
            hessian,
            linear,
            constant,
        })
    }

    /// Construction from a Hessian built symmetric by the caller
    pub(crate) fn from_symmetric(
        hessian: DMatrix<f64>,
        linear: DVector<f64>,
        constant: Option<f64>,
    ) -> Self {
        debug_assert_eq!(hessian.nrows(), linear.len());
        debug_assert_eq!(hessian, hessian.transpose());
        Self {
            hessian,
            linear,
            constant,
        }
    }

    /// Form with `Hi = 0`, i.e. a linear equation `Biᵀ x + Ci = 0`
    pub fn linear(linear: DVector<f64>, constant: Option<f64>) -> Self {
        let n = linear.len();
        Self {
            hessian: DMatrix::zeros(n, n),
            linear,
            constant,
        }
    }

    pub fn dimension(&self) -> usize {
        self.linear.len()
    }

    pub fn hessian(&self) -> &DMatrix<f64> {
        &self.hessian
    }

    pub fn linear_part(&self) -> &DVector<f64> {
        &self.linear
    }

    pub fn constant(&self) -> Option<f64> {
        self.constant
    }

    /// `½ xᵀ H x + Bᵀ x + C` on the reduced vector
    pub fn evaluate(&self, x: &DVector<f64>) -> f64 {
        self.evaluate_with_constant(x, self.constant.unwrap_or(0.0))
    }

    /// Same as [`evaluate`](Self::evaluate) with `C` replaced by `constant`
    pub fn evaluate_with_constant(&self, x: &DVector<f64>, constant: f64) -> f64 {
        0.5 * x.dot(&(&self.hessian * x)) + self.linear.dot(x) + constant
    }

    /// Translate through `converter`, accumulating entries that share a global cell
    pub fn globalise(
        &self,
        converter: &Converter,
        constant: f64,
        weight: f64,
    ) -> GlobalQuadraticForm {
        let n = self.dimension();
        let mut hessian = Vec::new();
        for c in 0..n {
            for r in 0..n {
                let v = self.hessian[(r, c)];
                if v != 0.0 {
                    hessian.push((converter.global(r), converter.global(c), v));
                }
            }
        }
        let linear = self
            .linear
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0.0)
            .map(|(i, &v)| (converter.global(i), v))
            .collect();

        GlobalQuadraticForm {
            hessian: compress_pairs(hessian),
            linear: compress_entries(linear),
            constant,
            weight,
        }
    }
}

/// Globalized constraint `(GlobalHi, GlobalBi, Ci, weight)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalQuadraticForm {
    /// Sorted by `(row, col)`, unique keys
    pub hessian: Vec<(usize, usize, f64)>,
    /// Sorted by row, unique keys
    pub linear: Vec<(usize, f64)>,
    pub constant: f64,
    pub weight: f64,
}

impl GlobalQuadraticForm {
    /// Entry of GlobalHi, zero when absent
    pub fn hessian_entry(&self, row: usize, col: usize) -> f64 {
        self.hessian
            .binary_search_by_key(&(row, col), |&(r, c, _)| (r, c))
            .map(|i| self.hessian[i].2)
            .unwrap_or(0.0)
    }

    /// Entry of GlobalBi, zero when absent
    pub fn linear_entry(&self, row: usize) -> f64 {
        self.linear
            .binary_search_by_key(&row, |&(r, _)| r)
            .map(|i| self.linear[i].1)
            .unwrap_or(0.0)
    }

    /// Constraint value `f(x)` at the global iterate
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let quadratic: f64 = self.hessian.iter().map(|&(r, c, v)| v * x[r] * x[c]).sum();
        let linear: f64 = self.linear.iter().map(|&(r, v)| v * x[r]).sum();
        0.5 * quadratic + linear + self.constant
    }

    /// Gradient `H x + B`, sparse over the rows the form touches
    pub fn gradient(&self, x: &[f64]) -> Vec<(usize, f64)> {
        let mut entries: Vec<(usize, f64)> =
            self.hessian.iter().map(|&(r, c, v)| (r, v * x[c])).collect();
        entries.extend(self.linear.iter().copied());
        compress_entries(entries)
    }

    /// Linearization about `x`: gradient row and target so that
    /// `row · x_new = target` is the tangent approximation of `f(x_new) = 0`
    pub fn linearise(&self, x: &[f64]) -> (Vec<(usize, f64)>, f64) {
        let row = self.gradient(x);
        let row_dot_x: f64 = row.iter().map(|&(i, v)| v * x[i]).sum();
        let target = row_dot_x - self.evaluate(x);
        (row, target)
    }
}

/// Globalized energy `(GlobalKi, Si, weight)`: residual `Ki · X − Si`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalLinearForm {
    /// Sorted by index, unique keys
    pub coefficients: Vec<(usize, f64)>,
    pub target: f64,
    pub weight: f64,
}

impl GlobalLinearForm {
    pub fn globalise(
        coefficients: &DVector<f64>,
        target: f64,
        converter: &Converter,
        weight: f64,
    ) -> Self {
        let entries = coefficients
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0.0)
            .map(|(i, &v)| (converter.global(i), v))
            .collect();
        Self {
            coefficients: compress_entries(entries),
            target,
            weight,
        }
    }

    pub fn residual(&self, x: &[f64]) -> f64 {
        self.coefficients.iter().map(|&(i, v)| v * x[i]).sum::<f64>() - self.target
    }

    /// `weight · (Ki · X − Si)²`
    pub fn energy(&self, x: &[f64]) -> f64 {
        let r = self.residual(x);
        self.weight * r * r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VariableRegistry;

    fn distance_form() -> LocalQuadraticForm {
        // |p1 - p0|² - l² on (p0.x, p1.x, l)
        let h = DMatrix::from_row_slice(3, 3, &[2.0, -2.0, 0.0, -2.0, 2.0, 0.0, 0.0, 0.0, -2.0]);
        LocalQuadraticForm::new(h, DVector::zeros(3), None).unwrap()
    }

    #[test]
    fn test_rejects_asymmetric_hessian() {
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 1.0]);
        assert!(matches!(
            LocalQuadraticForm::new(h, DVector::zeros(2), None),
            Err(CoreError::NotSymmetric(_))
        ));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        assert!(matches!(
            LocalQuadraticForm::new(DMatrix::zeros(2, 2), DVector::zeros(3), None),
            Err(CoreError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_globalised_form_matches_local_evaluation() {
        let mut registry = VariableRegistry::new();
        let xs = registry.register(4, 1).unwrap();
        let converter = Converter::new(&registry, &[xs.at(3), xs.at(1), xs.at(0)]).unwrap();
        let local = distance_form();
        let global = local.globalise(&converter, 0.0, 1.0);

        let x = [0.5, 2.0, -7.0, 4.0];
        let reduced = DVector::from_vec(vec![4.0, 2.0, 0.5]);
        assert!((global.evaluate(&x) - local.evaluate(&reduced)).abs() < 1e-12);
        assert_eq!(global.hessian_entry(3, 1), -2.0);
        assert_eq!(global.hessian_entry(1, 3), -2.0);
        assert_eq!(global.hessian_entry(2, 2), 0.0);
    }

    #[test]
    fn test_repeated_reference_accumulates() {
        let mut registry = VariableRegistry::new();
        let xs = registry.register(2, 1).unwrap();
        // Same scalar bound twice: both diagonal and off-diagonal land on (0, 0).
        let converter = Converter::new(&registry, &[xs.at(0), xs.at(0), xs.at(1)]).unwrap();
        let global = distance_form().globalise(&converter, 0.0, 1.0);

        assert_eq!(global.hessian_entry(0, 0), 2.0 - 2.0 - 2.0 + 2.0);
        assert_eq!(global.hessian_entry(1, 1), -2.0);
    }

    #[test]
    fn test_linearisation_is_tangent() {
        let mut registry = VariableRegistry::new();
        let xs = registry.register(3, 1).unwrap();
        let converter = Converter::new(&registry, &[xs.at(0), xs.at(1), xs.at(2)]).unwrap();
        let global = distance_form().globalise(&converter, 0.0, 1.0);

        let x = [0.0, 1.0, 0.5];
        let (row, target) = global.linearise(&x);
        // At x itself the linear model reproduces -f(x) offset: row·x - target = f(x)
        let row_dot_x: f64 = row.iter().map(|&(i, v)| v * x[i]).sum();
        assert!((row_dot_x - target - global.evaluate(&x)).abs() < 1e-12);
        assert_eq!(row, vec![(0, -2.0), (1, 2.0), (2, -1.0)]);
    }

    #[test]
    fn test_energy_residual() {
        let mut registry = VariableRegistry::new();
        let xs = registry.register(2, 1).unwrap();
        let converter = Converter::new(&registry, &[xs.at(1), xs.at(0)]).unwrap();
        let form = GlobalLinearForm::globalise(
            &DVector::from_vec(vec![1.0, -1.0]),
            0.5,
            &converter,
            4.0,
        );
        let x = [1.0, 3.0];
        assert_eq!(form.residual(&x), 1.5);
        assert_eq!(form.energy(&x), 9.0);
    }
}
