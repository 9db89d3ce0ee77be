//! Stacked least-squares system for one guided projection step.
//!
//! Row blocks, top to bottom:
//!
//! ```text
//! [ √wᵢ · ∇fᵢ(Xk)ᵀ ]        [ √wᵢ · (∇fᵢ(Xk)·Xk − fᵢ(Xk)) ]   constraints
//! [ √wⱼ · Kⱼᵀ      ]  X  =  [ √wⱼ · Sⱼ                    ]   energies
//! [ √ε · I         ]        [ √ε · Xk                     ]   damping
//! ```
//!
//! Columns of fixed variables are removed and their contribution moved to the
//! right-hand side. Free columns touched by no row are pinned to their current
//! value with a unit row.

use tracing::trace;

use crate::core::{GlobalVector, Problem};
use crate::linalg::{LinAlgResult, SparseMatrix, TripletBuilder};

/// Mapping between global slots and the columns of the reduced system
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    columns: Vec<Option<usize>>,
    globals: Vec<usize>,
}

impl ColumnMap {
    /// One column per non-fixed slot, in global order
    pub fn new(fixed: &[bool]) -> Self {
        let mut columns = Vec::with_capacity(fixed.len());
        let mut globals = Vec::new();
        for (global, &is_fixed) in fixed.iter().enumerate() {
            if is_fixed {
                columns.push(None);
            } else {
                columns.push(Some(globals.len()));
                globals.push(global);
            }
        }
        Self { columns, globals }
    }

    /// Column of a global slot, `None` when it is fixed
    pub fn column(&self, global: usize) -> Option<usize> {
        self.columns.get(global).copied().flatten()
    }

    pub fn global(&self, column: usize) -> usize {
        self.globals[column]
    }

    pub fn num_columns(&self) -> usize {
        self.globals.len()
    }

    /// New iterate: free slots from `solution`, fixed slots from `x`
    pub fn scatter(&self, x: &[f64], solution: &[f64]) -> Vec<f64> {
        let mut values = x.to_vec();
        for (column, &global) in self.globals.iter().enumerate() {
            values[global] = solution[column];
        }
        values
    }
}

/// Output of [`Assembler::assemble`]
#[derive(Debug)]
pub struct AssembledSystem {
    pub matrix: SparseMatrix,
    pub rhs: Vec<f64>,
    pub columns: ColumnMap,
    pub constraint_rows: usize,
    pub energy_rows: usize,
    pub regularization_rows: usize,
    /// Free columns with no entry, pinned to their current value
    pub pinned_columns: usize,
    pub nnz: usize,
}

impl AssembledSystem {
    pub fn nrows(&self) -> usize {
        self.rhs.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.num_columns()
    }
}

/// Builds the weighted rectangular system from globalized forms
#[derive(Debug, Clone, Copy)]
pub struct Assembler {
    regularization: f64,
}

impl Assembler {
    pub fn new(regularization: f64) -> Self {
        Self { regularization }
    }

    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// Assemble at `x`.
    ///
    /// Every set must have been globalized at `x` beforehand
    /// ([`Problem::compute_and_globalise`]).
    pub fn assemble(
        &self,
        problem: &Problem,
        x: &GlobalVector,
        fixed: &[bool],
    ) -> LinAlgResult<AssembledSystem> {
        let values = x.as_slice();
        let columns = ColumnMap::new(fixed);
        let ncols = columns.num_columns();

        let constraint_count = problem.num_constraints();
        let energy_count = problem.num_energies();
        let regularization_count = if self.regularization > 0.0 { ncols } else { 0 };
        let mut builder = TripletBuilder::with_capacity(
            ncols,
            constraint_count + energy_count + regularization_count,
            ncols,
        );

        let mut push_weighted = |entries: &[(usize, f64)], target: f64, weight: f64| {
            let scale = weight.sqrt();
            let mut rhs = target;
            let mut row = Vec::with_capacity(entries.len());
            for &(global, v) in entries {
                match columns.column(global) {
                    Some(col) if scale * v != 0.0 => row.push((col, scale * v)),
                    Some(_) => {}
                    None => rhs -= v * values[global],
                }
            }
            builder.push_row(row, scale * rhs);
        };

        let mut constraint_rows = 0;
        for set in problem.constraint_sets() {
            for constraint in set.constraints() {
                let global = constraint.global();
                let (row, target) = global.linearise(values);
                push_weighted(&row, target, global.weight);
                constraint_rows += 1;
            }
        }

        let mut energy_rows = 0;
        for set in problem.energy_sets() {
            for energy in set.energies() {
                let global = energy.global();
                push_weighted(&global.coefficients, global.target, global.weight);
                energy_rows += 1;
            }
        }

        if regularization_count > 0 {
            let scale = self.regularization.sqrt();
            for col in 0..ncols {
                builder.push_row([(col, scale)], scale * values[columns.global(col)]);
            }
        }

        let mut pinned_columns = 0;
        for (col, touched) in builder.touched_columns().into_iter().enumerate() {
            if !touched {
                builder.push_row([(col, 1.0)], values[columns.global(col)]);
                pinned_columns += 1;
            }
        }

        trace!(
            "Assembled {} x {} system ({} constraint, {} energy, {} damping, {} pinned rows, {} entries)",
            builder.nrows(),
            ncols,
            constraint_rows,
            energy_rows,
            regularization_count,
            pinned_columns,
            builder.nnz()
        );

        let nnz = builder.nnz();
        let (matrix, rhs) = builder.build()?;
        Ok(AssembledSystem {
            matrix,
            rhs,
            columns,
            constraint_rows,
            energy_rows,
            regularization_rows: regularization_count,
            pinned_columns,
            nnz,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::CoherentLength;
    use crate::core::ConstraintStrategy;
    use crate::energies::PointAnchor;

    fn assert_approx_eq(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() < eps, "expected {b}, got {a}");
    }

    fn dense(system: &AssembledSystem) -> Vec<Vec<f64>> {
        let matrix = system.matrix.as_ref();
        let mut rows = vec![vec![0.0; system.ncols()]; system.nrows()];
        for col in 0..system.ncols() {
            for (row, value) in matrix.row_idx_of_col(col).zip(matrix.val_of_col(col)) {
                rows[row][col] += *value;
            }
        }
        rows
    }

    fn length_problem() -> (Problem, GlobalVector) {
        let mut problem = Problem::new();
        let points = problem.register_variable_set(2, 3).unwrap();
        let lengths = problem.register_variable_set(1, 1).unwrap();
        let set = problem.add_constraint_set(
            "length",
            ConstraintStrategy::quadratic(CoherentLength::new()),
        );
        problem
            .add_constraint(set, &[points.at(0), points.at(1), lengths.at(0)], None, 4.0)
            .unwrap();
        let mut x = GlobalVector::zeros(7);
        x.write(0..7, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.5]);
        problem.compute_and_globalise(&x, false).unwrap();
        (problem, x)
    }

    #[test]
    fn test_column_map_skips_fixed_slots() {
        let map = ColumnMap::new(&[false, true, true, false]);
        assert_eq!(map.num_columns(), 2);
        assert_eq!(map.column(0), Some(0));
        assert_eq!(map.column(1), None);
        assert_eq!(map.column(3), Some(1));
        assert_eq!(map.global(1), 3);
        assert_eq!(map.scatter(&[1.0, 2.0, 3.0, 4.0], &[9.0, 8.0]), vec![9.0, 2.0, 3.0, 8.0]);
    }

    #[test]
    fn test_constraint_row_is_weighted_gradient() {
        let (problem, x) = length_problem();
        let system = Assembler::new(0.0)
            .assemble(&problem, &x, &problem.fixed_mask())
            .unwrap();

        // f = |p1 - p0|² - l² = 0.75, ∇f = (-2, 0, 0, 2, 0, 0, -1), √w = 2
        assert_eq!(system.constraint_rows, 1);
        assert_eq!(system.regularization_rows, 0);
        // y, z of both points are untouched and get pinned
        assert_eq!(system.pinned_columns, 4);
        assert_eq!(system.nrows(), 5);

        let a = dense(&system);
        assert_approx_eq(a[0][0], -4.0, 1e-12);
        assert_approx_eq(a[0][3], 4.0, 1e-12);
        assert_approx_eq(a[0][6], -2.0, 1e-12);
        // target = ∇f·x − f = (2 − 0.5) − 0.75 = 0.75, scaled by 2
        assert_approx_eq(system.rhs[0], 1.5, 1e-12);
    }

    #[test]
    fn test_regularization_rows_cover_every_free_column() {
        let (problem, x) = length_problem();
        let system = Assembler::new(1e-4)
            .assemble(&problem, &x, &problem.fixed_mask())
            .unwrap();

        assert_eq!(system.regularization_rows, 7);
        assert_eq!(system.pinned_columns, 0);
        assert_eq!(system.nrows(), 8);
        assert_approx_eq(system.rhs[1 + 3], 1e-2 * 1.0, 1e-15);
    }

    #[test]
    fn test_fixed_columns_move_to_rhs() {
        let mut problem = Problem::new();
        let values = problem.register_variable_set(2, 1).unwrap();
        let set = problem.add_energy_set("anchor", PointAnchor::new(1, 0, 3.0).unwrap());
        problem.add_energy(set, &[values.at(0)], 1.0).unwrap();
        problem.fix_variable(values.at(0)).unwrap();

        let mut x = GlobalVector::zeros(2);
        x.write(0..2, &[1.0, 5.0]);
        problem.compute_and_globalise(&x, false).unwrap();

        let system = Assembler::new(0.0)
            .assemble(&problem, &x, &problem.fixed_mask())
            .unwrap();
        assert_eq!(system.ncols(), 1);
        // energy row lost its only column: target 3 − 1·1
        assert_approx_eq(system.rhs[0], 2.0, 1e-12);
        // the free slot appears nowhere and is pinned to 5
        assert_eq!(system.pinned_columns, 1);
        assert_approx_eq(system.rhs[1], 5.0, 1e-12);
    }
}
