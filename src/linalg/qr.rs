use faer::{Conj, Mat, linalg::solvers::SolveLstsqCore, sparse::linalg::solvers::Qr};
use tracing::trace;

use super::{LeastSquaresSolver, LinAlgError, LinAlgResult, SparseMatrix};

/// Sparse QR least-squares solver.
///
/// Factorizes the stacked rectangular system directly instead of forming the
/// normal equations. The sparsity pattern changes from one iteration to the
/// next, so the symbolic analysis is not cached.
#[derive(Default)]
pub struct SparseQRSolver {
    factorization: Option<Qr<usize, f64>>,
    nrows: usize,
    ncols: usize,
}

impl SparseQRSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factor and solve in one call
    pub fn solve_least_squares(
        &mut self,
        matrix: &SparseMatrix,
        rhs: &[f64],
    ) -> LinAlgResult<Vec<f64>> {
        self.factor(matrix)?;
        self.solve(rhs)
    }
}

impl LeastSquaresSolver for SparseQRSolver {
    fn factor(&mut self, matrix: &SparseMatrix) -> LinAlgResult<()> {
        let (m, n) = (matrix.nrows(), matrix.ncols());
        if m < n {
            self.factorization = None;
            return Err(LinAlgError::UnderDetermined { rows: m, cols: n });
        }

        let qr = matrix
            .sp_qr()
            .map_err(|e| LinAlgError::FactorizationFailed(format!("{:?}", e)))?;
        trace!("QR factorized {} x {} system", m, n);

        self.factorization = Some(qr);
        self.nrows = m;
        self.ncols = n;
        Ok(())
    }

    fn solve(&self, rhs: &[f64]) -> LinAlgResult<Vec<f64>> {
        let qr = self
            .factorization
            .as_ref()
            .ok_or_else(|| LinAlgError::InvalidInput("Solver not factorized".to_string()))?;
        if rhs.len() != self.nrows {
            return Err(LinAlgError::InvalidInput(format!(
                "RHS length ({}) != row count ({})",
                rhs.len(),
                self.nrows
            )));
        }

        let mut b = Mat::<f64>::from_fn(self.nrows, 1, |i, _| rhs[i]);
        qr.solve_lstsq_in_place_with_conj(Conj::No, b.as_mut());

        // The least-squares solution occupies the top ncols rows.
        let solution: Vec<f64> = (0..self.ncols).map(|i| b[(i, 0)]).collect();
        if let Some(i) = solution.iter().position(|v| !v.is_finite()) {
            return Err(LinAlgError::NonFiniteSolution(format!(
                "component {} of {} (rank-deficient system?)",
                i, self.ncols
            )));
        }
        Ok(solution)
    }

    fn is_factorized(&self) -> bool {
        self.factorization.is_some()
    }
}
