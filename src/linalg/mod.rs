//! Linear algebra backend.
//!
//! - Triplet accumulation and CSC conversion for the assembled system
//! - Sparse QR least-squares solver built on faer

use thiserror::Error;

pub mod qr;
pub mod triplets;

pub use qr::SparseQRSolver;
pub use triplets::{TripletBuilder, compress_entries, compress_pairs};

/// Type alias for sparse matrices using faer
pub type SparseMatrix = faer::sparse::SparseColMat<usize, f64>;

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Errors raised by the sparse backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinAlgError {
    /// Triplet to CSC conversion failed
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),

    /// Numeric factorization failed
    #[error("Factorization failed: {0}")]
    FactorizationFailed(String),

    /// Fewer rows than unknowns; the least-squares solution is not unique
    #[error("Under-determined system: {rows} rows for {cols} unknowns")]
    UnderDetermined { rows: usize, cols: usize },

    /// Solve produced NaN/inf, typically from a rank-deficient system
    #[error("Non-finite solution: {0}")]
    NonFiniteSolution(String),

    /// Solve called before factor, or with a mismatched right-hand side
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// "Factor then solve" least-squares primitive
pub trait LeastSquaresSolver {
    /// Factorize a (possibly rectangular, `nrows >= ncols`) matrix
    fn factor(&mut self, matrix: &SparseMatrix) -> LinAlgResult<()>;

    /// Least-squares solution of `A x = b` for the last factorized `A`
    fn solve(&self, rhs: &[f64]) -> LinAlgResult<Vec<f64>>;

    fn is_factorized(&self) -> bool;
}
