//! Error types for the guided-projection library
//!
//! Module-level errors (`CoreError`, `LinAlgError`) are folded into the
//! top-level [`ProjectionError`], which groups every failure into one of three
//! categories:
//!
//! - **Configuration**: bad variable references, dimension mismatches,
//!   registration after the solver sealed the layout. Always fatal.
//! - **Numerical degeneracy**: a constraint or energy that cannot produce a
//!   local form at the current iterate, or a rank-deficient assembled system.
//! - **Linear algebra**: failures inside the sparse backend.
//!
//! Running out of iterations is not an error; it is reported through
//! [`OptimizationStatus`](crate::optimizer::OptimizationStatus).

use crate::{core::CoreError, linalg::LinAlgError};
use thiserror::Error;

/// Main result type used throughout the guided-projection library
pub type ProjectionResult<T> = Result<T, ProjectionError>;

/// Main error type for the guided-projection library
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    /// Invalid problem setup (references, dimensions, sealing)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Degenerate local form or singular assembled system
    #[error("Numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// Sparse backend failures
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),
}

impl From<CoreError> for ProjectionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Degenerate { .. } => ProjectionError::NumericalDegeneracy(err.to_string()),
            _ => ProjectionError::Configuration(err.to_string()),
        }
    }
}

impl From<LinAlgError> for ProjectionError {
    fn from(err: LinAlgError) -> Self {
        match err {
            LinAlgError::UnderDetermined { .. } | LinAlgError::NonFiniteSolution(_) => {
                ProjectionError::NumericalDegeneracy(err.to_string())
            }
            _ => ProjectionError::LinearAlgebra(err.to_string()),
        }
    }
}
