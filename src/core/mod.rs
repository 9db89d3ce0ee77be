//! Core building blocks of the guided projection solver
//!
//! - Variable sets and the global unknown vector ([`variable`])
//! - Local→global index conversion ([`converter`])
//! - Local and globalized quadratic/linear forms ([`form`])
//! - Constraint strategies and constraint sets ([`constraint`])
//! - Energy strategies and energy sets ([`energy`])
//! - The problem container tying them together ([`problem`])

use thiserror::Error;

pub mod constraint;
pub mod converter;
pub mod energy;
pub mod form;
pub mod problem;
pub mod variable;

pub use constraint::{
    Constraint, ConstraintSet, ConstraintSetHandle, ConstraintStrategy, LinearisedConstraintType,
    QuadraticConstraintType,
};
pub use converter::Converter;
pub use energy::{Energy, EnergySet, EnergySetHandle, EnergyType};
pub use form::{GlobalLinearForm, GlobalQuadraticForm, LocalQuadraticForm};
pub use problem::Problem;
pub use variable::{GlobalVector, VariableRef, VariableRegistry, VariableSet, VariableSetHandle};

/// Result type for problem setup and globalization
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building or globalizing a problem
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A reference points at a variable set that was never registered
    #[error("Unknown variable set {0}")]
    UnknownVariableSet(usize),

    /// Instance index past the end of its variable set
    #[error("Instance {instance} out of range for variable set {set} with {count} instances")]
    InstanceOutOfRange {
        set: usize,
        instance: usize,
        count: usize,
    },

    /// Bound variables do not add up to the strategy's reduced dimension
    #[error("{term}: expected reduced dimension {expected}, got {actual}")]
    DimensionMismatch {
        term: String,
        expected: usize,
        actual: usize,
    },

    /// Registration attempted after the global vector was sealed
    #[error("Variable layout is sealed; register variable sets before the first solve")]
    Sealed,

    /// Local Hi is not symmetric
    #[error("Local Hessian of {0} is not symmetric")]
    NotSymmetric(String),

    /// Weight must be finite and non-negative
    #[error("{term}: invalid weight {weight}")]
    InvalidWeight { term: String, weight: f64 },

    /// Local form cannot be produced at the current iterate
    #[error("{term} is degenerate: {reason}")]
    Degenerate { term: String, reason: String },

    /// Unknown constraint set handle
    #[error("Unknown constraint set {0}")]
    UnknownConstraintSet(usize),

    /// Unknown energy set handle
    #[error("Unknown energy set {0}")]
    UnknownEnergySet(usize),

    /// Value slice length differs from the variable dimension
    #[error("Value of length {actual} does not fit variable dimension {expected}")]
    ValueLength { expected: usize, actual: usize },
}

impl CoreError {
    /// Degeneracy raised by a strategy constructor, before any term identity exists
    pub fn degenerate(term: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Degenerate {
            term: term.into(),
            reason: reason.into(),
        }
    }

    /// Attach the identity of the offending term to a degeneracy error
    pub(crate) fn with_term(self, term: &str) -> Self {
        match self {
            CoreError::Degenerate { reason, .. } => CoreError::Degenerate {
                term: term.to_string(),
                reason,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_display() {
        let error = CoreError::InstanceOutOfRange {
            set: 1,
            instance: 7,
            count: 3,
        };
        assert_eq!(
            error.to_string(),
            "Instance 7 out of range for variable set 1 with 3 instances"
        );
    }

    #[test]
    fn test_with_term_rewrites_degenerate_only() {
        let error = CoreError::degenerate("FixedLength", "zero vector").with_term("length #4");
        assert_eq!(error.to_string(), "length #4 is degenerate: zero vector");

        let error = CoreError::Sealed.with_term("ignored");
        assert_eq!(error, CoreError::Sealed);
    }
}
