//! # Guided Projection
//!
//! A Rust library for solving geometric constraint problems by guided
//! projection: quadratic (or re-linearised) constraints are linearized about
//! the current iterate, stacked with linear fairness energies and a small
//! damping term, and solved as one sparse least-squares system per iteration.
//!
//! ## Features
//!
//! - **Typed variable sets**: groups of fixed-dimension unknowns packed into one global vector
//! - **Constraint strategies**: constant quadratic forms or forms recomputed at each iterate
//! - **Energies**: soft linear objectives weighted against the constraints
//! - **Sparse QR backend**: rectangular least squares on the faer sparse solvers
//! - **Parallel globalization**: constraint and energy sets processed on the rayon pool
//!
//! ## Built-in terms
//!
//! - Constraints: coherent edge length, lower/upper bounds, fixed length
//! - Energies: segment orthogonality and parallelity, point anchors, fairness

pub mod constraints;
pub mod core;
pub mod energies;
pub mod error;
pub mod linalg;
pub mod logger;
pub mod optimizer;

pub use crate::core::{
    ConstraintSetHandle, ConstraintStrategy, EnergySetHandle, EnergyType,
    LinearisedConstraintType, LocalQuadraticForm, QuadraticConstraintType, VariableRef,
    VariableSetHandle,
};
pub use error::{ProjectionError, ProjectionResult};
pub use logger::{init_logger, init_logger_with_level};
pub use optimizer::{
    Diagnostic, GuidedProjection, GuidedProjectionConfig, IterationStats, ObserverControl,
    OptimizationStatus, ProjectionObserver, ProjectionOutcome, SolverState,
};
