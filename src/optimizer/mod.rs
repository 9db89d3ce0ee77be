//! Guided projection iteration.
//!
//! Each iteration linearizes every constraint about the current iterate,
//! stacks the constraint rows, the energy rows and the damping rows into one
//! weighted rectangular system, solves it by sparse QR and replaces the
//! global vector with the solution.
//!
//! - [`assembler`]: builds the sparse system for one iterate
//! - [`guided_projection`]: configuration and the iteration loop
//! - [`observer`]: per-iteration callbacks with early termination

use std::fmt;
use std::time::Duration;

use tracing::debug;

pub mod assembler;
pub mod guided_projection;
pub mod observer;

pub use assembler::{AssembledSystem, Assembler, ColumnMap};
pub use guided_projection::{GuidedProjection, GuidedProjectionConfig};
pub use observer::{ObserverControl, ObserverVec, ProjectionObserver};

/// Lifecycle of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverState {
    #[default]
    Idle,
    Assembling,
    Solving,
    Converged,
    MaxIterationsReached,
    Diverged,
}

/// Final status of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// Merit below tolerance (and the iterate settled when energies are present)
    Converged,
    /// Iteration cap reached first
    MaxIterationsReached,
    /// An observer asked to stop
    UserTerminated,
    /// The assembled system had no usable least-squares solution
    NumericalFailure,
    /// Merit became non-finite
    Diverged,
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "Converged"),
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::UserTerminated => write!(f, "User terminated"),
            OptimizationStatus::NumericalFailure => write!(f, "Numerical failure"),
            OptimizationStatus::Diverged => write!(f, "Diverged"),
        }
    }
}

/// Non-fatal findings reported alongside the outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Free unknowns touched by no row; pinned to their current value
    UnconstrainedVariables { iteration: usize, count: usize },
    /// Fewer rows than free unknowns (no damping configured)
    UnderConstrained {
        iteration: usize,
        rows: usize,
        unknowns: usize,
    },
    /// QR produced a non-finite solution
    RankDeficient { iteration: usize, detail: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnconstrainedVariables { iteration, count } => write!(
                f,
                "iteration {iteration}: {count} unknowns appear in no row and were held fixed"
            ),
            Diagnostic::UnderConstrained {
                iteration,
                rows,
                unknowns,
            } => write!(
                f,
                "iteration {iteration}: under-constrained problem ({rows} rows for {unknowns} unknowns)"
            ),
            Diagnostic::RankDeficient { iteration, detail } => {
                write!(f, "iteration {iteration}: rank-deficient system ({detail})")
            }
        }
    }
}

/// Per-iteration statistics
#[derive(Debug, Clone, PartialEq)]
pub struct IterationStats {
    /// 0 is the initial state
    pub iteration: usize,
    pub merit: f64,
    pub merit_change: f64,
    pub energy: f64,
    /// `‖X_new − X_old‖`
    pub step_norm: f64,
    pub rows: usize,
    pub unknowns: usize,
    pub nnz: usize,
    pub iter_time_ms: f64,
    pub total_time_ms: f64,
}

impl IterationStats {
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>13}  {:>11}  {:>8}  {:>8}  {:>9}  {:>11}",
            "iter",
            "merit",
            "merit_change",
            "energy",
            "|step|",
            "rows",
            "unknowns",
            "iter_time",
            "total_time"
        );
    }

    pub fn print_line(&self) {
        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>13.6e}  {:>11.2e}  {:>8}  {:>8}  {:>7.2}ms  {:>9.2}ms",
            self.iteration,
            self.merit,
            self.merit_change,
            self.energy,
            self.step_norm,
            self.rows,
            self.unknowns,
            self.iter_time_ms,
            self.total_time_ms
        );
    }
}

/// Result of [`GuidedProjection::iterate`]
#[derive(Debug, Clone)]
pub struct ProjectionOutcome {
    /// Final global vector
    pub x: Vec<f64>,
    pub converged: bool,
    pub status: OptimizationStatus,
    /// Solver iterations performed (0 when the initial state already converged)
    pub iterations: usize,
    pub initial_merit: f64,
    pub final_merit: f64,
    pub final_energy: f64,
    pub iteration_history: Vec<IterationStats>,
    pub diagnostics: Vec<Diagnostic>,
    pub total_time: Duration,
}

impl fmt::Display for ProjectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Guided Projection Final Result")?;
        if self.converged {
            writeln!(f, "CONVERGED ({})", self.status)?;
        } else {
            writeln!(f, "NOT CONVERGED ({})", self.status)?;
        }
        writeln!(f)?;
        writeln!(f, "Merit:")?;
        writeln!(f, "  Initial: {:.6e}", self.initial_merit)?;
        writeln!(f, "  Final:   {:.6e}", self.final_merit)?;
        writeln!(f, "Energy:")?;
        writeln!(f, "  Final:   {:.6e}", self.final_energy)?;
        writeln!(f)?;
        writeln!(f, "Iterations: {}", self.iterations)?;
        if !self.diagnostics.is_empty() {
            writeln!(f)?;
            writeln!(f, "Diagnostics:")?;
            for diagnostic in &self.diagnostics {
                writeln!(f, "  {diagnostic}")?;
            }
        }
        writeln!(f)?;
        writeln!(
            f,
            "Total time: {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(OptimizationStatus::Converged.to_string(), "Converged");
        assert_eq!(
            OptimizationStatus::MaxIterationsReached.to_string(),
            "Maximum iterations reached"
        );
    }

    #[test]
    fn test_outcome_display_lists_diagnostics() {
        let outcome = ProjectionOutcome {
            x: vec![],
            converged: false,
            status: OptimizationStatus::NumericalFailure,
            iterations: 1,
            initial_merit: 1.0,
            final_merit: 1.0,
            final_energy: 0.0,
            iteration_history: vec![],
            diagnostics: vec![Diagnostic::UnderConstrained {
                iteration: 1,
                rows: 1,
                unknowns: 7,
            }],
            total_time: Duration::from_millis(3),
        };
        let text = outcome.to_string();
        assert!(text.contains("NOT CONVERGED (Numerical failure)"));
        assert!(text.contains("1 rows for 7 unknowns"));
    }
}
