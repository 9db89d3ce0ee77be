//! Guided projection solver.
//!
//! Owns the problem description, the global vector `X` and the iteration
//! loop. Every iteration re-linearizes the constraints about the current `X`,
//! assembles the stacked system (constraints, energies, damping), solves it in
//! the least-squares sense and replaces `X` with the solution.
//!
//! # Example
//!
//! ```no_run
//! use guided_projection::constraints::CoherentLength;
//! use guided_projection::core::ConstraintStrategy;
//! use guided_projection::GuidedProjection;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut solver = GuidedProjection::new();
//! let points = solver.register_variable_set(2, 3)?;
//! let lengths = solver.register_variable_set(1, 1)?;
//! solver.set_variable_value(points.at(1), &[1.0, 0.0, 0.0])?;
//! solver.set_variable_value(lengths.at(0), &[0.5])?;
//!
//! let strategy = ConstraintStrategy::quadratic(CoherentLength::new());
//! let set = solver.add_constraint_set("length", strategy);
//! solver.add_constraint(set, &[points.at(0), points.at(1), lengths.at(0)], None, 1.0)?;
//!
//! let outcome = solver.iterate(50, 1e-12)?;
//! println!("{}", outcome);
//! # Ok(())
//! # }
//! ```

use std::time::Instant;

use tracing::{debug, info, warn};

use super::{
    Assembler, Diagnostic, IterationStats, ObserverControl, ObserverVec, OptimizationStatus,
    ProjectionObserver, ProjectionOutcome, SolverState,
};
use crate::core::{
    ConstraintSetHandle, ConstraintStrategy, CoreError, EnergySetHandle, EnergyType, GlobalVector,
    Problem, VariableRef, VariableSetHandle,
};
use crate::error::{ProjectionError, ProjectionResult};
use crate::linalg::{LinAlgError, SparseQRSolver};

/// Configuration for [`GuidedProjection`]
#[derive(Debug, Clone)]
pub struct GuidedProjectionConfig {
    /// Iteration cap used by [`GuidedProjection::solve`]
    pub max_iterations: usize,
    /// Merit threshold
    pub tolerance: f64,
    /// `‖X_new − X_old‖` threshold, applied when energies are present
    pub step_tolerance: f64,
    /// Weight ε of the damping rows `√ε (X − Xk)`; 0 disables them
    pub regularization: f64,
    /// Globalize sets on the rayon pool
    pub parallel: bool,
}

impl Default for GuidedProjectionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-12,
            step_tolerance: 1e-10,
            regularization: 1e-6,
            parallel: true,
        }
    }
}

impl GuidedProjectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_step_tolerance(mut self, step_tolerance: f64) -> Self {
        self.step_tolerance = step_tolerance;
        self
    }

    /// Negative values are clamped to 0
    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization.max(0.0);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Max iterations:  {}\n  Tolerance:       {:.2e}\n  Step tolerance:  {:.2e}\n  Regularization:  {:.2e}\n  Parallel:        {}",
            self.max_iterations,
            self.tolerance,
            self.step_tolerance,
            self.regularization,
            self.parallel
        );
    }
}

/// Guided projection solver
pub struct GuidedProjection {
    config: GuidedProjectionConfig,
    problem: Problem,
    x: GlobalVector,
    /// Slots written through [`GuidedProjection::set_variable_value`]
    assigned: Vec<bool>,
    state: SolverState,
    observers: ObserverVec,
}

impl Default for GuidedProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl GuidedProjection {
    pub fn new() -> Self {
        Self::with_config(GuidedProjectionConfig::default())
    }

    pub fn with_config(config: GuidedProjectionConfig) -> Self {
        Self {
            config,
            problem: Problem::new(),
            x: GlobalVector::default(),
            assigned: Vec::new(),
            state: SolverState::Idle,
            observers: ObserverVec::new(),
        }
    }

    pub fn config(&self) -> &GuidedProjectionConfig {
        &self.config
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Current global vector
    pub fn x(&self) -> &GlobalVector {
        &self.x
    }

    /// Register `count` instances of `dimension` components, initialized to 0.
    ///
    /// Auxiliary unknowns (edge lengths, bound dummies) left unset are given
    /// a starting value by their constraint type on the first iteration.
    ///
    /// Fails once the layout is sealed by the first call to [`iterate`](Self::iterate).
    pub fn register_variable_set(
        &mut self,
        count: usize,
        dimension: usize,
    ) -> ProjectionResult<VariableSetHandle> {
        let handle = self.problem.register_variable_set(count, dimension)?;
        self.x.resize(self.problem.registry().total_dof());
        self.assigned.resize(self.x.len(), false);
        debug!(
            "Registered variable set {} ({} x {}), total unknowns {}",
            handle.index(),
            count,
            dimension,
            self.x.len()
        );
        Ok(handle)
    }

    pub fn set_variable_value(
        &mut self,
        variable: VariableRef,
        values: &[f64],
    ) -> ProjectionResult<()> {
        let range = self.problem.registry().range(variable)?;
        if values.len() != range.len() {
            return Err(CoreError::ValueLength {
                expected: range.len(),
                actual: values.len(),
            }
            .into());
        }
        self.assigned[range.clone()].iter_mut().for_each(|a| *a = true);
        self.x.write(range, values);
        Ok(())
    }

    pub fn variable_value(&self, variable: VariableRef) -> ProjectionResult<Vec<f64>> {
        let range = self.problem.registry().range(variable)?;
        Ok(self.x.as_slice()[range].to_vec())
    }

    pub fn add_constraint_set(
        &mut self,
        name: impl Into<String>,
        strategy: ConstraintStrategy,
    ) -> ConstraintSetHandle {
        self.problem.add_constraint_set(name, strategy)
    }

    /// Add one constraint; `ci` overrides the constant term of the set's form
    pub fn add_constraint(
        &mut self,
        set: ConstraintSetHandle,
        variables: &[VariableRef],
        ci: Option<f64>,
        weight: f64,
    ) -> ProjectionResult<usize> {
        Ok(self.problem.add_constraint(set, variables, ci, weight)?)
    }

    pub fn add_energy_set(
        &mut self,
        name: impl Into<String>,
        energy_type: impl EnergyType + 'static,
    ) -> EnergySetHandle {
        self.problem.add_energy_set(name, energy_type)
    }

    pub fn add_energy(
        &mut self,
        set: EnergySetHandle,
        variables: &[VariableRef],
        weight: f64,
    ) -> ProjectionResult<usize> {
        Ok(self.problem.add_energy(set, variables, weight)?)
    }

    /// Keep an instance at its current value during iteration
    pub fn fix_variable(&mut self, variable: VariableRef) -> ProjectionResult<()> {
        Ok(self.problem.fix_variable(variable)?)
    }

    pub fn unfix_variable(&mut self, variable: VariableRef) {
        self.problem.unfix_variable(variable);
    }

    pub fn add_observer(&mut self, observer: impl ProjectionObserver + 'static) {
        self.observers.add(observer);
    }

    /// Constraint merit at the current `X`
    pub fn merit(&self) -> ProjectionResult<f64> {
        Ok(self.problem.merit(&self.x)?)
    }

    /// Total energy at the current `X`
    pub fn energy(&self) -> ProjectionResult<f64> {
        Ok(self.problem.energy(&self.x)?)
    }

    /// Iterate with the configured cap and tolerance
    pub fn solve(&mut self) -> ProjectionResult<ProjectionOutcome> {
        self.iterate(self.config.max_iterations, self.config.tolerance)
    }

    /// Run at most `max_iterations` guided projection steps.
    ///
    /// Stops as soon as the merit is at or below `tolerance` (and, when
    /// energies are present, the last step was shorter than the step
    /// tolerance). Failing to converge is reported in the outcome, not as an
    /// error. Degenerate terms abort the call with the offending term named.
    pub fn iterate(
        &mut self,
        max_iterations: usize,
        tolerance: f64,
    ) -> ProjectionResult<ProjectionOutcome> {
        let result = self.run(max_iterations, tolerance);
        if result.is_err() {
            self.state = SolverState::Idle;
        }
        result
    }

    fn run(
        &mut self,
        max_iterations: usize,
        tolerance: f64,
    ) -> ProjectionResult<ProjectionOutcome> {
        let start_time = Instant::now();
        if !self.problem.registry().is_sealed() {
            let seeded = self
                .problem
                .seed_auxiliaries(&mut self.x, &mut self.assigned);
            if seeded > 0 {
                debug!("Seeded {} auxiliary unknowns", seeded);
            }
            self.problem.registry_mut().seal();
        }
        self.config.print_configuration();

        let has_energies = self.problem.num_energies() > 0;
        let fixed = self.problem.fixed_mask();
        let assembler = Assembler::new(self.config.regularization);
        let mut qr = SparseQRSolver::new();

        let initial_merit = self.problem.merit(&self.x)?;
        let mut merit = initial_merit;
        let mut energy = self.problem.energy(&self.x)?;

        info!(
            "Guided projection: {} unknowns ({} fixed), {} constraints, {} energies",
            self.x.len(),
            fixed.iter().filter(|&&f| f).count(),
            self.problem.num_constraints(),
            self.problem.num_energies()
        );

        let mut history = vec![IterationStats {
            iteration: 0,
            merit,
            merit_change: 0.0,
            energy,
            step_norm: 0.0,
            rows: 0,
            unknowns: 0,
            nnz: 0,
            iter_time_ms: 0.0,
            total_time_ms: 0.0,
        }];
        IterationStats::print_header();
        history[0].print_line();

        let mut diagnostics = Vec::new();
        let mut pinned_reported = false;
        let mut iterations = 0;
        let mut status = None;

        if merit <= tolerance && (!has_energies || energy <= tolerance) {
            status = Some(OptimizationStatus::Converged);
        }

        while status.is_none() && iterations < max_iterations {
            let iter_start = Instant::now();
            iterations += 1;

            self.state = SolverState::Assembling;
            self.problem
                .compute_and_globalise(&self.x, self.config.parallel)?;
            let system = assembler.assemble(&self.problem, &self.x, &fixed)?;

            if system.pinned_columns > 0 && !pinned_reported {
                warn!(
                    "{} unknowns appear in no constraint or energy and are held fixed",
                    system.pinned_columns
                );
                diagnostics.push(Diagnostic::UnconstrainedVariables {
                    iteration: iterations,
                    count: system.pinned_columns,
                });
                pinned_reported = true;
            }

            self.state = SolverState::Solving;
            let solution = if system.ncols() == 0 {
                Vec::new()
            } else {
                match qr.solve_least_squares(&system.matrix, &system.rhs) {
                    Ok(solution) => solution,
                    Err(LinAlgError::UnderDetermined { rows, cols }) => {
                        warn!(
                            "Under-constrained system: {} rows for {} unknowns; enable regularization",
                            rows, cols
                        );
                        diagnostics.push(Diagnostic::UnderConstrained {
                            iteration: iterations,
                            rows,
                            unknowns: cols,
                        });
                        status = Some(OptimizationStatus::NumericalFailure);
                        break;
                    }
                    Err(LinAlgError::NonFiniteSolution(detail)) => {
                        warn!("Least-squares solve failed: {}", detail);
                        diagnostics.push(Diagnostic::RankDeficient {
                            iteration: iterations,
                            detail,
                        });
                        status = Some(OptimizationStatus::NumericalFailure);
                        break;
                    }
                    Err(e) => return Err(ProjectionError::from(e)),
                }
            };

            let new_values = system.columns.scatter(self.x.as_slice(), &solution);
            let step_norm = new_values
                .iter()
                .zip(self.x.as_slice())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            self.x.replace(new_values);

            let previous_merit = merit;
            merit = self.problem.merit(&self.x)?;
            energy = self.problem.energy(&self.x)?;

            let stats = IterationStats {
                iteration: iterations,
                merit,
                merit_change: previous_merit - merit,
                energy,
                step_norm,
                rows: system.nrows(),
                unknowns: system.ncols(),
                nnz: system.nnz,
                iter_time_ms: iter_start.elapsed().as_secs_f64() * 1000.0,
                total_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
            };
            stats.print_line();

            if !merit.is_finite() || !energy.is_finite() {
                warn!("Merit became non-finite at iteration {}", iterations);
                history.push(stats);
                status = Some(OptimizationStatus::Diverged);
                break;
            }

            let control = self.observers.notify(&stats, self.x.as_slice());
            history.push(stats);

            if merit <= tolerance && (!has_energies || step_norm < self.config.step_tolerance) {
                status = Some(OptimizationStatus::Converged);
            } else if control == ObserverControl::Stop {
                info!("Stopped by observer after iteration {}", iterations);
                status = Some(OptimizationStatus::UserTerminated);
            }
        }

        let status = status.unwrap_or(OptimizationStatus::MaxIterationsReached);
        self.state = match status {
            OptimizationStatus::Converged => SolverState::Converged,
            OptimizationStatus::MaxIterationsReached => SolverState::MaxIterationsReached,
            OptimizationStatus::Diverged => SolverState::Diverged,
            OptimizationStatus::UserTerminated | OptimizationStatus::NumericalFailure => {
                SolverState::Idle
            }
        };

        let converged = status == OptimizationStatus::Converged;
        if converged {
            info!(
                "Converged after {} iterations, merit {:.3e}",
                iterations, merit
            );
        } else if status == OptimizationStatus::MaxIterationsReached {
            warn!(
                "Maximum iterations ({}) reached, merit {:.3e}",
                max_iterations, merit
            );
        }

        let outcome = ProjectionOutcome {
            x: self.x.as_slice().to_vec(),
            converged,
            status,
            iterations,
            initial_merit,
            final_merit: merit,
            final_energy: energy,
            iteration_history: history,
            diagnostics,
            total_time: start_time.elapsed(),
        };
        self.observers.notify_complete(&outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, DVector, Vector3};

    use super::*;
    use crate::constraints::CoherentLength;
    use crate::core::{CoreResult, LinearisedConstraintType};
    use crate::energies::{PointAnchor, SegmentOrthogonality};

    /// `b(x)·x − 1` with a slope `b = 1 + 1e200·x²` that blows up away from 0
    #[derive(Debug)]
    struct Steepening;

    impl LinearisedConstraintType for Steepening {
        fn name(&self) -> &str {
            "Steepening"
        }

        fn dimension(&self) -> usize {
            1
        }

        fn constant(&self) -> Option<f64> {
            Some(-1.0)
        }

        fn calculate(&self, x: &DVector<f64>) -> CoreResult<(DMatrix<f64>, DVector<f64>)> {
            let slope = 1.0 + 1e200 * x[0] * x[0];
            Ok((DMatrix::zeros(1, 1), DVector::from_element(1, slope)))
        }
    }

    #[test]
    fn test_config_builders() {
        let config = GuidedProjectionConfig::new()
            .with_max_iterations(7)
            .with_tolerance(1e-8)
            .with_step_tolerance(1e-6)
            .with_regularization(-1.0)
            .with_parallel(false);
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.tolerance, 1e-8);
        assert_eq!(config.step_tolerance, 1e-6);
        assert_eq!(config.regularization, 0.0);
        assert!(!config.parallel);

        let defaults = GuidedProjectionConfig::default();
        assert_eq!(defaults.max_iterations, 100);
        assert_eq!(defaults.regularization, 1e-6);
    }

    #[test]
    fn test_values_are_validated() {
        let mut solver = GuidedProjection::new();
        let points = solver.register_variable_set(2, 3).unwrap();
        assert!(matches!(
            solver.set_variable_value(points.at(0), &[1.0, 2.0]),
            Err(ProjectionError::Configuration(_))
        ));
        assert!(solver.set_variable_value(points.at(2), &[1.0, 2.0, 3.0]).is_err());

        solver.set_variable_value(points.at(1), &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(solver.variable_value(points.at(1)).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(solver.x().as_slice(), &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_registration_sealed_after_iterate() {
        let mut solver = GuidedProjection::new();
        solver.register_variable_set(1, 2).unwrap();
        solver.iterate(1, 1e-12).unwrap();
        assert!(matches!(
            solver.register_variable_set(1, 1),
            Err(ProjectionError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_iteration_cap() {
        let mut solver = GuidedProjection::new();
        let values = solver.register_variable_set(1, 1).unwrap();
        let set = solver.add_energy_set("anchor", PointAnchor::new(1, 0, 2.0).unwrap());
        solver.add_energy(set, &[values.at(0)], 1.0).unwrap();

        let outcome = solver.iterate(0, 1e-12).unwrap();
        assert_eq!(outcome.status, OptimizationStatus::MaxIterationsReached);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.x, vec![0.0]);
        assert_eq!(solver.state(), SolverState::MaxIterationsReached);
    }

    #[test]
    fn test_anchor_pulls_value_and_bumps_version() {
        let mut solver = GuidedProjection::with_config(
            GuidedProjectionConfig::new().with_parallel(false),
        );
        let values = solver.register_variable_set(1, 1).unwrap();
        let set = solver.add_energy_set("anchor", PointAnchor::new(1, 0, 2.0).unwrap());
        solver.add_energy(set, &[values.at(0)], 1.0).unwrap();

        let outcome = solver.solve().unwrap();
        assert!(outcome.converged);
        assert!((outcome.x[0] - 2.0).abs() < 1e-5);
        assert_eq!(solver.x().version(), outcome.iterations as u64);
        assert_eq!(solver.state(), SolverState::Converged);
    }

    #[test]
    fn test_without_regularization_reports_under_constrained() {
        let mut solver = GuidedProjection::with_config(
            GuidedProjectionConfig::new().with_regularization(0.0),
        );
        let points = solver.register_variable_set(2, 3).unwrap();
        let lengths = solver.register_variable_set(1, 1).unwrap();
        solver
            .set_variable_value(points.at(1), &[1.0, 1.0, 1.0])
            .unwrap();
        solver.set_variable_value(lengths.at(0), &[0.5]).unwrap();
        let set = solver
            .add_constraint_set("length", ConstraintStrategy::quadratic(CoherentLength::new()));
        solver
            .add_constraint(set, &[points.at(0), points.at(1), lengths.at(0)], None, 1.0)
            .unwrap();

        let outcome = solver.iterate(5, 1e-12).unwrap();
        assert_eq!(outcome.status, OptimizationStatus::NumericalFailure);
        assert!(!outcome.converged);
        assert!(matches!(
            outcome.diagnostics.last(),
            Some(Diagnostic::UnderConstrained {
                rows: 1,
                unknowns: 7,
                ..
            })
        ));
        assert_eq!(outcome.x, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.5]);
    }

    #[test]
    fn test_rank_deficient_system_is_reported() {
        let mut solver = GuidedProjection::with_config(
            GuidedProjectionConfig::new().with_regularization(0.0),
        );
        let points = solver.register_variable_set(2, 3).unwrap();
        solver.set_variable_value(points.at(1), &[1.0, 1.0, 1.0]).unwrap();
        let set = solver.add_energy_set(
            "orthogonality",
            SegmentOrthogonality::new(Vector3::new(1.0, 0.0, 0.0)).unwrap(),
        );
        // six copies of one row: tall enough, but rank one on the x columns
        for _ in 0..6 {
            solver.add_energy(set, &[points.at(0), points.at(1)], 1.0).unwrap();
        }

        let outcome = solver.iterate(5, 1e-12).unwrap();
        assert_eq!(outcome.status, OptimizationStatus::NumericalFailure);
        assert!(!outcome.converged);
        assert!(matches!(
            outcome.diagnostics.last(),
            Some(Diagnostic::RankDeficient { iteration: 1, .. })
        ));
        assert_eq!(outcome.x, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(solver.x().version(), 0);
        assert_eq!(solver.state(), SolverState::Idle);
    }

    #[test]
    fn test_non_finite_merit_diverges() {
        let mut solver = GuidedProjection::new();
        let values = solver.register_variable_set(1, 1).unwrap();
        let set = solver.add_constraint_set("steep", ConstraintStrategy::linearised(Steepening));
        solver.add_constraint(set, &[values.at(0)], None, 1.0).unwrap();

        let outcome = solver.iterate(10, 1e-12).unwrap();
        assert_eq!(outcome.initial_merit, 1.0);
        assert_eq!(outcome.status, OptimizationStatus::Diverged);
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.final_merit.is_finite());
        assert_eq!(solver.state(), SolverState::Diverged);
    }

    #[test]
    fn test_unset_length_is_seeded_once() {
        let mut solver = GuidedProjection::new();
        let points = solver.register_variable_set(2, 3).unwrap();
        let lengths = solver.register_variable_set(1, 1).unwrap();
        solver.set_variable_value(points.at(1), &[0.0, 3.0, 4.0]).unwrap();
        let set = solver
            .add_constraint_set("length", ConstraintStrategy::quadratic(CoherentLength::new()));
        solver
            .add_constraint(set, &[points.at(0), points.at(1), lengths.at(0)], None, 1.0)
            .unwrap();

        let outcome = solver.iterate(5, 1e-12).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(solver.variable_value(lengths.at(0)).unwrap(), vec![5.0]);

        // later calls keep whatever the caller writes
        solver.set_variable_value(lengths.at(0), &[0.0]).unwrap();
        solver.iterate(0, 1e-12).unwrap();
        assert_eq!(solver.variable_value(lengths.at(0)).unwrap(), vec![0.0]);
    }
}
