use std::collections::HashSet;

use rayon::prelude::*;
use tracing::debug;

use super::{
    ConstraintSet, ConstraintSetHandle, ConstraintStrategy, CoreError, CoreResult, EnergySet,
    EnergySetHandle, EnergyType, GlobalVector, VariableRef, VariableRegistry, VariableSetHandle,
};

/// Variable layout plus every constraint and energy set of a problem.
///
/// The problem never owns the values of the unknowns; those live in a
/// [`GlobalVector`] passed in by the caller.
#[derive(Debug, Default)]
pub struct Problem {
    registry: VariableRegistry,
    constraint_sets: Vec<ConstraintSet>,
    energy_sets: Vec<EnergySet>,
    fixed_variables: HashSet<VariableRef>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut VariableRegistry {
        &mut self.registry
    }

    pub fn register_variable_set(
        &mut self,
        count: usize,
        dimension: usize,
    ) -> CoreResult<VariableSetHandle> {
        self.registry.register(count, dimension)
    }

    pub fn add_constraint_set(
        &mut self,
        name: impl Into<String>,
        strategy: ConstraintStrategy,
    ) -> ConstraintSetHandle {
        let set = ConstraintSet::new(name, strategy);
        debug!(
            "Added constraint set '{}' ({}, dimension {})",
            set.name(),
            set.strategy().name(),
            set.strategy().dimension()
        );
        self.constraint_sets.push(set);
        ConstraintSetHandle(self.constraint_sets.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        set: ConstraintSetHandle,
        variables: &[VariableRef],
        ci: Option<f64>,
        weight: f64,
    ) -> CoreResult<usize> {
        let constraint_set = self
            .constraint_sets
            .get_mut(set.0)
            .ok_or(CoreError::UnknownConstraintSet(set.0))?;
        constraint_set.add_constraint(&self.registry, variables, ci, weight)
    }

    pub fn add_energy_set(
        &mut self,
        name: impl Into<String>,
        energy_type: impl EnergyType + 'static,
    ) -> EnergySetHandle {
        let set = EnergySet::new(name, energy_type);
        debug!(
            "Added energy set '{}' ({}, dimension {})",
            set.name(),
            set.energy_type().name(),
            set.energy_type().dimension()
        );
        self.energy_sets.push(set);
        EnergySetHandle(self.energy_sets.len() - 1)
    }

    pub fn add_energy(
        &mut self,
        set: EnergySetHandle,
        variables: &[VariableRef],
        weight: f64,
    ) -> CoreResult<usize> {
        let energy_set = self
            .energy_sets
            .get_mut(set.0)
            .ok_or(CoreError::UnknownEnergySet(set.0))?;
        energy_set.add_energy(&self.registry, variables, weight)
    }

    /// Exclude an instance from the unknowns; its value is kept as is
    pub fn fix_variable(&mut self, variable: VariableRef) -> CoreResult<()> {
        self.registry.range(variable)?;
        self.fixed_variables.insert(variable);
        Ok(())
    }

    pub fn unfix_variable(&mut self, variable: VariableRef) {
        self.fixed_variables.remove(&variable);
    }

    pub fn is_fixed(&self, variable: VariableRef) -> bool {
        self.fixed_variables.contains(&variable)
    }

    /// Per global slot: whether it belongs to a fixed instance
    pub fn fixed_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.registry.total_dof()];
        for &variable in &self.fixed_variables {
            if let Ok(range) = self.registry.range(variable) {
                mask[range].iter_mut().for_each(|m| *m = true);
            }
        }
        mask
    }

    pub fn constraint_sets(&self) -> &[ConstraintSet] {
        &self.constraint_sets
    }

    pub fn energy_sets(&self) -> &[EnergySet] {
        &self.energy_sets
    }

    pub fn constraint_set(&self, set: ConstraintSetHandle) -> CoreResult<&ConstraintSet> {
        self.constraint_sets
            .get(set.0)
            .ok_or(CoreError::UnknownConstraintSet(set.0))
    }

    pub fn energy_set(&self, set: EnergySetHandle) -> CoreResult<&EnergySet> {
        self.energy_sets
            .get(set.0)
            .ok_or(CoreError::UnknownEnergySet(set.0))
    }

    pub fn num_constraints(&self) -> usize {
        self.constraint_sets.iter().map(ConstraintSet::len).sum()
    }

    pub fn num_energies(&self) -> usize {
        self.energy_sets.iter().map(EnergySet::len).sum()
    }

    /// Globalize every set at `x`.
    ///
    /// Sets own disjoint storage and only read `x`, so with `parallel` they are
    /// processed on the rayon pool. The first failing set (in registration
    /// order) is reported.
    pub fn compute_and_globalise(&mut self, x: &GlobalVector, parallel: bool) -> CoreResult<()> {
        if parallel {
            let constraint_results: Vec<CoreResult<()>> = self
                .constraint_sets
                .par_iter_mut()
                .map(|set| set.compute_and_globalise(x))
                .collect();
            constraint_results.into_iter().collect::<CoreResult<()>>()?;

            let energy_results: Vec<CoreResult<()>> = self
                .energy_sets
                .par_iter_mut()
                .map(|set| set.compute_and_globalise(x))
                .collect();
            energy_results.into_iter().collect()
        } else {
            for set in &mut self.constraint_sets {
                set.compute_and_globalise(x)?;
            }
            for set in &mut self.energy_sets {
                set.compute_and_globalise(x)?;
            }
            Ok(())
        }
    }

    /// Give auxiliary unknowns their starting values before the first iteration.
    ///
    /// `assigned` flags the global slots set by the caller and is updated with
    /// every slot written here. Fixed instances are never touched.
    pub fn seed_auxiliaries(&self, x: &mut GlobalVector, assigned: &mut [bool]) -> usize {
        let fixed = self.fixed_mask();
        let mut seeded = 0;
        for set in &self.constraint_sets {
            seeded += set.seed_auxiliaries(x, assigned, &fixed);
        }
        seeded
    }

    /// Weighted sum of squared constraint residuals at `x`
    pub fn merit(&self, x: &GlobalVector) -> CoreResult<f64> {
        self.constraint_sets
            .iter()
            .map(|set| set.merit(x))
            .sum()
    }

    /// Total energy at `x`
    pub fn energy(&self, x: &GlobalVector) -> CoreResult<f64> {
        self.energy_sets.iter().map(|set| set.value(x)).sum()
    }
}
