//! Energy strategies and energy sets.
//!
//! An energy is a soft least-squares term `weight · (Ki · X − Si)²`. Unlike a
//! constraint it is never driven to zero on its own; it only competes with
//! the other rows of the assembled system.

use std::fmt;

use nalgebra::DVector;

use super::{
    CoreError, CoreResult, Converter, GlobalLinearForm, GlobalVector, VariableRef,
    VariableRegistry,
};

/// Energy type producing `(Ki, Si)` on a reduced vector.
///
/// Types with a constant form simply return the stored pair and ignore the
/// argument.
pub trait EnergyType: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Length of the reduced vector the type operates on
    fn dimension(&self) -> usize;

    fn calculate(&self, x_reduced: &DVector<f64>) -> CoreResult<(DVector<f64>, f64)>;
}

/// Handle of a registered energy set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnergySetHandle(pub(crate) usize);

impl EnergySetHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One energy term bound to concrete variables
#[derive(Debug, Clone)]
pub struct Energy {
    variables: Vec<VariableRef>,
    converter: Converter,
    weight: f64,
    global: GlobalLinearForm,
}

impl Energy {
    pub fn variables(&self) -> &[VariableRef] {
        &self.variables
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn global(&self) -> &GlobalLinearForm {
        &self.global
    }
}

/// Energies sharing one energy type instance
#[derive(Debug)]
pub struct EnergySet {
    name: String,
    energy_type: Box<dyn EnergyType>,
    energies: Vec<Energy>,
}

impl EnergySet {
    pub fn new(name: impl Into<String>, energy_type: impl EnergyType + 'static) -> Self {
        Self {
            name: name.into(),
            energy_type: Box::new(energy_type),
            energies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn energy_type(&self) -> &dyn EnergyType {
        self.energy_type.as_ref()
    }

    pub fn energies(&self) -> &[Energy] {
        &self.energies
    }

    pub fn len(&self) -> usize {
        self.energies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }

    pub fn term_name(&self, index: usize) -> String {
        format!("energy set '{}' #{}", self.name, index)
    }

    pub fn add_energy(
        &mut self,
        registry: &VariableRegistry,
        variables: &[VariableRef],
        weight: f64,
    ) -> CoreResult<usize> {
        let index = self.energies.len();
        if !weight.is_finite() || weight < 0.0 {
            return Err(CoreError::InvalidWeight {
                term: self.term_name(index),
                weight,
            });
        }
        let converter = Converter::new(registry, variables)?;
        if converter.len() != self.energy_type.dimension() {
            return Err(CoreError::DimensionMismatch {
                term: self.term_name(index),
                expected: self.energy_type.dimension(),
                actual: converter.len(),
            });
        }
        self.energies.push(Energy {
            variables: variables.to_vec(),
            converter,
            weight,
            global: GlobalLinearForm::default(),
        });
        Ok(index)
    }

    fn local_form(
        &self,
        index: usize,
        x_reduced: &DVector<f64>,
    ) -> CoreResult<(DVector<f64>, f64)> {
        let (k, s) = self
            .energy_type
            .calculate(x_reduced)
            .map_err(|e| e.with_term(&self.term_name(index)))?;
        if k.len() != self.energy_type.dimension() {
            return Err(CoreError::DimensionMismatch {
                term: self.term_name(index),
                expected: self.energy_type.dimension(),
                actual: k.len(),
            });
        }
        Ok((k, s))
    }

    pub fn compute_and_globalise(&mut self, x: &GlobalVector) -> CoreResult<()> {
        for index in 0..self.energies.len() {
            let x_reduced = x.gather(self.energies[index].converter.indices());
            let (k, s) = self.local_form(index, &x_reduced)?;
            let energy = &mut self.energies[index];
            energy.global = GlobalLinearForm::globalise(&k, s, &energy.converter, energy.weight);
        }
        Ok(())
    }

    /// `Σ weight · (Ki · X − Si)²` with forms evaluated at `x`
    pub fn value(&self, x: &GlobalVector) -> CoreResult<f64> {
        let mut total = 0.0;
        for (index, energy) in self.energies.iter().enumerate() {
            let x_reduced = x.gather(energy.converter.indices());
            let (k, s) = self.local_form(index, &x_reduced)?;
            let r = k.dot(&x_reduced) - s;
            total += energy.weight * r * r;
        }
        Ok(total)
    }
}
