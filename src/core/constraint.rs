//! Constraint strategies and constraint sets.
//!
//! A constraint type is one of two strategies:
//!
//! - [`QuadraticConstraintType`]: a constant local form `(Hi, Bi, Ci)` fixed at
//!   construction. The nonlinearity lives entirely in the bilinear structure
//!   (e.g. `|p1 − p0|² − l² = 0`).
//! - [`LinearisedConstraintType`]: `(Hi, Bi)` recomputed from the current
//!   reduced vector every iteration, for constraints that must be re-centered
//!   at each iterate.
//!
//! Both are wrapped in the closed [`ConstraintStrategy`] enum. A
//! [`ConstraintSet`] shares one strategy among many [`Constraint`]s that bind
//! different variables.

use std::borrow::Cow;
use std::fmt;

use nalgebra::{DMatrix, DVector};

use super::{
    CoreError, CoreResult, Converter, GlobalQuadraticForm, GlobalVector, LocalQuadraticForm,
    VariableRef, VariableRegistry,
};

/// Constraint type with a constant local form
pub trait QuadraticConstraintType: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// `(Hi, Bi, Ci)` computed once from structural parameters
    fn local_form(&self) -> &LocalQuadraticForm;

    /// Starting values for auxiliary components, as `(local index, value)`.
    ///
    /// Called once before the first iteration. `assigned` flags the reduced
    /// entries whose value was set by the caller. An auxiliary left where its
    /// gradient vanishes (a length or dummy at 0) would never move.
    fn auxiliary_values(
        &self,
        _x_reduced: &DVector<f64>,
        _assigned: &[bool],
    ) -> Vec<(usize, f64)> {
        Vec::new()
    }
}

/// Constraint type re-linearised about the current iterate
pub trait LinearisedConstraintType: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Length of the reduced vector the type operates on
    fn dimension(&self) -> usize;

    /// Default `Ci` used when a constraint does not provide its own
    fn constant(&self) -> Option<f64> {
        None
    }

    /// `(Hi, Bi)` at the given reduced vector
    fn calculate(&self, x_reduced: &DVector<f64>) -> CoreResult<(DMatrix<f64>, DVector<f64>)>;
}

/// Closed set of constraint strategies
#[derive(Debug)]
pub enum ConstraintStrategy {
    Quadratic(Box<dyn QuadraticConstraintType>),
    Linearised(Box<dyn LinearisedConstraintType>),
}

impl ConstraintStrategy {
    pub fn quadratic(constraint_type: impl QuadraticConstraintType + 'static) -> Self {
        ConstraintStrategy::Quadratic(Box::new(constraint_type))
    }

    pub fn linearised(constraint_type: impl LinearisedConstraintType + 'static) -> Self {
        ConstraintStrategy::Linearised(Box::new(constraint_type))
    }

    pub fn name(&self) -> &str {
        match self {
            ConstraintStrategy::Quadratic(t) => t.name(),
            ConstraintStrategy::Linearised(t) => t.name(),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            ConstraintStrategy::Quadratic(t) => t.local_form().dimension(),
            ConstraintStrategy::Linearised(t) => t.dimension(),
        }
    }

    /// Auxiliary starting values; linearised types carry no auxiliaries
    pub fn auxiliary_values(
        &self,
        x_reduced: &DVector<f64>,
        assigned: &[bool],
    ) -> Vec<(usize, f64)> {
        match self {
            ConstraintStrategy::Quadratic(t) => t.auxiliary_values(x_reduced, assigned),
            ConstraintStrategy::Linearised(_) => Vec::new(),
        }
    }

    /// Local form at `x_reduced`; borrowed for quadratic types
    pub fn local_form(&self, x_reduced: &DVector<f64>) -> CoreResult<Cow<'_, LocalQuadraticForm>> {
        match self {
            ConstraintStrategy::Quadratic(t) => Ok(Cow::Borrowed(t.local_form())),
            ConstraintStrategy::Linearised(t) => {
                let (hessian, linear) = t.calculate(x_reduced)?;
                if linear.len() != t.dimension() {
                    return Err(CoreError::DimensionMismatch {
                        term: t.name().to_string(),
                        expected: t.dimension(),
                        actual: linear.len(),
                    });
                }
                LocalQuadraticForm::new(hessian, linear, t.constant()).map(Cow::Owned)
            }
        }
    }
}

/// Handle of a registered constraint set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintSetHandle(pub(crate) usize);

impl ConstraintSetHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One constraint instance bound to concrete variables
#[derive(Debug, Clone)]
pub struct Constraint {
    variables: Vec<VariableRef>,
    converter: Converter,
    ci: Option<f64>,
    weight: f64,
    global: GlobalQuadraticForm,
}

impl Constraint {
    pub fn variables(&self) -> &[VariableRef] {
        &self.variables
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Globalized form from the last [`ConstraintSet::compute_and_globalise`]
    pub fn global(&self) -> &GlobalQuadraticForm {
        &self.global
    }

    /// Own `Ci` if given, else the type's, else zero
    fn constant(&self, form: &LocalQuadraticForm) -> f64 {
        self.ci.or(form.constant()).unwrap_or(0.0)
    }
}

/// Constraints sharing one strategy instance
#[derive(Debug)]
pub struct ConstraintSet {
    name: String,
    strategy: ConstraintStrategy,
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new(name: impl Into<String>, strategy: ConstraintStrategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &ConstraintStrategy {
        &self.strategy
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Identity used in diagnostics and errors
    pub fn term_name(&self, index: usize) -> String {
        format!("constraint set '{}' #{}", self.name, index)
    }

    /// Bind the strategy to `variables`; returns the index of the new constraint.
    ///
    /// Fails fast on unregistered sets, out-of-range instances, a reduced
    /// dimension that differs from the strategy's, or a negative weight.
    pub fn add_constraint(
        &mut self,
        registry: &VariableRegistry,
        variables: &[VariableRef],
        ci: Option<f64>,
        weight: f64,
    ) -> CoreResult<usize> {
        let index = self.constraints.len();
        if !weight.is_finite() || weight < 0.0 {
            return Err(CoreError::InvalidWeight {
                term: self.term_name(index),
                weight,
            });
        }
        let converter = Converter::new(registry, variables)?;
        if converter.len() != self.strategy.dimension() {
            return Err(CoreError::DimensionMismatch {
                term: self.term_name(index),
                expected: self.strategy.dimension(),
                actual: converter.len(),
            });
        }
        self.constraints.push(Constraint {
            variables: variables.to_vec(),
            converter,
            ci,
            weight,
            global: GlobalQuadraticForm::default(),
        });
        Ok(index)
    }

    /// Recompute local forms where needed and store their globalized versions
    pub fn compute_and_globalise(&mut self, x: &GlobalVector) -> CoreResult<()> {
        let name = &self.name;
        for (index, constraint) in self.constraints.iter_mut().enumerate() {
            let x_reduced = x.gather(constraint.converter.indices());
            let form = self.strategy.local_form(&x_reduced).map_err(|e| {
                e.with_term(&format!("constraint set '{}' #{}", name, index))
            })?;
            let constant = constraint.constant(&form);
            constraint.global = form.globalise(&constraint.converter, constant, constraint.weight);
        }
        Ok(())
    }

    /// Write auxiliary starting values into `x`; returns how many slots were written.
    ///
    /// Fixed slots are left alone. Written slots are flagged in `assigned`, so
    /// a slot shared by several constraints keeps the first value.
    pub fn seed_auxiliaries(
        &self,
        x: &mut GlobalVector,
        assigned: &mut [bool],
        fixed: &[bool],
    ) -> usize {
        let mut seeded = 0;
        for constraint in &self.constraints {
            let indices = constraint.converter.indices();
            let x_reduced = x.gather(indices);
            let local_assigned: Vec<bool> = indices.iter().map(|&g| assigned[g]).collect();
            for (local, value) in self.strategy.auxiliary_values(&x_reduced, &local_assigned) {
                let Some(&global) = indices.get(local) else {
                    continue;
                };
                if fixed[global] || !value.is_finite() {
                    continue;
                }
                x.write(global..global + 1, &[value]);
                assigned[global] = true;
                seeded += 1;
            }
        }
        seeded
    }

    /// Original (non-linearised) residual of every constraint at `x`
    pub fn residuals(&self, x: &GlobalVector) -> CoreResult<Vec<f64>> {
        self.constraints
            .iter()
            .enumerate()
            .map(|(index, constraint)| {
                let x_reduced = x.gather(constraint.converter.indices());
                let form = self
                    .strategy
                    .local_form(&x_reduced)
                    .map_err(|e| e.with_term(&self.term_name(index)))?;
                Ok(form.evaluate_with_constant(&x_reduced, constraint.constant(&form)))
            })
            .collect()
    }

    /// `Σ weight · f(x)²`
    pub fn merit(&self, x: &GlobalVector) -> CoreResult<f64> {
        Ok(self
            .residuals(x)?
            .iter()
            .zip(&self.constraints)
            .map(|(r, c)| c.weight * r * r)
            .sum())
    }
}
