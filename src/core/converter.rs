//! Local→global index conversion for constraints and energies.

use super::{CoreResult, VariableRef, VariableRegistry};

/// Maps positions of a reduced vector to global indices.
///
/// Component `i` of the `j`-th referenced variable maps to
/// `first_rank + dimension * instance + i`, concatenated in reference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converter {
    indices: Vec<usize>,
}

impl Converter {
    /// Build the map, failing fast on unknown sets or out-of-range instances
    pub fn new(registry: &VariableRegistry, variables: &[VariableRef]) -> CoreResult<Self> {
        let mut indices = Vec::new();
        for &variable in variables {
            indices.extend(registry.range(variable)?);
        }
        Ok(Self { indices })
    }

    /// Reduced dimension
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn global(&self, local: usize) -> usize {
        self.indices[local]
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}
