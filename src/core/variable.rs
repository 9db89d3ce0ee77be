//! Variable sets and the global unknown vector.
//!
//! Every unknown of the problem lives in one flat `f64` buffer, the
//! [`GlobalVector`]. A [`VariableSet`] reserves a contiguous slice of that
//! buffer for `count` instances of a `dimension`-component variable (points
//! are `dimension = 3`, scalars `dimension = 1`, ...). Sets are registered in
//! order, so their ranges partition `[0, total_dof)` without gaps.

use std::ops::Range;

use nalgebra::DVector;
use tracing::debug;

use super::{CoreError, CoreResult};

/// Opaque handle returned when a variable set is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableSetHandle(pub(crate) usize);

impl VariableSetHandle {
    /// Registration order of the set
    pub fn index(&self) -> usize {
        self.0
    }

    /// Reference to one instance of this set
    pub fn at(self, instance: usize) -> VariableRef {
        VariableRef {
            set: self,
            instance,
        }
    }
}

/// Addressing token for a single variable instance; never owns data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableRef {
    pub set: VariableSetHandle,
    pub instance: usize,
}

/// A named block of same-sized variables inside the global vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSet {
    first_rank: usize,
    dimension: usize,
    count: usize,
}

impl VariableSet {
    /// Offset of the first component in the global vector
    pub fn first_rank(&self) -> usize {
        self.first_rank
    }

    /// Scalar components per instance
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of instances
    pub fn count(&self) -> usize {
        self.count
    }

    /// Total number of scalar slots reserved by the set
    pub fn len(&self) -> usize {
        self.dimension * self.count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the last global slot of the set
    pub fn end(&self) -> usize {
        self.first_rank + self.len()
    }

    /// Global range `[start, start + dimension)` of one instance
    pub fn range(&self, instance: usize) -> Option<Range<usize>> {
        if instance >= self.count {
            return None;
        }
        let start = self.first_rank + self.dimension * instance;
        Some(start..start + self.dimension)
    }

    pub fn contains(&self, global: usize) -> bool {
        global >= self.first_rank && global < self.end()
    }
}

/// Registry of all variable sets; assigns global offsets at registration time
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    sets: Vec<VariableSet>,
    total_dof: usize,
    sealed: bool,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `dimension * count` slots at the next free global offset.
    ///
    /// Fails with [`CoreError::Sealed`] once the layout has been sealed by a solve.
    pub fn register(&mut self, count: usize, dimension: usize) -> CoreResult<VariableSetHandle> {
        if self.sealed {
            return Err(CoreError::Sealed);
        }
        let set = VariableSet {
            first_rank: self.total_dof,
            dimension,
            count,
        };
        self.total_dof += set.len();
        let handle = VariableSetHandle(self.sets.len());
        debug!(
            "Registered variable set {} at rank {} ({} x {})",
            handle.0, set.first_rank, count, dimension
        );
        self.sets.push(set);
        Ok(handle)
    }

    pub fn get(&self, handle: VariableSetHandle) -> CoreResult<&VariableSet> {
        self.sets
            .get(handle.0)
            .ok_or(CoreError::UnknownVariableSet(handle.0))
    }

    /// Global range of a referenced instance
    pub fn range(&self, variable: VariableRef) -> CoreResult<Range<usize>> {
        let set = self.get(variable.set)?;
        set.range(variable.instance)
            .ok_or(CoreError::InstanceOutOfRange {
                set: variable.set.0,
                instance: variable.instance,
                count: set.count,
            })
    }

    /// Inverse of the converter: which (set, instance, component) owns a global slot
    pub fn locate(&self, global: usize) -> Option<(VariableSetHandle, usize, usize)> {
        if global >= self.total_dof {
            return None;
        }
        // sets are ordered by first_rank; empty sets share the rank of their successor
        let idx = self
            .sets
            .partition_point(|set| set.first_rank <= global)
            .checked_sub(1)?;
        let set = &self.sets[idx];
        if !set.contains(global) {
            return None;
        }
        let offset = global - set.first_rank;
        Some((
            VariableSetHandle(idx),
            offset / set.dimension,
            offset % set.dimension,
        ))
    }

    pub fn total_dof(&self) -> usize {
        self.total_dof
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableSetHandle, &VariableSet)> {
        self.sets
            .iter()
            .enumerate()
            .map(|(i, set)| (VariableSetHandle(i), set))
    }

    /// Freeze the layout; later registrations fail
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// The flat vector X of all scalar unknowns.
///
/// Owned by the orchestrator and passed by reference into globalization and
/// assembly. `version` increments on every full replacement, i.e. once per
/// solver iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalVector {
    values: Vec<f64>,
    version: u64,
}

impl GlobalVector {
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            version: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Grow with zeros to cover newly registered slots
    pub(crate) fn resize(&mut self, len: usize) {
        self.values.resize(len, 0.0);
    }

    /// Overwrite a contiguous range (initial values, fixed variables)
    pub(crate) fn write(&mut self, range: Range<usize>, values: &[f64]) {
        self.values[range].copy_from_slice(values);
    }

    /// Replace the whole vector with a new iterate
    pub(crate) fn replace(&mut self, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.values.len());
        self.values = values;
        self.version += 1;
    }

    /// Reduced vector for a list of global indices
    pub fn gather(&self, indices: &[usize]) -> DVector<f64> {
        DVector::from_iterator(indices.len(), indices.iter().map(|&i| self.values[i]))
    }
}
