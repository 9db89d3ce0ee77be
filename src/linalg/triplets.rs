//! Triplet accumulation for sparse assembly.
//!
//! Entries are collected as plain `(row, col, value)` triplets and compressed
//! once (sort, then merge duplicates by summation) instead of being
//! accumulated into a hash map entry by entry.

use faer::sparse::{SparseColMat, Triplet};

use super::{LinAlgError, LinAlgResult, SparseMatrix};

/// Sort by `(row, col)` and sum duplicates; exact zeros are dropped
pub fn compress_pairs(mut entries: Vec<(usize, usize, f64)>) -> Vec<(usize, usize, f64)> {
    entries.sort_unstable_by_key(|&(r, c, _)| (r, c));
    let mut merged: Vec<(usize, usize, f64)> = Vec::with_capacity(entries.len());
    for (r, c, v) in entries {
        match merged.last_mut() {
            Some(last) if last.0 == r && last.1 == c => last.2 += v,
            _ => merged.push((r, c, v)),
        }
    }
    merged.retain(|&(_, _, v)| v != 0.0);
    merged
}

/// Sort by index and sum duplicates; exact zeros are dropped
pub fn compress_entries(mut entries: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
    entries.sort_unstable_by_key(|&(i, _)| i);
    let mut merged: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
    for (i, v) in entries {
        match merged.last_mut() {
            Some(last) if last.0 == i => last.1 += v,
            _ => merged.push((i, v)),
        }
    }
    merged.retain(|&(_, v)| v != 0.0);
    merged
}

/// Row-by-row builder for a rectangular sparse system `A x = b`
#[derive(Debug, Clone)]
pub struct TripletBuilder {
    ncols: usize,
    triplets: Vec<Triplet<usize, usize, f64>>,
    rhs: Vec<f64>,
}

impl TripletBuilder {
    pub fn new(ncols: usize) -> Self {
        Self {
            ncols,
            triplets: Vec::new(),
            rhs: Vec::new(),
        }
    }

    pub fn with_capacity(ncols: usize, rows: usize, nnz: usize) -> Self {
        Self {
            ncols,
            triplets: Vec::with_capacity(nnz),
            rhs: Vec::with_capacity(rows),
        }
    }

    /// Append one row; columns must be `< ncols`
    pub fn push_row(&mut self, entries: impl IntoIterator<Item = (usize, f64)>, target: f64) {
        let row = self.rhs.len();
        for (col, val) in entries {
            debug_assert!(col < self.ncols);
            self.triplets.push(Triplet::new(row, col, val));
        }
        self.rhs.push(target);
    }

    pub fn nrows(&self) -> usize {
        self.rhs.len()
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.triplets.len()
    }

    /// Mark which columns carry at least one entry
    pub fn touched_columns(&self) -> Vec<bool> {
        let mut touched = vec![false; self.ncols];
        for t in &self.triplets {
            touched[t.col] = true;
        }
        touched
    }

    /// Convert to CSC (duplicates are summed by faer) plus the right-hand side
    pub fn build(self) -> LinAlgResult<(SparseMatrix, Vec<f64>)> {
        let matrix = SparseColMat::try_new_from_triplets(self.rhs.len(), self.ncols, &self.triplets)
            .map_err(|e| LinAlgError::SparseMatrixCreation(format!("{:?}", e)))?;
        Ok((matrix, self.rhs))
    }
}
