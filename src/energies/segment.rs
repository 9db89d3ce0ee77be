//! Segment direction energies on the reduced vector `(p0, p1)` of two 3D points.

use nalgebra::{DVector, Vector3};

use crate::core::{CoreError, CoreResult, EnergyType};

const MIN_NORM: f64 = 1e-12;

fn unit_target(name: &str, target: Vector3<f64>) -> CoreResult<Vector3<f64>> {
    let norm = target.norm();
    if norm < MIN_NORM {
        return Err(CoreError::degenerate(name, "zero-length target direction"));
    }
    Ok(target / norm)
}

fn segment_row(direction: &Vector3<f64>) -> DVector<f64> {
    let mut k = DVector::zeros(6);
    for i in 0..3 {
        k[i] = -direction[i];
        k[3 + i] = direction[i];
    }
    k
}

/// `(p1 − p0) · t = 0`: the segment is orthogonal to `t`
#[derive(Debug, Clone)]
pub struct SegmentOrthogonality {
    coefficients: DVector<f64>,
}

impl SegmentOrthogonality {
    /// Fails on a zero target direction
    pub fn new(target: Vector3<f64>) -> CoreResult<Self> {
        let direction = unit_target("SegmentOrthogonality", target)?;
        Ok(Self {
            coefficients: segment_row(&direction),
        })
    }
}

impl EnergyType for SegmentOrthogonality {
    fn name(&self) -> &str {
        "SegmentOrthogonality"
    }

    fn dimension(&self) -> usize {
        6
    }

    fn calculate(&self, _x_reduced: &DVector<f64>) -> CoreResult<(DVector<f64>, f64)> {
        Ok((self.coefficients.clone(), 0.0))
    }
}

/// Component of `p1 − p0` perpendicular to `t` should vanish.
///
/// Re-linearised each iteration: the row is the unit perpendicular direction
/// at the current iterate, so `Ki · x` equals the perpendicular length there.
/// An already parallel segment yields a zero row.
#[derive(Debug, Clone)]
pub struct SegmentParallelity {
    direction: Vector3<f64>,
}

impl SegmentParallelity {
    /// Fails on a zero target direction
    pub fn new(target: Vector3<f64>) -> CoreResult<Self> {
        Ok(Self {
            direction: unit_target("SegmentParallelity", target)?,
        })
    }
}

impl EnergyType for SegmentParallelity {
    fn name(&self) -> &str {
        "SegmentParallelity"
    }

    fn dimension(&self) -> usize {
        6
    }

    fn calculate(&self, x_reduced: &DVector<f64>) -> CoreResult<(DVector<f64>, f64)> {
        let p0 = Vector3::new(x_reduced[0], x_reduced[1], x_reduced[2]);
        let p1 = Vector3::new(x_reduced[3], x_reduced[4], x_reduced[5]);
        let segment = p1 - p0;
        let perpendicular = segment - self.direction * segment.dot(&self.direction);
        let norm = perpendicular.norm();
        if norm < MIN_NORM {
            return Ok((DVector::zeros(6), 0.0));
        }
        Ok((segment_row(&(perpendicular / norm)), 0.0))
    }
}
