//! Concrete energy types.
//!
//! - `segment`: orthogonality / parallelity of a segment to a fixed direction
//! - `anchor`: soft pull of one component toward a target value
//! - `fairness`: discrete second difference along a polyline

pub mod anchor;
pub mod fairness;
pub mod segment;

pub use anchor::PointAnchor;
pub use fairness::Fairness;
pub use segment::{SegmentOrthogonality, SegmentParallelity};
