//! Concrete constraint types.
//!
//! - `coherent_length`: distance between two points equals a length variable
//! - `bounds`: scalar lower / upper bounds through a dummy variable
//! - `fixed_length`: vector norm equals a constant (linearised)

pub mod bounds;
pub mod coherent_length;
pub mod fixed_length;

pub use bounds::{LowerBound, UpperBound};
pub use coherent_length::CoherentLength;
pub use fixed_length::FixedLength;
