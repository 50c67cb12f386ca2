//! Transforms between the "from" and "to" voxel index spaces.
//!
//! `AffineParameters` is the searchable description of an affine transform;
//! `TransformationMatrix` is its derived index-space matrix.

pub mod trait_;
pub mod affine;
pub mod matrix;

pub use trait_::Transform;
pub use affine::{AffineParameters, PARAMETER_COUNT};
pub use matrix::{Frame, TransformationMatrix};
