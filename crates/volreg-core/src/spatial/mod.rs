//! Spatial types for representing points, vectors and voxel spacing.
//!
//! All types are thin wrappers over nalgebra so the usual linear algebra
//! stays available through `inner()`.

pub mod point;
pub mod vector;
pub mod spacing;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;

pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
