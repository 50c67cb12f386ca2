//! Core primitives for volumetric registration: spatial value types,
//! burn-backed images, index-space affine transforms, interpolation and
//! resampling.

pub mod image;
pub mod spatial;
pub mod transform;
pub mod interpolation;
pub mod filter;

pub use image::Image;
pub use spatial::{Point, Vector, Spacing};
