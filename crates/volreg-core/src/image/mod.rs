//! Image types and operations.
//!
//! `Image` keeps voxel data on a burn backend; `VoxelBuffer` is a host copy
//! for algorithms that need random access to individual voxels.

pub mod image;
pub mod grid;
pub mod buffer;

pub use image::Image;
pub use grid::generate_grid;
pub use buffer::VoxelBuffer;
