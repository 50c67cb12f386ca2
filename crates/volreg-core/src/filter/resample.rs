//! Resample image filter.
//!
//! Resamples an image onto the voxel grid of a reference image. The transform
//! maps reference voxel indices to input voxel indices, so aligning "from"
//! onto "to" uses the inverse of the from→to registration matrix.

use std::marker::PhantomData;
use burn::tensor::backend::Backend;
use burn::tensor::Shape;
use crate::image::{generate_grid, Image};
use crate::interpolation::trait_::Interpolator;
use crate::spatial::Spacing3;
use crate::transform::trait_::Transform;

/// Resample image filter.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
pub struct ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    shape: [usize; 3],
    spacing: Spacing3,
    transform: T,
    interpolator: I,
    _phantom: PhantomData<B>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B, 3>,
    I: Interpolator<B>,
{
    /// Create a new resample filter.
    ///
    /// # Arguments
    /// * `shape` - Output tensor shape, `[Z, Y, X]`
    /// * `spacing` - Output voxel spacing
    /// * `transform` - Output index → input index
    /// * `interpolator` - Interpolator for input image sampling
    pub fn new(shape: [usize; 3], spacing: Spacing3, transform: T, interpolator: I) -> Self {
        Self {
            shape,
            spacing,
            transform,
            interpolator,
            _phantom: PhantomData,
        }
    }

    /// Create from a reference image, taking its shape and spacing.
    pub fn new_from_reference(reference: &Image<B, 3>, transform: T, interpolator: I) -> Self {
        Self::new(reference.shape(), *reference.spacing(), transform, interpolator)
    }

    /// Apply filter to an input image.
    pub fn apply(&self, input: &Image<B, 3>) -> Image<B, 3> {
        let device = input.data().device();

        let output_indices = generate_grid::<B>(self.shape, &device);
        let input_indices = self.transform.transform_points(output_indices);
        let values = self.interpolator.interpolate(input.data(), input_indices);

        Image::new(values.reshape(Shape::new(self.shape)), self.spacing)
    }
}
