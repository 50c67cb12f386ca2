//! Metric trait for image similarity measurement.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use volreg_core::image::{generate_grid, Image};
use volreg_core::interpolation::Interpolator;
use volreg_core::transform::Transform;

/// Metric trait for measuring similarity between images.
///
/// Metrics compute a loss value that represents the dissimilarity between
/// a fixed (reference) image and a moving image seen through a transform.
/// Lower values indicate better alignment.
///
/// # Type Parameters
/// * `B` - The tensor backend
/// * `D` - The spatial dimensionality (2 or 3)
pub trait Metric<B: Backend, const D: usize> {
    /// Calculate the loss between fixed and moving images.
    ///
    /// # Arguments
    /// * `fixed` - The fixed (reference) image
    /// * `moving` - The moving image
    /// * `transform` - Maps fixed voxel indices to moving voxel indices
    ///
    /// # Returns
    /// Single-element tensor holding the loss
    fn forward(
        &self,
        fixed: &Image<B, D>,
        moving: &Image<B, D>,
        transform: &impl Transform<B, D>,
    ) -> Tensor<B, 1>;

    /// Get the name of this metric.
    fn name(&self) -> &'static str;
}

/// Cost function used by the affine stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostType {
    /// Normalized correlation of intensities.
    #[default]
    Correlation,
    /// Parzen-window mutual information.
    MutualInformation,
}

/// Flattened fixed intensities and the moving intensities sampled under
/// `transform` at every fixed voxel.
pub(crate) fn paired_samples<B, I>(
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    transform: &impl Transform<B, 3>,
    interpolator: &I,
) -> (Tensor<B, 1>, Tensor<B, 1>)
where
    B: Backend,
    I: Interpolator<B>,
{
    let device = fixed.data().device();
    let fixed_indices = generate_grid::<B>(fixed.shape(), &device);
    let n = fixed_indices.dims()[0];

    let moving_indices = transform.transform_points(fixed_indices);
    let moving_values = interpolator.interpolate(moving.data(), moving_indices);
    let fixed_values = fixed.data().clone().reshape([n]);

    (fixed_values, moving_values)
}
