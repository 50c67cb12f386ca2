//! Image type with voxel spacing.
//!
//! Voxel data lives in a burn tensor laid out `[Z, Y, X]` (or `[Y, X]` in 2-D).
//! Indices and geometry are expressed the other way round, `[x, y, z]`, which
//! is the order used by transforms, grids and the interpolator.

use burn::tensor::backend::Backend;
use burn::tensor::{DataError, Shape, Tensor, TensorData};
use crate::spatial::Spacing;

/// Volumetric image: tensor data plus the physical size of one voxel.
///
/// # Examples
/// ```rust
/// use volreg_core::Image;
/// use volreg_core::spatial::Spacing3;
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 5, 6], &device);
/// let image = Image::new(data, Spacing3::new([1.0, 1.0, 2.0]));
/// assert_eq!(image.shape(), [4, 5, 6]);
/// assert_eq!(image.geometry(), [6, 5, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    spacing: Spacing<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image from a tensor and its voxel spacing (`[x, y, z]`).
    pub fn new(data: Tensor<B, D>, spacing: Spacing<D>) -> Self {
        Self { data, spacing }
    }

    /// Create an image from host voxels.
    ///
    /// `shape` is in tensor order (`[Z, Y, X]` for volumes) and `data` is
    /// flattened with x varying fastest.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the product of `shape`.
    pub fn from_vec(data: Vec<f32>, shape: [usize; D], spacing: Spacing<D>, device: &B::Device) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "Voxel count must match image shape"
        );
        let tensor = Tensor::from_data(TensorData::new(data, Shape::new(shape)), device);
        Self::new(tensor, spacing)
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Get the voxel spacing, ordered `[x, y, z]`.
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// Tensor shape, ordered `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Image extents in index order, `[x, y, z]`.
    pub fn geometry(&self) -> [usize; D] {
        let mut geometry = self.shape();
        geometry.reverse();
        geometry
    }

    /// Total number of voxels.
    pub fn voxel_count(&self) -> usize {
        self.shape().iter().product()
    }

    /// Copy the voxel values to the host, x varying fastest.
    pub fn to_host(&self) -> Result<Vec<f32>, DataError> {
        self.data.to_data().convert::<f32>().to_vec::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_image_creation() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([10, 8, 6], &device);
        let spacing = Spacing::new([1.0, 2.0, 3.0]);

        let image = Image::new(data, spacing);

        assert_eq!(image.shape(), [10, 8, 6]);
        assert_eq!(image.geometry(), [6, 8, 10]);
        assert_eq!(image.spacing(), &spacing);
        assert_eq!(image.voxel_count(), 480);
    }

    #[test]
    fn test_from_vec_roundtrip() {
        let device = Default::default();
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let image = Image::<Backend, 3>::from_vec(values.clone(), [2, 3, 4], Spacing::uniform(1.0), &device);

        assert_eq!(image.geometry(), [4, 3, 2]);
        assert_eq!(image.to_host().unwrap(), values);
    }

    #[test]
    #[should_panic(expected = "Voxel count must match image shape")]
    fn test_from_vec_rejects_wrong_length() {
        let device = Default::default();
        let _ = Image::<Backend, 3>::from_vec(vec![0.0; 5], [2, 2, 2], Spacing::uniform(1.0), &device);
    }
}
