//! Normalized correlation metric.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use volreg_core::image::Image;
use volreg_core::interpolation::LinearInterpolator;
use volreg_core::transform::Transform;
use super::trait_::{paired_samples, Metric};

/// Normalized Correlation Metric.
///
/// NCC = Σ(F − F̄)(M − M̄) / sqrt(Σ(F − F̄)² · Σ(M − M̄)²)
///
/// Returns −NCC as loss, so perfect positive correlation scores −1.
/// A constant image has no defined correlation and scores 0.
#[derive(Debug, Clone, Default)]
pub struct NormalizedCorrelation {
    interpolator: LinearInterpolator,
}

impl NormalizedCorrelation {
    pub fn new() -> Self {
        Self {
            interpolator: LinearInterpolator::new(),
        }
    }
}

impl<B: Backend> Metric<B, 3> for NormalizedCorrelation {
    fn forward(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Tensor<B, 1> {
        let (fixed_values, moving_values) = paired_samples(fixed, moving, transform, &self.interpolator);

        let f_centered = fixed_values.clone() - fixed_values.mean();
        let m_centered = moving_values.clone() - moving_values.mean();

        let numerator = (f_centered.clone() * m_centered.clone()).sum();
        let denom_f = f_centered.powf_scalar(2.0).sum();
        let denom_m = m_centered.powf_scalar(2.0).sum();

        let epsilon = 1e-10;
        let denominator = (denom_f * denom_m).sqrt() + epsilon;

        (numerator / denominator).neg()
    }

    fn name(&self) -> &'static str {
        "NormalizedCorrelation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;
    use volreg_core::spatial::Spacing3;
    use volreg_core::transform::TransformationMatrix;

    type B = NdArray<f32>;

    fn create_test_image(data: Vec<f32>, shape: [usize; 3]) -> Image<B, 3> {
        let device = Default::default();
        Image::from_vec(data, shape, Spacing3::uniform(1.0), &device)
    }

    fn loss(fixed: &Image<B, 3>, moving: &Image<B, 3>) -> f64 {
        NormalizedCorrelation::new()
            .forward(fixed, moving, &TransformationMatrix::identity())
            .into_scalar()
            .elem::<f64>()
    }

    #[test]
    fn test_ncc_identical() {
        let data: Vec<f32> = (0..1000).map(|x| x as f32).collect();
        let image = create_test_image(data, [10, 10, 10]);
        let value = loss(&image, &image);
        assert!((value + 1.0).abs() < 1e-4, "identical images should score -1, got {}", value);
    }

    #[test]
    fn test_ncc_linear_relationship() {
        let data1: Vec<f32> = (0..1000).map(|x| x as f32).collect();
        let data2: Vec<f32> = data1.iter().map(|&x| 2.0 * x + 10.0).collect();
        let value = loss(&create_test_image(data1, [10, 10, 10]), &create_test_image(data2, [10, 10, 10]));
        assert!((value + 1.0).abs() < 1e-4, "linear relationship should score -1, got {}", value);
    }

    #[test]
    fn test_ncc_inverse_relationship() {
        let data1: Vec<f32> = (0..1000).map(|x| x as f32).collect();
        let data2: Vec<f32> = data1.iter().map(|&x| -x).collect();
        let value = loss(&create_test_image(data1, [10, 10, 10]), &create_test_image(data2, [10, 10, 10]));
        assert!((value - 1.0).abs() < 1e-4, "inverse relationship should score 1, got {}", value);
    }

    #[test]
    fn test_ncc_constant_image_scores_zero() {
        let data1: Vec<f32> = (0..64).map(|x| x as f32).collect();
        let value = loss(&create_test_image(data1, [4, 4, 4]), &create_test_image(vec![3.0; 64], [4, 4, 4]));
        assert!(value.abs() < 1e-6);
    }
}
