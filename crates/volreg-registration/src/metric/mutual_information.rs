//! Mutual Information metric implementation.

use burn::tensor::{Int, Tensor};
use burn::tensor::backend::Backend;
use volreg_core::image::Image;
use volreg_core::interpolation::LinearInterpolator;
use volreg_core::transform::Transform;
use crate::config::MutualInformationConfig;
use super::trait_::{paired_samples, Metric};

/// Rows of the Parzen weight matrices built at once.
const CHUNK_SIZE: usize = 32768;

/// Mutual Information Metric using Parzen window estimation.
///
/// Intensities of each image are mapped linearly onto bin coordinates
/// `[0, bins − 1]` using that image's own range, then spread over the bins
/// with a Gaussian kernel of width `sigma` (in bins).
///
/// Returns −MI = H(F, M) − H(F) − H(M).
#[derive(Debug, Clone)]
pub struct MutualInformation {
    interpolator: LinearInterpolator,
    num_bins: usize,
    sigma: f64,
}

impl MutualInformation {
    /// # Arguments
    /// * `num_bins` - Number of histogram bins per image
    /// * `sigma` - Parzen kernel width in bins
    pub fn new(num_bins: usize, sigma: f64) -> Self {
        Self {
            interpolator: LinearInterpolator::new(),
            num_bins,
            sigma,
        }
    }

    pub fn from_config(config: &MutualInformationConfig) -> Self {
        Self::new(config.bins, config.sigma)
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Map values onto `[0, bins − 1]`.
    fn to_bin_coordinates<B: Backend>(&self, values: Tensor<B, 1>) -> Tensor<B, 1> {
        let min = values.clone().min();
        let range = values.clone().max() - min.clone() + 1e-10;
        (values - min) / range * (self.num_bins as f64 - 1.0)
    }

    /// Gaussian weights of every value against every bin centre: `[N, bins]`.
    fn parzen_weights<B: Backend>(&self, coordinates: Tensor<B, 1>) -> Tensor<B, 2> {
        let n = coordinates.dims()[0];
        let bins = Tensor::<B, 1, Int>::arange(0..self.num_bins as i64, &coordinates.device())
            .float()
            .reshape([1, self.num_bins]);
        let diff = coordinates.reshape([n, 1]) - bins;
        (diff.powf_scalar(2.0) * (-0.5 / (self.sigma * self.sigma))).exp()
    }

    /// Shannon entropy of an unnormalised histogram.
    fn entropy<B: Backend, const D: usize>(histogram: Tensor<B, D>) -> Tensor<B, 1> {
        let epsilon = 1e-10;
        let total = histogram.clone().sum() + epsilon;
        let probs = histogram.reshape([-1]) / total;
        let log_probs = (probs.clone() + epsilon).log();
        (probs * log_probs).sum().neg()
    }
}

impl Default for MutualInformation {
    fn default() -> Self {
        Self::from_config(&MutualInformationConfig::default())
    }
}

impl<B: Backend> Metric<B, 3> for MutualInformation {
    fn forward(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Tensor<B, 1> {
        let device = fixed.data().device();
        let (fixed_values, moving_values) = paired_samples(fixed, moving, transform, &self.interpolator);
        let n = fixed_values.dims()[0];

        let fixed_bins = self.to_bin_coordinates(fixed_values);
        let moving_bins = self.to_bin_coordinates(moving_values);

        // Joint histogram entry (i, j) is Σ_k w_f(k, i) · w_m(k, j).
        let mut joint = Tensor::<B, 2>::zeros([self.num_bins, self.num_bins], &device);
        let mut start = 0;
        while start < n {
            let end = (start + CHUNK_SIZE).min(n);
            let w_f = self.parzen_weights(fixed_bins.clone().slice([start..end]));
            let w_m = self.parzen_weights(moving_bins.clone().slice([start..end]));
            joint = joint + w_f.transpose().matmul(w_m);
            start = end;
        }

        let p_f = joint.clone().sum_dim(1);
        let p_m = joint.clone().sum_dim(0);

        Self::entropy(joint) - Self::entropy(p_f) - Self::entropy(p_m)
    }

    fn name(&self) -> &'static str {
        "MutualInformation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;
    use volreg_core::spatial::Spacing3;
    use volreg_core::transform::TransformationMatrix;
    use nalgebra::{Matrix3, Vector3};

    type B = NdArray<f32>;

    fn ramp(shape: [usize; 3]) -> Image<B, 3> {
        let device = Default::default();
        let count = shape.iter().product::<usize>();
        let data = (0..count).map(|i| ((i % 7) as f32) * 3.0 + ((i / 13) % 5) as f32).collect();
        Image::from_vec(data, shape, Spacing3::uniform(1.0), &device)
    }

    fn loss(metric: &MutualInformation, fixed: &Image<B, 3>, moving: &Image<B, 3>, transform: &TransformationMatrix) -> f64 {
        metric.forward(fixed, moving, transform).into_scalar().elem::<f64>()
    }

    #[test]
    fn test_mi_prefers_alignment() {
        let image = ramp([8, 8, 8]);
        let metric = MutualInformation::new(16, 1.0);

        let aligned = loss(&metric, &image, &image, &TransformationMatrix::identity());
        let shifted = TransformationMatrix::new(Matrix3::identity(), Vector3::new(1.5, 0.5, 0.0));
        let misaligned = loss(&metric, &image, &image, &shifted);

        assert!(aligned < 0.0, "MI of an image with itself is positive, loss {}", aligned);
        assert!(aligned < misaligned, "aligned {} should beat misaligned {}", aligned, misaligned);
    }

    #[test]
    fn test_mi_invariant_to_intensity_scaling() {
        let device = Default::default();
        let image = ramp([6, 6, 6]);
        let scaled_values: Vec<f32> = image.to_host().unwrap().iter().map(|v| v * 4.0 + 2.0).collect();
        let scaled = Image::<B, 3>::from_vec(scaled_values, [6, 6, 6], Spacing3::uniform(1.0), &device);

        let metric = MutualInformation::new(16, 1.0);
        let a = loss(&metric, &image, &image, &TransformationMatrix::identity());
        let b = loss(&metric, &image, &scaled, &TransformationMatrix::identity());
        assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
    }
}
