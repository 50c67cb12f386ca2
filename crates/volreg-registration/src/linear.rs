//! Affine stage: which parameters move, and the search that moves them.

use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};
use volreg_core::image::Image;
use volreg_core::transform::{AffineParameters, Frame, TransformationMatrix, PARAMETER_COUNT};
use crate::config::SearchConfig;
use crate::metric::Metric;
use crate::progress::CancellationToken;

/// Scaling never drops below this during a search.
const MIN_SCALING: f64 = 0.1;

/// Family of affine transforms the search may explore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegType {
    Translation,
    Rotation,
    RigidBody,
    Scaling,
    Tilt,
    #[default]
    Affine,
}

impl RegType {
    /// Indices into [`AffineParameters`] that this family varies.
    pub fn active_parameters(&self) -> &'static [usize] {
        match self {
            RegType::Translation => &[0, 1, 2],
            RegType::Rotation => &[3, 4, 5],
            RegType::RigidBody => &[0, 1, 2, 3, 4, 5],
            RegType::Scaling => &[6, 7, 8],
            RegType::Tilt => &[9, 10, 11],
            RegType::Affine => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

/// Affine optimiser used by the registration pipeline.
///
/// `params` holds the starting point and receives the result. The search
/// minimises `metric.forward(to, from, T⁻¹)`, where `T` is the from→to index
/// matrix of the current parameters, and must return promptly once `cancel`
/// is set.
pub trait AffineSearch: Send + Sync + 'static {
    fn search<B: Backend, M: Metric<B, 3>>(
        &self,
        from: &Image<B, 3>,
        to: &Image<B, 3>,
        params: &mut AffineParameters,
        reg_type: RegType,
        metric: &M,
        cancel: &CancellationToken,
    );
}

/// Derivative-free pattern search over the active parameters.
///
/// Every sweep tries `±step` on each parameter in turn and keeps the first
/// strict improvement. A sweep with no improvement halves all steps.
#[derive(Debug, Clone, Default)]
pub struct CoordinateSearch {
    config: SearchConfig,
}

impl CoordinateSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn initial_steps(&self, to_frame: &Frame) -> [f64; PARAMETER_COUNT] {
        let mut steps = [0.0; PARAMETER_COUNT];
        for axis in 0..3 {
            steps[axis] = self.config.translation_step * to_frame.to_spacing[axis];
            steps[3 + axis] = self.config.rotation_step;
            steps[6 + axis] = self.config.scaling_step;
            steps[9 + axis] = self.config.shear_step;
        }
        steps
    }
}

/// Loss of one parameter set, `+∞` when it cannot be evaluated.
fn evaluate<B: Backend, M: Metric<B, 3>>(
    from: &Image<B, 3>,
    to: &Image<B, 3>,
    frame: &Frame,
    params: &AffineParameters,
    metric: &M,
) -> f64 {
    let Some(inverse) = TransformationMatrix::from_affine(params, frame).inverse() else {
        return f64::INFINITY;
    };
    let loss = metric.forward(to, from, &inverse).into_scalar().elem::<f64>();
    if loss.is_finite() {
        loss
    } else {
        f64::INFINITY
    }
}

impl AffineSearch for CoordinateSearch {
    fn search<B: Backend, M: Metric<B, 3>>(
        &self,
        from: &Image<B, 3>,
        to: &Image<B, 3>,
        params: &mut AffineParameters,
        reg_type: RegType,
        metric: &M,
        cancel: &CancellationToken,
    ) {
        let frame = Frame::new(from.geometry(), *from.spacing(), to.geometry(), *to.spacing());
        let active = reg_type.active_parameters();
        let initial = self.initial_steps(&frame);
        let mut steps = initial;
        let mut best = evaluate(from, to, &frame, params, metric);

        tracing::debug!(
            metric = metric.name(),
            ?reg_type,
            loss = best,
            "affine search started"
        );

        for sweep in 0..self.config.max_sweeps {
            if cancel.is_cancelled() {
                tracing::warn!(sweep, "affine search cancelled");
                return;
            }

            let mut improved = false;
            for &index in active {
                for direction in [1.0, -1.0] {
                    let mut candidate = *params;
                    candidate[index] += direction * steps[index];
                    if candidate.scaling.iter().any(|&s| s < MIN_SCALING) {
                        continue;
                    }

                    let loss = evaluate(from, to, &frame, &candidate, metric);
                    if loss < best {
                        best = loss;
                        *params = candidate;
                        improved = true;
                        break;
                    }
                }
            }

            tracing::debug!(sweep, loss = best, improved, "affine sweep");

            if !improved {
                for &index in active {
                    steps[index] *= 0.5;
                }
                let converged = active
                    .iter()
                    .all(|&index| steps[index] < initial[index] * self.config.min_step_ratio);
                if converged {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use crate::metric::NormalizedCorrelation;
    use volreg_core::spatial::Spacing3;

    type B = NdArray<f32>;

    fn blob(extent: usize, center: [f64; 3]) -> Image<B, 3> {
        let device = Default::default();
        let mut data = Vec::with_capacity(extent.pow(3));
        for z in 0..extent {
            for y in 0..extent {
                for x in 0..extent {
                    let d2 = (x as f64 - center[0]).powi(2)
                        + (y as f64 - center[1]).powi(2)
                        + (z as f64 - center[2]).powi(2);
                    data.push((-d2 / 8.0).exp() as f32);
                }
            }
        }
        Image::from_vec(data, [extent; 3], Spacing3::uniform(1.0), &device)
    }

    #[test]
    fn test_active_parameters() {
        assert_eq!(RegType::RigidBody.active_parameters(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(RegType::Tilt.active_parameters(), &[9, 10, 11]);
        assert_eq!(RegType::Affine.active_parameters().len(), PARAMETER_COUNT);
    }

    #[test]
    fn test_recovers_translation() {
        let from = blob(12, [7.0, 6.0, 6.0]);
        let to = blob(12, [6.0, 6.0, 6.0]);
        let mut params = AffineParameters::identity();

        CoordinateSearch::default().search(
            &from,
            &to,
            &mut params,
            RegType::Translation,
            &NormalizedCorrelation::new(),
            &CancellationToken::new(),
        );

        assert!((params.translation[0] + 1.0).abs() < 0.15, "{:?}", params);
        assert!(params.translation[1].abs() < 0.15, "{:?}", params);
        assert!(params.translation[2].abs() < 0.15, "{:?}", params);
        assert_eq!(params.rotation, [0.0; 3]);
    }

    #[test]
    fn test_cancelled_search_leaves_parameters() {
        let from = blob(8, [4.0, 4.0, 4.0]);
        let to = blob(8, [3.0, 4.0, 4.0]);
        let mut params = AffineParameters::identity();
        let cancel = CancellationToken::new();
        cancel.cancel();

        CoordinateSearch::default().search(
            &from,
            &to,
            &mut params,
            RegType::Affine,
            &NormalizedCorrelation::new(),
            &cancel,
        );

        assert_eq!(params, AffineParameters::identity());
    }
}
