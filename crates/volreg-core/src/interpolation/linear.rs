//! Trilinear interpolation of volumes.
//!
//! Indices outside the data are clamped to the border voxels, so sampling
//! past the edge repeats the edge value.

use burn::tensor::{Int, Tensor};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use super::trait_::Interpolator;

/// Linear Interpolator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

/// Bracketing voxels and blend weight along one axis.
struct AxisSample<B: Backend> {
    lower: Tensor<B, 1, Int>,
    upper: Tensor<B, 1, Int>,
    weight: Tensor<B, 1>,
    complement: Tensor<B, 1>,
}

impl<B: Backend> AxisSample<B> {
    fn new(coordinate: Tensor<B, 1>, extent: usize) -> Self {
        let last = (extent - 1) as f64;
        let floor = coordinate.clone().floor();
        let weight = coordinate - floor.clone();
        let complement = weight.clone().neg() + 1.0;

        Self {
            lower: floor.clone().clamp(0.0, last).int(),
            upper: (floor + 1.0).clamp(0.0, last).int(),
            weight,
            complement,
        }
    }

    fn pick(&self, high: bool) -> &Tensor<B, 1, Int> {
        if high {
            &self.upper
        } else {
            &self.lower
        }
    }

    fn lerp(&self, low: Tensor<B, 1>, high: Tensor<B, 1>) -> Tensor<B, 1> {
        low * self.complement.clone() + high * self.weight.clone()
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let batch = indices.dims()[0];
        let [nz, ny, nx] = data.dims();
        if nx == 0 || ny == 0 || nz == 0 {
            return Tensor::zeros([batch], &indices.device());
        }

        let x = Self::axis(&indices, 0, nx);
        let y = Self::axis(&indices, 1, ny);
        let z = Self::axis(&indices, 2, nz);

        let flat = data.clone().reshape([nx * ny * nz]);
        let stride_y = nx as i32;
        let stride_z = (nx * ny) as i32;

        let corner = |hx: bool, hy: bool, hz: bool| {
            let offset = z.pick(hz).clone() * stride_z + y.pick(hy).clone() * stride_y + x.pick(hx).clone();
            flat.clone().gather(0, offset)
        };

        let c00 = x.lerp(corner(false, false, false), corner(true, false, false));
        let c10 = x.lerp(corner(false, true, false), corner(true, true, false));
        let c01 = x.lerp(corner(false, false, true), corner(true, false, true));
        let c11 = x.lerp(corner(false, true, true), corner(true, true, true));

        let c0 = y.lerp(c00, c10);
        let c1 = y.lerp(c01, c11);

        z.lerp(c0, c1)
    }
}

impl LinearInterpolator {
    fn axis<B: Backend>(indices: &Tensor<B, 2>, axis: usize, extent: usize) -> AxisSample<B> {
        AxisSample::new(indices.clone().narrow(1, axis, 1).squeeze::<1>(1), extent)
    }
}
