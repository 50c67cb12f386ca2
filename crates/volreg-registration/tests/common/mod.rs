#![allow(dead_code)]

use burn_ndarray::NdArray;
use volreg_core::image::Image;
use volreg_core::spatial::Spacing3;

pub type B = NdArray<f32>;

/// Gaussian blob on an `extent³` grid.
pub fn blob(extent: usize, center: [f64; 3], spacing: f64) -> Image<B, 3> {
    let device = Default::default();
    let mut data = Vec::with_capacity(extent.pow(3));
    for z in 0..extent {
        for y in 0..extent {
            for x in 0..extent {
                let d2 = (x as f64 - center[0]).powi(2)
                    + (y as f64 - center[1]).powi(2)
                    + (z as f64 - center[2]).powi(2);
                data.push((-d2 / 10.0).exp() as f32);
            }
        }
    }
    Image::from_vec(data, [extent; 3], Spacing3::uniform(spacing), &device)
}
