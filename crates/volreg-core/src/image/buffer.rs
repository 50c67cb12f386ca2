//! Host-side voxel buffer.
//!
//! Iterative solvers touch individual voxels many times per iteration, which
//! is cheaper on a plain `Vec` than through tensor gathers.

use burn::tensor::backend::Backend;
use burn::tensor::DataError;
use super::Image;

/// Dense 3-D voxel values in `f64`, x varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelBuffer {
    geometry: [usize; 3],
    data: Vec<f64>,
}

impl VoxelBuffer {
    /// Wrap host voxels with extents `[x, y, z]`.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the geometry.
    pub fn new(geometry: [usize; 3], data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            geometry.iter().product::<usize>(),
            "Voxel count must match geometry"
        );
        Self { geometry, data }
    }

    /// Buffer of zeros.
    pub fn zeros(geometry: [usize; 3]) -> Self {
        Self::new(geometry, vec![0.0; geometry.iter().product()])
    }

    /// Copy an image to the host.
    pub fn from_image<B: Backend>(image: &Image<B, 3>) -> Result<Self, DataError> {
        let values = image.to_host()?;
        Ok(Self::new(
            image.geometry(),
            values.into_iter().map(f64::from).collect(),
        ))
    }

    /// Extents `[x, y, z]`.
    pub fn geometry(&self) -> [usize; 3] {
        self.geometry
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Flat offset of voxel `(x, y, z)`.
    #[inline]
    pub fn offset(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.geometry[1] + y) * self.geometry[0] + x
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize, z: usize) -> f64 {
        self.data[self.offset(x, y, z)]
    }

    /// Trilinear sample at a continuous index.
    ///
    /// Coordinates outside the volume are clamped to the border, the same
    /// policy as `LinearInterpolator`. An empty buffer samples as zero.
    pub fn sample(&self, position: [f64; 3]) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }

        let mut lower = [0usize; 3];
        let mut upper = [0usize; 3];
        let mut weight = [0.0f64; 3];
        for axis in 0..3 {
            let last = (self.geometry[axis] - 1) as f64;
            let p = position[axis].clamp(0.0, last);
            let floor = p.floor();
            lower[axis] = floor as usize;
            upper[axis] = (floor + 1.0).min(last) as usize;
            weight[axis] = p - floor;
        }

        let [x0, y0, z0] = lower;
        let [x1, y1, z1] = upper;
        let [wx, wy, wz] = weight;

        let c00 = self.at(x0, y0, z0) * (1.0 - wx) + self.at(x1, y0, z0) * wx;
        let c10 = self.at(x0, y1, z0) * (1.0 - wx) + self.at(x1, y1, z0) * wx;
        let c01 = self.at(x0, y0, z1) * (1.0 - wx) + self.at(x1, y0, z1) * wx;
        let c11 = self.at(x0, y1, z1) * (1.0 - wx) + self.at(x1, y1, z1) * wx;

        let c0 = c00 * (1.0 - wy) + c10 * wy;
        let c1 = c01 * (1.0 - wy) + c11 * wy;

        c0 * (1.0 - wz) + c1 * wz
    }

    /// Spatial gradient along x, y and z, in intensity per voxel.
    ///
    /// Central differences inside the volume, one-sided differences on the
    /// border, zero along axes of extent one.
    pub fn gradient(&self) -> [VoxelBuffer; 3] {
        let [nx, ny, nz] = self.geometry;
        let mut gradients = [
            Self::zeros(self.geometry),
            Self::zeros(self.geometry),
            Self::zeros(self.geometry),
        ];

        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let index = [x, y, z];
                    let offset = self.offset(x, y, z);
                    for (axis, gradient) in gradients.iter_mut().enumerate() {
                        let extent = self.geometry[axis];
                        if extent < 2 {
                            continue;
                        }
                        let mut before = index;
                        let mut after = index;
                        before[axis] = index[axis].saturating_sub(1);
                        after[axis] = (index[axis] + 1).min(extent - 1);
                        let span = (after[axis] - before[axis]) as f64;
                        let delta = self.at(after[0], after[1], after[2])
                            - self.at(before[0], before[1], before[2]);
                        gradient.data[offset] = delta / span;
                    }
                }
            }
        }

        gradients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(geometry: [usize; 3]) -> VoxelBuffer {
        let mut data = Vec::new();
        for z in 0..geometry[2] {
            for y in 0..geometry[1] {
                for x in 0..geometry[0] {
                    data.push(x as f64 + 10.0 * y as f64 + 100.0 * z as f64);
                }
            }
        }
        VoxelBuffer::new(geometry, data)
    }

    #[test]
    fn test_sample_on_grid_and_between() {
        let buffer = ramp([3, 3, 3]);
        assert_eq!(buffer.sample([1.0, 2.0, 1.0]), 121.0);
        assert!((buffer.sample([0.5, 0.5, 0.5]) - 55.5).abs() < 1e-12);
    }

    #[test]
    fn test_sample_clamps_outside() {
        let buffer = ramp([2, 2, 2]);
        assert_eq!(buffer.sample([-3.0, -1.0, -2.0]), 0.0);
        assert_eq!(buffer.sample([5.0, 5.0, 5.0]), 111.0);
    }

    #[test]
    fn test_gradient_of_ramp() {
        let buffer = ramp([4, 4, 4]);
        let [gx, gy, gz] = buffer.gradient();
        for offset in 0..buffer.len() {
            assert!((gx.data()[offset] - 1.0).abs() < 1e-12);
            assert!((gy.data()[offset] - 10.0).abs() < 1e-12);
            assert!((gz.data()[offset] - 100.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_empty_buffer_samples_zero() {
        let buffer = VoxelBuffer::zeros([0, 0, 0]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.sample([1.0, 1.0, 1.0]), 0.0);
    }
}
