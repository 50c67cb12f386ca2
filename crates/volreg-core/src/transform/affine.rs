//! Affine transform parameters.

use nalgebra::{Matrix3, Rotation3};
use serde::{Deserialize, Serialize};

/// Number of scalar affine parameters.
pub const PARAMETER_COUNT: usize = 12;

/// Affine transform described by translation, rotation, scaling and shear.
///
/// Parameters are indexed `0..12` in the order translation (mm), rotation
/// (radians about x, y, z), scaling, shear. The linear part is
/// `R · Sh · Sc` with `R = Rz · Ry · Rx` and `Sh` upper triangular.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineParameters {
    pub translation: [f64; 3],
    pub rotation: [f64; 3],
    pub scaling: [f64; 3],
    pub shear: [f64; 3],
}

impl Default for AffineParameters {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineParameters {
    /// Identity: unit scaling, everything else zero.
    pub fn identity() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0; 3],
            scaling: [1.0; 3],
            shear: [0.0; 3],
        }
    }

    /// Pure translation in millimetres.
    pub fn from_translation(translation: [f64; 3]) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Flatten into the indexed parameter vector.
    pub fn to_array(&self) -> [f64; PARAMETER_COUNT] {
        let mut out = [0.0; PARAMETER_COUNT];
        out[0..3].copy_from_slice(&self.translation);
        out[3..6].copy_from_slice(&self.rotation);
        out[6..9].copy_from_slice(&self.scaling);
        out[9..12].copy_from_slice(&self.shear);
        out
    }

    /// Build from the indexed parameter vector.
    pub fn from_array(values: [f64; PARAMETER_COUNT]) -> Self {
        let mut params = Self::identity();
        params.translation.copy_from_slice(&values[0..3]);
        params.rotation.copy_from_slice(&values[3..6]);
        params.scaling.copy_from_slice(&values[6..9]);
        params.shear.copy_from_slice(&values[9..12]);
        params
    }

    /// Linear part `R · Sh · Sc`, acting on millimetres.
    pub fn linear_matrix(&self) -> Matrix3<f64> {
        let rotation = Rotation3::from_euler_angles(self.rotation[0], self.rotation[1], self.rotation[2]);
        let shear = Matrix3::new(
            1.0, self.shear[0], self.shear[1],
            0.0, 1.0, self.shear[2],
            0.0, 0.0, 1.0,
        );
        let scaling = Matrix3::from_diagonal(&nalgebra::Vector3::from(self.scaling));
        rotation.into_inner() * shear * scaling
    }
}

impl std::ops::Index<usize> for AffineParameters {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        match index {
            0..=2 => &self.translation[index],
            3..=5 => &self.rotation[index - 3],
            6..=8 => &self.scaling[index - 6],
            9..=11 => &self.shear[index - 9],
            _ => panic!("Affine parameter index {} out of range", index),
        }
    }
}

impl std::ops::IndexMut<usize> for AffineParameters {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        match index {
            0..=2 => &mut self.translation[index],
            3..=5 => &mut self.rotation[index - 3],
            6..=8 => &mut self.scaling[index - 6],
            9..=11 => &mut self.shear[index - 9],
            _ => panic!("Affine parameter index {} out of range", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_linear_matrix() {
        let params = AffineParameters::default();
        assert_eq!(params.linear_matrix(), Matrix3::identity());
    }

    #[test]
    fn test_array_roundtrip_preserves_order() {
        let values: [f64; PARAMETER_COUNT] = std::array::from_fn(|i| i as f64);
        let params = AffineParameters::from_array(values);
        assert_eq!(params.translation, [0.0, 1.0, 2.0]);
        assert_eq!(params.shear, [9.0, 10.0, 11.0]);
        assert_eq!(params.to_array(), values);
        assert_eq!(params[7], 7.0);
    }

    #[test]
    fn test_rotation_about_z() {
        let mut params = AffineParameters::identity();
        params.rotation[2] = std::f64::consts::FRAC_PI_2;
        let rotated = params.linear_matrix() * nalgebra::Vector3::new(1.0, 0.0, 0.0);
        assert!((rotated.x).abs() < 1e-12);
        assert!((rotated.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scaling_and_shear() {
        let mut params = AffineParameters::identity();
        params.scaling = [2.0, 3.0, 4.0];
        params.shear[0] = 0.5;
        let m = params.linear_matrix();
        // Shear acts after scaling: x' = 2x + 0.5 * 3y.
        assert!((m[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((m[(0, 1)] - 1.5).abs() < 1e-12);
        assert!((m[(2, 2)] - 4.0).abs() < 1e-12);
    }
}
