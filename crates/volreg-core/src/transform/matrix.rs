//! Index-space affine transformation matrix.
//!
//! A `TransformationMatrix` maps a continuous voxel index of the "from"
//! image to a continuous voxel index of the "to" image. It folds the affine
//! parameters together with both geometries and both voxel sizes:
//!
//! `T(i) = S_to⁻¹ · (A · S_from · (i − c_from) + t) + c_to`
//!
//! where `A` is the linear part of the parameters, `t` the translation in
//! millimetres, `S` the voxel-size diagonals and `c = extent / 2` the image
//! centres.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use crate::spatial::{Point3, Spacing3};
use super::affine::AffineParameters;
use super::trait_::Transform;

/// Geometries and voxel sizes of the two images taking part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub from_geometry: [usize; 3],
    pub from_spacing: Spacing3,
    pub to_geometry: [usize; 3],
    pub to_spacing: Spacing3,
}

impl Default for Frame {
    /// Empty geometries with unit voxels: the derived matrix is the identity.
    fn default() -> Self {
        Self {
            from_geometry: [0; 3],
            from_spacing: Spacing3::uniform(1.0),
            to_geometry: [0; 3],
            to_spacing: Spacing3::uniform(1.0),
        }
    }
}

impl Frame {
    pub fn new(
        from_geometry: [usize; 3],
        from_spacing: Spacing3,
        to_geometry: [usize; 3],
        to_spacing: Spacing3,
    ) -> Self {
        Self {
            from_geometry,
            from_spacing,
            to_geometry,
            to_spacing,
        }
    }

    fn center(geometry: [usize; 3]) -> Vector3<f64> {
        Vector3::new(
            geometry[0] as f64 / 2.0,
            geometry[1] as f64 / 2.0,
            geometry[2] as f64 / 2.0,
        )
    }
}

/// Affine map `x ↦ linear · x + shift` between voxel index spaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformationMatrix {
    linear: Matrix3<f64>,
    shift: Vector3<f64>,
}

impl Default for TransformationMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransformationMatrix {
    pub fn new(linear: Matrix3<f64>, shift: Vector3<f64>) -> Self {
        Self { linear, shift }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Derive the "from" index → "to" index matrix for a parameter set.
    pub fn from_affine(params: &AffineParameters, frame: &Frame) -> Self {
        let from_scale = Matrix3::from_diagonal(frame.from_spacing.inner());
        let to_scale_inv = Matrix3::from_diagonal(&frame.to_spacing.inner().map(|s| 1.0 / s));
        let from_center = Frame::center(frame.from_geometry);
        let to_center = Frame::center(frame.to_geometry);

        let linear = to_scale_inv * params.linear_matrix() * from_scale;
        let translation = Vector3::from(params.translation);
        let shift = to_scale_inv * translation - linear * from_center + to_center;

        Self::new(linear, shift)
    }

    pub fn linear(&self) -> &Matrix3<f64> {
        &self.linear
    }

    pub fn shift(&self) -> &Vector3<f64> {
        &self.shift
    }

    /// Map a single point.
    pub fn apply(&self, point: &Point3) -> Point3 {
        let mapped = self.linear * point.inner().coords + self.shift;
        Point3::new([mapped.x, mapped.y, mapped.z])
    }

    /// Inverse map, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let inverse = self.linear.try_inverse()?;
        Some(Self::new(inverse, -(inverse * self.shift)))
    }

    /// `self ∘ other`: apply `other` first.
    pub fn compose(&self, other: &Self) -> Self {
        Self::new(self.linear * other.linear, self.linear * other.shift + self.shift)
    }

    /// Homogeneous 4×4 form.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut m = self.linear.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.shift);
        m
    }
}

impl<B: Backend> Transform<B, 3> for TransformationMatrix {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();

        // Row-vector form: y = x @ Aᵀ + t
        let mut a_t = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                a_t.push(self.linear[(c, r)] as f32);
            }
        }
        let a_t = Tensor::<B, 2>::from_data(TensorData::new(a_t, Shape::new([3, 3])), &device);

        let shift: Vec<f32> = self.shift.iter().map(|&v| v as f32).collect();
        let shift = Tensor::<B, 1>::from_data(TensorData::new(shift, Shape::new([3])), &device)
            .reshape([1, 3]);

        points.matmul(a_t) + shift
    }
}
