//! Cosine-basis deformation field.

use rayon::prelude::*;

/// Orthonormal DCT-II basis along one axis.
///
/// `value(a, x)` is `sqrt(1/n)` for `a = 0` and
/// `sqrt(2/n) · cos(π (2x + 1) a / 2n)` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct CosineBasis {
    extent: usize,
    count: usize,
    table: Vec<f64>,
}

impl CosineBasis {
    /// Basis of `requested` functions over `extent` samples; the count is
    /// capped at `extent`.
    pub fn new(extent: usize, requested: usize) -> Self {
        let count = requested.min(extent);
        let n = extent as f64;
        let mut table = Vec::with_capacity(count * extent);
        for a in 0..count {
            for x in 0..extent {
                let value = if a == 0 {
                    (1.0 / n).sqrt()
                } else {
                    (2.0 / n).sqrt()
                        * (std::f64::consts::PI * (2.0 * x as f64 + 1.0) * a as f64 / (2.0 * n)).cos()
                };
                table.push(value);
            }
        }
        Self { extent, count, table }
    }

    pub fn extent(&self) -> usize {
        self.extent
    }

    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn value(&self, a: usize, x: usize) -> f64 {
        self.table[a * self.extent + x]
    }

    /// All basis values at sample `x`.
    fn column(&self, x: usize) -> Vec<f64> {
        (0..self.count).map(|a| self.value(a, x)).collect()
    }
}

/// Displacement field `u(x) = Σ_k C_k Φ_k(x)`, one coefficient block per
/// component, in voxels of the "to" image.
///
/// Coefficient `(a, b, g)` of a block sits at `(g · ky + b) · kx + a`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeformationField {
    geometry: [usize; 3],
    grid: [usize; 3],
    basis: [CosineBasis; 3],
    coefficients: [Vec<f64>; 3],
}

impl DeformationField {
    /// Zero field over `geometry` with `grid` basis functions per axis.
    pub fn new(geometry: [usize; 3], grid: [usize; 3]) -> Self {
        let basis = [
            CosineBasis::new(geometry[0], grid[0]),
            CosineBasis::new(geometry[1], grid[1]),
            CosineBasis::new(geometry[2], grid[2]),
        ];
        let size = basis.iter().map(CosineBasis::count).product::<usize>();
        Self {
            geometry,
            grid,
            basis,
            coefficients: [vec![0.0; size], vec![0.0; size], vec![0.0; size]],
        }
    }

    /// Control grid `(7k, 9k, 7k)` for resolution factor `k`.
    pub fn grid_for(factor: usize) -> [usize; 3] {
        [7 * factor, 9 * factor, 7 * factor]
    }

    pub fn for_factor(geometry: [usize; 3], factor: usize) -> Self {
        Self::new(geometry, Self::grid_for(factor))
    }

    pub fn geometry(&self) -> [usize; 3] {
        self.geometry
    }

    /// Requested basis functions per axis.
    pub fn grid(&self) -> [usize; 3] {
        self.grid
    }

    /// Effective basis functions per axis.
    pub fn basis_counts(&self) -> [usize; 3] {
        [self.basis[0].count(), self.basis[1].count(), self.basis[2].count()]
    }

    pub fn basis(&self, axis: usize) -> &CosineBasis {
        &self.basis[axis]
    }

    pub fn coefficients(&self) -> &[Vec<f64>; 3] {
        &self.coefficients
    }

    pub fn coefficients_mut(&mut self) -> &mut [Vec<f64>; 3] {
        &mut self.coefficients
    }

    pub fn is_identity(&self) -> bool {
        self.coefficients.iter().all(|block| block.iter().all(|&c| c == 0.0))
    }

    /// `a² + b² + g²` for every coefficient slot.
    pub fn frequency_weights(&self) -> Vec<f64> {
        let [kx, ky, kz] = self.basis_counts();
        let mut weights = Vec::with_capacity(kx * ky * kz);
        for g in 0..kz {
            for b in 0..ky {
                for a in 0..kx {
                    weights.push((a * a + b * b + g * g) as f64);
                }
            }
        }
        weights
    }

    /// Displacement at a voxel; indices are clamped to the geometry.
    pub fn displacement_at(&self, voxel: [i64; 3]) -> [f64; 3] {
        if self.geometry.iter().any(|&n| n == 0) {
            return [0.0; 3];
        }

        let mut clamped = [0usize; 3];
        for axis in 0..3 {
            clamped[axis] = voxel[axis].clamp(0, self.geometry[axis] as i64 - 1) as usize;
        }
        let bx = self.basis[0].column(clamped[0]);
        let by = self.basis[1].column(clamped[1]);
        let bz = self.basis[2].column(clamped[2]);

        let mut out = [0.0; 3];
        let mut index = 0;
        for &wz in &bz {
            for &wy in &by {
                let wzy = wz * wy;
                for &wx in &bx {
                    let phi = wzy * wx;
                    for (component, block) in self.coefficients.iter().enumerate() {
                        out[component] += block[index] * phi;
                    }
                    index += 1;
                }
            }
        }
        out
    }

    /// `voxel + displacement(voxel)`.
    pub fn map_voxel(&self, voxel: [i64; 3]) -> [f64; 3] {
        let d = self.displacement_at(voxel);
        [
            voxel[0] as f64 + d[0],
            voxel[1] as f64 + d[1],
            voxel[2] as f64 + d[2],
        ]
    }

    /// Dense displacement of one component over the whole geometry,
    /// x varying fastest.
    pub fn synthesize(&self, component: usize) -> Vec<f64> {
        self.synthesize_block(&self.coefficients[component])
    }

    /// Dense field of an arbitrary coefficient block laid out like
    /// [`DeformationField::coefficients`].
    pub fn synthesize_block(&self, coefficients: &[f64]) -> Vec<f64> {
        let mut values = coefficients.to_vec();
        let mut dims = self.basis_counts();
        for axis in 0..3 {
            let basis = &self.basis[axis];
            let (next, next_dims) = along_axis(&values, dims, axis, basis.extent(), |x, a| basis.value(a, x));
            values = next;
            dims = next_dims;
        }
        values
    }

    /// Adjoint of [`DeformationField::synthesize`]: `Σ_x v(x) Φ_k(x)` for
    /// every coefficient slot. With `squared` the basis values are squared,
    /// which yields `Σ_x v(x) Φ_k(x)²`.
    pub fn project(&self, values: &[f64], squared: bool) -> Vec<f64> {
        let mut out = values.to_vec();
        let mut dims = self.geometry;
        for axis in 0..3 {
            let basis = &self.basis[axis];
            let (next, next_dims) = along_axis(&out, dims, axis, basis.count(), |a, x| {
                let v = basis.value(a, x);
                if squared {
                    v * v
                } else {
                    v
                }
            });
            out = next;
            dims = next_dims;
        }
        out
    }
}

/// Mode product along `axis` of a `[d0, d1, d2]` block (d0 fastest):
/// `out[.., o, ..] = Σ_i weight(o, i) · input[.., i, ..]`.
fn along_axis<W>(input: &[f64], dims: [usize; 3], axis: usize, out_len: usize, weight: W) -> (Vec<f64>, [usize; 3])
where
    W: Fn(usize, usize) -> f64 + Sync,
{
    let mut out_dims = dims;
    out_dims[axis] = out_len;
    let total = out_dims.iter().product::<usize>();
    let mut out = vec![0.0; total];
    if total == 0 {
        return (out, out_dims);
    }

    let in_strides = [1, dims[0], dims[0] * dims[1]];
    let slab = out_dims[0] * out_dims[1];
    let in_len = dims[axis];

    out.par_chunks_mut(slab).enumerate().for_each(|(z, plane)| {
        for y in 0..out_dims[1] {
            for x in 0..out_dims[0] {
                let index = [x, y, z];
                let o = index[axis];
                let mut base = 0;
                for k in 0..3 {
                    if k != axis {
                        base += index[k] * in_strides[k];
                    }
                }
                let mut sum = 0.0;
                for i in 0..in_len {
                    sum += weight(o, i) * input[base + i * in_strides[axis]];
                }
                plane[y * out_dims[0] + x] = sum;
            }
        }
    });

    (out, out_dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basis_is_orthonormal() {
        let basis = CosineBasis::new(10, 4);
        for a in 0..4 {
            for b in 0..4 {
                let dot: f64 = (0..10).map(|x| basis.value(a, x) * basis.value(b, x)).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-12, "<{}, {}> = {}", a, b, dot);
            }
        }
    }

    #[test]
    fn test_basis_count_capped_by_extent() {
        let field = DeformationField::for_factor([5, 20, 3], 1);
        assert_eq!(field.grid(), [7, 9, 7]);
        assert_eq!(field.basis_counts(), [5, 9, 3]);
        assert_eq!(field.coefficients()[0].len(), 5 * 9 * 3);
    }

    #[test]
    fn test_new_field_is_identity() {
        let field = DeformationField::for_factor([8, 8, 8], 2);
        assert!(field.is_identity());
        assert_eq!(field.displacement_at([3, 4, 5]), [0.0; 3]);
        assert_eq!(field.map_voxel([3, 4, 5]), [3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_constant_coefficient_shifts_everything() {
        let mut field = DeformationField::for_factor([4, 4, 4], 1);
        // Φ_000 = (1/2)^3 on a 4x4x4 grid.
        field.coefficients_mut()[1][0] = 8.0;
        assert!(!field.is_identity());
        let mapped = field.map_voxel([1, 2, 3]);
        assert!((mapped[0] - 1.0).abs() < 1e-12);
        assert!((mapped[1] - 3.0).abs() < 1e-12);
        assert!((mapped[2] - 3.0).abs() < 1e-12);
        // Out of range voxels use the clamped displacement.
        let far = field.map_voxel([-5, 9, 1]);
        assert!((far[1] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_synthesize_matches_pointwise() {
        let mut field = DeformationField::new([5, 4, 3], [3, 2, 2]);
        for (i, c) in field.coefficients_mut()[2].iter_mut().enumerate() {
            *c = (i as f64 * 0.37).sin();
        }
        let dense = field.synthesize(2);
        for z in 0..3 {
            for y in 0..4 {
                for x in 0..5 {
                    let expected = field.displacement_at([x as i64, y as i64, z as i64])[2];
                    let actual = dense[(z * 4 + y) * 5 + x];
                    assert!((expected - actual).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_project_is_adjoint_of_synthesize() {
        let mut field = DeformationField::new([6, 5, 4], [3, 3, 2]);
        let coefficients: Vec<f64> = (0..18).map(|i| (i as f64 * 0.91).cos()).collect();
        field.coefficients_mut()[0] = coefficients.clone();
        let values: Vec<f64> = (0..120).map(|i| (i as f64 * 0.13).sin()).collect();

        let synthesized = field.synthesize(0);
        let projected = field.project(&values, false);

        let lhs: f64 = synthesized.iter().zip(&values).map(|(a, b)| a * b).sum();
        let rhs: f64 = coefficients.iter().zip(&projected).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-10);
    }

    #[test]
    fn test_empty_geometry() {
        let field = DeformationField::for_factor([0, 0, 0], 1);
        assert!(field.is_identity());
        assert_eq!(field.displacement_at([0, 0, 0]), [0.0; 3]);
        assert!(field.synthesize(0).is_empty());
    }
}
