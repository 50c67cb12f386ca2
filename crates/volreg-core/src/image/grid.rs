use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Generate the continuous index of every voxel of a volume.
///
/// `shape` is in tensor order (`[Z, Y, X]`). The result has shape `[N, 3]`,
/// one `(x, y, z)` row per voxel, in the same order as the flattened image
/// data.
pub fn generate_grid<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 2> {
    let total: usize = shape.iter().product();
    let mut grid = Vec::with_capacity(total * 3);

    for z in 0..shape[0] {
        for y in 0..shape[1] {
            for x in 0..shape[2] {
                grid.extend_from_slice(&[x as f32, y as f32, z as f32]);
            }
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * 3])), device)
        .reshape([total, 3])
}
