use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use volreg_core::filter::ResampleImageFilter;
use volreg_core::image::{Image, VoxelBuffer};
use volreg_core::interpolation::LinearInterpolator;
use volreg_core::spatial::{Point3, Spacing3};
use volreg_core::transform::{AffineParameters, Frame, TransformationMatrix};

type Backend = NdArray<f32>;

fn blob(extent: usize, center: [f64; 3], device: &<Backend as burn::tensor::backend::Backend>::Device) -> Image<Backend, 3> {
    let mut data = Vec::with_capacity(extent * extent * extent);
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
    Image::from_vec(data, [extent; 3], Spacing3::uniform(1.0), device)
}

#[test]
fn test_image_geometry_is_reversed_shape() {
    let device = Default::default();
    let data = Tensor::<Backend, 3>::zeros([3, 4, 5], &device);
    let image = Image::new(data, Spacing3::new([0.5, 1.0, 2.0]));

    assert_eq!(image.shape(), [3, 4, 5]);
    assert_eq!(image.geometry(), [5, 4, 3]);
    assert_eq!(image.voxel_count(), 60);
}

#[test]
fn test_voxel_buffer_matches_image_layout() {
    let device = Default::default();
    let image = blob(6, [2.0, 3.0, 4.0], &device);
    let buffer = VoxelBuffer::from_image(&image).unwrap();

    assert_eq!(buffer.geometry(), [6, 6, 6]);
    assert!((buffer.at(2, 3, 4) - 1.0).abs() < 1e-6);
    assert!(buffer.at(4, 3, 2) < 0.5);
}

#[test]
fn test_inverse_matrix_aligns_from_onto_to() {
    let device = Default::default();
    let from = blob(12, [7.0, 6.0, 6.0], &device);
    let to = blob(12, [6.0, 6.0, 6.0], &device);

    // from → to moves every voxel one step down x.
    let params = AffineParameters::from_translation([-1.0, 0.0, 0.0]);
    let frame = Frame::new(from.geometry(), *from.spacing(), to.geometry(), *to.spacing());
    let forward = TransformationMatrix::from_affine(&params, &frame);
    assert!(forward.apply(&Point3::new([7.0, 6.0, 6.0])).distance(&Point3::new([6.0, 6.0, 6.0])) < 1e-12);

    let inverse = forward.inverse().unwrap();
    let aligned = ResampleImageFilter::new_from_reference(&to, inverse, LinearInterpolator::new()).apply(&from);

    let aligned = aligned.to_host().unwrap();
    let target = to.to_host().unwrap();
    let worst = aligned
        .iter()
        .zip(target.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    // Only the clamped border column differs.
    let interior = (6 * 12 + 6) * 12 + 6;
    assert!((aligned[interior] - target[interior]).abs() < 1e-5);
    assert!(worst < 0.2, "worst difference {}", worst);
}
