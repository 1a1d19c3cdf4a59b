use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Vector3};

use volume_reslice::{
    BorderMode, ImageReslice, ImageStencil, InterpolationMode, Orientation, PointTransform,
    ResliceError, ReslicePhase, ScalarBuffer, ScalarKind, SlabConfig, SlabMode, VolumeImage,
};

fn counting_volume(dimensions: [usize; 3]) -> VolumeImage {
    let n = dimensions.iter().product::<usize>();
    VolumeImage::from_vec(dimensions, (0..n).map(|v| v as u8).collect()).unwrap()
}

fn values_u8(image: &VolumeImage) -> Vec<u8> {
    image.as_slice::<u8>().unwrap().to_vec()
}

/// 90 degree rotation about z through voxel (2, 2) of a 5x5 plane.
fn quarter_turn() -> Matrix4<f64> {
    Matrix4::new(
        0.0, -1.0, 0.0, 4.0,
        1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

fn quarter_turn_back() -> Matrix4<f64> {
    Matrix4::new(
        0.0, 1.0, 0.0, 0.0,
        -1.0, 0.0, 0.0, 4.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

#[test]
fn test_identity_reproduces_input() {
    let input = counting_volume([4, 4, 4]);
    let mut reslice = ImageReslice::new();
    let output = reslice.execute(&input).unwrap();

    assert_eq!(output.dimensions(), [4, 4, 4]);
    assert_eq!(output.spacing(), [1.0; 3]);
    assert_eq!(output.origin(), [0.0; 3]);
    assert_eq!(output.scalar_kind(), ScalarKind::UInt8);
    assert_eq!(values_u8(&output), values_u8(&input));
    assert_eq!(reslice.phase(), ReslicePhase::Done);
    assert!(reslice.index_matrix(&input).unwrap().is_identity);
}

#[test]
fn test_identity_linear_and_cubic_reproduce_input() {
    let input = counting_volume([4, 4, 4]);
    for mode in [InterpolationMode::Linear, InterpolationMode::Cubic] {
        let mut reslice = ImageReslice::new();
        reslice.set_interpolation_mode(mode);
        let output = reslice.execute(&input).unwrap();
        assert_eq!(values_u8(&output), values_u8(&input), "{mode:?}");
    }
}

#[test]
fn test_identity_keeps_physical_geometry() {
    let input = counting_volume([4, 3, 2])
        .with_origin([10.0, -5.0, 2.0])
        .with_spacing([0.5, 2.0, 4.0])
        .unwrap();
    let output = ImageReslice::new().execute(&input).unwrap();
    assert_eq!(output.dimensions(), [4, 3, 2]);
    assert_eq!(output.spacing(), [0.5, 2.0, 4.0]);
    assert_eq!(output.origin(), [10.0, -5.0, 2.0]);
    assert_eq!(values_u8(&output), values_u8(&input));
}

#[test]
fn test_rotation_round_trip() {
    let input = counting_volume([5, 5, 3]);
    for mode in [InterpolationMode::Nearest, InterpolationMode::Linear] {
        let mut forward = ImageReslice::new();
        forward.set_interpolation_mode(mode);
        forward.set_transform_input_sampling(false);
        forward.set_reslice_axes(Some(quarter_turn()));
        let rotated = forward.execute(&input).unwrap();
        assert_eq!(rotated.dimensions(), [5, 5, 3]);
        // out(x, y) = in(4 - y, x)
        assert_eq!(rotated.value_at(0, 0, 0, 0), input.value_at(4, 0, 0, 0));
        assert_eq!(rotated.value_at(1, 3, 2, 0), input.value_at(1, 1, 2, 0));

        let mut back = ImageReslice::new();
        back.set_interpolation_mode(mode);
        back.set_transform_input_sampling(false);
        back.set_reslice_axes(Some(quarter_turn_back()));
        let restored = back.execute(&rotated).unwrap();
        assert_eq!(values_u8(&restored), values_u8(&input), "{mode:?}");
    }
}

#[test]
fn test_coronal_plane_through_centre() {
    let input = counting_volume([4, 5, 6]);
    let mut reslice = ImageReslice::new();
    reslice.set_reslice_axes_from_orientation(Orientation::Coronal, input.center());
    reslice.set_output_dimensionality(2);
    let output = reslice.execute(&input).unwrap();

    assert_eq!(output.dimensions(), [4, 6, 1]);
    for j in 0..6 {
        for i in 0..4 {
            assert_eq!(output.value_at(i, j, 0, 0), input.value_at(i, 2, j, 0));
        }
    }
    let image = output.slice_to_image(0, 0).unwrap();
    assert_eq!(image.dimensions(), (4, 6));
}

#[test]
fn test_out_of_bounds_gets_background() {
    let input = counting_volume([4, 2, 1]);
    let mut translate = Matrix4::identity();
    translate[(0, 3)] = 2.0;

    for optimization in [true, false] {
        let mut reslice = ImageReslice::new();
        reslice.set_transform_input_sampling(false);
        reslice.set_reslice_axes(Some(translate));
        reslice.set_background_level(200.0);
        reslice.set_optimization(optimization);
        let output = reslice.execute(&input).unwrap();
        assert_eq!(values_u8(&output), vec![2, 3, 200, 200, 6, 7, 200, 200]);
    }
}

#[test]
fn test_border_flag_controls_half_voxel_tolerance() {
    let input = counting_volume([4, 1, 1]);
    let mut translate = Matrix4::identity();
    translate[(0, 3)] = 0.5;

    let mut reslice = ImageReslice::new();
    reslice.set_transform_input_sampling(false);
    reslice.set_reslice_axes(Some(translate));
    reslice.set_background_level(99.0);
    let with_border = reslice.execute(&input).unwrap();
    // x = 3.5 is still within half a voxel of the last sample
    assert_eq!(values_u8(&with_border), vec![1, 2, 3, 3]);

    reslice.set_border(false);
    let without_border = reslice.execute(&input).unwrap();
    assert_eq!(values_u8(&without_border), vec![1, 2, 3, 99]);
}

#[test]
fn test_fast_path_matches_general_path() {
    let n = 9 * 7 * 3;
    let input = VolumeImage::from_vec([9, 7, 3], (0..n).map(|v| (v * 37 % 4096) as u16).collect())
        .unwrap()
        .with_spacing([0.8, 1.1, 2.0])
        .unwrap();
    let (sin, cos) = 0.5f64.sin_cos();
    let center = input.center();
    let axes = Matrix4::new(
        cos, -sin, 0.0, center[0],
        sin, cos, 0.0, center[1],
        0.0, 0.0, 1.0, center[2],
        0.0, 0.0, 0.0, 1.0,
    );

    let run = |optimization: bool| {
        let mut reslice = ImageReslice::new();
        reslice.set_reslice_axes(Some(axes));
        reslice.set_background_level(7.0);
        reslice.set_optimization(optimization);
        reslice.execute(&input).unwrap()
    };
    let fast = run(true);
    let general = run(false);
    assert_eq!(fast.dimensions(), general.dimensions());
    assert_eq!(fast.scalars(), general.scalars());
}

/// 3x3x5 volume whose value is `10 * z`, sliced at z = 2.
fn slab_reslice(mode: SlabMode, trapezoid: bool) -> f64 {
    let mut data = Vec::new();
    for z in 0..5u16 {
        data.extend(std::iter::repeat_n(10 * z, 9));
    }
    let input = VolumeImage::from_vec([3, 3, 5], data).unwrap();

    let mut reslice = ImageReslice::new();
    reslice.set_reslice_axes(Some(Matrix4::new_translation(&Vector3::new(0.0, 0.0, 2.0))));
    reslice.set_output_dimensionality(2);
    reslice.set_output_scalar_kind(Some(ScalarKind::Float64));
    reslice.set_slab(SlabConfig {
        sample_count: 3,
        sample_spacing_fraction: 1.0,
        mode,
        trapezoid_integration: trapezoid,
    });
    let output = reslice.execute(&input).unwrap();
    assert_eq!(output.dimensions(), [3, 3, 1]);
    let values = output.as_slice::<f64>().unwrap();
    assert!(values.iter().all(|v| *v == values[0]));
    values[0]
}

#[test]
fn test_slab_modes() {
    assert_relative_eq!(slab_reslice(SlabMode::Min, false), 10.0);
    assert_relative_eq!(slab_reslice(SlabMode::Max, false), 30.0);
    assert_relative_eq!(slab_reslice(SlabMode::Mean, false), 20.0);
    assert_relative_eq!(slab_reslice(SlabMode::Sum, false), 60.0);
    assert_relative_eq!(slab_reslice(SlabMode::Sum, true), 40.0);
    assert_relative_eq!(slab_reslice(SlabMode::Mean, true), 20.0);
}

#[test]
fn test_slab_of_identical_slices() {
    let input = VolumeImage::from_vec([2, 2, 4], vec![5u8; 16]).unwrap();
    let mut reslice = ImageReslice::new();
    reslice.set_reslice_axes(Some(Matrix4::new_translation(&Vector3::new(0.0, 0.0, 1.5))));
    reslice.set_output_dimensionality(2);
    reslice.set_output_scalar_kind(Some(ScalarKind::UInt16));
    for (mode, expected) in [
        (SlabMode::Min, 5),
        (SlabMode::Max, 5),
        (SlabMode::Mean, 5),
        (SlabMode::Sum, 20),
    ] {
        reslice.set_slab(SlabConfig {
            sample_count: 4,
            sample_spacing_fraction: 1.0,
            mode,
            trapezoid_integration: false,
        });
        let output = reslice.execute(&input).unwrap();
        assert_eq!(output.as_slice::<u16>().unwrap(), &[expected; 4], "{mode:?}");
    }
}

/// 2x2x3 volume with slices 10, 20, 30, slab centred on z = 0 so the
/// sample at z = -1 falls outside.
fn slab_edge_reslice(mode: SlabMode) -> Vec<f64> {
    let mut data = Vec::new();
    for value in [10u8, 20, 30] {
        data.extend(std::iter::repeat_n(value, 4));
    }
    let input = VolumeImage::from_vec([2, 2, 3], data).unwrap();

    let mut reslice = ImageReslice::new();
    reslice.set_border(false);
    reslice.set_output_dimensionality(2);
    reslice.set_output_scalar_kind(Some(ScalarKind::Float64));
    reslice.set_slab(SlabConfig {
        sample_count: 3,
        sample_spacing_fraction: 1.0,
        mode,
        trapezoid_integration: false,
    });
    let output = reslice.execute(&input).unwrap();
    assert_eq!(output.dimensions(), [2, 2, 1]);
    output.as_slice::<f64>().unwrap().to_vec()
}

#[test]
fn test_slab_at_volume_edge_reduces_in_bounds_samples_only() {
    assert_eq!(slab_edge_reslice(SlabMode::Mean), vec![15.0; 4]);
    assert_eq!(slab_edge_reslice(SlabMode::Sum), vec![30.0; 4]);
    assert_eq!(slab_edge_reslice(SlabMode::Min), vec![10.0; 4]);
    assert_eq!(slab_edge_reslice(SlabMode::Max), vec![20.0; 4]);
}

#[test]
fn test_overflowing_output_spacing_rejected() {
    let input = counting_volume([4, 4, 4]);
    let mut reslice = ImageReslice::new();
    reslice.set_output_spacing(Some([1e-12, 1.0, 1.0]));
    assert!(matches!(
        reslice.output_geometry(&input),
        Err(ResliceError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        reslice.execute(&input),
        Err(ResliceError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_conversion_clamps_out_of_range_values() {
    let input = VolumeImage::from_vec([4, 1, 1], vec![-10.4f32, 3.5, 300.0, 254.6]).unwrap();
    let mut reslice = ImageReslice::new();
    reslice.set_output_scalar_kind(Some(ScalarKind::UInt8));
    let output = reslice.execute(&input).unwrap();
    assert_eq!(values_u8(&output), vec![0, 4, 255, 255]);
}

#[test]
fn test_shift_and_scale() {
    let input = VolumeImage::from_vec([4, 1, 1], vec![3u8, 100, 200, 255]).unwrap();

    let mut reslice = ImageReslice::new();
    reslice.set_scalar_scale(2.0);
    let doubled = reslice.execute(&input).unwrap();
    assert_eq!(values_u8(&doubled), vec![6, 200, 255, 255]);

    reslice.set_scalar_scale(0.5);
    let halved = reslice.execute(&input).unwrap();
    assert_eq!(values_u8(&halved), vec![2, 50, 100, 128]);

    reslice.set_scalar_shift(-100.0);
    reslice.set_scalar_scale(1.0);
    reslice.set_output_scalar_kind(Some(ScalarKind::Int16));
    let shifted = reslice.execute(&input).unwrap();
    assert_eq!(shifted.as_slice::<i16>().unwrap(), &[-97, 0, 100, 155]);
}

#[test]
fn test_stencil_masks_output() {
    let input = counting_volume([4, 3, 1]);
    let mut stencil = ImageStencil::new([0, 3, 0, 2, 0, 0]);
    stencil.insert_next_extent(1, 2, 1, 0);

    let mut reslice = ImageReslice::new();
    reslice.set_stencil(Some(stencil));
    reslice.set_background_level(99.0);
    reslice.set_generate_stencil_output(true);
    let output = reslice.execute(&input).unwrap();

    assert_eq!(
        values_u8(&output),
        vec![99, 99, 99, 99, 99, 5, 6, 99, 99, 99, 99, 99]
    );
    let produced = reslice.output_stencil().unwrap();
    assert_eq!(produced.row_extents(1, 0), &[(1, 2)]);
    assert!(produced.row_extents(0, 0).is_empty());
}

#[test]
fn test_output_stencil_marks_in_bounds_runs() {
    let input = counting_volume([4, 2, 1]);
    let mut translate = Matrix4::identity();
    translate[(0, 3)] = 2.0;
    for optimization in [true, false] {
        let mut reslice = ImageReslice::new();
        reslice.set_transform_input_sampling(false);
        reslice.set_reslice_axes(Some(translate));
        reslice.set_optimization(optimization);
        reslice.set_generate_stencil_output(true);
        reslice.execute(&input).unwrap();
        let stencil = reslice.output_stencil().unwrap();
        assert_eq!(stencil.row_extents(0, 0), &[(0, 1)]);
        assert_eq!(stencil.row_extents(1, 0), &[(0, 1)]);
    }
}

#[derive(Debug)]
struct ShiftX(f64);

impl PointTransform for ShiftX {
    fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        [point[0] + self.0, point[1], point[2]]
    }
}

#[test]
fn test_point_transform_runs_in_data_coordinates() {
    let input = counting_volume([4, 1, 1])
        .with_origin([10.0, 0.0, 0.0])
        .with_spacing([2.0, 1.0, 1.0])
        .unwrap();
    let mut reslice = ImageReslice::new();
    reslice.set_point_transform(Some(Arc::new(ShiftX(2.0))));
    reslice.set_background_level(50.0);
    let output = reslice.execute(&input).unwrap();
    assert_eq!(values_u8(&output), vec![1, 2, 3, 50]);
}

#[test]
fn test_perspective_divide() {
    let input = VolumeImage::from_vec([9, 1, 1], (0..9).map(|v| v * 10).collect::<Vec<u8>>())
        .unwrap();
    let mut axes = Matrix4::identity();
    axes[(3, 3)] = 2.0;

    let mut reslice = ImageReslice::new();
    reslice.set_transform_input_sampling(false);
    reslice.set_reslice_axes(Some(axes));
    reslice.set_interpolation_mode(InterpolationMode::Linear);
    assert!(reslice.index_matrix(&input).unwrap().perspective);
    let output = reslice.execute(&input).unwrap();
    assert_eq!(values_u8(&output), vec![0, 5, 10, 15, 20, 25, 30, 35, 40]);
}

fn rgb_volume() -> VolumeImage {
    let scalars = ScalarBuffer::from(vec![1u8, 2, 3, 4, 5, 6]);
    VolumeImage::new([2, 1, 1], [0.0; 3], [1.0; 3], 3, scalars).unwrap()
}

#[test]
fn test_component_selection() {
    let input = rgb_volume();
    let mut reslice = ImageReslice::new();
    reslice.interpolator_mut().set_components(1, Some(1));
    let output = reslice.execute(&input).unwrap();
    assert_eq!(output.components(), 1);
    assert_eq!(values_u8(&output), vec![2, 5]);

    reslice.interpolator_mut().set_components(2, Some(2));
    assert!(matches!(
        reslice.execute(&input),
        Err(ResliceError::ComponentMismatch { .. })
    ));
}

#[test]
fn test_background_color_per_component() {
    let input = rgb_volume();
    let mut translate = Matrix4::identity();
    translate[(0, 3)] = 1.0;
    let mut reslice = ImageReslice::new();
    reslice.set_transform_input_sampling(false);
    reslice.set_reslice_axes(Some(translate));
    reslice.set_background_color([7.0, 8.0, 9.0, 0.0]);
    let output = reslice.execute(&input).unwrap();
    assert_eq!(values_u8(&output), vec![4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_update_requires_input() {
    let mut reslice = ImageReslice::new();
    assert!(matches!(reslice.update(), Err(ResliceError::InvalidInput(_))));

    let input = Arc::new(counting_volume([2, 2, 2]));
    reslice.set_input(Some(input.clone()));
    let output = reslice.update().unwrap();
    assert_eq!(output.scalars(), input.scalars());
}

#[test]
fn test_unimplemented_border_modes_rejected() {
    let input = counting_volume([2, 2, 2]);
    for mode in [BorderMode::Wrap, BorderMode::Mirror] {
        let mut reslice = ImageReslice::new();
        reslice.set_border_mode(mode);
        assert!(matches!(
            reslice.execute(&input),
            Err(ResliceError::InvalidConfiguration(_))
        ));
    }
}

#[test]
fn test_abort_flag_cancels() {
    let input = counting_volume([4, 4, 4]);
    let mut reslice = ImageReslice::new();
    reslice.set_abort_flag(Some(Arc::new(AtomicBool::new(true))));
    assert_eq!(reslice.execute(&input), Err(ResliceError::Cancelled));
    assert_ne!(reslice.phase(), ReslicePhase::Done);
}

#[test]
fn test_axes_change_rebuilds_index_matrix() {
    let input = counting_volume([4, 4, 4]);
    let mut reslice = ImageReslice::new();
    let first = reslice.index_matrix(&input).unwrap();
    assert!(first.is_identity);
    assert_eq!(reslice.index_matrix(&input).unwrap(), first);

    reslice.set_transform_input_sampling(false);
    reslice.set_reslice_axes(Some(Matrix4::new_translation(&Vector3::new(1.0, 0.0, 0.0))));
    let moved = reslice.index_matrix(&input).unwrap();
    assert!(!moved.is_identity);
    assert_eq!(moved.column(3), [1.0, 0.0, 0.0, 1.0]);

    let shifted_input = counting_volume([4, 4, 4]).with_origin([0.0, 0.0, 3.0]);
    let rebuilt = reslice.index_matrix(&shifted_input).unwrap();
    assert_eq!(rebuilt.column(3), [1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_invalid_dimensionality_rejected() {
    let input = counting_volume([2, 2, 2]);
    let mut reslice = ImageReslice::new();
    reslice.set_output_dimensionality(4);
    assert!(matches!(
        reslice.execute(&input),
        Err(ResliceError::InvalidConfiguration(_))
    ));
}
