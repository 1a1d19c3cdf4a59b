use crate::enums::ScalarKind;
use crate::error::ResliceError;
use crate::scalar::{Scalar, ScalarBuffer, dispatch_buffer};

use image::ImageBuffer;
use image::Luma;
use ndarray::Array3;
use ndarray::ArrayView4;
use rayon::prelude::*;

/// A regular 3D grid of scalars with one or more components per voxel.
///
/// Scalars are stored x-fastest, then y, then z, with the components of one
/// voxel adjacent. Spacing may be negative but never zero.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeImage {
    dimensions: [usize; 3],
    origin: [f64; 3],
    spacing: [f64; 3],
    components: usize,
    scalars: ScalarBuffer,
}

impl VolumeImage {
    /// # Errors
    ///
    /// `InvalidInput` for a zero dimension or spacing, `ComponentMismatch`
    /// if the buffer length is not `voxels * components`.
    pub fn new(
        dimensions: [usize; 3],
        origin: [f64; 3],
        spacing: [f64; 3],
        components: usize,
        scalars: ScalarBuffer,
    ) -> Result<Self, ResliceError> {
        if dimensions.contains(&0) {
            return Err(ResliceError::InvalidInput(format!(
                "dimensions must be at least 1, got {dimensions:?}"
            )));
        }
        if spacing.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(ResliceError::InvalidInput(format!(
                "spacing must be finite and non-zero, got {spacing:?}"
            )));
        }
        if components == 0 {
            return Err(ResliceError::ComponentMismatch {
                expected: 1,
                actual: 0,
            });
        }
        let voxels = dimensions.iter().product::<usize>();
        if scalars.len() != voxels * components {
            return Err(ResliceError::ComponentMismatch {
                expected: voxels * components,
                actual: scalars.len(),
            });
        }
        Ok(Self {
            dimensions,
            origin,
            spacing,
            components,
            scalars,
        })
    }

    /// Single-component volume with unit spacing at the origin.
    pub fn from_vec<T: Scalar>(dimensions: [usize; 3], data: Vec<T>) -> Result<Self, ResliceError> {
        Self::new(dimensions, [0.0; 3], [1.0; 3], 1, data.into())
    }

    /// Build from a `(depth, height, width)` array.
    pub fn from_array<T: Scalar>(data: Array3<T>) -> Result<Self, ResliceError> {
        let (depth, height, width) = data.dim();
        // logical order, whatever the memory layout
        let values: Vec<T> = data.iter().copied().collect();
        Self::from_vec([width, height, depth], values)
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Result<Self, ResliceError> {
        Self::new(self.dimensions, self.origin, spacing, self.components, self.scalars)
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn scalar_kind(&self) -> ScalarKind {
        self.scalars.kind()
    }

    pub fn scalars(&self) -> &ScalarBuffer {
        &self.scalars
    }

    pub fn into_scalars(self) -> ScalarBuffer {
        self.scalars
    }

    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// Index extent `[x0, x1, y0, y1, z0, z1]`, always starting at zero.
    pub fn extent(&self) -> [i32; 6] {
        let [nx, ny, nz] = self.dimensions;
        [0, nx as i32 - 1, 0, ny as i32 - 1, 0, nz as i32 - 1]
    }

    /// Physical bounds `[xmin, xmax, ymin, ymax, zmin, zmax]` of the voxel centres.
    pub fn bounds(&self) -> [f64; 6] {
        let mut bounds = [0.0; 6];
        for axis in 0..3 {
            let first = self.origin[axis];
            let last = first + (self.dimensions[axis] - 1) as f64 * self.spacing[axis];
            bounds[2 * axis] = first.min(last);
            bounds[2 * axis + 1] = first.max(last);
        }
        bounds
    }

    pub fn center(&self) -> [f64; 3] {
        let b = self.bounds();
        [
            0.5 * (b[0] + b[1]),
            0.5 * (b[2] + b[3]),
            0.5 * (b[4] + b[5]),
        ]
    }

    pub fn as_slice<T: Scalar>(&self) -> Option<&[T]> {
        T::slice_of(&self.scalars)
    }

    /// Typed `(z, y, x, component)` view of the scalars.
    pub fn view<T: Scalar>(&self) -> Option<ArrayView4<'_, T>> {
        let [nx, ny, nz] = self.dimensions;
        ArrayView4::from_shape((nz, ny, nx, self.components), self.as_slice::<T>()?).ok()
    }

    pub fn value_at(&self, x: usize, y: usize, z: usize, component: usize) -> Option<f64> {
        let [nx, ny, nz] = self.dimensions;
        if x >= nx || y >= ny || z >= nz || component >= self.components {
            return None;
        }
        let index = ((z * ny + y) * nx + x) * self.components + component;
        self.scalars.get_f64(index)
    }

    #[inline]
    fn normalize_to_u8(value: f64, min: f64, max: f64) -> u8 {
        if max <= min {
            return 0;
        }
        (((value - min) / (max - min)) * 255.0).clamp(0.0, 255.0) as u8
    }

    /// Grayscale preview of one z-slice, stretched over the slice's value range.
    pub fn slice_to_image(
        &self,
        z: usize,
        component: usize,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let [nx, ny, nz] = self.dimensions;
        if z >= nz || component >= self.components {
            return None;
        }
        let stride = self.components;
        let start = z * nx * ny * stride;
        let end = start + nx * ny * stride;
        let values: Vec<f64> = dispatch_buffer!(&self.scalars, data => data[start..end]
            .par_iter()
            .skip(component)
            .step_by(stride)
            .map(|&v| Scalar::to_f64(v))
            .collect());

        let (min, max) = values
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let pixel_data: Vec<u8> = values
            .into_par_iter()
            .map(|v| Self::normalize_to_u8(v, min, max))
            .collect();
        ImageBuffer::from_raw(nx as u32, ny as u32, pixel_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(dimensions: [usize; 3]) -> VolumeImage {
        let n = dimensions.iter().product::<usize>();
        VolumeImage::from_vec(dimensions, (0..n).map(|v| v as u16).collect())
            .expect("valid volume")
    }

    #[test]
    fn test_new_rejects_bad_length() {
        let err = VolumeImage::new(
            [2, 2, 2],
            [0.0; 3],
            [1.0; 3],
            2,
            ScalarBuffer::from(vec![0u8; 8]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ResliceError::ComponentMismatch {
                expected: 16,
                actual: 8
            }
        );
    }

    #[test]
    fn test_new_rejects_zero_dimension_and_spacing() {
        assert!(matches!(
            VolumeImage::from_vec([0, 1, 1], Vec::<u8>::new()),
            Err(ResliceError::InvalidInput(_))
        ));
        assert!(matches!(
            ramp([2, 2, 1]).with_spacing([1.0, 0.0, 1.0]),
            Err(ResliceError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_into_scalars_returns_buffer() {
        let scalars = ramp([2, 1, 1]).into_scalars();
        assert_eq!(scalars, ScalarBuffer::from(vec![0u16, 1]));
    }

    #[test]
    fn test_value_at_layout_is_x_fastest() {
        let volume = ramp([3, 2, 2]);
        assert_eq!(volume.value_at(1, 0, 0, 0), Some(1.0));
        assert_eq!(volume.value_at(0, 1, 0, 0), Some(3.0));
        assert_eq!(volume.value_at(0, 0, 1, 0), Some(6.0));
        assert_eq!(volume.value_at(3, 0, 0, 0), None);
    }

    #[test]
    fn test_view_matches_value_at() {
        let volume = ramp([3, 2, 2]);
        let view = volume.view::<u16>().expect("u16 view");
        assert_eq!(view.dim(), (2, 2, 3, 1));
        assert_eq!(view[[1, 1, 2, 0]] as f64, volume.value_at(2, 1, 1, 0).unwrap());
        assert!(volume.view::<u8>().is_none());
    }

    #[test]
    fn test_from_array_keeps_depth_height_width() {
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 100 + y * 10 + x) as i16);
        let volume = VolumeImage::from_array(data).unwrap();
        assert_eq!(volume.dimensions(), [4, 3, 2]);
        assert_eq!(volume.value_at(3, 2, 1, 0), Some(123.0));
    }

    #[test]
    fn test_bounds_with_negative_spacing() {
        let volume = ramp([3, 2, 1])
            .with_origin([10.0, 0.0, 0.0])
            .with_spacing([-2.0, 1.0, 1.0])
            .unwrap();
        assert_eq!(volume.bounds(), [6.0, 10.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(volume.center(), [8.0, 0.5, 0.0]);
    }

    #[test]
    fn test_slice_to_image_normalizes() {
        let volume = ramp([2, 2, 2]);
        let image = volume.slice_to_image(1, 0).expect("slice exists");
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(1, 1).0[0], 255);
        assert!(volume.slice_to_image(2, 0).is_none());
    }
}
