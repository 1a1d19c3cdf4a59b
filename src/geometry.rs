//! Derivation of the output grid from the input grid and the reslice axes.

use nalgebra::Matrix4;
use tracing::debug;

use crate::error::ResliceError;
use crate::transform::transform_point;
use crate::volume::VolumeImage;

/// Output grid of one execution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputGeometry {
    pub dimensions: [usize; 3],
    pub spacing: [f64; 3],
    /// Position of index `(0, 0, 0)`, which may lie outside `extent`.
    pub origin: [f64; 3],
    pub extent: [i32; 6],
}

impl OutputGeometry {
    /// Origin of the produced image, i.e. the position of the first voxel
    /// of `extent`.
    pub fn image_origin(&self) -> [f64; 3] {
        let mut origin = self.origin;
        for (axis, value) in origin.iter_mut().enumerate() {
            *value += self.extent[2 * axis] as f64 * self.spacing[axis];
        }
        origin
    }

    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().product()
    }
}

/// Settings that shape the output grid. `None` overrides are computed.
#[derive(Clone, Copy, Debug)]
pub struct OutputGeometryPlanner<'a> {
    pub axes: Option<&'a Matrix4<f64>>,
    pub transform_input_sampling: bool,
    pub auto_crop: bool,
    pub output_dimensionality: usize,
    pub output_spacing: Option<[f64; 3]>,
    pub output_origin: Option<[f64; 3]>,
    pub output_extent: Option<[i32; 6]>,
}

impl OutputGeometryPlanner<'_> {
    pub fn plan(&self, input: &VolumeImage) -> Result<OutputGeometry, ResliceError> {
        if !(1..=3).contains(&self.output_dimensionality) {
            return Err(ResliceError::InvalidConfiguration(format!(
                "output dimensionality must be 1, 2 or 3, got {}",
                self.output_dimensionality
            )));
        }

        let matrix = self.axes.copied().unwrap_or_else(Matrix4::identity);
        let in_origin = input.origin();
        let in_spacing = input.spacing();
        let in_extent = input.extent();

        let inverse = if self.transform_input_sampling || self.auto_crop {
            Some(matrix.try_inverse().ok_or_else(|| {
                ResliceError::InvalidAxes("reslice axes matrix is singular".to_string())
            })?)
        } else {
            None
        };

        let mut in_center = [0.0; 3];
        for i in 0..3 {
            in_center[i] = in_origin[i]
                + 0.5 * (in_extent[2 * i] + in_extent[2 * i + 1]) as f64 * in_spacing[i];
        }

        let max_bounds = match (&inverse, self.auto_crop) {
            (Some(inverse), true) => Some(auto_cropped_bounds(input, inverse)),
            _ => None,
        };

        let mut geometry = OutputGeometry {
            dimensions: [1; 3],
            spacing: [1.0; 3],
            origin: [0.0; 3],
            extent: [0; 6],
        };

        for i in 0..3 {
            // spacing, extent span, extent start, transformed centre
            let (s, mut d, e, c) = match &inverse {
                Some(inverse) if self.transform_input_sampling => {
                    let (mut s, mut d, mut e, mut c, mut r) = (0.0, 0.0, 0.0, 0.0, 0.0);
                    for j in 0..3 {
                        c += inverse[(i, j)] * (in_center[j] - matrix[(j, 3)]);
                        let weight = matrix[(j, i)] * matrix[(j, i)];
                        s += weight * in_spacing[j].abs();
                        d += weight
                            * (in_extent[2 * j + 1] - in_extent[2 * j]) as f64
                            * in_spacing[j].abs();
                        e += weight * in_extent[2 * j] as f64;
                        r += weight;
                    }
                    if r == 0.0 {
                        return Err(ResliceError::InvalidAxes(format!(
                            "output axis {i} has zero length"
                        )));
                    }
                    (s / r, d / (r * r.sqrt()), e / r, c)
                }
                _ => {
                    let s = in_spacing[i];
                    (
                        s,
                        (in_extent[2 * i + 1] - in_extent[2 * i]) as f64 * s,
                        in_extent[2 * i] as f64,
                        in_center[i],
                    )
                }
            };

            let spacing = self.output_spacing.map_or(s, |spacing| spacing[i]);
            if spacing == 0.0 || !spacing.is_finite() {
                return Err(ResliceError::InvalidConfiguration(format!(
                    "output spacing along axis {i} must be finite and non-zero"
                )));
            }
            geometry.spacing[i] = spacing;

            let (start, end) = if i >= self.output_dimensionality {
                (0, 0)
            } else if let Some(extent) = self.output_extent {
                (extent[2 * i], extent[2 * i + 1])
            } else {
                if let Some(bounds) = &max_bounds {
                    d = bounds[2 * i + 1] - bounds[2 * i];
                }
                let start = e.round();
                let end = (start + (d / spacing).abs()).round();
                (extent_index(start, i)?, extent_index(end, i)?)
            };
            if end < start {
                return Err(ResliceError::InvalidConfiguration(format!(
                    "output extent along axis {i} is empty: [{start}, {end}]"
                )));
            }
            geometry.extent[2 * i] = start;
            geometry.extent[2 * i + 1] = end;
            geometry.dimensions[i] = usize::try_from(i64::from(end) - i64::from(start) + 1)
                .map_err(|_| {
                    ResliceError::InvalidConfiguration(format!(
                        "output extent along axis {i} is too large: [{start}, {end}]"
                    ))
                })?;

            geometry.origin[i] = if i >= self.output_dimensionality {
                0.0
            } else if let Some(origin) = self.output_origin {
                origin[i]
            } else if let Some(bounds) = &max_bounds {
                // first voxel of the extent sits on the lower bound
                bounds[2 * i] - start as f64 * spacing
            } else {
                c - 0.5 * (f64::from(start) + f64::from(end)) * spacing
            };
        }

        if geometry
            .dimensions
            .iter()
            .try_fold(1usize, |count, &n| count.checked_mul(n))
            .is_none()
        {
            return Err(ResliceError::InvalidConfiguration(format!(
                "output voxel count overflows for dimensions {:?}",
                geometry.dimensions
            )));
        }

        debug!(
            dimensions = ?geometry.dimensions,
            spacing = ?geometry.spacing,
            origin = ?geometry.origin,
            extent = ?geometry.extent,
            "planned output geometry"
        );
        Ok(geometry)
    }
}

/// A rounded extent bound as an `i32` index.
fn extent_index(value: f64, axis: usize) -> Result<i32, ResliceError> {
    if value.is_finite() && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Ok(value as i32)
    } else {
        Err(ResliceError::InvalidConfiguration(format!(
            "output extent along axis {axis} does not fit an index: {value}"
        )))
    }
}

/// Bounds of the input's corner voxels expressed in output coordinates.
fn auto_cropped_bounds(input: &VolumeImage, inverse: &Matrix4<f64>) -> [f64; 6] {
    let in_bounds = input.bounds();
    let mut bounds = [
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];
    for corner in 0..8 {
        let point = [
            in_bounds[corner & 1],
            in_bounds[2 + ((corner >> 1) & 1)],
            in_bounds[4 + ((corner >> 2) & 1)],
        ];
        let mapped = transform_point(inverse, point);
        for axis in 0..3 {
            bounds[2 * axis] = bounds[2 * axis].min(mapped[axis]);
            bounds[2 * axis + 1] = bounds[2 * axis + 1].max(mapped[axis]);
        }
    }
    bounds
}
