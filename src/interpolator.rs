use crate::enums::{BorderMode, InterpolationMode};
use crate::error::ResliceError;
use crate::scalar::Scalar;

/// Bounds tolerance in voxels when the half-voxel border is enabled.
pub const BORDER_TOLERANCE: f64 = 0.5;

/// Bounds tolerance in voxels when the border is disabled.
pub const BOUNDS_TOLERANCE: f64 = 7.62939453125e-06;

/// Sampling of an input volume at continuous index coordinates.
pub trait Interpolate: Sync {
    /// Number of values written by [`interpolate`](Interpolate::interpolate).
    fn components(&self) -> usize;

    fn check_bounds(&self, point: &[f64; 3]) -> bool;

    /// Writes `components()` values; `point` must have passed `check_bounds`.
    fn interpolate(&self, point: &[f64; 3], values: &mut [f64]);
}

/// Interpolation settings, bound to concrete input data with [`bind`].
///
/// [`bind`]: ImageInterpolator::bind
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInterpolator {
    mode: InterpolationMode,
    border_mode: BorderMode,
    tolerance: f64,
    component_offset: usize,
    component_count: Option<usize>,
}

impl Default for ImageInterpolator {
    fn default() -> Self {
        Self {
            mode: InterpolationMode::Nearest,
            border_mode: BorderMode::Clamp,
            tolerance: BORDER_TOLERANCE,
            component_offset: 0,
            component_count: None,
        }
    }
}

impl ImageInterpolator {
    pub fn new(mode: InterpolationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InterpolationMode) {
        self.mode = mode;
    }

    pub fn border_mode(&self) -> BorderMode {
        self.border_mode
    }

    pub fn set_border_mode(&mut self, border_mode: BorderMode) {
        self.border_mode = border_mode;
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance.max(0.0);
    }

    pub fn component_offset(&self) -> usize {
        self.component_offset
    }

    pub fn component_count(&self) -> Option<usize> {
        self.component_count
    }

    /// Restrict sampling to `count` components starting at `offset`.
    /// `None` takes every remaining component.
    pub fn set_components(&mut self, offset: usize, count: Option<usize>) {
        self.component_offset = offset;
        self.component_count = count;
    }

    /// Number of components sampled from an input with `input_components`.
    pub fn output_components(&self, input_components: usize) -> Result<usize, ResliceError> {
        let available = input_components.saturating_sub(self.component_offset);
        let count = self.component_count.unwrap_or(available);
        if count == 0 || self.component_offset + count > input_components {
            return Err(ResliceError::ComponentMismatch {
                expected: input_components,
                actual: self.component_offset + count,
            });
        }
        Ok(count)
    }

    /// True when every input component is sampled in its original order.
    pub fn selects_all_components(&self, input_components: usize) -> bool {
        self.component_offset == 0
            && self.component_count.is_none_or(|count| count == input_components)
    }

    pub fn bind<'a, T: Scalar>(
        &self,
        data: &'a [T],
        dimensions: [usize; 3],
        components: usize,
    ) -> Result<VolumeSampler<'a, T>, ResliceError> {
        if self.border_mode != BorderMode::Clamp {
            return Err(ResliceError::InvalidConfiguration(format!(
                "border mode {:?} is not implemented",
                self.border_mode
            )));
        }
        let count = self.output_components(components)?;
        let expected = dimensions.iter().product::<usize>() * components;
        if data.len() != expected {
            return Err(ResliceError::ComponentMismatch {
                expected,
                actual: data.len(),
            });
        }
        let increments = [
            components,
            components * dimensions[0],
            components * dimensions[0] * dimensions[1],
        ];
        Ok(VolumeSampler {
            data,
            dimensions,
            increments,
            component_offset: self.component_offset,
            component_count: count,
            mode: self.mode,
            tolerance: self.tolerance,
        })
    }
}

/// An [`ImageInterpolator`] bound to one typed input buffer.
#[derive(Clone, Copy, Debug)]
pub struct VolumeSampler<'a, T> {
    data: &'a [T],
    dimensions: [usize; 3],
    increments: [usize; 3],
    component_offset: usize,
    component_count: usize,
    mode: InterpolationMode,
    tolerance: f64,
}

/// Up to four sample indices along one axis with their weights.
struct AxisTaps {
    offsets: [usize; 4],
    weights: [f64; 4],
    len: usize,
}

#[inline]
fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[inline]
fn clamp_index(index: i64, dim: usize) -> usize {
    index.clamp(0, dim as i64 - 1) as usize
}

impl<'a, T: Scalar> VolumeSampler<'a, T> {
    pub fn data(&self) -> &'a [T] {
        self.data
    }

    /// Flat voxel number of the nearest voxel, clamped into the extent.
    #[inline]
    pub fn nearest_voxel(&self, point: &[f64; 3]) -> usize {
        let x = clamp_index(round_half_up(point[0]), self.dimensions[0]);
        let y = clamp_index(round_half_up(point[1]), self.dimensions[1]);
        let z = clamp_index(round_half_up(point[2]), self.dimensions[2]);
        (z * self.dimensions[1] + y) * self.dimensions[0] + x
    }

    #[inline]
    fn taps(&self, x: f64, axis: usize) -> AxisTaps {
        let dim = self.dimensions[axis];
        let inc = self.increments[axis];
        match self.mode {
            InterpolationMode::Nearest => AxisTaps {
                offsets: [clamp_index(round_half_up(x), dim) * inc, 0, 0, 0],
                weights: [1.0, 0.0, 0.0, 0.0],
                len: 1,
            },
            InterpolationMode::Linear => {
                let floor = x.floor();
                let t = x - floor;
                let i = floor as i64;
                AxisTaps {
                    offsets: [clamp_index(i, dim) * inc, clamp_index(i + 1, dim) * inc, 0, 0],
                    weights: [1.0 - t, t, 0.0, 0.0],
                    len: 2,
                }
            }
            InterpolationMode::Cubic => {
                let floor = x.floor();
                let t = x - floor;
                let i = floor as i64;
                let t2 = t * t;
                let t3 = t2 * t;
                // Catmull-Rom kernel, a = -0.5
                let weights = [
                    -0.5 * t3 + t2 - 0.5 * t,
                    1.5 * t3 - 2.5 * t2 + 1.0,
                    -1.5 * t3 + 2.0 * t2 + 0.5 * t,
                    0.5 * t3 - 0.5 * t2,
                ];
                AxisTaps {
                    offsets: [
                        clamp_index(i - 1, dim) * inc,
                        clamp_index(i, dim) * inc,
                        clamp_index(i + 1, dim) * inc,
                        clamp_index(i + 2, dim) * inc,
                    ],
                    weights,
                    len: 4,
                }
            }
        }
    }
}

impl<T: Scalar> Interpolate for VolumeSampler<'_, T> {
    fn components(&self) -> usize {
        self.component_count
    }

    #[inline]
    fn check_bounds(&self, point: &[f64; 3]) -> bool {
        (0..3).all(|axis| {
            let upper = (self.dimensions[axis] - 1) as f64 + self.tolerance;
            point[axis] >= -self.tolerance && point[axis] <= upper
        })
    }

    fn interpolate(&self, point: &[f64; 3], values: &mut [f64]) {
        let values = &mut values[..self.component_count];
        if self.mode == InterpolationMode::Nearest {
            let base = self.nearest_voxel(point) * self.increments[0] + self.component_offset;
            for (c, value) in values.iter_mut().enumerate() {
                *value = self.data[base + c].to_f64();
            }
            return;
        }

        let tx = self.taps(point[0], 0);
        let ty = self.taps(point[1], 1);
        let tz = self.taps(point[2], 2);
        values.fill(0.0);
        for k in 0..tz.len {
            for j in 0..ty.len {
                let wyz = tz.weights[k] * ty.weights[j];
                if wyz == 0.0 {
                    continue;
                }
                let row = tz.offsets[k] + ty.offsets[j] + self.component_offset;
                for i in 0..tx.len {
                    let w = wyz * tx.weights[i];
                    let base = row + tx.offsets[i];
                    for (c, value) in values.iter_mut().enumerate() {
                        *value = self.data[base + c].to_f64().mul_add(w, *value);
                    }
                }
            }
        }
    }
}
