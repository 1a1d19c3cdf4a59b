//! The reslice filter: plans the output grid, builds the index matrix and
//! marches through the output rows sampling the input.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::Matrix4;
use rayon::prelude::*;
use tracing::{debug, info};
use web_time::Instant;

use crate::compositor::Compositor;
use crate::enums::{BorderMode, InterpolationMode, Orientation, ScalarKind, SlabMode};
use crate::error::ResliceError;
use crate::geometry::{OutputGeometry, OutputGeometryPlanner};
use crate::interpolator::{BORDER_TOLERANCE, BOUNDS_TOLERANCE, ImageInterpolator, Interpolate, VolumeSampler};
use crate::scalar::{Conversion, ConversionPolicy, Scalar, ScalarBuffer, dispatch_buffer};
use crate::stencil::{ImageStencil, StencilSpan};
use crate::transform::{GeometryKey, IndexMatrix, IndexMatrixCache, PointTransform, orientation_axes};
use crate::volume::VolumeImage;

/// Thick-slab sampling along the output z axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlabConfig {
    pub sample_count: usize,
    /// Distance between samples as a fraction of the output z spacing.
    pub sample_spacing_fraction: f64,
    pub mode: SlabMode,
    pub trapezoid_integration: bool,
}

impl Default for SlabConfig {
    fn default() -> Self {
        Self {
            sample_count: 1,
            sample_spacing_fraction: 1.0,
            mode: SlabMode::Min,
            trapezoid_integration: false,
        }
    }
}

/// Progress of the current or last execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReslicePhase {
    #[default]
    Init,
    GeometryPlanned,
    TransformBuilt,
    Scanning,
    Done,
}

/// Resamples a [`VolumeImage`] onto a grid defined by the reslice axes.
#[derive(Debug)]
pub struct ImageReslice {
    reslice_axes: Option<Matrix4<f64>>,
    point_transform: Option<Arc<dyn PointTransform>>,
    interpolator: ImageInterpolator,
    transform_input_sampling: bool,
    auto_crop_output: bool,
    output_dimensionality: usize,
    output_spacing: Option<[f64; 3]>,
    output_origin: Option<[f64; 3]>,
    output_extent: Option<[i32; 6]>,
    output_scalar_kind: Option<ScalarKind>,
    slab: SlabConfig,
    scalar_shift: f64,
    scalar_scale: f64,
    background: [f64; 4],
    border: bool,
    optimization: bool,
    stencil: Option<ImageStencil>,
    generate_stencil_output: bool,
    output_stencil: Option<ImageStencil>,
    abort: Option<Arc<AtomicBool>>,
    input: Option<Arc<VolumeImage>>,
    index_cache: IndexMatrixCache,
    phase: ReslicePhase,
}

impl Default for ImageReslice {
    fn default() -> Self {
        Self {
            reslice_axes: None,
            point_transform: None,
            interpolator: ImageInterpolator::default(),
            transform_input_sampling: true,
            auto_crop_output: false,
            output_dimensionality: 3,
            output_spacing: None,
            output_origin: None,
            output_extent: None,
            output_scalar_kind: None,
            slab: SlabConfig::default(),
            scalar_shift: 0.0,
            scalar_scale: 1.0,
            background: [0.0; 4],
            border: true,
            optimization: true,
            stencil: None,
            generate_stencil_output: false,
            output_stencil: None,
            abort: None,
            input: None,
            index_cache: IndexMatrixCache::default(),
            phase: ReslicePhase::Init,
        }
    }
}

impl ImageReslice {
    pub fn new() -> Self {
        Self::default()
    }

    // --- geometry and axes; every setter here invalidates the index matrix ---

    /// Columns of `axes` are the output x, y, z directions and origin in
    /// input data coordinates. `None` means identity.
    pub fn set_reslice_axes(&mut self, axes: Option<Matrix4<f64>>) {
        self.reslice_axes = axes;
        self.index_cache.invalidate();
    }

    pub fn set_reslice_axes_from_orientation(&mut self, orientation: Orientation, center: [f64; 3]) {
        self.set_reslice_axes(Some(orientation_axes(orientation, center)));
    }

    pub fn reslice_axes(&self) -> Option<&Matrix4<f64>> {
        self.reslice_axes.as_ref()
    }

    pub fn set_point_transform(&mut self, transform: Option<Arc<dyn PointTransform>>) {
        self.point_transform = transform;
        self.index_cache.invalidate();
    }

    pub fn set_transform_input_sampling(&mut self, enabled: bool) {
        self.transform_input_sampling = enabled;
        self.index_cache.invalidate();
    }

    pub fn set_auto_crop_output(&mut self, enabled: bool) {
        self.auto_crop_output = enabled;
        self.index_cache.invalidate();
    }

    pub fn set_output_dimensionality(&mut self, dimensionality: usize) {
        self.output_dimensionality = dimensionality;
        self.index_cache.invalidate();
    }

    /// `None` computes the spacing from the input.
    pub fn set_output_spacing(&mut self, spacing: Option<[f64; 3]>) {
        self.output_spacing = spacing;
        self.index_cache.invalidate();
    }

    pub fn set_output_origin(&mut self, origin: Option<[f64; 3]>) {
        self.output_origin = origin;
        self.index_cache.invalidate();
    }

    pub fn set_output_extent(&mut self, extent: Option<[i32; 6]>) {
        self.output_extent = extent;
        self.index_cache.invalidate();
    }

    // --- sampling ---

    pub fn interpolator(&self) -> &ImageInterpolator {
        &self.interpolator
    }

    pub fn interpolator_mut(&mut self) -> &mut ImageInterpolator {
        &mut self.interpolator
    }

    pub fn set_interpolation_mode(&mut self, mode: InterpolationMode) {
        self.interpolator.set_mode(mode);
    }

    pub fn set_border_mode(&mut self, mode: BorderMode) {
        self.interpolator.set_border_mode(mode);
    }

    /// Accept samples up to half a voxel outside the input extent.
    pub fn set_border(&mut self, enabled: bool) {
        self.border = enabled;
    }

    /// Allow the nearest-neighbour copy path.
    pub fn set_optimization(&mut self, enabled: bool) {
        self.optimization = enabled;
    }

    pub fn set_slab(&mut self, slab: SlabConfig) {
        self.slab = SlabConfig {
            sample_count: slab.sample_count.max(1),
            ..slab
        };
    }

    pub fn slab(&self) -> SlabConfig {
        self.slab
    }

    // --- output scalars ---

    pub fn set_scalar_shift(&mut self, shift: f64) {
        self.scalar_shift = shift;
    }

    pub fn set_scalar_scale(&mut self, scale: f64) {
        self.scalar_scale = scale;
    }

    /// `None` keeps the input storage kind.
    pub fn set_output_scalar_kind(&mut self, kind: Option<ScalarKind>) {
        self.output_scalar_kind = kind;
    }

    /// Per-component fill for samples outside the input or the stencil.
    /// Components past the fourth reuse the fourth value.
    pub fn set_background_color(&mut self, color: [f64; 4]) {
        self.background = color;
    }

    pub fn set_background_level(&mut self, level: f64) {
        self.background = [level; 4];
    }

    pub fn set_stencil(&mut self, stencil: Option<ImageStencil>) {
        self.stencil = stencil;
    }

    pub fn set_generate_stencil_output(&mut self, enabled: bool) {
        self.generate_stencil_output = enabled;
    }

    /// In-bounds spans of the last execution, when stencil output is enabled.
    pub fn output_stencil(&self) -> Option<&ImageStencil> {
        self.output_stencil.as_ref()
    }

    /// Checked between output rows; raising it makes `execute` return
    /// [`ResliceError::Cancelled`].
    pub fn set_abort_flag(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.abort = flag;
    }

    pub fn phase(&self) -> ReslicePhase {
        self.phase
    }

    pub fn set_input(&mut self, input: Option<Arc<VolumeImage>>) {
        self.input = input;
    }

    /// Reslice the input set with [`set_input`](Self::set_input).
    pub fn update(&mut self) -> Result<VolumeImage, ResliceError> {
        let input = self
            .input
            .clone()
            .ok_or_else(|| ResliceError::InvalidInput("no input image set".to_string()))?;
        self.execute(&input)
    }

    fn planner(&self) -> OutputGeometryPlanner<'_> {
        OutputGeometryPlanner {
            axes: self.reslice_axes.as_ref(),
            transform_input_sampling: self.transform_input_sampling,
            auto_crop: self.auto_crop_output,
            output_dimensionality: self.output_dimensionality,
            output_spacing: self.output_spacing,
            output_origin: self.output_origin,
            output_extent: self.output_extent,
        }
    }

    pub fn output_geometry(&self, input: &VolumeImage) -> Result<OutputGeometry, ResliceError> {
        self.planner().plan(input)
    }

    /// The output-index to input-index matrix for `input`, from the cache
    /// when still valid.
    pub fn index_matrix(&mut self, input: &VolumeImage) -> Result<IndexMatrix, ResliceError> {
        let geometry = self.output_geometry(input)?;
        Ok(self.build_index_matrix(input, &geometry))
    }

    fn build_index_matrix(&mut self, input: &VolumeImage, geometry: &OutputGeometry) -> IndexMatrix {
        let key = GeometryKey {
            input_origin: input.origin(),
            input_spacing: input.spacing(),
            output_origin: geometry.origin,
            output_spacing: geometry.spacing,
        };
        self.index_cache.get_or_build(
            self.reslice_axes.as_ref(),
            self.point_transform.is_some(),
            key,
        )
    }

    pub fn execute(&mut self, input: &VolumeImage) -> Result<VolumeImage, ResliceError> {
        let started = Instant::now();
        self.phase = ReslicePhase::Init;
        self.output_stencil = None;

        let geometry = self.output_geometry(input)?;
        self.phase = ReslicePhase::GeometryPlanned;

        let index = self.build_index_matrix(input, &geometry);
        self.phase = ReslicePhase::TransformBuilt;

        let mut interpolator = self.interpolator.clone();
        interpolator.set_tolerance(if self.border {
            BORDER_TOLERANCE
        } else {
            BOUNDS_TOLERANCE
        });
        let components = interpolator.output_components(input.components())?;

        let in_kind = input.scalar_kind();
        let out_kind = self.output_scalar_kind.unwrap_or(in_kind);
        let slab = self.slab;
        let force_clamp = interpolator.mode() > InterpolationMode::Nearest
            || (slab.sample_count > 1 && slab.mode == SlabMode::Sum);
        let policy = ConversionPolicy::resolve(
            in_kind,
            out_kind,
            self.scalar_shift,
            self.scalar_scale,
            force_clamp,
        );

        let optimize_nearest = self.optimization
            && interpolator.mode() == InterpolationMode::Nearest
            && interpolator.border_mode() == BorderMode::Clamp
            && self.point_transform.is_none()
            && !index.perspective
            && !policy.needs_rescale()
            && interpolator.selects_all_components(input.components())
            && in_kind == out_kind
            && self
                .stencil
                .as_ref()
                .is_none_or(|stencil| stencil.covers(&geometry.extent))
            && self.border
            && slab.sample_count <= 1;

        debug!(
            input_kind = %in_kind,
            output_kind = %out_kind,
            clamp = policy.clamp_required,
            optimize_nearest,
            perspective = index.perspective,
            "resolved reslice path"
        );

        let in_spacing = input.spacing();
        let context = ScanContext {
            columns: [index.column(0), index.column(1), index.column(2), index.column(3)],
            perspective: index.perspective,
            point_transform: self.point_transform.as_deref(),
            input_origin: input.origin(),
            input_inv_spacing: [1.0 / in_spacing[0], 1.0 / in_spacing[1], 1.0 / in_spacing[2]],
            geometry,
            components,
            slab,
            compositor: Compositor::new(slab.mode, slab.trapezoid_integration),
            policy,
            converter: policy.converter(),
            background: (0..components).map(|c| self.background[c.min(3)]).collect(),
            stencil: self.stencil.as_ref(),
            generate_stencil: self.generate_stencil_output,
            optimize_nearest,
            abort: self.abort.as_deref(),
        };

        let len = geometry.voxel_count().checked_mul(components).ok_or_else(|| {
            ResliceError::InvalidConfiguration(format!(
                "output of {:?} voxels with {components} components is too large",
                geometry.dimensions
            ))
        })?;
        let mut scalars = ScalarBuffer::zeros(out_kind, len);
        self.phase = ReslicePhase::Scanning;
        let extents = dispatch_buffer!(input.scalars(), in_data => {
            let sampler = interpolator.bind(in_data.as_slice(), input.dimensions(), input.components())?;
            dispatch_buffer!(&mut scalars, out_data => context.scan(&sampler, out_data.as_mut_slice()))
        })?;

        if self.generate_stencil_output {
            let mut stencil = ImageStencil::new(geometry.extent);
            for [x0, x1, y, z] in extents {
                stencil.insert_next_extent(x0, x1, y, z);
            }
            self.output_stencil = Some(stencil);
        }

        let output = VolumeImage::new(
            geometry.dimensions,
            geometry.image_origin(),
            geometry.spacing,
            components,
            scalars,
        )?;
        self.phase = ReslicePhase::Done;
        info!(
            dimensions = ?geometry.dimensions,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "resliced volume"
        );
        Ok(output)
    }
}

/// Everything a worker needs to produce output rows.
struct ScanContext<'a> {
    /// Index matrix columns: x, y, z axis and origin.
    columns: [[f64; 4]; 4],
    perspective: bool,
    point_transform: Option<&'a dyn PointTransform>,
    input_origin: [f64; 3],
    input_inv_spacing: [f64; 3],
    geometry: OutputGeometry,
    components: usize,
    slab: SlabConfig,
    compositor: Compositor,
    policy: ConversionPolicy,
    converter: Conversion,
    background: Vec<f64>,
    stencil: Option<&'a ImageStencil>,
    generate_stencil: bool,
    optimize_nearest: bool,
    abort: Option<&'a AtomicBool>,
}

/// Per-worker buffers reused across rows.
#[derive(Default)]
struct RowScratch {
    values: Vec<f64>,
    samples: Vec<f64>,
    in_bounds: Vec<bool>,
}

/// `[x0, x1, y, z]` of an in-bounds run.
type RowExtent = [i32; 4];

#[inline]
fn axpy(base: &[f64; 4], axis: &[f64; 4], t: f64) -> [f64; 4] {
    [
        axis[0].mul_add(t, base[0]),
        axis[1].mul_add(t, base[1]),
        axis[2].mul_add(t, base[2]),
        axis[3].mul_add(t, base[3]),
    ]
}

#[inline]
fn advance(point: &mut [f64; 4], axis: &[f64; 4]) {
    for (p, a) in point.iter_mut().zip(axis) {
        *p += a;
    }
}

impl ScanContext<'_> {
    fn scan<T: Scalar, U: Scalar>(
        &self,
        sampler: &VolumeSampler<'_, T>,
        out: &mut [U],
    ) -> Result<Vec<RowExtent>, ResliceError> {
        let extent = self.geometry.extent;
        let [nx, ny, _] = self.geometry.dimensions;
        let row_len = nx * self.components;
        let range = U::KIND.range();
        let background: Vec<U> = self
            .background
            .iter()
            .map(|&v| U::from_f64(v.clamp(range.min, range.max)))
            .collect();

        let rows = out
            .par_chunks_mut(row_len)
            .enumerate()
            .map_init(RowScratch::default, |scratch, (row, out_row)| {
                if self.abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return Err(ResliceError::Cancelled);
                }
                let y = extent[2] + (row % ny) as i32;
                let z = extent[4] + (row / ny) as i32;
                // each row starts from its own base, no shared accumulator
                let [_, y_axis, z_axis, origin] = &self.columns;
                let row_base = axpy(&axpy(origin, z_axis, z as f64), y_axis, y as f64);

                let spans = match self.stencil {
                    Some(stencil) => stencil.spans(extent[0], extent[1], y, z),
                    None => vec![StencilSpan {
                        start: extent[0],
                        end: extent[1],
                        inside: true,
                    }],
                };

                let mut extents = Vec::new();
                for span in spans {
                    let offset = (span.start - extent[0]) as usize * self.components;
                    let out_span = &mut out_row[offset..offset + span.len() * self.components];
                    if !span.inside {
                        fill_background(out_span, &background);
                    } else if self.optimize_nearest {
                        self.nearest_span(sampler, &row_base, span, y, z, out_span, &background, &mut extents);
                    } else {
                        self.general_span(sampler, scratch, &row_base, span, y, z, out_span, &background, &mut extents);
                    }
                }
                Ok(extents)
            })
            .collect::<Result<Vec<_>, ResliceError>>()?;

        Ok(rows.into_iter().flatten().collect())
    }

    /// Output-index homogeneous point to continuous input index.
    #[inline]
    fn input_index(&self, point: &[f64; 4]) -> [f64; 3] {
        let mut p = [point[0], point[1], point[2]];
        if self.perspective {
            let f = 1.0 / point[3];
            p.iter_mut().for_each(|v| *v *= f);
        }
        if let Some(transform) = self.point_transform {
            p = transform.apply(p);
            for axis in 0..3 {
                p[axis] = (p[axis] - self.input_origin[axis]) * self.input_inv_spacing[axis];
            }
        }
        p
    }

    #[allow(clippy::too_many_arguments)]
    fn general_span<S: Interpolate, U: Scalar>(
        &self,
        sampler: &S,
        scratch: &mut RowScratch,
        row_base: &[f64; 4],
        span: StencilSpan,
        y: i32,
        z: i32,
        out: &mut [U],
        background: &[U],
        extents: &mut Vec<RowExtent>,
    ) {
        let nc = self.components;
        let n = span.len();
        let nsamples = self.slab.sample_count;
        let x_axis = &self.columns[0];
        let z_axis = &self.columns[2];

        let RowScratch {
            values,
            samples,
            in_bounds,
        } = scratch;
        values.clear();
        values.resize(n * nc, 0.0);
        samples.clear();
        samples.resize(nsamples * nc, 0.0);
        in_bounds.clear();

        let mut point = axpy(row_base, x_axis, span.start as f64);
        for pixel in values.chunks_exact_mut(nc) {
            let mut count = 0;
            for sample in 0..nsamples {
                let sample_point = if nsamples > 1 {
                    let s = (sample as f64 - 0.5 * (nsamples - 1) as f64)
                        * self.slab.sample_spacing_fraction;
                    axpy(&point, z_axis, s)
                } else {
                    point
                };
                let coord = self.input_index(&sample_point);
                if sampler.check_bounds(&coord) {
                    sampler.interpolate(&coord, &mut samples[count * nc..(count + 1) * nc]);
                    count += 1;
                }
            }
            match count {
                0 => {}
                1 => pixel.copy_from_slice(&samples[..nc]),
                _ => self.compositor.composite(&samples[..], nc, count, pixel),
            }
            in_bounds.push(count > 0);
            advance(&mut point, x_axis);
        }

        // write alternating in/out of bounds runs
        let mut start = 0;
        while start < n {
            let inside = in_bounds[start];
            let mut end = start;
            while end + 1 < n && in_bounds[end + 1] == inside {
                end += 1;
            }
            let run_out = &mut out[start * nc..(end + 1) * nc];
            if inside {
                let run = &mut values[start * nc..(end + 1) * nc];
                if self.policy.needs_rescale() {
                    self.policy.rescale(run);
                }
                self.converter.apply(run, run_out);
                if self.generate_stencil {
                    extents.push([span.start + start as i32, span.start + end as i32, y, z]);
                }
            } else {
                fill_background(run_out, background);
            }
            start = end + 1;
        }
    }

    /// Whole-pixel copies from the nearest input voxel. Only valid when the
    /// input and output kinds and component layouts are identical.
    #[allow(clippy::too_many_arguments)]
    fn nearest_span<T: Scalar, U: Scalar>(
        &self,
        sampler: &VolumeSampler<'_, T>,
        row_base: &[f64; 4],
        span: StencilSpan,
        y: i32,
        z: i32,
        out: &mut [U],
        background: &[U],
        extents: &mut Vec<RowExtent>,
    ) {
        let pixel_bytes = T::KIND.size_in_bytes() * self.components;
        debug_assert_eq!(T::KIND.size_in_bytes(), U::KIND.size_in_bytes());
        let in_bytes: &[u8] = bytemuck::cast_slice(sampler.data());
        let x_axis = &self.columns[0];
        let n = span.len();

        let mut first = None;
        let mut last = 0;
        {
            let out_bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut *out);
            let mut point = axpy(row_base, x_axis, span.start as f64);
            for (index, pixel) in out_bytes.chunks_exact_mut(pixel_bytes).enumerate() {
                let coord = [point[0], point[1], point[2]];
                if sampler.check_bounds(&coord) {
                    first.get_or_insert(index);
                    last = index;
                    let src = sampler.nearest_voxel(&coord) * pixel_bytes;
                    pixel.copy_from_slice(&in_bytes[src..src + pixel_bytes]);
                } else if first.is_some() {
                    // leaving the input along a straight line, the rest is outside
                    break;
                }
                advance(&mut point, x_axis);
            }
        }

        let nc = self.components;
        let (lead, trail) = match first {
            Some(first) => (first, last + 1),
            None => (n, n),
        };
        fill_background(&mut out[..lead * nc], background);
        fill_background(&mut out[trail * nc..], background);

        if let (true, Some(first)) = (self.generate_stencil, first) {
            extents.push([span.start + first as i32, span.start + last as i32, y, z]);
        }
    }
}

fn fill_background<U: Scalar>(out: &mut [U], background: &[U]) {
    for pixel in out.chunks_exact_mut(background.len()) {
        pixel.copy_from_slice(background);
    }
}
