//! Output-index to input-index matrices and the optional point transform
//! applied between them.

use std::fmt;

use nalgebra::{Matrix4, Vector4};
use tracing::debug;

use crate::enums::Orientation;

/// A non-matrix coordinate mapping applied to every sample position.
///
/// The input point is in output data coordinates (after the reslice axes),
/// the result must be in input data coordinates.
pub trait PointTransform: Send + Sync + fmt::Debug {
    fn apply(&self, point: [f64; 3]) -> [f64; 3];
}

impl PointTransform for Matrix4<f64> {
    fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        transform_point(self, point)
    }
}

/// Apply a homogeneous matrix to a point, dividing by `w` when it is not 1.
pub fn transform_point(matrix: &Matrix4<f64>, point: [f64; 3]) -> [f64; 3] {
    let p = matrix * Vector4::new(point[0], point[1], point[2], 1.0);
    if p[3] != 1.0 && p[3] != 0.0 {
        [p[0] / p[3], p[1] / p[3], p[2] / p[3]]
    } else {
        [p[0], p[1], p[2]]
    }
}

/// Reslice axes for a standard viewing plane centred on `center`.
///
/// Columns hold the output x, y and z directions and the origin.
pub fn orientation_axes(orientation: Orientation, center: [f64; 3]) -> Matrix4<f64> {
    let (x, y, z) = match orientation {
        Orientation::Axial => ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        Orientation::Coronal => ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]),
        Orientation::Sagittal => ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
    };
    Matrix4::new(
        x[0], y[0], z[0], center[0],
        x[1], y[1], z[1], center[1],
        x[2], y[2], z[2], center[2],
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Matrix taking an output voxel index to an input voxel index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexMatrix {
    pub matrix: Matrix4<f64>,
    /// Output and input indices coincide.
    pub is_identity: bool,
    /// Bottom row is not `[0, 0, 0, 1]`; samples need a divide by `w`.
    pub perspective: bool,
}

impl IndexMatrix {
    /// Column `axis` as a homogeneous vector (x, y, z axis or origin for 3).
    pub fn column(&self, axis: usize) -> [f64; 4] {
        let c = self.matrix.column(axis);
        [c[0], c[1], c[2], c[3]]
    }
}

/// The geometry an [`IndexMatrix`] was built from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryKey {
    pub input_origin: [f64; 3],
    pub input_spacing: [f64; 3],
    pub output_origin: [f64; 3],
    pub output_spacing: [f64; 3],
}

pub struct IndexTransformBuilder;

impl IndexTransformBuilder {
    /// Compose `axes` with the output scale/offset and, without a point
    /// transform, the input coordinate-to-index matrix.
    ///
    /// Identity detection uses exact comparisons so that intentionally built
    /// identity matrices always take the identity route.
    pub fn build(
        axes: Option<&Matrix4<f64>>,
        has_point_transform: bool,
        geometry: &GeometryKey,
    ) -> IndexMatrix {
        let mut transform = axes.copied().unwrap_or_else(Matrix4::identity);
        let mut is_identity = transform == Matrix4::identity();

        let mut in_matrix = Matrix4::identity();
        let mut out_matrix = Matrix4::identity();
        for i in 0..3 {
            let in_spacing = geometry.input_spacing[i];
            let in_origin = geometry.input_origin[i];
            let out_spacing = geometry.output_spacing[i];
            let out_origin = geometry.output_origin[i];
            let differs = if has_point_transform {
                out_spacing != 1.0 || out_origin != 0.0
            } else {
                in_spacing != out_spacing || in_origin != out_origin
            };
            if differs {
                is_identity = false;
            }
            in_matrix[(i, i)] = 1.0 / in_spacing;
            in_matrix[(i, 3)] = -in_origin / in_spacing;
            out_matrix[(i, i)] = out_spacing;
            out_matrix[(i, 3)] = out_origin;
        }

        if !is_identity {
            transform *= out_matrix;
            // a point transform expects data coordinates, not indices
            if !has_point_transform {
                transform = in_matrix * transform;
            }
        }

        let perspective = transform[(3, 0)] != 0.0
            || transform[(3, 1)] != 0.0
            || transform[(3, 2)] != 0.0
            || transform[(3, 3)] != 1.0;

        IndexMatrix {
            matrix: transform,
            is_identity,
            perspective,
        }
    }
}

/// Caches the last [`IndexMatrix`] with an explicit staleness flag.
///
/// Setters that change the axes or point transform call [`invalidate`];
/// a changed geometry pair also forces a rebuild.
///
/// [`invalidate`]: IndexMatrixCache::invalidate
#[derive(Clone, Debug, Default)]
pub struct IndexMatrixCache {
    stale: bool,
    entry: Option<(GeometryKey, IndexMatrix)>,
}

impl IndexMatrixCache {
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn is_valid_for(&self, geometry: &GeometryKey) -> bool {
        !self.stale && matches!(&self.entry, Some((key, _)) if key == geometry)
    }

    pub fn get_or_build(
        &mut self,
        axes: Option<&Matrix4<f64>>,
        has_point_transform: bool,
        geometry: GeometryKey,
    ) -> IndexMatrix {
        if self.is_valid_for(&geometry) {
            if let Some((_, matrix)) = &self.entry {
                return *matrix;
            }
        }
        let matrix = IndexTransformBuilder::build(axes, has_point_transform, &geometry);
        debug!(
            identity = matrix.is_identity,
            perspective = matrix.perspective,
            "rebuilt index matrix"
        );
        self.entry = Some((geometry, matrix));
        self.stale = false;
        matrix
    }
}
