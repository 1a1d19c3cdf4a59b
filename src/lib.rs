//! # Volume reslice library
//!
//! This crate resamples a 3D scalar volume onto a new grid whose axes,
//! origin and spacing are given by a 4x4 reslice matrix. It is the
//! building block of multi-planar reformatting: axial, coronal, sagittal
//! or fully oblique planes, thick slabs combined by MIN, MAX, MEAN or SUM,
//! and 2D extraction from 3D data.
//!
//! Volumes are held as a flat, x-fastest buffer of one of nine scalar
//! kinds. Output rows are produced in parallel using rayon. Samples are
//! taken with nearest, trilinear or cubic interpolation; when the reslice
//! is a plain nearest-neighbour copy the voxels are moved without
//! conversion.
//!
//! A DICOM series can be read into a volume with [`VolumeLoader`]. Files
//! are assumed to be:
//!   - single frame (always the first frame is used)
//!   - from the same series and acquisition
//!
//! # Examples
//!
//! ## Extracting the coronal plane through the centre of a DICOM series
//!
//! ```no_run
//! # use volume_reslice::{ImageReslice, Orientation, SortBy, VolumeLoader};
//! let volume = VolumeLoader::load_from_directory("dicom", SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//! let mut reslice = ImageReslice::new();
//! reslice.set_reslice_axes_from_orientation(Orientation::Coronal, volume.center());
//! reslice.set_output_dimensionality(2);
//! let slice = reslice
//!     .execute(&volume)
//!     .expect("should have resliced the volume");
//! slice
//!     .slice_to_image(0, 0)
//!     .expect("should have a plane")
//!     .save("result.png")
//!     .expect("should have written the image");
//! ```

pub mod compositor;
pub mod config;
pub mod enums;
pub mod error;
pub mod geometry;
pub mod interpolator;
pub mod reslice;
pub mod scalar;
pub mod stencil;
pub mod transform;
pub mod volume;
pub mod volume_loader;

pub use enums::{BorderMode, InterpolationMode, Orientation, ScalarKind, SlabMode, SortBy};
pub use error::ResliceError;
pub use geometry::OutputGeometry;
pub use interpolator::ImageInterpolator;
pub use reslice::{ImageReslice, ReslicePhase, SlabConfig};
pub use scalar::{Scalar, ScalarBuffer};
pub use stencil::ImageStencil;
pub use transform::PointTransform;
pub use volume::VolumeImage;
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
