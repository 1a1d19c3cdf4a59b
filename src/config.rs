//! Command-line configuration for the `volume-reslice` binary.
//!
//! Every option can also be set through an environment variable with the
//! `RESLICE_` prefix, e.g. `RESLICE_ORIENTATION=coronal`.

use std::path::PathBuf;

use clap::Parser;

use crate::enums::{InterpolationMode, Orientation, ScalarKind, SlabMode, SortBy};
use crate::reslice::{ImageReslice, SlabConfig};

/// Default directory scanned for `.dcm` files.
pub const DEFAULT_DIRECTORY: &str = "dicom";

/// Default path of the rendered slice.
pub const DEFAULT_OUTPUT: &str = "result.png";

/// Resample a DICOM series onto an axial, coronal or sagittal plane through
/// the volume centre and write it as a PNG.
#[derive(Parser, Debug, Clone)]
#[command(name = "volume-reslice")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing the DICOM series.
    #[arg(default_value = DEFAULT_DIRECTORY, env = "RESLICE_DIRECTORY")]
    pub directory: PathBuf,

    /// Attribute the slices are ordered by.
    #[arg(long, value_enum, default_value_t = SortBy::InstanceNumber, env = "RESLICE_SORT_BY")]
    pub sort_by: SortBy,

    /// Viewing plane of the output slice.
    #[arg(short, long, value_enum, default_value_t = Orientation::Axial, env = "RESLICE_ORIENTATION")]
    pub orientation: Orientation,

    #[arg(short, long, value_enum, default_value_t = InterpolationMode::Linear, env = "RESLICE_INTERPOLATION")]
    pub interpolation: InterpolationMode,

    /// Number of samples combined into each output pixel.
    #[arg(long, default_value_t = 1, env = "RESLICE_SLAB_SAMPLES")]
    pub slab_samples: usize,

    #[arg(long, value_enum, default_value_t = SlabMode::Mean, env = "RESLICE_SLAB_MODE")]
    pub slab_mode: SlabMode,

    /// Distance between slab samples as a fraction of the output z spacing.
    #[arg(long, default_value_t = 1.0, env = "RESLICE_SLAB_SPACING")]
    pub slab_spacing: f64,

    /// Halve the weight of the outermost slab samples.
    #[arg(long, default_value_t = false, env = "RESLICE_TRAPEZOID")]
    pub trapezoid: bool,

    /// Output pixel spacing as `x,y,z`; computed from the input when absent.
    #[arg(long, value_delimiter = ',', env = "RESLICE_OUTPUT_SPACING")]
    pub output_spacing: Option<Vec<f64>>,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, env = "RESLICE_SCALAR_SHIFT")]
    pub scalar_shift: f64,

    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true, env = "RESLICE_SCALAR_SCALE")]
    pub scalar_scale: f64,

    /// Storage kind of the resliced values; defaults to the input kind.
    #[arg(long, value_enum, env = "RESLICE_OUTPUT_KIND")]
    pub output_kind: Option<ScalarKind>,

    /// Value written where the plane leaves the volume.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true, env = "RESLICE_BACKGROUND")]
    pub background: f64,

    /// Path of the PNG to write.
    #[arg(long, default_value = DEFAULT_OUTPUT, env = "RESLICE_OUTPUT")]
    pub output: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.slab_samples == 0 {
            return Err("slab_samples must be greater than 0".to_string());
        }
        if !self.slab_spacing.is_finite() || self.slab_spacing <= 0.0 {
            return Err("slab_spacing must be a positive number".to_string());
        }
        if let Some(spacing) = &self.output_spacing {
            if spacing.len() != 3 {
                return Err(format!(
                    "output_spacing needs 3 values, got {}",
                    spacing.len()
                ));
            }
            if spacing.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err("output_spacing values must be finite and non-zero".to_string());
            }
        }
        if self.scalar_scale == 0.0 || !self.scalar_scale.is_finite() {
            return Err("scalar_scale must be finite and non-zero".to_string());
        }
        Ok(())
    }

    pub fn slab(&self) -> SlabConfig {
        SlabConfig {
            sample_count: self.slab_samples,
            sample_spacing_fraction: self.slab_spacing,
            mode: self.slab_mode,
            trapezoid_integration: self.trapezoid,
        }
    }

    /// Copy the sampling and output settings onto `reslice`. Axes are left
    /// alone since they depend on the loaded volume.
    pub fn apply_to(&self, reslice: &mut ImageReslice) {
        reslice.set_interpolation_mode(self.interpolation);
        reslice.set_slab(self.slab());
        reslice.set_output_spacing(
            self.output_spacing
                .as_deref()
                .and_then(|s| <[f64; 3]>::try_from(s).ok()),
        );
        reslice.set_scalar_shift(self.scalar_shift);
        reslice.set_scalar_scale(self.scalar_scale);
        reslice.set_output_scalar_kind(self.output_kind);
        reslice.set_background_level(self.background);
    }
}
