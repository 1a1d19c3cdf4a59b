use crate::{enums::SortBy, error::ResliceError, volume::VolumeImage};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Volume error: {0}")]
    Volume(#[from] ResliceError),
}

/// One decoded slice with the values it is ordered and positioned by.
struct SliceRecord {
    order: Option<f32>,
    position: Option<[f64; 3]>,
    image: Array2<u16>,
}

/// Reads a DICOM series into an unsigned 16-bit [`VolumeImage`].
pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent
    /// or no pixel spacing is present
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<VolumeImage, VolumeLoaderError> {
        let mut slices: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_slice(dicom_object, &sort_by))
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        if slices.len() < dicom_objects.len() {
            warn!(
                skipped = dicom_objects.len() - slices.len(),
                "skipped DICOM objects without decodable pixel data or sort key"
            );
        }

        Self::sort_slices(&mut slices, sort_by);
        Self::validate_dimensions(&slices)?;

        let (pixel_spacing, slice_thickness) =
            Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;
        let z_spacing = Self::slice_distance(&slices).unwrap_or(slice_thickness);
        let origin = slices[0].position.unwrap_or([0.0; 3]);

        let volume_array = Self::build_volume_array(&slices);
        debug!(dim = ?volume_array.dim(), ?pixel_spacing, z_spacing, "assembled DICOM volume");

        let volume = VolumeImage::from_array(volume_array)?
            .with_origin(origin)
            .with_spacing([pixel_spacing.1, pixel_spacing.0, z_spacing])?;
        Ok(volume)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<VolumeImage, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<VolumeImage, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_slice(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<SliceRecord> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image = Self::decode_image(dicom_object)?;
        Some(SliceRecord {
            order,
            position: Self::get_position(dicom_object),
            image,
        })
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<[f64; 3]> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        match pos.as_slice() {
            [x, y, z, ..] => Some([*x, *y, *z]),
            _ => None,
        }
    }

    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<u16>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_slices(slices: &mut [SliceRecord], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            slices.reverse();
        }
    }

    fn validate_dimensions(slices: &[SliceRecord]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    /// Signed distance between the first two slice positions along z, when
    /// both are known and distinct.
    fn slice_distance(slices: &[SliceRecord]) -> Option<f64> {
        let first = slices.first()?.position?;
        let second = slices.get(1)?.position?;
        let distance = second[2] - first[2];
        (distance != 0.0).then_some(distance)
    }

    fn build_volume_array(slices: &[SliceRecord]) -> Array3<u16> {
        let (height, width) = slices[0].image.dim();
        let depth = slices.len();
        let mut volume = Array3::<u16>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.image);
        }

        volume
    }

    /// Pixel spacing (row, column) and slice thickness from the first object
    /// carrying both.
    fn get_spacing(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Option<((f64, f64), f64)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float64()
                .ok()?;

            Some(((*pixel_spacing.first()?, *pixel_spacing.get(1)?), slice_thickness))
        })
    }
}
