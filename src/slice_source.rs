use crate::codec::PatientRecord;
use crate::enums::SortBy;
use crate::frame::{FrameBuffer2D, Rgba8};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::{debug, warn};
use ndarray::{Array2, s};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SliceSourceError {
    #[error("folder {0} does not exist")]
    MissingFolder(PathBuf),

    #[error("{0} contains no image data")]
    NoPixelData(PathBuf),

    #[error("failed to decode pixels of {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// One decoded slice and the patient it belongs to
#[derive(Clone, Debug)]
pub struct DecodedSlice {
    pub frame: FrameBuffer2D,
    pub patient: Option<PatientRecord>,
}

/// Supplies an ordered slice stack. Decoding the container format is the
/// source's business; the viewer only sees pixels and patient metadata.
pub trait SliceSource {
    type Handle;

    /// Handles for every slice in `folder`, in stack order
    fn list(&self, folder: &Path) -> Result<Vec<Self::Handle>, SliceSourceError>;

    fn load(&self, handle: &Self::Handle) -> Result<DecodedSlice, SliceSourceError>;
}

/// Reads a folder of DICOM files, one slice per file.
#[derive(Default)]
pub struct DicomFolderSource {
    sort_by: SortBy,
}

impl DicomFolderSource {
    pub fn new(sort_by: SortBy) -> Self {
        Self { sort_by }
    }

    fn candidate_paths(folder: &Path) -> Result<Vec<PathBuf>, SliceSourceError> {
        if !folder.is_dir() {
            return Err(SliceSourceError::MissingFolder(folder.to_path_buf()));
        }
        let mut paths: Vec<_> = fs::read_dir(folder)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                !path
                    .extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("meta"))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: SortBy,
    ) -> Option<f32> {
        match sort_by {
            SortBy::ImagePositionPatient => dicom_object
                .element(tags::IMAGE_POSITION_PATIENT)
                .ok()?
                .to_multi_float32()
                .ok()?
                .get(2)
                .copied(),
            SortBy::TablePosition => dicom_object
                .element(tags::TABLE_POSITION)
                .ok()?
                .to_float32()
                .ok(),
            SortBy::InstanceNumber => dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()?
                .to_int::<i32>()
                .ok()
                .map(|n| n as f32),
            SortBy::None => None,
        }
    }

    fn sort_paths(paths_with_order: &mut [(Option<f32>, PathBuf)], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            paths_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        // Head first: highest z position is the top of the stack
        if matches!(sort_by, SortBy::ImagePositionPatient) {
            paths_with_order.reverse();
        }
    }

    fn patient_record(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<PatientRecord> {
        let text = |tag| {
            dicom_object
                .element(tag)
                .ok()
                .and_then(|e| e.to_str().ok())
                .map(|v| v.trim_end_matches(['\0', ' ']).to_string())
        };
        let id = text(tags::PATIENT_ID);
        let name = text(tags::PATIENT_NAME);
        if id.is_none() && name.is_none() {
            return None;
        }
        Some(PatientRecord {
            id: id.unwrap_or_default(),
            name: name.unwrap_or_default(),
        })
    }

    fn decode_image(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        path: &Path,
    ) -> Result<Array2<u16>, SliceSourceError> {
        if dicom_object.element(tags::PIXEL_DATA).is_err() {
            return Err(SliceSourceError::NoPixelData(path.to_path_buf()));
        }
        let decode_err = |reason: String| SliceSourceError::Decode {
            path: path.to_path_buf(),
            reason,
        };
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| decode_err(e.to_string()))?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .map_err(|e| decode_err(e.to_string()))
    }

    #[inline]
    fn normalize_to_u8(value: u16) -> u8 {
        ((value as f32 / 65535.0) * 255.0).clamp(0.0, 255.0) as u8
    }

    /// Greyscale, fully opaque frame from a (rows, columns) intensity image
    fn to_frame(image: &Array2<u16>, path: &Path) -> Result<FrameBuffer2D, SliceSourceError> {
        let (height, width) = image.dim();
        let pixels: Vec<Rgba8> = image
            .iter()
            .map(|&v| {
                let g = Self::normalize_to_u8(v);
                [g, g, g, u8::MAX]
            })
            .collect();
        FrameBuffer2D::new(width as u32, height as u32, pixels).map_err(|e| {
            SliceSourceError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }
}

impl SliceSource for DicomFolderSource {
    type Handle = PathBuf;

    fn list(&self, folder: &Path) -> Result<Vec<PathBuf>, SliceSourceError> {
        let mut paths_with_order: Vec<(Option<f32>, PathBuf)> = Self::candidate_paths(folder)?
            .into_iter()
            .filter_map(|path| match open_file(&path) {
                Ok(object) => Some((Self::get_sort_order(&object, self.sort_by), path)),
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        Self::sort_paths(&mut paths_with_order, self.sort_by);

        if paths_with_order.is_empty() {
            warn!("No DICOM files found in {}", folder.display());
        }
        Ok(paths_with_order.into_iter().map(|(_, path)| path).collect())
    }

    fn load(&self, handle: &PathBuf) -> Result<DecodedSlice, SliceSourceError> {
        let dicom_object = open_file(handle)?;
        let image = Self::decode_image(&dicom_object, handle)?;
        Ok(DecodedSlice {
            frame: Self::to_frame(&image, handle)?,
            patient: Self::patient_record(&dicom_object),
        })
    }
}
