use std::path::Path;

use log::{info, warn};

use crate::codec::PatientRecord;
use crate::config::VolumeConfig;
use crate::enums::{Orientation, RebuildPolicy, ResampleFilter};
use crate::error::{Error, Result};
use crate::frame::FrameBuffer2D;
use crate::interpolator::Interpolator;
use crate::slice_source::SliceSource;
use crate::volume::VolumeStore;

/// The state of one viewing session: at most one loaded stack, its volume
/// and its patient record.
#[derive(Default)]
pub struct ViewerSession {
    rebuild: RebuildPolicy,
    filter: ResampleFilter,
    volume: Option<VolumeStore>,
    patient: Option<PatientRecord>,
    /// Decoded slices, kept only for `RebuildPolicy::Continuous`
    slices: Vec<FrameBuffer2D>,
}

impl ViewerSession {
    pub fn new(rebuild: RebuildPolicy, filter: ResampleFilter) -> Self {
        Self {
            rebuild,
            filter,
            ..Self::default()
        }
    }

    pub fn from_config(volume: &VolumeConfig, filter: ResampleFilter) -> Self {
        Self::new(volume.rebuild, filter)
    }

    /// Load every slice in `folder` and build the volume, replacing any
    /// previous stack.
    ///
    /// Slices that fail to decode are logged and skipped. The patient record
    /// comes from the first slice that carries one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] if no slice could be decoded.
    pub fn load_stack<S: SliceSource>(&mut self, source: &S, folder: &Path) -> Result<()> {
        self.clear();

        let handles = source.list(folder)?;
        let mut frames = Vec::with_capacity(handles.len());
        for (position, handle) in handles.iter().enumerate() {
            match source.load(handle) {
                Ok(slice) => {
                    if let Some(record) = slice.patient {
                        self.set_patient_if_absent(record);
                    }
                    frames.push(slice.frame);
                }
                Err(e) => warn!("Skipping slice {} of {}: {}", position, folder.display(), e),
            }
        }

        info!(
            "Loaded {} of {} slices from {}",
            frames.len(),
            handles.len(),
            folder.display()
        );
        self.load_frames(frames)
    }

    /// Build the volume from already-decoded slices, replacing the current one.
    pub fn load_frames(&mut self, frames: Vec<FrameBuffer2D>) -> Result<()> {
        let volume = VolumeStore::build(&frames, self.filter)?;
        self.volume = Some(volume);
        self.slices = match self.rebuild {
            RebuildPolicy::OnLoad => Vec::new(),
            RebuildPolicy::Continuous => frames,
        };
        Ok(())
    }

    /// Record `record` unless this stack already has one. Returns whether it was stored.
    pub fn set_patient_if_absent(&mut self, record: PatientRecord) -> bool {
        if self.patient.is_some() {
            return false;
        }
        self.patient = Some(record);
        true
    }

    pub fn patient(&self) -> Option<&PatientRecord> {
        self.patient.as_ref()
    }

    pub fn volume(&self) -> Option<&VolumeStore> {
        self.volume.as_ref()
    }

    /// Drop the loaded stack and its patient record
    pub fn clear(&mut self) {
        self.volume = None;
        self.patient = None;
        self.slices.clear();
    }

    pub fn slice_count(&self, orientation: Orientation) -> usize {
        self.volume
            .as_ref()
            .map_or(0, |volume| volume.slice_count(orientation))
    }

    /// Extract the slice at `index`, at the volume's native resolution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] when nothing is loaded and
    /// [`Error::IndexOutOfRange`] for a bad index.
    pub fn slice(&mut self, orientation: Orientation, index: usize) -> Result<FrameBuffer2D> {
        if self.rebuild == RebuildPolicy::Continuous && !self.slices.is_empty() {
            self.volume = Some(VolumeStore::build(&self.slices, self.filter)?);
        }
        self.volume
            .as_ref()
            .ok_or(Error::EmptyInput)?
            .extract(orientation, index)
    }

    /// Extract a slice and fit it to a `width` x `height` display target
    pub fn view(
        &mut self,
        orientation: Orientation,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<FrameBuffer2D> {
        let slice = self.slice(orientation, index)?;
        Interpolator::fit(&slice, width, height, self.filter)
    }
}
