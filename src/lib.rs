//! # Slice viewer library
//!
//! This crate assembles an ordered stack of 2-D cross-section images into a
//! 3-D voxel volume and re-slices it along the three medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! Rendered slices and the patient record of a stack can be streamed to a
//! second process over a plain TCP link. Each message is one frame of
//! `[kind][length][payload]`; the receiver reads frames on its own thread and
//! hands them to an [`Inbox`] that the host drains on its own tick.
//!
//! Slices come from a [`SliceSource`]. [`DicomFolderSource`] reads a folder
//! of DICOM files with dicom-rs; anything else that yields RGBA pixels and a
//! patient record can stand in for it.
//!
//! # Examples
//!
//! ## Viewing the centre of a stack
//!
//! ```no_run
//! # use slice_viewer::{DicomFolderSource, Orientation, RebuildPolicy, ResampleFilter, SortBy, ViewerSession};
//! # use std::path::Path;
//! let source = DicomFolderSource::new(SortBy::InstanceNumber);
//! let mut session = ViewerSession::new(RebuildPolicy::OnLoad, ResampleFilter::Bilinear);
//! session
//!     .load_stack(&source, Path::new("dicom"))
//!     .expect("should have loaded files from directory");
//! let centre = session.slice_count(Orientation::Sagittal) / 2;
//! let image = session
//!     .view(Orientation::Sagittal, centre, 512, 512)
//!     .expect("should have returned image at center of volume");
//! std::fs::write("result.png", image.to_png().unwrap()).unwrap();
//! ```
//!
//! ## Streaming a slice
//!
//! ```no_run
//! # use slice_viewer::{FrameBuffer2D, Orientation, PatientRecord, StreamSender};
//! let frame = FrameBuffer2D::solid(64, 64, [255, 0, 0, 255]).unwrap();
//! let mut sender = StreamSender::new();
//! sender.connect("127.0.0.1", 50001).unwrap();
//! sender.send_image(&frame, Orientation::Axial).unwrap();
//! sender.send_patient_info(&PatientRecord::new("P1", "Doe")).unwrap();
//! sender.disconnect();
//! ```

pub mod codec;
pub mod config;
pub mod enums;
pub mod error;
pub mod frame;
pub mod inbox;
mod interpolator;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod slice_source;
pub mod volume;

pub use codec::{MessageKind, PatientRecord, WireMessage};
pub use config::ViewerConfig;
pub use enums::{Orientation, RebuildPolicy, ResampleFilter, SortBy};
pub use error::{Error, Result};
pub use frame::{FrameBuffer2D, Rgba8};
pub use inbox::{Inbox, SliceConsumer};
pub use interpolator::Interpolator;
pub use receiver::{ReceiverState, StreamReceiver};
pub use sender::StreamSender;
pub use session::ViewerSession;
pub use slice_source::{DecodedSlice, DicomFolderSource, SliceSource, SliceSourceError};
pub use volume::VolumeStore;
