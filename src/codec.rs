//! Wire framing for slice streaming
//!
//! Every message travels as one self-describing frame:
//!
//! ```text
//! ┌────────────────┬──────────────────┬──────────────────────┐
//! │ Kind (4 bytes) │ Length (4 bytes) │ Payload (Length)     │
//! │ LE u32         │ LE u32           │ PNG or UTF-8 JSON    │
//! └────────────────┴──────────────────┴──────────────────────┘
//! ```
//!
//! | Kind | Payload |
//! |------|---------|
//! | 1 | Axial slice, PNG |
//! | 2 | Sagittal slice, PNG |
//! | 3 | Coronal slice, PNG |
//! | 4 | Patient record, `{"id": .., "name": ..}` |
//!
//! A reader that meets an unknown kind still consumes `Length` payload bytes
//! so the next frame stays aligned.

use serde::{Deserialize, Serialize};

use crate::enums::Orientation;
use crate::error::{Error, Result};
use crate::frame::FrameBuffer2D;

pub const HEADER_LEN: usize = 8;

/// Largest payload a receiver will buffer for a known kind (64 MiB)
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    Axial = 1,
    Sagittal = 2,
    Coronal = 3,
    PatientInfo = 4,
}

impl MessageKind {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn for_orientation(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Axial => MessageKind::Axial,
            Orientation::Sagittal => MessageKind::Sagittal,
            Orientation::Coronal => MessageKind::Coronal,
        }
    }

    /// The image plane carried by this kind, `None` for patient info
    pub fn orientation(self) -> Option<Orientation> {
        match self {
            MessageKind::Axial => Some(Orientation::Axial),
            MessageKind::Sagittal => Some(Orientation::Sagittal),
            MessageKind::Coronal => Some(Orientation::Coronal),
            MessageKind::PatientInfo => None,
        }
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = Error;

    fn try_from(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(MessageKind::Axial),
            2 => Ok(MessageKind::Sagittal),
            3 => Ok(MessageKind::Coronal),
            4 => Ok(MessageKind::PatientInfo),
            other => Err(Error::UnknownMessageKind(other)),
        }
    }
}

/// Patient metadata paired with a slice stack
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub name: String,
}

impl PatientRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Raw frame header; the tag is kept unvalidated so unknown kinds can be skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub tag: u32,
    pub len: u32,
}

impl FrameHeader {
    pub fn parse(bytes: [u8; HEADER_LEN]) -> Self {
        let [t0, t1, t2, t3, l0, l1, l2, l3] = bytes;
        Self {
            tag: u32::from_le_bytes([t0, t1, t2, t3]),
            len: u32::from_le_bytes([l0, l1, l2, l3]),
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.tag.to_le_bytes());
        out[4..].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    pub fn kind(&self) -> Result<MessageKind> {
        MessageKind::try_from(self.tag)
    }

    pub fn payload_len(&self) -> usize {
        self.len as usize
    }
}

/// Decode the 4-byte kind tag that opens every frame.
pub fn decode_header(tag: [u8; 4]) -> Result<MessageKind> {
    MessageKind::try_from(u32::from_le_bytes(tag))
}

/// Frame `payload` as `kind`.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the payload does not fit a `u32`
/// length field.
pub fn encode(kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    let header = FrameHeader {
        tag: kind.tag(),
        len,
    };
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Split one complete frame back into its kind and payload.
///
/// Trailing bytes after the payload are ignored.
pub fn decode(frame: &[u8]) -> Result<(MessageKind, &[u8])> {
    let header_bytes: [u8; HEADER_LEN] = frame
        .get(..HEADER_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Io(std::io::ErrorKind::UnexpectedEof.into()))?;
    let header = FrameHeader::parse(header_bytes);
    let kind = header.kind()?;
    let payload = frame
        .get(HEADER_LEN..HEADER_LEN + header.payload_len())
        .ok_or_else(|| Error::Io(std::io::ErrorKind::UnexpectedEof.into()))?;
    Ok((kind, payload))
}

/// A decoded message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    Image {
        orientation: Orientation,
        frame: FrameBuffer2D,
    },
    PatientInfo(PatientRecord),
}

impl WireMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::Image { orientation, .. } => MessageKind::for_orientation(*orientation),
            WireMessage::PatientInfo(_) => MessageKind::PatientInfo,
        }
    }

    /// Serialize the payload and frame it
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let payload = match self {
            WireMessage::Image { frame, .. } => frame.to_png()?,
            WireMessage::PatientInfo(record) => serde_json::to_vec(record)?,
        };
        encode(self.kind(), &payload)
    }

    /// Decode a payload received under `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] when the PNG or JSON is malformed.
    pub fn from_payload(kind: MessageKind, payload: &[u8]) -> Result<Self> {
        match kind.orientation() {
            Some(orientation) => {
                let frame = FrameBuffer2D::from_encoded(payload).map_err(|e| Error::Decode {
                    kind,
                    reason: e.to_string(),
                })?;
                Ok(WireMessage::Image { orientation, frame })
            }
            None => {
                let record = serde_json::from_slice(payload).map_err(|e| Error::Decode {
                    kind,
                    reason: e.to_string(),
                })?;
                Ok(WireMessage::PatientInfo(record))
            }
        }
    }
}
