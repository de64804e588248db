//! Error types for the slice viewer

use crate::codec::MessageKind;
use crate::enums::Orientation;
use crate::slice_source::SliceSourceError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot build a volume from an empty slice stack")]
    EmptyInput,

    #[error("{orientation} index {index} is out of range (bound {bound})")]
    IndexOutOfRange {
        orientation: Orientation,
        index: usize,
        bound: usize,
    },

    #[error("frame of {width}x{height} cannot hold {actual} pixels")]
    PixelCountMismatch { width: u32, height: u32, actual: usize },

    #[error("invalid dimensions {width}x{height}: both must be at least 1")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("unknown message kind tag {0}")]
    UnknownMessageKind(u32),

    #[error("payload of {len} bytes exceeds the frame limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("failed to connect to {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {kind:?} frame: {source}")]
    Write {
        kind: MessageKind,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {kind:?} payload: {reason}")]
    Decode { kind: MessageKind, reason: String },

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("volume shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("slice source error: {0}")]
    SliceSource(#[from] SliceSourceError),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
