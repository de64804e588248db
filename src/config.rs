//! Viewer configuration
//!
//! Loaded from a TOML file; every section falls back to its defaults when
//! omitted.

use crate::enums::{RebuildPolicy, ResampleFilter, SortBy};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Conventional port for slice streaming
pub const DEFAULT_PORT: u16 = 50001;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub stream: StreamConfig,
    pub display: DisplayConfig,
    pub volume: VolumeConfig,
    pub logging: LoggingConfig,
}

/// Slice streaming endpoints
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Host the sender connects to
    pub peer_address: String,
    /// Interface the receiver binds
    pub bind_address: String,
    pub port: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            peer_address: "127.0.0.1".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Size of the on-screen slice targets
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub filter: ResampleFilter,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            filter: ResampleFilter::Bilinear,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub rebuild: RebuildPolicy,
    pub sort_by: SortBy,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// `host:port` the receiver binds
    pub fn bind_endpoint(&self) -> String {
        format!("{}:{}", self.stream.bind_address, self.stream.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert_eq!(config.stream.port, 50001);
        assert_eq!(config.stream.peer_address, "127.0.0.1");
        assert_eq!(config.display.filter, ResampleFilter::Bilinear);
        assert_eq!(config.volume.rebuild, RebuildPolicy::OnLoad);
        assert_eq!(config.bind_endpoint(), "0.0.0.0:50001");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[stream]
peer_address = "192.168.1.20"
port = 6000

[display]
width = 256
filter = "nearest"

[volume]
rebuild = "continuous"
sort_by = "image-position-patient"
"#;

        let config = ViewerConfig::from_toml(toml_content).unwrap();
        assert_eq!(config.stream.peer_address, "192.168.1.20");
        assert_eq!(config.stream.port, 6000);
        assert_eq!(config.stream.bind_address, "0.0.0.0");
        assert_eq!(config.display.width, 256);
        assert_eq!(config.display.height, 512);
        assert_eq!(config.display.filter, ResampleFilter::Nearest);
        assert_eq!(config.volume.rebuild, RebuildPolicy::Continuous);
        assert_eq!(config.volume.sort_by, SortBy::ImagePositionPatient);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_value() {
        let err = ViewerConfig::from_toml("[display]\nfilter = \"cubic\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.toml");
        let mut config = ViewerConfig::default();
        config.logging.level = "debug".to_string();
        config.to_file(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[stream]"));
        assert!(contents.contains("rebuild = \"on-load\""));
        assert_eq!(ViewerConfig::from_file(&path).unwrap(), config);
    }
}
