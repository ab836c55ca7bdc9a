//! Capture configuration
//!
//! Every field has a default, so a configuration file only needs to name what it changes:
//!
//! ```json
//! { "device": "/dev/video2", "frames": 25, "interval_ms": 200 }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::CapturePlan;
use crate::device::SessionConfig;
use crate::FourCC;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`Config`]
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything a capture run needs to know
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device node, a bare number N means /dev/videoN
    pub device: String,
    /// Requested width in pixels
    pub width: u32,
    /// Requested height in pixels
    pub height: u32,
    /// Requested pixel format as four character code
    pub fourcc: String,
    /// Number of mapped buffers
    pub buffers: u32,
    /// Per-frame wait timeout in milliseconds
    pub timeout_ms: u64,
    /// Number of frames to capture
    pub frames: u32,
    /// Delay between two captured frames in milliseconds
    pub interval_ms: u64,
    /// Directory the frames are written to
    pub output_dir: PathBuf,
    /// File name pattern, `{n}` is replaced by the 1-based frame number
    pub pattern: String,
    /// Consecutive requeue failures tolerated before giving up
    pub max_requeue_failures: u32,
    /// Decode every frame before writing it
    pub decode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fourcc: "MJPG".to_string(),
            buffers: 4,
            timeout_ms: 2000,
            frames: 10,
            interval_ms: 500,
            output_dir: PathBuf::from("."),
            pattern: "image_{n}.jpg".to_string(),
            max_requeue_failures: 3,
            decode: false,
        }
    }
}

impl Config {
    /// Loads a JSON configuration file, missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks the values that cannot be expressed by the types alone
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffers == 0 {
            return Err(ConfigError::Invalid {
                field: "buffers",
                reason: "at least one buffer is required".to_string(),
            });
        }
        if self.max_requeue_failures == 0 {
            return Err(ConfigError::Invalid {
                field: "max_requeue_failures",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid {
                field: "resolution",
                reason: format!("{}x{} is empty", self.width, self.height),
            });
        }
        if !self.pattern.contains("{n}") {
            return Err(ConfigError::Invalid {
                field: "pattern",
                reason: format!("{:?} lacks the {{n}} placeholder", self.pattern),
            });
        }
        self.fourcc()?;
        Ok(())
    }

    /// Resolves the device setting to a path
    pub fn device_path(&self) -> PathBuf {
        match self.device.parse::<usize>() {
            Ok(index) => PathBuf::from(format!("/dev/video{}", index)),
            Err(_) => PathBuf::from(&self.device),
        }
    }

    /// The requested pixel format
    pub fn fourcc(&self) -> Result<FourCC, ConfigError> {
        self.fourcc
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                field: "fourcc",
                reason,
            })
    }

    /// Session parameters
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            buffer_count: self.buffers,
            timeout: Duration::from_millis(self.timeout_ms),
            max_requeue_failures: self.max_requeue_failures,
        }
    }

    /// Capture loop parameters
    pub fn plan(&self) -> CapturePlan {
        CapturePlan {
            frames: self.frames,
            interval: Duration::from_millis(self.interval_ms),
            decode: self.decode,
        }
    }
}
