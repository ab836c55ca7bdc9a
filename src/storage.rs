//! Writing frames to disk

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::capture::FrameSink;

/// Writes `bytes` to `path`, replacing whatever was there
pub fn persist<P: AsRef<Path>>(bytes: &[u8], path: P) -> io::Result<()> {
    let path = path.as_ref();
    fs::write(path, bytes)?;
    debug!(path = %path.display(), len = bytes.len(), "frame written");
    Ok(())
}

/// Stores every frame as its own file in a directory
///
/// File names come from a pattern in which `{n}` stands for the 1-based frame number.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    pattern: String,
}

impl FileSink {
    /// Returns a sink writing into `dir`
    ///
    /// # Arguments
    ///
    /// * `dir` - Output directory, has to exist
    /// * `pattern` - File name pattern, e.g. "image_{n}.jpg"
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, pattern: S) -> Self {
        FileSink {
            dir: dir.into(),
            pattern: pattern.into(),
        }
    }

    /// Path the given frame is written to
    pub fn path_for(&self, number: u32) -> PathBuf {
        self.dir
            .join(self.pattern.replace("{n}", &number.to_string()))
    }
}

impl FrameSink for FileSink {
    fn persist(&mut self, number: u32, data: &[u8]) -> io::Result<()> {
        persist(data, self.path_for(number))
    }
}
