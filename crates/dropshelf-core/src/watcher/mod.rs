//! Polling watcher for the import directory.
//!
//! A file is surfaced once its size has stayed constant for the configured
//! stability window. Each surfaced path is held in the processed registry until
//! the host acknowledges it: `mark_processed` forgets it, `mark_failed` keeps it
//! suppressed until the file disappears or `retry_failed` is called.

pub mod registry;
pub mod scanner;
pub mod service;
pub mod stability;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

pub use registry::{ProcessedRegistry, RegistryState};
pub use scanner::DirectoryScanner;
pub use service::{spawn_watcher, WatcherHandle, WatcherStatus};
pub use stability::StabilityTracker;

/// A fully written file found in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size_bytes: u64,
    /// Lowercase, dot-qualified.
    pub extension: String,
    pub detected_at: DateTime<Utc>,
}

impl DetectedFile {
    pub fn new(path: PathBuf, file_size_bytes: u64, detected_at: DateTime<Utc>) -> Self {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = scanner::extension_of(&path).unwrap_or_default();
        Self {
            path,
            file_name,
            file_size_bytes,
            extension,
            detected_at,
        }
    }

    /// Describe a file on disk directly, bypassing stability detection.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self::new(path.to_path_buf(), metadata.len(), Utc::now()))
    }
}
