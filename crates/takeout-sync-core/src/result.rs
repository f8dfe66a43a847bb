use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RequiredChange;

/// Why a file could not be synchronized. Every failed file falls into exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No valid sidecar next to the file.
    NoMetadata,
    /// A sidecar was found but could not be parsed.
    InvalidMetadata,
    /// The file's own metadata could not be read.
    ExifReadError,
    /// A write step failed.
    ExifWriteError,
    /// Anything else.
    ProcessingError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::NoMetadata,
        ErrorKind::InvalidMetadata,
        ErrorKind::ExifReadError,
        ErrorKind::ExifWriteError,
        ErrorKind::ProcessingError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoMetadata => "no_metadata",
            ErrorKind::InvalidMetadata => "invalid_metadata",
            ErrorKind::ExifReadError => "exif_read_error",
            ErrorKind::ExifWriteError => "exif_write_error",
            ErrorKind::ProcessingError => "processing_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FileError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one file's pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct FileResult {
    pub path: PathBuf,
    pub success: bool,
    /// Empty on success means the file was already in sync.
    pub changes: Vec<RequiredChange>,
    pub error: Option<FileError>,
    pub gps_zero_skipped: bool,
}

impl FileResult {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            changes: Vec::new(),
            error: None,
            gps_zero_skipped: false,
        }
    }

    pub fn failed(path: &Path, error: FileError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(path)
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
