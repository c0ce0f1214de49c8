//! Error kinds reported by a capture.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("barcode is empty")]
    InvalidInput,

    #[error("camera is not connected")]
    NotConnected,

    #[error("stream {location} unavailable: {reason}")]
    StreamUnavailable { location: String, reason: String },

    #[error("cannot persist {}: {reason}", path.display())]
    EncodeOrWriteFailure { path: PathBuf, reason: String },

    #[error("all {attempted} stream locations failed")]
    AllCandidatesFailed { attempted: usize },
}

/// Wire form of [`CaptureError`], carried in failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotConnected,
    StreamUnavailable,
    EncodeOrWriteFailure,
    AllCandidatesFailed,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::InvalidInput => ErrorKind::InvalidInput,
            CaptureError::NotConnected => ErrorKind::NotConnected,
            CaptureError::StreamUnavailable { .. } => ErrorKind::StreamUnavailable,
            CaptureError::EncodeOrWriteFailure { .. } => ErrorKind::EncodeOrWriteFailure,
            CaptureError::AllCandidatesFailed { .. } => ErrorKind::AllCandidatesFailed,
        }
    }

    pub fn write_failure(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        CaptureError::EncodeOrWriteFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
