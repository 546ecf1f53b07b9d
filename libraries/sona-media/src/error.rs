//! Error types for the media adapter

use thiserror::Error;

/// Result type for media operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Errors that can occur while reading, writing or normalizing files
///
/// I/O and container failures live here; the DSP core's own taxonomy
/// passes through as [`MediaError::Dsp`].
#[derive(Error, Debug)]
pub enum MediaError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Container or codec not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Decoding failed mid-stream
    #[error("Failed to decode audio: {0}")]
    DecodeFailed(String),

    /// Encoding or writing the output failed
    #[error("Failed to encode audio: {0}")]
    EncodeFailed(String),

    /// The operation was cancelled at a chunk boundary; a partial output
    /// file may remain and is the caller's to delete
    #[error("Normalization was cancelled")]
    Cancelled,

    /// Error from the DSP core
    #[error(transparent)]
    Dsp(#[from] sona_dsp::DspError),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for MediaError {
    fn from(err: hound::Error) -> Self {
        Self::EncodeFailed(err.to_string())
    }
}
