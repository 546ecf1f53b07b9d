//! Error types for the DSP core

use thiserror::Error;

/// Result type for DSP operations
pub type Result<T> = std::result::Result<T, DspError>;

/// Errors that can occur while measuring or normalizing audio
///
/// The DSP core only errors on malformed input. Numeric edge cases
/// (silence, short buffers, empty gates) degrade to unit gain or absent
/// metrics instead of erroring.
#[derive(Error, Debug)]
pub enum DspError {
    /// Invalid sample rate
    #[error("Invalid sample rate: {0} Hz (must be greater than 0)")]
    InvalidSampleRate(u32),

    /// Invalid channel count
    #[error("Invalid channel count: {0} (must be at least 1)")]
    InvalidChannelCount(u16),

    /// Sample count does not divide evenly into the channel count
    #[error("Sample count {samples} is not divisible by channel count {channels}")]
    MismatchedSamples { samples: usize, channels: u16 },

    /// No audio samples were provided
    #[error("No audio samples provided for analysis")]
    EmptyInput,
}
