//! Loudness measurement and normalization DSP for Sona
//!
//! This crate provides:
//! - K-weighted gated loudness measurement per ITU-R BS.1770-4 / EBU R128
//!   (integrated, short-term, momentary, loudness range)
//! - True-peak detection with 4x oversampling (cubic and polyphase paths)
//! - Static gain solving against peak, RMS and LUFS targets with a
//!   true-peak ceiling
//! - Framewise dynamic normalization with a Gaussian-smoothed gain envelope
//!   for material with strongly varying levels
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌────────────────┐
//! │ PCM (f32,    │ ──► │ analyze()     │ ──► │ AudioAnalysis  │
//! │ interleaved) │     │ meter + peaks │     │ gain / envelope│
//! └──────────────┘     └───────────────┘     └────────────────┘
//!                                                    │
//!                                                    ▼
//!                              apply_scalar_gain / apply_envelope_gain
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sona_dsp::{analyze, apply_scalar_gain, AudioBuffer, NormalizationMethod};
//!
//! let analysis = analyze(&buffer, &NormalizationMethod::lufs(-14.0))?;
//! println!("Integrated: {:.1} LUFS", analysis.integrated_lufs);
//!
//! apply_scalar_gain(&mut buffer.samples, analysis.required_gain);
//! ```
//!
//! The crate is pure and single-threaded: no I/O, no locks, no global
//! state. A filter or meter instance belongs to exactly one analysis;
//! parallel analyses each construct their own.

#![deny(unsafe_code)]

mod analysis;
mod biquad;
mod buffer;
mod dynamic;
mod error;
mod gain;
mod kweight;
mod meter;
mod true_peak;

pub use analysis::{analyze, analyze_with_progress, AudioAnalysis, LevelSnapshot, Preview};
pub use biquad::{Biquad, BiquadCoeffs};
pub use buffer::{AudioBuffer, AudioFormat, SampleRate};
pub use dynamic::{
    DynamicAnalysis, DynamicNormalizer, DynamicNormalizerConfig, FrameLevels, ProblemCategory,
    ProblemSpot,
};
pub use error::{DspError, Result};
pub use gain::{
    apply_envelope_gain, apply_envelope_gain_at, apply_scalar_gain, compute_static_gain,
    NormalizationMethod, StaticMeasurements, DEFAULT_PEAK_TARGET_DB, DEFAULT_RMS_TARGET_DB,
    DEFAULT_TRUE_PEAK_LIMIT_DB,
};
pub use kweight::{KWeightChain, KWeighting};
pub use meter::{LoudnessMeter, LoudnessSummary};
pub use true_peak::{detect as detect_true_peak, detect_per_channel, TruePeak, TruePeakMethod};

/// Streaming-platform reference level (-14 LUFS)
pub const STREAMING_TARGET_LUFS: f32 = -14.0;

/// ReplayGain 2.0 reference level (-18 LUFS)
pub const REPLAYGAIN_TARGET_LUFS: f32 = -18.0;

/// EBU R128 broadcast reference level (-23 LUFS)
pub const BROADCAST_TARGET_LUFS: f32 = -23.0;
