//! Normalization methods, the static gain solver, and gain application
//!
//! The solver reconciles a loudness target with the measured levels and the
//! true-peak ceiling, producing one linear scalar. Application either
//! multiplies the stream by that scalar or sweeps a per-frame gain envelope
//! across it with sample-accurate linear interpolation.

use crate::dynamic::DynamicNormalizerConfig;
use serde::{Deserialize, Serialize};

/// Default peak normalization target in dBFS
pub const DEFAULT_PEAK_TARGET_DB: f32 = -0.1;

/// Default RMS normalization target in dBFS
pub const DEFAULT_RMS_TARGET_DB: f32 = -20.0;

/// Default true-peak ceiling in dBTP (EBU R128 recommendation)
pub const DEFAULT_TRUE_PEAK_LIMIT_DB: f32 = -1.0;

/// Sample-peak guard applied by RMS normalization, in dBFS
const RMS_CLIP_GUARD_DB: f64 = -0.1;

fn default_peak_target() -> f32 {
    DEFAULT_PEAK_TARGET_DB
}

fn default_rms_target() -> f32 {
    DEFAULT_RMS_TARGET_DB
}

fn default_true_peak_limit() -> f32 {
    DEFAULT_TRUE_PEAK_LIMIT_DB
}

/// How the stream should be normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NormalizationMethod {
    /// Scale so the sample peak lands on `target_db`
    #[serde(rename_all = "camelCase")]
    Peak {
        #[serde(default = "default_peak_target")]
        target_db: f32,
    },
    /// Scale so the RMS lands on `target_db`, guarded against clipping
    #[serde(rename_all = "camelCase")]
    Rms {
        #[serde(default = "default_rms_target")]
        target_db: f32,
    },
    /// Scale so integrated loudness lands on `target_lufs`, capped so the
    /// true peak stays at or under `true_peak_limit_db`
    #[serde(rename_all = "camelCase")]
    Lufs {
        target_lufs: f32,
        #[serde(default = "default_true_peak_limit")]
        true_peak_limit_db: f32,
    },
    /// Framewise dynamic normalization with a smoothed gain envelope
    #[serde(rename_all = "camelCase")]
    Dynamic {
        #[serde(default)]
        config: DynamicNormalizerConfig,
    },
}

impl NormalizationMethod {
    /// Peak normalization with the default -0.1 dB target
    pub fn peak() -> Self {
        Self::Peak {
            target_db: DEFAULT_PEAK_TARGET_DB,
        }
    }

    /// RMS normalization with the default -20 dB target
    pub fn rms() -> Self {
        Self::Rms {
            target_db: DEFAULT_RMS_TARGET_DB,
        }
    }

    /// LUFS normalization with the default -1 dBTP ceiling
    pub fn lufs(target_lufs: f32) -> Self {
        Self::Lufs {
            target_lufs,
            true_peak_limit_db: DEFAULT_TRUE_PEAK_LIMIT_DB,
        }
    }

    /// Dynamic normalization with the voice preset
    pub fn dynamic() -> Self {
        Self::Dynamic {
            config: DynamicNormalizerConfig::default(),
        }
    }

    /// Short label for previews and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Peak { .. } => "peak",
            Self::Rms { .. } => "rms",
            Self::Lufs { .. } => "lufs",
            Self::Dynamic { .. } => "dynamic",
        }
    }
}

impl Default for NormalizationMethod {
    fn default() -> Self {
        Self::peak()
    }
}

/// Static level measurements consumed by the gain solver
#[derive(Debug, Clone, Copy)]
pub struct StaticMeasurements {
    /// Sample peak in dBFS; `-inf` for silence
    pub peak_db: f64,
    /// RMS in dBFS; `-inf` for silence
    pub rms_db: f64,
    /// Integrated loudness in LUFS; `-inf` when unmeasured
    pub integrated_lufs: f64,
    /// True peak in dBTP; `-inf` for silence
    pub true_peak_db: f64,
}

/// Solve a normalization method against measured levels
///
/// Returns the linear gain to apply uniformly to the stream. Pure silence
/// (`-inf` peak or RMS) always solves to unit gain; a `Dynamic` method has
/// no single scalar and also returns unit gain here.
pub fn compute_static_gain(method: &NormalizationMethod, levels: &StaticMeasurements) -> f32 {
    let gain_db = match *method {
        NormalizationMethod::Peak { target_db } => {
            if !levels.peak_db.is_finite() {
                return 1.0;
            }
            target_db as f64 - levels.peak_db
        }
        NormalizationMethod::Rms { target_db } => {
            if !levels.rms_db.is_finite() || !levels.peak_db.is_finite() {
                return 1.0;
            }
            let wanted = target_db as f64 - levels.rms_db;
            // Keep the resulting sample peak under the clip guard
            wanted.min(RMS_CLIP_GUARD_DB - levels.peak_db)
        }
        NormalizationMethod::Lufs {
            target_lufs,
            true_peak_limit_db,
        } => {
            if !levels.integrated_lufs.is_finite() {
                return 1.0;
            }
            let wanted = target_lufs as f64 - levels.integrated_lufs;
            if levels.true_peak_db.is_finite() {
                wanted.min(true_peak_limit_db as f64 - levels.true_peak_db)
            } else {
                wanted
            }
        }
        NormalizationMethod::Dynamic { .. } => return 1.0,
    };

    10.0_f64.powf(gain_db / 20.0) as f32
}

/// Multiply every sample by one gain
pub fn apply_scalar_gain(samples: &mut [f32], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

/// Sweep a per-frame gain envelope across an interleaved stream
///
/// `frame_samples` is the interleaved length of one frame (samples per frame
/// times the channel count). The gain at sample `s` is the linear
/// interpolation between the gains of the frames straddling `s`, clamped at
/// both ends, so the applied curve is continuous piecewise-linear.
pub fn apply_envelope_gain(samples: &mut [f32], envelope: &[f32], frame_samples: usize) {
    apply_envelope_gain_at(samples, 0, envelope, frame_samples);
}

/// Envelope application for a chunk starting at `start_sample` of the stream
///
/// Lets a re-encode loop apply gain chunk by chunk while interpolating
/// against absolute stream positions.
pub fn apply_envelope_gain_at(
    samples: &mut [f32],
    start_sample: usize,
    envelope: &[f32],
    frame_samples: usize,
) {
    if envelope.is_empty() || frame_samples == 0 {
        return;
    }
    let last = envelope.len() - 1;

    for (offset, sample) in samples.iter_mut().enumerate() {
        let position = (start_sample + offset) as f64 / frame_samples as f64;
        let index = position.floor() as usize;
        let gain = if index >= last {
            envelope[last]
        } else {
            let t = (position - index as f64) as f32;
            envelope[index] + t * (envelope[index + 1] - envelope[index])
        };
        *sample *= gain;
    }
}
