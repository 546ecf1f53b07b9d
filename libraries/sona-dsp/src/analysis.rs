//! Analysis façade
//!
//! Composes the meter, true-peak detector and gain solvers into a single
//! pass: one interleaved buffer and a normalization method in, one
//! [`AudioAnalysis`] out. The analysis is a pure function of its inputs;
//! apply the resulting gain with [`crate::apply_scalar_gain`] or
//! [`crate::apply_envelope_gain`] while re-encoding.

use crate::buffer::AudioBuffer;
use crate::dynamic::{DynamicAnalysis, DynamicNormalizer};
use crate::error::{DspError, Result};
use crate::gain::{compute_static_gain, NormalizationMethod, StaticMeasurements};
use crate::meter::LoudnessMeter;
use crate::true_peak::{self, TruePeakMethod};
use tracing::debug;

/// A before/after level pair shown to the user ahead of re-encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSnapshot {
    /// Sample peak in dBFS; `-inf` for silence
    pub peak_db: f64,
    /// RMS in dBFS; `-inf` for silence
    pub rms_db: f64,
    /// Integrated loudness in LUFS, when measured
    pub lufs: Option<f64>,
    /// True peak in dBTP, when measured
    pub true_peak_db: Option<f64>,
}

/// Predicted effect of a normalization method, derived purely from the
/// measurements without re-running the engine on its own output
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    /// Short method label ("peak", "rms", "lufs", "dynamic")
    pub method: &'static str,
    /// Levels as measured
    pub before: LevelSnapshot,
    /// Levels expected after applying the gain
    pub after: LevelSnapshot,
    /// Gain that will be applied, in dB (mean gain for dynamic)
    pub gain_db: f64,
    /// Number of problem spots found (dynamic only)
    pub problem_spots: usize,
}

/// Complete analysis of one buffer
#[derive(Debug, Clone)]
pub struct AudioAnalysis {
    /// Sample peak across all channels, in dBFS; `-inf` for silence
    pub peak_db: f64,
    /// Largest per-channel RMS, in dBFS; `-inf` for silence
    pub rms_db: f64,
    /// Sample peak of each channel, in dBFS
    pub channel_peaks_db: Vec<f64>,
    /// RMS of each channel, in dBFS
    pub channel_rms_db: Vec<f64>,
    /// Number of channels
    pub channels: u16,
    /// Scalar gain solving the method (unit for silence; mean envelope gain
    /// for the dynamic method)
    pub required_gain: f32,
    /// Integrated loudness in LUFS
    pub integrated_lufs: f64,
    /// Maximum short-term loudness in LUFS, absent under 3 s of input
    pub short_term_lufs: Option<f64>,
    /// Loudness range in LU, absent under 20 gated blocks
    pub loudness_range_lu: Option<f64>,
    /// True peak in dBTP; `-inf` for silence
    pub true_peak_db: f64,
    /// Envelope analysis when the method is dynamic
    pub dynamic: Option<DynamicAnalysis>,
    /// Before/after preview of the chosen method
    pub preview: Preview,
}

/// Analyze a buffer against a normalization method
///
/// # Errors
/// Returns an error for an empty buffer, a zero sample rate or channel
/// count, or a sample count not divisible by the channel count. Numeric
/// edge cases (silence, short input) degrade instead of erroring.
pub fn analyze(buffer: &AudioBuffer, method: &NormalizationMethod) -> Result<AudioAnalysis> {
    analyze_with_progress(buffer, method, |_| {})
}

/// [`analyze`] with a progress callback
///
/// The callback receives a monotonically increasing fraction in [0, 1] at
/// phase boundaries. It is invoked on the calling thread.
pub fn analyze_with_progress(
    buffer: &AudioBuffer,
    method: &NormalizationMethod,
    mut progress: impl FnMut(f32),
) -> Result<AudioAnalysis> {
    let sample_rate = buffer.format.sample_rate.as_hz();
    let channels = buffer.format.channels;

    if buffer.is_empty() {
        return Err(DspError::EmptyInput);
    }
    if sample_rate == 0 {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }
    if channels == 0 {
        return Err(DspError::InvalidChannelCount(channels));
    }
    if buffer.len() % channels as usize != 0 {
        return Err(DspError::MismatchedSamples {
            samples: buffer.len(),
            channels,
        });
    }

    progress(0.0);

    // Per-channel peaks and RMS in one streaming pass
    let (channel_peaks_db, channel_rms_db) = channel_stats(&buffer.samples, channels as usize);
    let peak_db = channel_peaks_db
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let rms_db = channel_rms_db
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    progress(0.25);

    let mut meter = LoudnessMeter::new(sample_rate, channels)?;
    meter.add_frames(&buffer.samples)?;
    let loudness = meter.finalize();
    progress(0.65);

    let true_peak = true_peak::detect(&buffer.samples, channels, TruePeakMethod::Polyphase)?;
    progress(0.85);

    let levels = StaticMeasurements {
        peak_db,
        rms_db,
        integrated_lufs: loudness.integrated_lufs,
        true_peak_db: true_peak.db,
    };

    let (required_gain, dynamic) = match method {
        NormalizationMethod::Dynamic { config } => {
            let analysis = DynamicNormalizer::new(*config).analyze(
                &buffer.samples,
                sample_rate,
                channels,
            )?;
            let gain = 10.0_f64.powf(analysis.average_gain_db() / 20.0) as f32;
            (gain, Some(analysis))
        }
        _ => (compute_static_gain(method, &levels), None),
    };

    let preview = build_preview(method, &levels, required_gain, dynamic.as_ref());

    debug!(
        method = method.label(),
        peak_db,
        rms_db,
        integrated_lufs = loudness.integrated_lufs,
        true_peak_db = true_peak.db,
        required_gain,
        "analysis complete"
    );
    progress(1.0);

    Ok(AudioAnalysis {
        peak_db,
        rms_db,
        channel_peaks_db,
        channel_rms_db,
        channels,
        required_gain,
        integrated_lufs: loudness.integrated_lufs,
        short_term_lufs: loudness.short_term_lufs,
        loudness_range_lu: loudness.loudness_range_lu,
        true_peak_db: true_peak.db,
        dynamic,
        preview,
    })
}

/// Per-channel sample peak and RMS in dB
fn channel_stats(samples: &[f32], channels: usize) -> (Vec<f64>, Vec<f64>) {
    let mut peaks = vec![0.0_f64; channels];
    let mut sums = vec![0.0_f64; channels];
    for frame in samples.chunks_exact(channels) {
        for (channel, &sample) in frame.iter().enumerate() {
            let value = sample as f64;
            peaks[channel] = peaks[channel].max(value.abs());
            sums[channel] += value * value;
        }
    }

    let frames = samples.len() / channels;
    let peaks_db = peaks.iter().map(|&p| to_db(p)).collect();
    let rms_db = sums
        .iter()
        .map(|&s| to_db((s / frames as f64).sqrt()))
        .collect();
    (peaks_db, rms_db)
}

fn to_db(linear: f64) -> f64 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// Predict the post-gain levels for the method without re-measuring
fn build_preview(
    method: &NormalizationMethod,
    levels: &StaticMeasurements,
    required_gain: f32,
    dynamic: Option<&DynamicAnalysis>,
) -> Preview {
    let before = LevelSnapshot {
        peak_db: levels.peak_db,
        rms_db: levels.rms_db,
        lufs: Some(levels.integrated_lufs).filter(|l| l.is_finite()),
        true_peak_db: Some(levels.true_peak_db).filter(|t| t.is_finite()),
    };

    // Pure silence normalizes to itself regardless of method
    if !levels.peak_db.is_finite() {
        return Preview {
            method: method.label(),
            before,
            after: before,
            gain_db: 0.0,
            problem_spots: 0,
        };
    }

    let gain_db = match dynamic {
        Some(analysis) => analysis.average_gain_db(),
        None => 20.0 * (required_gain as f64).log10(),
    };

    let after = match *method {
        NormalizationMethod::Peak { target_db } => LevelSnapshot {
            peak_db: target_db as f64,
            rms_db: before.rms_db + gain_db,
            lufs: before.lufs.map(|l| l + gain_db),
            true_peak_db: before.true_peak_db.map(|t| t + gain_db),
        },
        NormalizationMethod::Rms { target_db } => LevelSnapshot {
            peak_db: before.peak_db + gain_db,
            rms_db: target_db as f64,
            lufs: before.lufs.map(|l| l + gain_db),
            true_peak_db: before.true_peak_db.map(|t| t + gain_db),
        },
        NormalizationMethod::Lufs {
            target_lufs,
            true_peak_limit_db,
        } => LevelSnapshot {
            peak_db: before.peak_db + gain_db,
            rms_db: before.rms_db + gain_db,
            lufs: before.lufs.map(|_| target_lufs as f64),
            true_peak_db: before
                .true_peak_db
                .map(|t| (t + gain_db).min(true_peak_limit_db as f64)),
        },
        NormalizationMethod::Dynamic { config } => LevelSnapshot {
            peak_db: before.peak_db + gain_db,
            rms_db: config.target_rms_db as f64,
            lufs: None,
            true_peak_db: None,
        },
    };

    Preview {
        method: method.label(),
        before,
        after,
        gain_db,
        problem_spots: dynamic.map_or(0, |a| a.problem_spots.len()),
    }
}
