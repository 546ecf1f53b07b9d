//! Framewise dynamic normalization
//!
//! For material with strongly varying levels (speech, meditation, podcasts)
//! a single scalar gain either leaves quiet passages inaudible or squashes
//! loud ones. The dynamic normalizer instead estimates level per frame,
//! computes a per-frame gain toward the RMS target, smooths the gain
//! sequence with a Gaussian kernel so transitions are inaudible, and caps
//! each frame's gain so its peak stays under the true-peak ceiling.
//!
//! All three envelope stages (raw, smoothed, final) are preserved in the
//! result for diagnostics, together with the frames whose correction was
//! large enough to call out as problem spots.

use crate::error::{DspError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gain magnitude above which a non-silent frame becomes a problem spot, dB
const PROBLEM_SPOT_THRESHOLD_DB: f64 = 6.0;

/// Configuration of the dynamic normalizer
///
/// The default is the voice preset; [`DynamicNormalizerConfig::meditation`]
/// and [`DynamicNormalizerConfig::music`] tune the same knobs for slower or
/// more dynamic material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicNormalizerConfig {
    /// Level each non-silent frame is steered toward, in dBFS
    pub target_rms_db: f32,
    /// Seconds per frame
    pub frame_duration: f32,
    /// Tap count of the Gaussian smoothing kernel (forced odd)
    pub gaussian_size: usize,
    /// Sigma of the smoothing kernel, in frame units
    pub gaussian_sigma: f32,
    /// Upper clamp on the per-frame raw gain, in dB
    pub max_gain_db: f32,
    /// Lower clamp on the per-frame raw gain, in dB
    pub min_gain_db: f32,
    /// Per-frame peak ceiling after gain, in dBTP
    pub true_peak_limit_db: f32,
    /// Frames with RMS below this are pinned to unit gain, in dBFS
    pub silence_threshold_db: f32,
}

impl DynamicNormalizerConfig {
    /// Preset for spoken word: half-second frames, moderate smoothing
    pub fn voice() -> Self {
        Self {
            target_rms_db: -20.0,
            frame_duration: 0.5,
            gaussian_size: 31,
            gaussian_sigma: 7.0,
            max_gain_db: 20.0,
            min_gain_db: -20.0,
            true_peak_limit_db: -1.0,
            silence_threshold_db: -50.0,
        }
    }

    /// Preset for meditation recordings: shorter frames, gentler floor,
    /// generous lift for very quiet passages
    pub fn meditation() -> Self {
        Self {
            target_rms_db: -18.0,
            frame_duration: 0.4,
            gaussian_size: 21,
            gaussian_sigma: 5.0,
            max_gain_db: 24.0,
            min_gain_db: -15.0,
            true_peak_limit_db: -1.0,
            silence_threshold_db: -45.0,
        }
    }

    /// Preset for music: long frames and wide smoothing to preserve
    /// macrodynamics
    pub fn music() -> Self {
        Self {
            target_rms_db: -16.0,
            frame_duration: 1.0,
            gaussian_size: 41,
            gaussian_sigma: 10.0,
            max_gain_db: 12.0,
            min_gain_db: -12.0,
            true_peak_limit_db: -1.0,
            silence_threshold_db: -60.0,
        }
    }

    /// Frames per channel covered by one gain value: round(duration * rate)
    pub fn samples_per_frame(&self, sample_rate: u32) -> usize {
        ((self.frame_duration as f64 * sample_rate as f64).round() as usize).max(1)
    }
}

impl Default for DynamicNormalizerConfig {
    fn default() -> Self {
        Self::voice()
    }
}

/// Level estimate of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLevels {
    /// RMS over the frame's interleaved window, in dBFS; `-inf` for silence
    pub rms_db: f64,
    /// Peak magnitude over the same window, in dBFS; `-inf` for silence
    pub peak_db: f64,
}

/// Whether a problem spot was too quiet or too loud before correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProblemCategory {
    TooQuiet,
    TooLoud,
}

/// A frame whose applied correction exceeded 6 dB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSpot {
    /// Index of the frame in the envelope
    pub frame_index: usize,
    /// Direction of the problem
    pub category: ProblemCategory,
    /// Start of the frame in seconds
    pub time_secs: f64,
    /// RMS level before correction, in dBFS
    pub original_level_db: f64,
    /// Gain that was applied, in dB
    pub gain_db: f64,
    /// RMS level after correction, in dBFS
    pub resulting_level_db: f64,
}

/// Output of one dynamic normalization analysis
#[derive(Debug, Clone)]
pub struct DynamicAnalysis {
    /// The configuration the analysis ran with
    pub config: DynamicNormalizerConfig,
    /// Frames per channel covered by one gain value
    pub samples_per_frame: usize,
    /// Interleaved samples covered by one gain value
    /// (`samples_per_frame` times the channel count)
    pub frame_samples: usize,
    /// Per-frame level estimates
    pub frames: Vec<FrameLevels>,
    /// Gains from the RMS target alone, linear
    pub raw_gains: Vec<f32>,
    /// Gains after Gaussian smoothing, linear
    pub smoothed_gains: Vec<f32>,
    /// Gains after the framewise peak cap, linear; this is the envelope
    /// that gets applied
    pub final_gains: Vec<f32>,
    /// Frames with more than 6 dB of correction, worst first
    pub problem_spots: Vec<ProblemSpot>,
}

impl DynamicAnalysis {
    /// Mean applied gain over non-silent frames, in dB
    ///
    /// Zero when every frame was silent.
    pub fn average_gain_db(&self) -> f64 {
        let threshold = self.config.silence_threshold_db as f64;
        let mut sum = 0.0;
        let mut count = 0usize;
        for (levels, &gain) in self.frames.iter().zip(self.final_gains.iter()) {
            if levels.rms_db.is_finite() && levels.rms_db > threshold {
                sum += 20.0 * (gain as f64).log10();
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}

/// Framewise dynamic normalizer
///
/// # Example
///
/// ```ignore
/// use sona_dsp::{DynamicNormalizer, DynamicNormalizerConfig};
///
/// let normalizer = DynamicNormalizer::new(DynamicNormalizerConfig::voice());
/// let analysis = normalizer.analyze(&samples, 48_000, 2)?;
/// sona_dsp::apply_envelope_gain(&mut samples, &analysis.final_gains, analysis.frame_samples);
/// ```
pub struct DynamicNormalizer {
    config: DynamicNormalizerConfig,
}

impl DynamicNormalizer {
    /// Create a normalizer with the given configuration
    pub fn new(config: DynamicNormalizerConfig) -> Self {
        Self { config }
    }

    /// Analyze an interleaved buffer and produce the gain envelope
    ///
    /// # Errors
    /// Returns an error for an empty buffer, a zero sample rate or channel
    /// count, or a slice length not divisible by the channel count. A buffer
    /// shorter than two frames is not an error: it yields a single-frame
    /// result with unit gain.
    pub fn analyze(&self, samples: &[f32], sample_rate: u32, channels: u16) -> Result<DynamicAnalysis> {
        if sample_rate == 0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(DspError::InvalidChannelCount(channels));
        }
        if samples.is_empty() {
            return Err(DspError::EmptyInput);
        }
        if samples.len() % channels as usize != 0 {
            return Err(DspError::MismatchedSamples {
                samples: samples.len(),
                channels,
            });
        }

        let samples_per_frame = self.config.samples_per_frame(sample_rate);
        let frame_samples = samples_per_frame * channels as usize;

        if samples.len() < 2 * frame_samples {
            // Too short for a meaningful envelope: single frame, unit gain
            let frames = vec![measure_frame(samples)];
            return Ok(DynamicAnalysis {
                config: self.config,
                samples_per_frame,
                frame_samples,
                frames,
                raw_gains: vec![1.0],
                smoothed_gains: vec![1.0],
                final_gains: vec![1.0],
                problem_spots: Vec::new(),
            });
        }

        let frames: Vec<FrameLevels> = samples.chunks(frame_samples).map(measure_frame).collect();
        let raw_gains = self.raw_gains(&frames);
        let smoothed_gains = smooth_gains(
            &raw_gains,
            self.config.gaussian_size,
            self.config.gaussian_sigma as f64,
        );
        let final_gains = self.cap_gains(&frames, &smoothed_gains);
        let problem_spots = self.problem_spots(&frames, &final_gains);

        debug!(
            frames = frames.len(),
            spots = problem_spots.len(),
            "dynamic normalization analyzed"
        );

        Ok(DynamicAnalysis {
            config: self.config,
            samples_per_frame,
            frame_samples,
            frames,
            raw_gains,
            smoothed_gains,
            final_gains,
            problem_spots,
        })
    }

    /// Stage 2: per-frame gain toward the RMS target, clamped; silent
    /// frames are pinned to unit gain
    fn raw_gains(&self, frames: &[FrameLevels]) -> Vec<f32> {
        let target = self.config.target_rms_db as f64;
        let threshold = self.config.silence_threshold_db as f64;
        let max_db = self.config.max_gain_db as f64;
        let min_db = self.config.min_gain_db as f64;

        frames
            .iter()
            .map(|levels| {
                if !levels.rms_db.is_finite() || levels.rms_db < threshold {
                    1.0
                } else {
                    let gain_db = (target - levels.rms_db).clamp(min_db, max_db);
                    10.0_f64.powf(gain_db / 20.0) as f32
                }
            })
            .collect()
    }

    /// Stage 4: lower any gain that would push the frame's peak past the
    /// true-peak ceiling
    fn cap_gains(&self, frames: &[FrameLevels], smoothed: &[f32]) -> Vec<f32> {
        let limit = self.config.true_peak_limit_db as f64;
        frames
            .iter()
            .zip(smoothed.iter())
            .map(|(levels, &gain)| {
                if levels.peak_db.is_finite()
                    && levels.peak_db + 20.0 * (gain as f64).log10() > limit
                {
                    10.0_f64.powf((limit - levels.peak_db) / 20.0) as f32
                } else {
                    gain
                }
            })
            .collect()
    }

    /// Stage 5: collect frames whose applied correction exceeds 6 dB,
    /// ordered worst first
    fn problem_spots(&self, frames: &[FrameLevels], final_gains: &[f32]) -> Vec<ProblemSpot> {
        let threshold = self.config.silence_threshold_db as f64;
        let mut spots: Vec<ProblemSpot> = frames
            .iter()
            .zip(final_gains.iter())
            .enumerate()
            .filter_map(|(index, (levels, &gain))| {
                if !levels.rms_db.is_finite() || levels.rms_db <= threshold {
                    return None;
                }
                let gain_db = 20.0 * (gain as f64).log10();
                if gain_db.abs() <= PROBLEM_SPOT_THRESHOLD_DB {
                    return None;
                }
                Some(ProblemSpot {
                    frame_index: index,
                    category: if gain_db > 0.0 {
                        ProblemCategory::TooQuiet
                    } else {
                        ProblemCategory::TooLoud
                    },
                    time_secs: index as f64 * self.config.frame_duration as f64,
                    original_level_db: levels.rms_db,
                    gain_db,
                    resulting_level_db: levels.rms_db + gain_db,
                })
            })
            .collect();

        spots.sort_by(|a, b| {
            b.gain_db
                .abs()
                .partial_cmp(&a.gain_db.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        spots
    }
}

/// Stage 1: RMS and peak of one interleaved window, channels jointly
fn measure_frame(window: &[f32]) -> FrameLevels {
    let mut sum_sq = 0.0_f64;
    let mut peak = 0.0_f64;
    for &sample in window {
        let value = sample as f64;
        sum_sq += value * value;
        peak = peak.max(value.abs());
    }
    let rms = (sum_sq / window.len() as f64).sqrt();

    FrameLevels {
        rms_db: to_db(rms),
        peak_db: to_db(peak),
    }
}

fn to_db(linear: f64) -> f64 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// Normalized Gaussian kernel; an even size is widened by one tap
fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    let size = if size % 2 == 0 { size + 1 } else { size }.max(1);
    let half = (size / 2) as isize;

    let mut weights: Vec<f64> = (-half..=half)
        .map(|x| (-((x * x) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    for weight in &mut weights {
        *weight /= total;
    }
    weights
}

/// Stage 3: convolve the raw gains with the kernel, mirror-reflecting the
/// sequence at both edges so the output length equals the input length
fn smooth_gains(raw: &[f32], size: usize, sigma: f64) -> Vec<f32> {
    let kernel = gaussian_kernel(size, sigma);
    let half = (kernel.len() / 2) as isize;

    (0..raw.len() as isize)
        .map(|center| {
            let mut acc = 0.0_f64;
            for (tap, &weight) in kernel.iter().enumerate() {
                let index = mirror_index(center + tap as isize - half, raw.len());
                acc += weight * raw[index] as f64;
            }
            acc as f32
        })
        .collect()
}

/// Fold an out-of-range index back into [0, len) by reflecting about the
/// edge samples
fn mirror_index(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let mut index = index;
    loop {
        if index < 0 {
            index = -index;
        } else if index >= len {
            index = 2 * (len - 1) - index;
        } else {
            return index as usize;
        }
    }
}
