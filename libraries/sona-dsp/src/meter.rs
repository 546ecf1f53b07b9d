//! K-weighted gated loudness measurement (ITU-R BS.1770-4 / EBU R128)
//!
//! Audio is K-weighted per channel, cut into 400 ms blocks advancing in
//! 100 ms hops (75 % overlap), and each block's channel-weighted mean square
//! is turned into a block loudness. Integrated loudness applies the two-stage
//! gate (absolute at -70 LUFS, relative at -10 LU below the ungated mean);
//! loudness range applies the EBU Tech 3342 percentile spread.
//!
//! The meter is streaming: feed interleaved chunks with
//! [`LoudnessMeter::add_frames`], then take the measurements with
//! [`LoudnessMeter::finalize`].

use crate::error::{DspError, Result};
use crate::kweight::KWeightChain;
use tracing::debug;

/// The -0.691 LUFS offset from BS.1770-4, compensating the K-weighting
/// chain's gain at 997 Hz.
const LOUDNESS_OFFSET: f64 = -0.691;

/// Absolute gating threshold in LUFS
const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Relative gate offset below the ungated mean, in LU
const RELATIVE_GATE_LU: f64 = 10.0;

/// Relative gate offset for the loudness-range distribution, in LU
const LRA_GATE_LU: f64 = 20.0;

/// Minimum gated block count for a defined loudness range
const LRA_MIN_BLOCKS: usize = 20;

/// Block count of the short-term window (30 hops of 100 ms = 3 s)
const SHORT_TERM_BLOCKS: usize = 30;

/// Floor applied to a block's combined mean square before taking the log
const ENERGY_FLOOR: f64 = 1e-10;

/// Measurements produced by [`LoudnessMeter::finalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessSummary {
    /// Integrated (gated) loudness in LUFS. `-inf` when no block was
    /// measured; the -70 floor when every block fell under the absolute gate.
    pub integrated_lufs: f64,

    /// Maximum short-term (3 s) loudness in LUFS. Absent when the input is
    /// shorter than the short-term window.
    pub short_term_lufs: Option<f64>,

    /// Maximum momentary (400 ms single-block) loudness in LUFS. `-inf` when
    /// no block was measured.
    pub momentary_lufs: f64,

    /// Loudness range in LU. Absent when fewer than 20 blocks survive the
    /// range gate.
    pub loudness_range_lu: Option<f64>,

    /// Number of 400 ms blocks that were measured
    pub block_count: usize,
}

impl LoudnessSummary {
    fn empty() -> Self {
        Self {
            integrated_lufs: f64::NEG_INFINITY,
            short_term_lufs: None,
            momentary_lufs: f64::NEG_INFINITY,
            loudness_range_lu: None,
            block_count: 0,
        }
    }
}

/// Streaming K-weighted loudness meter
///
/// # Example
///
/// ```ignore
/// use sona_dsp::LoudnessMeter;
///
/// let mut meter = LoudnessMeter::new(48_000, 2)?;
/// meter.add_frames(&samples)?;
/// let summary = meter.finalize();
/// println!("Integrated: {:.1} LUFS", summary.integrated_lufs);
/// ```
pub struct LoudnessMeter {
    channels: usize,
    weights: Vec<f64>,
    chain: KWeightChain,
    /// Block length in frames: round(0.4 * sample_rate)
    block_len: usize,
    /// Hop length in frames: round(0.1 * sample_rate)
    hop_len: usize,
    /// Ring of the last `block_len` K-weighted frames, interleaved
    ring: Vec<f64>,
    ring_pos: usize,
    frames_seen: u64,
    block_loudness: Vec<f64>,
}

impl LoudnessMeter {
    /// Create a meter for a sample rate and channel count
    ///
    /// # Errors
    /// Returns an error when the sample rate is zero or the channel count
    /// is zero.
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(DspError::InvalidChannelCount(channels));
        }

        let channels = channels as usize;
        let block_len = (0.4 * sample_rate as f64).round() as usize;
        let hop_len = (0.1 * sample_rate as f64).round() as usize;

        Ok(Self {
            channels,
            weights: channel_weights(channels),
            chain: KWeightChain::new(sample_rate, channels),
            block_len,
            hop_len,
            ring: vec![0.0; block_len * channels],
            ring_pos: 0,
            frames_seen: 0,
            block_loudness: Vec::new(),
        })
    }

    /// Feed interleaved samples
    ///
    /// # Errors
    /// Returns an error when the slice length is not divisible by the
    /// channel count.
    pub fn add_frames(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        if samples.len() % self.channels != 0 {
            return Err(DspError::MismatchedSamples {
                samples: samples.len(),
                channels: self.channels as u16,
            });
        }

        for frame in samples.chunks_exact(self.channels) {
            let base = self.ring_pos * self.channels;
            for (channel, &sample) in frame.iter().enumerate() {
                self.ring[base + channel] = self.chain.process_sample(channel, sample as f64);
            }
            self.ring_pos = (self.ring_pos + 1) % self.block_len;
            self.frames_seen += 1;

            let filled = self.frames_seen >= self.block_len as u64;
            if filled && (self.frames_seen - self.block_len as u64) % self.hop_len as u64 == 0 {
                self.emit_block();
            }
        }

        Ok(())
    }

    /// Combine the current ring contents into one block loudness
    fn emit_block(&mut self) {
        let mut combined = 0.0;
        for (channel, &weight) in self.weights.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            let mut sum_sq = 0.0;
            let mut index = channel;
            while index < self.ring.len() {
                let value = self.ring[index];
                sum_sq += value * value;
                index += self.channels;
            }
            combined += weight * (sum_sq / self.block_len as f64);
        }

        let loudness = LOUDNESS_OFFSET + 10.0 * combined.max(ENERGY_FLOOR).log10();
        self.block_loudness.push(loudness);
    }

    /// Finish the measurement and compute the summary
    ///
    /// Never fails: an empty or all-silent input yields `-inf` / absent
    /// metrics rather than an error.
    pub fn finalize(self) -> LoudnessSummary {
        let blocks = &self.block_loudness;
        if blocks.is_empty() {
            return LoudnessSummary::empty();
        }

        let momentary_lufs = blocks.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let integrated_lufs = gated_loudness(blocks);
        let short_term_lufs = max_short_term(blocks);
        let loudness_range_lu = loudness_range(blocks, integrated_lufs);

        debug!(
            blocks = blocks.len(),
            integrated_lufs, momentary_lufs, "loudness measurement complete"
        );

        LoudnessSummary {
            integrated_lufs,
            short_term_lufs,
            momentary_lufs,
            loudness_range_lu,
            block_count: blocks.len(),
        }
    }
}

/// BS.1770-4 channel weights by channel count
///
/// The 5.1 layout weights the surrounds at 1.41 and mutes LFE; unknown
/// layouts fall back to unity on every channel.
fn channel_weights(channels: usize) -> Vec<f64> {
    match channels {
        6 => vec![1.0, 1.0, 1.0, 0.0, 1.41, 1.41],
        n => vec![1.0; n],
    }
}

#[inline]
fn energy(loudness: f64) -> f64 {
    10.0_f64.powf(loudness / 10.0)
}

#[inline]
fn loudness_of_mean_energy(mean: f64) -> f64 {
    10.0 * mean.log10()
}

/// Two-stage gated integrated loudness over a block series
fn gated_loudness(blocks: &[f64]) -> f64 {
    // Absolute gate
    let above_absolute: Vec<f64> = blocks
        .iter()
        .copied()
        .filter(|&l| l > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_absolute.is_empty() {
        return ABSOLUTE_GATE_LUFS;
    }

    // Relative gate at -10 LU below the ungated mean
    let ungated_mean =
        above_absolute.iter().map(|&l| energy(l)).sum::<f64>() / above_absolute.len() as f64;
    let relative_gate = loudness_of_mean_energy(ungated_mean) - RELATIVE_GATE_LU;

    let gated: Vec<f64> = above_absolute
        .iter()
        .copied()
        .filter(|&l| l > relative_gate)
        .collect();
    if gated.is_empty() {
        return loudness_of_mean_energy(ungated_mean);
    }

    let gated_mean = gated.iter().map(|&l| energy(l)).sum::<f64>() / gated.len() as f64;
    loudness_of_mean_energy(gated_mean)
}

/// Maximum 3 s (30-block) windowed loudness, absent below 30 blocks
fn max_short_term(blocks: &[f64]) -> Option<f64> {
    if blocks.len() < SHORT_TERM_BLOCKS {
        return None;
    }
    let max_mean = blocks
        .windows(SHORT_TERM_BLOCKS)
        .map(|window| window.iter().map(|&l| energy(l)).sum::<f64>() / SHORT_TERM_BLOCKS as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    Some(loudness_of_mean_energy(max_mean))
}

/// EBU Tech 3342 loudness range: 10th to 95th percentile of the block
/// distribution gated at -20 LU below integrated
fn loudness_range(blocks: &[f64], integrated_lufs: f64) -> Option<f64> {
    let gate = integrated_lufs - LRA_GATE_LU;
    let mut gated: Vec<f64> = blocks
        .iter()
        .copied()
        .filter(|&l| l > ABSOLUTE_GATE_LUFS && l > gate)
        .collect();
    if gated.len() < LRA_MIN_BLOCKS {
        return None;
    }

    gated.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = gated.len() as f64;
    let low = gated[(n * 0.10).floor() as usize];
    let high = gated[(n * 0.95).floor() as usize];
    Some(high - low)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(sample_rate: u32, channels: usize, frequency: f32, amplitude: f32, secs: f32) -> Vec<f32> {
        let frames = (sample_rate as f32 * secs) as usize;
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let s = amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin();
            for _ in 0..channels {
                samples.push(s);
            }
        }
        samples
    }

    #[test]
    fn meter_rejects_bad_parameters() {
        assert!(LoudnessMeter::new(0, 2).is_err());
        assert!(LoudnessMeter::new(48_000, 0).is_err());
        assert!(LoudnessMeter::new(48_000, 2).is_ok());
    }

    #[test]
    fn mismatched_chunk_is_rejected() {
        let mut meter = LoudnessMeter::new(48_000, 2).unwrap();
        assert!(meter.add_frames(&[0.1, 0.2, 0.3]).is_err());
    }

    #[test]
    fn empty_input_reports_negative_infinity() {
        let meter = LoudnessMeter::new(48_000, 2).unwrap();
        let summary = meter.finalize();
        assert!(summary.integrated_lufs.is_infinite());
        assert!(summary.momentary_lufs.is_infinite());
        assert!(summary.short_term_lufs.is_none());
        assert!(summary.loudness_range_lu.is_none());
        assert_eq!(summary.block_count, 0);
    }

    #[test]
    fn silence_hits_the_absolute_gate_floor() {
        let mut meter = LoudnessMeter::new(48_000, 2).unwrap();
        meter.add_frames(&vec![0.0; 48_000 * 2 * 2]).unwrap();
        let summary = meter.finalize();
        assert_eq!(summary.integrated_lufs, -70.0);
        assert!(summary.loudness_range_lu.is_none());
    }

    #[test]
    fn mono_sine_integrated_matches_reference() {
        // 997 Hz at amplitude 0.5: mean square 0.125 -> -9.03 LUFS after the
        // offset cancels the K-weighting gain at that frequency.
        let mut meter = LoudnessMeter::new(48_000, 1).unwrap();
        meter.add_frames(&sine(48_000, 1, 997.0, 0.5, 4.0)).unwrap();
        let summary = meter.finalize();
        assert!(
            (summary.integrated_lufs - (-9.03)).abs() < 0.2,
            "integrated {:.2} LUFS, expected about -9.03",
            summary.integrated_lufs
        );
    }

    #[test]
    fn stereo_doubles_the_energy() {
        let mut mono = LoudnessMeter::new(48_000, 1).unwrap();
        mono.add_frames(&sine(48_000, 1, 997.0, 0.25, 4.0)).unwrap();
        let mono_lufs = mono.finalize().integrated_lufs;

        let mut stereo = LoudnessMeter::new(48_000, 2).unwrap();
        stereo
            .add_frames(&sine(48_000, 2, 997.0, 0.25, 4.0))
            .unwrap();
        let stereo_lufs = stereo.finalize().integrated_lufs;

        // Two identical channels contribute twice the weighted energy: +3 dB
        assert!(
            (stereo_lufs - mono_lufs - 3.01).abs() < 0.1,
            "mono {:.2}, stereo {:.2}",
            mono_lufs,
            stereo_lufs
        );
    }

    #[test]
    fn short_term_absent_below_three_seconds() {
        let mut meter = LoudnessMeter::new(48_000, 1).unwrap();
        meter.add_frames(&sine(48_000, 1, 997.0, 0.5, 2.0)).unwrap();
        let summary = meter.finalize();
        assert!(summary.short_term_lufs.is_none());
    }

    #[test]
    fn short_term_at_least_integrated_for_steady_tone() {
        let mut meter = LoudnessMeter::new(48_000, 1).unwrap();
        meter.add_frames(&sine(48_000, 1, 997.0, 0.5, 5.0)).unwrap();
        let summary = meter.finalize();
        let short_term = summary.short_term_lufs.unwrap();
        assert!(
            short_term >= summary.integrated_lufs - 0.01,
            "short-term {:.2} below integrated {:.2}",
            short_term,
            summary.integrated_lufs
        );
    }

    #[test]
    fn chunked_feeding_matches_single_pass() {
        let samples = sine(48_000, 2, 440.0, 0.3, 3.0);

        let mut whole = LoudnessMeter::new(48_000, 2).unwrap();
        whole.add_frames(&samples).unwrap();
        let a = whole.finalize();

        let mut chunked = LoudnessMeter::new(48_000, 2).unwrap();
        for chunk in samples.chunks(1_024 * 2) {
            chunked.add_frames(chunk).unwrap();
        }
        let b = chunked.finalize();

        assert_eq!(a.block_count, b.block_count);
        assert!((a.integrated_lufs - b.integrated_lufs).abs() < 1e-9);
    }

    #[test]
    fn quiet_passages_are_gated_out() {
        // 4 s of tone then 4 s of near-silence: gating keeps the integrated
        // loudness near the tone's own level.
        let mut tone_only = LoudnessMeter::new(48_000, 1).unwrap();
        tone_only
            .add_frames(&sine(48_000, 1, 997.0, 0.3, 4.0))
            .unwrap();
        let reference = tone_only.finalize().integrated_lufs;

        let mut gated = LoudnessMeter::new(48_000, 1).unwrap();
        gated.add_frames(&sine(48_000, 1, 997.0, 0.3, 4.0)).unwrap();
        gated
            .add_frames(&sine(48_000, 1, 997.0, 0.0001, 4.0))
            .unwrap();
        let measured = gated.finalize().integrated_lufs;

        assert!(
            (measured - reference).abs() < 0.5,
            "gated {:.2} drifted from reference {:.2}",
            measured,
            reference
        );
    }

    #[test]
    fn lfe_channel_is_ignored_in_five_one() {
        // Signal only on the LFE channel of a 5.1 stream
        let frames = 48_000 * 2;
        let mut samples = vec![0.0_f32; frames * 6];
        for frame in 0..frames {
            let t = frame as f32 / 48_000.0;
            samples[frame * 6 + 3] = 0.5 * (2.0 * std::f32::consts::PI * 60.0 * t).sin();
        }

        let mut meter = LoudnessMeter::new(48_000, 6).unwrap();
        meter.add_frames(&samples).unwrap();
        let summary = meter.finalize();
        assert_eq!(summary.integrated_lufs, -70.0);
    }
}
