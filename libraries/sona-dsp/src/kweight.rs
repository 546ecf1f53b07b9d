//! BS.1770-4 K-weighting filter design
//!
//! Two biquads in series: a high shelf modelling the acoustic effect of the
//! head ("pre-filter") followed by a revised low-frequency B-curve high pass
//! ("RLB"). Coefficients are derived for the stream's sample rate with the
//! bilinear transform; the analog prototype constants come from ITU-R
//! BS.1770-4 Annex 1.

use crate::biquad::{Biquad, BiquadCoeffs};

/// Pre-filter (stage 1) center frequency in Hz
const PRE_F0: f64 = 1_681.974_450_955_533;
/// Pre-filter Q
const PRE_Q: f64 = 0.707_175_236_955_419_6;
/// Pre-filter shelf gain in dB
const PRE_GAIN_DB: f64 = 3.999_843_853_973_347;
/// Exponent relating the shelf band gain Vb to the plateau gain Vh
const PRE_VB_EXP: f64 = 0.499_666_774_154_541_6;

/// RLB high-pass (stage 2) corner frequency in Hz
const RLB_F0: f64 = 38.135_470_876_024_44;
/// RLB Q
const RLB_Q: f64 = 0.500_327_037_323_877_3;

/// The K-weighting coefficient pair for one sample rate
#[derive(Debug, Clone, Copy)]
pub struct KWeighting {
    /// Stage 1: high shelf pre-filter
    pub pre_filter: BiquadCoeffs,
    /// Stage 2: RLB high pass
    pub rlb_filter: BiquadCoeffs,
}

impl KWeighting {
    /// Design the two-stage K-weighting for the given sample rate
    pub fn design(sample_rate: u32) -> Self {
        let fs = sample_rate as f64;

        // Stage 1: high shelf
        let k = (std::f64::consts::PI * PRE_F0 / fs).tan();
        let vh = 10.0_f64.powf(PRE_GAIN_DB / 20.0);
        let vb = vh.powf(PRE_VB_EXP);
        let a0 = 1.0 + k / PRE_Q + k * k;
        let pre_filter = BiquadCoeffs {
            b0: (vh + vb * k / PRE_Q + k * k) / a0,
            b1: 2.0 * (k * k - vh) / a0,
            b2: (vh - vb * k / PRE_Q + k * k) / a0,
            a1: 2.0 * (k * k - 1.0) / a0,
            a2: (1.0 - k / PRE_Q + k * k) / a0,
        };

        // Stage 2: RLB high pass
        let k = (std::f64::consts::PI * RLB_F0 / fs).tan();
        let a0 = 1.0 + k / RLB_Q + k * k;
        let rlb_filter = BiquadCoeffs {
            b0: 1.0 / a0,
            b1: -2.0 / a0,
            b2: 1.0 / a0,
            a1: 2.0 * (k * k - 1.0) / a0,
            a2: (1.0 - k / RLB_Q + k * k) / a0,
        };

        Self {
            pre_filter,
            rlb_filter,
        }
    }
}

/// Stateful two-stage K-weighting chain for an interleaved stream
#[derive(Debug, Clone)]
pub struct KWeightChain {
    pre: Biquad,
    rlb: Biquad,
}

impl KWeightChain {
    /// Build the chain for a sample rate and channel count
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let design = KWeighting::design(sample_rate);
        Self {
            pre: Biquad::new(design.pre_filter, channels),
            rlb: Biquad::new(design.rlb_filter, channels),
        }
    }

    /// Weight a single sample on one channel
    #[inline(always)]
    pub fn process_sample(&mut self, channel: usize, x: f64) -> f64 {
        self.rlb
            .process_sample(channel, self.pre.process_sample(channel, x))
    }

    /// Clear the state of both stages
    pub fn reset(&mut self) {
        self.pre.reset();
        self.rlb.reset();
    }
}
