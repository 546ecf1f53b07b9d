//! WAV output for normalized audio
//!
//! The engine hands back interleaved f32; the sink trait is the seam the
//! re-encode loop writes through, so tests (and future container writers)
//! can stand in for the WAV writer.

use crate::error::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

/// Output sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavSampleFormat {
    /// 32-bit float, bit-transparent for the engine's output
    #[default]
    Float32,
    /// 16-bit integer, clamped to full scale
    Int16,
}

/// Destination for normalized interleaved audio
///
/// `ready` lets a slow destination exert back-pressure: the re-encode loop
/// polls it and yields briefly while it reports false.
pub trait AudioSink {
    /// Whether the sink can accept a chunk right now
    fn ready(&self) -> bool;

    /// Write one interleaved chunk
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Flush and close the sink
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// WAV file sink backed by hound
pub struct WavEncoder {
    writer: WavWriter<BufWriter<File>>,
    format: WavSampleFormat,
}

impl WavEncoder {
    /// Create the output file and write its header
    pub fn create(
        path: &Path,
        sample_rate: u32,
        channels: u16,
        format: WavSampleFormat,
    ) -> Result<Self> {
        let spec = match format {
            WavSampleFormat::Float32 => WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
            WavSampleFormat::Int16 => WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        };
        let writer = WavWriter::create(path, spec)?;
        debug!(path = %path.display(), ?format, "created output file");
        Ok(Self { writer, format })
    }
}

impl AudioSink for WavEncoder {
    fn ready(&self) -> bool {
        // hound writes synchronously; the file is always ready
        true
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        match self.format {
            WavSampleFormat::Float32 => {
                for &sample in samples {
                    self.writer.write_sample(sample)?;
                }
            }
            WavSampleFormat::Int16 => {
                for &sample in samples {
                    let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                    self.writer.write_sample(value)?;
                }
            }
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}
