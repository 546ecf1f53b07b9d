//! File normalization: decode, analyze, re-encode with gain
//!
//! The async wrapper around the synchronous DSP core. Its only suspension
//! points are the sink's back-pressure yields; the decode and analysis
//! passes run to completion in-call. Cancellation is honoured at chunk
//! boundaries of the re-encode loop; a cancelled run leaves the partial
//! output file for the caller to delete.

use crate::decode::decode_file;
use crate::encode::{AudioSink, WavEncoder, WavSampleFormat};
use crate::error::{MediaError, Result};
use sona_dsp::{
    analyze_with_progress, apply_envelope_gain_at, apply_scalar_gain, AudioAnalysis, AudioBuffer,
    NormalizationMethod,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How long to yield when the sink reports it cannot accept a chunk
const SINK_BACKOFF: Duration = Duration::from_millis(10);

/// Options for a normalization run
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// The normalization method to solve and apply
    pub method: NormalizationMethod,
    /// Output sample format
    pub output_format: WavSampleFormat,
    /// Frames per re-encode chunk; cancellation and back-pressure are
    /// checked at these boundaries
    pub chunk_frames: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            method: NormalizationMethod::default(),
            output_format: WavSampleFormat::Float32,
            chunk_frames: 8_192,
        }
    }
}

/// One-file normalization job
///
/// # Example
///
/// ```ignore
/// use sona_media::{FileNormalizer, NormalizeOptions};
/// use sona_dsp::NormalizationMethod;
///
/// let normalizer = FileNormalizer::new(NormalizeOptions {
///     method: NormalizationMethod::lufs(-14.0),
///     ..NormalizeOptions::default()
/// });
/// let analysis = normalizer.run(&input, &output).await?;
/// println!("Applied {:.2} dB", analysis.preview.gain_db);
/// ```
pub struct FileNormalizer {
    options: NormalizeOptions,
    cancel: Arc<AtomicBool>,
}

impl FileNormalizer {
    /// Create a job with the given options
    pub fn new(options: NormalizeOptions) -> Self {
        Self {
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that cancels the job at the next chunk boundary
    ///
    /// The analysis pass is not internally cancellable; a flag raised
    /// during it takes effect when the re-encode loop starts.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Normalize `input` into a WAV file at `output`
    pub async fn run(&self, input: &Path, output: &Path) -> Result<AudioAnalysis> {
        self.run_with_progress(input, output, |_| {}).await
    }

    /// [`FileNormalizer::run`] with a progress callback receiving a
    /// monotone fraction in [0, 1] across decode, analysis and re-encode
    pub async fn run_with_progress(
        &self,
        input: &Path,
        output: &Path,
        mut progress: impl FnMut(f32),
    ) -> Result<AudioAnalysis> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(MediaError::Cancelled);
        }

        progress(0.0);
        let mut buffer = decode_file(input)?;
        progress(0.1);

        let analysis =
            analyze_with_progress(&buffer, &self.options.method, |f| progress(0.1 + 0.4 * f))?;

        let sink = WavEncoder::create(
            output,
            buffer.format.sample_rate.as_hz(),
            buffer.format.channels,
            self.options.output_format,
        )?;
        self.write_normalized(Box::new(sink), &mut buffer, &analysis, |f| {
            progress(0.5 + 0.5 * f)
        })
        .await?;

        info!(
            input = %input.display(),
            output = %output.display(),
            method = analysis.preview.method,
            gain_db = analysis.preview.gain_db,
            "normalized file"
        );
        Ok(analysis)
    }

    /// Apply the solved gain to the buffer chunk by chunk and stream it
    /// into a sink
    ///
    /// The buffer is rewritten in place as it is written out. Public so
    /// callers with their own sink (or already-decoded audio) can reuse
    /// the re-encode loop.
    pub async fn write_normalized(
        &self,
        mut sink: Box<dyn AudioSink>,
        buffer: &mut AudioBuffer,
        analysis: &AudioAnalysis,
        mut progress: impl FnMut(f32),
    ) -> Result<()> {
        let channels = buffer.format.channels as usize;
        let chunk_len = (self.options.chunk_frames.max(1)) * channels;
        let total = buffer.len();

        let mut written = 0usize;
        for chunk in buffer.samples.chunks_mut(chunk_len) {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(MediaError::Cancelled);
            }
            while !sink.ready() {
                tokio::time::sleep(SINK_BACKOFF).await;
            }

            match &analysis.dynamic {
                Some(dynamic) => apply_envelope_gain_at(
                    chunk,
                    written,
                    &dynamic.final_gains,
                    dynamic.frame_samples,
                ),
                None => apply_scalar_gain(chunk, analysis.required_gain),
            }

            sink.write(chunk)?;
            written += chunk.len();
            progress(written as f32 / total as f32);
        }

        sink.finalize()
    }
}
