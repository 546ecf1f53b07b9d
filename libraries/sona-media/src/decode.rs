//! Audio decoding via Symphonia
//!
//! Turns a media file into the engine's working form: one interleaved f32
//! buffer with a known sample rate and channel count. Supports whatever the
//! enabled Symphonia codecs support (WAV, FLAC, OGG/Vorbis, MP3, AAC).

use crate::error::{MediaError, Result};
use sona_dsp::{AudioBuffer, AudioFormat, SampleRate};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode a whole file into an interleaved f32 buffer
///
/// All source sample formats are converted to f32; channel layout and
/// sample rate are taken from the stream and preserved.
///
/// # Errors
/// Returns an error when the file is missing, no track can be decoded, or
/// the stream is corrupt beyond Symphonia's ability to resynchronize.
pub fn decode_file(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.display().to_string()));
    }

    let file = std::fs::File::open(path)?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| MediaError::UnsupportedFormat(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::UnsupportedFormat("no decodable audio track".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut stream_spec = None;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(MediaError::DecodeFailed(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A malformed packet is recoverable; resync on the next one
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = %e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(MediaError::DecodeFailed(e.to_string())),
        };

        let spec = *decoded.spec();
        if stream_spec.is_none() {
            stream_spec = Some(spec);
        }

        // (Re)allocate the staging buffer when a packet needs more room
        let needed = decoded.capacity() * spec.channels.count();
        let grow = sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < needed);
        if grow {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let spec =
        stream_spec.ok_or_else(|| MediaError::DecodeFailed("stream held no audio".to_string()))?;
    let channels = spec.channels.count() as u16;

    debug!(
        path = %path.display(),
        sample_rate = spec.rate,
        channels,
        samples = samples.len(),
        "decoded file"
    );

    Ok(AudioBuffer::new(
        samples,
        AudioFormat::new(SampleRate::new(spec.rate), channels),
    ))
}
