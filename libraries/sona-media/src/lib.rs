//! Sona media adapter
//!
//! Bridges files and the pure DSP engine in `sona-dsp`:
//! - Decode any supported container to interleaved f32 via Symphonia
//! - Re-encode as WAV (f32 or i16) via hound while applying the solved
//!   gain or gain envelope
//! - An async normalize-file operation with progress reporting and
//!   chunk-boundary cancellation
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌───────────────┐   ┌───────────┐
//! │ input file│──►│ decode_file │──►│ sona_dsp      │──►│ WavEncoder│
//! └───────────┘   └─────────────┘   │ analyze+gain  │   └───────────┘
//!                                   └───────────────┘
//! ```

#![deny(unsafe_code)]

mod decode;
mod encode;
mod error;
mod normalize;

pub use decode::decode_file;
pub use encode::{AudioSink, WavEncoder, WavSampleFormat};
pub use error::{MediaError, Result};
pub use normalize::{FileNormalizer, NormalizeOptions};
