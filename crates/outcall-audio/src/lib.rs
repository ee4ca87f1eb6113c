//! Telephony audio primitives.
//!
//! Everything the engine needs to move sound: the G.711 µ-law codec and
//! 20 ms framing used on the carrier wire, an asynchronous transcoder
//! that converts compressed synthesis output to the wire format, and a
//! bounded, time-expiring cache of pre-encoded phrases.

pub mod cache;
pub mod mulaw;
pub mod transcode;

pub use cache::ResponseCache;
pub use mulaw::{decode_mulaw, encode_pcm16, frame, playback_seconds, FRAME_BYTES, SAMPLE_RATE};
pub use transcode::Transcoder;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("transcode timed out after {0} seconds")]
    TranscodeTimeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
