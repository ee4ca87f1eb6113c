//! Capability adapters for the external services a call depends on:
//! telephony control and media, streaming speech recognition, chat
//! completion, and speech synthesis.
//!
//! Each adapter exposes a small trait so the engine can be driven by
//! scripted implementations in tests; the concrete types here speak the
//! vendors' documented wire formats.

pub mod asr;
pub mod llm;
pub mod telephony;
pub mod tts;

pub use asr::{classify_turn, AsrClient, AsrEvent, AsrHandle, SpeechRecognizer};
pub use llm::{LanguageModel, LlmClient};
pub use telephony::{
    answer_directive, clear_frame, error_directive, media_frame, send_frames, CallControl,
    InboundMedia, MediaFrameOut, TelephonyClient, TelephonyConfig,
};
pub use tts::{SpeechSynthesizer, TtsClient, WARMUP_PHRASES};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("telephony error: {0}")]
    Telephony(String),

    #[error("speech recognition error: {0}")]
    Asr(String),

    #[error("language model error: {0}")]
    Llm(String),

    #[error("speech synthesis error: {0}")]
    Tts(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Audio(#[from] outcall_audio::AudioError),
}
