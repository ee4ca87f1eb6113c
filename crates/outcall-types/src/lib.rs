//! Shared domain and wire types for the outcall platform.
//!
//! These types cross crate boundaries: the engine mutates them, the
//! adapters produce them, and the server serializes them onto the
//! observer stream. Keeping them here avoids dependency cycles between
//! the engine and the control plane.

pub mod call;
pub mod event;
pub mod scoring;

pub use call::{CallEndReason, CallStatus, OperatorProfile, Tone};
pub use event::{LiveStatus, ObserverEvent};
pub use scoring::{AnalyticsSnapshot, BantChecklist, SentimentLabel, SentimentPoint, TurnStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker role in the conversation history sent to the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
}

impl Role {
    /// Display label used in the observer transcript.
    pub fn speaker_label(self) -> &'static str {
        match self {
            Self::Assistant => "Michael",
            Self::User => "Prospect",
        }
    }
}

/// One turn of the conversation history. Append-only during a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }
}

/// A display transcript line. Mirrors the history plus entries that never
/// reach the language model (the voicemail line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Set on the voicemail line so the debrief UI can annotate it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub voicemail: bool,
}

impl TranscriptEntry {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            timestamp: Utc::now(),
            voicemail: false,
        }
    }

    pub fn voicemail(text: impl Into<String>) -> Self {
        Self {
            speaker: Role::Assistant.speaker_label().to_string(),
            text: text.into(),
            timestamp: Utc::now(),
            voicemail: true,
        }
    }
}

/// Counts whitespace-separated tokens, the unit used by the per-role word
/// counters.
pub fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
