//! Observer stream wire protocol.
//!
//! Every message pushed to an observer WebSocket is one of these
//! variants, serialized as a single JSON object with a `type` tag.

use crate::{AnalyticsSnapshot, CallEndReason, SentimentLabel, TranscriptEntry};
use serde::{Deserialize, Serialize};

/// Coarse live activity indicator relayed while the call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    Connected,
    Thinking,
    Speaking,
    Listening,
}

/// A message on the observer stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObserverEvent {
    /// Snapshot pushed immediately on observer connect.
    #[serde(rename = "session_state")]
    SessionState {
        status: String,
        transcript: Vec<TranscriptEntry>,
        #[serde(rename = "messageCount")]
        message_count: usize,
    },
    #[serde(rename = "status")]
    Status { value: LiveStatus },
    #[serde(rename = "user_speech_interim")]
    UserSpeechInterim { text: String },
    #[serde(rename = "user_speech")]
    UserSpeech {
        text: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    #[serde(rename = "michael_speech")]
    MichaelSpeech {
        text: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    #[serde(rename = "sentiment_update")]
    SentimentUpdate { score: f32, label: SentimentLabel },
    #[serde(rename = "barge_in")]
    BargeIn { count: u32 },
    #[serde(rename = "gatekeeper_detected")]
    GatekeeperDetected,
    #[serde(rename = "gatekeeper_navigated")]
    GatekeeperNavigated,
    #[serde(rename = "callback_requested")]
    CallbackRequested,
    #[serde(rename = "voicemail_detected")]
    VoicemailDetected {
        #[serde(rename = "answeredBy")]
        answered_by: String,
    },
    #[serde(rename = "opt_out_detected")]
    OptOutDetected,
    #[serde(rename = "language_detected")]
    LanguageDetected { language: String },
    #[serde(rename = "meeting_booked")]
    MeetingBooked { message: String },
    #[serde(rename = "call_ended")]
    CallEnded {
        reason: CallEndReason,
        transcript: Vec<TranscriptEntry>,
        duration: u64,
        scoring: AnalyticsSnapshot,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ObserverEvent {
    pub fn user_speech(text: impl Into<String>) -> Self {
        Self::UserSpeech {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn michael_speech(text: impl Into<String>) -> Self {
        Self::MichaelSpeech {
            text: text.into(),
            is_final: true,
        }
    }
}
