//! Per-call session state.
//!
//! A [`Session`] is shared by reference between the orchestrator (the
//! only writer), the control plane (introspection reads), and the media
//! socket (event enqueue + audio forwarding). Mutable state sits behind
//! one lock that the orchestrator holds only for short, non-await
//! sections.

use crate::orchestrator::SessionEvent;
use chrono::{DateTime, Utc};
use outcall_adapters::MediaFrameOut;
use outcall_types::{
    word_count, AnalyticsSnapshot, CallEndReason, CallStatus, ChatMessage, ObserverEvent,
    OperatorProfile, Role, SentimentLabel, SentimentPoint, TranscriptEntry,
};
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};

/// Boolean call-state flags. See the engine docs for which component
/// flips each one; only the orchestrator writes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionFlags {
    /// Assistant audio is currently being enqueued to telephony. While
    /// set, prospect speech is treated as a barge-in.
    pub speaking: bool,
    /// Guards duplicate media `start` events: exactly one opening.
    pub opening_sent: bool,
    /// Suppresses response generation while the opening plays.
    pub opening_cooldown: bool,
    /// The cooldown was already cleared (by estimate or safety ceiling).
    pub cooldown_cleared: bool,
    pub gatekeeper: bool,
    pub gatekeeper_navigated: bool,
    pub voicemail: bool,
    /// The voicemail message was generated; it plays exactly once.
    pub voicemail_handled: bool,
    pub non_english: bool,
    /// The English-only apology was already delivered.
    pub non_english_handled: bool,
    pub callback_requested: bool,
    pub meeting_booked: bool,
    pub opt_out: bool,
}

/// Mutable session state, guarded by the session lock.
#[derive(Debug)]
pub struct SessionState {
    pub status: CallStatus,
    pub call_sid: Option<String>,
    pub stream_sid: Option<String>,
    pub history: Vec<ChatMessage>,
    pub transcript: Vec<TranscriptEntry>,
    pub flags: SessionFlags,
    pub michael_words: u64,
    pub prospect_words: u64,
    pub barge_ins: u32,
    pub objections: u32,
    pub bant: outcall_types::BantChecklist,
    pub sentiment_score: f32,
    pub sentiment_history: Vec<SentimentPoint>,
    pub callback_time: Option<String>,
    pub detected_language: Option<String>,
    /// Consecutive non-English finals; the short-circuit needs two.
    pub non_english_streak: u8,
    pub duration_secs: u64,
    pub end_reason: Option<CallEndReason>,
    /// Set once, at the first terminal transition; drives purge timing.
    pub terminal_at: Option<Instant>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: CallStatus::Pending,
            call_sid: None,
            stream_sid: None,
            history: Vec::new(),
            transcript: Vec::new(),
            flags: SessionFlags::default(),
            michael_words: 0,
            prospect_words: 0,
            barge_ins: 0,
            objections: 0,
            bant: outcall_types::BantChecklist::default(),
            sentiment_score: 0.0,
            sentiment_history: Vec::new(),
            callback_time: None,
            detected_language: None,
            non_english_streak: 0,
            duration_secs: 0,
            end_reason: None,
            terminal_at: None,
        }
    }
}

impl SessionState {
    /// Appends an assistant turn to history and transcript, updating the
    /// word counter. History and transcript always move together.
    pub fn append_assistant(&mut self, text: &str) {
        self.michael_words += word_count(text);
        self.history.push(ChatMessage::assistant(text));
        self.transcript
            .push(TranscriptEntry::new(Role::Assistant.speaker_label(), text));
    }

    /// Appends a user turn to history and transcript.
    pub fn append_user(&mut self, text: &str) {
        self.prospect_words += word_count(text);
        self.history.push(ChatMessage::user(text));
        self.transcript
            .push(TranscriptEntry::new(Role::User.speaker_label(), text));
    }

    /// Appends the voicemail line: an assistant history turn plus a
    /// transcript entry annotated as voicemail.
    pub fn append_voicemail(&mut self, text: &str) {
        self.michael_words += word_count(text);
        self.history.push(ChatMessage::assistant(text));
        self.transcript.push(TranscriptEntry::voicemail(text));
    }

    /// The most recent user turn, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.as_str())
    }

    /// The most recent assistant turn, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.text.as_str())
    }

    pub fn sentiment_label(&self) -> SentimentLabel {
        SentimentLabel::from_score(self.sentiment_score)
    }

    pub fn is_terminal(&self) -> bool {
        self.end_reason.is_some() || self.status.is_terminal()
    }

    /// Scoring snapshot for `call_ended` and introspection.
    pub fn analytics(&self) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            michael_words: self.michael_words,
            prospect_words: self.prospect_words,
            barge_ins: self.barge_ins,
            objections: self.objections,
            bant: self.bant,
            bant_depth: self.bant.depth(),
            sentiment_score: self.sentiment_score,
            sentiment_label: (!self.sentiment_history.is_empty()).then(|| self.sentiment_label()),
            sentiment_history: self.sentiment_history.clone(),
            gatekeeper: self.flags.gatekeeper,
            gatekeeper_navigated: self.flags.gatekeeper_navigated,
            callback_requested: self.flags.callback_requested,
            callback_time: self.callback_time.clone(),
            meeting_booked: self.flags.meeting_booked,
            opt_out: self.flags.opt_out,
            voicemail: self.flags.voicemail,
        }
    }

    /// Snapshot pushed to an observer on connect.
    pub fn snapshot_event(&self) -> ObserverEvent {
        ObserverEvent::SessionState {
            status: self.status.as_str().to_string(),
            transcript: self.transcript.clone(),
            message_count: self.history.len(),
        }
    }
}

/// One call: identity, immutable inputs, mutable state, and the channels
/// other components use to reach its orchestrator.
pub struct Session {
    pub id: String,
    pub profile: OperatorProfile,
    pub created_at: DateTime<Utc>,
    pub state: RwLock<SessionState>,
    /// Event queue into the orchestrator task.
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Inbound µ-law frames toward the recognition forwarder.
    audio_in: mpsc::UnboundedSender<Vec<u8>>,
    /// Outbound media envelopes toward the carrier socket, present while
    /// the media channel is open.
    pub media_out: RwLock<Option<mpsc::UnboundedSender<MediaFrameOut>>>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        profile: OperatorProfile,
        events: mpsc::UnboundedSender<SessionEvent>,
        audio_in: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            profile,
            created_at: Utc::now(),
            state: RwLock::new(SessionState::default()),
            events,
            audio_in,
            media_out: RwLock::new(None),
        }
    }

    /// Enqueues an event for the orchestrator. Returns `false` once the
    /// orchestrator has stopped.
    pub fn enqueue(&self, event: SessionEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Forwards one inbound µ-law frame toward the recognizer.
    pub fn forward_audio(&self, frame: Vec<u8>) {
        let _ = self.audio_in.send(frame);
    }

    /// Attaches the media socket's outbound channel.
    pub async fn attach_media(&self, tx: mpsc::UnboundedSender<MediaFrameOut>) {
        *self.media_out.write().await = Some(tx);
    }

    pub async fn detach_media(&self) {
        *self.media_out.write().await = None;
    }
}
