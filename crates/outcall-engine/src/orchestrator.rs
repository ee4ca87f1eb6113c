//! The per-call orchestrator: a state machine over typed events.
//!
//! One orchestrator task runs per call and is the single writer of its
//! session. Everything else — the control plane, the media socket, the
//! recognition stream, timers, and the generation/audio tasks the
//! orchestrator itself spawns — communicates with it by enqueueing
//! [`SessionEvent`]s. Awaited work (completions, synthesis, frame
//! streaming) happens in spawned tasks that report back as events, so
//! the loop stays responsive to barge-ins and carrier callbacks.

use crate::relay::ObserverRelay;
use crate::session::Session;
use chrono::Utc;
use outcall_adapters::{
    clear_frame, send_frames, AsrEvent, CallControl, LanguageModel, SpeechRecognizer,
    SpeechSynthesizer,
};
use outcall_audio::playback_seconds;
use outcall_detect as detect;
use outcall_types::{
    CallEndReason, CallStatus, ChatMessage, LiveStatus, ObserverEvent, OperatorProfile,
    SentimentPoint, TurnStatus,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Delay between the media start event and the opening generation.
const OPENING_DELAY: Duration = Duration::from_millis(800);

/// Hard ceiling on the opening cooldown.
const COOLDOWN_CEILING: Duration = Duration::from_secs(15);

/// Cooldown fallback when the opening produced no audio.
const COOLDOWN_NO_AUDIO: Duration = Duration::from_secs(6);

/// Padding added to the estimated opening playback time.
const COOLDOWN_PADDING: Duration = Duration::from_millis(1500);

/// Turn-timer windows per final turn status.
const TURN_COMPLETE: Duration = Duration::from_millis(300);
const TURN_AMBIGUOUS: Duration = Duration::from_millis(600);
const TURN_MID_THOUGHT: Duration = Duration::from_millis(1500);

/// Grace before the booked-meeting closing line.
const BOOKED_CLOSE_DELAY: Duration = Duration::from_secs(2);

/// Grace between the closing line and hangup, letting the prospect
/// respond naturally.
const BOOKED_HANGUP_DELAY: Duration = Duration::from_secs(16);

/// Delay between the opt-out acknowledgement and hangup.
const OPT_OUT_HANGUP_DELAY: Duration = Duration::from_secs(4);

/// Padding added to the voicemail playback estimate before hangup.
const VOICEMAIL_PADDING: Duration = Duration::from_secs(2);

/// Inbound frames buffered while the recognizer is not yet connected.
const PRECONNECT_BUFFER_FRAMES: usize = 1000;

const OPT_OUT_ACK: &str =
    "Understood — I'm taking you off our list right now. Sorry for the interruption, and \
     have a great day.";

const ENGLISH_ONLY_APOLOGY: &str =
    "I'm sorry, I can only continue in English. I'll have someone reach out another time. \
     Thanks for picking up.";

/// Timers the orchestrator can have pending. One per kind; re-arming a
/// kind cancels its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    SendOpening,
    CooldownCeiling,
    CooldownEstimate,
    Turn,
    BookedClose,
    BookedHangup,
    VoicemailHangup,
    OptOutHangup,
}

/// What a generation task was asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Opening,
    Reply,
    Closing,
    Voicemail,
}

/// What an audio task was streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Opening,
    Reply,
    Closing,
    Voicemail,
    OptOut,
    Apology,
}

/// Events driving the per-session state machine.
#[derive(Debug)]
pub enum SessionEvent {
    /// Call placement finished; the carrier assigned a handle.
    Placed { call_sid: String },
    MediaConnected,
    MediaStart { stream_sid: String },
    MediaStop,
    AsrInterim(String),
    AsrFinal {
        text: String,
        language: Option<String>,
        confidence: f32,
        turn: TurnStatus,
    },
    AsrUtteranceEnd,
    AsrClosed,
    AmdResult { answered_by: String },
    StatusUpdate {
        status: CallStatus,
        duration: Option<u64>,
    },
    GenerationDone {
        kind: GenerationKind,
        result: Result<String, String>,
    },
    AudioDone {
        kind: AudioKind,
        bytes: usize,
        /// Sequence number of the send; stale completions are ignored.
        seq: u64,
    },
    Timeout(TimerKind),
    /// External instruction to end the call (shutdown, operator cancel).
    EndCall { reason: CallEndReason },
}

/// Adapter and relay handles the orchestrator needs.
#[derive(Clone)]
pub struct EngineDeps {
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub control: Arc<dyn CallControl>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub relay: Arc<ObserverRelay>,
}

enum SinkUpdate {
    Set(mpsc::Sender<Vec<u8>>),
    Clear,
}

pub struct Orchestrator {
    session: Arc<Session>,
    deps: EngineDeps,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    base_instructions: String,
    in_flight: bool,
    turn_buffer: Vec<String>,
    timers: HashMap<TimerKind, JoinHandle<()>>,
    audio_cancel: Arc<AtomicBool>,
    audio_seq: u64,
    asr_sink_tx: mpsc::UnboundedSender<SinkUpdate>,
    asr_reconnect_attempted: bool,
    voicemail_pending: bool,
    ended: bool,
}

impl Orchestrator {
    /// Creates the session, wires its channels, and spawns the
    /// orchestrator and audio-forwarder tasks. Returns the shared
    /// session handle.
    pub fn spawn(session_id: String, profile: OperatorProfile, deps: EngineDeps) -> Arc<Session> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();

        let base_instructions = outcall_prompt::build_instructions(&profile, Utc::now());
        let session = Arc::new(Session::new(
            session_id,
            profile,
            events_tx.clone(),
            audio_tx,
        ));

        tokio::spawn(forward_audio(audio_rx, sink_rx));

        let orchestrator = Orchestrator {
            session: Arc::clone(&session),
            deps,
            events_tx,
            base_instructions,
            in_flight: false,
            turn_buffer: Vec::new(),
            timers: HashMap::new(),
            audio_cancel: Arc::new(AtomicBool::new(false)),
            audio_seq: 0,
            asr_sink_tx: sink_tx,
            asr_reconnect_attempted: false,
            voicemail_pending: false,
            ended: false,
        };
        tokio::spawn(orchestrator.run(events_rx));

        session
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        let session_id = self.session.id.clone();
        tracing::debug!(session_id, "orchestrator started");
        while let Some(event) = events.recv().await {
            if self.ended && !matches!(event, SessionEvent::StatusUpdate { .. }) {
                continue;
            }
            self.handle(event).await;
        }
        tracing::debug!(session_id, "orchestrator stopped");
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Placed { call_sid } => {
                let mut state = self.session.state.write().await;
                state.call_sid = Some(call_sid);
                state.status = CallStatus::Initiating;
            }
            SessionEvent::MediaConnected => {
                tracing::debug!(session_id = %self.session.id, "media channel connected");
            }
            SessionEvent::MediaStart { stream_sid } => self.on_media_start(stream_sid).await,
            SessionEvent::MediaStop => {
                if !self.ended {
                    self.end_call(CallEndReason::MediaClosed).await;
                }
            }
            SessionEvent::AsrInterim(text) => self.on_interim(text).await,
            SessionEvent::AsrFinal {
                text,
                language,
                confidence,
                turn,
            } => self.on_final(text, language, confidence, turn).await,
            SessionEvent::AsrUtteranceEnd => {
                self.cancel_timer(TimerKind::Turn);
                self.dispatch_turn().await;
            }
            SessionEvent::AsrClosed => self.on_asr_closed().await,
            SessionEvent::AmdResult { answered_by } => self.on_amd(answered_by).await,
            SessionEvent::StatusUpdate { status, duration } => {
                self.on_status_update(status, duration).await
            }
            SessionEvent::GenerationDone { kind, result } => {
                self.on_generation_done(kind, result).await
            }
            SessionEvent::AudioDone { kind, bytes, seq } => {
                self.on_audio_done(kind, bytes, seq).await
            }
            SessionEvent::Timeout(kind) => self.on_timeout(kind).await,
            SessionEvent::EndCall { reason } => {
                let call_sid = self.session.state.read().await.call_sid.clone();
                if let Some(sid) = call_sid {
                    if let Err(e) = self.deps.control.hangup(&sid).await {
                        tracing::warn!(session_id = %self.session.id, error = %e, "hangup failed");
                    }
                }
                self.end_call(reason).await;
            }
        }
    }

    // ── Media lifecycle ───────────────────────────────────────────

    async fn on_media_start(&mut self, stream_sid: String) {
        let duplicate = {
            let mut state = self.session.state.write().await;
            if state.flags.opening_sent {
                true
            } else {
                state.stream_sid = Some(stream_sid);
                state.status = CallStatus::Connected;
                state.flags.opening_sent = true;
                state.flags.opening_cooldown = true;
                false
            }
        };
        if duplicate {
            tracing::warn!(session_id = %self.session.id, "duplicate media start ignored");
            return;
        }

        self.connect_asr().await;
        self.set_timer(TimerKind::SendOpening, OPENING_DELAY);
        self.set_timer(TimerKind::CooldownCeiling, COOLDOWN_CEILING);
    }

    async fn connect_asr(&mut self) {
        match self.deps.recognizer.open().await {
            Ok(handle) => {
                let _ = self.asr_sink_tx.send(SinkUpdate::Set(handle.audio));
                let tx = self.events_tx.clone();
                let mut events = handle.events;
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        let mapped = match event {
                            AsrEvent::Interim(text) => SessionEvent::AsrInterim(text),
                            AsrEvent::Final {
                                text,
                                language,
                                confidence,
                                turn,
                            } => SessionEvent::AsrFinal {
                                text,
                                language,
                                confidence,
                                turn,
                            },
                            AsrEvent::UtteranceEnd => SessionEvent::AsrUtteranceEnd,
                            AsrEvent::Closed => SessionEvent::AsrClosed,
                        };
                        if tx.send(mapped).is_err() {
                            break;
                        }
                    }
                });
            }
            Err(e) => {
                // The call continues one-way: Michael can still speak.
                tracing::warn!(
                    session_id = %self.session.id,
                    error = %e,
                    "speech recognition unavailable; continuing without it"
                );
            }
        }
    }

    async fn on_asr_closed(&mut self) {
        if self.ended {
            return;
        }
        if self.asr_reconnect_attempted {
            tracing::warn!(
                session_id = %self.session.id,
                "speech recognition lost again; call is one-way from here"
            );
            return;
        }
        self.asr_reconnect_attempted = true;
        tracing::warn!(session_id = %self.session.id, "speech recognition dropped; reconnecting once");
        self.connect_asr().await;
    }

    // ── Recognition events ────────────────────────────────────────

    async fn on_interim(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        self.deps
            .relay
            .broadcast(
                &self.session.id,
                &ObserverEvent::UserSpeechInterim { text: text.clone() },
            )
            .await;
        self.maybe_barge_in(&text).await;
    }

    async fn on_final(
        &mut self,
        text: String,
        language: Option<String>,
        _confidence: f32,
        turn: TurnStatus,
    ) {
        if text.trim().is_empty() {
            return;
        }
        self.maybe_barge_in(&text).await;
        self.track_language(language).await;

        self.turn_buffer.push(text.trim().to_string());
        let window = match turn {
            TurnStatus::Complete => TURN_COMPLETE,
            TurnStatus::Ambiguous => TURN_AMBIGUOUS,
            TurnStatus::MidThought => TURN_MID_THOUGHT,
        };
        self.set_timer(TimerKind::Turn, window);
    }

    async fn track_language(&mut self, language: Option<String>) {
        let Some(language) = language else { return };
        let newly_non_english = {
            let mut state = self.session.state.write().await;
            state.detected_language = Some(language.clone());
            if language.starts_with("en") {
                state.non_english_streak = 0;
                false
            } else {
                state.non_english_streak += 1;
                if state.non_english_streak >= 2 && !state.flags.non_english {
                    state.flags.non_english = true;
                    true
                } else {
                    false
                }
            }
        };
        if newly_non_english {
            self.deps
                .relay
                .broadcast(&self.session.id, &ObserverEvent::LanguageDetected { language })
                .await;
        }
    }

    /// While assistant audio is streaming, any prospect speech interrupts
    /// it: cancel the send, flush the carrier's playback buffer, count it.
    async fn maybe_barge_in(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let speaking = self.session.state.read().await.flags.speaking;
        if !speaking {
            return;
        }

        self.audio_cancel.store(true, Ordering::SeqCst);
        let (media_out, stream_sid, count) = {
            let mut state = self.session.state.write().await;
            state.flags.speaking = false;
            state.barge_ins += 1;
            (
                self.session.media_out.read().await.clone(),
                state.stream_sid.clone(),
                state.barge_ins,
            )
        };
        if let (Some(out), Some(sid)) = (media_out, stream_sid) {
            let _ = out.send(clear_frame(&sid));
        }
        tracing::info!(session_id = %self.session.id, count, "barge-in");
        self.deps
            .relay
            .broadcast(&self.session.id, &ObserverEvent::BargeIn { count })
            .await;
        self.broadcast_status(LiveStatus::Listening).await;
    }

    // ── Turn dispatch ─────────────────────────────────────────────

    async fn dispatch_turn(&mut self) {
        if self.turn_buffer.is_empty() {
            return;
        }
        let text = self.turn_buffer.join(" ");
        self.turn_buffer.clear();

        {
            let mut state = self.session.state.write().await;
            state.append_user(&text);
        }
        self.deps
            .relay
            .broadcast(&self.session.id, &ObserverEvent::user_speech(&text))
            .await;

        if detect::is_opt_out(&text) {
            self.opt_out_branch().await;
            return;
        }
        self.run_soft_detectors(&text).await;

        let (non_english, apologized) = {
            let state = self.session.state.read().await;
            (state.flags.non_english, state.flags.non_english_handled)
        };
        if non_english && !apologized {
            self.session.state.write().await.flags.non_english_handled = true;
            self.speak_fixed(AudioKind::Apology, ENGLISH_ONLY_APOLOGY).await;
            return;
        }

        if self.evaluate_meeting_booked(&text).await {
            return;
        }

        let (cooldown, voicemail, booked) = {
            let state = self.session.state.read().await;
            (
                state.flags.opening_cooldown,
                state.flags.voicemail,
                state.flags.meeting_booked,
            )
        };
        if cooldown {
            tracing::debug!(session_id = %self.session.id, "final recorded during opening cooldown");
            return;
        }
        if voicemail || booked {
            return;
        }
        if self.in_flight {
            tracing::debug!(session_id = %self.session.id, "generation already in flight; turn recorded only");
            return;
        }

        let (system, history) = {
            let state = self.session.state.read().await;
            let augmentation =
                outcall_prompt::augmentation(state.sentiment_label(), state.barge_ins);
            let system = if augmentation.is_empty() {
                self.base_instructions.clone()
            } else {
                format!("{}\n\n{augmentation}", self.base_instructions)
            };
            (system, state.history.clone())
        };
        self.broadcast_status(LiveStatus::Thinking).await;
        self.start_generation(GenerationKind::Reply, system, history);
    }

    /// Gatekeeper, callback, sentiment, BANT, and objection detectors, in
    /// dispatch order. None of these short-circuit.
    async fn run_soft_detectors(&mut self, text: &str) {
        enum Broadcast {
            Gatekeeper,
            Navigated,
            Callback,
        }
        let mut broadcasts = Vec::new();

        let (score, label) = {
            let mut state = self.session.state.write().await;

            if !state.flags.gatekeeper {
                if detect::is_gatekeeper(text) {
                    state.flags.gatekeeper = true;
                    broadcasts.push(Broadcast::Gatekeeper);
                }
            } else if !state.flags.gatekeeper_navigated
                && detect::is_gatekeeper_navigated(text, &self.session.profile.first_name)
            {
                state.flags.gatekeeper_navigated = true;
                broadcasts.push(Broadcast::Navigated);
            }

            if let Some(signal) = detect::callback_request(text) {
                if !state.flags.callback_requested {
                    state.flags.callback_requested = true;
                    broadcasts.push(Broadcast::Callback);
                }
                if signal.time.is_some() {
                    state.callback_time = signal.time;
                }
            }

            let delta = detect::sentiment_delta(text);
            state.sentiment_score = detect::update_score(state.sentiment_score, delta);
            let label = state.sentiment_label();
            let turn = state.history.len() as u32;
            let score = state.sentiment_score;
            state.sentiment_history.push(SentimentPoint { turn, score, label });

            state.bant.merge(detect::bant_signals(text));
            if detect::is_objection(text) {
                state.objections += 1;
            }

            (score, label)
        };

        for broadcast in broadcasts {
            let event = match broadcast {
                Broadcast::Gatekeeper => ObserverEvent::GatekeeperDetected,
                Broadcast::Navigated => ObserverEvent::GatekeeperNavigated,
                Broadcast::Callback => ObserverEvent::CallbackRequested,
            };
            self.deps.relay.broadcast(&self.session.id, &event).await;
        }
        self.deps
            .relay
            .broadcast(
                &self.session.id,
                &ObserverEvent::SentimentUpdate { score, label },
            )
            .await;
    }

    /// Evaluates the strict booking gate over the most recent
    /// (assistant, user) pair. On fire, schedules the graceful close and
    /// returns true.
    async fn evaluate_meeting_booked(&mut self, user_text: &str) -> bool {
        let fired = {
            let mut state = self.session.state.write().await;
            if state.flags.meeting_booked {
                false
            } else {
                let booked = state
                    .last_assistant_text()
                    .map(|assistant| detect::meeting_booked(assistant, user_text))
                    .unwrap_or(false);
                if booked {
                    state.flags.meeting_booked = true;
                }
                booked
            }
        };
        if fired {
            tracing::info!(session_id = %self.session.id, "meeting booked");
            self.deps
                .relay
                .broadcast(
                    &self.session.id,
                    &ObserverEvent::MeetingBooked {
                        message: "Meeting booked — confirming and wrapping up the call."
                            .to_string(),
                    },
                )
                .await;
            self.set_timer(TimerKind::BookedClose, BOOKED_CLOSE_DELAY);
        }
        fired
    }

    // ── Branches ──────────────────────────────────────────────────

    async fn opt_out_branch(&mut self) {
        {
            let mut state = self.session.state.write().await;
            if state.flags.opt_out {
                return;
            }
            state.flags.opt_out = true;
        }
        self.deps
            .relay
            .broadcast(&self.session.id, &ObserverEvent::OptOutDetected)
            .await;
        self.interrupt_audio().await;
        self.speak_fixed(AudioKind::OptOut, OPT_OUT_ACK).await;
    }

    async fn on_amd(&mut self, answered_by: String) {
        if answered_by.starts_with("machine_end") {
            let already = {
                let mut state = self.session.state.write().await;
                let already = state.flags.voicemail;
                state.flags.voicemail = true;
                already
            };
            if already {
                return;
            }
            tracing::info!(session_id = %self.session.id, answered_by, "voicemail detected");
            self.deps
                .relay
                .broadcast(
                    &self.session.id,
                    &ObserverEvent::VoicemailDetected { answered_by },
                )
                .await;
            self.interrupt_audio().await;
            if self.in_flight {
                // The in-flight reply will be discarded on arrival and the
                // voicemail generated then.
                self.voicemail_pending = true;
            } else {
                self.start_voicemail_generation().await;
            }
        } else if answered_by == "fax" {
            tracing::info!(session_id = %self.session.id, "fax machine answered; hanging up");
            let call_sid = self.session.state.read().await.call_sid.clone();
            if let Some(sid) = call_sid {
                if let Err(e) = self.deps.control.hangup(&sid).await {
                    tracing::warn!(session_id = %self.session.id, error = %e, "hangup failed");
                }
            }
            self.end_call(CallEndReason::Hangup).await;
        }
        // Human or unknown: no action.
    }

    async fn start_voicemail_generation(&mut self) {
        {
            let mut state = self.session.state.write().await;
            if state.flags.voicemail_handled {
                return;
            }
            state.flags.voicemail_handled = true;
        }
        let system = format!(
            "{}\n\nThe call went to voicemail. Leave a voicemail of at most three \
             sentences: who you are, one line on why you called, and that you'll try \
             again. Do not ask questions.",
            self.base_instructions
        );
        let history = self.session.state.read().await.history.clone();
        self.broadcast_status(LiveStatus::Thinking).await;
        self.start_generation(GenerationKind::Voicemail, system, history);
    }

    // ── Generation and audio ──────────────────────────────────────

    fn start_generation(
        &mut self,
        kind: GenerationKind,
        system: String,
        history: Vec<ChatMessage>,
    ) {
        self.in_flight = true;
        let llm = Arc::clone(&self.deps.llm);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = llm
                .complete(&system, &history)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(SessionEvent::GenerationDone { kind, result });
        });
    }

    async fn on_generation_done(&mut self, kind: GenerationKind, result: Result<String, String>) {
        self.in_flight = false;

        let text = match result {
            Ok(text) => text,
            Err(error) => {
                tracing::error!(session_id = %self.session.id, ?kind, error, "generation failed");
                self.deps
                    .relay
                    .broadcast(
                        &self.session.id,
                        &ObserverEvent::Error {
                            message: "response generation failed".to_string(),
                        },
                    )
                    .await;
                if self.voicemail_pending {
                    self.voicemail_pending = false;
                    self.start_voicemail_generation().await;
                }
                return;
            }
        };

        // A voicemail detection mid-generation discards the pending reply
        // or opening; the voicemail message owns the call from here.
        let voicemail = self.session.state.read().await.flags.voicemail;
        if voicemail && matches!(kind, GenerationKind::Opening | GenerationKind::Reply) {
            tracing::debug!(session_id = %self.session.id, ?kind, "discarding generation after voicemail detection");
            if self.voicemail_pending {
                self.voicemail_pending = false;
                self.start_voicemail_generation().await;
            }
            return;
        }

        match kind {
            GenerationKind::Opening | GenerationKind::Reply | GenerationKind::Closing => {
                {
                    let mut state = self.session.state.write().await;
                    state.append_assistant(&text);
                }
                self.deps
                    .relay
                    .broadcast(&self.session.id, &ObserverEvent::michael_speech(&text))
                    .await;
                let audio_kind = match kind {
                    GenerationKind::Opening => AudioKind::Opening,
                    GenerationKind::Closing => AudioKind::Closing,
                    _ => AudioKind::Reply,
                };
                self.start_audio(audio_kind, text).await;
            }
            GenerationKind::Voicemail => {
                {
                    let mut state = self.session.state.write().await;
                    state.append_voicemail(&text);
                }
                self.deps
                    .relay
                    .broadcast(&self.session.id, &ObserverEvent::michael_speech(&text))
                    .await;
                self.start_audio(AudioKind::Voicemail, text).await;
            }
        }
    }

    /// Appends a fixed (non-generated) assistant line and speaks it.
    async fn speak_fixed(&mut self, kind: AudioKind, text: &str) {
        {
            let mut state = self.session.state.write().await;
            state.append_assistant(text);
        }
        self.deps
            .relay
            .broadcast(&self.session.id, &ObserverEvent::michael_speech(text))
            .await;
        self.start_audio(kind, text.to_string()).await;
    }

    async fn start_audio(&mut self, kind: AudioKind, text: String) {
        let cancel = Arc::new(AtomicBool::new(false));
        self.audio_cancel = Arc::clone(&cancel);
        self.audio_seq += 1;
        let seq = self.audio_seq;

        let (media_out, stream_sid) = {
            let media = self.session.media_out.read().await.clone();
            let state = self.session.state.read().await;
            (media, state.stream_sid.clone())
        };
        {
            let mut state = self.session.state.write().await;
            state.flags.speaking = true;
        }
        self.broadcast_status(LiveStatus::Speaking).await;

        let tts = Arc::clone(&self.deps.tts);
        let tx = self.events_tx.clone();
        let session_id = self.session.id.clone();
        tokio::spawn(async move {
            let audio = match tts.synthesize(&text).await {
                Ok(Some(audio)) => audio,
                Ok(None) => {
                    let _ = tx.send(SessionEvent::AudioDone { kind, bytes: 0, seq });
                    return;
                }
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "synthesis failed; skipping audio");
                    let _ = tx.send(SessionEvent::AudioDone { kind, bytes: 0, seq });
                    return;
                }
            };
            let total = audio.len();
            match (media_out, stream_sid) {
                (Some(out), Some(sid)) => {
                    send_frames(&out, &sid, &audio, &cancel).await;
                }
                _ => {
                    tracing::warn!(session_id, "no media channel; audio dropped");
                }
            }
            let _ = tx.send(SessionEvent::AudioDone { kind, bytes: total, seq });
        });
    }

    async fn on_audio_done(&mut self, kind: AudioKind, bytes: usize, seq: u64) {
        if seq != self.audio_seq {
            // A newer send superseded this one (barge-in, opt-out,
            // voicemail); its completion is meaningless now.
            return;
        }
        {
            let mut state = self.session.state.write().await;
            state.flags.speaking = false;
        }

        match kind {
            AudioKind::Opening => {
                let cleared = self.session.state.read().await.flags.cooldown_cleared;
                if !cleared {
                    let delay = if bytes > 0 {
                        Duration::from_secs(playback_seconds(bytes)) + COOLDOWN_PADDING
                    } else {
                        COOLDOWN_NO_AUDIO
                    };
                    self.set_timer(TimerKind::CooldownEstimate, delay);
                }
                self.broadcast_status(LiveStatus::Listening).await;
            }
            AudioKind::Reply | AudioKind::Apology => {
                self.broadcast_status(LiveStatus::Listening).await;
            }
            AudioKind::Closing => {
                self.set_timer(TimerKind::BookedHangup, BOOKED_HANGUP_DELAY);
            }
            AudioKind::Voicemail => {
                let delay = Duration::from_secs(playback_seconds(bytes)) + VOICEMAIL_PADDING;
                self.set_timer(TimerKind::VoicemailHangup, delay);
            }
            AudioKind::OptOut => {
                self.set_timer(TimerKind::OptOutHangup, OPT_OUT_HANGUP_DELAY);
            }
        }
    }

    // ── Timers ────────────────────────────────────────────────────

    async fn on_timeout(&mut self, kind: TimerKind) {
        self.timers.remove(&kind);
        match kind {
            TimerKind::SendOpening => {
                let voicemail = self.session.state.read().await.flags.voicemail;
                if self.in_flight || voicemail {
                    return;
                }
                let system = format!(
                    "{}\n\nDeliver your opening line now: one to three sentences, greet \
                     the prospect by first name, disclose that you are an AI assistant, \
                     and hook their interest.",
                    self.base_instructions
                );
                self.broadcast_status(LiveStatus::Thinking).await;
                self.start_generation(GenerationKind::Opening, system, Vec::new());
            }
            TimerKind::CooldownCeiling => self.clear_cooldown("safety ceiling").await,
            TimerKind::CooldownEstimate => self.clear_cooldown("duration estimate").await,
            TimerKind::Turn => self.dispatch_turn().await,
            TimerKind::BookedClose => {
                if self.in_flight {
                    // Let the straggler finish; try again shortly.
                    self.set_timer(TimerKind::BookedClose, Duration::from_millis(500));
                    return;
                }
                let system = format!(
                    "{}\n\nThe meeting is booked. Give a warm two to three sentence \
                     closing: confirm the agreed day and time and that a calendar invite \
                     is on its way, then say goodbye.",
                    self.base_instructions
                );
                let history = self.session.state.read().await.history.clone();
                self.broadcast_status(LiveStatus::Thinking).await;
                self.start_generation(GenerationKind::Closing, system, history);
            }
            TimerKind::BookedHangup => self.hangup_and_end(CallEndReason::MeetingBooked).await,
            TimerKind::VoicemailHangup => self.hangup_and_end(CallEndReason::Voicemail).await,
            TimerKind::OptOutHangup => self.hangup_and_end(CallEndReason::OptOut).await,
        }
    }

    /// Clears the opening cooldown exactly once, whichever timer fires
    /// first.
    async fn clear_cooldown(&mut self, source: &str) {
        let first = {
            let mut state = self.session.state.write().await;
            if state.flags.cooldown_cleared {
                false
            } else {
                state.flags.cooldown_cleared = true;
                state.flags.opening_cooldown = false;
                true
            }
        };
        if first {
            tracing::debug!(session_id = %self.session.id, source, "opening cooldown cleared");
            self.cancel_timer(TimerKind::CooldownCeiling);
            self.cancel_timer(TimerKind::CooldownEstimate);
        }
    }

    fn set_timer(&mut self, kind: TimerKind, delay: Duration) {
        if let Some(previous) = self.timers.remove(&kind) {
            previous.abort();
        }
        let tx = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::Timeout(kind));
        });
        self.timers.insert(kind, handle);
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        if let Some(handle) = self.timers.remove(&kind) {
            handle.abort();
        }
    }

    // ── Status + teardown ─────────────────────────────────────────

    async fn on_status_update(&mut self, status: CallStatus, duration: Option<u64>) {
        {
            let mut state = self.session.state.write().await;
            if let Some(duration) = duration {
                state.duration_secs = duration;
            }
            if !state.status.is_terminal() {
                state.status = status;
            }
        }
        if status.is_terminal() && !self.ended {
            self.end_call(CallEndReason::CarrierTerminal).await;
        }
    }

    async fn interrupt_audio(&mut self) {
        self.audio_cancel.store(true, Ordering::SeqCst);
        let (media_out, stream_sid) = {
            let mut state = self.session.state.write().await;
            state.flags.speaking = false;
            (
                self.session.media_out.read().await.clone(),
                state.stream_sid.clone(),
            )
        };
        if let (Some(out), Some(sid)) = (media_out, stream_sid) {
            let _ = out.send(clear_frame(&sid));
        }
    }

    async fn hangup_and_end(&mut self, reason: CallEndReason) {
        let call_sid = self.session.state.read().await.call_sid.clone();
        if let Some(sid) = call_sid {
            if let Err(e) = self.deps.control.hangup(&sid).await {
                tracing::warn!(session_id = %self.session.id, error = %e, "hangup failed");
            }
        }
        self.end_call(reason).await;
    }

    async fn end_call(&mut self, reason: CallEndReason) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.audio_cancel.store(true, Ordering::SeqCst);
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        let _ = self.asr_sink_tx.send(SinkUpdate::Clear);

        let (transcript, duration, scoring) = {
            let mut state = self.session.state.write().await;
            state.flags.speaking = false;
            state.end_reason = Some(reason);
            if state.terminal_at.is_none() {
                state.terminal_at = Some(Instant::now());
            }
            if !state.status.is_terminal() {
                state.status = CallStatus::Completed;
            }
            if state.duration_secs == 0 {
                state.duration_secs =
                    (Utc::now() - self.session.created_at).num_seconds().max(0) as u64;
            }
            (
                state.transcript.clone(),
                state.duration_secs,
                state.analytics(),
            )
        };

        tracing::info!(
            session_id = %self.session.id,
            reason = reason.as_str(),
            duration,
            "call ended"
        );
        self.deps
            .relay
            .broadcast(
                &self.session.id,
                &ObserverEvent::CallEnded {
                    reason,
                    transcript,
                    duration,
                    scoring,
                },
            )
            .await;
    }

    async fn broadcast_status(&self, value: LiveStatus) {
        self.deps
            .relay
            .broadcast(&self.session.id, &ObserverEvent::Status { value })
            .await;
    }
}

/// Forwards inbound µ-law frames to the current recognition sink.
///
/// Frames arriving before the recognizer connects are buffered (bounded)
/// and flushed on connect, so the start of the prospect's first words is
/// not lost to connection latency.
async fn forward_audio(
    mut audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut sink_rx: mpsc::UnboundedReceiver<SinkUpdate>,
) {
    let mut sink: Option<mpsc::Sender<Vec<u8>>> = None;
    let mut backlog: VecDeque<Vec<u8>> = VecDeque::new();

    loop {
        tokio::select! {
            update = sink_rx.recv() => match update {
                Some(SinkUpdate::Set(tx)) => {
                    while let Some(frame) = backlog.pop_front() {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    sink = Some(tx);
                }
                Some(SinkUpdate::Clear) => sink = None,
                None => break,
            },
            frame = audio_rx.recv() => match frame {
                Some(frame) => {
                    match &sink {
                        Some(tx) => {
                            if tx.send(frame).await.is_err() {
                                sink = None;
                            }
                        }
                        None => {
                            backlog.push_back(frame);
                            if backlog.len() > PRECONNECT_BUFFER_FRAMES {
                                backlog.pop_front();
                            }
                        }
                    }
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_windows_match_turn_status() {
        assert_eq!(TURN_COMPLETE, Duration::from_millis(300));
        assert_eq!(TURN_AMBIGUOUS, Duration::from_millis(600));
        assert_eq!(TURN_MID_THOUGHT, Duration::from_millis(1500));
    }

    #[test]
    fn booked_hangup_delay_is_within_the_grace_band() {
        assert!(BOOKED_HANGUP_DELAY >= Duration::from_secs(15));
        assert!(BOOKED_HANGUP_DELAY <= Duration::from_secs(18));
    }
}
