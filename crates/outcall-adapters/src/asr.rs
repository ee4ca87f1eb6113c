//! Streaming speech-recognition adapter.
//!
//! One streaming connection per call, configured for the telephony wire
//! format (µ-law 8 kHz mono) with interim results, smart formatting,
//! a 1.2 s utterance-end window, 400 ms endpointing, retained filler
//! words, and punctuation. Audio goes up as binary frames; results come
//! back as JSON and are translated into [`AsrEvent`]s on a channel.

use crate::AdapterError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use outcall_types::TurnStatus;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Streaming endpoint.
const ASR_WS_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Recognition parameters for the telephony stream.
const ASR_QUERY: &str = "encoding=mulaw&sample_rate=8000&channels=1&model=nova-2\
&interim_results=true&smart_format=true&utterance_end_ms=1200&endpointing=400\
&filler_words=true&punctuate=true";

/// Frames buffered toward the recognizer before the feeder applies
/// backpressure (~20 s of audio).
const AUDIO_BUFFER_FRAMES: usize = 1000;

/// Events produced by one recognition stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AsrEvent {
    /// Running best guess, subject to revision.
    Interim(String),
    /// A stable fragment the recognizer commits to.
    Final {
        text: String,
        language: Option<String>,
        confidence: f32,
        turn: TurnStatus,
    },
    /// Silence boundary after the last final.
    UtteranceEnd,
    /// The connection ended (gracefully or not).
    Closed,
}

/// A live recognition stream: feed µ-law frames in, receive events out.
pub struct AsrHandle {
    pub audio: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::UnboundedReceiver<AsrEvent>,
}

/// Opens recognition streams. The engine holds this as a trait object so
/// tests can script recognition without a network.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn open(&self) -> Result<AsrHandle, AdapterError>;
}

/// Concrete client for the hosted recognizer.
#[derive(Debug, Clone)]
pub struct AsrClient {
    api_key: String,
}

impl AsrClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for AsrClient {
    async fn open(&self) -> Result<AsrHandle, AdapterError> {
        let url = format!("{ASR_WS_URL}?{ASR_QUERY}");
        let mut request = url
            .into_client_request()
            .map_err(|e| AdapterError::Asr(format!("failed to build request: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.api_key)
                .parse()
                .map_err(|e| AdapterError::Asr(format!("invalid auth header: {e}")))?,
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| AdapterError::Asr(format!("failed to connect: {e}")))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_BUFFER_FRAMES);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<AsrEvent>();

        // Writer: drain the audio buffer into binary frames.
        tokio::spawn(async move {
            while let Some(frame) = audio_rx.recv().await {
                if ws_sender.send(WsMessage::Binary(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.send(WsMessage::Close(None)).await;
        });

        // Reader: translate recognizer JSON into events.
        tokio::spawn(async move {
            while let Some(message) = ws_receiver.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        if let Some(event) = parse_result(&text) {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = event_tx.send(AsrEvent::Closed);
        });

        Ok(AsrHandle {
            audio: audio_tx,
            events: event_rx,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    channel: Option<ResultChannel>,
}

#[derive(Debug, Deserialize)]
struct ResultChannel {
    #[serde(default)]
    alternatives: Vec<ResultAlternative>,
    #[serde(default)]
    detected_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

fn parse_result(text: &str) -> Option<AsrEvent> {
    let envelope: ResultEnvelope = serde_json::from_str(text).ok()?;
    match envelope.kind.as_str() {
        "Results" => {
            let channel = envelope.channel?;
            let alternative = channel.alternatives.into_iter().next()?;
            if alternative.transcript.is_empty() {
                return None;
            }
            if envelope.is_final {
                let turn = classify_turn(&alternative.transcript);
                Some(AsrEvent::Final {
                    text: alternative.transcript,
                    language: channel.detected_language,
                    confidence: alternative.confidence,
                    turn,
                })
            } else {
                Some(AsrEvent::Interim(alternative.transcript))
            }
        }
        "UtteranceEnd" => Some(AsrEvent::UtteranceEnd),
        _ => None,
    }
}

/// Short affirmatives and closers that read as a finished turn.
const CLOSERS: &[&str] = &[
    "yeah",
    "yep",
    "yes",
    "no",
    "sure",
    "okay",
    "ok",
    "bye",
    "goodbye",
    "right",
    "thanks",
    "thank you",
    "sounds good",
    "what do you think",
];

/// Endings that signal the speaker is mid-sentence.
const TRAILING_CONJUNCTIONS: &[&str] = &[
    "and", "but", "or", "so", "because", "although", "though", "while", "if", "when",
];

/// Hedges and cliffhangers that promise more to come.
const TRAILING_HEDGES: &[&str] = &[
    "i think",
    "you know",
    "like",
    "i mean",
    "kind of",
    "sort of",
    "um",
    "uh",
    "such as",
    "for example",
    "honestly",
];

/// Heuristic turn-completion classification for a final fragment.
///
/// Complete: sentence punctuation, a closer phrase, or three words or
/// fewer. Mid-thought: a trailing conjunction, comma, or hedge. Anything
/// else is ambiguous.
pub fn classify_turn(text: &str) -> TurnStatus {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return TurnStatus::Ambiguous;
    }

    let lowered = trimmed.trim_end_matches(['.', '!', '?']).trim().to_lowercase();

    if trimmed.ends_with(['.', '!', '?']) {
        return TurnStatus::Complete;
    }
    // Closers match on word boundaries: the final word or final phrase,
    // never a suffix inside a longer word.
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    let tail = |n: usize| {
        if words.len() >= n {
            words[words.len() - n..].join(" ")
        } else {
            String::new()
        }
    };
    let tails = [tail(1), tail(2), tail(4)];
    if CLOSERS.iter().any(|closer| tails.iter().any(|t| t == closer)) {
        return TurnStatus::Complete;
    }
    if trimmed.split_whitespace().count() <= 3 {
        return TurnStatus::Complete;
    }

    if trimmed.ends_with(',') {
        return TurnStatus::MidThought;
    }
    if let Some(word) = words.last() {
        if TRAILING_CONJUNCTIONS.contains(word) {
            return TurnStatus::MidThought;
        }
    }
    if TRAILING_HEDGES.iter().any(|hedge| tails.iter().any(|t| t == hedge)) {
        return TurnStatus::MidThought;
    }

    TurnStatus::Ambiguous
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuated_finals_are_complete() {
        assert_eq!(classify_turn("Yeah, go ahead."), TurnStatus::Complete);
        assert_eq!(classify_turn("What about Tuesday at 2 pm?"), TurnStatus::Complete);
        assert_eq!(classify_turn("That is fantastic news!"), TurnStatus::Complete);
    }

    #[test]
    fn closers_are_complete_without_punctuation() {
        assert_eq!(classify_turn("alright sounds good"), TurnStatus::Complete);
        assert_eq!(classify_turn("so what do you think"), TurnStatus::Complete);
        assert_eq!(classify_turn("bye"), TurnStatus::Complete);
    }

    #[test]
    fn short_fragments_are_complete() {
        assert_eq!(classify_turn("not really interested"), TurnStatus::Complete);
    }

    #[test]
    fn trailing_conjunctions_are_mid_thought() {
        assert_eq!(
            classify_turn("I'm interested in hearing more but"),
            TurnStatus::MidThought
        );
        assert_eq!(
            classify_turn("we were going to look at options and"),
            TurnStatus::MidThought
        );
    }

    #[test]
    fn trailing_comma_and_hedges_are_mid_thought() {
        assert_eq!(
            classify_turn("well the thing about that is,"),
            TurnStatus::MidThought
        );
        assert_eq!(
            classify_turn("it could help our team you know"),
            TurnStatus::MidThought
        );
        assert_eq!(
            classify_turn("there were a few options we considered like"),
            TurnStatus::MidThought
        );
    }

    #[test]
    fn everything_else_is_ambiguous() {
        assert_eq!(
            classify_turn("we already work with another vendor on this stuff"),
            TurnStatus::Ambiguous
        );
        assert_eq!(classify_turn(""), TurnStatus::Ambiguous);
    }

    #[test]
    fn result_parsing_interim_and_final() {
        let interim = r#"{"type":"Results","is_final":false,"channel":{"alternatives":[{"transcript":"hello th","confidence":0.4}]}}"#;
        assert_eq!(
            parse_result(interim),
            Some(AsrEvent::Interim("hello th".to_string()))
        );

        let final_msg = r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":"Hello there.","confidence":0.97}],"detected_language":"en"}}"#;
        match parse_result(final_msg) {
            Some(AsrEvent::Final {
                text,
                language,
                confidence,
                turn,
            }) => {
                assert_eq!(text, "Hello there.");
                assert_eq!(language.as_deref(), Some("en"));
                assert!((confidence - 0.97).abs() < 1e-6);
                assert_eq!(turn, TurnStatus::Complete);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_transcripts_are_dropped() {
        let empty = r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":"","confidence":0.0}]}}"#;
        assert_eq!(parse_result(empty), None);
    }

    #[test]
    fn utterance_end_and_unknown_types() {
        let ue = r#"{"type":"UtteranceEnd","last_word_end":3.1}"#;
        assert_eq!(parse_result(ue), Some(AsrEvent::UtteranceEnd));
        assert_eq!(parse_result(r#"{"type":"Metadata"}"#), None);
        assert_eq!(parse_result("junk"), None);
    }
}
