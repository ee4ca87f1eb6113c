//! Carrier control and media-stream plumbing.
//!
//! Call placement and hangup go over the carrier's REST API; live audio
//! flows over the media WebSocket the carrier opens against the engine.
//! This module owns both directions of the media wire format and the
//! paced frame sender that keeps outbound audio real-time without
//! starving heartbeats on the same channel.

use crate::AdapterError;
use async_trait::async_trait;
use base64::Engine as _;
use outcall_audio::FRAME_BYTES;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Frames sent between cooperative yields (~1 second of audio).
const FRAMES_PER_BURST: usize = 50;

/// Minimum yield between bursts.
const BURST_YIELD: Duration = Duration::from_millis(20);

/// Carrier answer timeout passed with every placement.
const PLACEMENT_TIMEOUT_SECS: u32 = 30;

/// Carrier account configuration.
#[derive(Debug, Clone)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    /// Externally reachable hostname for webhook and media URLs.
    pub public_host: String,
}

/// Control-plane operations against the carrier.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Places an outbound call. Returns the carrier's call handle id.
    async fn place_call(&self, to: &str, session_id: &str) -> Result<String, AdapterError>;

    /// Terminates an in-progress call.
    async fn hangup(&self, call_sid: &str) -> Result<(), AdapterError>;
}

/// REST client for the carrier's call control API.
#[derive(Debug, Clone)]
pub struct TelephonyClient {
    http: reqwest::Client,
    config: TelephonyConfig,
}

impl TelephonyClient {
    pub fn new(config: TelephonyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls.json",
            self.config.account_sid
        )
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls/{}.json",
            self.config.account_sid, call_sid
        )
    }
}

#[derive(Debug, Deserialize)]
struct PlacementResponse {
    sid: String,
}

#[async_trait]
impl CallControl for TelephonyClient {
    async fn place_call(&self, to: &str, session_id: &str) -> Result<String, AdapterError> {
        let host = &self.config.public_host;
        let answer_url = format!("https://{host}/call/webhook/{session_id}");
        let status_url = format!("https://{host}/call/status/{session_id}");
        let amd_url = format!("https://{host}/call/amd/{session_id}");
        let timeout = PLACEMENT_TIMEOUT_SECS.to_string();

        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Url", answer_url.as_str()),
                ("Method", "POST"),
                ("StatusCallback", status_url.as_str()),
                ("StatusCallbackMethod", "POST"),
                ("StatusCallbackEvent", "initiated ringing answered completed"),
                ("MachineDetection", "DetectMessageEnd"),
                ("AsyncAmd", "true"),
                ("AsyncAmdStatusCallback", amd_url.as_str()),
                ("AsyncAmdStatusCallbackMethod", "POST"),
                ("Timeout", timeout.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Telephony(format!(
                "placement rejected ({status}): {body}"
            )));
        }

        let placed: PlacementResponse = response.json().await?;
        tracing::info!(call_sid = %placed.sid, to, "outbound call placed");
        Ok(placed.sid)
    }

    async fn hangup(&self, call_sid: &str) -> Result<(), AdapterError> {
        let response = self
            .http
            .post(self.call_url(call_sid))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Telephony(format!(
                "hangup rejected ({status}): {body}"
            )));
        }
        tracing::info!(call_sid, "call hung up");
        Ok(())
    }
}

/// The answer directive: open a bidirectional media stream back at this
/// process, then hold the line open.
pub fn answer_directive(public_host: &str, session_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="wss://{public_host}/call/media/{session_id}"/>
  </Connect>
  <Pause length="3600"/>
</Response>"#
    )
}

/// Spoken-error directive used when the answer webhook cannot resolve the
/// session.
pub fn error_directive(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>{escaped}</Say>
  <Hangup/>
</Response>"#
    )
}

// ── Media wire format ─────────────────────────────────────────────

/// Inbound envelopes on the media WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundMedia {
    Connected,
    Start { start: StartPayload },
    Media { media: MediaPayload },
    Stop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded 160-byte µ-law frame.
    pub payload: String,
}

impl InboundMedia {
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

impl MediaPayload {
    /// Decodes the frame payload to raw µ-law bytes.
    pub fn decode(&self) -> Option<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload)
            .ok()
    }
}

/// Outbound media messages, already serialized for the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaFrameOut {
    Json(String),
}

/// Builds the outbound audio envelope for one frame.
pub fn media_frame(stream_sid: &str, mulaw_frame: &[u8]) -> MediaFrameOut {
    let payload = base64::engine::general_purpose::STANDARD.encode(mulaw_frame);
    MediaFrameOut::Json(
        json!({
            "event": "media",
            "streamSid": stream_sid,
            "media": { "payload": payload },
        })
        .to_string(),
    )
}

/// Builds the clear-playback control frame that flushes the carrier's
/// buffered audio (used on barge-in).
pub fn clear_frame(stream_sid: &str) -> MediaFrameOut {
    MediaFrameOut::Json(
        json!({
            "event": "clear",
            "streamSid": stream_sid,
        })
        .to_string(),
    )
}

/// Streams µ-law audio to the media channel in real time.
///
/// Sends at most [`FRAMES_PER_BURST`] frames between cooperative yields
/// of at least 20 ms so control traffic on the channel is never starved.
/// The cancel token is checked between frames; a cancelled send stops
/// immediately without flushing the remainder. Returns the number of
/// frames actually sent.
pub async fn send_frames(
    out: &mpsc::UnboundedSender<MediaFrameOut>,
    stream_sid: &str,
    mulaw: &[u8],
    cancel: &AtomicBool,
) -> usize {
    let mut sent = 0usize;
    for (index, chunk) in mulaw.chunks(FRAME_BYTES).enumerate() {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        if index > 0 && index % FRAMES_PER_BURST == 0 {
            tokio::time::sleep(BURST_YIELD).await;
            if cancel.load(Ordering::SeqCst) {
                break;
            }
        }
        let mut frame = chunk.to_vec();
        frame.resize(FRAME_BYTES, outcall_audio::mulaw::SILENCE);
        if out.send(media_frame(stream_sid, &frame)).is_err() {
            break;
        }
        sent += 1;
    }
    sent
}
