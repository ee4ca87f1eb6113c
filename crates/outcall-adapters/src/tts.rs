//! Speech-synthesis adapter with phrase caching.
//!
//! Synthesis goes text → vendor MP3 → µ-law 8 kHz via the async
//! transcoder, consulting the response cache on the way in and feeding it
//! on the way out. Common acknowledgement phrases are warmed in the
//! background on startup so the first calls hit the cache.

use crate::AdapterError;
use async_trait::async_trait;
use outcall_audio::{ResponseCache, Transcoder};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_MODEL: &str = "eleven_turbo_v2";

/// Stock phrases warmed into the cache on startup.
pub const WARMUP_PHRASES: &[&str] = &[
    "Could you give me 30 seconds?",
    "I totally understand.",
    "That makes sense.",
    "No problem at all.",
    "Great question.",
    "I hear you.",
    "Absolutely.",
    "Thanks for your time.",
];

/// Synthesis seam. The engine holds this as a trait object so tests can
/// script audio without a network.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes text to µ-law 8 kHz bytes.
    ///
    /// Empty or whitespace-only input returns `None` without touching the
    /// vendor API.
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>, AdapterError>;
}

/// Hosted synthesis client.
#[derive(Clone)]
pub struct TtsClient {
    http: reqwest::Client,
    api_key: String,
    voice_id: String,
    model: String,
    cache: Arc<ResponseCache>,
    transcoder: Transcoder,
}

impl TtsClient {
    pub fn new(
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
        cache: Arc<ResponseCache>,
        transcoder: Transcoder,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model: DEFAULT_MODEL.to_string(),
            cache,
            transcoder,
        }
    }

    fn synth_url(&self, voice_id: &str) -> String {
        format!("https://api.elevenlabs.io/v1/text-to-speech/{voice_id}?output_format=mp3_22050_32")
    }

    /// Fetches the vendor MP3 for `text` without transcoding or caching.
    /// Used by the voice-preview endpoint, which serves `audio/mpeg`.
    pub async fn fetch_mp3(&self, text: &str) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .http
            .post(self.synth_url(&self.voice_id))
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": self.model,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Tts(format!(
                "synthesis rejected ({status}): {body}"
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Warms the cache with the stock phrase list. Best-effort: failures
    /// are logged and skipped.
    pub fn warm_in_background(self: Arc<Self>) {
        tokio::spawn(async move {
            for phrase in WARMUP_PHRASES {
                match self.synthesize(phrase).await {
                    Ok(Some(audio)) => {
                        tracing::debug!(phrase, bytes = audio.len(), "warmed cache phrase");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(phrase, error = %e, "cache warmup failed");
                    }
                }
            }
        });
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>, AdapterError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        if let Some(hit) = self.cache.get(trimmed) {
            return Ok(Some(hit.as_ref().clone()));
        }

        let compressed = self.fetch_mp3(trimmed).await?;
        let mulaw = self.transcoder.to_mulaw_8k(&compressed).await?;
        if mulaw.is_empty() {
            return Ok(None);
        }

        self.cache.insert(trimmed, mulaw.clone());
        Ok(Some(mulaw))
    }
}
