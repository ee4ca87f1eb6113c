//! Shared test fixtures: an AppState wired with scripted adapters.

use async_trait::async_trait;
use outcall_adapters::{
    AdapterError, AsrHandle, CallControl, LanguageModel, SpeechRecognizer, SpeechSynthesizer,
};
use outcall_engine::{EngineDeps, ObserverRelay, SessionRegistry};
use outcall_server::config::Config;
use outcall_server::{middleware::RateLimiter, AppState};
use std::sync::Arc;
use std::time::Instant;

pub const TEST_SECRET: &str = "test-shared-secret";

struct ScriptedLlm;

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(
        &self,
        _system: &str,
        _history: &[outcall_types::ChatMessage],
    ) -> Result<String, AdapterError> {
        Ok("Hi, this is Michael, an AI assistant with Acme.".to_string())
    }
}

struct ScriptedTts;

#[async_trait]
impl SpeechSynthesizer for ScriptedTts {
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>, AdapterError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(vec![0xFF; 1600]))
    }
}

pub struct ScriptedControl {
    pub fail_placement: bool,
}

#[async_trait]
impl CallControl for ScriptedControl {
    async fn place_call(&self, _to: &str, _session_id: &str) -> Result<String, AdapterError> {
        if self.fail_placement {
            Err(AdapterError::Telephony("scripted placement failure".into()))
        } else {
            Ok("CA123".to_string())
        }
    }

    async fn hangup(&self, _call_sid: &str) -> Result<(), AdapterError> {
        Ok(())
    }
}

struct NoRecognizer;

#[async_trait]
impl SpeechRecognizer for NoRecognizer {
    async fn open(&self) -> Result<AsrHandle, AdapterError> {
        Err(AdapterError::Asr("scripted: unavailable".to_string()))
    }
}

pub fn test_state(fail_placement: bool) -> AppState {
    let mut config = Config::default();
    config.auth.shared_secret = TEST_SECRET.to_string();
    config.server.public_host = "test.example.com".to_string();

    let relay = Arc::new(ObserverRelay::new());
    AppState {
        config: Arc::new(config),
        registry: Arc::new(SessionRegistry::new()),
        relay: Arc::clone(&relay),
        deps: EngineDeps {
            llm: Arc::new(ScriptedLlm),
            tts: Arc::new(ScriptedTts),
            control: Arc::new(ScriptedControl { fail_placement }),
            recognizer: Arc::new(NoRecognizer),
            relay,
        },
        rate_limiter: RateLimiter::new(),
        preview_tts: None,
        started_at: Instant::now(),
    }
}

pub fn initiate_body() -> serde_json::Value {
    serde_json::json!({
        "firstName": "John",
        "phone": "+15551234567",
        "company": "Acme",
        "selling": "AI sales automation",
    })
}
