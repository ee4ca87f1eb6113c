//! Single-shot chat completion adapter.
//!
//! The engine asks for one short response per turn: current system
//! instructions plus the conversation history, temperature 0.85, capped
//! at ~200 tokens so replies stay speech-sized.

use crate::AdapterError;
use async_trait::async_trait;
use outcall_types::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use serde_json::json;

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const TEMPERATURE: f32 = 0.85;
const MAX_TOKENS: u32 = 200;

/// Chat completion seam. The engine holds this as a trait object so tests
/// can script responses.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Completes the conversation, returning a short response text.
    async fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
    ) -> Result<String, AdapterError>;
}

/// Hosted chat-completion client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    pub fn with_model(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Flattens system instructions plus history into the wire message list.
fn wire_messages<'a>(system: &'a str, history: &'a [ChatMessage]) -> Vec<WireMessage<'a>> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(WireMessage {
        role: "system",
        content: system,
    });
    for message in history {
        messages.push(WireMessage {
            role: match message.role {
                Role::Assistant => "assistant",
                Role::User => "user",
            },
            content: &message.text,
        });
    }
    messages
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
    ) -> Result<String, AdapterError> {
        let body = json!({
            "model": self.model,
            "messages": wire_messages(system, history),
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });

        let response = self
            .http
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Llm(format!(
                "completion rejected ({status}): {body}"
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AdapterError::Llm("completion returned no content".to_string()))?;

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_messages_prepend_system() {
        let history = vec![
            ChatMessage::assistant("Hi, this is Michael."),
            ChatMessage::user("Who is this?"),
        ];
        let messages = wire_messages("be brief", &history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content, "Who is this?");
    }

    #[test]
    fn completion_response_parses() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":" Sure thing. "}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        let content = parsed.choices[0].message.content.as_deref().unwrap();
        assert_eq!(content.trim(), "Sure thing.");
    }
}
