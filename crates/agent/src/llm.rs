use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tariffsim_core::config::LlmConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Single failure class for the caller: generation is unavailable. No retry
/// happens at this layer.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request to completion backend failed: {0}")]
    Http(String),
    #[error("completion backend returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
    #[error("completion backend returned an empty message")]
    EmptyCompletion,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Adapter for an OpenAI-compatible `chat/completions` endpoint (LM Studio,
/// Ollama, vLLM, or the hosted APIs).
pub struct OpenAiChatClient {
    http: reqwest::Client,
    endpoint_url: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    fold_system: bool,
}

impl OpenAiChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GenerationError::Http(error.to_string()))?;

        Ok(Self {
            http,
            endpoint_url: endpoint_url(&config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            fold_system: config.compat_fold_system,
        })
    }

    /// Map the internal role list onto what the backend accepts. Backends
    /// that reject the `system` role get the system content folded into the
    /// first user message instead.
    fn wire_messages(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        if !self.fold_system || !messages.iter().any(|m| m.role == ChatRole::System) {
            return messages.to_vec();
        }

        let system_text = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut folded = Vec::with_capacity(messages.len());
        let mut system_pending = true;
        for message in messages.iter().filter(|m| m.role != ChatRole::System) {
            if system_pending && message.role == ChatRole::User {
                folded.push(ChatMessage::user(format!("{system_text}\n\n{}", message.content)));
                system_pending = false;
            } else {
                folded.push(message.clone());
            }
        }
        if system_pending {
            folded.insert(0, ChatMessage::user(system_text));
        }
        folded
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: self.wire_messages(messages),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        debug!(
            event_name = "agent.llm.request",
            model = %self.model,
            message_count = payload.messages.len(),
            "sending completion request"
        );

        let mut request = self.http.post(&self.endpoint_url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| GenerationError::Http(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status: status.as_u16(), detail });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::MalformedResponse(error.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::MalformedResponse("no choices in response".into()))?;

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::EmptyCompletion);
        }

        Ok(trimmed.to_string())
    }
}

fn endpoint_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

#[cfg(test)]
mod tests {
    use tariffsim_core::config::AppConfig;

    use super::{endpoint_url, ChatMessage, ChatRole, OpenAiChatClient};

    fn client(fold_system: bool) -> OpenAiChatClient {
        let mut config = AppConfig::default().llm;
        config.compat_fold_system = fold_system;
        OpenAiChatClient::from_config(&config).expect("client should build")
    }

    #[test]
    fn endpoint_url_normalizes_trailing_segments() {
        assert_eq!(
            endpoint_url("http://localhost:1234"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            endpoint_url("http://localhost:1234/"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            endpoint_url("http://localhost:1234/v1"),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn system_content_folds_into_first_user_message() {
        let client = client(true);
        let wire = client.wire_messages(&[
            ChatMessage::system("You are a tariff advisor."),
            ChatMessage::user("Which plan fits a student?"),
        ]);

        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, ChatRole::User);
        assert!(wire[0].content.starts_with("You are a tariff advisor."));
        assert!(wire[0].content.ends_with("Which plan fits a student?"));
    }

    #[test]
    fn system_only_prompt_becomes_a_user_message() {
        let client = client(true);
        let wire = client.wire_messages(&[ChatMessage::system("Introduce yourself.")]);

        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, ChatRole::User);
        assert_eq!(wire[0].content, "Introduce yourself.");
    }

    #[test]
    fn folding_disabled_passes_roles_through() {
        let client = client(false);
        let wire = client.wire_messages(&[
            ChatMessage::system("You are a tariff advisor."),
            ChatMessage::user("Hello."),
        ]);

        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, ChatRole::System);
    }

    #[test]
    fn request_payload_omits_unset_max_tokens() {
        let payload = super::ChatCompletionRequest {
            model: "test-model",
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.7,
            max_tokens: None,
            stream: false,
        };
        let json = serde_json::to_value(&payload).expect("serialize payload");
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
