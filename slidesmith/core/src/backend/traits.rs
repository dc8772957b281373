//! LLM Backend Traits
//!
//! The model is a collaborator: it takes a system prompt, a user prompt and an
//! optional attachment and hands back text, either as a stream of fragments
//! or as one document. The parser never depends on how the backend batches
//! its fragments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Token stream events from LLM backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A text fragment of the response
    Token(String),
    /// Response completed successfully
    Complete {
        /// The complete message
        message: String,
    },
    /// Error occurred during streaming
    Error(String),
}

/// Configuration for LLM requests
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// The user prompt
    pub prompt: String,
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Maximum tokens in response (0 = backend default)
    pub max_tokens: u32,
    /// Sampling temperature (0.0-2.0)
    pub temperature: f32,
    /// System prompt
    pub system: Option<String>,
    /// Base64 PDF sent alongside the prompt
    pub attachment: Option<String>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: String::new(),
            max_tokens: 0,
            temperature: 0.7,
            system: None,
            attachment: None,
        }
    }
}

impl LlmRequest {
    /// Create a new request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Attach a base64 PDF
    #[must_use]
    pub fn with_attachment(mut self, attachment: Option<String>) -> Self {
        self.attachment = attachment;
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Response from non-streaming LLM request
#[derive(Clone, Debug)]
pub struct LlmResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Tokens used (if available)
    pub tokens_used: Option<u32>,
    /// Response generation time in milliseconds
    pub duration_ms: Option<u64>,
}

/// Per-request endpoint override sent by clients
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Bearer token
    pub api_key: String,
    /// OpenAI-compatible base URL
    #[serde(rename = "baseURL")]
    pub base_url: String,
    /// Model identifier
    pub model: String,
}

/// LLM Backend trait
///
/// Implement this trait to add support for different LLM providers.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Get the backend name (e.g., "OpenAI")
    fn name(&self) -> &str;

    /// Send a request and get a streaming response
    ///
    /// Returns a channel receiver that will receive tokens as they arrive.
    /// The channel closes after `Complete` or `Error`, or when the receiver
    /// is dropped.
    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>>;

    /// Send a request and wait for the complete response
    async fn send(&self, request: &LlmRequest) -> anyhow::Result<LlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_request_builder() {
        let request = LlmRequest::new("Hello", "gpt-4o")
            .with_temperature(0.5)
            .with_system("You are helpful")
            .with_max_tokens(100)
            .with_attachment(Some("JVBERi0=".to_string()));

        assert_eq!(request.prompt, "Hello");
        assert_eq!(request.model, "gpt-4o");
        assert!((request.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(request.system, Some("You are helpful".to_string()));
        assert_eq!(request.max_tokens, 100);
        assert_eq!(request.attachment.as_deref(), Some("JVBERi0="));
    }

    #[test]
    fn test_temperature_clamped() {
        let request = LlmRequest::new("x", "m").with_temperature(5.0);
        assert!((request.temperature - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_llm_config_wire_names() {
        let config: LlmConfig = serde_json::from_str(
            r#"{"apiKey":"sk-test","baseURL":"https://api.example.com/v1","model":"m"}"#,
        )
        .unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.base_url, "https://api.example.com/v1");
    }
}
