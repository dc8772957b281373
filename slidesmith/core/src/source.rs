//! Event Sources
//!
//! An [`EventSource`] turns a [`GenerateRequest`] into an [`EventStream`].
//! Two sources exist:
//!
//! - [`HttpEventSource`] posts the request to a slidesmith-compatible server
//!   and decodes its SSE response (slides parsed server-side)
//! - [`LlmEventSource`] calls the model directly and surfaces its raw text as
//!   `chunk` events (slides parsed client-side)
//!
//! Both connect lazily: nothing happens until the first
//! [`EventStream::next_event`].
//!
//! [`LlmEventSource::generate_document`] is the non-streaming path: one model
//! call for the whole response, parsed with the same grammar afterwards.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{LlmBackend, LlmRequest, OpenAiBackend, StreamingToken};
use crate::grammar::parse_document;
use crate::limit::RequestLimiter;
use crate::prompt::{build_user_prompt, extract_content_text, GenerateRequest, SYSTEM_PROMPT};
use crate::slide::Slide;
use crate::sse::{sse_event_stream, BoxEventStream, DoneSummary, EventStream, SlideEvent, TransportError};

/// Path of the streaming endpoint under a server base URL
pub const STREAM_PATH: &str = "/api/generate-prompt-stream";

/// Opens generation streams
pub trait EventSource: Send + Sync {
    /// Open a stream for `request`, stopped by `cancel`
    fn open(&self, request: &GenerateRequest, cancel: CancellationToken) -> EventStream;
}

// ============================================================================
// HTTP source
// ============================================================================

/// Streams from a server's SSE endpoint
#[derive(Clone, Debug)]
pub struct HttpEventSource {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpEventSource {
    /// Source for the server at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Full URL of the streaming endpoint
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!("{}{STREAM_PATH}", self.base_url)
    }
}

/// Message of an error response body, if it has one
fn body_error(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(String::from)
}

impl EventSource for HttpEventSource {
    fn open(&self, request: &GenerateRequest, cancel: CancellationToken) -> EventStream {
        let client = self.http_client.clone();
        let url = self.stream_url();
        let body = request.clone();

        EventStream::connect(
            async move {
                tracing::debug!(url = %url, "Opening generation stream");
                let response = client
                    .post(&url)
                    .header(reqwest::header::ACCEPT, "text/event-stream")
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(TransportError::http(status.as_u16(), body_error(&text)));
                }

                Ok(sse_event_stream(response.bytes_stream()))
            },
            cancel,
        )
    }
}

// ============================================================================
// Direct model source
// ============================================================================

/// Model settings used when a request carries no override
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationDefaults {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Response token cap
    pub max_tokens: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 16384,
        }
    }
}

/// Streams model text straight from an [`LlmBackend`]
pub struct LlmEventSource {
    backend: Arc<dyn LlmBackend>,
    defaults: GenerationDefaults,
    limiter: Option<Arc<RequestLimiter>>,
}

impl std::fmt::Debug for LlmEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmEventSource")
            .field("backend", &self.backend.name())
            .field("defaults", &self.defaults)
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

impl LlmEventSource {
    /// Source over `backend` with default model settings
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            defaults: GenerationDefaults::default(),
            limiter: None,
        }
    }

    /// Set the model defaults
    #[must_use]
    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Count every request against `limiter`
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<RequestLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Build the model call for a request
    #[must_use]
    pub fn build_llm_request(&self, request: &GenerateRequest) -> LlmRequest {
        let content = extract_content_text(&request.content);
        let model = request
            .llm_config
            .as_ref()
            .map_or_else(|| self.defaults.model.clone(), |c| c.model.clone());

        LlmRequest::new(build_user_prompt(request, &content.text), model)
            .with_system(SYSTEM_PROMPT)
            .with_attachment(content.pdf_data)
            .with_temperature(self.defaults.temperature)
            .with_max_tokens(self.defaults.max_tokens)
    }

    /// Ask the model for the whole response in one call and parse it
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] for an invalid request, a refused limiter
    /// slot or a failed model call.
    pub async fn generate_document(
        &self,
        request: &GenerateRequest,
    ) -> Result<DocumentGeneration, TransportError> {
        let backend = self.admit(request)?;
        let llm_request = self.build_llm_request(request);

        tracing::debug!(backend = backend.name(), model = %llm_request.model, "Requesting full completion");
        let response = backend
            .send(&llm_request)
            .await
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        let slides = parse_document(&response.content);
        tracing::info!(
            model = %response.model,
            slides = slides.len(),
            tokens = ?response.tokens_used,
            duration_ms = ?response.duration_ms,
            "Completion parsed"
        );

        Ok(DocumentGeneration {
            slides,
            text: response.content,
            model: response.model,
            tokens_used: response.tokens_used,
            duration_ms: response.duration_ms,
        })
    }

    /// Validate `request` and take a limiter slot for the backend serving it
    fn admit(&self, request: &GenerateRequest) -> Result<Arc<dyn LlmBackend>, TransportError> {
        request.validate()?;
        let backend = self.backend_for(request);
        if let Some(ref limiter) = self.limiter {
            limiter.check(backend.name())?;
        }
        Ok(backend)
    }

    fn backend_for(&self, request: &GenerateRequest) -> Arc<dyn LlmBackend> {
        match request.llm_config {
            Some(ref config) => Arc::new(OpenAiBackend::from_llm_config(config)),
            None => Arc::clone(&self.backend),
        }
    }
}

/// Result of a non-streaming generation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentGeneration {
    /// Slides parsed from the response, sorted by number
    pub slides: Vec<Slide>,
    /// Raw model text
    pub text: String,
    /// Model that answered
    pub model: String,
    /// Tokens used, when the backend reports them
    pub tokens_used: Option<u32>,
    /// Wall time of the call in milliseconds
    pub duration_ms: Option<u64>,
}

impl EventSource for LlmEventSource {
    fn open(&self, request: &GenerateRequest, cancel: CancellationToken) -> EventStream {
        let backend = match self.admit(request) {
            Ok(backend) => backend,
            Err(e) => return EventStream::connect(async move { Err(e) }, cancel),
        };

        let llm_request = self.build_llm_request(request);
        let summary = DoneSummary {
            total_slides: None,
            style: Some(request.style.to_string()),
            aspect_ratio: Some(request.settings.aspect_ratio.to_string()),
        };

        EventStream::connect(
            async move {
                tracing::debug!(backend = backend.name(), model = %llm_request.model, "Starting completion");
                let rx = backend
                    .send_streaming(&llm_request)
                    .await
                    .map_err(|e| TransportError::Backend(e.to_string()))?;
                Ok(token_event_stream(rx, summary))
            },
            cancel,
        )
    }
}

/// Map backend tokens to events: text becomes `chunk`, completion `done`
///
/// A channel that closes without completion or error ends the stream with
/// no terminal event.
#[must_use]
pub fn token_event_stream(rx: mpsc::Receiver<StreamingToken>, summary: DoneSummary) -> BoxEventStream {
    stream::unfold((rx, Some(summary)), |(mut rx, summary)| async move {
        // `summary` is taken once a terminal event went out
        let summary = summary?;
        loop {
            let event = match rx.recv().await? {
                StreamingToken::Token(text) if text.is_empty() => continue,
                StreamingToken::Token(text) => {
                    return Some((Ok(SlideEvent::Chunk(text)), (rx, Some(summary))));
                }
                StreamingToken::Complete { .. } => SlideEvent::Done(summary),
                StreamingToken::Error(message) => SlideEvent::Error(message),
            };
            return Some((Ok(event), (rx, None)));
        }
    })
    .boxed()
}
