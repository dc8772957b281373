//! OpenAI-compatible Backend
//!
//! Talks to any server that implements the chat completions API:
//!
//! - `POST {base}/chat/completions` with `stream: true` answers with SSE
//!   `data:` lines, each a JSON chunk, ending with `data: [DONE]`
//! - the same call with `stream: false` answers with one JSON document
//!
//! The streamed body is decoded with the same [`SseDecoder`] the slide
//! transport uses, so a multi-byte character split between two reads is
//! decoded correctly.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::traits::{LlmBackend, LlmConfig, LlmRequest, LlmResponse, StreamingToken};
use crate::sse::SseDecoder;

/// Default API base
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Marker line that ends a streamed completion
const DONE_MARKER: &str = "[DONE]";

/// Error sent when the body ends without [`DONE_MARKER`]
const TRUNCATED_MESSAGE: &str = "Completion stream ended before [DONE]";

/// OpenAI-compatible backend client
#[derive(Clone)]
pub struct OpenAiBackend {
    /// Bearer token (may be empty for local servers)
    api_key: String,
    /// API base without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    /// Create a new backend
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    /// Create from a per-request override
    #[must_use]
    pub fn from_llm_config(config: &LlmConfig) -> Self {
        Self::new(config.api_key.clone(), config.base_url.clone())
    }

    /// Create from `OPENAI_API_KEY` and `OPENAI_API_BASE`
    #[must_use]
    pub fn from_env() -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let base_url =
            std::env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, base_url)
    }

    /// API base in use
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build the JSON body of a chat completion call
    fn build_body(request: &LlmRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }

        let user_content = match request.attachment {
            Some(ref pdf) => json!([
                { "type": "text", "text": request.prompt },
                {
                    "type": "file",
                    "file": {
                        "filename": "document.pdf",
                        "file_data": format!("data:application/pdf;base64,{pdf}"),
                    }
                }
            ]),
            None => json!(request.prompt),
        };
        messages.push(json!({ "role": "user", "content": user_content }));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": stream,
        });
        if request.max_tokens > 0 {
            body["max_tokens"] = json!(request.max_tokens);
        }
        body
    }

    async fn post(&self, body: &Value) -> anyhow::Result<reqwest::Response> {
        let mut builder = self.http_client.post(self.completions_url()).json(body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{}", error_message(status.as_u16(), &text));
        }
        Ok(response)
    }
}

/// What one streamed `data:` payload carried
#[derive(Debug, PartialEq, Eq)]
enum StreamPayload {
    Text(String),
    Done,
    Failed(String),
    Nothing,
}

fn parse_stream_payload(data: &str) -> StreamPayload {
    let data = data.trim();
    if data == DONE_MARKER {
        return StreamPayload::Done;
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        tracing::debug!(payload = %data, "Skipping unparseable completion chunk");
        return StreamPayload::Nothing;
    };
    if let Some(message) = value
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(Value::as_str)
    {
        return StreamPayload::Failed(message.to_string());
    }
    match value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(text) if !text.is_empty() => StreamPayload::Text(text.to_string()),
        _ => StreamPayload::Nothing,
    }
}

/// Prefer the `error.message` of an error body over the raw text
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| format!("LLM endpoint returned {status}: {body}"))
}

/// Forward a streamed completion body to `tx` as tokens
///
/// Ends after `[DONE]`, an upstream error or a read failure, and as soon as
/// the receiver is dropped even while the body is silent. A body that ends
/// without `[DONE]` is reported as an error.
async fn forward_completion<S, B, E>(bytes: S, tx: mpsc::Sender<StreamingToken>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut bytes = std::pin::pin!(bytes);
    let mut decoder = SseDecoder::new();
    let mut full_response = String::new();

    loop {
        let chunk = tokio::select! {
            () = tx.closed() => {
                tracing::debug!("Completion receiver dropped, closing stream");
                return;
            }
            chunk = bytes.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                return;
            }
            None => break,
        };

        for frame in decoder.feed(chunk.as_ref()) {
            if deliver(parse_stream_payload(&frame.data), &tx, &mut full_response)
                .await
                .is_break()
            {
                return;
            }
        }
    }

    for frame in decoder.finish() {
        if deliver(parse_stream_payload(&frame.data), &tx, &mut full_response)
            .await
            .is_break()
        {
            return;
        }
    }

    tracing::warn!(received = full_response.len(), "Completion stream ended before [DONE]");
    let _ = tx.send(StreamingToken::Error(TRUNCATED_MESSAGE.to_string())).await;
}

/// Send what one payload carried; `Break` once the stream is over
async fn deliver(
    payload: StreamPayload,
    tx: &mpsc::Sender<StreamingToken>,
    full_response: &mut String,
) -> ControlFlow<()> {
    match payload {
        StreamPayload::Text(text) => {
            full_response.push_str(&text);
            if tx.send(StreamingToken::Token(text)).await.is_err() {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        StreamPayload::Done => {
            let _ = tx
                .send(StreamingToken::Complete {
                    message: std::mem::take(full_response),
                })
                .await;
            ControlFlow::Break(())
        }
        StreamPayload::Failed(message) => {
            let _ = tx.send(StreamingToken::Error(message)).await;
            ControlFlow::Break(())
        }
        StreamPayload::Nothing => ControlFlow::Continue(()),
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        let (tx, rx) = mpsc::channel(100);

        let body = Self::build_body(request, true);
        let response = self.post(&body).await?;

        tracing::debug!(model = %request.model, "Completion stream opened");
        tokio::spawn(forward_completion(response.bytes_stream(), tx));

        Ok(rx)
    }

    async fn send(&self, request: &LlmRequest) -> anyhow::Result<LlmResponse> {
        let start = Instant::now();
        let body = Self::build_body(request, false);
        let response = self.post(&body).await?;
        let data: Value = response.json().await?;

        let content = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let tokens_used = data
            .pointer("/usage/total_tokens")
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok());

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            tokens_used,
            duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
        })
    }
}
