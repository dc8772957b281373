//! LLM Backend Integration
//!
//! Abstracted access to the model through a common trait interface.
//!
//! # Available Backends
//!
//! - **OpenAI**: any OpenAI-compatible chat completions endpoint
//!
//! # Usage
//!
//! ```ignore
//! use slidesmith_core::backend::{LlmBackend, LlmRequest, OpenAiBackend};
//!
//! let backend = OpenAiBackend::from_env();
//! let request = LlmRequest::new("Hello!", "gpt-4o");
//! let rx = backend.send_streaming(&request).await?;
//! ```

mod openai;
mod traits;

pub use openai::{OpenAiBackend, DEFAULT_BASE_URL};
pub use traits::{LlmBackend, LlmConfig, LlmRequest, LlmResponse, StreamingToken};
