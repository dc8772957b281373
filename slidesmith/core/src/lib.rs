//! Slidesmith Core - Incremental Slide-Prompt Streaming
//!
//! A model asked for a slide deck answers with free-form text in which each
//! slide is a bold heading followed by a fenced block:
//!
//! ````text
//! **Slide 2: Market Overview**
//! ```
//! Wide shot of a trading floor, warm light, ...
//! ```
//! ````
//!
//! This crate recognizes those blocks while the text is still arriving and
//! surfaces each slide the moment it is complete, no matter how the stream
//! splits the text.
//!
//! # Architecture
//!
//! ```text
//!  model text ──> SlideAssembler ──> SlideEmitter ──> new slides
//!                 (grammar.rs)       (dedup by number)
//!                      └──── SlidePipeline ────┘
//!
//!  server side:  LlmBackend ──> SlideEventProducer ──> EventFramer ──> SSE frames
//!  client side:  EventSource ──> EventStream ──> GenerationController ──> SessionStore
//!  batches:      BatchRunner ──> GenerationController (one slot per topic)
//!  optimizer:    PromptOptimizer ──> LlmBackend::send
//! ```
//!
//! # Key Types
//!
//! - [`Slide`]: one parsed slide
//! - [`SlidePipeline`]: chunk in, new slides out, one per generation
//! - [`EventStream`]: cancellable stream of [`SlideEvent`]s
//! - [`GenerationController`]: runs generations per session slot
//! - [`GeneratedPrompt`]: the combined artifact of a finished generation
//! - [`BatchRunner`]: a queue of topics generated one after another
//! - [`PromptOptimizer`]: model-driven rewrite of a slide prompt
//!
//! # Module Overview
//!
//! - [`slide`]: the slide record
//! - [`grammar`]: strict and fallback matchers, whole-document parse
//! - [`assembler`]: growing buffer over the strict matcher
//! - [`emitter`]: first-wins dedup by slide number
//! - [`pipeline`]: assembler plus emitter
//! - [`sse`]: SSE decoding and the cancellable event stream
//! - [`source`]: HTTP and direct-model event sources
//! - [`producer`]: server-side framing of model text into events
//! - [`controller`]: generation lifecycle per session slot
//! - [`session`]: session records and the in-memory store
//! - [`export`]: the generated prompt artifact and download formats
//! - [`batch`]: batch generation over several session slots
//! - [`optimize`]: the prompt optimizer
//! - [`prompt`]: request types and prompt templates
//! - [`backend`]: LLM backend abstraction
//! - [`limit`]: injected request limiter
//! - [`config`]: TOML and environment configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assembler;
pub mod backend;
pub mod batch;
pub mod config;
pub mod controller;
pub mod emitter;
pub mod export;
pub mod grammar;
pub mod limit;
pub mod optimize;
pub mod pipeline;
pub mod producer;
pub mod prompt;
pub mod session;
pub mod slide;
pub mod source;
pub mod sse;

// Re-exports for convenience
pub use assembler::SlideAssembler;
pub use backend::{LlmBackend, LlmConfig, LlmRequest, LlmResponse, OpenAiBackend, StreamingToken};
pub use batch::{BatchJob, BatchJobStatus, BatchRunner, BatchState, MAX_BATCH_TOPICS};
pub use controller::{GenerationController, GenerationOutcome};
pub use emitter::SlideEmitter;
pub use export::{sanitize_filename, Download, ExportFormat, GeneratedPrompt};
pub use grammar::{parse_document, MatchResult};
pub use limit::{RateLimited, RequestLimiter};
pub use optimize::{OptimizationResult, OptimizationScore, OptimizeError, PromptOptimizer};
pub use pipeline::SlidePipeline;
pub use producer::{produce_events, EventFramer, SlideEventProducer};
pub use prompt::{
    AspectRatio, ColorPalette, ContentInput, GenerateRequest, LayoutStructure,
    PresentationSettings, RequestError, SlideStyle,
};
pub use session::{
    MemorySessionStore, SessionId, SessionRecord, SessionStatus, SessionStore, SessionUpdate,
};
pub use slide::Slide;
pub use source::{DocumentGeneration, EventSource, GenerationDefaults, HttpEventSource, LlmEventSource};
pub use sse::{DoneSummary, EventStream, SlideEvent, TransportError, TransportState};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, SlidesmithConfig, SlidesmithToml,
};
