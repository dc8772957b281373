//! Stream Transport Adapter
//!
//! Turns a framed push response body into a typed sequence of
//! [`SlideEvent`]s. The wire framing is server-sent events:
//!
//! ```text
//! event: slide
//! data: {"slideNumber":2,"title":"...","prompt":"..."}
//!
//! event: done
//! data: {"totalSlides":10,"style":"...","aspectRatio":"..."}
//! ```
//!
//! # Module structure
//! - `decoder` - incremental UTF-8 and SSE line framing
//! - `event` - event types and their JSON payloads
//! - `error` - transport errors
//! - `stream` - byte stream adapter and the cancellable [`EventStream`]

mod decoder;
mod error;
mod event;
mod stream;

pub use decoder::{SseDecoder, SseFrame, Utf8Decoder};
pub use error::TransportError;
pub use event::{DoneSummary, SlideEvent};
pub use stream::{sse_event_stream, BoxEventStream, EventStream, TransportState};
