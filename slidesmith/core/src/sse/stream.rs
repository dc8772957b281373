//! Byte stream adapter and cancellable event stream
//!
//! [`sse_event_stream`] turns any stream of byte chunks into typed events.
//! [`EventStream`] wraps such a stream (or a future that yields one) in the
//! transport state machine:
//!
//! ```text
//! Idle ──> Connecting ──> Streaming ──┬──> Completed
//!                                     ├──> Failed
//!                                     └──> Cancelled
//! ```
//!
//! Cancellation is raced against every await, so a stop takes effect while a
//! read is still pending rather than after the body drains.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::decoder::{SseDecoder, SseFrame};
use super::error::TransportError;
use super::event::SlideEvent;

/// Boxed stream of transport results
pub type BoxEventStream = BoxStream<'static, Result<SlideEvent, TransportError>>;

// ============================================================================
// Byte stream adapter
// ============================================================================

struct Decoding<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    ready: VecDeque<SlideEvent>,
    exhausted: bool,
}

impl<S> Decoding<S> {
    fn queue(&mut self, frames: Vec<SseFrame>) {
        for frame in frames {
            match SlideEvent::from_frame(&frame) {
                Ok(Some(event)) => self.ready.push_back(event),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(event = %frame.event, error = %e, "Dropping malformed event payload");
                }
            }
        }
    }
}

/// Decode a byte stream into slide events
///
/// Read errors end the stream after being yielded once. The stream itself
/// never reports a missing terminal event; [`EventStream`] does that.
pub fn sse_event_stream<S, B, E>(bytes: S) -> BoxEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = Decoding {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.exhausted {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.feed(chunk.as_ref());
                    state.queue(frames);
                }
                Some(Err(e)) => {
                    state.exhausted = true;
                    return Some((Err(TransportError::Read(e.to_string())), state));
                }
                None => {
                    state.exhausted = true;
                    let frames = state.decoder.finish();
                    state.queue(frames);
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// Event stream state machine
// ============================================================================

/// Lifecycle of one transport stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    /// Created, nothing requested yet
    Idle,
    /// Waiting for the connection and response headers
    Connecting,
    /// Reading events
    Streaming,
    /// A `done` event arrived
    Completed,
    /// An `error` event or a transport failure
    Failed,
    /// Stopped by the consumer
    Cancelled,
}

impl TransportState {
    /// Whether no more events can be delivered
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

type ConnectFuture = BoxFuture<'static, Result<BoxEventStream, TransportError>>;

/// A cancellable stream of slide events
pub struct EventStream {
    state: TransportState,
    connect: Option<ConnectFuture>,
    inner: Option<BoxEventStream>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("state", &self.state)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl EventStream {
    /// Stream that connects lazily on the first `next_event`
    pub fn connect<F>(connect: F, cancel: CancellationToken) -> Self
    where
        F: Future<Output = Result<BoxEventStream, TransportError>> + Send + 'static,
    {
        Self {
            state: TransportState::Idle,
            connect: Some(Box::pin(connect)),
            inner: None,
            cancel,
        }
    }

    /// Stream over an already open event source
    #[must_use]
    pub fn from_stream(stream: BoxEventStream, cancel: CancellationToken) -> Self {
        Self {
            state: TransportState::Streaming,
            connect: None,
            inner: Some(stream),
            cancel,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Token that stops this stream
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop the stream; the pending read is abandoned
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.abort();
    }

    /// Next event, or `None` once the stream is finished or cancelled
    ///
    /// A body that ends without `done` or `error` yields
    /// [`TransportError::UnexpectedEof`] once.
    pub async fn next_event(&mut self) -> Option<Result<SlideEvent, TransportError>> {
        if self.state.is_terminal() {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.abort();
            return None;
        }

        if let Some(connect) = self.connect.take() {
            self.state = TransportState::Connecting;
            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                result = connect => Some(result),
            };
            match connected {
                None => {
                    self.abort();
                    return None;
                }
                Some(Ok(stream)) => {
                    tracing::debug!("Event stream connected");
                    self.inner = Some(stream);
                    self.state = TransportState::Streaming;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Event stream failed to connect");
                    self.state = TransportState::Failed;
                    return Some(Err(e));
                }
            }
        }

        let inner = self.inner.as_mut()?;
        let cancel = &self.cancel;
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            item = inner.next() => Some(item),
        };

        let Some(item) = item else {
            self.abort();
            return None;
        };
        // Buffered events must not slip out after a stop
        if self.cancel.is_cancelled() {
            self.abort();
            return None;
        }

        match item {
            Some(Ok(event)) => {
                match &event {
                    SlideEvent::Done(_) => self.finish(TransportState::Completed),
                    SlideEvent::Error(message) => {
                        tracing::warn!(error = %message, "Generation stream reported an error");
                        self.finish(TransportState::Failed);
                    }
                    SlideEvent::Slide(_) | SlideEvent::Chunk(_) => {}
                }
                Some(Ok(event))
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Event stream failed");
                self.finish(TransportState::Failed);
                Some(Err(e))
            }
            None => {
                tracing::warn!("Event stream ended without a terminal event");
                self.finish(TransportState::Failed);
                Some(Err(TransportError::UnexpectedEof))
            }
        }
    }

    fn finish(&mut self, state: TransportState) {
        self.inner = None;
        self.state = state;
    }

    fn abort(&mut self) {
        self.connect = None;
        self.inner = None;
        self.state = TransportState::Cancelled;
        tracing::debug!("Event stream cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::Slide;
    use crate::sse::event::DoneSummary;
    use bytes::Bytes;

    fn body(parts: &[&'static str]) -> BoxEventStream {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        sse_event_stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_decodes_events_split_across_chunks() {
        let mut events = body(&[
            "event: slide\ndata: {\"slideNumber\":1,\"tit",
            "le\":\"Intro\",\"prompt\":\"Hi\"}\n",
            "\nevent: done\ndata: {\"totalSlides\":1}\n\n",
        ]);

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first, SlideEvent::Slide(Slide::new(1, "Intro", "Hi")));
        let second = events.next().await.unwrap().unwrap();
        assert!(matches!(second, SlideEvent::Done(DoneSummary { total_slides: Some(1), .. })));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_payload_skipped() {
        let mut events = body(&[
            "event: slide\ndata: {broken\n\n",
            "event: error\ndata: {\"error\":\"boom\"}\n\n",
        ]);
        let only = events.next().await.unwrap().unwrap();
        assert_eq!(only, SlideEvent::Error("boom".to_string()));
    }

    #[tokio::test]
    async fn test_read_error_surfaces() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))];
        let mut events = sse_event_stream(stream::iter(chunks));
        let err = events.next().await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Read(_)));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_state_machine_completes() {
        let token = CancellationToken::new();
        let mut stream = EventStream::connect(
            async { Ok(body(&["event: done\ndata: {}\n\n"])) },
            token,
        );
        assert_eq!(stream.state(), TransportState::Idle);

        let event = stream.next_event().await.unwrap().unwrap();
        assert!(event.is_terminal());
        assert_eq!(stream.state(), TransportState::Completed);
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_unexpected_eof() {
        let mut stream = EventStream::from_stream(
            body(&["event: chunk\ndata: {\"text\":\"x\"}\n\n"]),
            CancellationToken::new(),
        );
        assert!(matches!(
            stream.next_event().await,
            Some(Ok(SlideEvent::Chunk(_)))
        ));
        assert!(matches!(
            stream.next_event().await,
            Some(Err(TransportError::UnexpectedEof))
        ));
        assert_eq!(stream.state(), TransportState::Failed);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mut stream = EventStream::connect(
            async { Err(TransportError::http(503, None)) },
            CancellationToken::new(),
        );
        let err = stream.next_event().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "HTTP error: 503");
        assert_eq!(stream.state(), TransportState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_before_buffered_events_delivered() {
        let token = CancellationToken::new();
        let mut stream = EventStream::from_stream(
            body(&[
                "event: chunk\ndata: {\"text\":\"a\"}\n\nevent: chunk\ndata: {\"text\":\"b\"}\n\n",
            ]),
            token.clone(),
        );
        assert!(stream.next_event().await.is_some());

        token.cancel();
        assert!(stream.next_event().await.is_none());
        assert_eq!(stream.state(), TransportState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_read() {
        let token = CancellationToken::new();
        let mut stream = EventStream::from_stream(
            stream::pending::<Result<SlideEvent, TransportError>>().boxed(),
            token.clone(),
        );

        let canceller = token.clone();
        tokio::spawn(async move { canceller.cancel() });

        assert!(stream.next_event().await.is_none());
        assert_eq!(stream.state(), TransportState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_while_connecting() {
        let token = CancellationToken::new();
        let mut stream = EventStream::connect(
            futures::future::pending::<Result<BoxEventStream, TransportError>>(),
            token.clone(),
        );
        token.cancel();
        assert!(stream.next_event().await.is_none());
        assert_eq!(stream.state(), TransportState::Cancelled);
    }
}
