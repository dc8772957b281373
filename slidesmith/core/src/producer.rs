//! Server-side framing
//!
//! The producer sits between the model and an SSE response: raw text goes in
//! through a [`SlidePipeline`], complete slides come out as `slide` events and
//! the end of the completion becomes one `done` (or `error`) event.

use tokio::sync::mpsc;

use crate::backend::StreamingToken;
use crate::pipeline::SlidePipeline;
use crate::sse::{DoneSummary, SlideEvent};

/// Buffered events between the framing task and the response writer
const EVENT_BUFFER: usize = 64;

/// Turns model text into slide events for one response
#[derive(Debug)]
pub struct SlideEventProducer {
    pipeline: SlidePipeline,
    style: String,
    aspect_ratio: String,
}

impl SlideEventProducer {
    /// Producer for a response in `style` and `aspect_ratio`
    pub fn new(style: impl Into<String>, aspect_ratio: impl Into<String>) -> Self {
        Self {
            pipeline: SlidePipeline::new(),
            style: style.into(),
            aspect_ratio: aspect_ratio.into(),
        }
    }

    /// Feed model text; returns `slide` events for slides it completed
    pub fn on_text(&mut self, chunk: &str) -> Vec<SlideEvent> {
        self.pipeline
            .push(chunk)
            .into_iter()
            .map(SlideEvent::Slide)
            .collect()
    }

    /// End of the completion: remaining slides, then `done`
    pub fn finish(&mut self) -> Vec<SlideEvent> {
        let mut events: Vec<SlideEvent> = self
            .pipeline
            .finish()
            .into_iter()
            .map(SlideEvent::Slide)
            .collect();
        events.push(SlideEvent::Done(DoneSummary {
            total_slides: Some(self.pipeline.emitted_count()),
            style: Some(self.style.clone()),
            aspect_ratio: Some(self.aspect_ratio.clone()),
        }));
        events
    }

    /// The completion failed
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> SlideEvent {
        SlideEvent::Error(message.into())
    }
}

/// Numbers the frames of one SSE response, starting at 1
#[derive(Debug)]
pub struct EventFramer {
    next_id: u64,
}

impl Default for EventFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFramer {
    /// Framer for a fresh response
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Serialize `event` as the next frame
    pub fn frame(&mut self, event: &SlideEvent) -> String {
        let id = self.next_id;
        self.next_id += 1;
        event.to_frame(Some(id))
    }
}

/// Spawn the framing task for a backend token stream
///
/// The task ends after `done` or `error`, or as soon as the returned receiver
/// is dropped. A token channel that closes without completing is treated as
/// completion, so slides still in the buffer are flushed.
#[must_use]
pub fn produce_events(
    mut rx: mpsc::Receiver<StreamingToken>,
    style: impl Into<String>,
    aspect_ratio: impl Into<String>,
) -> mpsc::Receiver<SlideEvent> {
    let (tx, events) = mpsc::channel(EVENT_BUFFER);
    let mut producer = SlideEventProducer::new(style, aspect_ratio);

    tokio::spawn(async move {
        while let Some(token) = rx.recv().await {
            let batch = match token {
                StreamingToken::Token(text) => producer.on_text(&text),
                StreamingToken::Complete { .. } => {
                    send_all(&tx, producer.finish()).await;
                    return;
                }
                StreamingToken::Error(message) => {
                    tracing::warn!(error = %message, "Completion failed mid-stream");
                    let _ = tx.send(producer.fail(message)).await;
                    return;
                }
            };
            if !send_all(&tx, batch).await {
                tracing::debug!("Event receiver dropped, stopping producer");
                return;
            }
        }
        send_all(&tx, producer.finish()).await;
    });

    events
}

/// Returns `false` once the receiver is gone
async fn send_all(tx: &mpsc::Sender<SlideEvent>, events: Vec<SlideEvent>) -> bool {
    for event in events {
        if tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}
