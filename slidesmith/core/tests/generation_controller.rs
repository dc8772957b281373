//! Generation controller against scripted event sources
//!
//! Tests cover:
//! - completion with slide events and with raw text chunks
//! - transport failures keeping partial slides
//! - cancellation and superseding while a read is pending
//! - derived session titles
//! - non-streaming generations over a scripted backend

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use slidesmith_core::session::{MemorySessionStore, DEFAULT_TITLE};
use slidesmith_core::sse::BoxEventStream;
use slidesmith_core::{
    ContentInput, DoneSummary, EventSource, EventStream, GenerateRequest, GenerationController,
    GenerationOutcome, LlmBackend, LlmEventSource, LlmRequest, LlmResponse, SessionId,
    SessionStatus, SessionStore, SessionUpdate, Slide, SlideEvent, StreamingToken, TransportError,
};

// =============================================================================
// Test doubles
// =============================================================================

/// One scripted stream: its events, then either the end or a read that never
/// completes
struct Script {
    events: Vec<Result<SlideEvent, TransportError>>,
    hang: bool,
}

impl Script {
    fn finished(events: Vec<Result<SlideEvent, TransportError>>) -> Self {
        Self { events, hang: false }
    }

    fn hanging(events: Vec<Result<SlideEvent, TransportError>>) -> Self {
        Self { events, hang: true }
    }
}

/// Hands out one script per `open`
#[derive(Default)]
struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedSource {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
        }
    }
}

impl EventSource for ScriptedSource {
    fn open(&self, _request: &GenerateRequest, cancel: CancellationToken) -> EventStream {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::finished(Vec::new()));

        let events = stream::iter(script.events);
        let stream: BoxEventStream = if script.hang {
            events
                .chain(stream::pending::<Result<SlideEvent, TransportError>>())
                .boxed()
        } else {
            events.boxed()
        };
        EventStream::from_stream(stream, cancel)
    }
}

/// Answers every full completion the same way
enum DocumentBackend {
    Reply(String),
    Fail(String),
    Hang,
}

#[async_trait]
impl LlmBackend for DocumentBackend {
    fn name(&self) -> &str {
        "document"
    }

    async fn send_streaming(
        &self,
        _request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        anyhow::bail!("streaming not scripted")
    }

    async fn send(&self, request: &LlmRequest) -> anyhow::Result<LlmResponse> {
        match self {
            Self::Reply(content) => Ok(LlmResponse {
                content: content.clone(),
                model: request.model.clone(),
                tokens_used: Some(64),
                duration_ms: Some(250),
            }),
            Self::Fail(message) => anyhow::bail!("{message}"),
            Self::Hang => std::future::pending().await,
        }
    }
}

fn document_controller<T: SessionStore>(
    backend: DocumentBackend,
    store: Arc<T>,
) -> GenerationController<LlmEventSource, T> {
    GenerationController::new(LlmEventSource::new(Arc::new(backend)), store)
}

/// Forwards updates to the test and to a memory store
struct Observed {
    memory: MemorySessionStore,
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl SessionStore for Observed {
    fn apply(&self, slot: &SessionId, update: SessionUpdate) {
        let _ = self.tx.send(update.clone());
        self.memory.apply(slot, update);
    }
}

fn observed() -> (Arc<Observed>, mpsc::UnboundedReceiver<SessionUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(Observed {
            memory: MemorySessionStore::new(),
            tx,
        }),
        rx,
    )
}

fn request() -> GenerateRequest {
    GenerateRequest::new(ContentInput::topic("Ocean tides")).with_slide_count(3)
}

fn slide(n: u32) -> Result<SlideEvent, TransportError> {
    Ok(SlideEvent::Slide(Slide::new(n, format!("Slide title {n}"), format!("body {n}"))))
}

fn done() -> Result<SlideEvent, TransportError> {
    Ok(SlideEvent::Done(DoneSummary::default()))
}

/// Wait until the store has seen `count` slides
async fn wait_for_slides(rx: &mut mpsc::UnboundedReceiver<SessionUpdate>, count: usize) {
    let wait = async {
        while let Some(update) = rx.recv().await {
            if matches!(update, SessionUpdate::Slides(ref s) if s.len() == count) {
                return;
            }
        }
        panic!("store closed before {count} slides arrived");
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("slides never arrived");
}

fn numbers(slides: &[Slide]) -> Vec<u32> {
    slides.iter().map(|s| s.slide_number).collect()
}

// =============================================================================
// Completion
// =============================================================================

#[tokio::test]
async fn test_completed_generation() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let controller = GenerationController::new(
        ScriptedSource::new(vec![Script::finished(vec![slide(3), slide(1), slide(2), done()])]),
        Arc::clone(&store),
    );

    let outcome = controller.generate(&slot, request()).await;

    let GenerationOutcome::Completed { slides, prompt } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(numbers(&slides), vec![1, 2, 3]);
    assert_eq!(prompt.slides, slides);

    let record = store.memory.get(&slot).unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.slides, slides);
    assert_eq!(record.generated_prompt, Some(prompt));
    assert_eq!(record.error, None);
    assert_eq!(record.title, "Slide title 1");
    assert_eq!(record.config, Some(request()));
    assert!(!controller.is_active(&slot));
}

#[tokio::test]
async fn test_chunks_parsed_client_side() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let chunks = [
        "**Slide 1: Intro**\n``",
        "`\nOpening remarks about the topic.\n``",
        "`\n\n**Slide 2: Details**\n```\nDeep dive into specifics.",
    ];
    let mut events: Vec<Result<SlideEvent, TransportError>> = chunks
        .iter()
        .map(|c| Ok(SlideEvent::Chunk((*c).to_string())))
        .collect();
    events.push(done());

    let controller = GenerationController::new(
        ScriptedSource::new(vec![Script::finished(events)]),
        Arc::clone(&store),
    );
    let outcome = controller.generate(&slot, request()).await;

    // The second slide has no closing fence and is recovered at `done`
    assert_eq!(
        outcome.slides(),
        &[
            Slide::new(1, "Intro", "Opening remarks about the topic."),
            Slide::new(2, "Details", "Deep dive into specifics."),
        ]
    );
    assert_eq!(store.memory.get(&slot).unwrap().status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_title_kept_after_rename() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    assert!(store.memory.rename(&slot, "My deck"));

    let controller = GenerationController::new(
        ScriptedSource::new(vec![Script::finished(vec![slide(1), done()])]),
        Arc::clone(&store),
    );
    controller.generate(&slot, request()).await;

    assert_eq!(store.memory.get(&slot).unwrap().title, "My deck");
}

#[tokio::test]
async fn test_long_first_title_truncated() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let long = Slide::new(1, "An unusually long opening slide title", "body");

    let controller = GenerationController::new(
        ScriptedSource::new(vec![Script::finished(vec![Ok(SlideEvent::Slide(long)), done()])]),
        Arc::clone(&store),
    );
    controller.generate(&slot, request()).await;

    assert_eq!(
        store.memory.get(&slot).unwrap().title,
        "An unusually long opening slid..."
    );
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_transport_error_keeps_partial_slides() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let controller = GenerationController::new(
        ScriptedSource::new(vec![Script::finished(vec![
            slide(1),
            Err(TransportError::Read("connection reset".to_string())),
        ])]),
        Arc::clone(&store),
    );

    let outcome = controller.generate(&slot, request()).await;
    assert_eq!(
        outcome,
        GenerationOutcome::Failed {
            slides: vec![Slide::new(1, "Slide title 1", "body 1")],
            error: "Stream read failed: connection reset".to_string(),
        }
    );

    let record = store.memory.get(&slot).unwrap();
    assert_eq!(record.status, SessionStatus::Error);
    assert_eq!(record.error.as_deref(), Some("Stream read failed: connection reset"));
    assert_eq!(numbers(&record.slides), vec![1]);
    assert_eq!(record.title, DEFAULT_TITLE);
}

#[tokio::test]
async fn test_stream_ending_without_done_is_an_error() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let controller = GenerationController::new(
        ScriptedSource::new(vec![Script::finished(vec![slide(1)])]),
        Arc::clone(&store),
    );

    let outcome = controller.generate(&slot, request()).await;
    assert!(matches!(outcome, GenerationOutcome::Failed { ref error, .. }
        if error == "Stream ended before generation completed"));
    assert_eq!(store.memory.get(&slot).unwrap().status, SessionStatus::Error);
}

#[tokio::test]
async fn test_http_error_message_reported() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let controller = GenerationController::new(
        ScriptedSource::new(vec![Script::finished(vec![Err(TransportError::http(503, None))])]),
        Arc::clone(&store),
    );

    controller.generate(&slot, request()).await;
    assert_eq!(
        store.memory.get(&slot).unwrap().error.as_deref(),
        Some("HTTP error: 503")
    );
}

#[tokio::test]
async fn test_new_generation_clears_previous_error() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let controller = GenerationController::new(
        ScriptedSource::new(vec![
            Script::finished(vec![Ok(SlideEvent::Error("quota exceeded".to_string()))]),
            Script::finished(vec![slide(1), done()]),
        ]),
        Arc::clone(&store),
    );

    controller.generate(&slot, request()).await;
    assert_eq!(store.memory.get(&slot).unwrap().status, SessionStatus::Error);

    controller.generate(&slot, request()).await;
    let record = store.memory.get(&slot).unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.error, None);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_mid_stream() {
    let (store, mut rx) = observed();
    let slot = store.memory.create();
    let controller = Arc::new(GenerationController::new(
        ScriptedSource::new(vec![Script::hanging(vec![slide(1), slide(2)])]),
        Arc::clone(&store),
    ));

    let task = {
        let controller = Arc::clone(&controller);
        let slot = slot.clone();
        tokio::spawn(async move { controller.generate(&slot, request()).await })
    };

    wait_for_slides(&mut rx, 2).await;
    assert!(controller.is_active(&slot));
    assert!(controller.cancel(&slot));
    assert!(!controller.cancel(&slot));

    let outcome = task.await.unwrap();
    assert_eq!(numbers(outcome.slides()), vec![1, 2]);
    assert!(matches!(outcome, GenerationOutcome::Cancelled { .. }));

    let record = store.memory.get(&slot).unwrap();
    assert_eq!(record.status, SessionStatus::Idle);
    assert_eq!(record.error, None);
    assert_eq!(numbers(&record.slides), vec![1, 2]);
    assert_eq!(controller.active_count(), 0);
}

#[tokio::test]
async fn test_supersede_running_generation() {
    let (store, mut rx) = observed();
    let slot = store.memory.create();
    let controller = Arc::new(GenerationController::new(
        ScriptedSource::new(vec![
            Script::hanging(vec![slide(1)]),
            Script::finished(vec![slide(5), slide(4), done()]),
        ]),
        Arc::clone(&store),
    ));

    let first = {
        let controller = Arc::clone(&controller);
        let slot = slot.clone();
        tokio::spawn(async move { controller.generate(&slot, request()).await })
    };
    wait_for_slides(&mut rx, 1).await;

    let second = controller.generate(&slot, request()).await;
    assert_eq!(numbers(second.slides()), vec![4, 5]);

    let first = first.await.unwrap();
    assert_eq!(first, GenerationOutcome::Cancelled { slides: vec![Slide::new(1, "Slide title 1", "body 1")] });

    let record = store.memory.get(&slot).unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(numbers(&record.slides), vec![4, 5]);
}

#[tokio::test]
async fn test_slots_are_independent() {
    let (store, mut rx) = observed();
    let busy = store.memory.create();
    let other = store.memory.create();
    let controller = Arc::new(GenerationController::new(
        ScriptedSource::new(vec![
            Script::hanging(vec![slide(1)]),
            Script::finished(vec![slide(1), slide(2), done()]),
        ]),
        Arc::clone(&store),
    ));

    let task = {
        let controller = Arc::clone(&controller);
        let busy = busy.clone();
        tokio::spawn(async move { controller.generate(&busy, request()).await })
    };
    wait_for_slides(&mut rx, 1).await;

    let outcome = controller.generate(&other, request()).await;
    assert!(matches!(outcome, GenerationOutcome::Completed { .. }));
    assert!(controller.is_active(&busy));
    assert!(!controller.is_active(&other));

    controller.cancel(&busy);
    task.await.unwrap();
    assert_eq!(store.memory.get(&busy).unwrap().status, SessionStatus::Idle);
    assert_eq!(store.memory.get(&other).unwrap().status, SessionStatus::Completed);
}

// =============================================================================
// Non-streaming generations
// =============================================================================

#[tokio::test]
async fn test_document_generation_completes() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let controller = document_controller(
        DocumentBackend::Reply(
            "**Slide 2: Currents**\n```\nArrows over a globe\n```\n\n**Slide 1: Tides**\n```\nMoon over a harbor\n```"
                .to_string(),
        ),
        Arc::clone(&store),
    );

    let outcome = controller.generate_document(&slot, request()).await;
    let GenerationOutcome::Completed { slides, prompt } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(numbers(&slides), vec![1, 2]);
    assert_eq!(prompt.slides, slides);

    let record = store.memory.get(&slot).unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.slides, slides);
    assert_eq!(record.title, "Tides");
    assert_eq!(record.generated_prompt, Some(prompt));
    assert!(!controller.is_active(&slot));
}

#[tokio::test]
async fn test_document_generation_failure_reported() {
    let (store, _rx) = observed();
    let slot = store.memory.create();
    let controller = document_controller(
        DocumentBackend::Fail("model unavailable".to_string()),
        Arc::clone(&store),
    );

    let outcome = controller.generate_document(&slot, request()).await;
    assert_eq!(
        outcome,
        GenerationOutcome::Failed {
            slides: Vec::new(),
            error: "Backend error: model unavailable".to_string(),
        }
    );

    let record = store.memory.get(&slot).unwrap();
    assert_eq!(record.status, SessionStatus::Error);
    assert_eq!(record.error.as_deref(), Some("Backend error: model unavailable"));
}

#[tokio::test]
async fn test_cancel_document_generation() {
    let (store, mut rx) = observed();
    let slot = store.memory.create();
    let controller = Arc::new(document_controller(DocumentBackend::Hang, Arc::clone(&store)));

    let task = {
        let controller = Arc::clone(&controller);
        let slot = slot.clone();
        tokio::spawn(async move { controller.generate_document(&slot, request()).await })
    };

    let started = async {
        while let Some(update) = rx.recv().await {
            if update == SessionUpdate::Status(SessionStatus::Generating) {
                return;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), started)
        .await
        .expect("generation never started");

    assert!(controller.cancel(&slot));
    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("generation ignored cancel")
        .unwrap();
    assert_eq!(outcome, GenerationOutcome::Cancelled { slides: Vec::new() });
    assert_eq!(store.memory.get(&slot).unwrap().status, SessionStatus::Idle);
    assert_eq!(controller.active_count(), 0);
}
