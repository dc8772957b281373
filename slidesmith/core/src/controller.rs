//! Generation Session Controller
//!
//! Runs one streaming generation per session slot and reports every visible
//! transition to a [`SessionStore`].
//!
//! # Lifecycle
//!
//! ```text
//! generate(slot)
//!   ├─ supersede: cancel the slot's running generation (reported Idle)
//!   ├─ reset: slides [], prompt None, error None, status Generating
//!   ├─ stream: slide/chunk events → pipeline → sorted slide list
//!   └─ end:    done → Completed | error → Error | cancel → silent
//! ```
//!
//! With an [`LlmEventSource`], [`GenerationController::generate_document`]
//! runs the same lifecycle over a single non-streaming model call.
//!
//! Each generation gets its own [`CancellationToken`] and [`SlidePipeline`].
//! Updates are published under the controller's lock and only while the
//! generation is still the slot's current one, so a superseded or cancelled
//! run can never write over its successor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::export::GeneratedPrompt;
use crate::pipeline::SlidePipeline;
use crate::prompt::GenerateRequest;
use crate::session::{derive_title, SessionId, SessionStatus, SessionStore, SessionUpdate};
use crate::slide::{sort_by_number, Slide};
use crate::source::{EventSource, LlmEventSource};
use crate::sse::SlideEvent;

/// How a generation ended
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationOutcome {
    /// The stream sent `done`
    Completed {
        /// Every slide, sorted by number
        slides: Vec<Slide>,
        /// Combined artifact
        prompt: GeneratedPrompt,
    },
    /// The stream or the backend failed; partial slides are kept
    Failed {
        /// Slides surfaced before the failure
        slides: Vec<Slide>,
        /// Error message as reported
        error: String,
    },
    /// Cancelled or superseded
    Cancelled {
        /// Slides surfaced before the stop
        slides: Vec<Slide>,
    },
}

impl GenerationOutcome {
    /// Slides of the generation, whatever the outcome
    #[must_use]
    pub fn slides(&self) -> &[Slide] {
        match self {
            Self::Completed { slides, .. } | Self::Failed { slides, .. } | Self::Cancelled { slides } => {
                slides
            }
        }
    }
}

#[derive(Debug)]
struct ActiveGeneration {
    id: u64,
    cancel: CancellationToken,
}

/// Drives generations for any number of session slots
pub struct GenerationController<S, T> {
    source: S,
    store: Arc<T>,
    active: Mutex<HashMap<SessionId, ActiveGeneration>>,
    next_generation: AtomicU64,
}

impl<S, T> std::fmt::Debug for GenerationController<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationController")
            .field("active", &self.active.lock().len())
            .finish_non_exhaustive()
    }
}

impl<S: EventSource, T: SessionStore> GenerationController<S, T> {
    /// Controller streaming from `source` and reporting to `store`
    pub fn new(source: S, store: Arc<T>) -> Self {
        Self {
            source,
            store,
            active: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Store updates are reported to
    #[must_use]
    pub fn store(&self) -> &Arc<T> {
        &self.store
    }

    /// Run one generation into `slot` until it completes, fails or is stopped
    ///
    /// Failures are reported to the store and returned as
    /// [`GenerationOutcome::Failed`]; they never surface as a panic or `Err`.
    pub async fn generate(&self, slot: &SessionId, request: GenerateRequest) -> GenerationOutcome {
        let (generation, cancel) = self.begin(slot);
        tracing::info!(slot = %slot, generation, style = %request.style, "Starting generation");

        self.reset(slot, generation, &request);

        let mut stream = self.source.open(&request, cancel);
        let mut pipeline = SlidePipeline::new();
        let mut slides: Vec<Slide> = Vec::new();

        let outcome = loop {
            let Some(item) = stream.next_event().await else {
                tracing::info!(slot = %slot, generation, slides = slides.len(), "Generation stopped");
                break GenerationOutcome::Cancelled { slides };
            };

            let found = match item {
                Ok(SlideEvent::Slide(slide)) => pipeline.accept(slide).into_iter().collect(),
                Ok(SlideEvent::Chunk(text)) => pipeline.push(&text),
                Ok(SlideEvent::Done(_)) => {
                    let rest = pipeline.finish();
                    if !rest.is_empty() {
                        merge(&mut slides, rest);
                        self.report(slot, generation, SessionUpdate::Slides(slides.clone()));
                    }
                    break self.complete(slot, generation, slides);
                }
                Ok(SlideEvent::Error(message)) => break self.fail(slot, generation, slides, message),
                Err(e) if e.is_cancelled() => {
                    break GenerationOutcome::Cancelled { slides };
                }
                Err(e) => break self.fail(slot, generation, slides, e.to_string()),
            };

            if found.is_empty() {
                continue;
            }
            for slide in &found {
                tracing::debug!(slot = %slot, slide = slide.slide_number, "Slide surfaced");
            }
            merge(&mut slides, found);
            if !self.report(slot, generation, SessionUpdate::Slides(slides.clone())) {
                // Superseded or cancelled between two reads
                break GenerationOutcome::Cancelled { slides };
            }
        };

        self.end(slot, generation);
        outcome
    }

    /// Stop the slot's generation; slides already surfaced stay
    ///
    /// Returns `false` when nothing was running.
    pub fn cancel(&self, slot: &SessionId) -> bool {
        let mut active = self.active.lock();
        let Some(running) = active.remove(slot) else {
            return false;
        };
        running.cancel.cancel();
        self.store.apply(slot, SessionUpdate::Status(SessionStatus::Idle));
        tracing::info!(slot = %slot, generation = running.id, "Generation cancelled");
        true
    }

    /// Whether `slot` has a running generation
    #[must_use]
    pub fn is_active(&self, slot: &SessionId) -> bool {
        self.active.lock().contains_key(slot)
    }

    /// Number of running generations
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Register a fresh generation, superseding whatever ran in `slot`
    fn begin(&self, slot: &SessionId) -> (u64, CancellationToken) {
        let id = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let mut active = self.active.lock();
        let previous = active.insert(
            slot.clone(),
            ActiveGeneration {
                id,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
            self.store.apply(slot, SessionUpdate::Status(SessionStatus::Idle));
            tracing::info!(slot = %slot, generation = previous.id, "Superseded running generation");
        }

        (id, cancel)
    }

    /// Clear the slot for a new run of `request`
    fn reset(&self, slot: &SessionId, generation: u64, request: &GenerateRequest) -> bool {
        self.report_all(
            slot,
            generation,
            vec![
                SessionUpdate::Slides(Vec::new()),
                SessionUpdate::Prompt(None),
                SessionUpdate::Error(None),
                SessionUpdate::Config(Box::new(request.clone())),
                SessionUpdate::Status(SessionStatus::Generating),
            ],
        )
    }

    /// Drop the slot's entry if it still belongs to `generation`
    fn end(&self, slot: &SessionId, generation: u64) {
        let mut active = self.active.lock();
        if active.get(slot).is_some_and(|a| a.id == generation) {
            active.remove(slot);
        }
    }

    /// Publish one update if `generation` is still current
    fn report(&self, slot: &SessionId, generation: u64, update: SessionUpdate) -> bool {
        let active = self.active.lock();
        let current = active
            .get(slot)
            .is_some_and(|a| a.id == generation && !a.cancel.is_cancelled());
        if current {
            self.store.apply(slot, update);
        } else {
            tracing::debug!(slot = %slot, generation, "Dropped update from a stale generation");
        }
        current
    }

    fn report_all(&self, slot: &SessionId, generation: u64, updates: Vec<SessionUpdate>) -> bool {
        updates
            .into_iter()
            .all(|update| self.report(slot, generation, update))
    }

    fn complete(&self, slot: &SessionId, generation: u64, slides: Vec<Slide>) -> GenerationOutcome {
        let prompt = GeneratedPrompt::from_slides(slides.clone());
        let mut updates = vec![
            SessionUpdate::Prompt(Some(prompt.clone())),
            SessionUpdate::Status(SessionStatus::Completed),
        ];
        if let Some(first) = slides.first() {
            updates.push(SessionUpdate::Title(derive_title(&first.title)));
        }

        if !self.report_all(slot, generation, updates) {
            return GenerationOutcome::Cancelled { slides };
        }
        tracing::info!(slot = %slot, generation, slides = slides.len(), "Generation completed");
        GenerationOutcome::Completed { slides, prompt }
    }

    fn fail(&self, slot: &SessionId, generation: u64, slides: Vec<Slide>, error: String) -> GenerationOutcome {
        let reported = self.report_all(
            slot,
            generation,
            vec![
                SessionUpdate::Error(Some(error.clone())),
                SessionUpdate::Status(SessionStatus::Error),
            ],
        );
        if !reported {
            return GenerationOutcome::Cancelled { slides };
        }
        tracing::warn!(slot = %slot, generation, error = %error, "Generation failed");
        GenerationOutcome::Failed { slides, error }
    }
}

impl<T: SessionStore> GenerationController<LlmEventSource, T> {
    /// Run one non-streaming generation into `slot`
    ///
    /// The model answers in a single call; its slides land in the store all
    /// at once. Superseding and [`cancel`](Self::cancel) behave as for
    /// [`generate`](Self::generate).
    pub async fn generate_document(&self, slot: &SessionId, request: GenerateRequest) -> GenerationOutcome {
        let (generation, cancel) = self.begin(slot);
        tracing::info!(slot = %slot, generation, style = %request.style, "Starting full generation");
        self.reset(slot, generation, &request);

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(slot = %slot, generation, "Generation stopped");
                GenerationOutcome::Cancelled { slides: Vec::new() }
            }
            result = self.source.generate_document(&request) => match result {
                Ok(document) => {
                    tracing::debug!(
                        slot = %slot,
                        slides = document.slides.len(),
                        tokens = ?document.tokens_used,
                        "Completion received"
                    );
                    let slides = document.slides;
                    if self.report(slot, generation, SessionUpdate::Slides(slides.clone())) {
                        self.complete(slot, generation, slides)
                    } else {
                        GenerationOutcome::Cancelled { slides }
                    }
                }
                Err(e) => self.fail(slot, generation, Vec::new(), e.to_string()),
            },
        };

        self.end(slot, generation);
        outcome
    }
}

/// Append new slides and restore number order
fn merge(slides: &mut Vec<Slide>, found: Vec<Slide>) {
    slides.extend(found);
    sort_by_number(slides);
}
