//! Batch Generation
//!
//! A queue of topics, each generated into its own session slot by a shared
//! [`GenerationController`], one after another.
//!
//! ```text
//! add_topics ──> [pending, pending, ...]
//! run        ──> pending → processing → completed | error | cancelled
//! cancel     ──> stops the running job, every pending job becomes cancelled
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::LlmConfig;
use crate::controller::{GenerationController, GenerationOutcome};
use crate::prompt::{ContentInput, GenerateRequest, PresentationSettings, RequestError, SlideStyle};
use crate::session::{now_ms, SessionId, SessionStore};
use crate::slide::Slide;
use crate::source::EventSource;

/// Topics one batch may hold
pub const MAX_BATCH_TOPICS: usize = 10;

/// Where a job stands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchJobStatus {
    /// Waiting for its turn
    #[default]
    Pending,
    /// Generating now
    Processing,
    /// Generation finished
    Completed,
    /// Generation failed
    Error,
    /// Stopped before finishing
    Cancelled,
}

impl std::fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        })
    }
}

/// One topic of a batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    /// Session slot the job generates into
    pub id: SessionId,
    /// Topic, trimmed
    pub topic: String,
    /// Current status
    pub status: BatchJobStatus,
    /// Percent of the requested slides surfaced, 0 to 100
    pub progress: u8,
    /// Slides of the generation, sorted by number
    pub slides: Vec<Slide>,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Start time (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    /// End time (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

impl BatchJob {
    fn new(id: SessionId, topic: &str) -> Self {
        Self {
            id,
            topic: topic.trim().to_string(),
            status: BatchJobStatus::Pending,
            progress: 0,
            slides: Vec::new(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Snapshot of a batch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchState {
    /// Every job, in the order added
    pub jobs: Vec<BatchJob>,
    /// Whether [`BatchRunner::run`] is working through the queue
    pub is_processing: bool,
    /// Index of the job generating now
    pub current_job_index: Option<usize>,
    /// Jobs in the batch
    pub total_jobs: usize,
    /// Jobs that completed
    pub completed_jobs: usize,
    /// Jobs that failed
    pub failed_jobs: usize,
}

/// Percent of `expected` slides that `surfaced` represents
fn progress(surfaced: usize, expected: u32) -> u8 {
    if expected == 0 {
        return 100;
    }
    let percent = surfaced.saturating_mul(100) / expected as usize;
    u8::try_from(percent.min(100)).unwrap_or(100)
}

/// Generates a queue of topics through one controller
pub struct BatchRunner<S, T> {
    controller: Arc<GenerationController<S, T>>,
    style: SlideStyle,
    settings: PresentationSettings,
    llm_config: Option<LlmConfig>,
    jobs: Mutex<Vec<BatchJob>>,
    running: Mutex<Option<CancellationToken>>,
}

impl<S, T> std::fmt::Debug for BatchRunner<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("style", &self.style)
            .field("jobs", &self.jobs.lock().len())
            .field("running", &self.running.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl<S: EventSource, T: SessionStore> BatchRunner<S, T> {
    /// Runner generating every topic in `style` with `settings`
    pub fn new(
        controller: Arc<GenerationController<S, T>>,
        style: SlideStyle,
        settings: PresentationSettings,
    ) -> Self {
        Self {
            controller,
            style,
            settings,
            llm_config: None,
            jobs: Mutex::new(Vec::new()),
            running: Mutex::new(None),
        }
    }

    /// Send every job to this model endpoint
    #[must_use]
    pub fn with_llm_config(mut self, config: Option<LlmConfig>) -> Self {
        self.llm_config = config;
        self
    }

    /// Queue `topics`, each in a slot from `new_slot`; blank topics are skipped
    ///
    /// Nothing is queued when the batch would exceed [`MAX_BATCH_TOPICS`].
    /// Returns the number of jobs added.
    ///
    /// # Errors
    ///
    /// [`RequestError::NoTopics`] when every topic is blank,
    /// [`RequestError::TooManyTopics`] when the batch would be too large.
    pub fn add_topics<I>(&self, topics: I, mut new_slot: impl FnMut() -> SessionId) -> Result<usize, RequestError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let topics: Vec<I::Item> = topics
            .into_iter()
            .filter(|t| !t.as_ref().trim().is_empty())
            .collect();
        if topics.is_empty() {
            return Err(RequestError::NoTopics);
        }

        let mut jobs = self.jobs.lock();
        let count = jobs.len() + topics.len();
        if count > MAX_BATCH_TOPICS {
            return Err(RequestError::TooManyTopics {
                count,
                max: MAX_BATCH_TOPICS,
            });
        }

        jobs.extend(topics.iter().map(|t| BatchJob::new(new_slot(), t.as_ref())));
        tracing::debug!(added = topics.len(), total = jobs.len(), "Queued batch topics");
        Ok(topics.len())
    }

    /// Work through every pending job in order
    ///
    /// Returns at once when a run is already in progress. Jobs that are not
    /// pending are skipped, so a second run only picks up newly added topics.
    pub async fn run(&self) -> BatchState {
        let cancel = {
            let mut running = self.running.lock();
            if running.is_some() {
                tracing::debug!("Batch already running");
                drop(running);
                return self.state();
            }
            let token = CancellationToken::new();
            *running = Some(token.clone());
            token
        };
        tracing::info!(jobs = self.jobs.lock().len(), "Starting batch");

        while !cancel.is_cancelled() {
            let Some((slot, topic)) = self.next_job() else {
                break;
            };
            tracing::info!(slot = %slot, topic = %topic, "Batch job started");
            let outcome = self.controller.generate(&slot, self.request_for(&topic)).await;
            self.finish_job(&slot, outcome);
        }

        *self.running.lock() = None;
        let state = self.state();
        tracing::info!(
            completed = state.completed_jobs,
            failed = state.failed_jobs,
            total = state.total_jobs,
            "Batch finished"
        );
        state
    }

    /// Stop the batch: the running job is cancelled and so is every pending one
    pub fn cancel(&self) {
        if let Some(token) = self.running.lock().take() {
            token.cancel();
        }

        let now = now_ms();
        let mut jobs = self.jobs.lock();
        for job in jobs.iter_mut() {
            match job.status {
                BatchJobStatus::Processing => {
                    self.controller.cancel(&job.id);
                }
                BatchJobStatus::Pending => {}
                _ => continue,
            }
            job.status = BatchJobStatus::Cancelled;
            job.completed_at = Some(now);
        }
        tracing::info!("Batch cancelled");
    }

    /// Cancel anything running and forget every job
    pub fn reset(&self) {
        self.cancel();
        self.jobs.lock().clear();
    }

    /// Snapshot of the batch
    #[must_use]
    pub fn state(&self) -> BatchState {
        let jobs = self.jobs.lock().clone();
        let count = |status: BatchJobStatus| jobs.iter().filter(|j| j.status == status).count();
        BatchState {
            is_processing: self.running.lock().is_some(),
            current_job_index: jobs.iter().position(|j| j.status == BatchJobStatus::Processing),
            total_jobs: jobs.len(),
            completed_jobs: count(BatchJobStatus::Completed),
            failed_jobs: count(BatchJobStatus::Error),
            jobs,
        }
    }

    /// Whether another topic fits
    #[must_use]
    pub fn can_add_more(&self) -> bool {
        self.jobs.lock().len() < MAX_BATCH_TOPICS
    }

    fn request_for(&self, topic: &str) -> GenerateRequest {
        let request = GenerateRequest::new(ContentInput::topic(topic))
            .with_style(self.style)
            .with_settings(self.settings.clone());
        match self.llm_config {
            Some(ref config) => request.with_llm_config(config.clone()),
            None => request,
        }
    }

    /// Mark the first pending job as processing
    fn next_job(&self) -> Option<(SessionId, String)> {
        let mut jobs = self.jobs.lock();
        let job = jobs.iter_mut().find(|j| j.status == BatchJobStatus::Pending)?;
        job.status = BatchJobStatus::Processing;
        job.started_at = Some(now_ms());
        Some((job.id.clone(), job.topic.clone()))
    }

    fn finish_job(&self, slot: &SessionId, outcome: GenerationOutcome) {
        let mut jobs = self.jobs.lock();
        // Gone after a reset
        let Some(job) = jobs.iter_mut().find(|j| &j.id == slot) else {
            return;
        };

        job.completed_at = Some(now_ms());
        match outcome {
            GenerationOutcome::Completed { slides, .. } => {
                job.status = BatchJobStatus::Completed;
                job.progress = 100;
                job.slides = slides;
            }
            GenerationOutcome::Failed { slides, error } => {
                tracing::warn!(slot = %slot, error = %error, "Batch job failed");
                job.status = BatchJobStatus::Error;
                job.progress = progress(slides.len(), self.settings.slide_count);
                job.slides = slides;
                job.error = Some(error);
            }
            GenerationOutcome::Cancelled { slides } => {
                job.status = BatchJobStatus::Cancelled;
                job.progress = progress(slides.len(), self.settings.slide_count);
                job.slides = slides;
            }
        }
    }
}
