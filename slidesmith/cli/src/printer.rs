//! Terminal output for generations
//!
//! [`PrintingStore`] sits in front of a [`MemorySessionStore`]: every update
//! is applied to the record, and slides are written to stdout the first time
//! they show up so a long generation can be read while it streams.
//!
//! Optimizer results and batch summaries are rendered here too.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use clap::ValueEnum;
use parking_lot::Mutex;
use slidesmith_core::session::SessionStatus;
use slidesmith_core::{
    BatchState, ExportFormat, GeneratedPrompt, MemorySessionStore, OptimizationResult, SessionId,
    SessionStore, SessionUpdate,
};

/// Final output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Slide blocks as the model wrote them
    #[default]
    Text,
    /// The full generated prompt artifact
    Json,
    /// One markdown section per slide
    Markdown,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => Self::Text,
            OutputFormat::Json => Self::Json,
            OutputFormat::Markdown => Self::Markdown,
        }
    }
}

/// Render a finished artifact
///
/// # Errors
///
/// Fails only if JSON serialization fails.
pub fn render(prompt: &GeneratedPrompt, title: &str, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Text => prompt.plain_text.clone(),
        OutputFormat::Json => prompt.to_json_pretty()?,
        OutputFormat::Markdown => prompt.to_markdown(title),
    })
}

/// Render optimizer results; markdown renders like text
///
/// # Errors
///
/// Fails only if JSON serialization fails.
pub fn render_optimizations(results: &[OptimizationResult], format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(match results {
            [single] => serde_json::to_string_pretty(single)?,
            _ => serde_json::to_string_pretty(results)?,
        });
    }

    let mut out = String::new();
    for (index, result) in results.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "Score: {} -> {}", result.score.before, result.score.after);
        for improvement in &result.improvements {
            let _ = writeln!(out, "- {improvement}");
        }
        let _ = writeln!(out, "\n{}", result.optimized);
    }
    Ok(out.trim_end().to_string())
}

/// One line per batch job
pub fn render_batch(state: &BatchState) -> String {
    let mut out = String::new();
    for job in &state.jobs {
        let _ = write!(out, "[{}] {}: {} slides", job.status, job.topic, job.slides.len());
        if let Some(ref error) = job.error {
            let _ = write!(out, " ({error})");
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "{} of {} completed, {} failed",
        state.completed_jobs, state.total_jobs, state.failed_jobs
    );
    out
}

/// Session store that echoes new slides
pub struct PrintingStore {
    inner: Arc<MemorySessionStore>,
    echo: bool,
    printed: Mutex<HashSet<u32>>,
}

impl PrintingStore {
    /// Wrap `inner`; slides are echoed only when `echo` is set
    pub fn new(inner: Arc<MemorySessionStore>, echo: bool) -> Self {
        Self {
            inner,
            echo,
            printed: Mutex::new(HashSet::new()),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &Arc<MemorySessionStore> {
        &self.inner
    }
}

impl SessionStore for PrintingStore {
    fn apply(&self, slot: &SessionId, update: SessionUpdate) {
        match &update {
            SessionUpdate::Slides(slides) if slides.is_empty() => self.printed.lock().clear(),
            SessionUpdate::Slides(slides) if self.echo => {
                let mut printed = self.printed.lock();
                for slide in slides {
                    if printed.insert(slide.slide_number) {
                        println!("{}\n", slide.to_block());
                    }
                }
            }
            SessionUpdate::Status(status) => {
                tracing::debug!(slot = %slot, status = ?status, "Session status");
                if *status == SessionStatus::Generating {
                    eprintln!("Generating...");
                }
            }
            _ => {}
        }
        self.inner.apply(slot, update);
    }
}
