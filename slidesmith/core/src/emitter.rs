//! Dedup/Ordering Emitter
//!
//! Remembers which slide numbers a session has already surfaced and lets
//! only the first occurrence of each number through. Models restate earlier
//! slides when they lose their place, so a repeated number is expected and
//! is not an error.
//!
//! The emitter keeps input order. Sorting by slide number is the consumer's
//! job.

use std::collections::HashSet;

use crate::slide::Slide;

/// Seen-set for one streaming session
#[derive(Debug, Default)]
pub struct SlideEmitter {
    seen: HashSet<u32>,
}

impl SlideEmitter {
    /// Create an emitter with nothing seen
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only slides whose number has not been seen, marking them seen
    pub fn filter_new(&mut self, slides: Vec<Slide>) -> Vec<Slide> {
        slides
            .into_iter()
            .filter(|slide| {
                let fresh = self.mark_seen(slide.slide_number);
                if !fresh {
                    tracing::debug!(slide = slide.slide_number, "Dropping repeated slide number");
                }
                fresh
            })
            .collect()
    }

    /// Record a slide number; returns true if it was not seen before
    pub fn mark_seen(&mut self, slide_number: u32) -> bool {
        self.seen.insert(slide_number)
    }

    /// Whether a slide number has already been surfaced
    #[must_use]
    pub fn is_seen(&self, slide_number: u32) -> bool {
        self.seen.contains(&slide_number)
    }

    /// Number of distinct slides surfaced
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been surfaced yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
