//! Assembler plus emitter for one session
//!
//! A `SlidePipeline` is created per generation and dropped with it. It is
//! never pooled or handed to a second stream, so buffers and seen-sets cannot
//! leak between sessions.

use crate::assembler::SlideAssembler;
use crate::emitter::SlideEmitter;
use crate::slide::Slide;

/// Raw text in, new slides out
#[derive(Debug, Default)]
pub struct SlidePipeline {
    assembler: SlideAssembler,
    emitter: SlideEmitter,
}

impl SlidePipeline {
    /// Create a fresh pipeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text chunk; returns slides never surfaced before
    pub fn push(&mut self, chunk: &str) -> Vec<Slide> {
        let found = self.assembler.append(chunk);
        self.emitter.filter_new(found)
    }

    /// Record a slide that arrived already parsed (e.g. from a `slide` event)
    ///
    /// Returns the slide back if it is new.
    pub fn accept(&mut self, slide: Slide) -> Option<Slide> {
        self.emitter.filter_new(vec![slide]).pop()
    }

    /// Final flush at stream end
    pub fn finish(&mut self) -> Vec<Slide> {
        let found = self.assembler.flush();
        self.emitter.filter_new(found)
    }

    /// Distinct slides surfaced so far
    #[must_use]
    pub fn emitted_count(&self) -> usize {
        self.emitter.len()
    }
}
