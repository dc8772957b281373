//! Incremental Buffer Assembler
//!
//! Owns the growing text buffer for one stream. Each `append` concatenates the
//! new chunk, runs the strict matcher over the whole buffer and then cuts the
//! buffer down to what could still become a slide:
//!
//! - if a heading marker starts after the last matched block, the buffer is
//!   cut to begin at the last such marker
//! - otherwise it is cut to the text after the last matched block
//!
//! Text that is cut away but still holds a heading marker (a malformed
//! heading, a block rejected for an empty body) is kept aside as deferred
//! text. `flush` gives it one more chance through the permissive grammar.

use crate::grammar::{contains_marker, find_last_marker, match_fallback, match_slides};
use crate::slide::Slide;

/// Growing buffer for one streaming session
#[derive(Debug, Default)]
pub struct SlideAssembler {
    buffer: String,
    deferred: String,
}

impl SlideAssembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the complete slides it finished
    ///
    /// Slides come back in discovery order. Nothing is deduplicated here.
    pub fn append(&mut self, chunk: &str) -> Vec<Slide> {
        self.buffer.push_str(chunk);

        let result = match_slides(&self.buffer);
        for range in &result.deferred {
            Self::keep_aside(&mut self.deferred, &self.buffer[range.clone()]);
        }

        let remainder = &self.buffer[result.consumed_end..];
        let retained = match find_last_marker(remainder) {
            Some(pos) if pos > 0 => {
                let discarded = &remainder[..pos];
                if contains_marker(discarded) {
                    Self::keep_aside(&mut self.deferred, discarded);
                }
                remainder[pos..].to_string()
            }
            _ => remainder.to_string(),
        };
        self.buffer = retained;

        if !result.slides.is_empty() {
            tracing::trace!(
                found = result.slides.len(),
                buffered = self.buffer.len(),
                "Matched slide blocks"
            );
        }

        result.slides
    }

    /// Final pass at stream end
    ///
    /// Runs the strict grammar once more, then the permissive grammar over
    /// the deferred text and whatever is still unconsumed. Anything left after
    /// that is trailing prose and is dropped. The assembler is empty
    /// afterwards.
    pub fn flush(&mut self) -> Vec<Slide> {
        let buffer = std::mem::take(&mut self.buffer);
        let mut leftovers = std::mem::take(&mut self.deferred);

        let result = match_slides(&buffer);
        for range in &result.deferred {
            Self::keep_aside(&mut leftovers, &buffer[range.clone()]);
        }
        leftovers.push_str(&buffer[result.consumed_end..]);

        let mut slides = result.slides;
        if contains_marker(&leftovers) {
            let recovered = match_fallback(&leftovers);
            if !recovered.is_empty() {
                tracing::debug!(recovered = recovered.len(), "Fallback pass recovered slides");
            }
            slides.extend(recovered);
        }

        slides
    }

    /// Text currently held for future matching
    #[must_use]
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Whether nothing is buffered or deferred
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.deferred.is_empty()
    }

    /// Drop all buffered and deferred text
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.deferred.clear();
    }

    fn keep_aside(deferred: &mut String, text: &str) {
        deferred.push_str(text);
        if !text.ends_with('\n') {
            deferred.push('\n');
        }
    }
}
