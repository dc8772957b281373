//! Slide Records
//!
//! The atomic unit of parser output. A slide is created transiently by the
//! grammar matcher on every parse pass, promoted to "emitted" by the
//! [`SlideEmitter`](crate::emitter::SlideEmitter), and from then on belongs
//! to the caller. The parser never revises a slide it has handed out.
//!
//! On the wire the body travels as `prompt`:
//!
//! ```json
//! {"slideNumber":2,"title":"Details","prompt":"Deep dive into specifics."}
//! ```

use serde::{Deserialize, Serialize};

/// One parsed slide prompt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    /// The model's intended position (1-based), not the emission order
    pub slide_number: u32,
    /// Heading text, trimmed
    pub title: String,
    /// Fenced body, trimmed
    #[serde(rename = "prompt")]
    pub content: String,
}

impl Slide {
    /// Create a slide, trimming title and content
    pub fn new(slide_number: u32, title: impl AsRef<str>, content: impl AsRef<str>) -> Self {
        Self {
            slide_number,
            title: title.as_ref().trim().to_string(),
            content: content.as_ref().trim().to_string(),
        }
    }

    /// Whether this record would be accepted by the matcher
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.slide_number >= 1 && !self.title.trim().is_empty() && has_usable_body(&self.content)
    }

    /// Render the canonical block for this slide
    ///
    /// The output re-parses to the same slide.
    #[must_use]
    pub fn to_block(&self) -> String {
        format!(
            "**Slide {}: {}**\n```\n{}\n```",
            self.slide_number, self.title, self.content
        )
    }
}

/// Body acceptance policy
///
/// A block whose trimmed body is empty is not a slide. This is the only
/// place that decides it.
#[must_use]
pub fn has_usable_body(content: &str) -> bool {
    !content.trim().is_empty()
}

/// Sort slides by slide number (stable)
pub fn sort_by_number(slides: &mut [Slide]) {
    slides.sort_by_key(|s| s.slide_number);
}
