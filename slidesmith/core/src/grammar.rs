//! Slide Grammar Matcher
//!
//! Locates complete slide blocks in a text buffer. A block looks like:
//!
//! ````text
//! **Slide 2: Details**
//! ```markdown
//! Deep dive into specifics.
//! ```
//! ````
//!
//! The heading keyword is matched case-insensitively, the slide number must be
//! all digits, and the body runs lazily up to the first closing fence. The
//! grammar is not recursive: a heading or fence that shows up inside a body is
//! just body text.
//!
//! Every function here is a read-only scan that starts from the beginning of
//! its input. Nothing is carried between calls, so matching a whole document
//! once gives the same blocks as matching it many times while it grows.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::slide::{has_usable_body, sort_by_number, Slide};

/// Text that opens a slide heading
pub const HEADING_MARKER: &str = "**Slide";

/// Code fence delimiter around a slide body
pub const FENCE: &str = "```";

static STRICT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*Slide\s+(\d+):\s*([^*]+)\*\*\s*```(?:\w*\n)?((?s:.*?))```")
        .expect("strict slide pattern is valid")
});

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*Slide\s+(\d+):\s*([^*]+)\*\*").expect("heading pattern is valid")
});

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*Slide").expect("marker pattern is valid"));

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```\w*\n?").expect("fence pattern is valid"));

/// Result of one strict scan over a buffer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// Accepted slides in discovery order (left to right)
    pub slides: Vec<Slide>,
    /// Offset one past the last accepted block (0 when nothing matched)
    pub consumed_end: usize,
    /// Regions before `consumed_end` that hold a heading marker but no
    /// accepted slide
    pub deferred: Vec<Range<usize>>,
}

impl MatchResult {
    /// Whether the scan accepted anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

/// Scan `buffer` for complete slide blocks
///
/// Rejected blocks (empty body, slide number 0 or out of range, blank title)
/// are skipped without stalling the scan. When a rejected or malformed block
/// sits before an accepted one, its region is reported in
/// [`MatchResult::deferred`]; when it sits after the last accepted block it is
/// simply left past `consumed_end`.
#[must_use]
pub fn match_slides(buffer: &str) -> MatchResult {
    let mut result = MatchResult::default();
    let mut gap_start = 0;

    for caps in STRICT_BLOCK.captures_iter(buffer) {
        let Some(whole) = caps.get(0) else { continue };

        let Some(slide) = accept(&caps, 3) else {
            tracing::trace!(at = whole.start(), "Skipping rejected slide block");
            continue;
        };

        if contains_marker(&buffer[gap_start..whole.start()]) {
            result.deferred.push(gap_start..whole.start());
        }

        result.slides.push(slide);
        result.consumed_end = whole.end();
        gap_start = whole.end();
    }

    result
}

/// Permissive scan used once a stream has ended
///
/// A heading must be followed by a line break. Its body runs until the next
/// heading, a blank line followed by `**`, or the end of the text. A missing
/// or malformed closing fence is tolerated. Output is in discovery order.
#[must_use]
pub fn match_fallback(text: &str) -> Vec<Slide> {
    let headings: Vec<Captures<'_>> = HEADING.captures_iter(text).collect();
    let mut slides = Vec::new();

    for (idx, caps) in headings.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };

        // Whitespace after the heading must include a newline
        let after = &text[whole.end()..];
        let body_offset = after.len() - after.trim_start().len();
        if !after[..body_offset].contains('\n') {
            continue;
        }
        let body_start = whole.end() + body_offset;

        let next_heading = headings
            .get(idx + 1)
            .and_then(|c| c.get(0))
            .map_or(text.len(), |m| m.start());
        let body_end = text[body_start..next_heading]
            .find("\n\n**")
            .map_or(next_heading, |pos| body_start + pos);

        let content = strip_fences(&text[body_start..body_end]);
        let Some(slide) = build_slide(&caps[1], &caps[2], &content) else {
            continue;
        };
        slides.push(slide);
    }

    slides
}

/// Parse a complete document in one pass
///
/// Used for non-streaming completions. Runs the strict grammar and falls
/// back to the permissive one when the strict pass finds nothing. The
/// result is sorted by slide number with the first occurrence of each number
/// kept.
#[must_use]
pub fn parse_document(text: &str) -> Vec<Slide> {
    let mut slides = match_slides(text).slides;
    if slides.is_empty() {
        slides = match_fallback(text);
    }

    let mut seen = HashSet::new();
    slides.retain(|s| seen.insert(s.slide_number));
    sort_by_number(&mut slides);
    slides
}

/// Offset of the last heading marker in `text`
#[must_use]
pub fn find_last_marker(text: &str) -> Option<usize> {
    MARKER.find_iter(text).last().map(|m| m.start())
}

/// Whether `text` holds a heading marker anywhere
#[must_use]
pub fn contains_marker(text: &str) -> bool {
    MARKER.is_match(text)
}

fn accept(caps: &Captures<'_>, body_group: usize) -> Option<Slide> {
    let body = caps.get(body_group)?.as_str();
    build_slide(&caps[1], &caps[2], body)
}

fn build_slide(number: &str, title: &str, body: &str) -> Option<Slide> {
    let slide_number: u32 = number.parse().ok().filter(|n| *n >= 1)?;
    if title.trim().is_empty() || !has_usable_body(body) {
        return None;
    }
    Some(Slide::new(slide_number, title, body))
}

/// Remove a leading fence (with language tag) and cut at the closing fence
fn strip_fences(body: &str) -> String {
    let trimmed = body.trim();
    let Some(open) = OPENING_FENCE.find(trimmed) else {
        return trimmed.trim_end_matches(FENCE).trim().to_string();
    };

    let inner = &trimmed[open.end()..];
    match inner.find(FENCE) {
        Some(close) => inner[..close].trim().to_string(),
        None => inner.trim().to_string(),
    }
}
