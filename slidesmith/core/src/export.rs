//! Generated Prompt Artifact
//!
//! Once a generation completes, its slides are combined into one artifact:
//! the canonical blocks joined by blank lines, plus a chat-style record the
//! image model can take as-is.

use serde::{Deserialize, Serialize};

use crate::slide::{sort_by_number, Slide};

/// Model name written into the chat record
pub const TARGET_MODEL: &str = "nano-banana-pro";

/// System message of the chat record
pub const TARGET_SYSTEM_MESSAGE: &str = "Nano Banana Pro optimized prompts";

/// File name stem used when a title has no usable characters
pub const DEFAULT_FILE_STEM: &str = "document";

/// Download format of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// Session metadata, slides and artifact as pretty JSON
    Json,
    /// One markdown section per slide
    Markdown,
    /// Plain text with an underlined title
    Text,
}

impl ExportFormat {
    /// File extension, without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

/// A rendered download
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    /// Suggested file name
    pub file_name: String,
    /// File content
    pub content: String,
}

/// Role of a chat record message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions
    System,
    /// Content
    User,
}

/// One chat record message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender
    pub role: ChatRole,
    /// Text
    pub content: String,
}

/// Chat-style request for the downstream model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonFormat {
    /// Target model
    pub model: String,
    /// System then user message
    pub messages: Vec<ChatMessage>,
}

/// Combined output of a completed generation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPrompt {
    /// All blocks in slide-number order, separated by a blank line
    pub plain_text: String,
    /// Slides sorted by number
    pub slides: Vec<Slide>,
    /// Request record for the image model
    pub json_format: JsonFormat,
}

impl GeneratedPrompt {
    /// Build the artifact; slides are sorted by number first
    #[must_use]
    pub fn from_slides(mut slides: Vec<Slide>) -> Self {
        sort_by_number(&mut slides);
        let plain_text = slides
            .iter()
            .map(Slide::to_block)
            .collect::<Vec<_>>()
            .join("\n\n");

        Self {
            json_format: JsonFormat {
                model: TARGET_MODEL.to_string(),
                messages: vec![
                    ChatMessage {
                        role: ChatRole::System,
                        content: TARGET_SYSTEM_MESSAGE.to_string(),
                    },
                    ChatMessage {
                        role: ChatRole::User,
                        content: plain_text.clone(),
                    },
                ],
            },
            plain_text,
            slides,
        }
    }

    /// Pretty JSON of the whole artifact
    ///
    /// # Errors
    ///
    /// Propagates serialization failures.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Markdown download: a title heading and one section per slide
    #[must_use]
    pub fn to_markdown(&self, title: &str) -> String {
        let body = self
            .slides
            .iter()
            .map(|s| format!("## Slide {}: {}\n\n{}", s.slide_number, s.title, s.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        format!("# {title}\n\n{body}")
    }

    /// Plain text download with an underlined title
    #[must_use]
    pub fn to_text(&self, title: &str) -> String {
        let body = self
            .slides
            .iter()
            .map(|s| format!("Slide {}: {}\n{}", s.slide_number, s.title, s.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        format!("{title}\n{}\n\n{body}", "=".repeat(title.chars().count()))
    }
}

/// File name stem for a download of `title`
///
/// Keeps ASCII letters and digits, CJK ideographs, whitespace and hyphens,
/// turns whitespace runs into `_` and caps the result at 50 characters.
#[must_use]
pub fn sanitize_filename(title: &str, fallback: &str) -> String {
    let mut name = String::new();
    let mut in_space = false;
    for c in title.chars() {
        if c.is_whitespace() {
            if !in_space {
                name.push('_');
            }
            in_space = true;
        } else if c.is_ascii_alphanumeric() || ('\u{4e00}'..='\u{9fff}').contains(&c) || c == '-' {
            name.push(c);
            in_space = false;
        }
    }

    let name: String = name.chars().take(50).collect();
    if name.is_empty() {
        fallback.to_string()
    } else {
        name
    }
}
