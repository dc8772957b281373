//! Typed stream events and their wire payloads

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::decoder::SseFrame;
use crate::slide::Slide;

/// Payload of the terminal `done` event
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneSummary {
    /// Number of slides the producer surfaced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_slides: Option<usize>,
    /// Visual style of the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Aspect ratio of the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

/// One event of a generation stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlideEvent {
    /// A parsed slide (server-side parsing)
    Slide(Slide),
    /// Raw model text to be parsed client-side
    Chunk(String),
    /// Generation finished
    Done(DoneSummary),
    /// Generation failed with a message
    Error(String),
}

#[derive(Serialize, Deserialize)]
struct ChunkPayload {
    text: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorPayload {
    error: String,
}

impl SlideEvent {
    /// Wire name of the event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Slide(_) => "slide",
            Self::Chunk(_) => "chunk",
            Self::Done(_) => "done",
            Self::Error(_) => "error",
        }
    }

    /// Whether the event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }

    /// Interpret a decoded frame
    ///
    /// Returns `Ok(None)` for event names the adapter does not know and for
    /// slides that fail validation.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload does not parse.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<Self>, serde_json::Error> {
        let event = match frame.event.as_str() {
            "slide" => {
                let slide: Slide = serde_json::from_str(&frame.data)?;
                if !slide.is_valid() {
                    tracing::debug!(slide = slide.slide_number, "Ignoring invalid slide event");
                    return Ok(None);
                }
                Self::Slide(slide)
            }
            "chunk" => Self::Chunk(serde_json::from_str::<ChunkPayload>(&frame.data)?.text),
            "done" => Self::Done(serde_json::from_str(&frame.data)?),
            "error" => Self::Error(serde_json::from_str::<ErrorPayload>(&frame.data)?.error),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Render the event as one SSE frame, terminated by a blank line
    ///
    /// The JSON payload is always a single line.
    #[must_use]
    pub fn to_frame(&self, id: Option<u64>) -> String {
        let data = match self {
            Self::Slide(slide) => serde_json::to_string(slide),
            Self::Chunk(text) => serde_json::to_string(&ChunkPayload { text: text.clone() }),
            Self::Done(summary) => serde_json::to_string(summary),
            Self::Error(error) => serde_json::to_string(&ErrorPayload {
                error: error.clone(),
            }),
        }
        // Plain structs of strings and integers always serialize
        .unwrap_or_else(|_| "{}".to_string());

        let mut frame = String::new();
        if let Some(id) = id {
            let _ = writeln!(frame, "id: {id}");
        }
        let _ = write!(frame, "event: {}\ndata: {}\n\n", self.name(), data);
        frame
    }
}
