//! Generation Requests
//!
//! What a caller asks for: the source content, the visual style and the deck
//! settings. The wire shape is the JSON body of the streaming endpoint, so
//! field names are camelCase and enum values are kebab-case strings:
//!
//! ```json
//! {
//!   "content": { "type": "topic", "topic": "Rust ownership" },
//!   "style": "technical",
//!   "settings": {
//!     "aspectRatio": "16:9",
//!     "slideCount": 6,
//!     "colorPalette": "auto",
//!     "layoutStructure": "balanced"
//!   }
//! }
//! ```
//!
//! The prompt text sent to the model is built in [`template`].

pub mod template;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::LlmConfig;

pub use template::{build_user_prompt, SYSTEM_PROMPT};

/// Smallest deck a request may ask for
pub const MIN_SLIDES: u32 = 1;

/// Largest deck a request may ask for
pub const MAX_SLIDES: u32 = 20;

// ============================================================================
// Errors
// ============================================================================

/// A request that cannot be sent
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// Slide count outside 1..=20
    #[error("Slide count must be between 1 and 20, got {0}")]
    SlideCountOutOfRange(u32),

    /// Every content field was empty
    #[error("No content provided")]
    NoContent,

    /// Prompt to optimize was blank
    #[error("Prompt is required")]
    EmptyPrompt,

    /// Prompt to optimize is longer than the optimizer accepts
    #[error("Prompt exceeds maximum length ({max} chars), got {len}")]
    PromptTooLong {
        /// Characters in the prompt
        len: usize,
        /// Accepted maximum
        max: usize,
    },

    /// Optimizer batch without prompts
    #[error("Prompts array is required")]
    NoPrompts,

    /// Optimizer batch larger than allowed
    #[error("Maximum {max} prompts per batch, got {count}")]
    TooManyPrompts {
        /// Prompts in the batch
        count: usize,
        /// Accepted maximum
        max: usize,
    },

    /// Batch generation without a usable topic
    #[error("At least one topic is required")]
    NoTopics,

    /// Batch generation would hold more topics than allowed
    #[error("Maximum {max} topics per batch, got {count}")]
    TooManyTopics {
        /// Topics the batch would hold
        count: usize,
        /// Accepted maximum
        max: usize,
    },

    /// A string that names no known option
    #[error("Unknown {kind}: {value}")]
    UnknownValue {
        /// Option family
        kind: &'static str,
        /// Rejected input
        value: String,
    },
}

// ============================================================================
// Option enums
// ============================================================================

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant ),+
        }

        impl $name {
            /// Every option in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire name
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = RequestError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok(Self::$variant), )+
                    _ => Err(RequestError::UnknownValue {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Visual style of the deck
    SlideStyle {
        /// Clean corporate look
        Professional => "professional",
        /// Blueprint diagrams
        Technical => "technical",
        /// Bold artistic layouts
        Creative => "creative",
        /// Charts and stat cards
        Infographic => "infographic",
        /// Step-by-step teaching
        Educational => "educational",
        /// 8-bit retro
        PixelArt => "pixel-art",
        /// Whitespace and single focal points
        Minimalist => "minimalist",
        /// Neon glow on black
        DarkNeon => "dark-neon",
        /// Sketchy illustrations
        HandDrawn => "hand-drawn",
        /// Frosted glass layers
        Glassmorphism => "glassmorphism",
        /// Aged paper
        Vintage => "vintage",
        /// Isometric 3D
        Isometric3d => "3d-isometric",
        /// Watercolor painting
        Watercolor => "watercolor",
        /// Editorial print
        Newspaper => "newspaper",
        /// Flat solid colors
        FlatDesign => "flat-design",
        /// Mesh gradients
        GradientMesh => "gradient-mesh",
        /// Sci-fi interface
        SciFiHud => "sci-fi-hud",
        /// Nature documentary
        DeepOcean => "deep-ocean",
        /// Software architecture
        DevConsole => "dev-console",
        /// Glowing scientific diagrams
        NeonScientific => "neon-scientific",
    }
}

wire_enum! {
    /// Slide canvas shape
    AspectRatio {
        /// Widescreen
        Wide => "16:9",
        /// Traditional
        Standard => "4:3",
        /// Square
        Square => "1:1",
        /// Vertical
        Portrait => "9:16",
    }
}

wire_enum! {
    /// Color scheme
    ColorPalette {
        /// Chosen to fit the style
        Auto => "auto",
        /// Navy and light blue
        CorporateBlue => "corporate-blue",
        /// Purple and violet
        ModernPurple => "modern-purple",
        /// Greens and cream
        NatureGreen => "nature-green",
        /// Orange and coral
        WarmOrange => "warm-orange",
        /// Black, white and grays
        ElegantMonochrome => "elegant-monochrome",
        /// Cyan to magenta
        VibrantGradient => "vibrant-gradient",
        /// Teal and aquamarine
        OceanTeal => "ocean-teal",
        /// Pink and peach
        SunsetPink => "sunset-pink",
        /// Browns and terracotta
        ForestEarth => "forest-earth",
        /// Royal blue and gold
        RoyalGold => "royal-gold",
        /// Ice blue and silver
        ArcticFrost => "arctic-frost",
        /// Neon on dark
        NeonNight => "neon-night",
    }
}

wire_enum! {
    /// Balance between visuals and text
    LayoutStructure {
        /// Hero visuals first
        VisualHeavy => "visual-heavy",
        /// Text first
        TextHeavy => "text-heavy",
        /// Even split
        Balanced => "balanced",
    }
}

wire_enum! {
    /// Which input the user filled in
    ContentKind {
        /// Free text
        Text => "text",
        /// A topic line
        Topic => "topic",
        /// An uploaded file
        File => "file",
        /// A web page
        Url => "url",
    }
}

wire_enum! {
    /// Format of uploaded file content
    FileType {
        /// Plain text
        Text => "text",
        /// Comma separated values
        Csv => "csv",
        /// Base64 PDF sent to the model as an attachment
        Pdf => "pdf",
    }
}

// ============================================================================
// Request
// ============================================================================

/// Source material for the deck
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInput {
    /// Input mode
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Topic focus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Extracted file text, or base64 for PDFs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    /// Original file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Format of `file_content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    /// Reference URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Text extracted from `url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_content: Option<String>,
}

impl ContentInput {
    fn empty(kind: ContentKind) -> Self {
        Self {
            kind,
            text: None,
            topic: None,
            file_content: None,
            file_name: None,
            file_type: None,
            url: None,
            url_content: None,
        }
    }

    /// Content given as free text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::empty(ContentKind::Text)
        }
    }

    /// Content given as a topic
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::empty(ContentKind::Topic)
        }
    }

    /// Content read from a file
    pub fn file(name: impl Into<String>, content: impl Into<String>, file_type: FileType) -> Self {
        Self {
            file_name: Some(name.into()),
            file_content: Some(content.into()),
            file_type: Some(file_type),
            ..Self::empty(ContentKind::File)
        }
    }

    /// Content referenced by URL
    pub fn url(url: impl Into<String>, extracted: Option<String>) -> Self {
        Self {
            url: Some(url.into()),
            url_content: extracted,
            ..Self::empty(ContentKind::Url)
        }
    }
}

/// Deck settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationSettings {
    /// Canvas shape
    pub aspect_ratio: AspectRatio,
    /// Requested slides (1..=20)
    pub slide_count: u32,
    /// Color scheme
    pub color_palette: ColorPalette,
    /// Visual/text balance
    pub layout_structure: LayoutStructure,
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::Wide,
            slide_count: 10,
            color_palette: ColorPalette::Auto,
            layout_structure: LayoutStructure::Balanced,
        }
    }
}

/// Body of a generation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Source material
    pub content: ContentInput,
    /// Visual style
    pub style: SlideStyle,
    /// Deck settings
    pub settings: PresentationSettings,
    /// Per-request model endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_config: Option<LlmConfig>,
}

impl GenerateRequest {
    /// Request with default settings and the professional style
    #[must_use]
    pub fn new(content: ContentInput) -> Self {
        Self {
            content,
            style: SlideStyle::Professional,
            settings: PresentationSettings::default(),
            llm_config: None,
        }
    }

    /// Set the style
    #[must_use]
    pub fn with_style(mut self, style: SlideStyle) -> Self {
        self.style = style;
        self
    }

    /// Set the deck settings
    #[must_use]
    pub fn with_settings(mut self, settings: PresentationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the slide count
    #[must_use]
    pub fn with_slide_count(mut self, count: u32) -> Self {
        self.settings.slide_count = count;
        self
    }

    /// Override the model endpoint for this request
    #[must_use]
    pub fn with_llm_config(mut self, config: LlmConfig) -> Self {
        self.llm_config = Some(config);
        self
    }

    /// Check the request before anything is sent
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] for an out-of-range slide count or when there
    /// is no content at all.
    pub fn validate(&self) -> Result<(), RequestError> {
        let count = self.settings.slide_count;
        if !(MIN_SLIDES..=MAX_SLIDES).contains(&count) {
            return Err(RequestError::SlideCountOutOfRange(count));
        }
        if extract_content_text(&self.content).text.trim().is_empty() {
            return Err(RequestError::NoContent);
        }
        Ok(())
    }
}

// ============================================================================
// Content extraction
// ============================================================================

/// Content rendered for the model
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentText {
    /// Markdown sections describing the source material
    pub text: String,
    /// Base64 PDF to attach to the model call
    pub pdf_data: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Render every filled-in content field as a markdown section
#[must_use]
pub fn extract_content_text(content: &ContentInput) -> ContentText {
    let mut parts = Vec::new();
    let mut pdf_data = None;

    if let Some(text) = non_blank(content.text.as_ref()) {
        parts.push(format!("## User Prompt/Text\n{text}"));
    }
    if let Some(topic) = non_blank(content.topic.as_ref()) {
        parts.push(format!("## Topic Focus\n{topic}"));
    }
    if let Some(file) = non_blank(content.file_content.as_ref()) {
        let name = content.file_name.as_deref().unwrap_or("uploaded file");
        if content.file_type == Some(FileType::Pdf) {
            pdf_data = content.file_content.clone();
            parts.push(format!(
                "## PDF Document: \"{name}\"\n[PDF file attached - analyze the document content to create presentation slides]"
            ));
        } else {
            parts.push(format!("## Content from File \"{name}\"\n{file}"));
        }
    }
    if let Some(page) = non_blank(content.url_content.as_ref()) {
        let url = content.url.as_deref().unwrap_or_default();
        parts.push(format!("## Content from URL \"{url}\"\n{page}"));
    } else if let Some(url) = non_blank(content.url.as_ref()) {
        parts.push(format!(
            "## Reference URL\nCreate a presentation about the content from: {url}"
        ));
    }

    ContentText {
        text: parts.join("\n\n"),
        pdf_data,
    }
}
