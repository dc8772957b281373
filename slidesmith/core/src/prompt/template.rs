//! Prompt text sent to the model
//!
//! The system prompt tells the model to answer in the slide grammar the
//! parser understands:
//!
//! ````text
//! **Slide [N]: [Descriptive Title]**
//! ```
//! [Detailed prompt]
//! ```
//! ````

use std::fmt::Write as _;

use super::{AspectRatio, ColorPalette, GenerateRequest, LayoutStructure, SlideStyle};

/// System prompt for slide prompt generation
pub const SYSTEM_PROMPT: &str = include_str!("system_prompt.md");

/// Deck positions between the cover and the conclusion, cycled in order
const MIDDLE_SLIDES: usize = 8;

impl SlideStyle {
    /// Art direction for the style
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Professional => "clean corporate aesthetic with soft gradients, subtle geometric background accents, modern sans-serif typography, structured multi-column layouts, professional color palette with 1-2 accent colors plus neutrals",
            Self::Technical => "technical blueprint or diagram style with clear labeling, arrows, measurement lines, grid backgrounds, high contrast text, minimal color palette (blue, white, accents), engineering-focused aesthetic",
            Self::Creative => "bold artistic design with vibrant colors, dynamic asymmetric layouts, creative typography mixing, gradient backgrounds, artistic illustrations, expressive visual hierarchy",
            Self::Infographic => "data visualization focused with charts, graphs, stat cards, icon grids, clear visual hierarchy for information, balanced text and visual elements, professional yet engaging",
            Self::Educational => "clear instructional design with step-by-step visual flow, numbered sections, friendly illustrations, warm approachable aesthetic, process diagrams, learning-focused with clear progression",
            Self::PixelArt => "8-bit pixel art style with retro game aesthetic, blocky graphics, nostalgic color palette, pixelated icons and illustrations, chunky geometric elements, playful vintage gaming vibes",
            Self::Minimalist => "ultra-minimal design with abundant whitespace, single focal points, simple geometry, maximum negative space, elegant simplicity, zen-like clarity, limited color palette",
            Self::DarkNeon => "dark background with neon glow effects, cyberpunk aesthetic, high contrast design, electric colors on deep black, futuristic atmosphere, glowing accents and borders",
            Self::HandDrawn => "sketchy illustration style with hand-drawn aesthetic, rough organic lines, warm paper texture, pencil sketch feel, artistic imperfection, doodle borders and accents",
            Self::Glassmorphism => "frosted glass effect with translucent layers, soft blur backgrounds, modern UI aesthetic, glass-like transparency, backdrop blur effects, ethereal floating card elements",
            Self::Vintage => "aged-paper aesthetic with muted color palette (beige, brown, soft green), subtle vintage decor like compass or rope motifs, classic serif fonts, nostalgic warm tones",
            Self::Isometric3d => "isometric 3D illustration with dimensional graphics, depth effects, isometric perspective objects, spatial design with shadows, geometric 3D floating elements",
            Self::Watercolor => "soft watercolor painting style with flowing colors, artistic bleeding effects, painted texture, gentle brushstrokes, organic color transitions, muted earthy pastels",
            Self::Newspaper => "editorial print design with bold headlines, column layouts, serif typography zones, black and white with single accent color, newsprint texture, classic journalism aesthetic",
            Self::FlatDesign => "flat design style with bold solid colors, geometric shapes, no shadows or gradients, clean vector aesthetic, simple iconographic elements, modern minimalism",
            Self::GradientMesh => "modern gradient mesh with flowing color transitions, abstract fluid backgrounds, mesh gradients with smooth blends, contemporary color combinations, organic flowing shapes",
            Self::SciFiHud => "futuristic sci-fi HUD interface style with dark backgrounds (#0A0A12), cyan/teal primary accents (#00D4FF), orange secondary highlights (#FF6B35), technical schematics with wireframe diagrams, targeting reticles, data overlays with progress bars and stat displays, glowing edge lines, holographic effects, detailed spacecraft or vehicle blueprints, measurement annotations, modular panel layouts with rounded corners, sensor readout aesthetics, high-tech military or aerospace feel",
            Self::DeepOcean => "nature documentary scientific analysis style with deep blue-gray oceanic backgrounds (#1A2A3A to #0D1B2A gradient), teal/cyan accent colors (#00CED1), white text with subtle glow, animal silhouettes and anatomical diagrams, scientific data visualizations with comparison charts and force diagrams, measurement callouts with labeled arrows, documentary-style layouts reminiscent of National Geographic or BBC nature graphics, educational yet cinematic atmosphere, professional scientific illustration aesthetic, natural world themed iconography",
            Self::DevConsole => "developer console and software architecture style with very dark charcoal/black backgrounds (#0D0D0D to #1A1A1A), gold/amber primary accent color (#FFB800, #E6A800), white and light gray secondary text, technical system diagrams with flowcharts and data flow arrows, modular architecture blocks with clean geometric shapes, code/developer documentation aesthetic, subtle grid or matrix patterns, memory structure visualizations, API and system integration diagrams, organized hierarchical layouts, software engineering focus with coordinate systems and data structures, warm gold highlights on dark surfaces",
            Self::NeonScientific => "neon scientific visualization style with near-black backgrounds, glowing cyan and magenta diagram strokes, luminous molecular or circuit motifs, precise labeled callouts, thin grid overlays, data panels with glowing numerals, laboratory-meets-cyberpunk atmosphere",
        }
    }

    /// Heading form of the wire name (`pixel-art` becomes `Pixel art`)
    #[must_use]
    pub fn label(self) -> String {
        let name = self.as_str().replace('-', " ");
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl ColorPalette {
    /// Color direction for the palette
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Auto => "harmonious colors that complement the visual style and content mood, typically 2-3 accent colors plus neutrals",
            Self::CorporateBlue => "navy blue primary (#1E3A5F), light blue accents (#4A90D9), crisp white backgrounds, silver highlights - professional and trustworthy",
            Self::ModernPurple => "deep purple primary (#6B21A8), violet accents (#8B5CF6), soft lavender highlights, white backgrounds - innovative and creative",
            Self::NatureGreen => "forest green primary (#166534), sage accents (#86EFAC), warm cream backgrounds, earthy brown details - organic and sustainable",
            Self::WarmOrange => "burnt orange primary (#EA580C), coral accents (#FB923C), cream backgrounds, deep brown text - energetic and warm",
            Self::ElegantMonochrome => "black text, white backgrounds, sophisticated grays for panels and accents, subtle texture - timeless and elegant",
            Self::VibrantGradient => "bold gradients from cyan to magenta, electric accent colors, dynamic color transitions - modern and energetic",
            Self::OceanTeal => "deep teal primary (#0D9488), aquamarine accents (#5EEAD4), seafoam highlights, sandy beige backgrounds - calm and refreshing",
            Self::SunsetPink => "hot pink primary (#EC4899), peach accents (#FBBF24), soft coral highlights, warm cream backgrounds - playful and energetic",
            Self::ForestEarth => "deep brown primary (#78350F), terracotta accents (#D97706), olive green highlights, cream backgrounds - grounded and natural",
            Self::RoyalGold => "royal blue primary (#1E40AF), gold accents (#F59E0B), ivory backgrounds, deep navy text - prestigious and luxurious",
            Self::ArcticFrost => "ice blue primary (#38BDF8), silver accents (#94A3B8), white backgrounds, pale lavender highlights - cool and fresh",
            Self::NeonNight => "electric purple (#A855F7), neon green accents (#22C55E), hot pink highlights, dark backgrounds - bold and futuristic",
        }
    }
}

impl LayoutStructure {
    /// Layout direction
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::VisualHeavy => "large hero visuals taking 60-70% of space, minimal text areas, icon-centric design with dramatic imagery, strong visual impact, illustration-forward layouts",
            Self::TextHeavy => "text-focused with 60-70% space for content, multi-column text layouts, bullet point sections, supporting graphics in corners or margins, subtle backgrounds",
            Self::Balanced => "equal visual and text space, dual-column layouts with left-visual right-text or vice versa, versatile 50/50 compositions, flexible zones for various content",
        }
    }
}

impl AspectRatio {
    /// Format description
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Wide => "16:9 widescreen presentation format",
            Self::Standard => "4:3 traditional presentation format",
            Self::Square => "1:1 square format",
            Self::Portrait => "9:16 vertical portrait format",
        }
    }
}

fn middle_slide_line(slide_num: usize, position: usize, slide_count: usize) -> String {
    let kind = match position % MIDDLE_SLIDES {
        0 => format!("Content slide with key points. Footer should include page number '{slide_num}'."),
        1 => format!(
            "Process slide with step-by-step breakdown. Footer: 'Step {} of {}' indicator.",
            slide_num - 1,
            slide_count - 2
        ),
        2 => format!("Data/insight slide with charts. Footer: source attribution + page '{slide_num}'."),
        3 => format!("Comparison slide with multi-column layout. Footer: page number '{slide_num}'."),
        4 => format!("Deep-dive explanation slide. Footer: section name + page '{slide_num}'."),
        5 => format!("Visual showcase slide. Footer: minimal, just page '{slide_num}'."),
        6 => format!("Quote or highlight slide. Footer: attribution + page '{slide_num}'."),
        _ => format!("Timeline/roadmap slide. Footer: progress indicator + page '{slide_num}'."),
    };
    format!("{slide_num}. **Slide {slide_num}** - {kind}")
}

/// Build the user prompt for a request
///
/// `content` is the rendered source material from
/// [`extract_content_text`](super::extract_content_text).
#[must_use]
pub fn build_user_prompt(request: &GenerateRequest, content: &str) -> String {
    let settings = &request.settings;
    let count = settings.slide_count as usize;

    let palette = match settings.color_palette {
        ColorPalette::Auto => "Auto-select harmonious colors (2-3 accents + neutrals) that match the style and content",
        other => other.description(),
    };

    let middle = if count > 2 {
        (0..(count - 2).min(MIDDLE_SLIDES))
            .map(|i| middle_slide_line(i + 2, i, count))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        String::new()
    };

    let conclusion = if count > 1 {
        format!(
            "{count}. **Slide {count}: Conclusion** - Key takeaways. Footer: contact/website info or just page '{count}'."
        )
    } else {
        String::new()
    };

    let mut prompt = String::new();
    let _ = write!(
        prompt,
        "Generate {count} detailed Nano Banana Pro Slides prompts for a cohesive presentation deck.

## Source Content to Transform Into Slides
{content}

## Visual Direction
**Style:** {label}
{style}

**Color Palette:** {palette}

**Layout Priority:** {layout}

**Aspect Ratio:** {ratio}

## Slide Deck Structure
Generate prompts for these {count} slides (use these exact slide numbers in footers):

1. **Slide 1: Title/Cover** - Bold opening with main title, subtitle, and thematic visual. Footer: subtle accent line only, no page number needed.
{middle}
{conclusion}

## Critical Requirements
Each prompt MUST:
- Be 100-200 words describing the complete slide
- Include specific layout structure (columns, panels, sections)
- Describe content organization (headers, bullets, callouts, diagrams)
- Specify visual elements (icons, illustrations, charts)
- Define design details (colors, fonts, spacing)
- Work as a complete slide generator, not just a background

## Output Format
**Slide [N]: [Descriptive Title]**
```
[Detailed prompt describing the full slide - structure, content, visuals, and design]
```

Generate all {count} detailed prompts now.",
        label = request.style.label(),
        style = request.style.description(),
        layout = settings.layout_structure.description(),
        ratio = settings.aspect_ratio.description(),
    );
    prompt
}
