//! End-to-end properties of the streaming parser
//!
//! These tests drive the public pipeline the way a live stream does: text
//! split at arbitrary points, slides restated, streams stopped early.

use futures::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use slidesmith_core::grammar::parse_document;
use slidesmith_core::slide::sort_by_number;
use slidesmith_core::sse::{sse_event_stream, BoxEventStream, EventStream, SlideEvent, TransportError};
use slidesmith_core::{Slide, SlideAssembler, SlidePipeline};

const TWO_SLIDES: &str = "**Slide 1: Intro**\n```\nOpening remarks about the topic.\n```\n\n**Slide 2: Details**\n```\nDeep dive into specifics.\n```";

fn expected_two() -> Vec<Slide> {
    vec![
        Slide::new(1, "Intro", "Opening remarks about the topic."),
        Slide::new(2, "Details", "Deep dive into specifics."),
    ]
}

/// Push `chunks` through a fresh pipeline and flush it
fn run(chunks: &[&str]) -> Vec<Slide> {
    let mut pipeline = SlidePipeline::new();
    let mut slides = Vec::new();
    for chunk in chunks {
        slides.extend(pipeline.push(chunk));
    }
    slides.extend(pipeline.finish());
    slides
}

fn char_by_char(text: &str) -> Vec<Slide> {
    let mut pipeline = SlidePipeline::new();
    let mut slides = Vec::new();
    let mut buf = [0u8; 4];
    for c in text.chars() {
        slides.extend(pipeline.push(c.encode_utf8(&mut buf)));
    }
    slides.extend(pipeline.finish());
    slides
}

// =============================================================================
// Concrete scenario
// =============================================================================

#[test]
fn test_two_slides_in_three_chunks() {
    let splits = [(5, 40), (19, 23), (60, 75), (1, 110), (74, 76)];
    for (a, b) in splits {
        let chunks = [&TWO_SLIDES[..a], &TWO_SLIDES[a..b], &TWO_SLIDES[b..]];
        assert_eq!(run(&chunks), expected_two(), "split at {a}/{b}");
    }
}

#[test]
fn test_two_slides_every_split_point() {
    for a in 0..=TWO_SLIDES.len() {
        let chunks = [&TWO_SLIDES[..a], &TWO_SLIDES[a..]];
        assert_eq!(run(&chunks), expected_two(), "split at {a}");
    }
}

// =============================================================================
// Property 1: one-shot parse equals character-by-character streaming
// =============================================================================

#[test]
fn test_incremental_matches_one_shot() {
    let documents = [
        TWO_SLIDES.to_string(),
        "Here is your deck.\n\n**Slide 1: Título**\n```markdown\nCafé ☕ scene, 16:9\n```\nSome commentary.\n**Slide 2: Next**\n```\nline one\nline two\n```\n".to_string(),
        (1..=12)
            .map(|n| format!("**Slide {n}: Part {n}**\n```\nPrompt body {n}\n```\n\n"))
            .collect::<String>(),
    ];

    for doc in &documents {
        let one_shot = parse_document(doc);
        let mut streamed = char_by_char(doc);
        sort_by_number(&mut streamed);
        assert_eq!(streamed, one_shot);
        assert!(!one_shot.is_empty());
    }
}

// =============================================================================
// Property 2: first occurrence of a slide number wins
// =============================================================================

#[test]
fn test_restated_slide_surfaces_once() {
    let text = "**Slide 1: A**\n```\nfirst\n```\n**Slide 2: B**\n```\nb\n```\n**Slide 1: A again**\n```\nsecond\n```\n";

    let slides = char_by_char(text);
    assert_eq!(slides, vec![Slide::new(1, "A", "first"), Slide::new(2, "B", "b")]);

    // Same policy for the whole-document parse
    assert_eq!(parse_document(text)[0], Slide::new(1, "A", "first"));
}

// =============================================================================
// Property 3: a closing fence split across appends
// =============================================================================

#[test]
fn test_split_closing_fence_detected_once() {
    let mut assembler = SlideAssembler::new();
    assert!(assembler
        .append("**Slide 1: Intro**\n```\nOpening remarks about the topic.\n``")
        .is_empty());
    assert_eq!(
        assembler.append("`"),
        vec![Slide::new(1, "Intro", "Opening remarks about the topic.")]
    );
    assert!(assembler.append("\n").is_empty());
    assert!(assembler.flush().is_empty());
}

// =============================================================================
// Property 4: cancellation stops delivery
// =============================================================================

fn buffered_events() -> BoxEventStream {
    let events: Vec<Result<SlideEvent, TransportError>> = vec![
        Ok(SlideEvent::Slide(Slide::new(1, "A", "a"))),
        Ok(SlideEvent::Slide(Slide::new(2, "B", "b"))),
        Ok(SlideEvent::Done(Default::default())),
    ];
    stream::iter(events).boxed()
}

#[test]
fn test_cancel_drops_buffered_events() {
    tokio_test::block_on(async {
        let mut events = EventStream::from_stream(buffered_events(), CancellationToken::new());

        let first = events.next_event().await.unwrap().unwrap();
        assert_eq!(first, SlideEvent::Slide(Slide::new(1, "A", "a")));

        events.cancel();
        assert!(events.next_event().await.is_none());
        assert!(events.next_event().await.is_none());
    });
}

#[tokio::test]
async fn test_cancel_through_shared_token() {
    let token = CancellationToken::new();
    let mut events = EventStream::from_stream(buffered_events(), token.child_token());

    assert!(events.next_event().await.is_some());
    token.cancel();
    assert!(events.next_event().await.is_none());
}

// =============================================================================
// Property 5: final flush recovers trailing content
// =============================================================================

#[test]
fn test_fence_at_end_of_stream_without_newline() {
    assert_eq!(run(&[TWO_SLIDES]), expected_two());
    assert_eq!(run(&[&TWO_SLIDES[..TWO_SLIDES.len() - 1], "`"]), expected_two());
}

#[test]
fn test_flush_recovers_unterminated_last_slide() {
    let mut pipeline = SlidePipeline::new();
    let streamed = pipeline.push("**Slide 1: A**\n```\na\n```\n\n**Slide 2: B**\n```\nthe model stopped here");
    assert_eq!(streamed, vec![Slide::new(1, "A", "a")]);
    assert_eq!(
        pipeline.finish(),
        vec![Slide::new(2, "B", "the model stopped here")]
    );
}

// =============================================================================
// Property 6: ordering is left to the caller
// =============================================================================

#[test]
fn test_out_of_order_discovery_then_sort() {
    let text = "**Slide 3: C**\n```\nc\n```\n**Slide 1: A**\n```\na\n```\n**Slide 2: B**\n```\nb\n```\n";
    let mut slides = char_by_char(text);
    let discovered: Vec<u32> = slides.iter().map(|s| s.slide_number).collect();
    assert_eq!(discovered, vec![3, 1, 2]);

    sort_by_number(&mut slides);
    let sorted: Vec<u32> = slides.iter().map(|s| s.slide_number).collect();
    assert_eq!(sorted, vec![1, 2, 3]);
}

// =============================================================================
// Wire path: SSE bytes through the event stream
// =============================================================================

#[tokio::test]
async fn test_sse_body_split_mid_character() {
    let body = "event: slide\ndata: {\"slideNumber\":1,\"title\":\"Café\",\"prompt\":\"naïve\"}\n\nevent: bogus\ndata: {}\n\nevent: slide\ndata: {not json\n\nevent: done\ndata: {\"totalSlides\":1}\n\n";
    let bytes = body.as_bytes();
    // Split inside the two-byte 'é'
    let cut = body.find('é').unwrap() + 1;
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        vec![Ok(bytes[..cut].to_vec()), Ok(bytes[cut..].to_vec())];

    let mut events = EventStream::from_stream(
        sse_event_stream(stream::iter(chunks)),
        CancellationToken::new(),
    );

    let mut received = Vec::new();
    while let Some(event) = events.next_event().await {
        received.push(event.unwrap());
    }

    assert_eq!(received.len(), 2);
    assert_eq!(received[0], SlideEvent::Slide(Slide::new(1, "Café", "naïve")));
    assert!(matches!(received[1], SlideEvent::Done(ref d) if d.total_slides == Some(1)));
}
