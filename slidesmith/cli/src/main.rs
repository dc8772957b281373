//! Slidesmith - Slide Prompt Generation from the Terminal
//!
//! # Usage
//!
//! ```bash
//! # Generate from a topic, printing slides as they stream in
//! slidesmith generate --topic "Ocean tides" --slides 6 --style technical
//!
//! # Stream from a running server instead of calling the model directly
//! slidesmith generate --file notes.md --server http://localhost:3001
//!
//! # One model call, no streaming; write a markdown download
//! slidesmith generate --topic "Ocean tides" --no-stream -f markdown --output-dir decks/
//!
//! # Keep the session (appends to an existing sessions file)
//! slidesmith generate --topic "Ocean tides" --output sessions.json
//!
//! # Generate several decks in turn
//! slidesmith batch --topic "Ocean tides" --topic "Volcanoes" --output-dir decks/
//!
//! # Rewrite a slide prompt
//! slidesmith optimize "A harbor at dusk" --iterations 2
//!
//! # Replace a saved session's slides with an edited transcript
//! slidesmith edit --sessions sessions.json --id session_1_0 --from edited.md
//!
//! # Parse a saved model transcript
//! slidesmith parse transcript.md --format json
//!
//! # Replay a transcript as SSE frames
//! cat transcript.md | slidesmith stream --style minimalist
//!
//! # Verbose logging
//! RUST_LOG=debug slidesmith generate --topic "Ocean tides"
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): stops a running generation or batch; slides already
//!   printed are kept and no error is reported

mod printer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use slidesmith_core::config::{load_config_from_path, ConfigOverrides, SlidesmithConfig};
use slidesmith_core::prompt::FileType;
use slidesmith_core::session::derive_title;
use slidesmith_core::sse::Utf8Decoder;
use slidesmith_core::{
    parse_document, produce_events, AspectRatio, BatchRunner, BatchState, ContentInput,
    EventFramer, EventSource, GenerateRequest, GeneratedPrompt, GenerationController,
    GenerationOutcome, HttpEventSource, LlmEventSource, MemorySessionStore, PresentationSettings,
    PromptOptimizer, SessionId, SessionRecord, SessionStore, SlideEvent, SlideStyle,
    StreamingToken,
};

use printer::{render, render_batch, render_optimizations, OutputFormat, PrintingStore};

/// Bytes read from stdin per chunk
const STDIN_CHUNK: usize = 8192;

/// Slidesmith - turn content into image-model slide prompts
#[derive(Parser, Debug)]
#[command(name = "slidesmith")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, env = "SLIDESMITH_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SLIDESMITH_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate slide prompts and print them as they arrive
    Generate(GenerateArgs),

    /// Generate one deck per topic, one after another
    Batch(BatchArgs),

    /// Ask the model to rewrite slide prompts
    Optimize(OptimizeArgs),

    /// Replace the slides of a saved session
    Edit {
        /// Sessions file written by `--output`
        #[arg(long, value_name = "FILE")]
        sessions: PathBuf,

        /// Session to edit
        #[arg(long)]
        id: String,

        /// File holding the edited slide blocks
        #[arg(long, value_name = "FILE")]
        from: PathBuf,
    },

    /// Parse a saved model response
    Parse {
        /// File holding the model's text
        file: PathBuf,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Read model text from stdin and write SSE frames to stdout
    Stream {
        /// Style reported in the `done` event
        #[arg(long, default_value = "professional")]
        style: SlideStyle,

        /// Aspect ratio reported in the `done` event
        #[arg(long, default_value = "16:9")]
        aspect_ratio: AspectRatio,
    },
}

/// Deck and model options shared by `generate` and `batch`
#[derive(Args, Debug)]
struct DeckArgs {
    /// Visual style
    #[arg(short = 's', long)]
    style: Option<SlideStyle>,

    /// Number of slides (1-20)
    #[arg(short = 'n', long)]
    slides: Option<u32>,

    /// Aspect ratio (16:9, 4:3, 1:1, 9:16)
    #[arg(short = 'a', long)]
    aspect_ratio: Option<AspectRatio>,

    /// Model identifier
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Stream from this server instead of calling the model directly
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Save sessions to this JSON file
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write each finished session as a download into this directory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Output format once a generation completes
    #[arg(short = 'f', long, value_enum, default_value_t)]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Topic to build the deck around
    #[arg(long, required_unless_present_any = ["text", "file", "url"])]
    topic: Option<String>,

    /// Free text to turn into slides
    #[arg(long)]
    text: Option<String>,

    /// Text or CSV file to turn into slides
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Reference URL (sent as-is; the page is not fetched)
    #[arg(long)]
    url: Option<String>,

    /// Ask for the whole response in one call instead of streaming
    #[arg(long, conflicts_with = "server")]
    no_stream: bool,

    #[command(flatten)]
    deck: DeckArgs,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Topic for one deck; repeat for more
    #[arg(long = "topic", value_name = "TOPIC", required_unless_present = "topics_file")]
    topics: Vec<String>,

    /// File with one topic per line
    #[arg(long, value_name = "FILE")]
    topics_file: Option<PathBuf>,

    #[command(flatten)]
    deck: DeckArgs,
}

#[derive(Args, Debug)]
struct OptimizeArgs {
    /// Prompts to optimize
    #[arg(required_unless_present = "file")]
    prompts: Vec<String>,

    /// File whose content is one more prompt
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Optimization rounds per prompt
    #[arg(short = 'i', long, default_value_t = 1)]
    iterations: u32,

    /// Model identifier
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Output format (markdown prints like text)
    #[arg(short = 'f', long, value_enum, default_value_t)]
    format: OutputFormat,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so stdout carries only slides and frames.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("slidesmith_cli={level},slidesmith_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>, overrides: &ConfigOverrides) -> Result<SlidesmithConfig> {
    let path = path.or_else(slidesmith_core::default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    overrides
        .apply(&mut config)
        .context("Invalid command-line option")?;

    info!(source = %config.source(), model = %config.model, "Configuration loaded");
    Ok(config)
}

fn overrides_from(args: &DeckArgs) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    if let Some(ref model) = args.model {
        overrides = overrides.with_model(model.clone());
    }
    if let Some(ref server) = args.server {
        overrides = overrides.with_server_url(server.clone());
    }
    if let Some(count) = args.slides {
        overrides = overrides.with_slide_count(count);
    }
    if let Some(ratio) = args.aspect_ratio {
        overrides = overrides.with_aspect_ratio(ratio);
    }
    if let Some(style) = args.style {
        overrides = overrides.with_style(style);
    }
    overrides
}

fn settings_from(config: &SlidesmithConfig) -> PresentationSettings {
    PresentationSettings {
        aspect_ratio: config.aspect_ratio,
        slide_count: config.slide_count,
        ..PresentationSettings::default()
    }
}

fn llm_source(config: &SlidesmithConfig) -> LlmEventSource {
    LlmEventSource::new(Arc::new(config.backend()))
        .with_defaults(config.generation_defaults())
        .with_limiter(Arc::new(config.limiter()))
}

fn file_type_for(path: &Path) -> Result<FileType> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase) {
        Some(ref ext) if ext == "pdf" => {
            anyhow::bail!("PDF input is not supported here; extract the text first")
        }
        Some(ref ext) if ext == "csv" => Ok(FileType::Csv),
        _ => Ok(FileType::Text),
    }
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn build_content(args: &GenerateArgs) -> Result<ContentInput> {
    let mut content = if let Some(ref path) = args.file {
        let file_type = file_type_for(path)?;
        let text = read_file(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        ContentInput::file(name, text, file_type)
    } else if let Some(ref url) = args.url {
        ContentInput::url(url.clone(), None)
    } else if let Some(ref text) = args.text {
        ContentInput::text(text.clone())
    } else {
        ContentInput::topic(args.topic.clone().unwrap_or_default())
    };

    // Every given field goes into the prompt, whichever set the input mode
    content.text.clone_from(&args.text);
    content.topic.clone_from(&args.topic);
    if content.url.is_none() {
        content.url.clone_from(&args.url);
    }
    Ok(content)
}

/// Sessions from `path` when it exists, otherwise an empty store
async fn open_sessions(path: Option<&Path>) -> Result<Arc<MemorySessionStore>> {
    match path {
        Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => {
            Ok(Arc::new(MemorySessionStore::load_from(path).await?))
        }
        _ => Ok(Arc::new(MemorySessionStore::new())),
    }
}

/// Write `record` as a download into `dir`; `None` when it has nothing to export
async fn write_download(dir: &Path, record: &SessionRecord, format: OutputFormat) -> Result<Option<PathBuf>> {
    let Some(download) = record.export(format.into())? else {
        return Ok(None);
    };
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(&download.file_name);
    tokio::fs::write(&path, download.content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}

/// Save sessions and downloads as the deck options ask
async fn persist(deck: &DeckArgs, sessions: &MemorySessionStore, slots: &[SessionId]) -> Result<()> {
    if let Some(ref dir) = deck.output_dir {
        for slot in slots {
            let Some(record) = sessions.get(slot) else {
                continue;
            };
            match write_download(dir, &record, deck.format).await? {
                Some(path) => eprintln!("Wrote {}", path.display()),
                None => warn!(session = %slot, "Nothing to export"),
            }
        }
    }
    if let Some(ref path) = deck.output {
        sessions.save_to(path).await?;
        eprintln!("Sessions saved to {}", path.display());
    }
    Ok(())
}

async fn cmd_generate(args: GenerateArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, &overrides_from(&args.deck))?;

    let request = GenerateRequest::new(build_content(&args).await?)
        .with_style(config.style)
        .with_settings(settings_from(&config));
    request.validate()?;

    let sessions = open_sessions(args.deck.output.as_deref()).await?;
    let store = Arc::new(PrintingStore::new(
        Arc::clone(&sessions),
        args.deck.format == OutputFormat::Text,
    ));

    let (slot, outcome) = match config.server_url {
        Some(ref url) if args.no_stream => {
            anyhow::bail!("--no-stream calls the model directly, but a server is configured ({url})")
        }
        Some(ref url) => {
            info!(server = %url, "Streaming from server");
            run(HttpEventSource::new(url.clone()), Arc::clone(&store), request).await
        }
        None if args.no_stream => run_document(llm_source(&config), Arc::clone(&store), request).await,
        None => run(llm_source(&config), Arc::clone(&store), request).await,
    };

    persist(&args.deck, &sessions, std::slice::from_ref(&slot)).await?;

    match outcome {
        GenerationOutcome::Completed { prompt, .. } => {
            print_final(&prompt, args.deck.format)?;
            eprintln!("Done: {} slides", prompt.slides.len());
            Ok(())
        }
        GenerationOutcome::Cancelled { slides } => {
            eprintln!("Stopped; kept {} slides", slides.len());
            Ok(())
        }
        GenerationOutcome::Failed { slides, error } => {
            anyhow::bail!("Generation failed after {} slides: {error}", slides.len())
        }
    }
}

fn print_final(prompt: &GeneratedPrompt, format: OutputFormat) -> Result<()> {
    // Text output was already printed slide by slide
    if format != OutputFormat::Text {
        let title = prompt
            .slides
            .first()
            .map_or_else(|| "Slides".to_string(), |s| derive_title(&s.title));
        println!("{}", render(prompt, &title, format)?);
    }
    Ok(())
}

/// Cancel the generation in `slot` on Ctrl-C; abort the handle once it ends
fn cancel_on_interrupt<S, T>(controller: &Arc<GenerationController<S, T>>, slot: &SessionId) -> JoinHandle<()>
where
    S: EventSource + 'static,
    T: SessionStore + 'static,
{
    let controller = Arc::clone(controller);
    let slot = slot.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, stopping generation");
            controller.cancel(&slot);
        }
    })
}

/// Drive one streaming generation, cancelling it on Ctrl-C
async fn run<S>(source: S, store: Arc<PrintingStore>, request: GenerateRequest) -> (SessionId, GenerationOutcome)
where
    S: EventSource + 'static,
{
    let slot = store.inner().create();
    let controller = Arc::new(GenerationController::new(source, store));
    let interrupt = cancel_on_interrupt(&controller, &slot);

    let outcome = controller.generate(&slot, request).await;
    interrupt.abort();
    (slot, outcome)
}

/// Drive one non-streaming generation, cancelling it on Ctrl-C
async fn run_document(
    source: LlmEventSource,
    store: Arc<PrintingStore>,
    request: GenerateRequest,
) -> (SessionId, GenerationOutcome) {
    let slot = store.inner().create();
    let controller = Arc::new(GenerationController::new(source, store));
    let interrupt = cancel_on_interrupt(&controller, &slot);

    let outcome = controller.generate_document(&slot, request).await;
    interrupt.abort();
    (slot, outcome)
}

/// Topics from the command line, then from the topics file
async fn collect_topics(args: &BatchArgs) -> Result<Vec<String>> {
    let mut topics = args.topics.clone();
    if let Some(ref path) = args.topics_file {
        topics.extend(read_file(path).await?.lines().map(String::from));
    }
    Ok(topics)
}

async fn cmd_batch(args: BatchArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, &overrides_from(&args.deck))?;
    let topics = collect_topics(&args).await?;
    let sessions = open_sessions(args.deck.output.as_deref()).await?;

    let state = match config.server_url {
        Some(ref url) => {
            info!(server = %url, "Batch streaming from server");
            run_batch(HttpEventSource::new(url.clone()), &sessions, &config, topics).await?
        }
        None => run_batch(llm_source(&config), &sessions, &config, topics).await?,
    };

    let slots: Vec<SessionId> = state.jobs.iter().map(|j| j.id.clone()).collect();
    persist(&args.deck, &sessions, &slots).await?;
    println!("{}", render_batch(&state));

    if state.failed_jobs > 0 {
        anyhow::bail!("{} of {} batch jobs failed", state.failed_jobs, state.total_jobs);
    }
    Ok(())
}

/// Queue `topics` and work through them, cancelling the batch on Ctrl-C
async fn run_batch<S>(
    source: S,
    sessions: &Arc<MemorySessionStore>,
    config: &SlidesmithConfig,
    topics: Vec<String>,
) -> Result<BatchState>
where
    S: EventSource + 'static,
{
    let controller = Arc::new(GenerationController::new(source, Arc::clone(sessions)));
    let runner = Arc::new(BatchRunner::new(controller, config.style, settings_from(config)));
    let queued = runner.add_topics(&topics, || sessions.create())?;
    eprintln!("Generating {queued} decks...");

    let interrupt = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT, cancelling batch");
                runner.cancel();
            }
        })
    };

    let state = runner.run().await;
    interrupt.abort();
    Ok(state)
}

/// Prompts from the command line, then the prompt file
async fn collect_prompts(args: &OptimizeArgs) -> Result<Vec<String>> {
    let mut prompts = args.prompts.clone();
    if let Some(ref path) = args.file {
        prompts.push(read_file(path).await?);
    }
    Ok(prompts)
}

async fn cmd_optimize(args: OptimizeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut overrides = ConfigOverrides::new();
    if let Some(ref model) = args.model {
        overrides = overrides.with_model(model.clone());
    }
    let config = load_config(config_path, &overrides)?;
    let optimizer = PromptOptimizer::new(Arc::new(config.backend()))
        .with_defaults(config.generation_defaults())
        .with_limiter(Arc::new(config.limiter()));

    let prompts = collect_prompts(&args).await?;
    let results = match prompts.as_slice() {
        [single] => vec![optimizer.optimize(single, args.iterations).await?],
        _ => optimizer.optimize_batch(&prompts, args.iterations).await?,
    };

    println!("{}", render_optimizations(&results, args.format)?);
    Ok(())
}

async fn cmd_edit(sessions_path: &Path, id: String, from: &Path) -> Result<()> {
    let slides = parse_document(&read_file(from).await?);
    if slides.is_empty() {
        anyhow::bail!("No slides found in {}", from.display());
    }

    let store = MemorySessionStore::load_from(sessions_path).await?;
    let id = SessionId(id);
    let Some(prompt) = store.edit_slides(&id, slides) else {
        anyhow::bail!("No session {id} in {}", sessions_path.display());
    };
    store.save_to(sessions_path).await?;
    eprintln!("Session {id} now has {} slides", prompt.slides.len());
    Ok(())
}

async fn cmd_parse(file: &Path, format: OutputFormat) -> Result<()> {
    let slides = parse_document(&read_file(file).await?);
    if slides.is_empty() {
        anyhow::bail!("No slides found in {}", file.display());
    }

    let prompt = GeneratedPrompt::from_slides(slides);
    let title = derive_title(&prompt.slides[0].title);
    println!("{}", render(&prompt, &title, format)?);
    Ok(())
}

/// Feed `input` to `tx` as model tokens, ending with completion at EOF
async fn read_tokens<R>(mut input: R, tx: mpsc::Sender<StreamingToken>)
where
    R: AsyncRead + Unpin,
{
    let mut utf8 = Utf8Decoder::new();
    let mut buf = vec![0u8; STDIN_CHUNK];

    loop {
        let token = match input.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => StreamingToken::Token(utf8.decode(&buf[..n])),
            Err(e) => {
                let _ = tx.send(StreamingToken::Error(format!("Failed to read stdin: {e}"))).await;
                return;
            }
        };
        if tx.send(token).await.is_err() {
            return;
        }
    }

    let tail = utf8.finish();
    if !tail.is_empty() && tx.send(StreamingToken::Token(tail)).await.is_err() {
        return;
    }
    let _ = tx
        .send(StreamingToken::Complete {
            message: String::new(),
        })
        .await;
}

async fn cmd_stream(style: SlideStyle, aspect_ratio: AspectRatio) -> Result<()> {
    let (tx, rx) = mpsc::channel(16);
    let reader = tokio::spawn(read_tokens(tokio::io::stdin(), tx));
    let mut events = produce_events(rx, style.as_str(), aspect_ratio.as_str());

    let mut stdout = tokio::io::stdout();
    let mut framer = EventFramer::new();
    let mut slides = 0usize;
    while let Some(event) = events.recv().await {
        if matches!(event, SlideEvent::Slide(_)) {
            slides += 1;
        }
        stdout.write_all(framer.frame(&event).as_bytes()).await?;
        stdout.flush().await?;
    }

    reader.abort();
    info!(slides, "Stream finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Command::Generate(args) => cmd_generate(args, cli.config).await,
        Command::Batch(args) => cmd_batch(args, cli.config).await,
        Command::Optimize(args) => cmd_optimize(args, cli.config).await,
        Command::Edit { sessions, id, from } => cmd_edit(&sessions, id, &from).await,
        Command::Parse { file, format } => cmd_parse(&file, format).await,
        Command::Stream {
            style,
            aspect_ratio,
        } => cmd_stream(style, aspect_ratio).await,
    };

    if let Err(ref e) = result {
        warn!(error = %e, "Command failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "slidesmith",
            "generate",
            "--topic",
            "Ocean tides",
            "--style",
            "3d-isometric",
            "--slides",
            "4",
            "--aspect-ratio",
            "1:1",
            "--format",
            "json",
        ])
        .unwrap();

        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.topic.as_deref(), Some("Ocean tides"));
        assert_eq!(args.deck.style, Some(SlideStyle::Isometric3d));
        assert_eq!(args.deck.slides, Some(4));
        assert_eq!(args.deck.aspect_ratio, Some(AspectRatio::Square));
        assert_eq!(args.deck.format, OutputFormat::Json);
        assert!(!args.no_stream);
    }

    #[test]
    fn test_generate_requires_content() {
        assert!(Cli::try_parse_from(["slidesmith", "generate", "--slides", "4"]).is_err());
    }

    #[test]
    fn test_unknown_style_rejected() {
        assert!(Cli::try_parse_from(["slidesmith", "generate", "--topic", "x", "--style", "baroque"]).is_err());
    }

    #[test]
    fn test_overrides_from_args() {
        let cli = Cli::try_parse_from(["slidesmith", "generate", "--text", "notes", "-n", "3"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let overrides = overrides_from(&args.deck);
        assert_eq!(overrides.slide_count, Some(3));
        assert!(overrides.style.is_none());
    }

    #[test]
    fn test_file_type_for() {
        assert_eq!(file_type_for(Path::new("data.CSV")).unwrap(), FileType::Csv);
        assert_eq!(file_type_for(Path::new("notes.md")).unwrap(), FileType::Text);
        assert!(file_type_for(Path::new("deck.pdf")).is_err());
    }

    #[tokio::test]
    async fn test_build_content_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, "Quarterly numbers").await.unwrap();

        let cli = Cli::try_parse_from([
            "slidesmith",
            "generate",
            "--file",
            path.to_str().unwrap(),
            "--topic",
            "Q3",
        ])
        .unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };

        let content = build_content(&args).await.unwrap();
        assert_eq!(content.file_name.as_deref(), Some("notes.md"));
        assert_eq!(content.file_content.as_deref(), Some("Quarterly numbers"));
        assert_eq!(content.topic.as_deref(), Some("Q3"));
    }

    #[test]
    fn test_no_stream_conflicts_with_server() {
        let cli = Cli::try_parse_from(["slidesmith", "generate", "--topic", "x", "--no-stream"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert!(args.no_stream);

        assert!(Cli::try_parse_from([
            "slidesmith",
            "generate",
            "--topic",
            "x",
            "--no-stream",
            "--server",
            "http://localhost:3001",
        ])
        .is_err());
    }

    #[test]
    fn test_cli_parses_batch() {
        let cli = Cli::try_parse_from([
            "slidesmith",
            "batch",
            "--topic",
            "Ocean tides",
            "--topic",
            "Volcanoes",
            "-n",
            "5",
            "--output-dir",
            "decks",
            "-f",
            "markdown",
        ])
        .unwrap();
        let Command::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert_eq!(args.topics, vec!["Ocean tides", "Volcanoes"]);
        assert_eq!(args.deck.slides, Some(5));
        assert_eq!(args.deck.output_dir, Some(PathBuf::from("decks")));
        assert_eq!(args.deck.format, OutputFormat::Markdown);

        assert!(Cli::try_parse_from(["slidesmith", "batch"]).is_err());
    }

    #[tokio::test]
    async fn test_collect_topics_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topics.txt");
        tokio::fs::write(&path, "Volcanoes\n\nGlaciers\n").await.unwrap();

        let cli = Cli::try_parse_from([
            "slidesmith",
            "batch",
            "--topic",
            "Tides",
            "--topics-file",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Batch(args) = cli.command else {
            panic!("expected batch");
        };

        // Blank lines are dropped when the topics are queued
        assert_eq!(
            collect_topics(&args).await.unwrap(),
            vec!["Tides", "Volcanoes", "", "Glaciers"]
        );
    }

    #[test]
    fn test_cli_parses_optimize() {
        let cli = Cli::try_parse_from(["slidesmith", "optimize", "A harbor", "A lighthouse", "-i", "2"]).unwrap();
        let Command::Optimize(args) = cli.command else {
            panic!("expected optimize");
        };
        assert_eq!(args.prompts, vec!["A harbor", "A lighthouse"]);
        assert_eq!(args.iterations, 2);

        assert!(Cli::try_parse_from(["slidesmith", "optimize"]).is_err());
    }

    #[test]
    fn test_cli_parses_edit() {
        let cli = Cli::try_parse_from([
            "slidesmith",
            "edit",
            "--sessions",
            "sessions.json",
            "--id",
            "session_1_0",
            "--from",
            "edited.md",
        ])
        .unwrap();
        let Command::Edit { sessions, id, from } = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(sessions, PathBuf::from("sessions.json"));
        assert_eq!(id, "session_1_0");
        assert_eq!(from, PathBuf::from("edited.md"));
    }

    #[tokio::test]
    async fn test_edit_rewrites_saved_session() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = dir.path().join("sessions.json");
        let edited = dir.path().join("edited.md");

        let store = MemorySessionStore::new();
        let id = store.create();
        store.save_to(&sessions).await.unwrap();
        tokio::fs::write(&edited, "**Slide 2: B**\n```\nb\n```\n**Slide 1: A**\n```\na\n```")
            .await
            .unwrap();

        cmd_edit(&sessions, id.0.clone(), &edited).await.unwrap();

        let record = MemorySessionStore::load_from(&sessions).await.unwrap().get(&id).unwrap();
        assert_eq!(record.slides.len(), 2);
        assert_eq!(record.slides[0].slide_number, 1);
        assert!(record.generated_prompt.is_some());

        assert!(cmd_edit(&sessions, "missing".to_string(), &edited).await.is_err());
    }

    #[tokio::test]
    async fn test_write_download() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("decks");

        let store = MemorySessionStore::new();
        let id = store.create();
        assert!(store.rename(&id, "Ocean tides"));
        let empty = store.get(&id).unwrap();
        assert_eq!(write_download(&out, &empty, OutputFormat::Markdown).await.unwrap(), None);

        store.edit_slides(&id, vec![slidesmith_core::Slide::new(1, "Intro", "Waves")]);
        let record = store.get(&id).unwrap();
        let path = write_download(&out, &record, OutputFormat::Markdown)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path, out.join("Ocean_tides.md"));
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.starts_with("# Ocean tides\n"));
    }

    #[tokio::test]
    async fn test_read_tokens_feeds_producer() {
        let (tx, rx) = mpsc::channel(4);
        let input: &[u8] = "**Slide 1: Intro**\n```\nCafé\n```\n**Slide 2: End**\n```\nBye".as_bytes();
        tokio::spawn(read_tokens(input, tx));

        let mut events = produce_events(rx, "professional", "16:9");
        let mut framer = EventFramer::new();
        let mut frames = Vec::new();
        while let Some(event) = events.recv().await {
            frames.push(framer.frame(&event));
        }

        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("id: 1\nevent: slide\n"));
        assert!(frames[0].contains("Café"));
        assert!(frames[2].starts_with("id: 3\nevent: done\n"));
    }
}
