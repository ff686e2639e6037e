// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SnapSight: screenshot OCR and summarization
//!
//! Watches a directory for new screen captures and prints what they say.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use snapsight::config::{AppConfig, LlmProvider};
use snapsight::conversation::{Conversation, DocumentContext};
use snapsight::llm::{build_client, OllamaClient};
use snapsight::ocr::TesseractCli;
use snapsight::pipeline::{spawn_workers, ConsoleSink, OutputFormat, Pipeline, WorkQueue};
use snapsight::watcher::{is_capture, latest_capture, FileWatcher, WatchEvent};
use snapsight::{Result, SnapSightError};

/// SnapSight CLI - screenshot OCR and summarization
#[derive(Parser, Debug)]
#[command(name = "snapsight")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Watch for screenshots, extract their text and summarize it", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "jsonl"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a directory for new screenshots and summarize them
    Watch {
        /// Directory to watch (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Number of pipeline workers (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip completion service health check on startup
        #[arg(long)]
        skip_health_check: bool,

        /// Process captures already in the directory on startup
        #[arg(long)]
        process_existing: bool,
    },

    /// Analyze one capture and optionally ask follow-up questions
    Analyze {
        /// Capture to analyze
        path: Option<PathBuf>,

        /// Use the most recently modified capture in the watch directory
        #[arg(long, conflicts_with = "path")]
        latest: bool,

        /// Read follow-up questions from stdin
        #[arg(long)]
        chat: bool,

        /// Ask a follow-up question (repeatable)
        #[arg(long)]
        ask: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show OCR engine and completion service status
    Status,

    /// Initialize a new SnapSight setup
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if dotenvy::dotenv().is_ok() {
        debug!("Loaded .env");
    }

    if !cli.quiet {
        info!("SnapSight v{}", env!("CARGO_PKG_VERSION"));
    }

    let config = AppConfig::load(&cli.config)?;
    let format = OutputFormat::parse(&cli.format);

    match cli.command {
        Some(Commands::Watch { dir, workers, skip_health_check, process_existing }) => {
            run_watch(config, dir, workers, skip_health_check, process_existing, format).await
        }
        Some(Commands::Analyze { path, latest, chat, ask }) => {
            run_analyze(config, path, latest, chat, ask, format).await
        }
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        None => run_watch(config, None, None, false, false, format).await,
    }
}

/// Receiver that flips to true on Ctrl+C or SIGTERM
fn shutdown_signal() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

/// Run the watch mode (main capture loop)
async fn run_watch(
    mut config: AppConfig,
    dir_override: Option<PathBuf>,
    workers_override: Option<usize>,
    skip_health_check: bool,
    process_existing: bool,
    format: OutputFormat,
) -> Result<()> {
    if let Some(dir) = dir_override {
        config.watch.dir = dir.to_string_lossy().to_string();
    }
    if let Some(workers) = workers_override {
        config.watch.workers = workers;
    }
    config.validate()?;

    let watch_dir = config.watch.dir_path();
    if !watch_dir.is_dir() {
        return Err(SnapSightError::MissingWatchDirectory(watch_dir));
    }
    info!("Watch directory: {:?}", watch_dir);

    let sink = Arc::new(ConsoleSink::new(format, config.ocr.preview_chars));
    let pipeline = Arc::new(Pipeline::from_config(&config, sink)?);

    if !skip_health_check {
        info!("Checking completion service...");
        match pipeline.summarizer().client().health_check().await {
            Ok(()) => info!("Completion service reachable ({})", config.llm.endpoint),
            // summaries fail per event and are reported, watching still works
            Err(e) => warn!("Completion service unavailable: {}", e),
        }
        if !TesseractCli::from_config(&config.ocr).available() {
            warn!("'{}' not found; OCR will fail until it is installed", config.ocr.command);
        }
    } else {
        warn!("Skipping health checks");
    }

    let queue = Arc::new(WorkQueue::new(config.watch.queue_capacity, config.watch.backpressure));
    let handles = spawn_workers(pipeline.clone(), queue.clone(), config.watch.workers);
    info!("Started {} worker(s), queue capacity {}", handles.len(), queue.capacity());

    let mut watcher = FileWatcher::new()?;
    watcher.watch(&watch_dir)?;

    if process_existing {
        info!("Processing existing captures...");
        let mut existing: Vec<PathBuf> = std::fs::read_dir(&watch_dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_capture(path, pipeline.extensions()))
            .collect();
        existing.sort();
        for path in existing {
            pipeline.dispatch(&queue, &path).await?;
        }
    }

    let shutdown_rx = shutdown_signal();

    info!("Watching for screenshots. Press Ctrl+C to stop.");

    // Main event loop
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if let Some(event) = watcher.next_event(Duration::from_millis(100)) {
            if let WatchEvent::Error(ref e) = event {
                warn!("Watch error: {}", e);
            } else if let Some(path) = event.path() {
                if let Err(e) = pipeline.dispatch(&queue, path).await {
                    error!("Failed to queue {:?}: {}", path, e);
                }
            }
        }
    }

    drop(watcher);
    let discarded = queue.take_pending();
    if !discarded.is_empty() {
        info!("Discarding {} queued capture(s)", discarded.len());
    }
    queue.close();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Worker panicked: {}", e);
        }
    }

    info!("SnapSight stopped.");
    Ok(())
}

/// Analyze a single capture, then answer follow-up questions about it
async fn run_analyze(
    config: AppConfig,
    path: Option<PathBuf>,
    latest: bool,
    chat: bool,
    questions: Vec<String>,
    format: OutputFormat,
) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => {
            if !latest {
                info!("No capture given, using the latest one");
            }
            let dir = config.watch.dir_path();
            latest_capture(&dir, &config.watch.extensions)?.ok_or_else(|| {
                SnapSightError::Config(format!("No captures found in {}", dir.display()))
            })?
        }
    };

    let sink = Arc::new(ConsoleSink::new(format, config.ocr.preview_chars));
    let pipeline = Pipeline::from_config(&config, sink)?;

    info!("Analyzing {:?}", path);
    let document = pipeline.analyze_path(&path).await?;
    print_document(&document, format, config.ocr.preview_chars)?;

    let answerer = pipeline.summarizer().answerer();
    let mut conversation = Conversation::new();
    conversation.open(document);

    for question in questions {
        print_answer(&question, conversation.ask(&answerer, &question).await, format)?;
    }

    if chat {
        eprintln!("Ask about this capture (empty line or 'exit' to stop):");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let question = line.trim();
            if question.is_empty() || question == "exit" || question == "quit" {
                break;
            }
            print_answer(question, conversation.ask(&answerer, question).await, format)?;
        }
    }

    Ok(())
}

fn print_document(document: &DocumentContext, format: OutputFormat, preview_chars: usize) -> Result<()> {
    match format {
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(document)?),
        OutputFormat::Text => {
            println!("\n{}", document.source);
            println!("\nOCR TEXT (first {} chars):", preview_chars);
            println!("{}", snapsight::pipeline::sink::preview(&document.raw_text, preview_chars));
            println!("\nSUMMARY:\n{}", document.summary);
            println!("\n{}", "=".repeat(80));
        }
    }
    Ok(())
}

fn print_answer(question: &str, answer: Result<String>, format: OutputFormat) -> Result<()> {
    match (format, answer) {
        (OutputFormat::Jsonl, Ok(answer)) => {
            println!("{}", serde_json::json!({ "question": question, "answer": answer }));
        }
        (OutputFormat::Jsonl, Err(e)) => {
            println!("{}", serde_json::json!({ "question": question, "error": e.to_string() }));
        }
        (OutputFormat::Text, Ok(answer)) => println!("\nQ: {}\nA: {}", question, answer),
        (OutputFormat::Text, Err(e)) => {
            error!("Could not answer '{}': {}", question, e);
        }
    }
    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Watch dir: {}", config.watch.dir);
            println!("  Extensions: {:?}", config.watch.extensions);
            println!("  Model: {} @ {}", config.llm.model, config.llm.endpoint);
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> Result<()> {
    println!("SnapSight v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");

    let tesseract = TesseractCli::from_config(&config.ocr);
    if tesseract.available() {
        println!("OCR ({}): Available", config.ocr.command);
    } else {
        println!("OCR ({}): Not found", config.ocr.command);
    }

    let client = build_client(&config.llm)?;
    match client.health_check().await {
        Ok(()) => println!("Completion service ({}): Reachable", client.name()),
        Err(e) => println!("Completion service ({}): Error - {}", client.name(), e),
    }

    if config.llm.provider == LlmProvider::Ollama {
        let ollama = OllamaClient::new(&config.llm.endpoint, config.llm.timeout())?;
        match ollama.list_models().await {
            Ok(models) => {
                println!("\nAvailable models:");
                for m in &models {
                    let marker = if m.starts_with(config.llm.model.as_str()) { "→" } else { " " };
                    println!("  {} {}", marker, m);
                }
            }
            Err(e) => println!("  Error listing models: {}", e),
        }
    }

    let watch_dir = config.watch.dir_path();
    println!("\nConfiguration:");
    println!(
        "  Watch dir: {:?} ({})",
        watch_dir,
        if watch_dir.is_dir() { "exists" } else { "missing" }
    );
    println!("  Model: {}", config.llm.model);
    println!("  Endpoint: {}", config.llm.endpoint);
    println!("  API key env: {}", config.llm.api_key_env);
    println!("  Workers: {}", config.watch.workers);

    Ok(())
}

/// Initialize a new SnapSight setup
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(SnapSightError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let watch_dir = target.join("screenshots");
    std::fs::create_dir_all(&watch_dir)?;

    let mut config = AppConfig::default();
    config.watch.dir = watch_dir.to_string_lossy().to_string();
    config.save(&config_path)?;

    println!("SnapSight initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - screenshots/");
    println!("\nNext steps:");
    println!("  1. export {}=...", config.llm.api_key_env);
    println!("  2. Start watching: snapsight watch");

    Ok(())
}
