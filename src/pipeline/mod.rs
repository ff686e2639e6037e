// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Capture-to-insight pipeline
//!
//! The watcher hands paths to [`Pipeline::dispatch`], which filters and
//! deduplicates them and queues a [`ScreenshotEvent`]. Workers spawned with
//! [`spawn_workers`] pop events and run completion guard, image load, OCR
//! and summarization, then report to the configured [`InsightSink`].

pub mod queue;
pub mod sink;

pub use queue::{PushOutcome, WorkQueue};
pub use sink::{CaptureReport, ConsoleSink, InsightSink, MemorySink, OutputFormat};

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::conversation::DocumentContext;
use crate::dedup::{registry_for, PathRegistry, ProcessedPathSet};
use crate::insight::{CompletionSettings, Summarizer};
use crate::llm::build_client;
use crate::loader::{ImageLoader, RetryPolicy};
use crate::ocr::{TesseractCli, TextExtractor};
use crate::watcher::{is_capture, CompletionGuard};
use crate::Result;

/// A qualifying filesystem event, consumed once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotEvent {
    pub id: Uuid,
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
}

impl ScreenshotEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            detected_at: Utc::now(),
        }
    }
}

pub struct Pipeline {
    registry: Arc<dyn PathRegistry>,
    extensions: Vec<String>,
    guard: CompletionGuard,
    clock: Arc<dyn Clock>,
    loader: ImageLoader,
    extractor: TextExtractor,
    summarizer: Summarizer,
    sink: Arc<dyn InsightSink>,
}

impl Pipeline {
    pub fn new(
        loader: ImageLoader,
        extractor: TextExtractor,
        summarizer: Summarizer,
        sink: Arc<dyn InsightSink>,
    ) -> Self {
        Self {
            registry: Arc::new(ProcessedPathSet::new()),
            extensions: crate::AppConfig::default().watch.extensions,
            guard: CompletionGuard::default(),
            clock: Arc::new(SystemClock),
            loader,
            extractor,
            summarizer,
            sink,
        }
    }

    /// Wire up tesseract, the configured completion client and the
    /// configured registry/guard/extensions
    pub fn from_config(config: &AppConfig, sink: Arc<dyn InsightSink>) -> Result<Self> {
        let client = build_client(&config.llm)?;
        let summarizer = Summarizer::new(client, CompletionSettings::from(&config.llm));
        let engine = Arc::new(TesseractCli::from_config(&config.ocr));
        let extractor = TextExtractor::from_config(engine, &config.ocr);
        let loader = ImageLoader::new(RetryPolicy::from(&config.loader));

        Ok(Self::new(loader, extractor, summarizer, sink)
            .with_registry(registry_for(config.watch.dedup_capacity))
            .with_guard(CompletionGuard::from(&config.watch.guard))
            .with_extensions(config.watch.extensions.clone()))
    }

    pub fn with_registry(mut self, registry: Arc<dyn PathRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_guard(mut self, guard: CompletionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn registry(&self) -> &Arc<dyn PathRegistry> {
        &self.registry
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Filter by extension and claim the path.
    ///
    /// Non-capture paths are ignored without being tracked; already known
    /// paths yield `None`.
    pub fn admit(&self, path: &Path) -> Option<ScreenshotEvent> {
        if !is_capture(path, &self.extensions) {
            return None;
        }
        if !self.registry.claim(path) {
            return None;
        }

        let event = ScreenshotEvent::new(path);
        info!("New screenshot detected: {:?}", path);
        self.sink.detected(&event);
        Some(event)
    }

    /// Admit `path` and queue it. Returns true if it was queued.
    pub async fn dispatch(&self, queue: &WorkQueue<ScreenshotEvent>, path: &Path) -> Result<bool> {
        let event = match self.admit(path) {
            Some(event) => event,
            None => return Ok(false),
        };

        match queue.push(event).await {
            Ok(PushOutcome::Queued) => Ok(true),
            Ok(PushOutcome::Dropped(dropped)) => {
                warn!("Work queue full, dropping {:?}", dropped.path);
                self.registry.complete(&dropped.path);
                Ok(dropped.path != path)
            }
            Err(e) => {
                self.registry.complete(path);
                Err(e)
            }
        }
    }

    /// Run one event through the pipeline and report it.
    ///
    /// Failures are logged and absorbed; the path always ends up
    /// `Processed`. Returns `None` when the event was skipped.
    pub async fn process(&self, event: ScreenshotEvent) -> Option<CaptureReport> {
        let span = info_span!("capture", event_id = %event.id, path = %event.path.display());
        let report = self.run(&event).instrument(span).await;

        self.registry.complete(&event.path);
        if let Some(ref report) = report {
            self.sink.report(report);
        }
        report
    }

    async fn run(&self, event: &ScreenshotEvent) -> Option<CaptureReport> {
        if !self.guard.wait(&event.path, self.clock.as_ref()).await {
            debug!("File disappeared before it was complete: {:?}", event.path);
            return None;
        }

        let image = match self.loader.load(&event.path).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping capture: {}", e);
                return None;
            }
        };

        let document = match self.extractor.extract_document(&event.path, &image).await {
            Ok(document) => document,
            Err(e) => {
                error!("OCR failed for {:?}: {}", event.path, e);
                return None;
            }
        };

        let (summary, generated_at, error) = match self.summarizer.summarize(&document.cleaned_text).await {
            Ok(insight) => (Some(insight.summary_text), Some(insight.generated_at), None),
            Err(e) => {
                error!("Summary failed for {:?}: {}", event.path, e);
                (None, None, Some(e.to_string()))
            }
        };

        Some(CaptureReport {
            event_id: event.id,
            path: event.path.clone(),
            detected_at: event.detected_at,
            text: document.cleaned_text,
            summary,
            generated_at,
            error,
        })
    }

    /// Analyze a file on demand, outside deduplication. Errors propagate.
    pub async fn analyze_path(&self, path: &Path) -> Result<DocumentContext> {
        let image = self.loader.load(path).await?;
        self.analyze_image(&path.to_string_lossy(), &image).await
    }

    /// Analyze an already decoded image (e.g. an upload)
    pub async fn analyze_image(&self, source: &str, image: &DynamicImage) -> Result<DocumentContext> {
        let document = self.extractor.extract_document(Path::new(source), image).await?;
        let insight = self.summarizer.summarize(&document.cleaned_text).await?;
        Ok(DocumentContext::new(source, document.cleaned_text, insight.summary_text))
    }
}

/// Spawn `count` consumers that drain `queue` until it is closed and empty
pub fn spawn_workers(
    pipeline: Arc<Pipeline>,
    queue: Arc<WorkQueue<ScreenshotEvent>>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|worker| {
            let pipeline = pipeline.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                debug!("Worker {} started", worker);
                while let Some(event) = queue.pop().await {
                    pipeline.process(event).await;
                }
                debug!("Worker {} stopped", worker);
            })
        })
        .collect()
}
