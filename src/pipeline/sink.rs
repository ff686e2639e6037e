// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Where processed captures are surfaced

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use super::ScreenshotEvent;

/// Outcome of one capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureReport {
    pub event_id: Uuid,
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub text: String,
    /// `None` when the completion service failed
    pub summary: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

pub trait InsightSink: Send + Sync {
    fn detected(&self, event: &ScreenshotEvent);

    fn report(&self, report: &CaptureReport);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "jsonl" | "json" => OutputFormat::Jsonl,
            _ => OutputFormat::Text,
        }
    }
}

/// Prints to stdout
pub struct ConsoleSink {
    format: OutputFormat,
    preview_chars: usize,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat, preview_chars: usize) -> Self {
        Self { format, preview_chars }
    }

    pub fn render(&self, report: &CaptureReport) -> String {
        match self.format {
            OutputFormat::Jsonl => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut out = String::new();
                out.push_str(&format!(
                    "\nOCR TEXT (first {} chars):\n{}\n",
                    self.preview_chars,
                    preview(&report.text, self.preview_chars)
                ));
                match (&report.summary, &report.error) {
                    (Some(summary), _) => out.push_str(&format!("\nSUMMARY:\n{}\n", summary)),
                    (None, Some(error)) => out.push_str(&format!("\nSUMMARY UNAVAILABLE: {}\n", error)),
                    (None, None) => {}
                }
                out.push('\n');
                out.push_str(&"=".repeat(80));
                out
            }
        }
    }
}

impl InsightSink for ConsoleSink {
    fn detected(&self, event: &ScreenshotEvent) {
        if self.format == OutputFormat::Text {
            println!("\nNew screenshot detected: {}", event.path.display());
        }
    }

    fn report(&self, report: &CaptureReport) {
        println!("{}", self.render(report));
    }
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    detected: Mutex<Vec<PathBuf>>,
    reports: Mutex<Vec<CaptureReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detected_paths(&self) -> Vec<PathBuf> {
        self.detected.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<CaptureReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl InsightSink for MemorySink {
    fn detected(&self, event: &ScreenshotEvent) {
        if let Ok(mut detected) = self.detected.lock() {
            detected.push(event.path.clone());
        }
    }

    fn report(&self, report: &CaptureReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}

/// First `max_chars` characters of `text`
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(summary: Option<&str>, error: Option<&str>) -> CaptureReport {
        CaptureReport {
            event_id: Uuid::nil(),
            path: PathBuf::from("/shots/a.png"),
            detected_at: Utc::now(),
            text: "x".repeat(600),
            summary: summary.map(String::from),
            generated_at: None,
            error: error.map(String::from),
        }
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("short", 500), "short");
    }

    #[test]
    fn test_text_render_truncates_and_separates() {
        let sink = ConsoleSink::new(OutputFormat::Text, 500);
        let out = sink.render(&report(Some("It is a list."), None));
        assert!(out.contains(&"x".repeat(500)));
        assert!(!out.contains(&"x".repeat(501)));
        assert!(out.contains("SUMMARY:\nIt is a list."));
        assert!(out.ends_with(&"=".repeat(80)));
    }

    #[test]
    fn test_text_render_failure() {
        let sink = ConsoleSink::new(OutputFormat::Text, 10);
        let out = sink.render(&report(None, Some("timed out")));
        assert!(out.contains("SUMMARY UNAVAILABLE: timed out"));
    }

    #[test]
    fn test_jsonl_render_is_one_line() {
        let sink = ConsoleSink::new(OutputFormat::parse("jsonl"), 10);
        let out = sink.render(&report(Some("s"), None));
        assert!(!out.contains('\n'));
        let parsed: CaptureReport = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.summary.as_deref(), Some("s"));
    }
}
