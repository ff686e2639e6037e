// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SnapSight: screenshot OCR and summarization
//!
//! Watches a directory for new screen captures, extracts their text with
//! OCR, summarizes it with an OpenAI-compatible (or Ollama) completion
//! service, and answers follow-up questions about the most recent capture.

pub mod clock;
pub mod config;
pub mod conversation;
pub mod dedup;
pub mod error;
pub mod insight;
pub mod llm;
pub mod loader;
pub mod ocr;
pub mod pipeline;
pub mod watcher;
pub mod web;

pub use config::AppConfig;
pub use error::{Result, SnapSightError};
