// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for SnapSight

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SnapSight operations
pub type Result<T> = std::result::Result<T, SnapSightError>;

/// SnapSight error types
#[derive(Error, Debug)]
pub enum SnapSightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Watch directory does not exist: {0}")]
    MissingWatchDirectory(PathBuf),

    #[error("Image unreadable after {attempts} attempts: {path}")]
    UnreadableImage { path: PathBuf, attempts: u32 },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("No API key configured for {0}")]
    MissingApiKey(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No active document; analyze a capture first")]
    NoActiveDocument,

    #[error("Work queue closed")]
    QueueClosed,
}

impl SnapSightError {
    /// Whether trying the same request again could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SnapSightError::MissingApiKey(_) | SnapSightError::Config(_)
        )
    }
}
