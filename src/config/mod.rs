// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for SnapSight

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, SnapSightError};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directory watching and dispatch
    pub watch: WatchConfig,

    /// Image loading retry policy
    #[serde(default)]
    pub loader: LoaderConfig,

    /// OCR preprocessing and engine settings
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Completion service settings
    pub llm: LlmConfig,

    /// HTTP surface settings
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    pub dir: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub backpressure: Backpressure,
    /// Bound on remembered paths; `None` keeps every path for the process lifetime
    #[serde(default)]
    pub dedup_capacity: Option<usize>,
}

/// How long to wait before treating a freshly created file as fully written
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GuardConfig {
    FixedDelay {
        #[serde(default = "default_guard_delay_ms")]
        delay_ms: u64,
    },
    StableSize {
        #[serde(default = "default_stable_interval_ms")]
        interval_ms: u64,
        #[serde(default = "default_stable_max_wait_ms")]
        max_wait_ms: u64,
    },
}

/// What the producer does when the work queue is full
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Backpressure {
    #[default]
    Block,
    DropOldest,
    DropNewest,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_command")]
    pub command: String,
    #[serde(default = "default_oem")]
    pub oem: u8,
    #[serde(default = "default_psm")]
    pub psm: u8,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default = "default_min_line_len")]
    pub min_line_len: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Any OpenAI-compatible chat completions API (Groq by default)
    OpenAi,
    Ollama,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

/// Upper bound on completion retries
pub const MAX_LLM_RETRIES: u32 = 10;

// Default value functions
fn default_extensions() -> Vec<String> {
    vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()]
}
fn default_queue_capacity() -> usize { 32 }
fn default_workers() -> usize { 1 }
fn default_guard_delay_ms() -> u64 { 2000 }
fn default_stable_interval_ms() -> u64 { 500 }
fn default_stable_max_wait_ms() -> u64 { 10_000 }
fn default_max_attempts() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 500 }
fn default_backoff_factor() -> f64 { 1.0 }
fn default_ocr_command() -> String { "tesseract".to_string() }
fn default_oem() -> u8 { 3 }
fn default_psm() -> u8 { 6 }
fn default_threshold() -> u8 { 150 }
fn default_min_line_len() -> usize { 5 }
fn default_preview_chars() -> usize { 500 }
fn default_api_key_env() -> String { "GROQ_API_KEY".to_string() }
fn default_temperature() -> f32 { 0.3 }
fn default_timeout() -> u64 { 120 }
fn default_retries() -> u32 { 2 }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8080 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig {
                dir: "./screenshots".to_string(),
                extensions: default_extensions(),
                guard: GuardConfig::default(),
                queue_capacity: default_queue_capacity(),
                workers: default_workers(),
                backpressure: Backpressure::default(),
                dedup_capacity: None,
            },
            loader: LoaderConfig::default(),
            ocr: OcrConfig::default(),
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                endpoint: "https://api.groq.com/openai/v1".to_string(),
                model: "llama-3.1-8b-instant".to_string(),
                api_key_env: default_api_key_env(),
                temperature: default_temperature(),
                timeout_secs: default_timeout(),
                retries: default_retries(),
            },
            web: WebConfig::default(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::FixedDelay { delay_ms: default_guard_delay_ms() }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_ocr_command(),
            oem: default_oem(),
            psm: default_psm(),
            language: None,
            threshold: default_threshold(),
            min_line_len: default_min_line_len(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

impl WatchConfig {
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| SnapSightError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.watch.extensions.is_empty() {
            return Err(SnapSightError::Config("watch.extensions must not be empty".to_string()));
        }
        if self.watch.workers == 0 {
            return Err(SnapSightError::Config("watch.workers must be at least 1".to_string()));
        }
        if self.watch.queue_capacity == 0 {
            return Err(SnapSightError::Config("watch.queue_capacity must be at least 1".to_string()));
        }
        if self.watch.dedup_capacity == Some(0) {
            return Err(SnapSightError::Config("watch.dedup_capacity must be at least 1".to_string()));
        }
        if self.loader.max_attempts == 0 {
            return Err(SnapSightError::Config("loader.max_attempts must be at least 1".to_string()));
        }
        if self.loader.backoff_factor < 1.0 {
            return Err(SnapSightError::Config("loader.backoff_factor must be >= 1.0".to_string()));
        }
        if self.llm.retries > MAX_LLM_RETRIES {
            return Err(SnapSightError::Config(format!(
                "llm.retries must be at most {}",
                MAX_LLM_RETRIES
            )));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(SnapSightError::Config("llm.temperature must be within 0.0..=2.0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_capture_pipeline() {
        let config = AppConfig::default();
        assert_eq!(config.watch.extensions, vec!["png", "jpg", "jpeg"]);
        assert_eq!(config.watch.guard, GuardConfig::FixedDelay { delay_ms: 2000 });
        assert_eq!(config.loader.max_attempts, 3);
        assert_eq!(config.loader.retry_delay_ms, 500);
        assert_eq!(config.ocr.threshold, 150);
        assert_eq!((config.ocr.oem, config.ocr.psm), (3, 6));
        assert!((config.llm.temperature - 0.3).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_json_fills_defaults() {
        let json = r#"{
            "watch": { "dir": "/tmp/shots", "guard": { "mode": "stable_size" } },
            "llm": { "provider": "ollama", "endpoint": "http://localhost:11434", "model": "llama3.2:3b" }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.watch.workers, 1);
        assert_eq!(config.watch.backpressure, Backpressure::Block);
        assert_eq!(
            config.watch.guard,
            GuardConfig::StableSize { interval_ms: 500, max_wait_ms: 10_000 }
        );
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.watch.workers = 0;
        assert!(matches!(config.validate(), Err(SnapSightError::Config(_))));
    }

    #[test]
    fn test_validate_bounds_llm_retries() {
        let mut config = AppConfig::default();
        config.llm.retries = MAX_LLM_RETRIES;
        assert!(config.validate().is_ok());
        config.llm.retries = 65;
        assert!(matches!(config.validate(), Err(SnapSightError::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.watch.backpressure = Backpressure::DropOldest;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.watch.backpressure, Backpressure::DropOldest);
        assert_eq!(loaded.llm.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.watch.dir, "./screenshots");
    }
}
