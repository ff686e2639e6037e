// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Completion service clients
//!
//! A completion capability takes a model, one prompt string and a
//! temperature, and returns generated text. Summaries and follow-up answers
//! both travel through this transport.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiCompatClient;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::{LlmConfig, LlmProvider};
use crate::{Result, SnapSightError};

/// A single-prompt completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Check the service is reachable
    async fn health_check(&self) -> Result<()>;
}

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Complete with exponential backoff between failed attempts.
///
/// Errors that cannot succeed on retry (e.g. a missing API key) are
/// returned immediately.
pub async fn complete_with_retry(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    retries: u32,
) -> Result<String> {
    let mut last_error = None;

    for attempt in 0..=retries {
        if attempt > 0 {
            let delay = Duration::from_secs(2u64.saturating_pow(attempt - 1)).min(MAX_BACKOFF);
            warn!("Retrying {} request in {:?} (attempt {})", client.name(), delay, attempt + 1);
            tokio::time::sleep(delay).await;
        }

        match client.complete(request).await {
            Ok(response) => return Ok(response),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!("{} request failed: {}", client.name(), e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SnapSightError::Completion("Unknown error".to_string())))
}

/// Build the client selected by `llm.provider`
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>> {
    match config.provider {
        LlmProvider::OpenAi => {
            let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
            if api_key.is_none() {
                warn!("{} is not set; completion requests will fail", config.api_key_env);
            }
            Ok(Arc::new(OpenAiCompatClient::new(
                &config.endpoint,
                api_key,
                config.timeout(),
            )?))
        }
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::new(&config.endpoint, config.timeout())?)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted client: pops queued responses, records every prompt
    pub(crate) struct ScriptedClient {
        responses: Mutex<Vec<Result<String>>>,
        pub prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(responses: Vec<Result<String>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self { responses: Mutex::new(responses), prompts: Mutex::new(Vec::new()) }
        }

        pub(crate) fn always(text: &str) -> Self {
            Self::new((0..16).map(|_| Ok(text.to_string())).collect())
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(SnapSightError::Completion("script exhausted".to_string())))
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".to_string(),
            prompt: "p".to_string(),
            temperature: 0.3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let client = ScriptedClient::new(vec![
            Err(SnapSightError::Completion("rate limited".to_string())),
            Ok("done".to_string()),
        ]);
        let out = complete_with_retry(&client, &request(), 2).await.unwrap();
        assert_eq!(out, "done");
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_last_error() {
        let client = ScriptedClient::new(vec![]);
        let err = complete_with_retry(&client, &request(), 1).await.unwrap_err();
        assert!(matches!(err, SnapSightError::Completion(_)));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_key_is_not_retried() {
        let client = ScriptedClient::new(vec![
            Err(SnapSightError::MissingApiKey("https://api.groq.com/openai/v1".to_string())),
            Ok("unreachable".to_string()),
        ]);
        let err = complete_with_retry(&client, &request(), 5).await.unwrap_err();
        assert!(matches!(err, SnapSightError::MissingApiKey(_)));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let start = tokio::time::Instant::now();
        let client = ScriptedClient::new(vec![]);
        assert!(complete_with_retry(&client, &request(), 8).await.is_err());
        // 1 + 2 + 4 + 8 + 16 + 32 + 60 + 60
        assert_eq!(start.elapsed(), Duration::from_secs(183));
        assert_eq!(client.calls(), 9);
    }

    #[test]
    fn test_build_client_by_provider() {
        let mut config = crate::AppConfig::default().llm;
        config.api_key_env = "SNAPSIGHT_TEST_UNSET_KEY".to_string();
        assert_eq!(build_client(&config).unwrap().name(), "openai");

        config.provider = LlmProvider::Ollama;
        config.endpoint = "http://localhost:11434".to_string();
        assert_eq!(build_client(&config).unwrap().name(), "ollama");
    }
}
