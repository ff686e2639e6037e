// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! OpenAI-compatible chat completions client (Groq, OpenAI, LM Studio, ...)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{CompletionClient, CompletionRequest};
use crate::{Result, SnapSightError};

pub struct OpenAiCompatClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = endpoint
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions")
            .to_string();
        Ok(Self { client, endpoint, api_key })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| SnapSightError::MissingApiKey(self.endpoint.clone()))
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self.api_key()?;

        // The whole prompt goes out as one user message; no role structure.
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: vec![ChatMessage { role: "user", content: &request.prompt }],
            temperature: request.temperature,
        };

        debug!("Sending chat completion: model={}", request.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SnapSightError::Completion(format!(
                "API returned status {}: {}",
                status,
                text.trim()
            )));
        }

        let result: ChatCompletionResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SnapSightError::Completion("No choices in response".to_string()))
    }

    async fn health_check(&self) -> Result<()> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/models", self.endpoint))
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                SnapSightError::Completion(format!("Cannot connect to {}: {}", self.endpoint, e))
            })?;

        if !response.status().is_success() {
            return Err(SnapSightError::Completion(format!(
                "{} returned status {}",
                self.endpoint,
                response.status()
            )));
        }
        Ok(())
    }
}
