// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Summaries and follow-up answers over extracted text
//!
//! [`Summarizer`] and [`Answerer`] are separate capabilities that share one
//! [`CompletionClient`]. Both flatten their input into a single prompt string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::conversation::DocumentContext;
use crate::llm::{complete_with_retry, CompletionClient, CompletionRequest};
use crate::Result;

/// Summary used when OCR produced nothing worth sending to the model
pub const EMPTY_TEXT_SUMMARY: &str = "No readable text found in screenshot.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub summary_text: String,
    pub generated_at: DateTime<Utc>,
}

impl Insight {
    fn now(summary_text: String) -> Self {
        Self { summary_text, generated_at: Utc::now() }
    }
}

/// Model parameters shared by both capabilities
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: f32,
    pub retries: u32,
}

impl From<&LlmConfig> for CompletionSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            retries: config.retries,
        }
    }
}

impl CompletionSettings {
    fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            prompt,
            temperature: self.temperature,
        }
    }
}

pub fn summary_prompt(text: &str) -> String {
    format!(
        "You are reading text that was extracted from a screenshot with OCR.\n\
         \n\
         Write a faithful summary of it:\n\
         - Keep the key distinctions, contrasts and examples the text makes\n\
         - Do not simplify away nuance and do not add anything that is not in the text\n\
         - If the text raises social implications, mention them\n\
         - Use 3 to 4 sentences at most\n\
         \n\
         Text:\n{text}\n"
    )
}

pub fn answer_prompt(raw_text: &str, summary: &str, question: &str) -> String {
    format!(
        "Answer the user's question using only the screenshot text and summary below. \
         If the answer is not in the text, say so.\n\
         \n\
         Text: {raw_text}\nSummary: {summary}\nUser Question: {question}\n"
    )
}

/// Condenses extracted text into an [`Insight`]
#[derive(Clone)]
pub struct Summarizer {
    client: Arc<dyn CompletionClient>,
    settings: CompletionSettings,
}

impl Summarizer {
    pub fn new(client: Arc<dyn CompletionClient>, settings: CompletionSettings) -> Self {
        Self { client, settings }
    }

    /// Summarize `text`.
    ///
    /// Blank input short-circuits to [`EMPTY_TEXT_SUMMARY`] without calling
    /// the service. Otherwise the model's reply is returned verbatim.
    pub async fn summarize(&self, text: &str) -> Result<Insight> {
        if text.trim().is_empty() {
            debug!("Empty OCR text, skipping completion call");
            return Ok(Insight::now(EMPTY_TEXT_SUMMARY.to_string()));
        }

        let request = self.settings.request(summary_prompt(text));
        let summary = complete_with_retry(self.client.as_ref(), &request, self.settings.retries).await?;
        info!("Generated summary ({} chars) with {}", summary.len(), self.client.name());
        Ok(Insight::now(summary))
    }

    /// Answering capability over the same transport
    pub fn answerer(&self) -> Answerer {
        Answerer::new(self.client.clone(), self.settings.clone())
    }

    pub fn client(&self) -> Arc<dyn CompletionClient> {
        self.client.clone()
    }
}

/// Answers free-text questions about one document
#[derive(Clone)]
pub struct Answerer {
    client: Arc<dyn CompletionClient>,
    settings: CompletionSettings,
}

impl Answerer {
    pub fn new(client: Arc<dyn CompletionClient>, settings: CompletionSettings) -> Self {
        Self { client, settings }
    }

    pub async fn answer(&self, context: &DocumentContext, question: &str) -> Result<String> {
        let prompt = answer_prompt(&context.raw_text, &context.summary, question);
        let request = self.settings.request(prompt);
        complete_with_retry(self.client.as_ref(), &request, self.settings.retries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::ScriptedClient;
    use crate::SnapSightError;

    fn settings() -> CompletionSettings {
        CompletionSettings {
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.3,
            retries: 0,
        }
    }

    #[tokio::test]
    async fn test_blank_text_returns_sentinel_without_calling_service() {
        let client = Arc::new(ScriptedClient::always("should not appear"));
        let summarizer = Summarizer::new(client.clone(), settings());

        for text in ["", "   ", "\n\t "] {
            let insight = summarizer.summarize(text).await.unwrap();
            assert_eq!(insight.summary_text, "No readable text found in screenshot.");
        }
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_summary_returned_verbatim() {
        let client = Arc::new(ScriptedClient::always("  Books differ from periodicals.  "));
        let summarizer = Summarizer::new(client.clone(), settings());

        let insight = summarizer.summarize("Books are bound; periodicals are serial.").await.unwrap();
        assert_eq!(insight.summary_text, "  Books differ from periodicals.  ");

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].model, "llama-3.1-8b-instant");
        assert!((prompts[0].temperature - 0.3).abs() < f32::EPSILON);
        assert!(prompts[0].prompt.contains("Books are bound; periodicals are serial."));
        assert!(prompts[0].prompt.contains("3 to 4 sentences"));
    }

    #[tokio::test]
    async fn test_service_failure_propagates() {
        let client = Arc::new(ScriptedClient::new(vec![Err(SnapSightError::Completion("401".to_string()))]));
        let summarizer = Summarizer::new(client, settings());
        assert!(summarizer.summarize("Some real text here").await.is_err());
    }

    #[tokio::test]
    async fn test_answer_flattens_context_into_one_prompt() {
        let client = Arc::new(ScriptedClient::always("March 3rd"));
        let answerer = Summarizer::new(client.clone(), settings()).answerer();
        let context = DocumentContext::new("shot.png", "Deadline March 3rd", "A deadline is set.");

        let answer = answerer.answer(&context, "When is the deadline?").await.unwrap();
        assert_eq!(answer, "March 3rd");

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].prompt.contains(
            "Text: Deadline March 3rd\nSummary: A deadline is set.\nUser Question: When is the deadline?"
        ));
    }
}
