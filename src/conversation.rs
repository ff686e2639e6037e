// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Follow-up question history for the active capture

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::insight::Answerer;
use crate::{Result, SnapSightError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

pub type ConversationHistory = Vec<ConversationTurn>;

/// The `(raw_text, summary)` pair a conversation is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContext {
    pub source: String,
    /// BLAKE3 of text and summary; identifies the document across re-analysis
    pub fingerprint: String,
    pub raw_text: String,
    pub summary: String,
}

impl DocumentContext {
    pub fn new(source: impl Into<String>, raw_text: impl Into<String>, summary: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let summary = summary.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(raw_text.as_bytes());
        hasher.update(&[0]);
        hasher.update(summary.as_bytes());
        Self {
            source: source.into(),
            fingerprint: hasher.finalize().to_hex().to_string(),
            raw_text,
            summary,
        }
    }
}

/// Record the question, ask, and record the answer.
///
/// The user turn is appended before the service is called, so it stays in
/// the returned history even when answering fails.
pub async fn ask(
    mut history: ConversationHistory,
    context: &DocumentContext,
    answerer: &Answerer,
    question: &str,
) -> (ConversationHistory, Result<String>) {
    history.push(ConversationTurn::user(question));
    let result = answerer.answer(context, question).await;
    if let Ok(ref answer) = result {
        history.push(ConversationTurn::assistant(answer.clone()));
    }
    (history, result)
}

/// One active document plus its question/answer history.
///
/// Opening a different document clears the history.
#[derive(Debug, Default)]
pub struct Conversation {
    active: Option<DocumentContext>,
    history: ConversationHistory,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `context` the active document. Returns true if history was reset.
    pub fn open(&mut self, context: DocumentContext) -> bool {
        let switched = self
            .active
            .as_ref()
            .map_or(true, |current| current.fingerprint != context.fingerprint);

        if switched {
            if !self.history.is_empty() {
                info!("Switched document to {}; clearing {} turns", context.source, self.history.len());
            }
            self.history.clear();
        } else {
            debug!("Re-opened same document {}", context.source);
        }
        self.active = Some(context);
        switched
    }

    pub fn active(&self) -> Option<&DocumentContext> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub async fn ask(&mut self, answerer: &Answerer, question: &str) -> Result<String> {
        let context = self.active.as_ref().ok_or(SnapSightError::NoActiveDocument)?;
        let history = std::mem::take(&mut self.history);
        let (history, result) = ask(history, context, answerer, question).await;
        self.history = history;
        result
    }
}
