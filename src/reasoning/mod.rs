//! Reasoning-model interface shared by the gatekeeper, planner, auditor and
//! synthesizer.
//!
//! Callers must convert every failure into their own semantics; nothing
//! returned from here is allowed to escape a workflow run.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiClient;

/// Text completion against a language model, optionally constrained to a
/// JSON response schema.
#[async_trait]
pub trait ReasoningModel: Send + Sync {
    async fn complete(&self, prompt: &str, response_schema: Option<&Value>) -> Result<String>;
}

/// Parse a model reply as JSON, tolerating a surrounding ```json fence.
pub fn parse_json_response<T: DeserializeOwned>(response: &str) -> Result<T> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| {
        OrchestrationError::LlmError(format!(
            "Failed to parse model response: {} | raw={}",
            e, response
        ))
    })
}

/// Deterministic model that replays queued replies in order.
///
/// Used in tests and by evaluation harnesses that need repeatable runs.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn reply_json(self, value: Value) -> Self {
        self.push(Ok(value.to_string()))
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()))
    }

    fn push(self, item: std::result::Result<String, String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(item);
        }
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ReasoningModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _response_schema: Option<&Value>) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| OrchestrationError::LlmError("scripted model poisoned".to_string()))?
            .pop_front();

        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(OrchestrationError::LlmError(message)),
            None => Err(OrchestrationError::LlmError(
                "scripted model has no replies left".to_string(),
            )),
        }
    }
}
