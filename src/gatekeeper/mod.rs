//! Gatekeeper: decides whether a question can be answered as asked.
//!
//! An ambiguous question ends the run before any planning happens.

use crate::reasoning::{parse_json_response, ReasoningModel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub mod heuristic;
pub use heuristic::HeuristicGatekeeper;

pub const DEFAULT_CLARIFICATION: &str =
    "Could you clarify which company, metric and time period you are asking about?";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateDecision {
    pub clear: bool,
    pub clarification_message: Option<String>,
}

impl GateDecision {
    pub fn clear() -> Self {
        Self {
            clear: true,
            clarification_message: None,
        }
    }

    /// Ambiguous question; an empty message is replaced by the default one.
    pub fn ambiguous(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            DEFAULT_CLARIFICATION.to_string()
        } else {
            message
        };

        Self {
            clear: false,
            clarification_message: Some(message),
        }
    }
}

#[async_trait]
pub trait Gatekeeper: Send + Sync {
    /// Classify a question. Never fails: internal errors resolve to a decision.
    async fn assess(&self, question: &str) -> GateDecision;
}

#[derive(Debug, Deserialize)]
struct GateReply {
    clear: bool,
    #[serde(default)]
    clarification_message: Option<String>,
}

/// Gatekeeper backed by one reasoning-model call, falling back to keyword
/// heuristics when the model is unavailable or replies with garbage.
pub struct ModelGatekeeper {
    model: Arc<dyn ReasoningModel>,
    fallback: HeuristicGatekeeper,
}

impl ModelGatekeeper {
    pub fn new(model: Arc<dyn ReasoningModel>) -> Self {
        Self {
            model,
            fallback: HeuristicGatekeeper::default(),
        }
    }

    /// Replace the heuristic used when the model cannot decide.
    pub fn with_fallback(mut self, fallback: HeuristicGatekeeper) -> Self {
        self.fallback = fallback;
        self
    }

    fn build_prompt(question: &str) -> String {
        format!(
            r#"Decide whether the following question about company financial filings can be answered as asked.

QUESTION:
{}

The question is AMBIGUOUS if it:
- does not say which company or business segment it is about and none can be inferred
- asks about a metric without any time range where one is needed
- bundles several unrelated requests or is too broad to scope
- uses unclear terminology

If it is ambiguous, write one specific clarification question for the user.

Return ONLY JSON:
{{ "clear": true|false, "clarification_message": "<question or empty>" }}
"#,
            question
        )
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "clear": { "type": "boolean" },
                "clarification_message": { "type": "string" }
            },
            "required": ["clear"]
        })
    }
}

#[async_trait]
impl Gatekeeper for ModelGatekeeper {
    async fn assess(&self, question: &str) -> GateDecision {
        let prompt = Self::build_prompt(question);
        let schema = Self::schema();

        let reply = match self.model.complete(&prompt, Some(&schema)).await {
            Ok(raw) => parse_json_response::<GateReply>(&raw),
            Err(e) => Err(e),
        };

        match reply {
            Ok(reply) if reply.clear => GateDecision::clear(),
            Ok(reply) => {
                debug!("Gatekeeper: model flagged question as ambiguous");
                GateDecision::ambiguous(reply.clarification_message.unwrap_or_default())
            }
            Err(e) => {
                warn!(error = %e, "Gatekeeper model unavailable, using heuristics");
                self.fallback.assess(question).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::ScriptedModel;

    #[tokio::test]
    async fn test_model_clear() {
        let model = Arc::new(ScriptedModel::new().reply_json(json!({"clear": true})));
        let gate = ModelGatekeeper::new(model.clone());

        let decision = gate.assess("What was Microsoft's revenue in Q4 2023?").await;
        assert_eq!(decision, GateDecision::clear());
        assert!(model.prompts()[0].contains("Q4 2023"));
    }

    #[tokio::test]
    async fn test_model_ambiguous_with_empty_message_gets_default() {
        let model = Arc::new(
            ScriptedModel::new().reply_json(json!({"clear": false, "clarification_message": ""})),
        );
        let gate = ModelGatekeeper::new(model);

        let decision = gate.assess("Tell me things").await;
        assert!(!decision.clear);
        assert_eq!(
            decision.clarification_message.as_deref(),
            Some(DEFAULT_CLARIFICATION)
        );
    }

    #[tokio::test]
    async fn test_fallback_uses_company_scope() {
        let question = "how has revenue held up for microsoft";
        let unscoped = ModelGatekeeper::new(Arc::new(ScriptedModel::new().fail("timeout")));
        assert!(!unscoped.assess(question).await.clear);

        let scoped = ModelGatekeeper::new(Arc::new(ScriptedModel::new().fail("timeout")))
            .with_fallback(HeuristicGatekeeper::with_entities(vec![
                "MSFT".to_string(),
                "Microsoft".to_string(),
            ]));
        assert!(scoped.assess(question).await.clear);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_heuristics() {
        let model = Arc::new(ScriptedModel::new().fail("timeout").reply("not json"));
        let gate = ModelGatekeeper::new(model);

        assert!(!gate.assess("What about growth?").await.clear);
        assert!(
            gate.assess("How did Microsoft's cloud revenue change in fiscal 2023?")
                .await
                .clear
        );
    }
}
