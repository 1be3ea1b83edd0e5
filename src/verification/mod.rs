//! Auditor: scores the latest tool output before the router acts on it.
//!
//! Deterministic rules run first and may settle the verdict without a model
//! call (a failed tool call or an empty output cannot pass). Everything else
//! is scored 1-5 by the reasoning model; `passed` means the score reached
//! the acceptance threshold. `RuleAuditor` runs the rules alone, for
//! deployments without a model.

use crate::models::{StepOutput, VerificationResult};
use crate::reasoning::{parse_json_response, ReasoningModel};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait Auditor: Send + Sync {
    /// Score one output. Never fails: errors become a failed result.
    async fn audit(&self, question: &str, output: &StepOutput) -> VerificationResult;
}

/// Trait for deterministic audit rules
pub trait AuditRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Some` settles the verdict; `None` defers to the next rule.
    fn check(&self, question: &str, output: &StepOutput) -> Option<VerificationResult>;
}

/// Rule: a failed tool call is never acceptable evidence
pub struct ToolFailureRule;

impl AuditRule for ToolFailureRule {
    fn name(&self) -> &'static str {
        "tool_failure"
    }

    fn check(&self, _question: &str, output: &StepOutput) -> Option<VerificationResult> {
        output.failed.then(|| {
            VerificationResult::failed(format!(
                "{} failed for \"{}\": {}",
                output.tool_name, output.query, output.raw_output
            ))
        })
    }
}

/// Rule: blank output answers nothing
pub struct EmptyOutputRule;

impl AuditRule for EmptyOutputRule {
    fn name(&self) -> &'static str {
        "empty_output"
    }

    fn check(&self, _question: &str, output: &StepOutput) -> Option<VerificationResult> {
        output.raw_output.trim().is_empty().then(|| {
            VerificationResult::failed(format!(
                "{} returned no content for \"{}\"",
                output.tool_name, output.query
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    confidence: i64,
    #[serde(default)]
    reasoning: String,
}

/// Rules first, then a model score against the threshold
pub struct ModelAuditor {
    model: Arc<dyn ReasoningModel>,
    threshold: u8,
    rules: Vec<Box<dyn AuditRule>>,
}

impl ModelAuditor {
    pub fn new(model: Arc<dyn ReasoningModel>, threshold: u8) -> Self {
        Self {
            model,
            threshold,
            rules: Vec::new(),
        }
    }

    /// Auditor with the standard rules installed
    pub fn with_default_rules(model: Arc<dyn ReasoningModel>, threshold: u8) -> Self {
        let mut auditor = Self::new(model, threshold);
        auditor.add_rule(Box::new(ToolFailureRule));
        auditor.add_rule(Box::new(EmptyOutputRule));
        auditor
    }

    pub fn add_rule(&mut self, rule: Box<dyn AuditRule>) {
        self.rules.push(rule);
    }

    fn build_prompt(question: &str, output: &StepOutput) -> String {
        format!(
            r#"Verify the quality of the following tool execution.

Original question: {}
Tool: {}
Sub-query: {}
Result:
{}

Evaluate:
1. Is the result relevant to the original question?
2. Is the result internally consistent?
3. Does the result actually answer the sub-query?

Give a confidence score from 1 (useless) to 5 (fully answers it).

Return ONLY JSON:
{{ "confidence": <1-5>, "reasoning": "<one or two sentences>" }}
"#,
            question, output.tool_name, output.query, output.raw_output
        )
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "confidence": { "type": "integer" },
                "reasoning": { "type": "string" }
            },
            "required": ["confidence", "reasoning"]
        })
    }
}

#[async_trait]
impl Auditor for ModelAuditor {
    async fn audit(&self, question: &str, output: &StepOutput) -> VerificationResult {
        for rule in &self.rules {
            if let Some(result) = rule.check(question, output) {
                info!(
                    rule = rule.name(),
                    tool_name = %output.tool_name,
                    "Audit settled by rule"
                );
                return result;
            }
        }

        let prompt = Self::build_prompt(question, output);
        let schema = Self::schema();

        let reply = match self.model.complete(&prompt, Some(&schema)).await {
            Ok(raw) => parse_json_response::<ScoreReply>(&raw),
            Err(e) => Err(e),
        };

        match reply {
            Ok(reply) => {
                let result = VerificationResult::scored(reply.confidence, self.threshold, reply.reasoning);
                info!(
                    tool_name = %output.tool_name,
                    confidence = result.confidence,
                    passed = result.passed,
                    "Audit completed"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Auditor model unavailable, failing the output");
                VerificationResult::failed(format!("auditor could not score the output: {}", e))
            }
        }
    }
}

/// Rules only: an output no rule rejects passes at the threshold
pub struct RuleAuditor {
    threshold: u8,
    rules: Vec<Box<dyn AuditRule>>,
}

impl RuleAuditor {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            rules: Vec::new(),
        }
    }

    pub fn with_default_rules(threshold: u8) -> Self {
        let mut auditor = Self::new(threshold);
        auditor.add_rule(Box::new(ToolFailureRule));
        auditor.add_rule(Box::new(EmptyOutputRule));
        auditor
    }

    pub fn add_rule(&mut self, rule: Box<dyn AuditRule>) {
        self.rules.push(rule);
    }
}

#[async_trait]
impl Auditor for RuleAuditor {
    async fn audit(&self, question: &str, output: &StepOutput) -> VerificationResult {
        for rule in &self.rules {
            if let Some(result) = rule.check(question, output) {
                info!(
                    rule = rule.name(),
                    tool_name = %output.tool_name,
                    "Audit settled by rule"
                );
                return result;
            }
        }

        VerificationResult::scored(
            self.threshold as i64,
            self.threshold,
            format!("{} passed {} deterministic check(s)", output.tool_name, self.rules.len()),
        )
    }
}
