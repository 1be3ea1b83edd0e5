//! Synthesizer: turns gathered evidence into the final answer.
//!
//! The degraded path used on abort always yields a non-empty response that
//! starts with [`DEGRADED_NOTICE`], so it can never be mistaken for a normal
//! synthesized answer.

use crate::error::OrchestrationError;
use crate::models::StepOutput;
use crate::reasoning::ReasoningModel;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub const DEGRADED_NOTICE: &str = "[DEGRADED]";

/// Longest excerpt of a single output in the local digest
const DIGEST_EXCERPT_CHARS: usize = 300;

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, question: &str, outputs: &[StepOutput]) -> Result<String>;

    /// Best-effort answer after the workflow gave up. Never empty.
    async fn degraded(&self, question: &str, outputs: &[StepOutput], reason: &str) -> String;
}

pub struct ModelSynthesizer {
    model: Arc<dyn ReasoningModel>,
}

impl ModelSynthesizer {
    pub fn new(model: Arc<dyn ReasoningModel>) -> Self {
        Self { model }
    }

    fn build_prompt(question: &str, outputs: &[StepOutput], caveat: Option<&str>) -> String {
        let gathered: Vec<String> = outputs
            .iter()
            .map(|o| format!("Tool: {}\nQuery: {}\nResult: {}\n", o.tool_name, o.query, o.raw_output))
            .collect();

        let caveat = caveat
            .map(|c| {
                format!(
                    "\nIMPORTANT: the analysis could not be completed ({}). Some of the information below failed verification. Answer only what the evidence supports and state clearly what remains unverified.\n",
                    c
                )
            })
            .unwrap_or_default();

        format!(
            r#"Synthesize a response to the user's question from the information gathered by the specialist tools.
{}
Original question: {}

Information gathered:
{}

Write a well-structured answer that:
1. Directly addresses the question
2. Integrates the results of all tools into one coherent answer
3. Attributes figures and claims to the tool they came from
4. Keeps a professional, analytical tone
"#,
            caveat,
            question,
            gathered.join("\n")
        )
    }
}

#[async_trait]
impl Synthesizer for ModelSynthesizer {
    async fn synthesize(&self, question: &str, outputs: &[StepOutput]) -> Result<String> {
        if outputs.is_empty() {
            return Err(OrchestrationError::LlmError(
                "nothing to synthesize: no step outputs".to_string(),
            ));
        }

        let prompt = Self::build_prompt(question, outputs, None);
        let answer = self.model.complete(&prompt, None).await?;

        if answer.trim().is_empty() {
            return Err(OrchestrationError::LlmError(
                "synthesizer returned an empty answer".to_string(),
            ));
        }

        Ok(answer.trim().to_string())
    }

    async fn degraded(&self, question: &str, outputs: &[StepOutput], reason: &str) -> String {
        let usable: Vec<StepOutput> = outputs.iter().filter(|o| !o.failed).cloned().collect();

        if !usable.is_empty() {
            let prompt = Self::build_prompt(question, &usable, Some(reason));
            match self.model.complete(&prompt, None).await {
                Ok(answer) if !answer.trim().is_empty() => {
                    return format!("{} {}\n\n{}", DEGRADED_NOTICE, degraded_headline(reason), answer.trim());
                }
                Ok(_) => warn!("Degraded synthesis returned nothing, using local digest"),
                Err(e) => warn!(error = %e, "Degraded synthesis failed, using local digest"),
            }
        }

        evidence_digest(outputs, reason)
    }
}

fn degraded_headline(reason: &str) -> String {
    format!("This answer could not be fully verified: {}.", reason)
}

/// Plain-text answer assembled without a model call
pub fn evidence_digest(outputs: &[StepOutput], reason: &str) -> String {
    let mut out = format!("{} {}", DEGRADED_NOTICE, degraded_headline(reason));

    if outputs.is_empty() {
        out.push_str("\n\nNo evidence was gathered before the analysis stopped.");
        return out;
    }

    out.push_str("\n\nEvidence gathered before the analysis stopped:");
    push_evidence_lines(&mut out, outputs);
    out
}

fn push_evidence_lines(out: &mut String, outputs: &[StepOutput]) {
    for o in outputs {
        let excerpt: String = o.raw_output.chars().take(DIGEST_EXCERPT_CHARS).collect();
        let ellipsis = if o.raw_output.chars().count() > DIGEST_EXCERPT_CHARS { "..." } else { "" };
        let flag = if o.failed { " (failed)" } else { "" };
        out.push_str(&format!(
            "\n- {}{} for \"{}\": {}{}",
            o.tool_name, flag, o.query, excerpt, ellipsis
        ));
    }
}

/// Synthesizer without a model: lists the verified tool outputs, attributed
/// to their tools.
pub struct DigestSynthesizer;

#[async_trait]
impl Synthesizer for DigestSynthesizer {
    async fn synthesize(&self, question: &str, outputs: &[StepOutput]) -> Result<String> {
        if outputs.is_empty() {
            return Err(OrchestrationError::ToolError(
                "nothing to synthesize: no step outputs".to_string(),
            ));
        }

        let mut out = format!("Findings for \"{}\":", question);
        push_evidence_lines(&mut out, outputs);
        Ok(out)
    }

    async fn degraded(&self, _question: &str, outputs: &[StepOutput], reason: &str) -> String {
        evidence_digest(outputs, reason)
    }
}
