//! Planner trait and implementations
//!
//! A planner turns a question (plus, on replanning, the evidence and audit
//! verdict that sank the previous plan) into an ordered list of tool steps
//! ending in the terminal marker.

use crate::models::{Plan, PlanStep, StepOutput, VerificationResult};
use crate::tools::ToolInfo;
use crate::Result;
use async_trait::async_trait;

pub mod keyword;
pub mod model;
pub use keyword::KeywordPlanner;
pub use model::ModelPlanner;

/// Everything a planning pass may look at
#[derive(Debug, Clone, Copy)]
pub struct PlanningContext<'a> {
    pub question: &'a str,
    pub prior_outputs: &'a [StepOutput],
    pub prior_verification: Option<&'a VerificationResult>,
    /// Steps whose outputs failed an audit; these must not come back verbatim.
    pub rejected_steps: &'a [PlanStep],
    pub tools: &'a [ToolInfo],
}

impl<'a> PlanningContext<'a> {
    pub fn initial(question: &'a str, tools: &'a [ToolInfo]) -> Self {
        Self {
            question,
            prior_outputs: &[],
            prior_verification: None,
            rejected_steps: &[],
            tools,
        }
    }

    pub fn is_replan(&self) -> bool {
        self.prior_verification.map(|v| !v.passed).unwrap_or(false)
    }

    pub fn is_rejected(&self, step: &PlanStep) -> bool {
        self.rejected_steps.iter().any(|r| r.repeats(step))
    }
}

/// Trait for plan generation
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce a fresh plan. Fails with `PlanningError`/`InvalidPlan` when no
    /// usable plan can be built.
    async fn create_plan(&self, ctx: &PlanningContext<'_>) -> Result<Plan>;
}
