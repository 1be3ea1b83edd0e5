//! Deterministic intent-routing planner
//!
//! Keeps the system usable without a reasoning model: the question is routed
//! to a single specialist by keywords. On replanning, the next preferred
//! specialist that has not been rejected for this question is chosen.

use crate::error::OrchestrationError;
use crate::models::{Plan, PlanStep};
use crate::planner::{Planner, PlanningContext};
use crate::tools::{ANALYST_SQL_TOOL, ANALYST_TREND_TOOL, LIBRARIAN_TOOL, SCOUT_TOOL};
use crate::Result;
use async_trait::async_trait;
use tracing::debug;

const TREND_KEYWORDS: &[&str] = &[
    "trend", "growth", "grow", "over the last", "over time", "yoy", "qoq",
    "year-over-year", "quarter-over-quarter", "trajectory", "compare",
];

const FIGURE_KEYWORDS: &[&str] = &[
    "how much", "what was", "what were", "revenue in", "income in", "eps",
    "net income", "operating income", "margin in", "total",
];

const NEWS_KEYWORDS: &[&str] = &[
    "news", "recent", "latest", "today", "this week", "announce", "market update",
];

pub struct KeywordPlanner;

impl KeywordPlanner {
    /// Specialists in order of preference for this question.
    pub fn preference(question: &str) -> Vec<&'static str> {
        let lowered = question.to_lowercase();
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

        let primary = if has_any(TREND_KEYWORDS) {
            ANALYST_TREND_TOOL
        } else if has_any(NEWS_KEYWORDS) {
            SCOUT_TOOL
        } else if has_any(FIGURE_KEYWORDS) {
            ANALYST_SQL_TOOL
        } else {
            LIBRARIAN_TOOL
        };

        let mut order = vec![primary];
        for fallback in [LIBRARIAN_TOOL, ANALYST_SQL_TOOL, ANALYST_TREND_TOOL, SCOUT_TOOL] {
            if !order.contains(&fallback) {
                order.push(fallback);
            }
        }
        order
    }
}

#[async_trait]
impl Planner for KeywordPlanner {
    async fn create_plan(&self, ctx: &PlanningContext<'_>) -> Result<Plan> {
        let registered = |name: &str| ctx.tools.is_empty() || ctx.tools.iter().any(|t| t.name == name);

        let step = Self::preference(ctx.question)
            .into_iter()
            .filter(|name| registered(*name))
            .map(|name| PlanStep::new(name, ctx.question.trim()))
            .find(|step| !ctx.is_rejected(step))
            .ok_or_else(|| {
                OrchestrationError::PlanningError(
                    "every specialist has already been rejected for this question".to_string(),
                )
            })?;

        debug!(tool_name = %step.tool_name, "Keyword planner selected tool");

        Ok(Plan::from_steps(vec![step]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VerificationResult;

    #[test]
    fn test_preference_by_intent() {
        assert_eq!(
            KeywordPlanner::preference("Analyze revenue growth over the last 8 quarters")[0],
            ANALYST_TREND_TOOL
        );
        assert_eq!(
            KeywordPlanner::preference("What was revenue in Q4 2023?")[0],
            ANALYST_SQL_TOOL
        );
        assert_eq!(
            KeywordPlanner::preference("Latest news on the Activision deal")[0],
            SCOUT_TOOL
        );
        assert_eq!(
            KeywordPlanner::preference("Main risks in the annual report")[0],
            LIBRARIAN_TOOL
        );
        assert_eq!(KeywordPlanner::preference("anything").len(), 4);
    }

    #[tokio::test]
    async fn test_replan_moves_to_next_specialist() {
        let question = "What was revenue in Q4 2023?";
        let rejected = vec![PlanStep::new(ANALYST_SQL_TOOL, question)];
        let verification = VerificationResult::failed("empty result");

        let ctx = PlanningContext {
            question,
            prior_outputs: &[],
            prior_verification: Some(&verification),
            rejected_steps: &rejected,
            tools: &[],
        };

        let plan = KeywordPlanner.create_plan(&ctx).await.unwrap();
        assert_eq!(plan.steps[0].tool_name, LIBRARIAN_TOOL);
        assert!(plan.validate(20, &rejected).is_ok());
    }

    #[tokio::test]
    async fn test_exhausted_specialists_is_planning_error() {
        let question = "Main risks in the annual report";
        let rejected: Vec<PlanStep> = [LIBRARIAN_TOOL, ANALYST_SQL_TOOL, ANALYST_TREND_TOOL, SCOUT_TOOL]
            .iter()
            .map(|t| PlanStep::new(*t, question))
            .collect();

        let ctx = PlanningContext {
            question,
            prior_outputs: &[],
            prior_verification: None,
            rejected_steps: &rejected,
            tools: &[],
        };

        assert!(KeywordPlanner.create_plan(&ctx).await.is_err());
    }
}
