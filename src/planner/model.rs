//! Reasoning-model planner
//!
//! Asks the model for a structured step list and cleans it up: terminal
//! markers in the reply are ignored, steps that repeat a rejected
//! (tool, query) pair are dropped, and the terminal marker is appended.

use crate::error::OrchestrationError;
use crate::models::{Plan, PlanStep};
use crate::planner::{Planner, PlanningContext};
use crate::reasoning::{parse_json_response, ReasoningModel};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest rendering of a prior output included in a replanning prompt
const EVIDENCE_PREVIEW_CHARS: usize = 400;

pub struct ModelPlanner {
    model: Arc<dyn ReasoningModel>,
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    #[serde(default)]
    steps: Vec<StepReply>,
}

#[derive(Debug, Deserialize)]
struct StepReply {
    #[serde(default)]
    step_number: u32,
    tool_name: String,
    #[serde(default)]
    query: String,
}

impl ModelPlanner {
    pub fn new(model: Arc<dyn ReasoningModel>) -> Self {
        Self { model }
    }

    fn build_prompt(ctx: &PlanningContext<'_>) -> String {
        let tool_lines: Vec<String> = ctx
            .tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect();

        let base_prompt = format!(
            r#"You are the planning engine of a financial filings analyst.

Create an execution plan that answers the question with the available tools.

QUESTION:
{}

Available tools:
{}

Rules:
- Use only the tools listed above
- Each step gets one focused sub-query for its tool
- Use as few steps as the question needs
- Return ONLY valid JSON
- JSON format:

{{
  "steps": [
    {{ "step_number": 1, "tool_name": "<tool>", "query": "<sub-query>" }}
  ]
}}
"#,
            ctx.question,
            tool_lines.join("\n"),
        );

        if !ctx.is_replan() {
            return base_prompt;
        }

        let reasoning = ctx
            .prior_verification
            .map(|v| v.reasoning.as_str())
            .unwrap_or_default();

        let rejected: Vec<String> = ctx
            .rejected_steps
            .iter()
            .map(|s| format!("- {} with query \"{}\"", s.tool_name, s.query))
            .collect();

        let evidence: Vec<String> = ctx
            .prior_outputs
            .iter()
            .map(|o| {
                format!(
                    "- {} (\"{}\"): {}",
                    o.tool_name,
                    o.query,
                    preview(&o.raw_output, EVIDENCE_PREVIEW_CHARS)
                )
            })
            .collect();

        format!(
            "Previous plan failed verification:\n{}\n\nThese steps were rejected and must NOT be repeated as-is:\n{}\n\nEvidence gathered so far:\n{}\n\nGenerate a DIFFERENT improved plan: use another tool or a refined sub-query.\n\n{}",
            reasoning,
            rejected.join("\n"),
            if evidence.is_empty() { "- none".to_string() } else { evidence.join("\n") },
            base_prompt
        )
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "step_number": { "type": "integer" },
                            "tool_name": { "type": "string" },
                            "query": { "type": "string" }
                        },
                        "required": ["step_number", "tool_name", "query"]
                    }
                }
            },
            "required": ["steps"]
        })
    }
}

#[async_trait]
impl Planner for ModelPlanner {
    async fn create_plan(&self, ctx: &PlanningContext<'_>) -> Result<Plan> {
        let prompt = Self::build_prompt(ctx);
        let schema = Self::schema();

        let raw = self
            .model
            .complete(&prompt, Some(&schema))
            .await
            .map_err(|e| OrchestrationError::PlanningError(format!("planner model call failed: {}", e)))?;

        let plan = parse_plan_response(&raw, ctx)?;

        debug!(
            plan_id = ?plan.plan_id,
            step_count = plan.tool_step_count(),
            replan = ctx.is_replan(),
            "Plan created"
        );

        Ok(plan)
    }
}

/// Parse plan response from the model
fn parse_plan_response(response: &str, ctx: &PlanningContext<'_>) -> Result<Plan> {
    let reply: PlanReply = parse_json_response(response)
        .map_err(|e| OrchestrationError::PlanningError(e.to_string()))?;

    let mut replies = reply.steps;
    replies.sort_by_key(|s| s.step_number);

    let mut steps = Vec::with_capacity(replies.len());
    for reply in replies {
        let step = PlanStep::new(reply.tool_name.trim(), reply.query.trim());

        if step.is_terminal() {
            continue;
        }
        if step.tool_name.is_empty() || step.query.is_empty() {
            return Err(OrchestrationError::PlanningError(
                "plan step missing tool_name or query".to_string(),
            ));
        }
        if ctx.is_rejected(&step) {
            warn!(
                tool_name = %step.tool_name,
                query = %step.query,
                "Dropping step that repeats a rejected one"
            );
            continue;
        }

        steps.push(step);
    }

    if steps.is_empty() {
        return Err(OrchestrationError::PlanningError(
            "model returned no usable plan steps".to_string(),
        ));
    }

    Ok(Plan::from_steps(steps))
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VerificationResult;
    use crate::reasoning::ScriptedModel;
    use crate::tools::ToolInfo;

    fn tools() -> Vec<ToolInfo> {
        vec![
            ToolInfo {
                name: "analyst_sql_tool".to_string(),
                description: "figures".to_string(),
            },
            ToolInfo {
                name: "librarian_tool".to_string(),
                description: "filings".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_plan_from_model_reply() {
        let model = Arc::new(ScriptedModel::new().reply(
            r#"```json
{"steps": [
  {"step_number": 2, "tool_name": "librarian_tool", "query": "Revenue commentary Q4 2023"},
  {"step_number": 1, "tool_name": "analyst_sql_tool", "query": "Revenue in Q4 2023"},
  {"step_number": 3, "tool_name": "FINISH", "query": ""}
]}
```"#,
        ));
        let planner = ModelPlanner::new(model);
        let tools = tools();

        let plan = planner
            .create_plan(&PlanningContext::initial("Revenue in Q4 2023?", &tools))
            .await
            .unwrap();

        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].tool_name, "analyst_sql_tool");
        assert_eq!(plan.steps[1].tool_name, "librarian_tool");
        assert!(plan.steps[2].is_terminal());
        assert!(plan.validate(20, &[]).is_ok());
    }

    #[tokio::test]
    async fn test_empty_or_malformed_reply_is_planning_error() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply_json(json!({"steps": []}))
                .reply("I think you should look at revenue")
                .fail("timeout"),
        );
        let planner = ModelPlanner::new(model);
        let tools = tools();
        let ctx = PlanningContext::initial("Revenue in Q4 2023?", &tools);

        for _ in 0..3 {
            let err = planner.create_plan(&ctx).await.unwrap_err();
            assert!(matches!(err, OrchestrationError::PlanningError(_)));
        }
    }

    #[tokio::test]
    async fn test_replan_prompt_carries_reasoning_and_drops_repeats() {
        let model = Arc::new(ScriptedModel::new().reply_json(json!({"steps": [
            {"step_number": 1, "tool_name": "analyst_sql_tool", "query": "Revenue in Q4 2023"},
            {"step_number": 2, "tool_name": "librarian_tool", "query": "Q4 2023 revenue in the 10-Q"}
        ]})));
        let planner = ModelPlanner::new(model.clone());
        let tools = tools();
        let rejected = vec![PlanStep::new("analyst_sql_tool", "Revenue in Q4 2023")];
        let verification = VerificationResult::scored(1, 3, "SQL tool returned an empty table");

        let ctx = PlanningContext {
            question: "Revenue in Q4 2023?",
            prior_outputs: &[],
            prior_verification: Some(&verification),
            rejected_steps: &rejected,
            tools: &tools,
        };
        let plan = planner.create_plan(&ctx).await.unwrap();

        assert_eq!(plan.tool_step_count(), 1);
        assert_eq!(plan.steps[0].tool_name, "librarian_tool");
        assert!(plan.validate(20, &rejected).is_ok());

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("SQL tool returned an empty table"));
        assert!(prompt.contains("must NOT be repeated"));
    }

    #[tokio::test]
    async fn test_only_repeats_is_planning_error() {
        let model = Arc::new(ScriptedModel::new().reply_json(json!({"steps": [
            {"step_number": 1, "tool_name": "analyst_sql_tool", "query": "revenue in q4 2023"}
        ]})));
        let planner = ModelPlanner::new(model);
        let tools = tools();
        let rejected = vec![PlanStep::new("analyst_sql_tool", "Revenue in Q4 2023")];
        let verification = VerificationResult::failed("no data");

        let ctx = PlanningContext {
            question: "Revenue in Q4 2023?",
            prior_outputs: &[],
            prior_verification: Some(&verification),
            rejected_steps: &rejected,
            tools: &tools,
        };
        assert!(planner.create_plan(&ctx).await.is_err());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("abc", 5), "abc");
        assert_eq!(preview("€€€€", 2), "€€...");
    }
}
