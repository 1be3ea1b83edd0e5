//! Tool executor: runs the next pending plan step
//!
//! Tool failures never escape from here. They are recorded as step outputs
//! carrying the `[TOOL_ERROR]` marker so the auditor sees them as evidence.

use crate::models::{StepOutput, TOOL_ERROR_MARKER};
use crate::state::WorkflowState;
use crate::tools::ToolRegistry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// A step ran and its output was appended to the state.
    Recorded,
    /// The cursor sits on the terminal marker (or past the end).
    PlanExhausted,
}

/// Executes plan steps one at a time against the tool registry
pub struct ToolExecutor {
    tool_registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(tool_registry: Arc<ToolRegistry>) -> Self {
        Self { tool_registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    pub async fn execute_next(&self, state: &mut WorkflowState) -> ExecutionOutcome {
        let index = state.current_step_index;

        let step = match state.plan.steps.get(index) {
            Some(step) if !step.is_terminal() => step.clone(),
            _ => {
                debug!(step_index = index, "No tool step left to execute");
                return ExecutionOutcome::PlanExhausted;
            }
        };

        debug!(
            step_index = index,
            tool_name = %step.tool_name,
            "Processing step"
        );

        let start = Instant::now();
        let (raw_output, failed) = match self.tool_registry.invoke(&step.tool_name, &step.query).await {
            Ok(output) => (output, false),
            Err(e) => {
                warn!(
                    step_index = index,
                    tool_name = %step.tool_name,
                    error = %e,
                    "Tool execution failed"
                );
                (format!("{} {}", TOOL_ERROR_MARKER, e), true)
            }
        };

        state.step_outputs.push(StepOutput {
            step_index: index,
            tool_name: step.tool_name,
            query: step.query,
            raw_output,
            failed,
            elapsed_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        state.current_step_index += 1;

        ExecutionOutcome::Recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Plan, PlanStep};
    use crate::tools::testing::{registry_with, BrokenTool, EchoTool};

    fn executor() -> ToolExecutor {
        ToolExecutor::new(Arc::new(registry_with(vec![
            Arc::new(EchoTool("librarian_tool")),
            Arc::new(BrokenTool("scout_tool")),
        ])))
    }

    fn state_with(steps: Vec<PlanStep>) -> WorkflowState {
        let mut state = WorkflowState::new("q");
        state.install_plan(Plan::from_steps(steps));
        state
    }

    #[tokio::test]
    async fn test_executes_step_and_advances() {
        let mut state = state_with(vec![PlanStep::new("librarian_tool", "risk factors")]);

        let outcome = executor().execute_next(&mut state).await;

        assert_eq!(outcome, ExecutionOutcome::Recorded);
        assert_eq!(state.current_step_index, 1);
        assert_eq!(state.step_outputs.len(), 1);
        assert!(!state.step_outputs[0].failed);
        assert!(state.step_outputs[0].raw_output.contains("risk factors"));
    }

    #[tokio::test]
    async fn test_terminal_step_is_exhausted() {
        let mut state = state_with(vec![PlanStep::new("librarian_tool", "risk factors")]);
        state.current_step_index = 1;

        let outcome = executor().execute_next(&mut state).await;

        assert_eq!(outcome, ExecutionOutcome::PlanExhausted);
        assert!(state.step_outputs.is_empty());
        assert_eq!(state.current_step_index, 1);
    }

    #[tokio::test]
    async fn test_failures_are_recorded_with_marker() {
        let mut state = state_with(vec![
            PlanStep::new("scout_tool", "latest news"),
            PlanStep::new("missing_tool", "anything"),
        ]);
        let executor = executor();

        executor.execute_next(&mut state).await;
        executor.execute_next(&mut state).await;

        assert_eq!(state.step_outputs.len(), 2);
        for output in &state.step_outputs {
            assert!(output.failed);
            assert!(output.raw_output.starts_with(TOOL_ERROR_MARKER));
        }
        assert!(state.step_outputs[1].raw_output.contains("Tool not found"));
    }
}
