//! Core data models for the filing analyst workflow

use crate::error::OrchestrationError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tool name reserved for the logical last step of every plan.
pub const TERMINAL_MARKER: &str = "FINISH";

/// Prefix carried by the raw output of a tool call that failed.
pub const TOOL_ERROR_MARKER: &str = "[TOOL_ERROR]";

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Running,
    Ambiguous,
    Synthesized,
    Aborted,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Running)
    }
}

/// Workflow node that produced a trace entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Gatekeeper,
    Planner,
    Executor,
    Auditor,
    Synthesizer,
    Abort,
}

//
// ================= Plan =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    pub tool_name: String,
    pub query: String,
}

impl PlanStep {
    pub fn new(tool_name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            query: query.into(),
        }
    }

    pub fn terminal() -> Self {
        Self::new(TERMINAL_MARKER, "")
    }

    pub fn is_terminal(&self) -> bool {
        self.tool_name == TERMINAL_MARKER
    }

    /// Same tool with the same query, ignoring surrounding whitespace and case.
    pub fn repeats(&self, other: &PlanStep) -> bool {
        self.tool_name == other.tool_name
            && self.query.trim().eq_ignore_ascii_case(other.query.trim())
    }
}

/// Ordered plan produced by one planning pass. Never mutated after creation;
/// replanning builds a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: Uuid,
    pub steps: Vec<PlanStep>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Build a plan from tool steps, appending the terminal marker.
    pub fn from_steps(steps: Vec<PlanStep>) -> Self {
        let mut steps: Vec<PlanStep> = steps.into_iter().filter(|s| !s.is_terminal()).collect();
        steps.push(PlanStep::terminal());

        Self {
            plan_id: Uuid::new_v4(),
            steps,
            created_at: Utc::now(),
        }
    }

    /// A plan with no steps at all, used before the first planning pass.
    pub fn empty() -> Self {
        Self {
            plan_id: Uuid::nil(),
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn tool_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| !s.is_terminal())
    }

    pub fn tool_step_count(&self) -> usize {
        self.tool_steps().count()
    }

    /// Whether any non-terminal step sits at or after `index`.
    pub fn has_pending_tool_step(&self, index: usize) -> bool {
        self.steps
            .iter()
            .skip(index)
            .any(|s| !s.is_terminal())
    }

    /// Structural checks applied to every plan before execution.
    pub fn validate(&self, max_steps: usize, rejected: &[PlanStep]) -> Result<()> {
        let tool_steps = self.tool_step_count();
        if tool_steps == 0 {
            return Err(OrchestrationError::InvalidPlan(
                "plan has no tool steps".to_string(),
            ));
        }

        if tool_steps > max_steps {
            return Err(OrchestrationError::InvalidPlan(format!(
                "plan has {} tool steps, limit is {}",
                tool_steps, max_steps
            )));
        }

        let terminals = self.steps.iter().filter(|s| s.is_terminal()).count();
        let ends_terminal = self.steps.last().map(PlanStep::is_terminal).unwrap_or(false);
        if terminals != 1 || !ends_terminal {
            return Err(OrchestrationError::InvalidPlan(format!(
                "plan must end with exactly one {} step",
                TERMINAL_MARKER
            )));
        }

        if let Some(step) = self
            .tool_steps()
            .find(|step| rejected.iter().any(|r| step.repeats(r)))
        {
            return Err(OrchestrationError::InvalidPlan(format!(
                "plan repeats rejected step {}: {}",
                step.tool_name, step.query
            )));
        }

        Ok(())
    }
}

//
// ================= Execution =================
//

/// Recorded result of one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    pub step_index: usize,
    pub tool_name: String,
    pub query: String,
    pub raw_output: String,
    pub failed: bool,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl StepOutput {
    pub fn as_step(&self) -> PlanStep {
        PlanStep::new(self.tool_name.clone(), self.query.clone())
    }
}

//
// ================= Verification =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub confidence: u8,
    pub passed: bool,
    pub reasoning: String,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    pub const MIN_CONFIDENCE: u8 = 1;
    pub const MAX_CONFIDENCE: u8 = 5;

    /// Score an output; confidence is clamped into 1..=5.
    pub fn scored(confidence: i64, threshold: u8, reasoning: impl Into<String>) -> Self {
        let confidence = confidence.clamp(
            Self::MIN_CONFIDENCE as i64,
            Self::MAX_CONFIDENCE as i64,
        ) as u8;

        Self {
            confidence,
            passed: confidence >= threshold,
            reasoning: reasoning.into(),
            verified_at: Utc::now(),
        }
    }

    pub fn failed(reasoning: impl Into<String>) -> Self {
        Self {
            confidence: Self::MIN_CONFIDENCE,
            passed: false,
            reasoning: reasoning.into(),
            verified_at: Utc::now(),
        }
    }
}

//
// ================= Trace & Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub node: Node,
    pub summary: String,
    pub at: DateTime<Utc>,
}

impl TraceEntry {
    pub fn new(node: Node, summary: impl Into<String>) -> Self {
        Self {
            node,
            summary: summary.into(),
            at: Utc::now(),
        }
    }
}

/// Structured result handed back to every caller of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub run_id: Uuid,
    pub response: String,
    pub status: WorkflowStatus,
    pub trace: Vec<TraceEntry>,
    pub replan_count: u32,
    /// Outputs of the plan the response was built from.
    pub evidence: Vec<StepOutput>,
    /// Outputs of plans abandoned by a replan.
    #[serde(default)]
    pub discarded_evidence: Vec<StepOutput>,
    /// One entry per audit, in order.
    #[serde(default)]
    pub verifications: Vec<VerificationResult>,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Ambiguous => "AMBIGUOUS",
            WorkflowStatus::Synthesized => "SYNTHESIZED",
            WorkflowStatus::Aborted => "ABORTED",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Node::Gatekeeper => "gatekeeper",
            Node::Planner => "planner",
            Node::Executor => "executor",
            Node::Auditor => "auditor",
            Node::Synthesizer => "synthesizer",
            Node::Abort => "abort",
        };
        write!(f, "{}", s)
    }
}
