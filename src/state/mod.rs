//! Per-run workflow state
//!
//! One `WorkflowState` is created for each question, owned by the controller
//! for the whole run and dropped once a terminal status is reached. Nothing
//! in here is shared between runs.

use crate::config::EvidencePolicy;
use crate::models::{
    Node, Plan, StepOutput, TraceEntry, VerificationResult, WorkflowStatus,
};
use serde::Serialize;
use uuid::Uuid;

/// Position of the controller in the workflow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Gatekeeping,
    Planning,
    Executing,
    Auditing,
    Replanning,
    Synthesizing,
    Ambiguous,
    Aborted,
    Synthesized,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Ambiguous | Phase::Aborted | Phase::Synthesized)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    pub question: String,
    pub plan: Plan,
    pub current_step_index: usize,
    /// Evidence gathered by the active plan.
    pub step_outputs: Vec<StepOutput>,
    /// Evidence set aside by replans under `EvidencePolicy::ClearOnReplan`.
    pub discarded_outputs: Vec<StepOutput>,
    /// Every audit of the run, in order.
    pub verifications: Vec<VerificationResult>,
    pub replan_count: u32,
    pub planning_passes: u32,
    pub status: WorkflowStatus,
    pub phase: Phase,
    pub trace: Vec<TraceEntry>,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            question: question.into(),
            plan: Plan::empty(),
            current_step_index: 0,
            step_outputs: Vec::new(),
            discarded_outputs: Vec::new(),
            verifications: Vec::new(),
            replan_count: 0,
            planning_passes: 0,
            status: WorkflowStatus::Running,
            phase: Phase::Init,
            trace: Vec::new(),
        }
    }

    pub fn record(&mut self, node: Node, summary: impl Into<String>) {
        self.trace.push(TraceEntry::new(node, summary));
    }

    pub fn latest_output(&self) -> Option<&StepOutput> {
        self.step_outputs.last()
    }

    pub fn latest_verification(&self) -> Option<&VerificationResult> {
        self.verifications.last()
    }

    /// Install a freshly planned replacement for the current plan.
    pub fn install_plan(&mut self, plan: Plan) {
        self.plan = plan;
        self.current_step_index = 0;
        self.planning_passes += 1;
    }

    /// Apply a replan decision: bump the counter and handle the evidence of
    /// the abandoned plan according to `policy`.
    pub fn begin_replan(&mut self, policy: EvidencePolicy) {
        self.replan_count += 1;
        if policy == EvidencePolicy::ClearOnReplan {
            self.discarded_outputs.append(&mut self.step_outputs);
        }
    }

    /// Every output gathered during the run, oldest first.
    pub fn all_evidence(&self) -> Vec<StepOutput> {
        let mut evidence = self.discarded_outputs.clone();
        evidence.extend(self.step_outputs.iter().cloned());
        evidence.sort_by_key(|o| o.timestamp);
        evidence
    }

    pub fn finish(&mut self, status: WorkflowStatus, phase: Phase) {
        self.status = status;
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn output(index: usize, tool: &str) -> StepOutput {
        StepOutput {
            step_index: index,
            tool_name: tool.to_string(),
            query: "q".to_string(),
            raw_output: "r".to_string(),
            failed: false,
            elapsed_ms: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_new_state_is_running() {
        let state = WorkflowState::new("What was revenue in Q4 2023?");
        assert_eq!(state.status, WorkflowStatus::Running);
        assert_eq!(state.phase, Phase::Init);
        assert_eq!(state.replan_count, 0);
        assert!(state.step_outputs.is_empty());
    }

    #[test]
    fn test_clear_policy_moves_evidence_aside() {
        let mut state = WorkflowState::new("q");
        state.step_outputs.push(output(0, "librarian_tool"));

        state.begin_replan(EvidencePolicy::ClearOnReplan);

        assert_eq!(state.replan_count, 1);
        assert!(state.step_outputs.is_empty());
        assert_eq!(state.discarded_outputs.len(), 1);
        assert_eq!(state.all_evidence().len(), 1);
    }

    #[test]
    fn test_retain_policy_keeps_evidence() {
        let mut state = WorkflowState::new("q");
        state.step_outputs.push(output(0, "librarian_tool"));

        state.begin_replan(EvidencePolicy::RetainOnReplan);

        assert_eq!(state.step_outputs.len(), 1);
        assert!(state.discarded_outputs.is_empty());
    }

    #[test]
    fn test_install_plan_resets_cursor() {
        let mut state = WorkflowState::new("q");
        state.current_step_index = 2;
        state.install_plan(Plan::empty());
        assert_eq!(state.current_step_index, 0);
        assert_eq!(state.planning_passes, 1);
    }

    #[test]
    fn test_verifications_accumulate() {
        let mut state = WorkflowState::new("q");
        assert!(state.latest_verification().is_none());

        state.verifications.push(VerificationResult::scored(2, 3, "partial"));
        state.begin_replan(EvidencePolicy::ClearOnReplan);
        state.verifications.push(VerificationResult::scored(4, 3, "exact"));

        assert_eq!(state.verifications.len(), 2);
        assert_eq!(state.latest_verification().map(|v| v.confidence), Some(4));
    }
}
