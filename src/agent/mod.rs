//! Workflow controller - drives one question through the reasoning loop
//!
//! GATEKEEP → PLAN → EXECUTE → AUDIT → {REPLAN | EXECUTE | SYNTHESIZE | ABORT}
//!
//! The controller owns the run's `WorkflowState` and is the only thing that
//! mutates it. Nodes run strictly one after another; every failure is turned
//! into a workflow signal before the next node is chosen, so `run` always
//! returns a structured result.

use crate::audit::{RunLog, RunRecord};
use crate::config::{Settings, WorkflowConfig};
use crate::error::OrchestrationError;
use crate::execution::{ExecutionOutcome, ToolExecutor};
use crate::gatekeeper::{
    GateDecision, Gatekeeper, HeuristicGatekeeper, ModelGatekeeper, DEFAULT_CLARIFICATION,
};
use crate::models::{Node, PlanStep, WorkflowResult, WorkflowStatus};
use crate::planner::{KeywordPlanner, ModelPlanner, Planner, PlanningContext};
use crate::reasoning::{GeminiClient, ReasoningModel};
use crate::router::{route, RouteDecision, RouteInput};
use crate::state::{Phase, WorkflowState};
use crate::synthesis::{DigestSynthesizer, ModelSynthesizer, Synthesizer};
use crate::tools::{create_default_registry, ToolInfo, ToolRegistry};
use crate::verification::{Auditor, ModelAuditor, RuleAuditor};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct WorkflowController {
    gatekeeper: Box<dyn Gatekeeper>,
    planner: Box<dyn Planner>,
    executor: ToolExecutor,
    auditor: Box<dyn Auditor>,
    synthesizer: Box<dyn Synthesizer>,
    config: WorkflowConfig,
    run_log: Option<RunLog>,
}

impl WorkflowController {
    pub fn new(
        gatekeeper: Box<dyn Gatekeeper>,
        planner: Box<dyn Planner>,
        executor: ToolExecutor,
        auditor: Box<dyn Auditor>,
        synthesizer: Box<dyn Synthesizer>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            gatekeeper,
            planner,
            executor,
            auditor,
            synthesizer,
            config,
            run_log: None,
        }
    }

    /// Controller whose gatekeeper, planner, auditor and synthesizer all use
    /// the same reasoning model.
    pub fn with_model(
        model: Arc<dyn ReasoningModel>,
        registry: Arc<ToolRegistry>,
        config: WorkflowConfig,
    ) -> Self {
        let threshold = config.verification_pass_threshold;
        Self::new(
            Box::new(ModelGatekeeper::new(model.clone())),
            Box::new(ModelPlanner::new(model.clone())),
            ToolExecutor::new(registry),
            Box::new(ModelAuditor::with_default_rules(model.clone(), threshold)),
            Box::new(ModelSynthesizer::new(model)),
            config,
        )
    }

    /// Controller wired from process settings.
    ///
    /// Without a Gemini key the workflow runs model-free: keyword gatekeeper
    /// and planner, rule-only auditing and an evidence digest as the answer.
    /// That mode needs the financial tools service, since the specialists
    /// would otherwise be model-backed.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let heuristic = HeuristicGatekeeper::with_entities(settings.known_entities());
        let config = settings.workflow.clone();
        let threshold = config.verification_pass_threshold;

        let Some(api_key) = settings.gemini_api_key.clone() else {
            if settings.tools_api_base_url.is_none() {
                return Err(OrchestrationError::ConfigError(
                    "set GEMINI_API_KEY or FINANCIAL_API_BASE_URL; without either no tool can answer"
                        .to_string(),
                ));
            }

            warn!("GEMINI_API_KEY not set - running without a reasoning model");
            let model: Arc<dyn ReasoningModel> =
                Arc::new(GeminiClient::new(String::new(), &settings.gemini_model)?);
            let registry = Arc::new(create_default_registry(settings, model)?);

            return Ok(Self::new(
                Box::new(heuristic),
                Box::new(KeywordPlanner),
                ToolExecutor::new(registry),
                Box::new(RuleAuditor::with_default_rules(threshold)),
                Box::new(DigestSynthesizer),
                config,
            ));
        };

        let model: Arc<dyn ReasoningModel> =
            Arc::new(GeminiClient::new(api_key, &settings.gemini_model)?);
        let registry = Arc::new(create_default_registry(settings, model.clone())?);

        Ok(Self::new(
            Box::new(ModelGatekeeper::new(model.clone()).with_fallback(heuristic)),
            Box::new(ModelPlanner::new(model.clone())),
            ToolExecutor::new(registry),
            Box::new(ModelAuditor::with_default_rules(model.clone(), threshold)),
            Box::new(ModelSynthesizer::new(model)),
            config,
        ))
    }

    /// Record every finished run in `run_log`.
    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.executor.registry().list()
    }

    /// Run the workflow for one question
    pub async fn run(&self, question: &str) -> WorkflowResult {
        let start_time = Instant::now();
        let tools = self.tools();
        let mut state = WorkflowState::new(question.trim());
        let mut rejected: Vec<PlanStep> = Vec::new();
        let mut response = String::new();

        info!(
            run_id = %state.run_id,
            question = %state.question,
            "Workflow: starting run"
        );

        while !state.phase.is_terminal() {
            debug!(run_id = %state.run_id, phase = ?state.phase, "Workflow: entering phase");

            match state.phase {
                Phase::Init => state.phase = Phase::Gatekeeping,

                // === GATEKEEP ===
                Phase::Gatekeeping => {
                    let decision = if state.question.is_empty() {
                        GateDecision::ambiguous("Please provide a question.")
                    } else {
                        self.gatekeeper.assess(&state.question).await
                    };

                    if decision.clear {
                        state.record(Node::Gatekeeper, "question is clear");
                        state.phase = Phase::Planning;
                    } else {
                        let message = decision
                            .clarification_message
                            .unwrap_or_else(|| DEFAULT_CLARIFICATION.to_string());
                        state.record(Node::Gatekeeper, format!("ambiguous: {}", message));
                        response = message;
                        state.finish(WorkflowStatus::Ambiguous, Phase::Ambiguous);
                    }
                }

                // === PLAN ===
                Phase::Planning => {
                    let planned = {
                        let prior_outputs = state.all_evidence();
                        let ctx = PlanningContext {
                            question: &state.question,
                            prior_outputs: &prior_outputs,
                            prior_verification: state.latest_verification(),
                            rejected_steps: &rejected,
                            tools: &tools,
                        };

                        self.planner.create_plan(&ctx).await.and_then(|plan| {
                            plan.validate(self.config.max_steps_per_plan, &rejected)
                                .map(|_| plan)
                        })
                    };

                    match planned {
                        Ok(plan) => {
                            let steps: Vec<String> = plan
                                .tool_steps()
                                .map(|s| format!("{}: {}", s.tool_name, s.query))
                                .collect();
                            state.record(
                                Node::Planner,
                                format!(
                                    "pass {}: {} step(s) [{}]",
                                    state.planning_passes + 1,
                                    steps.len(),
                                    steps.join("; ")
                                ),
                            );
                            state.install_plan(plan);
                            state.phase = Phase::Executing;
                        }
                        Err(e) => {
                            warn!(run_id = %state.run_id, error = %e, "Planning failed - aborting run");
                            state.record(Node::Planner, format!("planning failed: {}", e));
                            response = self.abort(&mut state, &format!("planning failed: {}", e)).await;
                        }
                    }
                }

                // === EXECUTE ===
                Phase::Executing => match self.executor.execute_next(&mut state).await {
                    ExecutionOutcome::Recorded => {
                        if let Some(output) = state.latest_output() {
                            let summary = format!(
                                "step {} {} -> {} in {} ms",
                                output.step_index + 1,
                                output.tool_name,
                                if output.failed { "failed" } else { "ok" },
                                output.elapsed_ms
                            );
                            state.record(Node::Executor, summary);
                        }
                        state.phase = Phase::Auditing;
                    }
                    ExecutionOutcome::PlanExhausted if state.step_outputs.is_empty() => {
                        response = self.abort(&mut state, "plan had no executable steps").await;
                    }
                    ExecutionOutcome::PlanExhausted => state.phase = Phase::Synthesizing,
                },

                // === AUDIT + ROUTE ===
                Phase::Auditing => {
                    let Some(output) = state.latest_output().cloned() else {
                        response = self.abort(&mut state, "no step output to audit").await;
                        continue;
                    };

                    let verification = self.auditor.audit(&state.question, &output).await;
                    let decision = route(&RouteInput {
                        verification: &verification,
                        current_step_index: state.current_step_index,
                        plan: &state.plan,
                        replan_count: state.replan_count,
                        max_replans: self.config.max_replans,
                    });

                    state.record(
                        Node::Auditor,
                        format!(
                            "{} confidence {}/5 {} -> {}",
                            output.tool_name,
                            verification.confidence,
                            if verification.passed { "passed" } else { "failed" },
                            decision
                        ),
                    );

                    if !verification.passed {
                        rejected.push(output.as_step());
                    }
                    let reasoning = verification.reasoning.clone();
                    state.verifications.push(verification);

                    match decision {
                        RouteDecision::Replan => state.phase = Phase::Replanning,
                        RouteDecision::ContinueExecution => state.phase = Phase::Executing,
                        RouteDecision::Synthesize => state.phase = Phase::Synthesizing,
                        RouteDecision::Abort => {
                            let reason = format!(
                                "verification still failing after {} replan(s): {}",
                                state.replan_count, reasoning
                            );
                            response = self.abort(&mut state, &reason).await;
                        }
                    }
                }

                // === REPLAN ===
                Phase::Replanning => {
                    state.begin_replan(self.config.evidence_policy);
                    warn!(
                        run_id = %state.run_id,
                        attempt = state.replan_count,
                        max_replans = self.config.max_replans,
                        "Verification failed - replanning"
                    );
                    state.phase = Phase::Planning;
                }

                // === SYNTHESIZE ===
                Phase::Synthesizing => {
                    match self
                        .synthesizer
                        .synthesize(&state.question, &state.step_outputs)
                        .await
                    {
                        Ok(answer) => {
                            state.record(
                                Node::Synthesizer,
                                format!("integrated {} output(s)", state.step_outputs.len()),
                            );
                            response = answer;
                            state.finish(WorkflowStatus::Synthesized, Phase::Synthesized);
                        }
                        Err(e) => {
                            warn!(run_id = %state.run_id, error = %e, "Synthesis failed - degrading");
                            response = self.abort(&mut state, &format!("synthesis failed: {}", e)).await;
                        }
                    }
                }

                Phase::Ambiguous | Phase::Aborted | Phase::Synthesized => break,
            }
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        info!(
            run_id = %state.run_id,
            status = %state.status,
            replans = state.replan_count,
            steps = state.trace.len(),
            execution_time_ms,
            "Workflow: run finished"
        );

        let result = WorkflowResult {
            run_id: state.run_id,
            response,
            status: state.status,
            trace: state.trace,
            replan_count: state.replan_count,
            evidence: state.step_outputs,
            discarded_evidence: state.discarded_outputs,
            verifications: state.verifications,
        };

        if let Some(run_log) = &self.run_log {
            run_log
                .record(RunRecord::from_result(question, &result, execution_time_ms))
                .await;
        }

        result
    }

    /// Terminate the run with a flagged best-effort answer.
    async fn abort(&self, state: &mut WorkflowState, reason: &str) -> String {
        let evidence = state.all_evidence();
        let response = self
            .synthesizer
            .degraded(&state.question, &evidence, reason)
            .await;

        state.record(Node::Abort, reason.to_string());
        state.finish(WorkflowStatus::Aborted, Phase::Aborted);
        response
    }
}
