//! Routing decision after each audit
//!
//! Pure function of its input: no clock, no randomness, no state.

use crate::models::{Plan, VerificationResult};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    Replan,
    ContinueExecution,
    Synthesize,
    Abort,
}

pub struct RouteInput<'a> {
    pub verification: &'a VerificationResult,
    /// Index of the next step to run; the step just executed sits before it.
    pub current_step_index: usize,
    pub plan: &'a Plan,
    pub replan_count: u32,
    pub max_replans: u32,
}

pub fn route(input: &RouteInput<'_>) -> RouteDecision {
    if !input.verification.passed {
        return if input.replan_count < input.max_replans {
            RouteDecision::Replan
        } else {
            RouteDecision::Abort
        };
    }

    if input.plan.has_pending_tool_step(input.current_step_index) {
        RouteDecision::ContinueExecution
    } else {
        RouteDecision::Synthesize
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteDecision::Replan => "replan",
            RouteDecision::ContinueExecution => "continue",
            RouteDecision::Synthesize => "synthesize",
            RouteDecision::Abort => "abort",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanStep;

    fn two_step_plan() -> Plan {
        Plan::from_steps(vec![
            PlanStep::new("analyst_sql_tool", "Revenue in Q4 2023"),
            PlanStep::new("analyst_trend_tool", "Revenue trend over 8 quarters"),
        ])
    }

    fn decide(passed: bool, index: usize, replans: u32, max: u32) -> RouteDecision {
        let plan = two_step_plan();
        let verification = if passed {
            VerificationResult::scored(4, 3, "relevant")
        } else {
            VerificationResult::scored(2, 3, "off topic")
        };
        route(&RouteInput {
            verification: &verification,
            current_step_index: index,
            plan: &plan,
            replan_count: replans,
            max_replans: max,
        })
    }

    #[test]
    fn test_failed_verification_replans_until_bound() {
        assert_eq!(decide(false, 1, 0, 3), RouteDecision::Replan);
        assert_eq!(decide(false, 1, 2, 3), RouteDecision::Replan);
        assert_eq!(decide(false, 1, 3, 3), RouteDecision::Abort);
        assert_eq!(decide(false, 1, 5, 3), RouteDecision::Abort);
        assert_eq!(decide(false, 1, 0, 0), RouteDecision::Abort);
    }

    #[test]
    fn test_passed_verification_continues_or_synthesizes() {
        assert_eq!(decide(true, 1, 0, 3), RouteDecision::ContinueExecution);
        assert_eq!(decide(true, 2, 0, 3), RouteDecision::Synthesize);
        // Replan budget is irrelevant once the output passed.
        assert_eq!(decide(true, 2, 3, 3), RouteDecision::Synthesize);
    }

    #[test]
    fn test_same_input_same_decision() {
        for passed in [true, false] {
            for index in 0..3 {
                for replans in 0..4 {
                    let first = decide(passed, index, replans, 3);
                    let second = decide(passed, index, replans, 3);
                    assert_eq!(first, second);
                }
            }
        }
    }
}
