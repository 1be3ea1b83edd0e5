//! Keyword heuristics for question clarity
//!
//! Flags a question as ambiguous when it:
//! - opens with a dangling follow-up ("what about ...", "and ...")
//! - is only a word or two long
//! - names a metric but neither a company nor a period

use super::{GateDecision, Gatekeeper};
use async_trait::async_trait;

/// Openers that only make sense as a follow-up to an earlier question
const DANGLING_OPENERS: &[&str] = &[
    "what about", "how about", "and ", "also ", "what else", "anything else",
];

const METRIC_KEYWORDS: &[&str] = &[
    // Income statement
    "revenue", "sales", "income", "earnings", "profit", "margin", "eps",
    // Balance sheet & cash
    "cash", "debt", "assets", "liabilities", "capex", "dividend",
    // Shape
    "growth", "trend", "performance", "risk",
];

const PERIOD_KEYWORDS: &[&str] = &[
    "q1", "q2", "q3", "q4", "quarter", "fiscal", "fy", "year", "annual",
    "month", "last", "latest", "recent", "since", "over the", "yoy", "qoq",
];

/// Deterministic clarity classifier
#[derive(Debug, Clone, Default)]
pub struct HeuristicGatekeeper {
    /// Company names or tickers the deployment is scoped to.
    pub known_entities: Vec<String>,
}

impl HeuristicGatekeeper {
    pub fn with_entities(entities: Vec<String>) -> Self {
        Self {
            known_entities: entities,
        }
    }

    pub fn classify(&self, question: &str) -> GateDecision {
        let lowered = question.trim().to_lowercase();
        let words: Vec<&str> = question.split_whitespace().collect();

        if words.len() < 3 {
            return GateDecision::ambiguous(
                "Your question is very short. Which company, metric and period should I look at?",
            );
        }

        if DANGLING_OPENERS.iter().any(|o| lowered.starts_with(o)) {
            return GateDecision::ambiguous(
                "This reads like a follow-up. Which company and time period do you mean?",
            );
        }

        let has_metric = METRIC_KEYWORDS.iter().any(|k| lowered.contains(k));
        let has_period = PERIOD_KEYWORDS.iter().any(|k| lowered.contains(k)) || mentions_year(&lowered);
        let has_entity = self.mentions_entity(question, &words);

        if has_metric && !has_entity && !has_period {
            return GateDecision::ambiguous(
                "Which company and which time period should this cover?",
            );
        }

        GateDecision::clear()
    }

    fn mentions_entity(&self, question: &str, words: &[&str]) -> bool {
        let lowered = question.to_lowercase();
        if self
            .known_entities
            .iter()
            .any(|e| lowered.contains(&e.to_lowercase()))
        {
            return true;
        }

        // A capitalised word past the first, or an all-caps ticker.
        words.iter().enumerate().any(|(i, w)| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric());
            let is_ticker = w.len() >= 2
                && w.len() <= 5
                && w.chars().all(|c| c.is_ascii_uppercase());
            let is_proper = i > 0 && w.chars().next().map(char::is_uppercase).unwrap_or(false);
            is_ticker || is_proper
        })
    }
}

fn mentions_year(text: &str) -> bool {
    text.split(|c: char| !c.is_ascii_digit())
        .any(|d| d.len() == 4 && (d.starts_with("19") || d.starts_with("20")))
}

#[async_trait]
impl Gatekeeper for HeuristicGatekeeper {
    async fn assess(&self, question: &str) -> GateDecision {
        self.classify(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_questions() {
        let gate = HeuristicGatekeeper::default();
        let cases = vec![
            "What about growth?",
            "revenue?",
            "and the margins there",
            "how is revenue growth looking",
        ];

        for c in cases {
            assert!(!gate.classify(c).clear, "expected ambiguous: {}", c);
            assert!(gate.classify(c).clarification_message.is_some());
        }
    }

    #[test]
    fn test_clear_questions() {
        let gate = HeuristicGatekeeper::default();
        let cases = vec![
            "What was Microsoft's revenue in Q4 2023?",
            "Analyze MSFT revenue growth over the last 8 quarters",
            "What are the main risks mentioned in the annual report?",
            "Summarize the latest news about Azure",
        ];

        for c in cases {
            assert!(gate.classify(c).clear, "expected clear: {}", c);
        }
    }

    #[test]
    fn test_known_entities() {
        let gate = HeuristicGatekeeper::with_entities(vec!["microsoft".to_string()]);
        assert!(gate.classify("how has microsoft revenue held up").clear);
    }

    #[test]
    fn test_async_assess_matches_classify() {
        let gate = HeuristicGatekeeper::default();
        let decision = tokio_test::block_on(gate.assess("What about growth?"));
        assert_eq!(decision, gate.classify("What about growth?"));
    }
}
