//! Runtime configuration loaded from the environment (and `.env`)

use crate::error::OrchestrationError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_MAX_REPLANS: u32 = 3;
pub const DEFAULT_PASS_THRESHOLD: u8 = 3;
pub const DEFAULT_MAX_STEPS_PER_PLAN: usize = 20;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_COMPANY_TICKER: &str = "MSFT";
pub const DEFAULT_COMPANY_NAME: &str = "Microsoft";
pub const DEFAULT_RUN_LOG_CAPACITY: usize = 1000;

/// What happens to gathered evidence when the workflow replans.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidencePolicy {
    /// Evidence from the abandoned plan is moved aside; the synthesizer only
    /// sees outputs of the plan that passed.
    #[default]
    ClearOnReplan,
    /// Evidence accumulates across plans.
    RetainOnReplan,
}

impl FromStr for EvidencePolicy {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "clear" | "clear_on_replan" => Ok(EvidencePolicy::ClearOnReplan),
            "retain" | "retain_on_replan" => Ok(EvidencePolicy::RetainOnReplan),
            other => Err(OrchestrationError::ConfigError(format!(
                "unknown evidence policy '{}'",
                other
            ))),
        }
    }
}

/// Bounds consumed by the workflow controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub max_replans: u32,
    pub verification_pass_threshold: u8,
    pub max_steps_per_plan: usize,
    pub evidence_policy: EvidencePolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_replans: DEFAULT_MAX_REPLANS,
            verification_pass_threshold: DEFAULT_PASS_THRESHOLD,
            max_steps_per_plan: DEFAULT_MAX_STEPS_PER_PLAN,
            evidence_policy: EvidencePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub tools_api_base_url: Option<String>,
    /// Company the deployment's filings belong to.
    pub company_ticker: String,
    pub company_name: String,
    pub port: u16,
    pub run_log_capacity: usize,
    pub log_level: String,
    pub workflow: WorkflowConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Names a question may use for the scoped company.
    pub fn known_entities(&self) -> Vec<String> {
        vec![self.company_ticker.clone(), self.company_name.clone()]
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let verification_pass_threshold =
            parse_or(get("VERIFICATION_PASS_THRESHOLD"), DEFAULT_PASS_THRESHOLD)?;
        if !(1..=5).contains(&verification_pass_threshold) {
            return Err(OrchestrationError::ConfigError(format!(
                "VERIFICATION_PASS_THRESHOLD must be within 1..=5, got {}",
                verification_pass_threshold
            )));
        }

        let max_steps_per_plan = parse_or(get("MAX_STEPS_PER_PLAN"), DEFAULT_MAX_STEPS_PER_PLAN)?;
        if max_steps_per_plan == 0 {
            return Err(OrchestrationError::ConfigError(
                "MAX_STEPS_PER_PLAN must be at least 1".to_string(),
            ));
        }

        let workflow = WorkflowConfig {
            max_replans: parse_or(get("MAX_REPLANS"), DEFAULT_MAX_REPLANS)?,
            verification_pass_threshold,
            max_steps_per_plan,
            evidence_policy: parse_or(get("EVIDENCE_POLICY"), EvidencePolicy::default())?,
        };

        Ok(Settings {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            tools_api_base_url: get("FINANCIAL_API_BASE_URL")
                .or_else(|| get("TOOLS_API_BASE_URL"))
                .map(|url| url.trim_end_matches('/').to_string()),
            company_ticker: get("COMPANY_TICKER")
                .unwrap_or_else(|| DEFAULT_COMPANY_TICKER.to_string()),
            company_name: get("COMPANY_NAME").unwrap_or_else(|| DEFAULT_COMPANY_NAME.to_string()),
            port: parse_or(get("PORT").or_else(|| get("API_PORT")), 8080)?,
            run_log_capacity: parse_or(get("RUN_LOG_CAPACITY"), DEFAULT_RUN_LOG_CAPACITY)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            workflow,
        })
    }
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            OrchestrationError::ConfigError(format!("invalid value '{}': {}", raw, e))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.workflow.max_replans, 3);
        assert_eq!(settings.workflow.verification_pass_threshold, 3);
        assert_eq!(settings.workflow.evidence_policy, EvidencePolicy::ClearOnReplan);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.gemini_model, DEFAULT_GEMINI_MODEL);
        assert!(settings.gemini_api_key.is_none());
        assert_eq!(settings.known_entities(), vec!["MSFT", "Microsoft"]);
        assert_eq!(settings.run_log_capacity, DEFAULT_RUN_LOG_CAPACITY);
    }

    #[test]
    fn test_company_scope_override() {
        let settings = settings_from(&[("COMPANY_TICKER", "AAPL"), ("COMPANY_NAME", "Apple")]).unwrap();
        assert_eq!(settings.known_entities(), vec!["AAPL", "Apple"]);
    }

    #[test]
    fn test_overrides() {
        let settings = settings_from(&[
            ("MAX_REPLANS", "1"),
            ("EVIDENCE_POLICY", "retain"),
            ("TOOLS_API_BASE_URL", "http://tools.local/"),
            ("API_PORT", "9090"),
            ("GEMINI_API_KEY", ""),
        ])
        .unwrap();

        assert_eq!(settings.workflow.max_replans, 1);
        assert_eq!(settings.workflow.evidence_policy, EvidencePolicy::RetainOnReplan);
        assert_eq!(settings.tools_api_base_url.as_deref(), Some("http://tools.local"));
        assert_eq!(settings.port, 9090);
        assert!(settings.gemini_api_key.is_none());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(settings_from(&[("VERIFICATION_PASS_THRESHOLD", "6")]).is_err());
        assert!(settings_from(&[("MAX_REPLANS", "many")]).is_err());
        assert!(settings_from(&[("EVIDENCE_POLICY", "forget")]).is_err());
        assert!(settings_from(&[("MAX_STEPS_PER_PLAN", "0")]).is_err());
    }
}
