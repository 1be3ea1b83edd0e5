//! Tool trait and registry
//!
//! Specialist tools answer one sub-query each. Their internals (retrieval,
//! SQL generation, trend math, web search) live behind the financial tools
//! service; here they are reached over HTTP, or answered by the reasoning
//! model when no service is configured.

use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::models::TERMINAL_MARKER;
use crate::reasoning::ReasoningModel;
use crate::Result;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Trait for a single specialist tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, query: &str) -> Result<String>;
}

/// Name and description of a registered tool, as shown to the planner
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Tool registry for looking up and invoking tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. The terminal marker is reserved and cannot be used as
    /// a tool name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if tool.name() == TERMINAL_MARKER {
            return Err(OrchestrationError::ConfigError(format!(
                "'{}' is reserved for the terminal plan step",
                TERMINAL_MARKER
            )));
        }
        self.tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tools sorted by name
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn invoke(&self, tool_name: &str, query: &str) -> Result<String> {
        let tool = self
            .get(tool_name)
            .ok_or_else(|| OrchestrationError::ToolNotFound(tool_name.to_string()))?;

        debug!(tool_name, "Invoking tool");
        tool.execute(query).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Specialist catalogue =================
//

pub struct SpecialistSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub instruction: &'static str,
}

pub const LIBRARIAN_TOOL: &str = "librarian_tool";
pub const ANALYST_SQL_TOOL: &str = "analyst_sql_tool";
pub const ANALYST_TREND_TOOL: &str = "analyst_trend_tool";
pub const SCOUT_TOOL: &str = "scout_tool";

pub const SPECIALISTS: &[SpecialistSpec] = &[
    SpecialistSpec {
        name: LIBRARIAN_TOOL,
        description: "Search financial documents and SEC filings for facts, quotes and disclosures",
        instruction: "Answer from the company's SEC filings. Quote or closely paraphrase the relevant passages and name the filing they come from.",
    },
    SpecialistSpec {
        name: ANALYST_SQL_TOOL,
        description: "Query structured financial data for specific figures in a single period",
        instruction: "Report the specific financial figures requested for the single period asked about. State units and the period explicitly.",
    },
    SpecialistSpec {
        name: ANALYST_TREND_TOOL,
        description: "Analyze trends, growth rates and patterns across multiple periods",
        instruction: "Describe the trend across periods: starting and latest values, total growth, latest quarter-over-quarter and year-over-year growth, and a one-line interpretation.",
    },
    SpecialistSpec {
        name: SCOUT_TOOL,
        description: "Search for recent news, market updates and live information",
        instruction: "Summarize recent news and market developments relevant to the query, with dates where known.",
    },
];

//
// ================= HTTP-backed tools =================
//

#[derive(Clone)]
pub struct FinancialApiClient {
    client: Client,
    base_url: String,
}

impl FinancialApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::ToolError(format!(
                    "Financial API request failed for {}: {}",
                    path, e
                ))
            })?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(OrchestrationError::ToolError(format!(
                "Financial API returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

/// Specialist answered by the financial tools service
pub struct HttpSpecialistTool {
    spec: &'static SpecialistSpec,
    api: FinancialApiClient,
}

impl HttpSpecialistTool {
    pub fn new(spec: &'static SpecialistSpec, api: FinancialApiClient) -> Self {
        Self { spec, api }
    }
}

#[async_trait::async_trait]
impl Tool for HttpSpecialistTool {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn description(&self) -> &str {
        self.spec.description
    }

    async fn execute(&self, query: &str) -> Result<String> {
        let path = format!("/api/v1/tools/{}", self.spec.name);
        let body = self
            .api
            .post_json(&path, &json!({ "tool": self.spec.name, "query": query }))
            .await?;

        Ok(render_service_output(&body))
    }
}

/// Prefer the service's `output` text; fall back to the raw JSON.
fn render_service_output(body: &Value) -> String {
    body.get("output")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

//
// ================= Model-backed tools =================
//

/// Specialist answered directly by the reasoning model
pub struct ModelBackedTool {
    spec: &'static SpecialistSpec,
    model: Arc<dyn ReasoningModel>,
}

impl ModelBackedTool {
    pub fn new(spec: &'static SpecialistSpec, model: Arc<dyn ReasoningModel>) -> Self {
        Self { spec, model }
    }
}

#[async_trait::async_trait]
impl Tool for ModelBackedTool {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn description(&self) -> &str {
        self.spec.description
    }

    async fn execute(&self, query: &str) -> Result<String> {
        if query.trim().is_empty() {
            return Err(OrchestrationError::ToolError(format!(
                "{} requires a non-empty query",
                self.spec.name
            )));
        }

        let prompt = format!("{}\n\nQuery: {}", self.spec.instruction, query);
        self.model
            .complete(&prompt, None)
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("{}: {}", self.spec.name, e)))
    }
}

/// Registry with the four specialists, HTTP-backed when a tools service is
/// configured and model-backed otherwise.
pub fn create_default_registry(
    settings: &Settings,
    model: Arc<dyn ReasoningModel>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    let api = settings
        .tools_api_base_url
        .as_deref()
        .map(FinancialApiClient::new)
        .transpose()?;

    for spec in SPECIALISTS {
        let tool: Arc<dyn Tool> = match &api {
            Some(api) => Arc::new(HttpSpecialistTool::new(spec, api.clone())),
            None => Arc::new(ModelBackedTool::new(spec, model.clone())),
        };
        registry.register(tool)?;
    }

    Ok(registry)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Answers every query with a fixed prefix.
    pub struct EchoTool(pub &'static str);

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "echoes the query"
        }

        async fn execute(&self, query: &str) -> Result<String> {
            Ok(format!("{} answered: {}", self.0, query))
        }
    }

    /// Always fails.
    pub struct BrokenTool(pub &'static str);

    #[async_trait::async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn execute(&self, _query: &str) -> Result<String> {
            Err(OrchestrationError::ToolError("upstream timed out".to_string()))
        }
    }

    pub fn registry_with(tools: Vec<Arc<dyn Tool>>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::reasoning::ScriptedModel;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let registry = registry_with(vec![Arc::new(EchoTool(LIBRARIAN_TOOL))]);
        let err = registry.invoke("nope_tool", "q").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ToolNotFound(name) if name == "nope_tool"));

        let ok = registry.invoke(LIBRARIAN_TOOL, "risk factors").await.unwrap();
        assert!(ok.contains("risk factors"));
    }

    #[test]
    fn test_terminal_marker_is_reserved() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(Arc::new(EchoTool(TERMINAL_MARKER))).is_err());
    }

    #[test]
    fn test_default_registry_without_service_is_model_backed() {
        let vars: HashMap<String, String> = HashMap::new();
        let settings = Settings::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let model: Arc<dyn ReasoningModel> = Arc::new(ScriptedModel::new());

        let registry = create_default_registry(&settings, model).unwrap();
        let names: Vec<String> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![ANALYST_SQL_TOOL, ANALYST_TREND_TOOL, LIBRARIAN_TOOL, SCOUT_TOOL]
        );
    }

    #[tokio::test]
    async fn test_model_backed_tool_wraps_failures() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply("Revenue was $62.0B in Q4 2023.")
                .fail("quota exceeded"),
        );
        let tool = ModelBackedTool::new(&SPECIALISTS[1], model.clone());

        let out = tool.execute("Revenue in Q4 2023").await.unwrap();
        assert!(out.contains("62.0B"));
        assert!(model.prompts()[0].contains("Query: Revenue in Q4 2023"));

        let err = tool.execute("Revenue in Q3 2023").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ToolError(_)));
        assert!(tool.execute("   ").await.is_err());
    }

    #[test]
    fn test_render_service_output() {
        assert_eq!(render_service_output(&json!({"output": "ok"})), "ok");
        assert_eq!(render_service_output(&json!({"rows": 2})), "{\"rows\":2}");
    }
}
