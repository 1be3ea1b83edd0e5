//! Gemini API client implementing [`ReasoningModel`]
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::OrchestrationError;
use crate::reasoning::ReasoningModel;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const SYSTEM_PROMPT: &str = r#"You are a meticulous financial analyst working over company filings.

Guidelines:
- Ground every statement in the data you are given
- Be structured and concise
- Say so plainly when information is missing
- Use professional financial language"#;

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/{}:generateContent", GEMINI_BASE_URL, model),
        })
    }

    fn build_request(prompt: &str, response_schema: Option<&Value>) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
                response_mime_type: response_schema.map(|_| "application/json".to_string()),
                response_schema: response_schema.cloned(),
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
        }
    }
}

#[async_trait]
impl ReasoningModel for GeminiClient {
    async fn complete(&self, prompt: &str, response_schema: Option<&Value>) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let request = Self::build_request(prompt, response_schema);

        debug!(structured = response_schema.is_some(), "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        extract_text(gemini_response)
    }
}

fn extract_text(response: GeminiResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OrchestrationError::LlmError("No candidates from Gemini".to_string()))?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(OrchestrationError::LlmError(format!(
            "Empty response from Gemini (finish_reason={:?})",
            candidate.finish_reason
        )));
    }

    Ok(text)
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    #[serde(default, alias = "finishReason")]
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let schema = json!({"type": "object"});
        let request = GeminiClient::build_request("What was revenue in Q4 2023?", Some(&schema));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["contents"][0]["parts"][0]["text"],
            "What was revenue in Q4 2023?"
        );
        assert_eq!(json["generation_config"]["response_mime_type"], "application/json");

        let plain = serde_json::to_value(GeminiClient::build_request("hi", None)).unwrap();
        assert!(plain["generation_config"].get("response_schema").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Revenue "}, {"text": "grew."}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        assert_eq!(extract_text(response).unwrap(), "Revenue grew.");
    }

    #[test]
    fn test_extract_text_rejects_empty() {
        let response: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(extract_text(response).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let client = GeminiClient::new(String::new(), "gemini-2.0-flash").unwrap();
        let err = client.complete("hello", None).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::LlmError(_)));
    }
}
