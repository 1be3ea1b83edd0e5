//! Error types for the filing analyst

use thiserror::Error;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Planning error: {0}")]
    PlanningError(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
