//! Filing Analyst
//!
//! Answers natural-language questions about company financial filings by
//! running a reasoning workflow over a set of specialist tools:
//! - rejects ambiguous questions before any work is done
//! - plans tool calls, executes them one at a time and audits every output
//! - replans when an output fails verification, up to a fixed budget
//! - returns a synthesized answer, a clarification request, or a flagged
//!   best-effort answer, always with a full trace
//!
//! WORKFLOW:
//! GATEKEEP → PLAN → EXECUTE → AUDIT → {REPLAN | EXECUTE | SYNTHESIZE | ABORT}

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod gatekeeper;
pub mod models;
pub mod planner;
pub mod reasoning;
pub mod router;
pub mod state;
pub mod synthesis;
pub mod tools;
pub mod verification;

pub use error::Result;

// Re-export common types
pub use agent::WorkflowController;
pub use config::{Settings, WorkflowConfig};
pub use models::*;
