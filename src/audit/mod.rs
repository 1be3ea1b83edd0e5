//! Run log: finished workflow runs, kept for inspection and replay.
//!
//! Only completed results are stored; in-flight workflow state never leaves
//! its run.

use crate::config::DEFAULT_RUN_LOG_CAPACITY;
use crate::models::{TraceEntry, WorkflowResult, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub question: String,
    pub status: WorkflowStatus,
    pub response: String,
    pub trace: Vec<TraceEntry>,
    pub replan_count: u32,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

impl RunRecord {
    pub fn from_result(question: &str, result: &WorkflowResult, execution_time_ms: u64) -> Self {
        Self {
            run_id: result.run_id,
            question: question.to_string(),
            status: result.status,
            response: result.response.clone(),
            trace: result.trace.clone(),
            replan_count: result.replan_count,
            content_hash: compute_content_hash(question, result.status, &result.response, &result.trace),
            created_at: Utc::now(),
            execution_time_ms,
        }
    }
}

/// Run log storage, bounded to `capacity` records; the oldest are evicted
/// first.
#[derive(Clone)]
pub struct RunLog {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
    capacity: usize,
}

impl RunLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RUN_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(&self, record: RunRecord) -> Uuid {
        let run_id = record.run_id;
        let mut records = self.records.write().await;
        records.insert(run_id, record);

        while records.len() > self.capacity {
            let oldest = records
                .values()
                .filter(|r| r.run_id != run_id)
                .min_by_key(|r| r.created_at)
                .map(|r| r.run_id);
            match oldest {
                Some(id) => {
                    records.remove(&id);
                    debug!(run_id = %id, "Run log full, evicted oldest record");
                }
                None => break,
            }
        }

        run_id
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn get(&self, run_id: Uuid) -> Option<RunRecord> {
        let records = self.records.read().await;
        records.get(&run_id).cloned()
    }

    /// Most recent runs first, at most `limit`
    pub async fn recent(&self, limit: usize) -> Vec<RunRecord> {
        let records = self.records.read().await;

        let mut items: Vec<RunRecord> = records.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        items
    }

    /// Check that a stored record still matches its content hash
    pub async fn verify_integrity(&self, run_id: Uuid) -> bool {
        let records = self.records.read().await;

        records
            .get(&run_id)
            .map(|r| {
                compute_content_hash(&r.question, r.status, &r.response, &r.trace) == r.content_hash
            })
            .unwrap_or(false)
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 over the JSON form of a run's outcome, streamed into the hasher
pub fn compute_content_hash(
    question: &str,
    status: WorkflowStatus,
    response: &str,
    trace: &[TraceEntry],
) -> String {
    let mut hasher = Sha256::new();
    let content = (question, status, response, trace);

    if serde_json::to_writer(&mut HashWriter(&mut hasher), &content).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
