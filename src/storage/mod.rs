//! Best-effort persistence for graph snapshots and the query audit log.
//!
//! The knowledge graph lives in memory; storage only keeps exported
//! snapshots and a record of answered queries.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::knowledge::GraphSnapshot;
use crate::orchestrator::RoutingTarget;

/// One answered query in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Unique record identifier.
    pub id: String,
    /// Query text as received.
    pub query: String,
    /// Subsystem that answered.
    pub target: RoutingTarget,
    /// Final answer confidence.
    pub confidence: f64,
    /// Time spent answering.
    pub latency_ms: i64,
    /// Whether an external capability failed and a fallback answered.
    pub fallback_used: bool,
    /// When the query was answered.
    pub created_at: DateTime<Utc>,
}

impl QueryRecord {
    /// Create a record stamped now.
    pub fn new(
        query: impl Into<String>,
        target: RoutingTarget,
        confidence: f64,
        latency_ms: i64,
        fallback_used: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            target,
            confidence,
            latency_ms,
            fallback_used,
            created_at: Utc::now(),
        }
    }
}

/// Snapshot and audit-log persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a snapshot, returning its id.
    async fn save_snapshot(&self, snapshot: &GraphSnapshot) -> StorageResult<String>;
    /// Most recently saved snapshot, if any.
    async fn load_latest_snapshot(&self) -> StorageResult<Option<GraphSnapshot>>;
    /// Append a query record.
    async fn log_query(&self, record: &QueryRecord) -> StorageResult<()>;
    /// Newest query records first.
    async fn recent_queries(&self, limit: u32) -> StorageResult<Vec<QueryRecord>>;
}
