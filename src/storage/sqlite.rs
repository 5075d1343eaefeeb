use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{QueryRecord, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::knowledge::GraphSnapshot;
use crate::orchestrator::RoutingTarget;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// In-memory database on a single connection, for tests and demos.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_snapshot(&self, snapshot: &GraphSnapshot) -> StorageResult<String> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (id, exported_at, node_count, link_count, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(snapshot.exported_at.to_rfc3339())
        .bind(snapshot.nodes.len() as i64)
        .bind(snapshot.links.len() as i64)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            snapshot = %id,
            nodes = snapshot.nodes.len(),
            links = snapshot.links.len(),
            "Snapshot saved"
        );
        Ok(id)
    }

    async fn load_latest_snapshot(&self) -> StorageResult<Option<GraphSnapshot>> {
        let payload: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT payload
            FROM snapshots
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        payload
            .map(|(json,)| serde_json::from_str(&json).map_err(StorageError::from))
            .transpose()
    }

    async fn log_query(&self, record: &QueryRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO query_log (id, query, target, confidence, latency_ms, fallback_used, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.query)
        .bind(record.target.as_str())
        .bind(record.confidence)
        .bind(record.latency_ms)
        .bind(record.fallback_used)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_queries(&self, limit: u32) -> StorageResult<Vec<QueryRecord>> {
        let rows: Vec<QueryRow> = sqlx::query_as(
            r#"
            SELECT id, query, target, confidence, latency_ms, fallback_used, created_at
            FROM query_log
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueryRecord::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct QueryRow {
    id: String,
    query: String,
    target: String,
    confidence: f64,
    latency_ms: i64,
    fallback_used: bool,
    created_at: String,
}

impl TryFrom<QueryRow> for QueryRecord {
    type Error = StorageError;

    fn try_from(row: QueryRow) -> Result<Self, Self::Error> {
        let target = RoutingTarget::from_str(&row.target)
            .map_err(|message| StorageError::Serialization { message })?;

        Ok(Self {
            id: row.id,
            query: row.query,
            target,
            confidence: row.confidence,
            latency_ms: row.latency_ms,
            fallback_used: row.fallback_used,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{ConceptNode, Link, LinkKind, NodeKind};
    use crate::truth::TruthValue;

    fn snapshot(ids: &[&str]) -> GraphSnapshot {
        let nodes = ids
            .iter()
            .map(|id| ConceptNode::new(*id, NodeKind::Region))
            .collect();
        GraphSnapshot::new(nodes, Vec::new())
    }

    #[tokio::test]
    async fn test_empty_database_has_no_snapshot() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        assert!(storage.load_latest_snapshot().await.unwrap().is_none());
        assert!(storage.recent_queries(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_snapshot_wins() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        storage.save_snapshot(&snapshot(&["Nairobi"])).await.unwrap();

        let mut second = snapshot(&["Nairobi", "Kisumu"]);
        second.links.push(Link::new(
            LinkKind::Similarity,
            "Nairobi",
            "Kisumu",
            TruthValue::new(0.6, 0.7).unwrap(),
        ));
        storage.save_snapshot(&second).await.unwrap();

        let loaded = storage.load_latest_snapshot().await.unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.links, second.links);
    }

    #[tokio::test]
    async fn test_query_log_round_trip() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let record = QueryRecord::new("Compare A vs B", RoutingTarget::ExternalAnalysis, 0.81, 12, true);
        storage.log_query(&record).await.unwrap();

        let recent = storage.recent_queries(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, record.id);
        assert_eq!(recent[0].target, RoutingTarget::ExternalAnalysis);
        assert!(recent[0].fallback_used);
    }

    #[tokio::test]
    async fn test_recent_queries_respects_limit() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        for i in 0..4 {
            storage
                .log_query(&QueryRecord::new(
                    format!("query {}", i),
                    RoutingTarget::FastCalculator,
                    0.95,
                    1,
                    false,
                ))
                .await
                .unwrap();
        }
        let recent = storage.recent_queries(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query, "query 3");
    }
}
