//! Host-facing facade.
//!
//! [`CognitiveEngine`] owns the knowledge store and wires the orchestrator,
//! responder and optional storage together. The host process creates one
//! instance at startup and calls [`shutdown`](CognitiveEngine::shutdown)
//! when it stops.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::capabilities::{
    DocumentIndex, GraphDocumentIndex, HttpAnalysisClient, HttpDocumentIndex, PriorityCalculator,
};
use crate::chain::FinalizedChain;
use crate::config::Config;
use crate::error::{AppResult, EngineError, EngineResult};
use crate::inference::InferenceEngine;
use crate::knowledge::{Attributes, GraphSnapshot, KnowledgeStore, LinkKind, NodeKind, StoreStats};
use crate::orchestrator::{QueryOrchestrator, RoutingStats};
use crate::responder::{Answer, HybridResponder, QueryContext, ResponderSettings};
use crate::storage::{QueryRecord, SqliteStorage, Storage};
use crate::truth::TruthValue;

/// The reasoning engine as seen by its host.
pub struct CognitiveEngine {
    store: Arc<KnowledgeStore>,
    inference: InferenceEngine,
    orchestrator: QueryOrchestrator,
    responder: HybridResponder,
    storage: Option<Arc<dyn Storage>>,
}

impl std::fmt::Debug for CognitiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CognitiveEngine")
            .field("responder", &self.responder)
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

impl CognitiveEngine {
    /// Engine over `store` with the built-in rules, the weighted-sum
    /// calculator and a document index over the store's data sources.
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        let inference = InferenceEngine::new(Arc::clone(&store));
        let responder = HybridResponder::new(inference.clone(), Arc::new(PriorityCalculator::new()))
            .with_documents(Arc::new(GraphDocumentIndex::new(Arc::clone(&store))));
        Self::with_parts(inference, responder)
    }

    /// Engine from pre-built parts. The store is the inference engine's.
    pub fn with_parts(inference: InferenceEngine, responder: HybridResponder) -> Self {
        Self {
            store: Arc::clone(inference.store()),
            inference,
            orchestrator: QueryOrchestrator::new(),
            responder,
            storage: None,
        }
    }

    /// Attach snapshot and audit storage.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Build an engine from configuration.
    ///
    /// Remote capabilities are used when their URLs are configured. A
    /// storage that fails to open is logged and skipped; when it opens,
    /// the latest snapshot is restored into the fresh store.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let store = Arc::new(KnowledgeStore::new());
        let inference = InferenceEngine::new(Arc::clone(&store));

        let documents: Arc<dyn DocumentIndex> =
            match HttpDocumentIndex::from_config(&config.documents, &config.request)? {
                Some(remote) => Arc::new(remote),
                None => Arc::new(GraphDocumentIndex::new(Arc::clone(&store))),
            };
        let mut responder =
            HybridResponder::new(inference.clone(), Arc::new(PriorityCalculator::new()))
                .with_documents(documents)
                .with_settings(ResponderSettings::from_config(config));
        if let Some(client) = HttpAnalysisClient::from_config(&config.analysis, config.request.clone())? {
            responder = responder.with_analysis(Arc::new(client));
        }

        let mut engine = Self::with_parts(inference, responder);
        match SqliteStorage::new(&config.database).await {
            Ok(storage) => {
                engine = engine.with_storage(Arc::new(storage));
                engine.restore_latest().await?;
            }
            Err(e) => warn!(error = %e, "Storage unavailable, running without persistence"),
        }
        Ok(engine)
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn inference(&self) -> &InferenceEngine {
        &self.inference
    }

    // ========================================================================
    // Answer surface
    // ========================================================================

    /// Classify and answer a query with no extra context.
    pub async fn respond_to_query(&self, text: &str) -> EngineResult<Answer> {
        self.respond_to_query_with(QueryContext::new(text), &CancellationToken::new())
            .await
    }

    /// Classify and answer a query with caller context and cancellation.
    pub async fn respond_to_query_with(
        &self,
        context: QueryContext,
        token: &CancellationToken,
    ) -> EngineResult<Answer> {
        if context.query.trim().is_empty() {
            return Err(EngineError::validation("query", "cannot be empty"));
        }
        let start = Instant::now();
        let decision = self.orchestrator.classify(&context.query);
        let answer = self.responder.respond(&decision, &context, token).await?;
        self.audit(&context.query, &answer, start.elapsed()).await;
        Ok(answer)
    }

    /// Explain a concept directly, bypassing orchestration.
    pub fn explain(&self, concept_id: &str) -> EngineResult<FinalizedChain> {
        self.inference.explain_concept(
            concept_id,
            self.responder.settings().max_hops,
            &CancellationToken::new(),
        )
    }

    pub fn routing_stats(&self) -> RoutingStats {
        self.orchestrator.stats()
    }

    async fn audit(&self, query: &str, answer: &Answer, elapsed: Duration) {
        let Some(storage) = &self.storage else {
            return;
        };
        let record = QueryRecord::new(
            query,
            answer.routing_used,
            answer.confidence.overall_score,
            elapsed.as_millis() as i64,
            answer.fallback_used,
        );
        if let Err(e) = storage.log_query(&record).await {
            warn!(error = %e, "Failed to record query");
        }
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Add or replace a relationship.
    pub fn ingest_fact(
        &self,
        kind: LinkKind,
        source_id: &str,
        target_id: &str,
        truth_value: TruthValue,
    ) -> EngineResult<()> {
        self.store.add_link(kind, source_id, target_id, truth_value)
    }

    /// Add or update a node.
    pub fn ingest_node(&self, id: &str, kind: NodeKind, attributes: Attributes) -> EngineResult<()> {
        self.store.add_node(id, kind, attributes)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn export(&self) -> EngineResult<GraphSnapshot> {
        self.store.export_snapshot()
    }

    /// Replace the graph with `snapshot`.
    pub fn restore(&self, snapshot: GraphSnapshot) -> EngineResult<StoreStats> {
        self.store.import_snapshot(snapshot)
    }

    /// Save a snapshot to storage. `None` without storage.
    pub async fn persist(&self) -> AppResult<Option<String>> {
        let Some(storage) = &self.storage else {
            return Ok(None);
        };
        let snapshot = self.export()?;
        let id = storage.save_snapshot(&snapshot).await?;
        info!(snapshot = %id, nodes = snapshot.nodes.len(), "Knowledge graph persisted");
        Ok(Some(id))
    }

    /// Restore the latest stored snapshot, if any.
    pub async fn restore_latest(&self) -> AppResult<Option<StoreStats>> {
        let Some(storage) = &self.storage else {
            return Ok(None);
        };
        match storage.load_latest_snapshot().await? {
            Some(snapshot) => {
                let stats = self.restore(snapshot)?;
                info!(nodes = stats.node_count, links = stats.link_count, "Knowledge graph restored");
                Ok(Some(stats))
            }
            None => Ok(None),
        }
    }

    /// Most recent audit records; empty without storage.
    pub async fn recent_queries(&self, limit: u32) -> AppResult<Vec<QueryRecord>> {
        match &self.storage {
            Some(storage) => Ok(storage.recent_queries(limit).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Persist the graph if storage is configured and release the engine.
    pub async fn shutdown(self) -> AppResult<()> {
        if self.store.stats()?.node_count > 0 {
            self.persist().await?;
        }
        info!("Cognitive engine stopped");
        Ok(())
    }
}
