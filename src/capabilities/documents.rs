use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DocumentHit, DocumentIndex};
use crate::config::{DocumentConfig, RequestConfig};
use crate::error::{EngineError, EngineResult};
use crate::knowledge::{KnowledgeStore, LinkKind, LinkPattern, NodeKind};

/// Service name carried by `ExternalServiceUnavailable` errors.
pub const DOCUMENT_SERVICE: &str = "document_index";

/// Document index over the `DataSource` nodes of a knowledge store.
///
/// A source is searchable by its `title` and comma-separated `topics`
/// attributes and by the ids of the concepts it `Contains`. Relevance is
/// the fraction of query keywords found.
#[derive(Debug, Clone)]
pub struct GraphDocumentIndex {
    store: Arc<KnowledgeStore>,
}

impl GraphDocumentIndex {
    /// Index the sources of `store`.
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    fn haystack(&self, node_id: &str, title: &str, topics: &str) -> EngineResult<String> {
        let mut text = format!("{} {} {}", node_id, title, topics);
        for link in self.store.find_links(
            &LinkPattern::any()
                .with_kind(LinkKind::Contains)
                .from_source(node_id),
        )? {
            text.push(' ');
            text.push_str(&link.target_id);
        }
        Ok(text.to_lowercase().replace('_', " "))
    }

    /// Search synchronously; the async trait method delegates here.
    pub fn search_sync(&self, keywords: &[String]) -> EngineResult<Vec<DocumentHit>> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for node in self.store.nodes_of_kind(NodeKind::DataSource)? {
            let title = node
                .attribute("title")
                .and_then(|v| v.as_text())
                .unwrap_or(&node.id)
                .to_string();
            let topics = node
                .attribute("topics")
                .and_then(|v| v.as_text())
                .unwrap_or_default();
            let haystack = self.haystack(&node.id, &title, topics)?;

            let matched = keywords
                .iter()
                .filter(|k| haystack.contains(k.as_str()))
                .count();
            if matched > 0 {
                hits.push(DocumentHit {
                    title,
                    source_id: node.id.clone(),
                    relevance: matched as f64 / keywords.len() as f64,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.title.cmp(&b.title))
        });
        debug!(keywords = keywords.len(), hits = hits.len(), "Graph document search");
        Ok(hits)
    }
}

#[async_trait]
impl DocumentIndex for GraphDocumentIndex {
    async fn search(&self, keywords: &[String]) -> EngineResult<Vec<DocumentHit>> {
        self.search_sync(keywords)
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    keywords: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<DocumentHit>,
}

/// HTTP client for a remote document index.
#[derive(Clone)]
pub struct HttpDocumentIndex {
    client: Client,
    base_url: String,
}

impl HttpDocumentIndex {
    /// Create a client for `base_url`.
    pub fn new(base_url: &str, request_config: &RequestConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(|e| EngineError::unavailable(DOCUMENT_SERVICE, e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client from configuration, `None` when no URL is configured.
    pub fn from_config(
        config: &DocumentConfig,
        request_config: &RequestConfig,
    ) -> EngineResult<Option<Self>> {
        config
            .base_url
            .as_deref()
            .map(|url| Self::new(url, request_config))
            .transpose()
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DocumentIndex for HttpDocumentIndex {
    async fn search(&self, keywords: &[String]) -> EngineResult<Vec<DocumentHit>> {
        let url = format!("{}/v1/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SearchRequest { keywords })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Document index request failed");
                EngineError::unavailable(DOCUMENT_SERVICE, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EngineError::unavailable(
                DOCUMENT_SERVICE,
                format!("HTTP {}: {}", status.as_u16(), error_body),
            ));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            EngineError::unavailable(DOCUMENT_SERVICE, format!("Failed to parse response: {}", e))
        })?;
        Ok(body.results)
    }
}
