//! Narrow interfaces to the capabilities the engine consumes.
//!
//! The calculator is pure and synchronous; analysis and document search
//! are async and may be remote. Remote failures come back as
//! `EngineError::ExternalServiceUnavailable`.

mod analysis;
mod calculator;
mod documents;

pub use analysis::*;
pub use calculator::*;
pub use documents::*;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Named metrics, each expected in [0, 1].
pub type Metrics = BTreeMap<String, f64>;

/// Allocation priority bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityLevel {
    /// Bucket for a score in [0, 1].
    pub fn for_score(score: f64) -> Self {
        if score >= 0.7 {
            PriorityLevel::Critical
        } else if score >= 0.5 {
            PriorityLevel::High
        } else if score >= 0.3 {
            PriorityLevel::Medium
        } else {
            PriorityLevel::Low
        }
    }

    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLevel::Low => "low",
            PriorityLevel::Medium => "medium",
            PriorityLevel::High => "high",
            PriorityLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of a priority calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub score: f64,
    pub level: PriorityLevel,
    /// Which evaluator produced the score.
    pub engine: String,
}

/// Deterministic priority calculator.
#[cfg_attr(test, mockall::automock)]
pub trait FastCalculator: Send + Sync {
    /// Score a metric set. Out-of-range metrics are a validation error.
    fn calculate(&self, metrics: &Metrics) -> EngineResult<Calculation>;
}

/// Request sent to the external analysis service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl AnalysisRequest {
    /// Create a request for a query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Attach concepts the analysis should focus on.
    pub fn with_concepts(mut self, concepts: Vec<String>) -> Self {
        self.concepts = concepts;
        self
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach extracted keywords.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}

/// Result returned by the external analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    /// Service-reported confidence in [0, 1].
    pub confidence: f64,
}

/// Remote analysis service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalAnalysis: Send + Sync {
    /// Analyze a request. Network failures map to `ExternalServiceUnavailable`.
    async fn analyze(&self, request: &AnalysisRequest) -> EngineResult<AnalysisResult>;
}

/// One document index match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHit {
    pub title: String,
    pub source_id: String,
    pub relevance: f64,
}

/// Searchable document index, local or remote.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Documents matching the keywords, most relevant first.
    async fn search(&self, keywords: &[String]) -> EngineResult<Vec<DocumentHit>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_level_thresholds() {
        assert_eq!(PriorityLevel::for_score(0.7), PriorityLevel::Critical);
        assert_eq!(PriorityLevel::for_score(0.69), PriorityLevel::High);
        assert_eq!(PriorityLevel::for_score(0.5), PriorityLevel::High);
        assert_eq!(PriorityLevel::for_score(0.3), PriorityLevel::Medium);
        assert_eq!(PriorityLevel::for_score(0.29), PriorityLevel::Low);
    }

    #[test]
    fn test_analysis_request_serialization_skips_empty() {
        let json = serde_json::to_value(AnalysisRequest::new("compare regions")).unwrap();
        assert_eq!(json, serde_json::json!({ "query": "compare regions" }));

        let json = serde_json::to_value(
            AnalysisRequest::new("q").with_concepts(vec!["Nairobi".to_string()]),
        )
        .unwrap();
        assert_eq!(json["concepts"][0], "Nairobi");
    }

    #[test]
    fn test_analysis_result_optional_fields() {
        let result: AnalysisResult =
            serde_json::from_str(r#"{"summary":"ok","confidence":0.8}"#).unwrap();
        assert!(result.recommendation.is_none());
        assert!(result.score.is_none());
    }
}
