//! Query classification and routing.
//!
//! Classification is keyword-driven and deterministic: the same query text
//! always yields the same [`RoutingDecision`]. Requirement keywords live in
//! [`keywords`] and the priority-ordered routing table in [`routing`], both
//! as plain data.

pub mod keywords;
pub mod routing;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

use routing::QueryFeatures;

/// Subsystem(s) that should answer a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTarget {
    /// Deterministic priority calculation only.
    FastCalculator,
    /// Remote analysis service, with calculator fallback.
    ExternalAnalysis,
    /// Local inference over the knowledge graph.
    ReasoningEngine,
    /// Calculation plus a reasoning chain.
    HybridFast,
    /// External analysis plus a reasoning chain.
    HybridExternal,
}

impl RoutingTarget {
    /// Every target, in stats order.
    pub const ALL: [RoutingTarget; 5] = [
        RoutingTarget::FastCalculator,
        RoutingTarget::ExternalAnalysis,
        RoutingTarget::ReasoningEngine,
        RoutingTarget::HybridFast,
        RoutingTarget::HybridExternal,
    ];

    /// Get the target name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingTarget::FastCalculator => "fast_calculator",
            RoutingTarget::ExternalAnalysis => "external_analysis",
            RoutingTarget::ReasoningEngine => "reasoning_engine",
            RoutingTarget::HybridFast => "hybrid_fast",
            RoutingTarget::HybridExternal => "hybrid_external",
        }
    }

    /// Whether the target builds a reasoning chain alongside another subsystem.
    pub fn is_hybrid(&self) -> bool {
        matches!(self, RoutingTarget::HybridFast | RoutingTarget::HybridExternal)
    }

    fn index(&self) -> usize {
        match self {
            RoutingTarget::FastCalculator => 0,
            RoutingTarget::ExternalAnalysis => 1,
            RoutingTarget::ReasoningEngine => 2,
            RoutingTarget::HybridFast => 3,
            RoutingTarget::HybridExternal => 4,
        }
    }

    fn base_rationale(&self) -> &'static str {
        match self {
            RoutingTarget::FastCalculator => "Simple calculation: using the fast calculator",
            RoutingTarget::ExternalAnalysis => "Analysis required: using the external analysis service",
            RoutingTarget::ReasoningEngine => "Complex reasoning needed: using the reasoning engine",
            RoutingTarget::HybridFast => {
                "Calculation with explanation: combining the fast calculator with the reasoning engine"
            }
            RoutingTarget::HybridExternal => {
                "Analysis with reasoning: combining external analysis with the reasoning engine"
            }
        }
    }
}

impl std::fmt::Display for RoutingTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RoutingTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutingTarget::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown routing target: {}", s))
    }
}

/// Capability a query needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Calculation,
    Explanation,
    DocumentSearch,
    Comparison,
    MultiHop,
}

impl Requirement {
    /// Human-readable label used in rationales.
    pub fn label(&self) -> &'static str {
        match self {
            Requirement::Calculation => "calculation",
            Requirement::Explanation => "explanation",
            Requirement::DocumentSearch => "document search",
            Requirement::Comparison => "comparison",
            Requirement::MultiHop => "multi-hop reasoning",
        }
    }
}

/// Coarse query complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

/// Where a query goes and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub target: RoutingTarget,
    pub rationale: String,
    pub detected_requirements: BTreeSet<Requirement>,
    pub complexity: Complexity,
    /// Name of the routing rule that matched.
    pub matched_rule: String,
    /// Content keywords extracted from the query.
    pub keywords: Vec<String>,
    pub analyze_requested: bool,
}

impl RoutingDecision {
    /// Whether a requirement was detected.
    pub fn requires(&self, req: Requirement) -> bool {
        self.detected_requirements.contains(&req)
    }
}

/// Snapshot of routing counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub total_queries: u64,
    pub per_target: BTreeMap<RoutingTarget, u64>,
    /// Share of queries per target, in percent. Empty before the first query.
    pub percentages: BTreeMap<RoutingTarget, f64>,
}

/// Keyword-driven query classifier with observability counters.
///
/// Counters never influence decisions.
#[derive(Debug, Default)]
pub struct QueryOrchestrator {
    counts: [AtomicU64; 5],
}

impl QueryOrchestrator {
    /// Create an orchestrator with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify without touching the counters.
    pub fn decide(&self, query: &str) -> RoutingDecision {
        let features = QueryFeatures {
            requirements: keywords::detect_requirements(query),
            analyze_requested: keywords::wants_analysis(query),
        };
        let (rule, target) = routing::route(&features);
        let complexity = routing::complexity(&features);
        let rationale = rationale(target, &features);

        RoutingDecision {
            target,
            rationale,
            detected_requirements: features.requirements,
            complexity,
            matched_rule: rule.name.to_string(),
            keywords: keywords::extract_keywords(query),
            analyze_requested: features.analyze_requested,
        }
    }

    /// Classify a query and record the decision in the counters.
    pub fn classify(&self, query: &str) -> RoutingDecision {
        let decision = self.decide(query);
        self.counts[decision.target.index()].fetch_add(1, Ordering::Relaxed);
        info!(
            routing_target = %decision.target,
            complexity = ?decision.complexity,
            rule = %decision.matched_rule,
            requirements = decision.detected_requirements.len(),
            "Query routed"
        );
        decision
    }

    /// Current counters.
    pub fn stats(&self) -> RoutingStats {
        let per_target: BTreeMap<RoutingTarget, u64> = RoutingTarget::ALL
            .into_iter()
            .map(|t| (t, self.counts[t.index()].load(Ordering::Relaxed)))
            .collect();
        let total_queries: u64 = per_target.values().sum();
        let percentages = if total_queries == 0 {
            BTreeMap::new()
        } else {
            per_target
                .iter()
                .map(|(t, n)| (*t, *n as f64 / total_queries as f64 * 100.0))
                .collect()
        };
        RoutingStats {
            total_queries,
            per_target,
            percentages,
        }
    }

    /// Zero the counters.
    pub fn reset_stats(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }
}

fn rationale(target: RoutingTarget, features: &QueryFeatures) -> String {
    let base = if features.requirements.is_empty() && target == RoutingTarget::ReasoningEngine {
        "No specific requirement detected: using full reasoning rather than a canned answer"
    } else {
        target.base_rationale()
    };
    let mut reasons: Vec<&str> = features.requirements.iter().map(|r| r.label()).collect();
    if features.analyze_requested {
        reasons.push("analysis requested");
    }
    if reasons.is_empty() {
        base.to_string()
    } else {
        format!("{} ({})", base, reasons.join(", "))
    }
}
