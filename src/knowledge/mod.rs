//! Typed knowledge graph of concept nodes and truth-valued links.
//!
//! This module provides:
//! - [`ConceptNode`] / [`NodeKind`]: graph vertices with scalar attributes
//! - [`Link`] / [`LinkKind`]: directed, typed edges carrying a [`TruthValue`]
//! - [`LinkPattern`]: partial match over `(kind, source, target)`
//! - [`KnowledgeStore`]: the shared, reader-writer locked graph
//! - [`GraphSnapshot`]: export/import form of the whole graph

mod snapshot;
mod store;

pub use snapshot::*;
pub use store::*;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::truth::TruthValue;

/// Kind of a concept node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Abstract concept; the kind given to implicitly created endpoints.
    #[default]
    Concept,
    /// Geographic or administrative region.
    Region,
    /// Policy document or rule.
    Policy,
    /// Citable document or dataset.
    DataSource,
    /// Any other named entity.
    Entity,
}

impl NodeKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Concept => "concept",
            NodeKind::Region => "region",
            NodeKind::Policy => "policy",
            NodeKind::DataSource => "data_source",
            NodeKind::Entity => "entity",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concept" => Ok(NodeKind::Concept),
            "region" => Ok(NodeKind::Region),
            "policy" => Ok(NodeKind::Policy),
            "data_source" | "datasource" => Ok(NodeKind::DataSource),
            "entity" => Ok(NodeKind::Entity),
            _ => Err(format!("Unknown node kind: {}", s)),
        }
    }
}

/// Kind of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Source resembles target.
    Similarity,
    /// Source is a kind of target.
    Inheritance,
    /// Source causes or leads to target.
    Causal,
    /// Source is evaluated as target.
    Evaluation,
    /// Source contains or mentions target.
    Contains,
}

impl LinkKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Similarity => "similarity",
            LinkKind::Inheritance => "inheritance",
            LinkKind::Causal => "causal",
            LinkKind::Evaluation => "evaluation",
            LinkKind::Contains => "contains",
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "similarity" => Ok(LinkKind::Similarity),
            "inheritance" => Ok(LinkKind::Inheritance),
            "causal" => Ok(LinkKind::Causal),
            "evaluation" => Ok(LinkKind::Evaluation),
            "contains" => Ok(LinkKind::Contains),
            _ => Err(format!("Unknown link kind: {}", s)),
        }
    }
}

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Text view, if this is a text attribute.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of int and float attributes.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

/// Attribute map of a node. Order is irrelevant.
pub type Attributes = HashMap<String, AttributeValue>;

/// A named vertex in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    /// Unique identifier within a store.
    pub id: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Scalar attributes.
    #[serde(default)]
    pub attributes: Attributes,
}

impl ConceptNode {
    /// Create a node with no attributes.
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            attributes: Attributes::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// A directed, typed, truth-valued edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    pub source_id: String,
    pub target_id: String,
    pub truth_value: TruthValue,
}

impl Link {
    /// Create a link.
    pub fn new(
        kind: LinkKind,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        truth_value: TruthValue,
    ) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
            target_id: target_id.into(),
            truth_value,
        }
    }
}

/// Partial match over links. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPattern {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<LinkKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

impl LinkPattern {
    /// Pattern matching every link.
    pub fn any() -> Self {
        Self::default()
    }

    /// Constrain the link kind.
    pub fn with_kind(mut self, kind: LinkKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Constrain the source node.
    pub fn from_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Constrain the target node.
    pub fn to_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Reject patterns that constrain an id to an empty string.
    pub fn validate(&self) -> EngineResult<()> {
        for (field, value) in [("source_id", &self.source_id), ("target_id", &self.target_id)] {
            if let Some(id) = value {
                if id.trim().is_empty() {
                    return Err(EngineError::validation(field, "pattern id cannot be empty"));
                }
            }
        }
        Ok(())
    }

    /// Whether `link` satisfies this pattern.
    pub fn matches(&self, link: &Link) -> bool {
        self.kind.map_or(true, |k| k == link.kind)
            && self
                .source_id
                .as_deref()
                .map_or(true, |s| s == link.source_id)
            && self
                .target_id
                .as_deref()
                .map_or(true, |t| t == link.target_id)
    }
}

/// Store size summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub node_count: usize,
    pub link_count: usize,
    pub node_count_by_kind: BTreeMap<NodeKind, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tv(s: f64, c: f64) -> TruthValue {
        TruthValue::new(s, c).unwrap()
    }

    #[test]
    fn test_node_kind_round_trip_str() {
        for kind in [
            NodeKind::Concept,
            NodeKind::Region,
            NodeKind::Policy,
            NodeKind::DataSource,
            NodeKind::Entity,
        ] {
            assert_eq!(kind.as_str().parse::<NodeKind>().unwrap(), kind);
        }
        assert!("planet".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_link_kind_from_str_case_insensitive() {
        assert_eq!("CAUSAL".parse::<LinkKind>().unwrap(), LinkKind::Causal);
        assert_eq!(
            "Inheritance".parse::<LinkKind>().unwrap(),
            LinkKind::Inheritance
        );
        assert_eq!(
            "bogus".parse::<LinkKind>().unwrap_err(),
            "Unknown link kind: bogus"
        );
    }

    #[test]
    fn test_node_kind_serializes_snake_case() {
        let json = serde_json::to_string(&NodeKind::DataSource).unwrap();
        assert_eq!(json, "\"data_source\"");
    }

    #[test]
    fn test_attribute_value_untagged_json() {
        let node: ConceptNode = serde_json::from_str(
            r#"{"id":"R1","kind":"region","attributes":{"name":"Nairobi","poverty_index":0.8,"population":4500000,"coastal":false}}"#,
        )
        .unwrap();
        assert_eq!(node.attribute("name").and_then(|v| v.as_text()), Some("Nairobi"));
        assert_eq!(node.attribute("poverty_index").and_then(|v| v.as_f64()), Some(0.8));
        assert_eq!(
            node.attribute("population"),
            Some(&AttributeValue::Int(4_500_000))
        );
        assert_eq!(node.attribute("coastal"), Some(&AttributeValue::Bool(false)));
    }

    #[test]
    fn test_pattern_matches_subset() {
        let link = Link::new(LinkKind::Causal, "A", "B", tv(0.9, 0.9));

        assert!(LinkPattern::any().matches(&link));
        assert!(LinkPattern::any().with_kind(LinkKind::Causal).matches(&link));
        assert!(!LinkPattern::any().with_kind(LinkKind::Contains).matches(&link));
        assert!(LinkPattern::any().from_source("A").to_target("B").matches(&link));
        assert!(!LinkPattern::any().from_source("B").matches(&link));
        assert!(!LinkPattern::any().to_target("A").matches(&link));
    }

    #[test]
    fn test_pattern_rejects_empty_ids() {
        assert!(LinkPattern::any().from_source("").validate().is_err());
        assert!(LinkPattern::any().to_target("  ").validate().is_err());
        assert!(LinkPattern::any().from_source("A").validate().is_ok());
    }
}
