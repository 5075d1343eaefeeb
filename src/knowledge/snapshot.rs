use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConceptNode, Link};

/// Portable copy of a whole knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes, sorted by id.
    pub nodes: Vec<ConceptNode>,
    /// Links, sorted by `(kind, source, target)`.
    pub links: Vec<Link>,
    /// When the snapshot was taken.
    pub exported_at: DateTime<Utc>,
}

impl GraphSnapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(nodes: Vec<ConceptNode>, links: Vec<Link>) -> Self {
        Self {
            nodes,
            links,
            exported_at: Utc::now(),
        }
    }

    /// Whether the snapshot holds nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{LinkKind, NodeKind};
    use crate::truth::TruthValue;

    #[test]
    fn test_snapshot_json_rejects_invalid_truth_value() {
        let json = r#"{
            "nodes": [{"id": "A", "kind": "concept"}],
            "links": [{"kind": "causal", "source_id": "A", "target_id": "B",
                       "truth_value": {"strength": 2.0, "confidence": 0.5}}],
            "exported_at": "2024-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<GraphSnapshot>(json).is_err());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = GraphSnapshot::new(
            vec![ConceptNode::new("A", NodeKind::Region)],
            vec![Link::new(LinkKind::Causal, "A", "B", TruthValue::certain())],
        );
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["nodes"][0]["kind"], "region");
        assert_eq!(value["links"][0]["kind"], "causal");
        assert_eq!(value["links"][0]["truth_value"]["strength"], 1.0);
        assert!(!snapshot.is_empty());
    }
}
