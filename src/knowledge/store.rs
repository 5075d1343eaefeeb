use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use super::{
    Attributes, ConceptNode, GraphSnapshot, Link, LinkKind, LinkPattern, NodeKind, StoreStats,
};
use crate::error::{EngineError, EngineResult};
use crate::truth::TruthValue;

/// Identity of a link: at most one link per `(kind, source, target)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct LinkKey {
    kind: LinkKind,
    source: String,
    target: String,
}

impl LinkKey {
    fn to_link(&self, truth_value: TruthValue) -> Link {
        Link::new(self.kind, &self.source, &self.target, truth_value)
    }
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<String, ConceptNode>,
    links: BTreeMap<LinkKey, TruthValue>,
    outgoing: HashMap<String, BTreeSet<LinkKey>>,
    incoming: HashMap<String, BTreeSet<LinkKey>>,
}

impl GraphState {
    fn ensure_node(&mut self, id: &str) {
        if !self.nodes.contains_key(id) {
            self.nodes
                .insert(id.to_string(), ConceptNode::new(id, NodeKind::Concept));
        }
    }

    fn upsert_link(&mut self, key: LinkKey, truth_value: TruthValue) -> bool {
        self.ensure_node(&key.source);
        self.ensure_node(&key.target);
        self.outgoing
            .entry(key.source.clone())
            .or_default()
            .insert(key.clone());
        self.incoming
            .entry(key.target.clone())
            .or_default()
            .insert(key.clone());
        self.links.insert(key, truth_value).is_some()
    }

    fn matching(&self, pattern: &LinkPattern) -> Vec<Link> {
        let candidates: Box<dyn Iterator<Item = &LinkKey> + '_> =
            match (&pattern.source_id, &pattern.target_id) {
                (Some(source), _) => match self.outgoing.get(source) {
                    Some(keys) => Box::new(keys.iter()),
                    None => return Vec::new(),
                },
                (None, Some(target)) => match self.incoming.get(target) {
                    Some(keys) => Box::new(keys.iter()),
                    None => return Vec::new(),
                },
                (None, None) => Box::new(self.links.keys()),
            };

        candidates
            .filter_map(|key| self.links.get(key).map(|tv| key.to_link(*tv)))
            .filter(|link| pattern.matches(link))
            .collect()
    }
}

fn require_id(field: &str, id: &str) -> EngineResult<()> {
    if id.trim().is_empty() {
        return Err(EngineError::validation(field, "id cannot be empty"));
    }
    Ok(())
}

fn poisoned(context: &str) -> EngineError {
    EngineError::InvalidState {
        message: format!("knowledge store lock poisoned during {}", context),
    }
}

/// Links matched by [`KnowledgeStore::find_links`].
///
/// An owned snapshot taken under a single read lock, so iterating it never
/// blocks writers and can be restarted with [`iter`](Self::iter).
#[derive(Debug, Clone, Default)]
pub struct LinkMatches {
    links: Vec<Link>,
}

impl LinkMatches {
    /// Iterate the matches from the start.
    pub fn iter(&self) -> std::slice::Iter<'_, Link> {
        self.links.iter()
    }

    /// Number of matched links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Take the matches, sorted by descending strength (stable on ties).
    pub fn strongest_first(mut self) -> Vec<Link> {
        self.links.sort_by(|a, b| {
            b.truth_value
                .strength()
                .total_cmp(&a.truth_value.strength())
        });
        self.links
    }
}

impl IntoIterator for LinkMatches {
    type Item = Link;
    type IntoIter = std::vec::IntoIter<Link>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.into_iter()
    }
}

impl<'a> IntoIterator for &'a LinkMatches {
    type Item = &'a Link;
    type IntoIter = std::slice::Iter<'a, Link>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.iter()
    }
}

/// In-memory knowledge graph guarded by a reader-writer lock.
///
/// Readers never block each other; a write excludes all readers until it
/// completes. Share it across tasks with `Arc<KnowledgeStore>`.
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    state: RwLock<GraphState>,
}

impl KnowledgeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, context: &str) -> EngineResult<RwLockReadGuard<'_, GraphState>> {
        self.state.read().map_err(|_| poisoned(context))
    }

    fn write(&self, context: &str) -> EngineResult<RwLockWriteGuard<'_, GraphState>> {
        self.state.write().map_err(|_| poisoned(context))
    }

    /// Insert or update a node. Updating replaces kind and attributes and
    /// keeps every link touching the node.
    pub fn add_node(&self, id: &str, kind: NodeKind, attributes: Attributes) -> EngineResult<()> {
        require_id("id", id)?;
        let mut state = self.write("add_node")?;
        let node = state
            .nodes
            .entry(id.to_string())
            .or_insert_with(|| ConceptNode::new(id, kind));
        node.kind = kind;
        node.attributes = attributes;
        debug!(node = %id, kind = %kind, "Node upserted");
        Ok(())
    }

    /// Insert or replace the link `(kind, source, target)`, creating missing
    /// endpoints as bare concept nodes.
    pub fn add_link(
        &self,
        kind: LinkKind,
        source_id: &str,
        target_id: &str,
        truth_value: TruthValue,
    ) -> EngineResult<()> {
        require_id("source_id", source_id)?;
        require_id("target_id", target_id)?;
        truth_value.validate()?;

        let key = LinkKey {
            kind,
            source: source_id.to_string(),
            target: target_id.to_string(),
        };
        let replaced = self.write("add_link")?.upsert_link(key, truth_value);
        debug!(
            kind = %kind,
            source = %source_id,
            target = %target_id,
            truth_value = %truth_value,
            replaced,
            "Link upserted"
        );
        Ok(())
    }

    /// Look up a node by id.
    pub fn get_node(&self, id: &str) -> EngineResult<Option<ConceptNode>> {
        Ok(self.read("get_node")?.nodes.get(id).cloned())
    }

    /// Whether a node with this id exists.
    pub fn contains(&self, id: &str) -> EngineResult<bool> {
        Ok(self.read("contains")?.nodes.contains_key(id))
    }

    /// Resolve a free-text name to a node id.
    ///
    /// Exact ids win; otherwise the match ignores case and treats spaces
    /// and underscores alike. Ties go to the smallest id.
    pub fn lookup(&self, name: &str) -> EngineResult<Option<String>> {
        let state = self.read("lookup")?;
        if state.nodes.contains_key(name) {
            return Ok(Some(name.to_string()));
        }
        let wanted = fold_name(name);
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(state
            .nodes
            .keys()
            .filter(|id| fold_name(id) == wanted)
            .min()
            .cloned())
    }

    /// All nodes of one kind, sorted by id.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> EngineResult<Vec<ConceptNode>> {
        let state = self.read("nodes_of_kind")?;
        let mut nodes: Vec<ConceptNode> = state
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    /// Links matching `pattern`, ordered by `(kind, source, target)`.
    pub fn find_links(&self, pattern: &LinkPattern) -> EngineResult<LinkMatches> {
        pattern.validate()?;
        let links = self.read("find_links")?.matching(pattern);
        Ok(LinkMatches { links })
    }

    /// Nodes reachable from `id` over outgoing links within `depth` hops,
    /// optionally following only one link kind.
    ///
    /// Cycles are safe: each node is visited once, and the start node is
    /// never part of the result. Output is sorted by id.
    pub fn neighbors(
        &self,
        id: &str,
        depth: usize,
        kind_filter: Option<LinkKind>,
    ) -> EngineResult<Vec<ConceptNode>> {
        if depth == 0 {
            return Err(EngineError::validation("depth", "must be at least 1"));
        }
        let state = self.read("neighbors")?;
        if !state.nodes.contains_key(id) {
            return Err(EngineError::NotFound {
                concept_id: id.to_string(),
            });
        }

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        queue.push_back((id, 0));
        let mut found: Vec<ConceptNode> = Vec::new();

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            let Some(keys) = state.outgoing.get(current) else {
                continue;
            };
            for key in keys {
                if kind_filter.is_some_and(|k| k != key.kind) {
                    continue;
                }
                if visited.insert(key.target.as_str()) {
                    if let Some(node) = state.nodes.get(&key.target) {
                        found.push(node.clone());
                    }
                    queue.push_back((key.target.as_str(), hops + 1));
                }
            }
        }

        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    /// Node and link counts.
    pub fn stats(&self) -> EngineResult<StoreStats> {
        let state = self.read("stats")?;
        let mut node_count_by_kind = BTreeMap::new();
        for node in state.nodes.values() {
            *node_count_by_kind.entry(node.kind).or_insert(0) += 1;
        }
        Ok(StoreStats {
            node_count: state.nodes.len(),
            link_count: state.links.len(),
            node_count_by_kind,
        })
    }

    /// Copy the whole graph out.
    pub fn export_snapshot(&self) -> EngineResult<GraphSnapshot> {
        let state = self.read("export_snapshot")?;
        let mut nodes: Vec<ConceptNode> = state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let links = state
            .links
            .iter()
            .map(|(key, tv)| key.to_link(*tv))
            .collect();
        Ok(GraphSnapshot::new(nodes, links))
    }

    /// Replace the whole graph with `snapshot`.
    ///
    /// The snapshot is validated and built aside first, so a bad snapshot
    /// leaves the current contents untouched.
    pub fn import_snapshot(&self, snapshot: GraphSnapshot) -> EngineResult<StoreStats> {
        let mut next = GraphState::default();
        for node in snapshot.nodes {
            require_id("id", &node.id)?;
            next.nodes.insert(node.id.clone(), node);
        }
        for link in snapshot.links {
            require_id("source_id", &link.source_id)?;
            require_id("target_id", &link.target_id)?;
            link.truth_value.validate()?;
            next.upsert_link(
                LinkKey {
                    kind: link.kind,
                    source: link.source_id,
                    target: link.target_id,
                },
                link.truth_value,
            );
        }

        *self.write("import_snapshot")? = next;
        let stats = self.stats()?;
        info!(
            nodes = stats.node_count,
            links = stats.link_count,
            "Knowledge store restored from snapshot"
        );
        Ok(stats)
    }

    /// Drop every node and link.
    pub fn clear(&self) -> EngineResult<()> {
        *self.write("clear")? = GraphState::default();
        Ok(())
    }
}

fn fold_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::AttributeValue;
    use std::sync::Arc;

    fn tv(s: f64, c: f64) -> TruthValue {
        TruthValue::new(s, c).unwrap()
    }

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let store = KnowledgeStore::new();
        let a = attrs(&[("poverty_index", AttributeValue::Float(0.8))]);
        store.add_node("Nairobi", NodeKind::Region, a.clone()).unwrap();
        store.add_node("Nairobi", NodeKind::Region, a).unwrap();
        assert_eq!(store.stats().unwrap().node_count, 1);
    }

    #[test]
    fn test_add_node_overwrites_attributes_keeps_links() {
        let store = KnowledgeStore::new();
        store
            .add_node(
                "Nairobi",
                NodeKind::Region,
                attrs(&[("poverty_index", AttributeValue::Float(0.8))]),
            )
            .unwrap();
        store
            .add_link(LinkKind::Inheritance, "Nairobi", "High_Poverty_Region", tv(0.9, 0.9))
            .unwrap();
        store
            .add_node(
                "Nairobi",
                NodeKind::Region,
                attrs(&[("population", AttributeValue::Int(4_500_000))]),
            )
            .unwrap();

        let node = store.get_node("Nairobi").unwrap().unwrap();
        assert!(node.attribute("poverty_index").is_none());
        assert_eq!(node.attribute("population"), Some(&AttributeValue::Int(4_500_000)));
        assert_eq!(store.stats().unwrap().link_count, 1);
    }

    #[test]
    fn test_add_node_rejects_empty_id() {
        let store = KnowledgeStore::new();
        let err = store.add_node(" ", NodeKind::Concept, Attributes::new()).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn test_add_link_creates_missing_endpoints() {
        let store = KnowledgeStore::new();
        store
            .add_link(LinkKind::Causal, "Poverty", "Hardship", tv(0.8, 0.9))
            .unwrap();

        let source = store.get_node("Poverty").unwrap().unwrap();
        assert_eq!(source.kind, NodeKind::Concept);
        assert!(source.attributes.is_empty());
        assert!(store.contains("Hardship").unwrap());
    }

    #[test]
    fn test_add_link_does_not_change_existing_endpoint() {
        let store = KnowledgeStore::new();
        store
            .add_node("Nairobi", NodeKind::Region, Attributes::new())
            .unwrap();
        store
            .add_link(LinkKind::Inheritance, "Nairobi", "Region", tv(1.0, 1.0))
            .unwrap();
        assert_eq!(
            store.get_node("Nairobi").unwrap().unwrap().kind,
            NodeKind::Region
        );
    }

    #[test]
    fn test_duplicate_link_replaces_truth_value() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.2, 0.2)).unwrap();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.9, 0.7)).unwrap();
        store.add_link(LinkKind::Similarity, "A", "B", tv(0.5, 0.5)).unwrap();

        assert_eq!(store.stats().unwrap().link_count, 2);
        let causal: Vec<Link> = store
            .find_links(&LinkPattern::any().with_kind(LinkKind::Causal))
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(causal.len(), 1);
        assert_eq!(causal[0].truth_value, tv(0.9, 0.7));
    }

    #[test]
    fn test_find_links_by_each_field() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Causal, "A", "C", tv(0.8, 0.9)).unwrap();
        store.add_link(LinkKind::Contains, "D", "B", tv(0.7, 0.9)).unwrap();

        assert_eq!(store.find_links(&LinkPattern::any()).unwrap().len(), 3);
        assert_eq!(
            store
                .find_links(&LinkPattern::any().from_source("A"))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            store
                .find_links(&LinkPattern::any().to_target("B"))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            store
                .find_links(&LinkPattern::any().to_target("B").with_kind(LinkKind::Contains))
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .find_links(&LinkPattern::any().from_source("Nowhere"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_find_links_is_restartable() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Causal, "B", "C", tv(0.9, 0.9)).unwrap();

        let matches = store.find_links(&LinkPattern::any()).unwrap();
        let first: Vec<&Link> = matches.iter().collect();
        let second: Vec<&Link> = matches.iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_find_links_rejects_malformed_pattern() {
        let store = KnowledgeStore::new();
        let err = store
            .find_links(&LinkPattern::any().from_source(""))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn test_strongest_first_ordering() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.3, 0.9)).unwrap();
        store.add_link(LinkKind::Causal, "A", "C", tv(0.9, 0.1)).unwrap();
        store.add_link(LinkKind::Causal, "A", "D", tv(0.6, 0.5)).unwrap();

        let ordered = store
            .find_links(&LinkPattern::any().from_source("A"))
            .unwrap()
            .strongest_first();
        let targets: Vec<&str> = ordered.iter().map(|l| l.target_id.as_str()).collect();
        assert_eq!(targets, vec!["C", "D", "B"]);
    }

    #[test]
    fn test_neighbors_respects_depth() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Causal, "B", "C", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Causal, "C", "D", tv(0.9, 0.9)).unwrap();

        let ids = |nodes: Vec<ConceptNode>| nodes.into_iter().map(|n| n.id).collect::<Vec<_>>();
        assert_eq!(ids(store.neighbors("A", 1, None).unwrap()), vec!["B"]);
        assert_eq!(ids(store.neighbors("A", 2, None).unwrap()), vec!["B", "C"]);
        assert_eq!(
            ids(store.neighbors("A", 10, None).unwrap()),
            vec!["B", "C", "D"]
        );
    }

    #[test]
    fn test_neighbors_terminates_on_cycle() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Similarity, "A", "B", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Similarity, "B", "A", tv(0.9, 0.9)).unwrap();

        let found = store.neighbors("A", 50, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "B");
    }

    #[test]
    fn test_neighbors_kind_filter() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Contains, "A", "C", tv(0.9, 0.9)).unwrap();

        let found = store.neighbors("A", 1, Some(LinkKind::Contains)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "C");
    }

    #[test]
    fn test_neighbors_errors() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.9, 0.9)).unwrap();
        assert!(matches!(
            store.neighbors("A", 0, None).unwrap_err(),
            EngineError::Validation { .. }
        ));
        assert!(matches!(
            store.neighbors("Z", 1, None).unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[test]
    fn test_stats_by_kind() {
        let store = KnowledgeStore::new();
        store.add_node("R1", NodeKind::Region, Attributes::new()).unwrap();
        store.add_node("R2", NodeKind::Region, Attributes::new()).unwrap();
        store.add_node("P1", NodeKind::Policy, Attributes::new()).unwrap();
        store.add_link(LinkKind::Contains, "P1", "Topic", tv(1.0, 1.0)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.link_count, 1);
        assert_eq!(stats.node_count_by_kind.get(&NodeKind::Region), Some(&2));
        assert_eq!(stats.node_count_by_kind.get(&NodeKind::Policy), Some(&1));
        assert_eq!(stats.node_count_by_kind.get(&NodeKind::Concept), Some(&1));
    }

    #[test]
    fn test_snapshot_restores_into_fresh_store() {
        let store = KnowledgeStore::new();
        store.add_node("R1", NodeKind::Region, Attributes::new()).unwrap();
        store.add_link(LinkKind::Causal, "R1", "Need", tv(0.7, 0.6)).unwrap();

        let snapshot = store.export_snapshot().unwrap();
        let restored = KnowledgeStore::new();
        restored.add_node("Stale", NodeKind::Entity, Attributes::new()).unwrap();
        let stats = restored.import_snapshot(snapshot).unwrap();

        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.link_count, 1);
        assert!(!restored.contains("Stale").unwrap());
        assert_eq!(
            restored.get_node("R1").unwrap().unwrap().kind,
            NodeKind::Region
        );
    }

    #[test]
    fn test_bad_snapshot_leaves_store_untouched() {
        let store = KnowledgeStore::new();
        store.add_node("Keep", NodeKind::Entity, Attributes::new()).unwrap();

        let bad = GraphSnapshot::new(
            vec![ConceptNode::new("", NodeKind::Concept)],
            Vec::new(),
        );
        assert!(store.import_snapshot(bad).is_err());
        assert!(store.contains("Keep").unwrap());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let store = Arc::new(KnowledgeStore::new());
        let mut handles = Vec::new();
        for i in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    let source = format!("N{}", i);
                    let target = format!("N{}_{}", i, j);
                    store
                        .add_link(LinkKind::Causal, &source, &target, TruthValue::certain())
                        .unwrap();
                    let _ = store.find_links(&LinkPattern::any().from_source(&source)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.stats().unwrap().link_count, 200);
    }

    #[test]
    fn test_lookup_folds_case_and_spaces() {
        let store = KnowledgeStore::new();
        store
            .add_link(
                LinkKind::Inheritance,
                "Nairobi",
                "High_Poverty_Region",
                TruthValue::certain(),
            )
            .unwrap();
        assert_eq!(store.lookup("Nairobi").unwrap().as_deref(), Some("Nairobi"));
        assert_eq!(store.lookup("nairobi").unwrap().as_deref(), Some("Nairobi"));
        assert_eq!(
            store.lookup("high poverty region").unwrap().as_deref(),
            Some("High_Poverty_Region")
        );
        assert!(store.lookup("Kisumu").unwrap().is_none());
        assert!(store.lookup("  ").unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let store = KnowledgeStore::new();
        store.add_link(LinkKind::Causal, "A", "B", tv(0.9, 0.9)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }
}
