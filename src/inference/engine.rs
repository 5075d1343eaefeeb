use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::rules::{Evidence, RuleOutcome, RuleRegistry};
use crate::cancel::{Cancellable, CancellationToken};
use crate::chain::{FinalizedChain, ReasoningChainBuilder};
use crate::confidence::{ConfidenceScore, ConfidenceScorer};
use crate::error::{EngineError, EngineResult};
use crate::knowledge::{KnowledgeStore, Link, LinkKind, LinkPattern, NodeKind};
use crate::truth::{abduction, conjunction, deduction, TruthValue};

/// Rule name recorded on every multi-hop step.
pub const GRAPH_TRAVERSAL: &str = "graph traversal";

/// Rule name recorded on premise steps.
pub const PLN_DEDUCTION: &str = "PLN deduction";

/// Prior for an observation missing from the known facts.
const DEFAULT_OBSERVATION_TV: (f64, f64) = (1.0, 0.8);

/// Known facts and their truth values, keyed by label.
pub type Facts = BTreeMap<String, TruthValue>;

/// A caller-supplied premise for [`InferenceEngine::reason_from_premises`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Premise {
    pub statement: String,
    pub conclusion: String,
    pub strength: f64,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl Premise {
    /// Create a premise with no evidence.
    pub fn new(
        statement: impl Into<String>,
        conclusion: impl Into<String>,
        strength: f64,
        confidence: f64,
    ) -> Self {
        Self {
            statement: statement.into(),
            conclusion: conclusion.into(),
            strength,
            confidence,
            evidence: Vec::new(),
        }
    }
}

/// A conclusion derived by rule chaining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    pub conclusion: String,
    pub truth_value: TruthValue,
    /// Labels from the first premise to the conclusion.
    pub inference_path: Vec<String>,
    pub premises_used: Vec<String>,
    pub rules_applied: Vec<String>,
    pub depth: usize,
}

/// A classification that differs between two compared concepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonFactor {
    pub factor: String,
    pub first: bool,
    pub second: bool,
}

/// Result of [`InferenceEngine::compare_concepts`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub first: String,
    pub second: String,
    pub differences: Vec<ComparisonFactor>,
    pub similarities: Vec<String>,
    pub recommendation: String,
    pub confidence: ConfidenceScore,
}

/// PLN-style inference over a shared [`KnowledgeStore`].
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    store: Arc<KnowledgeStore>,
    rules: RuleRegistry,
    scorer: ConfidenceScorer,
}

impl InferenceEngine {
    /// Create an engine with the built-in domain rules.
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self::with_rules(store, RuleRegistry::builtin())
    }

    /// Create an engine with a custom rule table.
    pub fn with_rules(store: Arc<KnowledgeStore>, rules: RuleRegistry) -> Self {
        Self {
            store,
            rules,
            scorer: ConfidenceScorer::new(),
        }
    }

    /// The store this engine reads.
    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// The rule table.
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Fire one named rule. See [`RuleRegistry::apply_rule`].
    pub fn apply_rule(&self, rule_name: &str, evidence: &Evidence) -> Option<RuleOutcome> {
        self.rules.apply_rule(rule_name, evidence)
    }

    // ========================================================================
    // Premise chaining
    // ========================================================================

    /// Deduce through `premises` in order, one step per premise.
    ///
    /// Each step records the running truth value. A premise with an
    /// out-of-range strength or confidence ends the walk; the steps
    /// before it still form a valid chain. If not even the first premise
    /// is usable the chain is empty and scoring fails with `Validation`.
    pub fn reason_from_premises(
        &self,
        premises: &[Premise],
        goal: &str,
    ) -> EngineResult<FinalizedChain> {
        let mut builder = ReasoningChainBuilder::start_chain(goal);
        let mut running = TruthValue::certain();

        for (idx, premise) in premises.iter().enumerate() {
            let step_tv = match TruthValue::new(premise.strength, premise.confidence)
                .and_then(|tv| deduction(&running, &tv))
            {
                Ok(tv) => tv,
                Err(e) => {
                    debug!(premise = idx + 1, error = %e, "Stopping at invalid premise");
                    break;
                }
            };
            running = step_tv;
            builder.add_step(
                premise.statement.as_str(),
                premise.conclusion.as_str(),
                PLN_DEDUCTION,
                running,
                premise.evidence.clone(),
            )?;
        }

        builder.finalize()
    }

    // ========================================================================
    // Graph search
    // ========================================================================

    /// Find a path of at most `max_hops` links from `start_id` to `goal_id`.
    ///
    /// Breadth-first, but at each node the outgoing links are explored in
    /// descending strength and the first path reaching the goal wins. This
    /// greedy bias is not guaranteed to find the most confident path: a
    /// weaker first hop leading to a much stronger continuation can lose
    /// to a stronger first hop at the same depth.
    ///
    /// Returns `None` when no path exists, when the start node is unknown,
    /// or when `token` is cancelled mid-search. A `start_id` equal to
    /// `goal_id` also returns `None` without searching, even when a cycle
    /// leads back to the start.
    pub fn multi_hop(
        &self,
        start_id: &str,
        goal_id: &str,
        max_hops: usize,
        token: &CancellationToken,
    ) -> EngineResult<Option<FinalizedChain>> {
        if max_hops == 0 {
            return Err(EngineError::validation("max_hops", "must be at least 1"));
        }
        if start_id == goal_id {
            return Ok(None);
        }

        let mut visited: HashSet<String> = HashSet::from([start_id.to_string()]);
        let mut queue: VecDeque<(String, Vec<Link>)> = VecDeque::new();
        queue.push_back((start_id.to_string(), Vec::new()));

        while let Some((node, path)) = queue.pop_front() {
            if token.is_cancelled() {
                info!(start = %start_id, goal = %goal_id, "Multi-hop search cancelled");
                return Ok(None);
            }
            if path.len() >= max_hops {
                continue;
            }

            let links = self
                .store
                .find_links(&LinkPattern::any().from_source(node))?
                .strongest_first();
            for link in links {
                if !visited.insert(link.target_id.clone()) {
                    continue;
                }
                let reached_goal = link.target_id == goal_id;
                let target = link.target_id.clone();
                let mut next = path.clone();
                next.push(link);
                if reached_goal {
                    return self.path_to_chain(start_id, goal_id, &next).map(Some);
                }
                queue.push_back((target, next));
            }
        }

        debug!(start = %start_id, goal = %goal_id, max_hops, "No path found");
        Ok(None)
    }

    fn path_to_chain(&self, start: &str, goal: &str, path: &[Link]) -> EngineResult<FinalizedChain> {
        let mut builder = ReasoningChainBuilder::start_chain(format!("Infer: {} → {}", start, goal));
        let mut running = TruthValue::certain();
        for link in path {
            running = deduction(&running, &link.truth_value)?;
            builder.add_step(
                link.source_id.as_str(),
                link.target_id.as_str(),
                GRAPH_TRAVERSAL,
                running,
                vec![format!("{} link {} → {}", link.kind, link.source_id, link.target_id)],
            )?;
        }
        builder.finalize()
    }

    // ========================================================================
    // Rule chaining
    // ========================================================================

    /// Fire rules whose condition is a known fact until nothing new is
    /// concluded or `max_steps` rounds have run.
    ///
    /// A conclusion's truth value is the deduction of its condition's value
    /// with the rule's base value. Facts already known are never overwritten.
    pub fn forward_chain(&self, facts: &Facts, max_steps: usize) -> EngineResult<Vec<Inference>> {
        let mut working: Facts = facts.clone();
        let mut paths: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut results = Vec::new();

        for step in 0..max_steps {
            let mut fresh = Vec::new();
            for rule in self.rules.iter() {
                let Some(premise_tv) = working.get(&rule.condition) else {
                    continue;
                };
                if working.contains_key(&rule.conclusion) {
                    continue;
                }
                let tv = deduction(premise_tv, &rule.truth_value)?;
                let mut path = paths
                    .get(&rule.condition)
                    .cloned()
                    .unwrap_or_else(|| vec![rule.condition.clone()]);
                path.push(rule.conclusion.clone());
                fresh.push((rule, tv, path));
            }
            if fresh.is_empty() {
                break;
            }
            for (rule, tv, path) in fresh {
                if working.contains_key(&rule.conclusion) {
                    continue;
                }
                working.insert(rule.conclusion.clone(), tv);
                paths.insert(rule.conclusion.clone(), path.clone());
                results.push(Inference {
                    conclusion: rule.conclusion.clone(),
                    truth_value: tv,
                    inference_path: path,
                    premises_used: vec![rule.condition.clone()],
                    rules_applied: vec![rule.name.clone()],
                    depth: step + 1,
                });
            }
        }

        info!(inferences = results.len(), "Forward chaining complete");
        Ok(results)
    }

    /// Prove `goal` from `facts` by chaining rules backwards, at most
    /// `max_depth` rules deep.
    pub fn backward_chain(
        &self,
        goal: &str,
        facts: &Facts,
        max_depth: usize,
    ) -> EngineResult<Option<Inference>> {
        let mut in_progress = BTreeSet::new();
        self.prove(goal, facts, max_depth, &mut in_progress)
    }

    fn prove(
        &self,
        goal: &str,
        facts: &Facts,
        depth_left: usize,
        in_progress: &mut BTreeSet<String>,
    ) -> EngineResult<Option<Inference>> {
        if let Some(tv) = facts.get(goal) {
            return Ok(Some(Inference {
                conclusion: goal.to_string(),
                truth_value: *tv,
                inference_path: vec![goal.to_string()],
                premises_used: Vec::new(),
                rules_applied: Vec::new(),
                depth: 0,
            }));
        }
        if depth_left == 0 || !in_progress.insert(goal.to_string()) {
            return Ok(None);
        }

        let mut proven = None;
        for rule in self.rules.concluding(goal) {
            if let Some(sub) = self.prove(&rule.condition, facts, depth_left - 1, in_progress)? {
                let mut inference_path = sub.inference_path;
                inference_path.push(goal.to_string());
                let mut premises_used = sub.premises_used;
                premises_used.push(rule.condition.clone());
                let mut rules_applied = sub.rules_applied;
                rules_applied.push(rule.name.clone());
                proven = Some(Inference {
                    conclusion: goal.to_string(),
                    truth_value: deduction(&sub.truth_value, &rule.truth_value)?,
                    inference_path,
                    premises_used,
                    rules_applied,
                    depth: sub.depth + 1,
                });
                break;
            }
        }
        in_progress.remove(goal);
        Ok(proven)
    }

    /// Candidate causes of `observation`, strongest first.
    ///
    /// Every rule concluding the observation proposes its condition as a
    /// cause, discounted by the abduction operator.
    pub fn abduce(&self, observation: &str, facts: &Facts) -> EngineResult<Vec<Inference>> {
        let observed = match facts.get(observation) {
            Some(tv) => *tv,
            None => TruthValue::new(DEFAULT_OBSERVATION_TV.0, DEFAULT_OBSERVATION_TV.1)?,
        };

        let mut explanations = Vec::new();
        for rule in self.rules.concluding(observation) {
            explanations.push(Inference {
                conclusion: rule.condition.clone(),
                truth_value: abduction(&rule.truth_value, &observed)?,
                inference_path: vec![observation.to_string(), rule.condition.clone()],
                premises_used: vec![observation.to_string()],
                rules_applied: vec![rule.name.clone()],
                depth: 1,
            });
        }
        explanations.sort_by(|a, b| {
            b.truth_value
                .strength()
                .total_cmp(&a.truth_value.strength())
        });
        Ok(explanations)
    }

    // ========================================================================
    // Explanations
    // ========================================================================

    /// Inheritance classifications of a concept, with their truth values.
    pub fn classifications(&self, concept_id: &str) -> EngineResult<Facts> {
        Ok(self
            .store
            .find_links(
                &LinkPattern::any()
                    .with_kind(LinkKind::Inheritance)
                    .from_source(concept_id),
            )?
            .into_iter()
            .map(|link| (link.target_id, link.truth_value))
            .collect())
    }

    /// Explain a concept from its classifications.
    ///
    /// Each domain rule whose condition the concept inherits becomes a
    /// step; the step's truth value is the classification deduced with the
    /// rule. When no rule fires, the first multi-hop path to any rule
    /// conclusion is used instead, and failing that the concept's
    /// strongest direct relations.
    pub fn explain_concept(
        &self,
        concept_id: &str,
        max_hops: usize,
        token: &CancellationToken,
    ) -> EngineResult<FinalizedChain> {
        if !self.store.contains(concept_id)? {
            return Err(EngineError::NotFound {
                concept_id: concept_id.to_string(),
            });
        }

        let classes = self.classifications(concept_id)?;
        let evidence: Evidence = classes.keys().map(|k| (k.clone(), true)).collect();
        let fired = self.rules.apply_all(&evidence);

        if !fired.is_empty() {
            let sources = self.sources_mentioning(concept_id)?;
            let mut builder = ReasoningChainBuilder::start_chain(format!("Explain {}", concept_id));
            for outcome in fired {
                let classification = classes
                    .get(&outcome.condition)
                    .copied()
                    .unwrap_or(TruthValue::certain());
                let mut step_evidence = vec![outcome.description.clone()];
                step_evidence.extend(sources.iter().cloned());
                builder.add_step(
                    format!("{} is {}", concept_id, outcome.condition),
                    outcome.conclusion.as_str(),
                    outcome.rule_name.as_str(),
                    deduction(&classification, &outcome.truth_value)?,
                    step_evidence,
                )?;
            }
            return builder.finalize();
        }

        let mut goals: Vec<&str> = Vec::new();
        for rule in self.rules.iter() {
            if !goals.contains(&rule.conclusion.as_str()) {
                goals.push(rule.conclusion.as_str());
            }
        }
        for goal in goals {
            if let Some(chain) = self.multi_hop(concept_id, goal, max_hops, token)? {
                return Ok(chain);
            }
        }

        let direct = self
            .store
            .find_links(&LinkPattern::any().from_source(concept_id))?
            .strongest_first();
        if direct.is_empty() {
            return Err(EngineError::validation(
                "concept_id",
                format!("'{}' has no relations to reason from", concept_id),
            ));
        }
        let mut builder = ReasoningChainBuilder::start_chain(format!("Explain {}", concept_id));
        for link in direct.into_iter().take(3) {
            builder.add_step(
                link.source_id.as_str(),
                link.target_id.as_str(),
                format!("{} relation", link.kind),
                link.truth_value,
                Vec::new(),
            )?;
        }
        builder.finalize()
    }

    /// Titles of data sources that contain the concept.
    fn sources_mentioning(&self, concept_id: &str) -> EngineResult<Vec<String>> {
        let mut titles = Vec::new();
        for link in self.store.find_links(
            &LinkPattern::any()
                .with_kind(LinkKind::Contains)
                .to_target(concept_id),
        )? {
            if let Some(node) = self.store.get_node(&link.source_id)? {
                if node.kind == NodeKind::DataSource {
                    let title = node
                        .attribute("title")
                        .and_then(|v| v.as_text())
                        .map(str::to_string)
                        .unwrap_or(node.id);
                    titles.push(title);
                }
            }
        }
        Ok(titles)
    }

    /// Compare two concepts by their classifications and the rules they trigger.
    pub fn compare_concepts(&self, first: &str, second: &str) -> EngineResult<Comparison> {
        for id in [first, second] {
            if !self.store.contains(id)? {
                return Err(EngineError::NotFound {
                    concept_id: id.to_string(),
                });
            }
        }
        let a = self.classifications(first)?;
        let b = self.classifications(second)?;

        let all: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
        let mut differences = Vec::new();
        let mut similarities = Vec::new();
        for class in all {
            let (in_a, in_b) = (a.contains_key(class), b.contains_key(class));
            if in_a == in_b {
                similarities.push(format!("Both are {}", class));
            } else {
                differences.push(ComparisonFactor {
                    factor: class.clone(),
                    first: in_a,
                    second: in_b,
                });
            }
        }

        let weight = |facts: &Facts| -> f64 {
            let evidence: Evidence = facts.keys().map(|k| (k.clone(), true)).collect();
            self.rules
                .apply_all(&evidence)
                .iter()
                .filter(|o| o.conclusion.contains("Priority"))
                .map(|o| o.truth_value.weighted())
                .sum()
        };
        let (wa, wb) = (weight(&a), weight(&b));
        let recommendation = if (wa - wb).abs() < f64::EPSILON {
            "Both concepts have similar priority characteristics".to_string()
        } else if wa > wb {
            format!("{} should receive higher priority than {}", first, second)
        } else {
            format!("{} should receive higher priority than {}", second, first)
        };

        let combined = a
            .values()
            .chain(b.values())
            .try_fold(None::<TruthValue>, |acc, tv| match acc {
                None => Ok(Some(*tv)),
                Some(prev) => conjunction(&prev, tv).map(Some),
            })?;
        let confidence = match combined {
            Some(tv) => self.scorer.score_from_truth_value(&tv),
            None => ConfidenceScore::new(
                self.scorer.score_evidence::<String>(&[]),
                "No classifications to compare",
            ),
        };

        Ok(Comparison {
            first: first.to_string(),
            second: second.to_string(),
            differences,
            similarities,
            recommendation,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceLevel;
    use crate::knowledge::{AttributeValue, Attributes};
    use crate::inference::DomainRule;

    fn tv(s: f64, c: f64) -> TruthValue {
        TruthValue::new(s, c).unwrap()
    }

    fn engine() -> InferenceEngine {
        InferenceEngine::new(Arc::new(KnowledgeStore::new()))
    }

    fn facts(pairs: &[(&str, f64, f64)]) -> Facts {
        pairs
            .iter()
            .map(|(k, s, c)| (k.to_string(), tv(*s, *c)))
            .collect()
    }

    // ========================================================================
    // Premises
    // ========================================================================

    #[test]
    fn test_reason_from_premises_accumulates() {
        let engine = engine();
        let chain = engine
            .reason_from_premises(
                &[
                    Premise::new("Region is poor", "Region has need", 0.9, 0.8),
                    Premise::new("Region has need", "Region gets priority", 0.8, 0.9),
                ],
                "Priority",
            )
            .unwrap();
        assert_eq!(chain.chain.len(), 2);
        let last = chain.chain.steps[1].truth_value;
        assert!(last.approx_eq(&tv(0.72, 0.72), 1e-9));
        assert_eq!(chain.chain.steps[0].rule_name, PLN_DEDUCTION);
    }

    #[test]
    fn test_reason_from_premises_stops_at_invalid() {
        let engine = engine();
        let chain = engine
            .reason_from_premises(
                &[
                    Premise::new("A", "B", 0.9, 0.9),
                    Premise::new("B", "C", 1.4, 0.9),
                    Premise::new("C", "D", 0.9, 0.9),
                ],
                "D",
            )
            .unwrap();
        assert_eq!(chain.chain.len(), 1);
    }

    #[test]
    fn test_reason_from_premises_all_invalid() {
        let err = engine()
            .reason_from_premises(&[Premise::new("A", "B", -1.0, 0.9)], "B")
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    // ========================================================================
    // Multi-hop
    // ========================================================================

    fn seeded_chain_store() -> Arc<KnowledgeStore> {
        let store = Arc::new(KnowledgeStore::new());
        store
            .add_link(LinkKind::Causal, "Poverty", "Economic_Hardship", tv(0.9, 0.9))
            .unwrap();
        store
            .add_link(LinkKind::Causal, "Economic_Hardship", "Urgent_Need", tv(0.85, 0.8))
            .unwrap();
        store
            .add_link(LinkKind::Causal, "Urgent_Need", "High_Priority", tv(0.9, 0.85))
            .unwrap();
        store
    }

    #[test]
    fn test_multi_hop_three_steps_non_increasing_confidence() {
        let engine = InferenceEngine::new(seeded_chain_store());
        let chain = engine
            .multi_hop("Poverty", "High_Priority", 3, &CancellationToken::new())
            .unwrap()
            .unwrap();

        assert_eq!(chain.chain.len(), 3);
        assert!(chain.chain.steps.iter().all(|s| s.rule_name == GRAPH_TRAVERSAL));
        let confidences: Vec<f64> = chain
            .chain
            .steps
            .iter()
            .map(|s| s.truth_value.confidence())
            .collect();
        assert!(confidences.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(chain.chain.final_conclusion(), Some("High_Priority"));
    }

    #[test]
    fn test_multi_hop_respects_max_hops() {
        let engine = InferenceEngine::new(seeded_chain_store());
        assert!(engine
            .multi_hop("Poverty", "High_Priority", 2, &CancellationToken::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_multi_hop_prefers_stronger_links() {
        let store = Arc::new(KnowledgeStore::new());
        store.add_link(LinkKind::Causal, "S", "Weak", tv(0.2, 0.9)).unwrap();
        store.add_link(LinkKind::Causal, "S", "Strong", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Causal, "Weak", "G", tv(1.0, 1.0)).unwrap();
        store.add_link(LinkKind::Causal, "Strong", "G", tv(0.5, 0.5)).unwrap();

        let engine = InferenceEngine::new(store);
        let chain = engine
            .multi_hop("S", "G", 3, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(chain.chain.steps[0].conclusion, "Strong");
    }

    #[test]
    fn test_multi_hop_handles_cycles_and_missing_start() {
        let store = Arc::new(KnowledgeStore::new());
        store.add_link(LinkKind::Similarity, "A", "B", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Similarity, "B", "A", tv(0.9, 0.9)).unwrap();
        let engine = InferenceEngine::new(store);
        let token = CancellationToken::new();

        assert!(engine.multi_hop("A", "Z", 10, &token).unwrap().is_none());
        assert!(engine.multi_hop("Nowhere", "A", 3, &token).unwrap().is_none());
        assert!(matches!(
            engine.multi_hop("A", "B", 0, &token).unwrap_err(),
            EngineError::Validation { .. }
        ));
    }

    #[test]
    fn test_multi_hop_same_start_and_goal_is_none() {
        let store = Arc::new(KnowledgeStore::new());
        store.add_link(LinkKind::Causal, "A", "B", tv(0.9, 0.9)).unwrap();
        store.add_link(LinkKind::Causal, "B", "A", tv(0.9, 0.9)).unwrap();
        let engine = InferenceEngine::new(store);

        assert!(engine
            .multi_hop("A", "A", 3, &CancellationToken::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_multi_hop_cancelled_returns_none() {
        let engine = InferenceEngine::new(seeded_chain_store());
        let token = CancellationToken::new();
        token.cancel();
        assert!(engine
            .multi_hop("Poverty", "High_Priority", 3, &token)
            .unwrap()
            .is_none());
    }

    // ========================================================================
    // Rule chaining
    // ========================================================================

    #[test]
    fn test_forward_chain() {
        let mut rules = RuleRegistry::builtin();
        rules
            .add_rule(DomainRule::new(
                "priority_unlocks_funding",
                "High_Priority",
                "Funding_Approved",
                tv(0.9, 0.9),
                "",
            ))
            .unwrap();
        let engine = InferenceEngine::with_rules(Arc::new(KnowledgeStore::new()), rules);

        let results = engine
            .forward_chain(&facts(&[("High_Poverty_Region", 1.0, 1.0)]), 10)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].conclusion, "High_Priority");
        assert_eq!(results[0].depth, 1);
        assert_eq!(results[1].conclusion, "Funding_Approved");
        assert_eq!(results[1].depth, 2);
        assert_eq!(
            results[1].inference_path,
            vec!["High_Poverty_Region", "High_Priority", "Funding_Approved"]
        );
        assert!(results[1]
            .truth_value
            .approx_eq(&tv(0.85 * 0.9, 0.9 * 0.9), 1e-9));
    }

    #[test]
    fn test_forward_chain_step_limit() {
        let engine = engine();
        let results = engine
            .forward_chain(&facts(&[("High_Poverty_Region", 1.0, 1.0)]), 0)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_backward_chain() {
        let engine = engine();
        let known = facts(&[("High_Corruption_Risk", 0.9, 0.9)]);

        let proof = engine
            .backward_chain("Reduced_Allocation", &known, 5)
            .unwrap()
            .unwrap();
        assert_eq!(proof.rules_applied, vec!["corruption_reduces_allocation"]);
        assert!(proof.truth_value.approx_eq(&tv(0.9 * 0.75, 0.9 * 0.8), 1e-9));

        assert!(engine
            .backward_chain("High_Priority", &known, 5)
            .unwrap()
            .is_none());
        assert!(engine
            .backward_chain("Reduced_Allocation", &known, 0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_backward_chain_terminates_on_cyclic_rules() {
        let mut rules = RuleRegistry::empty();
        rules
            .add_rule(DomainRule::new("ab", "A", "B", tv(0.9, 0.9), ""))
            .unwrap();
        rules
            .add_rule(DomainRule::new("ba", "B", "A", tv(0.9, 0.9), ""))
            .unwrap();
        let engine = InferenceEngine::with_rules(Arc::new(KnowledgeStore::new()), rules);
        assert!(engine
            .backward_chain("A", &Facts::new(), 100)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_abduce_ranks_by_strength() {
        let mut rules = RuleRegistry::builtin();
        rules
            .add_rule(DomainRule::new(
                "conflict_implies_priority",
                "Active_Conflict",
                "High_Priority",
                tv(0.95, 0.7),
                "",
            ))
            .unwrap();
        let engine = InferenceEngine::with_rules(Arc::new(KnowledgeStore::new()), rules);

        let causes = engine.abduce("High_Priority", &Facts::new()).unwrap();
        let labels: Vec<&str> = causes.iter().map(|c| c.conclusion.as_str()).collect();
        assert_eq!(labels, vec!["Active_Conflict", "High_Poverty_Region"]);
        assert!(causes[1]
            .truth_value
            .approx_eq(&tv(0.85, 0.9 * 0.8 * 0.8), 1e-9));
    }

    // ========================================================================
    // Explanations
    // ========================================================================

    #[test]
    fn test_explain_concept_fires_rules() {
        let store = Arc::new(KnowledgeStore::new());
        store
            .add_node("Nairobi", NodeKind::Region, Attributes::new())
            .unwrap();
        store
            .add_link(LinkKind::Inheritance, "Nairobi", "High_Poverty_Region", TruthValue::certain())
            .unwrap();
        store
            .add_node(
                "census",
                NodeKind::DataSource,
                Attributes::from([("title".to_string(), AttributeValue::from("Census 2019"))]),
            )
            .unwrap();
        store
            .add_link(LinkKind::Contains, "census", "Nairobi", TruthValue::certain())
            .unwrap();

        let engine = InferenceEngine::new(store);
        let chain = engine
            .explain_concept("Nairobi", 3, &CancellationToken::new())
            .unwrap();
        assert_eq!(chain.chain.len(), 1);
        let step = &chain.chain.steps[0];
        assert_eq!(step.conclusion, "High_Priority");
        assert_eq!(step.rule_name, "poverty_implies_priority");
        assert!(step.evidence.contains(&"Census 2019".to_string()));
        assert_eq!(chain.confidence.level, ConfidenceLevel::High);
    }

    #[test]
    fn test_explain_concept_falls_back_to_multi_hop() {
        let engine = InferenceEngine::new(seeded_chain_store());
        let chain = engine
            .explain_concept("Poverty", 3, &CancellationToken::new())
            .unwrap();
        assert_eq!(chain.chain.final_conclusion(), Some("High_Priority"));
        assert!(chain.chain.steps.iter().all(|s| s.rule_name == GRAPH_TRAVERSAL));
    }

    #[test]
    fn test_explain_concept_direct_relations() {
        let store = Arc::new(KnowledgeStore::new());
        store.add_link(LinkKind::Similarity, "Kisumu", "Nairobi", tv(0.6, 0.7)).unwrap();
        let engine = InferenceEngine::new(store);
        let chain = engine
            .explain_concept("Kisumu", 3, &CancellationToken::new())
            .unwrap();
        assert_eq!(chain.chain.steps[0].rule_name, "similarity relation");
    }

    #[test]
    fn test_explain_concept_errors() {
        let store = Arc::new(KnowledgeStore::new());
        store.add_node("Island", NodeKind::Region, Attributes::new()).unwrap();
        let engine = InferenceEngine::new(store);
        let token = CancellationToken::new();

        assert!(matches!(
            engine.explain_concept("Atlantis", 3, &token).unwrap_err(),
            EngineError::NotFound { .. }
        ));
        assert!(matches!(
            engine.explain_concept("Island", 3, &token).unwrap_err(),
            EngineError::Validation { .. }
        ));
    }

    #[test]
    fn test_compare_concepts() {
        let store = Arc::new(KnowledgeStore::new());
        store
            .add_link(LinkKind::Inheritance, "Turkana", "High_Poverty_Region", tv(0.9, 0.9))
            .unwrap();
        store
            .add_link(LinkKind::Inheritance, "Turkana", "Arid_Region", tv(0.9, 0.9))
            .unwrap();
        store
            .add_link(LinkKind::Inheritance, "Nairobi", "Arid_Region", tv(0.8, 0.9))
            .unwrap();
        let engine = InferenceEngine::new(store);

        let comparison = engine.compare_concepts("Nairobi", "Turkana").unwrap();
        assert_eq!(comparison.differences.len(), 1);
        assert_eq!(comparison.differences[0].factor, "High_Poverty_Region");
        assert!(!comparison.differences[0].first);
        assert!(comparison.differences[0].second);
        assert_eq!(comparison.similarities, vec!["Both are Arid_Region"]);
        assert_eq!(
            comparison.recommendation,
            "Turkana should receive higher priority than Nairobi"
        );
        assert!(matches!(
            engine.compare_concepts("Nairobi", "Mars").unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }
}
