//! Reasoning chains: ordered inference steps with text and graph renderings.
//!
//! A [`ReasoningChainBuilder`] owns one chain for the duration of a single
//! request. Steps are appended in order; [`finalize`](ReasoningChainBuilder::finalize)
//! scores the chain, freezes it and hands back a [`FinalizedChain`].

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::confidence::{ConfidenceScore, ConfidenceScorer};
use crate::error::{EngineError, EngineResult};
use crate::truth::TruthValue;

/// One inference step. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub premise: String,
    pub conclusion: String,
    pub rule_name: String,
    pub truth_value: TruthValue,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Ordered record of steps toward a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningChain {
    pub goal: String,
    pub steps: Vec<ReasoningStep>,
    /// Set by finalize.
    pub overall_confidence: Option<ConfidenceScore>,
}

impl ReasoningChain {
    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Truth values of every step, in order.
    pub fn truth_values(&self) -> Vec<TruthValue> {
        self.steps.iter().map(|s| s.truth_value).collect()
    }

    /// Last conclusion reached, if any.
    pub fn final_conclusion(&self) -> Option<&str> {
        self.steps.last().map(|s| s.conclusion.as_str())
    }

    /// `premise → premise → … → goal`.
    pub fn path(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.premise.as_str())
            .chain(std::iter::once(self.goal.as_str()))
            .collect::<Vec<_>>()
            .join(" → ")
    }

    /// Every evidence item across the steps, deduplicated in first-seen order.
    pub fn evidence(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for item in self.steps.iter().flat_map(|s| s.evidence.iter()) {
            if !seen.contains(item) {
                seen.push(item.clone());
            }
        }
        seen
    }
}

/// Visualization node: one per distinct premise or conclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

/// Visualization edge: one per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub rule_name: String,
    pub confidence: f64,
}

/// Output of [`ReasoningChainBuilder::finalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedChain {
    pub chain: ReasoningChain,
    pub text_explanation: String,
    pub confidence: ConfidenceScore,
    pub graph_nodes: Vec<GraphNode>,
    pub graph_edges: Vec<GraphEdge>,
}

/// Builds one chain. Not shared across requests.
#[derive(Debug)]
pub struct ReasoningChainBuilder {
    chain: ReasoningChain,
    scorer: ConfidenceScorer,
    finalized: bool,
}

impl ReasoningChainBuilder {
    /// Open a new chain toward `goal`.
    pub fn start_chain(goal: impl Into<String>) -> Self {
        let goal = goal.into();
        debug!(goal = %goal, "Reasoning chain started");
        Self {
            chain: ReasoningChain {
                goal,
                steps: Vec::new(),
                overall_confidence: None,
            },
            scorer: ConfidenceScorer::new(),
            finalized: false,
        }
    }

    /// Goal of the open chain.
    pub fn goal(&self) -> &str {
        &self.chain.goal
    }

    /// Steps appended so far.
    pub fn steps(&self) -> &[ReasoningStep] {
        &self.chain.steps
    }

    /// Number of steps appended so far.
    pub fn len(&self) -> usize {
        self.chain.steps.len()
    }

    /// Whether no step has been appended.
    pub fn is_empty(&self) -> bool {
        self.chain.steps.is_empty()
    }

    /// Append a step.
    pub fn add_step(
        &mut self,
        premise: impl Into<String>,
        conclusion: impl Into<String>,
        rule_name: impl Into<String>,
        truth_value: TruthValue,
        evidence: Vec<String>,
    ) -> EngineResult<()> {
        if self.finalized {
            return Err(EngineError::InvalidState {
                message: format!("chain '{}' is already finalized", self.chain.goal),
            });
        }
        truth_value.validate()?;

        let step = ReasoningStep {
            premise: premise.into(),
            conclusion: conclusion.into(),
            rule_name: rule_name.into(),
            truth_value,
            evidence,
        };
        debug!(
            step = self.chain.steps.len() + 1,
            premise = %step.premise,
            conclusion = %step.conclusion,
            rule = %step.rule_name,
            "Reasoning step added"
        );
        self.chain.steps.push(step);
        Ok(())
    }

    /// Score and freeze the chain.
    ///
    /// Fails with `InvalidState` on a second call and with `Validation` if
    /// the chain has no steps; in the latter case the chain stays open.
    pub fn finalize(&mut self) -> EngineResult<FinalizedChain> {
        if self.finalized {
            return Err(EngineError::InvalidState {
                message: format!("chain '{}' was finalized twice", self.chain.goal),
            });
        }
        let confidence = self.scorer.score_chain(&self.chain.truth_values())?;
        self.finalized = true;

        let mut chain = self.chain.clone();
        chain.overall_confidence = Some(confidence.clone());
        let text_explanation = render_text(&chain, &confidence);
        let (graph_nodes, graph_edges) = render_graph(&chain);

        debug!(
            goal = %chain.goal,
            steps = chain.len(),
            score = confidence.overall_score,
            level = %confidence.level,
            "Reasoning chain finalized"
        );
        Ok(FinalizedChain {
            chain,
            text_explanation,
            confidence,
            graph_nodes,
            graph_edges,
        })
    }
}

fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

fn render_text(chain: &ReasoningChain, confidence: &ConfidenceScore) -> String {
    let mut out = format!("Reasoning chain: {}\n", chain.goal);
    for (idx, step) in chain.steps.iter().enumerate() {
        let _ = write!(
            out,
            "\nStep {}: {} → (using: {}) → {}, confidence: {}\n",
            idx + 1,
            step.premise,
            step.rule_name,
            step.conclusion,
            percent(step.truth_value.confidence())
        );
        if !step.evidence.is_empty() {
            let _ = writeln!(out, "  Evidence: {}", step.evidence.join(", "));
        }
    }
    let _ = write!(
        out,
        "\nOverall confidence: {} ({})",
        confidence.level.label(),
        percent(confidence.overall_score)
    );
    out
}

fn graph_node_id(
    label: &str,
    ids: &mut HashMap<String, String>,
    nodes: &mut Vec<GraphNode>,
) -> String {
    if let Some(id) = ids.get(label) {
        return id.clone();
    }
    let id = format!("n{}", nodes.len());
    nodes.push(GraphNode {
        id: id.clone(),
        label: label.to_string(),
    });
    ids.insert(label.to_string(), id.clone());
    id
}

fn render_graph(chain: &ReasoningChain) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let mut ids = HashMap::new();
    let mut nodes = Vec::new();
    let mut edges = Vec::with_capacity(chain.steps.len());
    for step in &chain.steps {
        let from = graph_node_id(&step.premise, &mut ids, &mut nodes);
        let to = graph_node_id(&step.conclusion, &mut ids, &mut nodes);
        edges.push(GraphEdge {
            from,
            to,
            rule_name: step.rule_name.clone(),
            confidence: step.truth_value.confidence(),
        });
    }
    (nodes, edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceLevel;
    use pretty_assertions::assert_eq;

    fn tv(s: f64, c: f64) -> TruthValue {
        TruthValue::new(s, c).unwrap()
    }

    #[test]
    fn test_add_step_keeps_order() {
        let mut builder = ReasoningChainBuilder::start_chain("goal");
        builder.add_step("A", "B", "r1", tv(0.9, 0.9), vec![]).unwrap();
        builder.add_step("B", "C", "r2", tv(0.8, 0.8), vec![]).unwrap();
        let conclusions: Vec<&str> = builder.steps().iter().map(|s| s.conclusion.as_str()).collect();
        assert_eq!(conclusions, vec!["B", "C"]);
    }

    #[test]
    fn test_add_step_after_finalize_fails() {
        let mut builder = ReasoningChainBuilder::start_chain("goal");
        builder.add_step("A", "B", "r", tv(0.9, 0.9), vec![]).unwrap();
        builder.finalize().unwrap();

        let err = builder
            .add_step("B", "C", "r", tv(0.9, 0.9), vec![])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[test]
    fn test_double_finalize_fails() {
        let mut builder = ReasoningChainBuilder::start_chain("goal");
        builder.add_step("A", "B", "r", tv(0.9, 0.9), vec![]).unwrap();
        builder.finalize().unwrap();
        assert!(matches!(
            builder.finalize().unwrap_err(),
            EngineError::InvalidState { .. }
        ));
    }

    #[test]
    fn test_finalize_empty_chain_is_validation_and_stays_open() {
        let mut builder = ReasoningChainBuilder::start_chain("goal");
        assert!(matches!(
            builder.finalize().unwrap_err(),
            EngineError::Validation { .. }
        ));
        builder.add_step("A", "B", "r", tv(0.9, 0.9), vec![]).unwrap();
        assert!(builder.finalize().is_ok());
    }

    #[test]
    fn test_text_explanation_format() {
        let mut builder = ReasoningChainBuilder::start_chain("Priority for Nairobi");
        builder
            .add_step(
                "Nairobi is a High_Poverty_Region",
                "High_Priority",
                "poverty_implies_priority",
                tv(0.8, 0.9),
                vec!["Census 2019".to_string()],
            )
            .unwrap();
        let finalized = builder.finalize().unwrap();

        let expected = "Reasoning chain: Priority for Nairobi\n\
            \n\
            Step 1: Nairobi is a High_Poverty_Region → (using: poverty_implies_priority) → High_Priority, confidence: 90%\n  \
            Evidence: Census 2019\n\
            \n\
            Overall confidence: High (72%)";
        assert_eq!(finalized.text_explanation, expected);
        assert_eq!(finalized.confidence.level, ConfidenceLevel::High);
        assert_eq!(
            finalized.chain.overall_confidence.as_ref(),
            Some(&finalized.confidence)
        );
    }

    #[test]
    fn test_text_is_deterministic() {
        let build = || {
            let mut b = ReasoningChainBuilder::start_chain("g");
            b.add_step("A", "B", "r", tv(0.5, 0.5), vec![]).unwrap();
            b.add_step("B", "C", "r", tv(0.6, 0.7), vec![]).unwrap();
            b.finalize().unwrap().text_explanation
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_graph_dedups_nodes_and_has_edge_per_step() {
        let mut builder = ReasoningChainBuilder::start_chain("g");
        builder.add_step("A", "B", "r1", tv(0.9, 0.9), vec![]).unwrap();
        builder.add_step("B", "C", "r2", tv(0.9, 0.8), vec![]).unwrap();
        builder.add_step("C", "A", "r3", tv(0.9, 0.7), vec![]).unwrap();
        let finalized = builder.finalize().unwrap();

        let labels: Vec<&str> = finalized.graph_nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
        assert_eq!(finalized.graph_edges.len(), 3);
        assert_eq!(finalized.graph_edges[2].from, "n2");
        assert_eq!(finalized.graph_edges[2].to, "n0");
        assert_eq!(finalized.graph_edges[1].rule_name, "r2");
    }

    #[test]
    fn test_path_and_evidence() {
        let mut builder = ReasoningChainBuilder::start_chain("C");
        builder
            .add_step("A", "B", "r", tv(0.9, 0.9), vec!["doc1".to_string()])
            .unwrap();
        builder
            .add_step(
                "B",
                "C",
                "r",
                tv(0.9, 0.9),
                vec!["doc1".to_string(), "doc2".to_string()],
            )
            .unwrap();
        let chain = builder.finalize().unwrap().chain;
        assert_eq!(chain.path(), "A → B → C");
        assert_eq!(chain.evidence(), vec!["doc1", "doc2"]);
        assert_eq!(chain.final_conclusion(), Some("C"));
    }
}
