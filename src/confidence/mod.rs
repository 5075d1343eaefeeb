//! Confidence scoring for reasoning chains, evidence and truth values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::truth::TruthValue;

/// Score lost per step beyond the first.
pub const STEP_PENALTY: f64 = 0.05;

/// Evidence score with no citations.
pub const EVIDENCE_BASELINE: f64 = 0.3;

/// Evidence score gained per citation.
pub const EVIDENCE_PER_ITEM: f64 = 0.15;

/// Coarse confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryLow => "very_low",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::VeryHigh => "very_high",
        }
    }

    /// Human-readable label, e.g. "Very High".
    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryLow => "Very Low",
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::High => "High",
            ConfidenceLevel::VeryHigh => "Very High",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map a score in `[0, 1]` to its level.
pub fn level_for(score: f64) -> ConfidenceLevel {
    if score >= 0.9 {
        ConfidenceLevel::VeryHigh
    } else if score >= 0.7 {
        ConfidenceLevel::High
    } else if score >= 0.5 {
        ConfidenceLevel::Medium
    } else if score >= 0.3 {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::VeryLow
    }
}

/// A derived confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub overall_score: f64,
    pub level: ConfidenceLevel,
    /// Named inputs that produced the score.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, f64>,
    #[serde(default)]
    pub explanation: String,
}

impl ConfidenceScore {
    /// Build a score, clamping into `[0, 1]` and deriving the level.
    pub fn new(overall_score: f64, explanation: impl Into<String>) -> Self {
        let overall_score = if overall_score.is_finite() {
            overall_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            overall_score,
            level: level_for(overall_score),
            components: BTreeMap::new(),
            explanation: explanation.into(),
        }
    }

    /// Record a named component.
    pub fn with_component(mut self, name: impl Into<String>, value: f64) -> Self {
        self.components.insert(name.into(), value);
        self
    }

    /// Score as a whole percentage.
    pub fn percentage(&self) -> f64 {
        (self.overall_score * 1000.0).round() / 10.0
    }

    /// The lower of two scores.
    pub fn min_of(a: &ConfidenceScore, b: &ConfidenceScore) -> ConfidenceScore {
        if b.overall_score < a.overall_score {
            b.clone()
        } else {
            a.clone()
        }
    }
}

/// An alternative conclusion competing for selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub label: String,
    pub truth_value: TruthValue,
}

/// An alternative with its score and 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAlternative {
    pub rank: usize,
    pub label: String,
    pub confidence: ConfidenceScore,
}

/// Stateless scorer. Cheap to construct per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// Create a scorer.
    pub fn new() -> Self {
        Self
    }

    /// `1 / (1 + 0.05 * max(0, n - 1))`.
    pub fn length_penalty(steps: usize) -> f64 {
        1.0 / (1.0 + STEP_PENALTY * steps.saturating_sub(1) as f64)
    }

    /// Geometric mean of `strength * confidence` over the steps, scaled by
    /// the length penalty. An empty chain cannot be scored.
    pub fn score_chain(&self, truth_values: &[TruthValue]) -> EngineResult<ConfidenceScore> {
        if truth_values.is_empty() {
            return Err(EngineError::validation(
                "chain",
                "a chain needs at least one step to be scored",
            ));
        }
        for tv in truth_values {
            tv.validate()?;
        }

        let n = truth_values.len();
        // Zero in any step makes the geometric mean zero; ln(0) would give -inf.
        let geometric_mean = if truth_values.iter().any(|tv| tv.weighted() == 0.0) {
            0.0
        } else {
            let log_sum: f64 = truth_values.iter().map(|tv| tv.weighted().ln()).sum();
            (log_sum / n as f64).exp()
        };
        let penalty = Self::length_penalty(n);
        let score = ConfidenceScore::new(
            geometric_mean * penalty,
            format!("{}-step reasoning chain", n),
        )
        .with_component("geometric_mean", geometric_mean)
        .with_component("length_penalty", penalty);

        Ok(ConfidenceScore {
            explanation: chain_explanation(score.level, n),
            ..score
        })
    }

    /// `min(1, 0.3 + 0.15 * n)`.
    pub fn score_evidence<S: AsRef<str>>(&self, evidence: &[S]) -> f64 {
        (EVIDENCE_BASELINE + EVIDENCE_PER_ITEM * evidence.len() as f64).min(1.0)
    }

    /// Average of strength and confidence.
    pub fn score_from_truth_value(&self, tv: &TruthValue) -> ConfidenceScore {
        ConfidenceScore::new(
            (tv.strength() + tv.confidence()) / 2.0,
            format!(
                "Truth value: strength={:.2}, confidence={:.2}",
                tv.strength(),
                tv.confidence()
            ),
        )
        .with_component("strength", tv.strength())
        .with_component("confidence", tv.confidence())
    }

    /// Rank alternatives by descending score. Ties keep input order.
    pub fn compare_alternatives(&self, alternatives: &[Alternative]) -> Vec<RankedAlternative> {
        let mut scored: Vec<(String, ConfidenceScore)> = alternatives
            .iter()
            .map(|alt| (alt.label.clone(), self.score_from_truth_value(&alt.truth_value)))
            .collect();
        scored.sort_by(|a, b| b.1.overall_score.total_cmp(&a.1.overall_score));
        scored
            .into_iter()
            .enumerate()
            .map(|(idx, (label, confidence))| RankedAlternative {
                rank: idx + 1,
                label,
                confidence,
            })
            .collect()
    }
}

fn chain_explanation(level: ConfidenceLevel, steps: usize) -> String {
    match level {
        ConfidenceLevel::VeryHigh => format!(
            "Very high confidence based on {}-step reasoning with strong evidence",
            steps
        ),
        ConfidenceLevel::High => format!("High confidence based on {}-step reasoning", steps),
        ConfidenceLevel::Medium => format!("Moderate confidence based on {}-step reasoning", steps),
        ConfidenceLevel::Low => format!(
            "Low confidence: reasoning chain has {} steps which may introduce uncertainty",
            steps
        ),
        ConfidenceLevel::VeryLow => {
            "Very low confidence: insufficient evidence or weak reasoning".to_string()
        }
    }
}
