use tracing::{debug, warn};

use super::{Calculation, FastCalculator, Metrics, PriorityLevel};
use crate::error::{CalcError, EngineResult};

pub const POVERTY_INDEX: &str = "poverty_index";
pub const PROJECT_IMPACT: &str = "project_impact";
pub const ENVIRONMENTAL_SCORE: &str = "environmental_score";
pub const CORRUPTION_RISK: &str = "corruption_risk";

/// Metric name, weight, default when absent. Corruption counts inverted.
const WEIGHTS: [(&str, f64, f64); 4] = [
    (POVERTY_INDEX, 0.4, 0.5),
    (PROJECT_IMPACT, 0.3, 0.5),
    (ENVIRONMENTAL_SCORE, 0.2, 0.5),
    (CORRUPTION_RISK, 0.1, 0.3),
];

/// Engine name recorded for the weighted-sum evaluator.
pub const WEIGHTED_SUM: &str = "weighted_sum";

/// Optional symbolic evaluator tried before the weighted sum.
pub trait SymbolicEvaluator: Send + Sync {
    /// Engine name recorded on successful calculations.
    fn name(&self) -> &str;

    /// Evaluate the complete metric set.
    fn evaluate(&self, metrics: &Metrics) -> Result<f64, CalcError>;
}

/// Weighted-sum allocation priority calculator.
///
/// Missing metrics take their defaults; present metrics must lie in
/// [0, 1]. An injected [`SymbolicEvaluator`] gets the first attempt and
/// any `CalcError` from it falls through to the weighted sum.
#[derive(Default)]
pub struct PriorityCalculator {
    symbolic: Option<Box<dyn SymbolicEvaluator>>,
}

impl std::fmt::Debug for PriorityCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityCalculator")
            .field("symbolic", &self.symbolic.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

impl PriorityCalculator {
    /// Calculator using the weighted sum only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try `evaluator` before the weighted sum.
    pub fn with_symbolic(mut self, evaluator: Box<dyn SymbolicEvaluator>) -> Self {
        self.symbolic = Some(evaluator);
        self
    }

    /// Validate and fill in defaults.
    pub fn resolve(&self, metrics: &Metrics) -> Result<Metrics, CalcError> {
        if metrics.is_empty() {
            return Err(CalcError::MissingMetrics);
        }
        for (name, value) in metrics {
            if !(0.0..=1.0).contains(value) {
                return Err(CalcError::MalformedMetric {
                    name: name.clone(),
                    value: *value,
                });
            }
        }
        let mut resolved = metrics.clone();
        for (name, _, default) in WEIGHTS {
            resolved.entry(name.to_string()).or_insert(default);
        }
        Ok(resolved)
    }

    fn symbolic_step(&self, metrics: &Metrics) -> Result<(f64, String), CalcError> {
        let evaluator = self.symbolic.as_ref().ok_or_else(|| CalcError::Symbolic {
            message: "no symbolic evaluator configured".to_string(),
        })?;
        let score = evaluator.evaluate(metrics)?;
        if !(0.0..=1.0).contains(&score) {
            return Err(CalcError::Symbolic {
                message: format!("score {} outside [0, 1]", score),
            });
        }
        Ok((score, evaluator.name().to_string()))
    }
}

/// Weighted sum over resolved metrics.
pub fn weighted_score(metrics: &Metrics) -> f64 {
    WEIGHTS
        .iter()
        .map(|(name, weight, default)| {
            let value = metrics.get(*name).copied().unwrap_or(*default);
            if *name == CORRUPTION_RISK {
                weight * (1.0 - value)
            } else {
                weight * value
            }
        })
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

impl FastCalculator for PriorityCalculator {
    fn calculate(&self, metrics: &Metrics) -> EngineResult<Calculation> {
        let resolved = self.resolve(metrics)?;

        let (score, engine) = match self.symbolic_step(&resolved) {
            Ok(result) => result,
            Err(e) => {
                if self.symbolic.is_some() {
                    warn!(error = %e, "Symbolic evaluation failed, using weighted sum");
                }
                (weighted_score(&resolved), WEIGHTED_SUM.to_string())
            }
        };

        debug!(score, engine = %engine, "Priority calculated");
        Ok(Calculation {
            score,
            level: PriorityLevel::for_score(score),
            engine,
        })
    }
}

/// Words that introduce each metric in free text.
const METRIC_STEMS: [(&str, &str); 4] = [
    ("poverty", POVERTY_INDEX),
    ("impact", PROJECT_IMPACT),
    ("environment", ENVIRONMENTAL_SCORE),
    ("corruption", CORRUPTION_RISK),
];

/// Pull metric values out of a query such as
/// "poverty 0.8, impact 70%, corruption 0.2".
///
/// A metric takes the first number after its keyword and before the next
/// metric keyword. Numbers above 1 or followed by `%` are read as
/// percentages. Non-finite numbers and numbers above 100, such as years,
/// are skipped. Metrics not mentioned get their defaults.
pub fn extract_metrics(query: &str) -> Metrics {
    let lower = query.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':' || c == '=')
        .filter(|t| !t.is_empty())
        .collect();

    let mut metrics: Metrics = WEIGHTS
        .iter()
        .map(|(name, _, default)| (name.to_string(), *default))
        .collect();

    let mut current: Option<&str> = None;
    for token in tokens {
        if let Some((_, name)) = METRIC_STEMS.iter().find(|(stem, _)| token.starts_with(stem)) {
            current = Some(*name);
            continue;
        }
        let Some(name) = current else { continue };
        let is_percent = token.ends_with('%');
        let number = token.trim_end_matches(['%', '.', '?', '!', ')']);
        let Ok(mut value) = number.parse::<f64>() else { continue };
        if !value.is_finite() || value > 100.0 {
            continue;
        }
        if is_percent || value > 1.0 {
            value /= 100.0;
        }
        metrics.insert(name.to_string(), value.clamp(0.0, 1.0));
        current = None;
    }
    metrics
}
