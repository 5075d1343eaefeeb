use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::truth::TruthValue;

/// Boolean evidence keyed by condition label, e.g. `"High_Poverty_Region" -> true`.
pub type Evidence = HashMap<String, bool>;

/// A named domain rule: when `condition` holds, conclude `conclusion`
/// with the rule's base truth value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRule {
    pub name: String,
    pub condition: String,
    pub conclusion: String,
    pub truth_value: TruthValue,
    pub description: String,
}

impl DomainRule {
    /// Create a rule.
    pub fn new(
        name: impl Into<String>,
        condition: impl Into<String>,
        conclusion: impl Into<String>,
        truth_value: TruthValue,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
            conclusion: conclusion.into(),
            truth_value,
            description: description.into(),
        }
    }

    /// Whether the evidence holds this rule's condition as true.
    pub fn fires(&self, evidence: &Evidence) -> bool {
        evidence.get(&self.condition).copied().unwrap_or(false)
    }
}

/// A rule that fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_name: String,
    pub condition: String,
    pub conclusion: String,
    pub truth_value: TruthValue,
    pub description: String,
}

impl From<&DomainRule> for RuleOutcome {
    fn from(rule: &DomainRule) -> Self {
        Self {
            rule_name: rule.name.clone(),
            condition: rule.condition.clone(),
            conclusion: rule.conclusion.clone(),
            truth_value: rule.truth_value,
            description: rule.description.clone(),
        }
    }
}

/// Ordered table of domain rules. Lookups are by name; iteration follows
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<DomainRule>,
}

impl RuleRegistry {
    /// A registry with no rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The four allocation rules every engine starts with.
    pub fn builtin() -> Self {
        let rule = |name: &str, condition: &str, conclusion: &str, s: f64, c: f64, description: &str| {
            DomainRule::new(
                name,
                condition,
                conclusion,
                // Constants below are all within [0, 1].
                TruthValue::new(s, c).unwrap_or(TruthValue::certain()),
                description,
            )
        };
        Self {
            rules: vec![
                rule(
                    "poverty_implies_priority",
                    "High_Poverty_Region",
                    "High_Priority",
                    0.85,
                    0.90,
                    "High poverty regions get high priority",
                ),
                rule(
                    "impact_boosts_priority",
                    "High_Impact_Project",
                    "Increased_Priority",
                    0.80,
                    0.85,
                    "High impact projects boost priority",
                ),
                rule(
                    "corruption_reduces_allocation",
                    "High_Corruption_Risk",
                    "Reduced_Allocation",
                    0.75,
                    0.80,
                    "High corruption risk reduces allocation",
                ),
                rule(
                    "deforestation_needs_intervention",
                    "High_Deforestation",
                    "Environmental_Intervention_Needed",
                    0.80,
                    0.85,
                    "High deforestation requires intervention",
                ),
            ],
        }
    }

    /// Register a rule, replacing any rule with the same name in place.
    pub fn add_rule(&mut self, rule: DomainRule) -> EngineResult<()> {
        for (field, value) in [
            ("name", &rule.name),
            ("condition", &rule.condition),
            ("conclusion", &rule.conclusion),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::validation(field, "rule field cannot be empty"));
            }
        }
        rule.truth_value.validate()?;

        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        Ok(())
    }

    /// Look up a rule by name.
    pub fn get(&self, name: &str) -> Option<&DomainRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// All rules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &DomainRule> {
        self.rules.iter()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule is registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules whose conclusion is `conclusion`.
    pub fn concluding(&self, conclusion: &str) -> impl Iterator<Item = &DomainRule> {
        let conclusion = conclusion.to_string();
        self.rules.iter().filter(move |r| r.conclusion == conclusion)
    }

    /// Fire one rule against the evidence.
    ///
    /// `None` when the rule is unknown or its condition is absent or false;
    /// neither case is an error.
    pub fn apply_rule(&self, rule_name: &str, evidence: &Evidence) -> Option<RuleOutcome> {
        let Some(rule) = self.get(rule_name) else {
            warn!(rule = %rule_name, "Rule not found");
            return None;
        };
        rule.fires(evidence).then(|| RuleOutcome::from(rule))
    }

    /// Fire every rule the evidence supports, in registration order.
    pub fn apply_all(&self, evidence: &Evidence) -> Vec<RuleOutcome> {
        self.rules
            .iter()
            .filter(|r| r.fires(evidence))
            .map(RuleOutcome::from)
            .collect()
    }
}
