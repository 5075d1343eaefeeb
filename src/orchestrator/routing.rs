use std::collections::BTreeSet;

use super::{Complexity, Requirement, RoutingTarget};

/// Features a routing rule can inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFeatures {
    pub requirements: BTreeSet<Requirement>,
    pub analyze_requested: bool,
}

impl QueryFeatures {
    fn has(&self, req: Requirement) -> bool {
        self.requirements.contains(&req)
    }

    fn is_exactly(&self, reqs: &[Requirement]) -> bool {
        self.requirements.len() == reqs.len() && reqs.iter().all(|r| self.has(*r))
    }

    fn within(&self, allowed: &[Requirement]) -> bool {
        self.requirements.iter().all(|r| allowed.contains(r))
    }
}

/// One row of the routing table.
pub struct RoutingRule {
    pub name: &'static str,
    pub applies: fn(&QueryFeatures) -> bool,
    pub target: fn(&QueryFeatures) -> RoutingTarget,
}

impl std::fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingRule").field("name", &self.name).finish()
    }
}

/// Routing table in priority order; the first applicable rule wins and
/// the last rule always applies.
pub static ROUTING_TABLE: &[RoutingRule] = &[
    RoutingRule {
        name: "knowledge_heavy",
        applies: |f| {
            f.has(Requirement::DocumentSearch)
                || (f.has(Requirement::Comparison) && f.has(Requirement::Explanation))
                || f.requirements.len() >= 3
        },
        target: |_| RoutingTarget::ReasoningEngine,
    },
    RoutingRule {
        name: "calculation_with_explanation",
        applies: |f| f.is_exactly(&[Requirement::Calculation, Requirement::Explanation]),
        target: |_| RoutingTarget::HybridFast,
    },
    RoutingRule {
        name: "analysis",
        applies: |f| {
            f.is_exactly(&[Requirement::Comparison])
                || (f.analyze_requested
                    && !f.requirements.is_empty()
                    && f.within(&[Requirement::Calculation, Requirement::Explanation]))
        },
        target: |f| {
            if f.has(Requirement::Explanation) {
                RoutingTarget::HybridExternal
            } else {
                RoutingTarget::ExternalAnalysis
            }
        },
    },
    RoutingRule {
        name: "plain_calculation",
        applies: |f| f.is_exactly(&[Requirement::Calculation]),
        target: |_| RoutingTarget::FastCalculator,
    },
    RoutingRule {
        name: "full_reasoning",
        applies: |_| true,
        target: |_| RoutingTarget::ReasoningEngine,
    },
];

/// Pick the first applicable row.
pub fn route(features: &QueryFeatures) -> (&'static RoutingRule, RoutingTarget) {
    for rule in ROUTING_TABLE {
        if (rule.applies)(features) {
            return (rule, (rule.target)(features));
        }
    }
    // The table ends with a catch-all row.
    let fallback = &ROUTING_TABLE[ROUTING_TABLE.len() - 1];
    (fallback, RoutingTarget::ReasoningEngine)
}

/// Complexity bucket from the requirement set.
pub fn complexity(features: &QueryFeatures) -> Complexity {
    let reqs = &features.requirements;
    if reqs.len() >= 3 {
        Complexity::VeryComplex
    } else if features.has(Requirement::DocumentSearch)
        || features.has(Requirement::MultiHop)
        || (features.has(Requirement::Comparison) && features.has(Requirement::Explanation))
    {
        Complexity::Complex
    } else if features.has(Requirement::Explanation)
        || features.has(Requirement::Comparison)
        || reqs.len() == 2
    {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(reqs: &[Requirement], analyze: bool) -> QueryFeatures {
        QueryFeatures {
            requirements: reqs.iter().copied().collect(),
            analyze_requested: analyze,
        }
    }

    fn target(reqs: &[Requirement], analyze: bool) -> RoutingTarget {
        route(&features(reqs, analyze)).1
    }

    use Requirement::*;

    #[test]
    fn test_table_rows_in_priority_order() {
        let names: Vec<&str> = ROUTING_TABLE.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "knowledge_heavy",
                "calculation_with_explanation",
                "analysis",
                "plain_calculation",
                "full_reasoning"
            ]
        );
    }

    #[test]
    fn test_document_search_wins_over_everything() {
        assert_eq!(
            target(&[DocumentSearch, Calculation], true),
            RoutingTarget::ReasoningEngine
        );
    }

    #[test]
    fn test_comparison_with_explanation_is_reasoning() {
        assert_eq!(
            target(&[Comparison, Explanation], false),
            RoutingTarget::ReasoningEngine
        );
    }

    #[test]
    fn test_three_requirements_is_reasoning() {
        assert_eq!(
            target(&[Calculation, Explanation, MultiHop], false),
            RoutingTarget::ReasoningEngine
        );
    }

    #[test]
    fn test_calculation_with_explanation_is_hybrid_fast() {
        assert_eq!(
            target(&[Calculation, Explanation], true),
            RoutingTarget::HybridFast
        );
    }

    #[test]
    fn test_analysis_rows() {
        assert_eq!(target(&[Comparison], false), RoutingTarget::ExternalAnalysis);
        assert_eq!(target(&[Calculation], true), RoutingTarget::ExternalAnalysis);
        assert_eq!(target(&[Explanation], true), RoutingTarget::HybridExternal);
    }

    #[test]
    fn test_plain_calculation_and_fallback() {
        assert_eq!(target(&[Calculation], false), RoutingTarget::FastCalculator);
        assert_eq!(target(&[], false), RoutingTarget::ReasoningEngine);
        assert_eq!(target(&[], true), RoutingTarget::ReasoningEngine);
        assert_eq!(target(&[Explanation], false), RoutingTarget::ReasoningEngine);
    }

    #[test]
    fn test_complexity() {
        assert_eq!(complexity(&features(&[Calculation], false)), Complexity::Simple);
        assert_eq!(complexity(&features(&[], false)), Complexity::Simple);
        assert_eq!(
            complexity(&features(&[Calculation, Explanation], false)),
            Complexity::Moderate
        );
        assert_eq!(complexity(&features(&[DocumentSearch], false)), Complexity::Complex);
        assert_eq!(
            complexity(&features(&[Calculation, Comparison, Explanation], false)),
            Complexity::VeryComplex
        );
    }
}
