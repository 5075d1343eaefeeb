//! Executes routing decisions and assembles answers.
//!
//! External failures never escape [`HybridResponder::respond`]: analysis
//! outages fall back to the fast calculator with an explicit note, and
//! document search outages leave the source list empty. Validation and
//! not-found errors still reach the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cancel::{guarded, CancellationToken};
use crate::capabilities::{
    extract_metrics, AnalysisRequest, AnalysisResult, Calculation, DocumentHit, DocumentIndex,
    ExternalAnalysis, FastCalculator, Metrics, ANALYSIS_SERVICE, DOCUMENT_SERVICE,
};
use crate::chain::{FinalizedChain, ReasoningChainBuilder};
use crate::config::Config;
use crate::confidence::{ConfidenceScore, ConfidenceScorer};
use crate::error::{EngineError, EngineResult};
use crate::inference::{Comparison, InferenceEngine, Premise};
use crate::orchestrator::{Requirement, RoutingDecision, RoutingTarget};
use crate::truth::TruthValue;

/// Rule name recorded on fallback chain steps.
pub const SERVICE_FALLBACK: &str = "service fallback";

/// Rule name recorded for calculator steps.
pub const FAST_CALCULATION: &str = "fast calculation";

/// Caller-supplied context for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub query: String,
    /// Concept to explain, e.g. a region id.
    #[serde(default)]
    pub concept_id: Option<String>,
    /// Multi-hop target; used together with `concept_id`.
    #[serde(default)]
    pub goal_id: Option<String>,
    /// Exactly two regions enable a comparison.
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub premises: Vec<Premise>,
    /// Calculator input; extracted from the query text when absent.
    #[serde(default)]
    pub metrics: Option<Metrics>,
}

impl QueryContext {
    /// Context holding only the query text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_concept(mut self, concept_id: impl Into<String>) -> Self {
        self.concept_id = Some(concept_id.into());
        self
    }

    pub fn with_goal(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    pub fn with_regions(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.regions = vec![first.into(), second.into()];
        self
    }

    pub fn with_premises(mut self, premises: Vec<Premise>) -> Self {
        self.premises = premises;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn comparison_pair(&self) -> Option<(&str, &str)> {
        match self.regions.as_slice() {
            [a, b] => Some((a.as_str(), b.as_str())),
            _ => None,
        }
    }
}

/// Final answer for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub confidence: ConfidenceScore,
    /// Cited source titles, most relevant first.
    pub sources: Vec<String>,
    pub routing_used: RoutingTarget,
    pub rationale: String,
    /// Whether an external capability failed and a fallback answered instead.
    pub fallback_used: bool,
    /// Reasoning chains that contributed, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<FinalizedChain>,
    pub raw_subsystem_outputs: Map<String, Value>,
}

impl Answer {
    /// The main reasoning chain, if one was built.
    pub fn chain(&self) -> Option<&FinalizedChain> {
        self.chains.last()
    }
}

/// Responder tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponderSettings {
    /// Confidence attached to deterministic calculations.
    pub calculator_confidence: f64,
    pub max_sources: usize,
    pub max_hops: usize,
    /// Timeout for each external call.
    pub timeout: Duration,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            calculator_confidence: 0.95,
            max_sources: 5,
            max_hops: 3,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ResponderSettings {
    /// Settings from application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            calculator_confidence: config.reasoning.calculator_confidence,
            max_sources: config.documents.max_sources,
            max_hops: config.reasoning.max_hops,
            timeout: Duration::from_millis(config.request.timeout_ms),
        }
    }
}

/// One contributing subsystem's rendered output.
#[derive(Debug)]
struct Part {
    text: String,
    confidence: ConfidenceScore,
}

/// Answer under construction.
#[derive(Debug, Default)]
struct Draft {
    notes: Vec<String>,
    parts: Vec<Part>,
    sources: Vec<String>,
    chains: Vec<FinalizedChain>,
    raw: Map<String, Value>,
    fallback_used: bool,
}

impl Draft {
    fn push(&mut self, text: String, confidence: ConfidenceScore) {
        self.parts.push(Part { text, confidence });
    }

    fn record<T: Serialize>(&mut self, key: &str, value: &T) {
        self.raw
            .insert(key.to_string(), serde_json::to_value(value).unwrap_or_default());
    }

    fn finish(self, decision: &RoutingDecision) -> Answer {
        let confidence = self
            .parts
            .iter()
            .map(|p| &p.confidence)
            .fold(None::<ConfidenceScore>, |acc, c| match acc {
                None => Some(c.clone()),
                Some(prev) => Some(ConfidenceScore::min_of(&prev, c)),
            })
            .unwrap_or_else(|| ConfidenceScore::new(0.0, "No subsystem produced an answer"));

        let mut sections: Vec<String> = self.notes.iter().map(|n| format!("Note: {}", n)).collect();
        sections.extend(self.parts.iter().map(|p| p.text.clone()));
        if !self.sources.is_empty() {
            let list: Vec<String> = self
                .sources
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, s))
                .collect();
            sections.push(format!("Sources:\n{}", list.join("\n")));
        }
        if self.parts.len() > 1 {
            sections.push(format!(
                "Combined confidence: {} ({}%)",
                confidence.level.label(),
                confidence.percentage().round()
            ));
        }

        Answer {
            text: sections.join("\n\n"),
            confidence,
            sources: self.sources,
            routing_used: decision.target,
            rationale: decision.rationale.clone(),
            fallback_used: self.fallback_used,
            chains: self.chains,
            raw_subsystem_outputs: self.raw,
        }
    }
}

/// Dispatches a [`RoutingDecision`] to the subsystems it names and merges
/// their outputs.
///
/// Hybrid answers take the minimum of the contributing confidences.
#[derive(Clone)]
pub struct HybridResponder {
    engine: InferenceEngine,
    calculator: Arc<dyn FastCalculator>,
    analysis: Option<Arc<dyn ExternalAnalysis>>,
    documents: Option<Arc<dyn DocumentIndex>>,
    scorer: ConfidenceScorer,
    settings: ResponderSettings,
}

impl std::fmt::Debug for HybridResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridResponder")
            .field("analysis", &self.analysis.is_some())
            .field("documents", &self.documents.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl HybridResponder {
    /// Responder with a calculator and no external services.
    pub fn new(engine: InferenceEngine, calculator: Arc<dyn FastCalculator>) -> Self {
        Self {
            engine,
            calculator,
            analysis: None,
            documents: None,
            scorer: ConfidenceScorer::new(),
            settings: ResponderSettings::default(),
        }
    }

    /// Attach the external analysis service.
    pub fn with_analysis(mut self, analysis: Arc<dyn ExternalAnalysis>) -> Self {
        self.analysis = Some(analysis);
        self
    }

    /// Attach a document index.
    pub fn with_documents(mut self, documents: Arc<dyn DocumentIndex>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn with_settings(mut self, settings: ResponderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ResponderSettings {
        &self.settings
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    /// Answer a classified query.
    pub async fn respond(
        &self,
        decision: &RoutingDecision,
        context: &QueryContext,
        token: &CancellationToken,
    ) -> EngineResult<Answer> {
        let start = Instant::now();
        let mut draft = Draft::default();

        match decision.target {
            RoutingTarget::FastCalculator => {
                self.calculation_part(context, &mut draft)?;
            }
            RoutingTarget::ExternalAnalysis => {
                self.analysis_part(decision, context, token, &mut draft).await?;
                if let Some((a, b)) = context.comparison_pair() {
                    self.comparison_part(a, b, &mut draft)?;
                }
            }
            RoutingTarget::ReasoningEngine => {
                self.reasoning_part(decision, context, token, &mut draft).await?;
            }
            RoutingTarget::HybridFast => {
                self.calculation_part(context, &mut draft)?;
                self.reasoning_part(decision, context, token, &mut draft).await?;
            }
            RoutingTarget::HybridExternal => {
                self.analysis_part(decision, context, token, &mut draft).await?;
                self.reasoning_part(decision, context, token, &mut draft).await?;
            }
        }

        let answer = draft.finish(decision);
        info!(
            routing = %answer.routing_used,
            confidence = answer.confidence.overall_score,
            level = %answer.confidence.level,
            sources = answer.sources.len(),
            fallback = answer.fallback_used,
            latency_ms = start.elapsed().as_millis(),
            "Answer assembled"
        );
        Ok(answer)
    }

    // ========================================================================
    // Calculation
    // ========================================================================

    fn calculation_part(&self, context: &QueryContext, draft: &mut Draft) -> EngineResult<Calculation> {
        let metrics = context
            .metrics
            .clone()
            .unwrap_or_else(|| extract_metrics(&context.query));
        let calc = self.calculator.calculate(&metrics)?;

        draft.push(
            format!(
                "Priority score: {:.2} ({})\nCalculated by {}",
                calc.score, calc.level, calc.engine
            ),
            ConfidenceScore::new(self.settings.calculator_confidence, "Deterministic computation")
                .with_component("calculator", self.settings.calculator_confidence),
        );
        draft.record("metrics", &metrics);
        draft.record("calculation", &calc);
        Ok(calc)
    }

    // ========================================================================
    // External analysis
    // ========================================================================

    async fn analysis_part(
        &self,
        decision: &RoutingDecision,
        context: &QueryContext,
        token: &CancellationToken,
        draft: &mut Draft,
    ) -> EngineResult<()> {
        let mut concepts = context.regions.clone();
        if let Some(id) = &context.concept_id {
            concepts.push(id.clone());
        }
        let request = AnalysisRequest::new(context.query.as_str())
            .with_concepts(concepts)
            .with_metrics(context.metrics.clone().unwrap_or_default())
            .with_keywords(decision.keywords.clone());

        let outcome = match &self.analysis {
            Some(analysis) => {
                guarded(
                    ANALYSIS_SERVICE,
                    self.settings.timeout,
                    token,
                    analysis.analyze(&request),
                )
                .await
            }
            None => Err(EngineError::unavailable(ANALYSIS_SERVICE, "not configured")),
        };

        match outcome {
            Ok(result) => {
                draft.push(
                    render_analysis(&result),
                    ConfidenceScore::new(result.confidence, "Reported by external analysis")
                        .with_component("external_analysis", result.confidence),
                );
                draft.record("analysis", &result);
                Ok(())
            }
            Err(e) if e.is_fallback_trigger() => self.fallback(context, &e, draft),
            Err(e) => Err(e),
        }
    }

    fn fallback(&self, context: &QueryContext, error: &EngineError, draft: &mut Draft) -> EngineResult<()> {
        let reason = match error {
            EngineError::ExternalServiceUnavailable { message, .. } => message.clone(),
            other => other.to_string(),
        };
        warn!(reason = %reason, "External analysis unavailable, falling back to fast calculator");

        draft.fallback_used = true;
        draft.notes.push(format!(
            "External analysis was unavailable ({}); answered with the fast calculator instead.",
            reason
        ));
        draft.record(
            "fallback",
            &serde_json::json!({ "service": ANALYSIS_SERVICE, "reason": reason }),
        );

        let calc = self.calculation_part(context, draft)?;

        let mut builder = ReasoningChainBuilder::start_chain("Answer without external analysis");
        builder.add_step(
            "External analysis requested",
            format!("Service unavailable: {}", reason),
            SERVICE_FALLBACK,
            TruthValue::certain(),
            Vec::new(),
        )?;
        builder.add_step(
            "Fast calculator available",
            format!("Priority score {:.2} ({})", calc.score, calc.level),
            FAST_CALCULATION,
            TruthValue::new(1.0, self.settings.calculator_confidence)?,
            vec![calc.engine.clone()],
        )?;
        let chain = builder.finalize()?;
        draft.push(chain.text_explanation.clone(), chain.confidence.clone());
        draft.chains.push(chain);
        Ok(())
    }

    // ========================================================================
    // Reasoning
    // ========================================================================

    async fn reasoning_part(
        &self,
        decision: &RoutingDecision,
        context: &QueryContext,
        token: &CancellationToken,
        draft: &mut Draft,
    ) -> EngineResult<()> {
        let mut produced = false;

        if let Some((a, b)) = context.comparison_pair() {
            if decision.target != RoutingTarget::ExternalAnalysis {
                self.comparison_part(a, b, draft)?;
                produced = true;
            }
        }

        let (focus, chain) = self.build_chain(decision, context, token)?;
        if let Some(chain) = chain {
            draft.push(chain.text_explanation.clone(), chain.confidence.clone());
            draft.chains.push(chain);
            produced = true;
        }

        let mut keywords = decision.keywords.clone();
        if let Some(focus) = focus {
            if !keywords.iter().any(|k| k.eq_ignore_ascii_case(&focus)) {
                keywords.push(focus);
            }
        }
        self.sources_part(decision, &keywords, token, draft).await;

        if !produced {
            let score = self.scorer.score_evidence(&draft.sources);
            let text = if draft.sources.is_empty() {
                "No reasoning path found for this query.".to_string()
            } else {
                format!(
                    "No reasoning path found; {} relevant source(s) listed below.",
                    draft.sources.len()
                )
            };
            draft.push(
                text,
                ConfidenceScore::new(score, "Evidence-based confidence")
                    .with_component("sources", draft.sources.len() as f64),
            );
        }
        Ok(())
    }

    /// Pick the reasoning mode the context supports. Returns the focus
    /// concept alongside the chain.
    fn build_chain(
        &self,
        decision: &RoutingDecision,
        context: &QueryContext,
        token: &CancellationToken,
    ) -> EngineResult<(Option<String>, Option<FinalizedChain>)> {
        if !context.premises.is_empty() {
            let goal = context.goal_id.as_deref().unwrap_or(&context.query);
            let chain = self.engine.reason_from_premises(&context.premises, goal)?;
            return Ok((None, Some(chain)));
        }

        let (focus, explicit) = match &context.concept_id {
            Some(id) => (id.clone(), true),
            None => match self.resolve_focus(decision)? {
                Some(id) => (id, false),
                None => return Ok((None, None)),
            },
        };

        if let Some(goal) = &context.goal_id {
            let chain = self
                .engine
                .multi_hop(&focus, goal, self.settings.max_hops, token)?;
            if chain.is_none() {
                debug!(start = %focus, goal = %goal, "No multi-hop path");
            }
            return Ok((Some(focus), chain));
        }

        match self
            .engine
            .explain_concept(&focus, self.settings.max_hops, token)
        {
            Ok(chain) => Ok((Some(focus), Some(chain))),
            Err(EngineError::Validation { reason, .. }) if !explicit => {
                debug!(concept = %focus, reason = %reason, "Resolved concept has nothing to explain");
                Ok((Some(focus), None))
            }
            Err(e) => Err(e),
        }
    }

    /// First query keyword that names a node in the store.
    fn resolve_focus(&self, decision: &RoutingDecision) -> EngineResult<Option<String>> {
        for keyword in &decision.keywords {
            if let Some(id) = self.engine.store().lookup(keyword)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn comparison_part(&self, first: &str, second: &str, draft: &mut Draft) -> EngineResult<()> {
        let comparison = self.engine.compare_concepts(first, second)?;
        draft.push(render_comparison(&comparison), comparison.confidence.clone());
        draft.record("comparison", &comparison);
        Ok(())
    }

    async fn sources_part(
        &self,
        decision: &RoutingDecision,
        keywords: &[String],
        token: &CancellationToken,
        draft: &mut Draft,
    ) {
        let Some(documents) = &self.documents else {
            return;
        };
        if keywords.is_empty() {
            return;
        }

        let hits: Vec<DocumentHit> = match guarded(
            DOCUMENT_SERVICE,
            self.settings.timeout,
            token,
            documents.search(keywords),
        )
        .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Document search failed, continuing without sources");
                if decision.requires(Requirement::DocumentSearch) {
                    draft
                        .notes
                        .push("Document search was unavailable; no sources attached.".to_string());
                }
                return;
            }
        };

        for hit in &hits {
            if draft.sources.len() >= self.settings.max_sources {
                break;
            }
            if !draft.sources.contains(&hit.title) {
                draft.sources.push(hit.title.clone());
            }
        }
        draft.record("documents", &hits);
    }
}

fn render_analysis(result: &AnalysisResult) -> String {
    let mut text = format!("Analysis: {}", result.summary);
    if let Some(score) = result.score {
        text.push_str(&format!("\nScore: {:.2}", score));
    }
    if let Some(recommendation) = &result.recommendation {
        text.push_str(&format!("\nRecommendation: {}", recommendation));
    }
    text
}

fn render_comparison(comparison: &Comparison) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut lines = vec![format!(
        "Comparison of {} and {}:",
        comparison.first, comparison.second
    )];
    for diff in &comparison.differences {
        lines.push(format!(
            "  {}: {} {}, {} {}",
            diff.factor,
            comparison.first,
            yes_no(diff.first),
            comparison.second,
            yes_no(diff.second)
        ));
    }
    for similarity in &comparison.similarities {
        lines.push(format!("  {}", similarity));
    }
    lines.push(format!("Recommendation: {}", comparison.recommendation));
    lines.join("\n")
}
