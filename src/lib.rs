//! # PLN Orchestrator
//!
//! A cognitive reasoning engine for allocation questions. Facts live in an
//! in-memory knowledge graph whose links carry probabilistic truth values;
//! a PLN-style inference engine derives conclusions from them, and a
//! heuristic orchestrator routes each natural-language query to the
//! cheapest subsystem that can answer it.
//!
//! ## Features
//!
//! - **Truth values**: deduction, abduction, induction, conjunction,
//!   disjunction, negation and generalization over (strength, confidence)
//! - **Knowledge graph**: typed nodes and links, pattern lookup, bounded
//!   neighborhood traversal, snapshot export and import
//! - **Inference**: domain rules, premise chains, multi-hop search, forward
//!   and backward chaining, abduction, concept explanation and comparison
//! - **Reasoning chains**: step-by-step traces with confidence scoring and
//!   a graph view for rendering
//! - **Routing**: keyword requirements mapped to a fast calculator, an
//!   external analysis service, the reasoning engine, or a hybrid
//! - **Hybrid answers**: combined text, minimum-of-parts confidence, cited
//!   sources, and a calculator fallback when the external service fails
//!
//! ## Architecture
//!
//! ```text
//! query → QueryOrchestrator → HybridResponder ─┬─ FastCalculator
//!                                              ├─ ExternalAnalysis (HTTP)
//!                                              ├─ InferenceEngine → KnowledgeStore
//!                                              └─ DocumentIndex
//!                  CognitiveEngine ── Storage (SQLite snapshots, query log)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pln_orchestrator::{CognitiveEngine, KnowledgeStore, LinkKind, TruthValue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = CognitiveEngine::new(Arc::new(KnowledgeStore::new()));
//!     engine.ingest_fact(
//!         LinkKind::Inheritance,
//!         "Nairobi",
//!         "High_Poverty_Region",
//!         TruthValue::new(0.9, 0.9)?,
//!     )?;
//!     let answer = engine.respond_to_query("Why should Nairobi get funding?").await?;
//!     println!("{}", answer.text);
//!     Ok(())
//! }
//! ```

/// Cooperative cancellation and deadline guards.
pub mod cancel;
/// Fast calculator, external analysis and document index capabilities.
pub mod capabilities;
/// Command-line subcommands.
pub mod cli;
/// Reasoning chain construction and rendering.
pub mod chain;
/// Confidence scoring for chains and evidence.
pub mod confidence;
/// Configuration management.
pub mod config;
/// Host-facing engine facade.
pub mod engine;
/// Error types and result aliases.
pub mod error;
/// Domain rules and the inference engine.
pub mod inference;
/// Truth-valued knowledge graph.
pub mod knowledge;
/// Query classification and routing.
pub mod orchestrator;
/// Hybrid answer assembly.
pub mod responder;
/// SQLite persistence for snapshots and the query log.
pub mod storage;
/// Truth values and PLN formulas.
pub mod truth;

pub use cancel::CancellationToken;
pub use config::Config;
pub use engine::CognitiveEngine;
pub use error::{AppError, AppResult, EngineError, EngineResult};
pub use knowledge::{KnowledgeStore, LinkKind, NodeKind};
pub use orchestrator::{QueryOrchestrator, RoutingTarget};
pub use responder::{Answer, HybridResponder, QueryContext};
pub use truth::TruthValue;
