//! Command-line commands.
//!
//! Each command runs against a [`CognitiveEngine`] and returns a
//! [`CliResult`] the binary prints and exits with.

use clap::Subcommand;

use crate::cancel::CancellationToken;
use crate::engine::CognitiveEngine;
use crate::error::EngineResult;
use crate::knowledge::{Attributes, KnowledgeStore, LinkKind, NodeKind};
use crate::responder::QueryContext;
use crate::truth::TruthValue;

/// Engine subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Answer a natural-language query
    Query {
        /// Query text
        text: String,

        /// Concept to focus on
        #[arg(long)]
        concept: Option<String>,

        /// Goal concept for multi-hop reasoning
        #[arg(long)]
        goal: Option<String>,

        /// Two regions to compare
        #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"])]
        compare: Option<Vec<String>>,

        /// Print the full answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Explain a concept from its classifications
    Explain {
        /// Concept id
        concept: String,
    },

    /// Show knowledge graph and routing statistics
    Stats,

    /// Show recently answered queries
    History {
        /// Maximum number of records to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a CLI command.
pub async fn execute_command(command: Commands, engine: &CognitiveEngine) -> CliResult {
    match command {
        Commands::Query {
            text,
            concept,
            goal,
            compare,
            json,
        } => {
            let mut context = QueryContext::new(text);
            if let Some(concept) = concept {
                context = context.with_concept(concept);
            }
            if let Some(goal) = goal {
                context = context.with_goal(goal);
            }
            if let Some([first, second]) = compare.as_deref() {
                context = context.with_regions(first.as_str(), second.as_str());
            }
            execute_query(engine, context, json).await
        }
        Commands::Explain { concept } => execute_explain(engine, &concept),
        Commands::Stats => execute_stats(engine),
        Commands::History { limit } => execute_history(engine, limit).await,
    }
}

async fn execute_query(engine: &CognitiveEngine, context: QueryContext, json: bool) -> CliResult {
    let answer = match engine
        .respond_to_query_with(context, &CancellationToken::new())
        .await
    {
        Ok(answer) => answer,
        Err(e) => return CliResult::error(format!("Query failed: {}", e)),
    };

    if json {
        return match serde_json::to_string_pretty(&answer) {
            Ok(text) => CliResult::success(text),
            Err(e) => CliResult::error(format!("Failed to serialize answer: {}", e)),
        };
    }

    CliResult::success(format!(
        "{}\n\nRouted to: {}\n{}",
        answer.text, answer.routing_used, answer.rationale
    ))
}

fn execute_explain(engine: &CognitiveEngine, concept: &str) -> CliResult {
    match engine.explain(concept) {
        Ok(chain) => CliResult::success(chain.text_explanation),
        Err(e) => CliResult::error(e.to_string()),
    }
}

fn execute_stats(engine: &CognitiveEngine) -> CliResult {
    let graph = match engine.store().stats() {
        Ok(stats) => stats,
        Err(e) => return CliResult::error(e.to_string()),
    };
    let routing = engine.routing_stats();

    let mut output = String::new();
    output.push_str("Knowledge Graph\n");
    output.push_str(&format!(
        "  Nodes: {}\n  Links: {}\n",
        graph.node_count, graph.link_count
    ));
    for (kind, count) in &graph.node_count_by_kind {
        output.push_str(&format!("    {}: {}\n", kind, count));
    }
    output.push_str(&format!("\nRouting ({} queries)\n", routing.total_queries));
    for (target, count) in &routing.per_target {
        let pct = routing.percentages.get(target).copied().unwrap_or(0.0);
        output.push_str(&format!("  {}: {} ({:.1}%)\n", target, count, pct));
    }
    CliResult::success(output)
}

async fn execute_history(engine: &CognitiveEngine, limit: u32) -> CliResult {
    let records = match engine.recent_queries(limit).await {
        Ok(records) => records,
        Err(e) => return CliResult::error(format!("Failed to load history: {}", e)),
    };
    if records.is_empty() {
        return CliResult::success("No queries recorded.");
    }

    let mut output = String::new();
    for record in records {
        output.push_str(&format!(
            "{}  {:<16} {:>5.1}%  {:>5}ms{}  {}\n",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.target.as_str(),
            record.confidence * 100.0,
            record.latency_ms,
            if record.fallback_used { " (fallback)" } else { "" },
            record.query
        ));
    }
    CliResult::success(output)
}

/// Load a small allocation graph: three regions, two projects and two
/// data sources.
pub fn seed_demo_graph(store: &KnowledgeStore) -> EngineResult<()> {
    let tv = TruthValue::new;

    for (id, title, topics) in [
        ("doc_census_2019", "Kenya Census 2019", "poverty, population, households"),
        ("doc_forest_cover", "Forest Cover Assessment", "deforestation, environment, climate"),
    ] {
        let attrs = Attributes::from([
            ("title".to_string(), title.into()),
            ("topics".to_string(), topics.into()),
        ]);
        store.add_node(id, NodeKind::DataSource, attrs)?;
    }

    for (id, population) in [("Nairobi", 4_397_073_i64), ("Kisumu", 1_155_574), ("Turkana", 926_976)] {
        store.add_node(
            id,
            NodeKind::Region,
            Attributes::from([("population".to_string(), population.into())]),
        )?;
    }
    store.add_node("Water_Project", NodeKind::Entity, Attributes::new())?;
    store.add_node("Reforestation_Project", NodeKind::Entity, Attributes::new())?;

    let facts = [
        (LinkKind::Inheritance, "Turkana", "High_Poverty_Region", tv(0.9, 0.9)?),
        (LinkKind::Inheritance, "Kisumu", "High_Poverty_Region", tv(0.6, 0.8)?),
        (LinkKind::Inheritance, "Nairobi", "Urban_Region", tv(0.95, 0.95)?),
        (LinkKind::Inheritance, "Urban_Region", "High_Impact_Project", tv(0.5, 0.6)?),
        (LinkKind::Inheritance, "Water_Project", "High_Impact_Project", tv(0.85, 0.8)?),
        (LinkKind::Inheritance, "Reforestation_Project", "High_Impact_Project", tv(0.7, 0.75)?),
        (LinkKind::Inheritance, "Turkana", "High_Deforestation", tv(0.4, 0.6)?),
        (LinkKind::Similarity, "Kisumu", "Turkana", tv(0.5, 0.6)?),
        (LinkKind::Evaluation, "Water_Project", "Turkana", tv(0.8, 0.7)?),
        (LinkKind::Contains, "doc_census_2019", "Turkana", TruthValue::certain()),
        (LinkKind::Contains, "doc_census_2019", "Kisumu", TruthValue::certain()),
        (LinkKind::Contains, "doc_forest_cover", "Turkana", TruthValue::certain()),
    ];
    for (kind, source, target, truth_value) in facts {
        store.add_link(kind, source, target, truth_value)?;
    }
    Ok(())
}
