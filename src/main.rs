use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pln_orchestrator::{
    cli::{execute_command, seed_demo_graph, Commands},
    config::{Config, LogFormat},
    CognitiveEngine,
};

/// Cognitive reasoning engine for allocation questions.
#[derive(Parser, Debug)]
#[command(name = "pln-orchestrator", version, about)]
struct Cli {
    /// Load the demo graph when no snapshot was restored
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "PLN orchestrator starting...");

    let engine = match CognitiveEngine::from_config(&config).await {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "Failed to initialize engine");
            return Err(e.into());
        }
    };

    if cli.demo && engine.store().stats()?.node_count == 0 {
        seed_demo_graph(engine.store())?;
        info!("Demo graph loaded");
    }

    let result = execute_command(cli.command, &engine).await;
    if result.exit_code == 0 {
        println!("{}", result.message);
    } else {
        eprintln!("{}", result.message);
    }

    engine.shutdown().await?;
    if result.exit_code != 0 {
        std::process::exit(result.exit_code);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
