//! Underwriter CLI
//!
//! Runs policy graphs against application files from the command line.
//! Useful for trying out a policy before it is deployed, and for replaying an
//! application against a fixed set of connector responses.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dotenv::dotenv;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use underwriter::{
    AppConfig, ConnectorGateway, Decision, ExecutionResult, Graph, HttpConnectorGateway,
    StaticConnectorGateway, WorkflowEngine,
};

#[derive(Parser)]
#[command(name = "underwrite")]
#[command(about = "Underwriter CLI - Execute loan policy graphs against applications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, global = true, env = "UNDERWRITER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a policy graph against an application
    Run {
        /// Policy graph JSON file
        #[arg(long)]
        graph: PathBuf,

        /// Application data JSON file
        #[arg(long)]
        input: PathBuf,

        /// Connector responses keyed by connector id; replaces HTTP connectors
        #[arg(long)]
        fixtures: Option<PathBuf>,

        #[arg(long, default_value = "cli-policy")]
        policy_id: String,

        #[arg(long, default_value = "cli-application")]
        application_id: String,

        /// Print the full execution result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that a policy graph loads
    Validate {
        /// Policy graph JSON file
        #[arg(long)]
        graph: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            graph,
            input,
            fixtures,
            policy_id,
            application_id,
            json,
        } => {
            let config = AppConfig::load(cli.config.as_deref())?;
            let graph_json = read_json(&graph)?;
            let input = read_json(&input)?;

            let gateway: Arc<dyn ConnectorGateway> = match fixtures {
                Some(path) => {
                    debug!(path = %path.display(), "Using connector fixtures");
                    Arc::new(StaticConnectorGateway::from_fixtures(&read_json(&path)?)?)
                }
                None => {
                    let gateway = HttpConnectorGateway::new(&config.gateway)?;
                    debug!(connectors = ?gateway.connector_ids(), "Using HTTP connectors");
                    Arc::new(gateway)
                }
            };

            let engine = WorkflowEngine::with_config(gateway, &config.engine);
            let result = engine
                .execute_json(&graph_json, &input, &policy_id, &application_id)
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
        }

        Commands::Validate { graph } => {
            let value = read_json(&graph)?;
            match Graph::from_json(&value) {
                Ok(loaded) => {
                    info!(path = %graph.display(), "Policy graph loaded");
                    println!(
                        "{} {} nodes, {} edges",
                        "✅ valid:".green().bold(),
                        loaded.nodes.len(),
                        loaded.edges.len()
                    );
                    if loaded.start_node().is_none() {
                        println!("{} graph has no start node", "⚠️  warning:".yellow().bold());
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", "❌ invalid:".red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_summary(result: &ExecutionResult) {
    let decision = match result.decision {
        Decision::Approved => result.decision.as_str().green().bold(),
        Decision::Rejected => result.decision.as_str().red().bold(),
        Decision::ManualReview => result.decision.as_str().yellow().bold(),
    };

    println!("Decision: {}", decision);
    println!("Reason:   {}", result.reason);
    println!("Duration: {} ms", result.total_duration_ms);
    println!();
    println!("{}", "Trace".bold());

    for (index, entry) in result.trace.iter().enumerate() {
        let status = if entry.succeeded() {
            "ok".green()
        } else {
            "failed".red()
        };
        println!(
            "  {:>2}. {:<24} {:<12} {:>4} ms  {}",
            index + 1,
            entry.node_id,
            entry.node_kind.as_str(),
            entry.duration_ms,
            status
        );
        if let Some(error) = &entry.error {
            println!("      {}", error.dimmed());
        }
    }
}
