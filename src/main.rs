use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use compat_engine::compat::{InMemoryCatalog, ItemId, SearchRequest};
use compat_engine::logging::init_tracing;
use compat_engine::{CompatibilityEngine, EngineConfig};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "compat-engine", version, about = "Rule expression sandbox and compatibility checks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an expression and print the security verdict
    Validate {
        expression: String,
    },
    /// Validate and evaluate an expression against JSON bindings
    Eval {
        expression: String,
        /// JSON object of variable bindings
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Check every pair of a set of catalog items
    Check {
        /// JSON catalog with items, rules and experiences
        #[arg(long)]
        catalog: PathBuf,
        #[arg(required = true)]
        ids: Vec<ItemId>,
    },
    /// Find catalog items compatible with a selection
    Search {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long, required = true, num_args = 1..)]
        selected: Vec<ItemId>,
        /// Restrict candidates to these categories
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long, default_value_t = 50)]
        min_score: u32,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run(Cli::parse()).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::from_env();
    match cli.command {
        Commands::Validate { expression } => {
            let engine = CompatibilityEngine::new(config, Arc::new(InMemoryCatalog::default()))?;
            print_json(&engine.validate(&expression))
        }
        Commands::Eval { expression, data } => {
            let bindings: serde_json::Value =
                serde_json::from_str(&data).context("--data is not valid JSON")?;
            let Some(bindings) = bindings.as_object() else {
                bail!("--data must be a JSON object");
            };
            let engine = CompatibilityEngine::new(config, Arc::new(InMemoryCatalog::default()))?;
            print_json(&engine.test_expression(&expression, bindings))
        }
        Commands::Check { catalog, ids } => {
            let engine = CompatibilityEngine::new(config, load_catalog(&catalog)?)?;
            print_json(&engine.check_set(&ids).await?)
        }
        Commands::Search {
            catalog,
            selected,
            categories,
            min_score,
            limit,
        } => {
            let engine = CompatibilityEngine::new(config, load_catalog(&catalog)?)?;
            let request = SearchRequest {
                categories,
                min_score,
                limit,
                ..SearchRequest::new(selected)
            };
            print_json(&engine.search(&request).await?)
        }
    }
}

fn load_catalog(path: &Path) -> Result<Arc<InMemoryCatalog>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let catalog = InMemoryCatalog::from_json(&text)
        .with_context(|| format!("Invalid catalog {}", path.display()))?;
    tracing::info!(
        "[Cli] Loaded {} items, {} rules, {} experiences",
        catalog.item_count(),
        catalog.rule_count(),
        catalog.experience_count()
    );
    Ok(Arc::new(catalog))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
