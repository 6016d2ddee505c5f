//! sous-ii - Ingredient Intelligence service
//!
//! Command line front end for the ingredient extraction pipeline. Reads
//! recipe text from an argument or stdin, runs one analysis, and prints
//! the result as JSON. Exit status is 0 for a completed run (even with
//! zero entities) and 1 for a failed one.

use anyhow::Result;
use clap::Parser;
use sous_common::config::ServiceConfig;
use sous_common::events::EventBus;
use sous_ii::catalog::IngredientCatalog;
use sous_ii::config::PipelineConfig;
use sous_ii::knowledge::DishKnowledge;
use sous_ii::pipeline::IngredientPipeline;
use std::io::Read as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Extract ingredient entities from free-form recipe text
#[derive(Parser, Debug)]
#[command(name = "sous-ii", version, about)]
struct Cli {
    /// Text to analyze; read from stdin when omitted
    text: Option<String>,

    /// Dish description guiding inference when extraction is sparse
    #[arg(long)]
    dish: Option<String>,

    /// Service configuration TOML (logging, event capacity)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pipeline tuning TOML (thresholds, timeouts, weights)
    #[arg(long)]
    pipeline_config: Option<PathBuf>,

    /// Ingredient catalog TOML; built-in catalog when omitted
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Dish knowledge TOML; built-in knowledge when omitted
    #[arg(long)]
    knowledge: Option<PathBuf>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let service = match &cli.config {
        Some(path) => sous_common::config::load_toml_config(path)?,
        None => ServiceConfig::default(),
    };

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(service.log_level()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting sous-ii (Ingredient Intelligence)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let pipeline_config = match &cli.pipeline_config {
        Some(path) => PipelineConfig::from_toml_path(path)?,
        None => PipelineConfig::default(),
    };

    let catalog = match &cli.catalog {
        Some(path) => Arc::new(IngredientCatalog::from_toml_path(path)?),
        None => Arc::new(IngredientCatalog::builtin()),
    };
    info!("Catalog loaded: {} ingredients", catalog.len());

    let knowledge = match &cli.knowledge {
        Some(path) => Arc::new(DishKnowledge::from_toml_path(path)?),
        None => Arc::new(DishKnowledge::builtin()),
    };
    info!("Dish knowledge loaded: {} dishes", knowledge.len());

    let event_bus = EventBus::new(service.event_capacity);
    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(
                event = event.event_type(),
                run_id = %event.run_id(),
                "pipeline event"
            );
        }
    });

    let pipeline =
        IngredientPipeline::with_sources(pipeline_config, catalog, knowledge)?.with_events(event_bus);

    let text = match cli.text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let result = pipeline.analyze(&text, cli.dish.as_deref()).await;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", json);

    if result.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
