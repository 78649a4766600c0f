use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use apify_client::ApifyClient;
use clinicpulse_common::{load_config, Config, FileConfig};
use clinicpulse_engine::{ScoringParams, ScoringRun};
use clinicpulse_pipeline::bridge::EngineStore;
use clinicpulse_pipeline::enrichment::EnrichmentRun;
use clinicpulse_pipeline::oracle::ClaudeOracle;
use clinicpulse_pipeline::scrape::ScrapeRun;
use clinicpulse_pipeline::seed::seed_establishments;
use clinicpulse_pipeline::unifier::Unifier;
use clinicpulse_store::Store;

#[derive(Parser)]
#[command(name = "clinicpulse", about = "Clinic review ingestion, enrichment and scoring")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "./config/clinicpulse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upsert establishments from a JSON seed file
    Seed {
        /// Path to the establishments JSON file
        #[arg(long)]
        file: PathBuf,
    },
    /// Scrape reviews for all (or the given) establishments via Apify
    Scrape {
        #[arg(long, value_delimiter = ',')]
        establishments: Option<Vec<Uuid>>,
    },
    /// Map raw reviews onto the common schema
    Unify {
        #[arg(long, value_delimiter = ',')]
        establishments: Option<Vec<Uuid>>,
        /// Reprocess reviews that were already unified
        #[arg(long)]
        force: bool,
        /// Cap the batch at processing.batch_size
        #[arg(long)]
        quick: bool,
    },
    /// Annotate unified reviews through the sentiment oracle
    Enrich {
        #[arg(long, value_delimiter = ',')]
        establishments: Option<Vec<Uuid>>,
        /// Only consider reviews published at or after this RFC3339 timestamp
        #[arg(long)]
        published_after: Option<DateTime<Utc>>,
        /// Reprocess reviews that were already enriched (or marked failed)
        #[arg(long)]
        force: bool,
        /// Cap the batch at processing.batch_size
        #[arg(long)]
        quick: bool,
    },
    /// Recompute establishment scores from the enriched corpus
    Score {
        #[arg(long, value_delimiter = ',')]
        establishments: Option<Vec<Uuid>>,
        /// Only include observations published at or after this RFC3339 timestamp
        #[arg(long)]
        published_after: Option<DateTime<Utc>>,
        /// Cap the batch at processing.batch_size
        #[arg(long)]
        quick: bool,
    },
    /// Print collection counts and coverage
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Invalid configuration is fatal before any work starts.
    let file_config = load_config(&cli.config)?;
    info!(config = %cli.config.display(), "Config loaded");

    let secrets = match &cli.command {
        Command::Scrape { .. } => Config::scrape_from_env(),
        Command::Enrich { .. } => Config::enrich_from_env(),
        _ => Config::store_from_env(),
    };

    let store = Store::connect(&secrets.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    store.migrate().await.context("Failed to run migrations")?;

    match cli.command {
        Command::Seed { file } => {
            let seeded = seed_establishments(&store, &file).await?;
            info!(seeded, "Seed complete");
        }
        Command::Scrape { establishments } => {
            let apify = ApifyClient::new(secrets.apify_token.clone());
            let run = ScrapeRun::new(&store, &apify, file_config.processing.scrape_max_reviews);
            let stats = run
                .run(effective_targets(&establishments, &file_config).as_deref())
                .await?;
            info!("Scrape run finished. {stats}");
        }
        Command::Unify {
            establishments,
            force,
            quick,
        } => {
            let unifier = Unifier::new(&store, file_config.processing.batch_size);
            let stats = unifier
                .run(
                    effective_targets(&establishments, &file_config).as_deref(),
                    force,
                    quick,
                )
                .await?;
            info!("Unify run finished. {stats}");
        }
        Command::Enrich {
            establishments,
            published_after,
            force,
            quick,
        } => {
            let oracle = ClaudeOracle::new(&secrets.anthropic_api_key, &file_config.oracle.model);
            let run = EnrichmentRun::new(&store, &oracle, &file_config);
            let stats = run
                .run(
                    effective_targets(&establishments, &file_config).as_deref(),
                    published_after.or(file_config.published_after),
                    force,
                    quick,
                )
                .await?;
            info!("Enrichment run finished. {stats}");
        }
        Command::Score {
            establishments,
            published_after,
            quick,
        } => {
            let mut params = ScoringParams::from_config(&file_config);
            if let Some(after) = published_after {
                params.published_after = Some(after);
            }
            let engine_store = EngineStore::new(store.clone());
            let summary = ScoringRun::new(params)
                .run(
                    &engine_store,
                    effective_targets(&establishments, &file_config),
                    quick,
                )
                .await?;
            // Partial per-establishment failures are reported, not fatal.
            info!("Scoring run finished. {summary}");
        }
        Command::Stats => {
            let stats = store.stats().await?;
            info!("{stats}");
        }
    }

    Ok(())
}

/// CLI allow-list wins over the configured one; an empty configured list
/// means "all establishments".
fn effective_targets(cli: &Option<Vec<Uuid>>, config: &FileConfig) -> Option<Vec<Uuid>> {
    match cli {
        Some(ids) if !ids.is_empty() => Some(ids.clone()),
        _ if !config.target_establishments.is_empty() => {
            Some(config.target_establishments.clone())
        }
        _ => None,
    }
}
