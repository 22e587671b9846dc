//! ZDWH Ingest - helpdesk to warehouse sync tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use zdwh_common::logging::{init_logging, LogLevel};
use zdwh_ingest::{
    EntityConfig, EntityKind, HelpdeskClient, MemoryWarehouse, PgWarehouse, RunSummary, StagingLoader, SyncConfig,
    SyncPipeline, Warehouse,
};

#[derive(Parser, Debug)]
#[command(name = "zdwh-ingest")]
#[command(author, version, about = "Sync helpdesk reference data into the warehouse")]
struct Cli {
    /// Entity to sync
    #[command(subcommand)]
    entity: Target,

    /// Configuration file (TOML); defaults to ./zdwh.toml when present
    #[arg(short, long, global = true, env = "ZDWH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Stage and reconcile into an in-memory warehouse instead of the real one
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Target {
    /// Sync brands
    Brands,
    /// Sync ticket fields
    TicketFields,
    /// Sync ticket forms and their field links
    TicketForms,
    /// Sync agents and admins
    Users,
    /// Sync every entity in order
    All,
}

impl Target {
    fn kinds(self) -> Vec<EntityKind> {
        match self {
            Target::Brands => vec![EntityKind::Brands],
            Target::TicketFields => vec![EntityKind::TicketFields],
            Target::TicketForms => vec![EntityKind::TicketForms],
            Target::Users => vec![EntityKind::Users],
            Target::All => EntityKind::ALL.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SyncConfig::load_with_log_prefix(cli.config.as_deref(), "zdwh-ingest")
        .context("Failed to load configuration")?;

    // Environment variables take precedence over the file; --verbose over both
    let mut log_config = config.logging.clone().with_env_overrides()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    let _guard = init_logging(&log_config)?;

    let entities = config.entities(&cli.entity.kinds())?;
    let client = HelpdeskClient::new(&config.zendesk)?;
    let loader = StagingLoader::new(config.sync.batch_size)?;

    info!(
        base_url = %config.zendesk.base_url,
        entities = entities.len(),
        dry_run = cli.dry_run,
        "Starting helpdesk sync"
    );

    if cli.dry_run {
        warn!("Dry run: the warehouse will not be touched");
        run(SyncPipeline::new(client, MemoryWarehouse::new(), loader), &entities).await?;
    } else {
        let warehouse = PgWarehouse::connect(&config.warehouse)
            .await
            .context("Failed to connect to warehouse")?;
        run(SyncPipeline::new(client, warehouse, loader), &entities).await?;
    }

    info!("Sync complete");
    Ok(())
}

async fn run<W: Warehouse>(pipeline: SyncPipeline<W>, entities: &[EntityConfig]) -> Result<Vec<RunSummary>> {
    let summaries = pipeline.run_all(entities).await?;

    for summary in &summaries {
        info!(
            entity = %summary.entity,
            run_id = %summary.run_id,
            pages = summary.pages,
            rows_staged = summary.rows_staged,
            association_rows_staged = summary.association_rows_staged,
            summary = %serde_json::to_string(summary)?,
            "Run summary"
        );
    }

    Ok(summaries)
}
