//! ZDWH Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental sync of helpdesk reference data (brands, ticket fields, ticket
//! forms, users) into warehouse reporting tables.
//!
//! # Overview
//!
//! - [`fetcher`]: paginated, authenticated reads of the helpdesk REST API
//! - [`projector`]: reduces raw records to the configured column set
//! - [`staging`]: batched appends into staging tables
//! - [`reconciler`]: update-then-insert merge from staging into reporting
//! - [`pipeline`]: ties the above together for one entity
//!
//! # Example
//!
//! ```no_run
//! use zdwh_ingest::{EntityKind, HelpdeskClient, MemoryWarehouse, StagingLoader, SyncConfig, SyncPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::load(None)?;
//!     let entities = config.entities(&[EntityKind::Brands])?;
//!
//!     let pipeline = SyncPipeline::new(
//!         HelpdeskClient::new(&config.zendesk)?,
//!         MemoryWarehouse::new(),
//!         StagingLoader::new(config.sync.batch_size)?,
//!     );
//!     let summaries = pipeline.run_all(&entities).await?;
//!     println!("{:?}", summaries);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod projector;
pub mod reconciler;
pub mod row;
pub mod staging;
pub mod warehouse;

pub use config::SyncConfig;
pub use entity::{EntityConfig, EntityKind, TableSet};
pub use error::{ProjectionError, Result, SyncError};
pub use fetcher::{HelpdeskClient, Page};
pub use pipeline::{RunSummary, SyncPipeline};
pub use reconciler::{ReconcileState, Reconciler};
pub use row::{Cell, Row};
pub use staging::StagingLoader;
pub use warehouse::{MemoryWarehouse, PgWarehouse, Warehouse};
