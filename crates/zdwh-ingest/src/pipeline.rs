//! Run orchestration
//!
//! One run of one entity:
//!
//! 1. fetch the first page (an auth failure here leaves the warehouse untouched)
//! 2. clear the staging table(s)
//! 3. project and stage every page, following the cursor
//! 4. reconcile the primary table set, then the association set
//!
//! A failure after step 2 clears every staging table the run touched and
//! returns the original error. Reconciliation never sees partial data.

use chrono::Utc;
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::entity::{EntityConfig, EntityKind};
use crate::error::{Result, SyncError};
use crate::fetcher::{HelpdeskClient, Page, PageFetcher};
use crate::projector::project_page;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::staging::StagingLoader;
use crate::warehouse::Warehouse;

/// What one successful run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub entity: EntityKind,
    pub run_id: Uuid,
    pub pages: usize,
    pub rows_staged: usize,
    pub association_rows_staged: usize,
    pub reporting: ReconcileCounts,
    pub association: Option<ReconcileCounts>,
}

/// Rows touched in a reporting table, when the warehouse reports them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<u64>,
}

impl From<ReconcileOutcome> for ReconcileCounts {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            updated: outcome.updated,
            inserted: outcome.inserted,
        }
    }
}

/// Fetch → stage → reconcile driver for a single warehouse
pub struct SyncPipeline<W> {
    client: HelpdeskClient,
    warehouse: W,
    loader: StagingLoader,
}

impl<W: Warehouse> SyncPipeline<W> {
    pub fn new(client: HelpdeskClient, warehouse: W, loader: StagingLoader) -> Self {
        Self {
            client,
            warehouse,
            loader,
        }
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Sync one entity end to end
    pub async fn run(&self, entity: &EntityConfig) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync", entity = %entity.kind, run_id = %run_id);

        async {
            let started = Instant::now();
            info!(backend = self.warehouse.backend(), "Starting sync");

            match self.run_inner(entity, run_id).await {
                Ok(summary) => {
                    info!(
                        pages = summary.pages,
                        rows_staged = summary.rows_staged,
                        association_rows_staged = summary.association_rows_staged,
                        updated = summary.reporting.updated,
                        inserted = summary.reporting.inserted,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Sync complete"
                    );
                    Ok(summary)
                },
                Err(e) => {
                    error!(error = %e, "Sync failed");
                    Err(e)
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Sync every entity in order, stopping at the first failure
    pub async fn run_all(&self, entities: &[EntityConfig]) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::with_capacity(entities.len());
        for entity in entities {
            summaries.push(self.run(entity).await?);
        }
        Ok(summaries)
    }

    async fn run_inner(&self, entity: &EntityConfig, run_id: Uuid) -> Result<RunSummary> {
        let mut fetcher = self.client.pages(entity)?;
        let first = fetcher
            .next_page()
            .await?
            .ok_or_else(|| SyncError::config(format!("No first page for {}", entity.kind)))?;

        let mut primary = Reconciler::begin(&self.warehouse, &entity.tables).await?;
        let mut association = match &entity.association {
            Some(config) => match Reconciler::begin(&self.warehouse, &config.tables).await {
                Ok(reconciler) => Some(reconciler),
                Err(e) => {
                    primary.abort().await;
                    return Err(e);
                },
            },
            None => None,
        };

        let mut summary = RunSummary {
            entity: entity.kind,
            run_id,
            pages: 0,
            rows_staged: 0,
            association_rows_staged: 0,
            reporting: ReconcileCounts::default(),
            association: None,
        };

        let staged = self.stage_all(entity, first, &mut fetcher, &mut summary).await;
        let staged = staged.and_then(|()| {
            primary.mark_staged()?;
            if let Some(reconciler) = association.as_mut() {
                reconciler.mark_staged()?;
            }
            Ok(())
        });
        if let Err(e) = staged {
            abort_all(&mut primary, association.as_mut()).await;
            return Err(e);
        }

        match primary.reconcile().await {
            Ok(outcome) => summary.reporting = outcome.into(),
            Err(e) => {
                abort_all(&mut primary, association.as_mut()).await;
                return Err(e);
            },
        }

        if let Some(reconciler) = association.as_mut() {
            match reconciler.reconcile().await {
                Ok(outcome) => summary.association = Some(outcome.into()),
                Err(e) => {
                    reconciler.abort().await;
                    return Err(e);
                },
            }
        }

        Ok(summary)
    }

    async fn stage_all(
        &self,
        entity: &EntityConfig,
        first: Page,
        fetcher: &mut PageFetcher<'_>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut page = Some(first);
        while let Some(current) = page {
            self.stage_page(entity, &current, summary).await?;
            page = fetcher.next_page().await?;
        }
        Ok(())
    }

    async fn stage_page(&self, entity: &EntityConfig, page: &Page, summary: &mut RunSummary) -> Result<()> {
        // one stamp per page, shared by DwhInsert and DwhUpdate
        let projected = project_page(entity, &page.records, Utc::now())?;

        summary.rows_staged += self
            .loader
            .load(&self.warehouse, &entity.tables, &projected.rows)
            .await?;

        if let Some(association) = &entity.association {
            summary.association_rows_staged += self
                .loader
                .load(&self.warehouse, &association.tables, &projected.associations)
                .await?;
        }

        summary.pages += 1;
        Ok(())
    }
}

async fn abort_all<W>(primary: &mut Reconciler<'_, W>, association: Option<&mut Reconciler<'_, W>>)
where
    W: Warehouse + ?Sized,
{
    primary.abort().await;
    if let Some(reconciler) = association {
        reconciler.abort().await;
    }
}
