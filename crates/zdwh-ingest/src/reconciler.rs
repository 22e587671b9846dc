//! Stage-then-merge reconciliation
//!
//! Each table set moves through
//!
//! ```text
//! Cleared -> Staged -> Updated -> Inserted -> Cleared
//! ```
//!
//! Update runs before insert so freshly inserted rows are not touched again by
//! the update pass. Rows absent from the latest snapshot stay in reporting.
//! Each step is a single warehouse statement; nothing is retried or rolled
//! back.

use tracing::{info, warn};

use crate::entity::TableSet;
use crate::error::{Result, SyncError};
use crate::warehouse::Warehouse;

/// Position in the reconciliation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Staging is empty
    Cleared,
    /// Staging holds this run's rows
    Staged,
    /// Matching reporting rows were overwritten
    Updated,
    /// New keys were added to reporting
    Inserted,
}

/// Row counts reported by the warehouse for one reconciliation; `None` when
/// the backend does not report them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub updated: Option<u64>,
    pub inserted: Option<u64>,
}

/// Drives one [`TableSet`] through the reconciliation cycle
pub struct Reconciler<'a, W: ?Sized> {
    warehouse: &'a W,
    tables: &'a TableSet,
    state: ReconcileState,
    outcome: ReconcileOutcome,
}

impl<'a, W> Reconciler<'a, W>
where
    W: Warehouse + ?Sized,
{
    /// Clear staging and start in [`ReconcileState::Cleared`]
    ///
    /// The clear also removes whatever an earlier, interrupted run left behind.
    pub async fn begin(warehouse: &'a W, tables: &'a TableSet) -> Result<Self> {
        warehouse.clear_staging(tables).await?;
        info!(table = %tables.staging, "Cleared staging table");

        Ok(Self {
            warehouse,
            tables,
            state: ReconcileState::Cleared,
            outcome: ReconcileOutcome::default(),
        })
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn tables(&self) -> &TableSet {
        self.tables
    }

    fn require(&self, expected: ReconcileState, action: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(SyncError::InvalidTransition {
                table: self.tables.staging.to_string(),
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Record that every page has been loaded into staging
    pub fn mark_staged(&mut self) -> Result<()> {
        self.require(ReconcileState::Cleared, "mark staged")?;
        self.state = ReconcileState::Staged;
        Ok(())
    }

    /// Overwrite reporting rows whose key is in staging
    pub async fn update(&mut self) -> Result<Option<u64>> {
        self.require(ReconcileState::Staged, "update reporting")?;
        let updated = self.warehouse.update_reporting_from_staging(self.tables).await?;
        self.outcome.updated = updated;
        self.state = ReconcileState::Updated;
        info!(table = %self.tables.reporting, updated, "Updated reporting rows from staging");
        Ok(updated)
    }

    /// Insert staged rows whose key is not yet in reporting
    pub async fn insert(&mut self) -> Result<Option<u64>> {
        self.require(ReconcileState::Updated, "insert new rows")?;
        let inserted = self.warehouse.insert_new_from_staging(self.tables).await?;
        self.outcome.inserted = inserted;
        self.state = ReconcileState::Inserted;
        info!(table = %self.tables.reporting, inserted, "Inserted new reporting rows");
        Ok(inserted)
    }

    /// Clear staging after a completed merge
    pub async fn finish(&mut self) -> Result<ReconcileOutcome> {
        self.require(ReconcileState::Inserted, "finish")?;
        self.warehouse.clear_staging(self.tables).await?;
        self.state = ReconcileState::Cleared;
        info!(table = %self.tables.staging, "Cleared staging table");
        Ok(self.outcome)
    }

    /// Update, insert and clear in order
    pub async fn reconcile(&mut self) -> Result<ReconcileOutcome> {
        self.update().await?;
        self.insert().await?;
        self.finish().await
    }

    /// Best-effort clear after a failed run; never masks the original error
    pub async fn abort(&mut self) {
        match self.warehouse.clear_staging(self.tables).await {
            Ok(()) => {
                warn!(
                    table = %self.tables.staging,
                    from = ?self.state,
                    "Run aborted, staging table cleared"
                );
                self.state = ReconcileState::Cleared;
            },
            Err(e) => {
                warn!(
                    table = %self.tables.staging,
                    from = ?self.state,
                    error = %e,
                    "Run aborted and staging could not be cleared; the next run's pre-clear will reset it"
                );
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entity::{EntityConfig, EntityKind};
    use crate::warehouse::{MemoryWarehouse, WarehouseCall};

    fn tables() -> TableSet {
        EntityConfig::build(EntityKind::Brands, "dbo", &[]).unwrap().tables
    }

    #[tokio::test]
    async fn test_full_cycle_order() {
        let wh = MemoryWarehouse::new();
        let tables = tables();

        let mut reconciler = Reconciler::begin(&wh, &tables).await.unwrap();
        assert_eq!(reconciler.state(), ReconcileState::Cleared);
        reconciler.mark_staged().unwrap();
        reconciler.reconcile().await.unwrap();
        assert_eq!(reconciler.state(), ReconcileState::Cleared);

        let staging = "dbo.StageZDBrands".to_string();
        assert_eq!(
            wh.calls(),
            vec![
                WarehouseCall::ClearStaging(staging.clone()),
                WarehouseCall::UpdateReporting(staging.clone()),
                WarehouseCall::InsertNew(staging.clone()),
                WarehouseCall::ClearStaging(staging),
            ]
        );
    }

    #[tokio::test]
    async fn test_insert_before_update_rejected() {
        let wh = MemoryWarehouse::new();
        let tables = tables();

        let mut reconciler = Reconciler::begin(&wh, &tables).await.unwrap();
        reconciler.mark_staged().unwrap();
        let err = reconciler.insert().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidTransition {
                state: ReconcileState::Staged,
                ..
            }
        ));
        // nothing reached the warehouse beyond the pre-clear
        assert_eq!(wh.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_staged() {
        let wh = MemoryWarehouse::new();
        let tables = tables();

        let mut reconciler = Reconciler::begin(&wh, &tables).await.unwrap();
        assert!(reconciler.update().await.is_err());
        reconciler.mark_staged().unwrap();
        assert!(reconciler.mark_staged().is_err());
    }

    #[tokio::test]
    async fn test_abort_returns_to_cleared() {
        let wh = MemoryWarehouse::new();
        let tables = tables();

        let mut reconciler = Reconciler::begin(&wh, &tables).await.unwrap();
        reconciler.mark_staged().unwrap();
        reconciler.update().await.unwrap();
        reconciler.abort().await;
        assert_eq!(reconciler.state(), ReconcileState::Cleared);
        assert_eq!(
            wh.calls().last(),
            Some(&WarehouseCall::ClearStaging("dbo.StageZDBrands".to_string()))
        );
    }
}
