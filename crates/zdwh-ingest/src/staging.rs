//! Staging loader
//!
//! Appends projected rows to a staging table in fixed-size batches. The
//! loader never truncates; the reconciler clears staging before the first
//! page of a run.

use tracing::debug;

use crate::config::DEFAULT_BATCH_SIZE;
use crate::entity::TableSet;
use crate::error::{Result, SyncError};
use crate::row::Row;
use crate::warehouse::Warehouse;

/// Batching writer for staging tables
#[derive(Debug, Clone, Copy)]
pub struct StagingLoader {
    batch_size: usize,
}

impl Default for StagingLoader {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl StagingLoader {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(SyncError::config("Staging batch size must be greater than 0"));
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Append `rows` to the staging table of `tables`, preserving order
    ///
    /// Returns the number of rows written. Empty input issues no statements.
    pub async fn load<W>(&self, warehouse: &W, tables: &TableSet, rows: &[Row]) -> Result<usize>
    where
        W: Warehouse + ?Sized,
    {
        let total_batches = rows.len().div_ceil(self.batch_size);
        let mut written = 0;

        for (batch_idx, batch) in rows.chunks(self.batch_size).enumerate() {
            warehouse.append_batch(tables, batch).await?;
            written += batch.len();

            debug!(
                table = %tables.staging,
                batch = batch_idx + 1,
                total_batches,
                rows = batch.len(),
                "Appended staging batch"
            );
        }

        Ok(written)
    }
}
