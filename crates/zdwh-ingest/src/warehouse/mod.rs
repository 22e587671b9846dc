//! Warehouse backends
//!
//! The sync core talks to the warehouse through four operations, each scoped
//! to a [`TableSet`]. Every call is one self-contained statement; there is no
//! transaction spanning several calls.

use async_trait::async_trait;

use crate::entity::TableSet;
use crate::error::Result;
use crate::row::Row;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryWarehouse, WarehouseCall};
pub use postgres::PgWarehouse;

/// Staging and reconciliation operations
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Empty the staging table
    async fn clear_staging(&self, tables: &TableSet) -> Result<()>;

    /// Append one batch to the staging table, in order
    async fn append_batch(&self, tables: &TableSet, rows: &[Row]) -> Result<u64>;

    /// Overwrite reporting rows whose key is present in staging
    ///
    /// Returns the number of rows updated, or `None` when the backend cannot
    /// tell.
    async fn update_reporting_from_staging(&self, tables: &TableSet) -> Result<Option<u64>>;

    /// Insert staged rows whose key is absent from reporting
    ///
    /// Returns the number of rows inserted, or `None` when the backend cannot
    /// tell.
    async fn insert_new_from_staging(&self, tables: &TableSet) -> Result<Option<u64>>;
}
