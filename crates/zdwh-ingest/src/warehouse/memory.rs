//! In-process warehouse
//!
//! Mirrors the procedure semantics of the real warehouse:
//!
//! - update: every reporting row whose key appears in staging takes the staged
//!   values, except `DwhInsert`, which keeps its original value
//! - insert: every staged key missing from reporting is appended once; if a key
//!   was staged twice the later row wins
//! - nothing ever deletes reporting rows
//!
//! Backs `--dry-run` and the pipeline tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::Warehouse;
use crate::entity::{TableSet, DWH_INSERT_COLUMN};
use crate::error::{Result, SyncError};
use crate::row::{Cell, Row};

/// A recorded warehouse operation, tagged with the staging table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarehouseCall {
    ClearStaging(String),
    Append { table: String, rows: usize },
    UpdateReporting(String),
    InsertNew(String),
}

#[derive(Debug, Default)]
struct TableState {
    staging: Vec<Row>,
    reporting: Vec<Row>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, TableState>,
    calls: Vec<WarehouseCall>,
}

/// Thread-safe in-memory staging and reporting tables
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panicked holder cannot leave rows half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn table_key(tables: &TableSet) -> String {
        tables.staging.to_string()
    }

    /// Preload reporting rows, as left behind by earlier runs
    pub fn seed_reporting(&self, tables: &TableSet, rows: Vec<Row>) {
        let mut state = self.lock();
        state
            .tables
            .entry(Self::table_key(tables))
            .or_default()
            .reporting
            .extend(rows);
    }

    pub fn staging_rows(&self, tables: &TableSet) -> Vec<Row> {
        self.lock()
            .tables
            .get(&Self::table_key(tables))
            .map(|t| t.staging.clone())
            .unwrap_or_default()
    }

    pub fn reporting_rows(&self, tables: &TableSet) -> Vec<Row> {
        self.lock()
            .tables
            .get(&Self::table_key(tables))
            .map(|t| t.reporting.clone())
            .unwrap_or_default()
    }

    /// Every operation so far, oldest first
    pub fn calls(&self) -> Vec<WarehouseCall> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn clear_staging(&self, tables: &TableSet) -> Result<()> {
        let key = Self::table_key(tables);
        let mut state = self.lock();
        state.tables.entry(key.clone()).or_default().staging.clear();
        state.calls.push(WarehouseCall::ClearStaging(key));
        Ok(())
    }

    async fn append_batch(&self, tables: &TableSet, rows: &[Row]) -> Result<u64> {
        let key = Self::table_key(tables);
        if let Some(row) = rows.iter().find(|r| r.len() != tables.columns.len()) {
            return Err(SyncError::RowShape {
                table: key,
                expected: tables.columns.len(),
                actual: row.len(),
            });
        }

        let mut state = self.lock();
        state
            .tables
            .entry(key.clone())
            .or_default()
            .staging
            .extend_from_slice(rows);
        state.calls.push(WarehouseCall::Append {
            table: key,
            rows: rows.len(),
        });
        Ok(rows.len() as u64)
    }

    async fn update_reporting_from_staging(&self, tables: &TableSet) -> Result<Option<u64>> {
        let key = Self::table_key(tables);
        let key_indices = tables.key_indices();
        let insert_index = tables.column_index(DWH_INSERT_COLUMN);

        let mut guard = self.lock();
        let state = &mut *guard;
        let table = state.tables.entry(key.clone()).or_default();

        let latest: HashMap<Vec<Cell>, &Row> = table
            .staging
            .iter()
            .map(|row| (row.key(&key_indices), row))
            .collect();

        let mut updated = 0u64;
        for existing in table.reporting.iter_mut() {
            if let Some(staged) = latest.get(&existing.key(&key_indices)) {
                let mut cells = staged.cells.clone();
                if let Some(i) = insert_index {
                    if let (Some(slot), Some(original)) = (cells.get_mut(i), existing.cells.get(i)) {
                        *slot = original.clone();
                    }
                }
                existing.cells = cells;
                updated += 1;
            }
        }

        state.calls.push(WarehouseCall::UpdateReporting(key));
        debug!(updated, "Memory warehouse update");
        Ok(Some(updated))
    }

    async fn insert_new_from_staging(&self, tables: &TableSet) -> Result<Option<u64>> {
        let key = Self::table_key(tables);
        let key_indices = tables.key_indices();

        let mut guard = self.lock();
        let state = &mut *guard;
        let table = state.tables.entry(key.clone()).or_default();

        let present: HashSet<Vec<Cell>> = table.reporting.iter().map(|r| r.key(&key_indices)).collect();

        // first-seen order, last-seen values
        let mut order: Vec<Vec<Cell>> = Vec::new();
        let mut latest: HashMap<Vec<Cell>, Row> = HashMap::new();
        for row in &table.staging {
            let row_key = row.key(&key_indices);
            if present.contains(&row_key) {
                continue;
            }
            if latest.insert(row_key.clone(), row.clone()).is_none() {
                order.push(row_key);
            }
        }

        let mut inserted = 0u64;
        for row_key in order {
            if let Some(row) = latest.remove(&row_key) {
                table.reporting.push(row);
                inserted += 1;
            }
        }

        state.calls.push(WarehouseCall::InsertNew(key));
        debug!(inserted, "Memory warehouse insert");
        Ok(Some(inserted))
    }
}
