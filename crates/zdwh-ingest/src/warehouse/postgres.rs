//! Postgres warehouse backend
//!
//! Staging inserts are built with `QueryBuilder::push_values`; reconciliation
//! runs the configured no-argument procedures with `CALL`. Every statement
//! executes on the pool directly, so each one commits on its own.
//!
//! The `CALL` command tag carries no row count, so the update and insert
//! phases report `None` rather than a misleading zero.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use zdwh_common::QualifiedName;

use super::Warehouse;
use crate::config::WarehouseConfig;
use crate::entity::{ColumnKind, TableSet};
use crate::error::{Result, SyncError};
use crate::row::{Cell, Row};

/// Warehouse reached over a sqlx Postgres pool
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    /// Open the pool described by `config`
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(SyncError::config("warehouse.url is required unless --dry-run is set"));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await?;

        info!(
            schema = %config.schema,
            max_connections = config.max_connections,
            "Connected to warehouse"
        );

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn call(&self, procedure: &QualifiedName) -> Result<()> {
        let sql = call_statement(procedure);
        debug!(procedure = %procedure, "Executing procedure");

        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// `CALL "schema"."procedure"()`
pub(crate) fn call_statement(procedure: &QualifiedName) -> String {
    format!("CALL {}()", procedure.quoted())
}

/// `INSERT INTO "schema"."table" ("A", "B", ...) ` prefix for staging batches
pub(crate) fn insert_prefix(tables: &TableSet) -> String {
    let columns = tables
        .columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ");

    format!("INSERT INTO {} ({}) ", tables.staging.quoted(), columns)
}

fn bind_cell(b: &mut Separated<'_, '_, Postgres, &'static str>, cell: &Cell, kind: ColumnKind) {
    match (cell, kind) {
        (Cell::Integer(v), _) => b.push_bind(*v),
        (Cell::Text(v), _) => b.push_bind(v.clone()),
        (Cell::Boolean(v), _) => b.push_bind(*v),
        (Cell::Timestamp(v), _) => b.push_bind(*v),
        // NULLs still need the column's type for Postgres to accept the bind
        (Cell::Null, ColumnKind::Integer) => b.push_bind(None::<i64>),
        (Cell::Null, ColumnKind::Text) => b.push_bind(None::<String>),
        (Cell::Null, ColumnKind::Boolean) => b.push_bind(None::<bool>),
        (Cell::Null, ColumnKind::Timestamp) => b.push_bind(None::<chrono::DateTime<chrono::Utc>>),
    };
}

#[async_trait]
impl Warehouse for PgWarehouse {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn clear_staging(&self, tables: &TableSet) -> Result<()> {
        self.call(&tables.procedures.clear_staging).await
    }

    async fn append_batch(&self, tables: &TableSet, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(row) = rows.iter().find(|r| r.len() != tables.columns.len()) {
            return Err(SyncError::RowShape {
                table: tables.staging.to_string(),
                expected: tables.columns.len(),
                actual: row.len(),
            });
        }

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix(tables));

        query_builder.push_values(rows, |mut b, row| {
            for (cell, column) in row.cells.iter().zip(&tables.columns) {
                bind_cell(&mut b, cell, column.kind);
            }
        });

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn update_reporting_from_staging(&self, tables: &TableSet) -> Result<Option<u64>> {
        self.call(&tables.procedures.update_reporting).await?;
        Ok(None)
    }

    async fn insert_new_from_staging(&self, tables: &TableSet) -> Result<Option<u64>> {
        self.call(&tables.procedures.insert_new).await?;
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entity::{EntityConfig, EntityKind};

    #[test]
    fn test_call_statement_quotes_identifiers() {
        let brands = EntityConfig::build(EntityKind::Brands, "dbo", &[]).unwrap();
        assert_eq!(
            call_statement(&brands.tables.procedures.clear_staging),
            "CALL \"dbo\".\"usp_DeleteZDBrandsTable\"()"
        );
    }

    #[test]
    fn test_insert_prefix_lists_every_column() {
        let forms = EntityConfig::build(EntityKind::TicketForms, "dbo", &[]).unwrap();
        let assoc = forms.association.unwrap();
        assert_eq!(
            insert_prefix(&assoc.tables),
            "INSERT INTO \"dbo\".\"StageZDTicketFormsFields\" (\"TicketFieldID\", \"TicketFormID\", \"DwhInsert\", \"DwhUpdate\") "
        );
    }

    /// Pool that never reaches a server: nothing listens on port 1
    fn unreachable() -> PgWarehouse {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://etl@127.0.0.1:1/reporting")
            .unwrap();
        PgWarehouse::from_pool(pool)
    }

    #[tokio::test]
    async fn test_reconcile_failures_are_warehouse_errors() {
        let wh = unreachable();
        let brands = EntityConfig::build(EntityKind::Brands, "dbo", &[]).unwrap();

        let err = wh.update_reporting_from_staging(&brands.tables).await.unwrap_err();
        assert!(err.is_warehouse());
        let err = wh.clear_staging(&brands.tables).await.unwrap_err();
        assert!(matches!(err, SyncError::Warehouse(_)));
    }

    #[tokio::test]
    async fn test_connect_requires_url() {
        let err = PgWarehouse::connect(&WarehouseConfig::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
