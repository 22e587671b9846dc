//! Projected warehouse rows

use chrono::{DateTime, Utc};

use crate::entity::TableSet;

/// A single typed value bound for a warehouse column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cell {
    Null,
    Integer(i64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Cell::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

/// One row in staging column order (see [`TableSet::columns`])
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Look a value up by column name
    pub fn get<'a>(&'a self, tables: &TableSet, column: &str) -> Option<&'a Cell> {
        tables.column_index(column).and_then(|i| self.cells.get(i))
    }

    /// The key tuple of this row
    pub fn key(&self, key_indices: &[usize]) -> Vec<Cell> {
        key_indices
            .iter()
            .map(|&i| self.cells.get(i).cloned().unwrap_or(Cell::Null))
            .collect()
    }
}
