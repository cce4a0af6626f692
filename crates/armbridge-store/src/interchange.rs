//! Interchange Store.
//!
//! Persists named 2-D cell grids (a header row plus data rows) to a local
//! SQLite database.  Writing a table always replaces it in full inside one
//! transaction, so a reader sees either the previous table or the new one,
//! never a mix of both.
//!
//! # Storage layout
//!
//! | table                | column     | description                              |
//! |----------------------|------------|------------------------------------------|
//! | `interchange_tables` | name       | table name (primary key)                 |
//! |                      | header     | JSON array of column names               |
//! |                      | position   | write sequence; orders `table_names()`   |
//! | `interchange_rows`   | table_name | owning table                             |
//! |                      | row_index  | 0-based position within the table        |
//! |                      | cells      | JSON array of cells (`null`/number/text) |
//!
//! # Example
//!
//! ```rust
//! use armbridge_store::interchange::{Cell, InterchangeStore, Table};
//!
//! let mut store = InterchangeStore::open_in_memory().unwrap();
//!
//! let mut table = Table::new(["key", "value"]);
//! table.push_row(vec![Cell::from("mx"), Cell::from(2.0)]);
//! store.write_table("calibration_parameters", &table).unwrap();
//!
//! let back = store.read_table("calibration_parameters").unwrap();
//! assert_eq!(back, table);
//! ```

use std::path::Path;

use armbridge_types::ArmError;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from interchange store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Cell encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Table '{table}' row {row}: expected {expected} cells, found {found}")]
    Shape {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Table '{table}' row {row} column {column}: number is not finite")]
    NonFinite {
        table: String,
        row: usize,
        column: usize,
    },
}

impl From<StoreError> for ArmError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ArmError::Config(format!("{what} does not exist")),
            other => ArmError::Store(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cell / Table
// ─────────────────────────────────────────────────────────────────────────────

/// A single grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// The numeric value, if this cell holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A header row plus data rows.  Every data row has exactly one cell per
/// header column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a data row to this (not yet persisted) table.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check that every row has one cell per header column and that every
    /// number is finite.  `name` is only used in the error.
    pub fn validate(&self, name: &str) -> Result<(), StoreError> {
        for (row_idx, row) in self.rows.iter().enumerate() {
            if row.len() != self.width() {
                return Err(StoreError::Shape {
                    table: name.to_string(),
                    row: row_idx,
                    expected: self.width(),
                    found: row.len(),
                });
            }
            if let Some(column) = row
                .iter()
                .position(|c| matches!(c, Cell::Number(v) if !v.is_finite()))
            {
                return Err(StoreError::NonFinite {
                    table: name.to_string(),
                    row: row_idx,
                    column,
                });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// InterchangeStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed named-table store shared by every pipeline stage.
pub struct InterchangeStore {
    conn: Connection,
}

impl InterchangeStore {
    /// Open (or create) a persistent store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an existing store; fails with [`StoreError::NotFound`] instead of
    /// creating a new file.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::NotFound(format!("store {}", path.display())));
        }
        Self::open(path)
    }

    /// Open a temporary in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS interchange_tables (
                name     TEXT    NOT NULL PRIMARY KEY,
                header   TEXT    NOT NULL,
                position INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS interchange_rows (
                table_name TEXT    NOT NULL,
                row_index  INTEGER NOT NULL,
                cells      TEXT    NOT NULL,
                PRIMARY KEY (table_name, row_index)
            );",
        )?;
        Ok(())
    }

    /// Read the table called `name`, rows in stored order.
    ///
    /// Returns [`StoreError::NotFound`] if no such table exists, and
    /// [`StoreError::Shape`] if a stored row does not match the header width.
    pub fn read_table(&self, name: &str) -> Result<Table, StoreError> {
        let header: String = self
            .conn
            .query_row(
                "SELECT header FROM interchange_tables WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("table '{name}'")))?;
        let header: Vec<String> = serde_json::from_str(&header)?;

        let mut stmt = self.conn.prepare(
            "SELECT cells FROM interchange_rows
             WHERE table_name = ?1
             ORDER BY row_index ASC",
        )?;
        let raw_rows = stmt
            .query_map(params![name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        for (row_idx, raw) in raw_rows.iter().enumerate() {
            let cells: Vec<Cell> = serde_json::from_str(raw)?;
            if cells.len() != header.len() {
                return Err(StoreError::Shape {
                    table: name.to_string(),
                    row: row_idx,
                    expected: header.len(),
                    found: cells.len(),
                });
            }
            rows.push(cells);
        }
        debug!(table = name, rows = rows.len(), "table read");
        Ok(Table { header, rows })
    }

    /// Replace the table called `name` with `table`.
    ///
    /// Any existing table of that name is deleted and the new one inserted in
    /// a single transaction that commits before this returns.  Nothing is
    /// written if `table` is malformed.
    pub fn write_table(&mut self, name: &str, table: &Table) -> Result<(), StoreError> {
        table.validate(name)?;
        let header = serde_json::to_string(&table.header)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM interchange_rows WHERE table_name = ?1",
            params![name],
        )?;
        tx.execute(
            "DELETE FROM interchange_tables WHERE name = ?1",
            params![name],
        )?;
        tx.execute(
            "INSERT INTO interchange_tables (name, header, position)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM interchange_tables))",
            params![name, header],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO interchange_rows (table_name, row_index, cells)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (row_idx, row) in table.rows.iter().enumerate() {
                let cells = serde_json::to_string(row)?;
                stmt.execute(params![name, row_idx as i64, cells])?;
            }
        }
        tx.commit()?;
        debug!(table = name, rows = table.len(), "table replaced");
        Ok(())
    }

    /// Delete the table called `name`.  Returns `false` if it did not exist.
    pub fn drop_table(&mut self, name: &str) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM interchange_rows WHERE table_name = ?1",
            params![name],
        )?;
        let removed = tx.execute(
            "DELETE FROM interchange_tables WHERE name = ?1",
            params![name],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Whether a table called `name` exists.
    pub fn contains(&self, name: &str) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM interchange_tables WHERE name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Names of all tables, in the order they were (re)created.
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM interchange_tables ORDER BY position ASC")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
