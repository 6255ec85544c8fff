//! In-process destination.
//!
//! Models the parts of a MySQL/InnoDB table definition that reconciliation
//! depends on: bounded versus unconstrained text columns, the 65 535-byte
//! row-size ceiling, and all-or-nothing batch inserts. Used by `load --dry-run`
//! and by the test-suite, which can also inject connection refusals, rejected
//! cell values and failed column conversions.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::debug;

use super::{ColumnInfo, ColumnType, Connect, Destination, InsertStatement};
use crate::{error::DestinationError, router::TableName};

/// Maximum combined column width of a row, in bytes.
pub const ROW_SIZE_LIMIT: usize = 65_535;
/// Bytes a `TEXT` column contributes to the row-size ceiling.
pub const TEXT_COLUMN_WIDTH: usize = 12;
/// utf8mb4 reserves four bytes per character.
const BYTES_PER_CHAR: usize = 4;

pub fn column_width(column_type: &ColumnType) -> usize {
    match column_type {
        ColumnType::Text => TEXT_COLUMN_WIDTH,
        ColumnType::VarChar(len) => {
            let data = *len as usize * BYTES_PER_CHAR;
            data + if data > 255 { 2 } else { 1 }
        }
        ColumnType::Char(len) => *len as usize * BYTES_PER_CHAR,
        ColumnType::Other(_) => 8,
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<BTreeMap<String, String>>,
}

impl MemoryTable {
    fn width(&self) -> usize {
        self.columns
            .iter()
            .map(|column| column_width(&column.column_type))
            .sum()
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }
}

#[derive(Debug)]
struct MemoryDatabase {
    tables: BTreeMap<String, MemoryTable>,
    row_size_limit: usize,
    refuse_connections: bool,
    rejected_values: BTreeSet<String>,
    frozen_columns: BTreeSet<String>,
    open_sessions: usize,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            row_size_limit: ROW_SIZE_LIMIT,
            refuse_connections: false,
            rejected_values: BTreeSet::new(),
            frozen_columns: BTreeSet::new(),
            open_sessions: 0,
        }
    }
}

impl MemoryDatabase {
    fn table(&self, table: &TableName) -> Result<&MemoryTable, DestinationError> {
        self.tables
            .get(table.as_str())
            .ok_or_else(|| DestinationError::Statement(format!("Table '{table}' doesn't exist")))
    }

    fn table_mut(&mut self, table: &TableName) -> Result<&mut MemoryTable, DestinationError> {
        self.tables
            .get_mut(table.as_str())
            .ok_or_else(|| DestinationError::Statement(format!("Table '{table}' doesn't exist")))
    }
}

/// Shared handle to an in-memory database. Clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<MemoryDatabase>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryDatabase> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_row_size_limit(self, limit: usize) -> Self {
        self.lock().row_size_limit = limit;
        self
    }

    /// Seeds a pre-existing table, bypassing the row-size check.
    pub fn with_table(self, table: &str, columns: Vec<ColumnInfo>) -> Self {
        self.lock().tables.insert(
            table.to_string(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }

    /// Any batch containing this exact cell value fails.
    pub fn reject_value(self, value: &str) -> Self {
        self.lock().rejected_values.insert(value.to_string());
        self
    }

    /// Conversions of this column to text fail.
    pub fn freeze_column(self, column: &str) -> Self {
        self.lock().frozen_columns.insert(column.to_string());
        self
    }

    pub fn set_refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    pub fn column_info(&self, table: &str) -> Vec<ColumnInfo> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    pub fn rows(&self, table: &str) -> Vec<BTreeMap<String, String>> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Sessions handed out by [`Connect::connect`] that have not been dropped.
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }
}

impl Connect for MemoryDestination {
    type Session = MemorySession;

    fn connect(&self) -> Result<MemorySession, DestinationError> {
        let mut db = self.lock();
        if db.refuse_connections {
            return Err(DestinationError::Connection(
                "Can't connect to in-memory destination".to_string(),
            ));
        }
        db.open_sessions += 1;
        Ok(MemorySession {
            handle: self.clone(),
        })
    }
}

/// A session over a [`MemoryDestination`].
#[derive(Debug)]
pub struct MemorySession {
    handle: MemoryDestination,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let mut db = self.handle.lock();
        db.open_sessions = db.open_sessions.saturating_sub(1);
    }
}

impl Destination for MemorySession {
    fn table_exists(&mut self, table: &TableName) -> Result<bool, DestinationError> {
        Ok(self.handle.lock().tables.contains_key(table.as_str()))
    }

    fn columns(&mut self, table: &TableName) -> Result<Vec<ColumnInfo>, DestinationError> {
        Ok(self.handle.column_info(table.as_str()))
    }

    fn create_table(
        &mut self,
        table: &TableName,
        columns: &[String],
    ) -> Result<(), DestinationError> {
        let mut db = self.handle.lock();
        if db.tables.contains_key(table.as_str()) {
            return Err(DestinationError::Statement(format!(
                "Table '{table}' already exists"
            )));
        }
        if columns.is_empty() {
            return Err(DestinationError::Statement(
                "A table must have at least 1 column".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for column in columns {
            if !seen.insert(column.as_str()) {
                return Err(DestinationError::Statement(format!(
                    "Duplicate column name '{column}'"
                )));
            }
        }
        let width = columns.len() * TEXT_COLUMN_WIDTH;
        if width > db.row_size_limit {
            return Err(DestinationError::Capacity(format!(
                "Row size too large creating '{table}' ({width} > {})",
                db.row_size_limit
            )));
        }
        db.tables.insert(
            table.as_str().to_string(),
            MemoryTable {
                columns: columns
                    .iter()
                    .map(|name| ColumnInfo::new(name.clone(), ColumnType::Text))
                    .collect(),
                rows: Vec::new(),
            },
        );
        debug!("memory: created '{table}' with {} column(s)", columns.len());
        Ok(())
    }

    fn add_text_column(&mut self, table: &TableName, column: &str) -> Result<(), DestinationError> {
        let mut db = self.handle.lock();
        let limit = db.row_size_limit;
        let target = db.table_mut(table)?;
        if target.has_column(column) {
            return Err(DestinationError::Statement(format!(
                "Duplicate column name '{column}'"
            )));
        }
        let width = target.width() + TEXT_COLUMN_WIDTH;
        if width > limit {
            return Err(DestinationError::Capacity(format!(
                "Row size too large adding '{column}' to '{table}' ({width} > {limit})"
            )));
        }
        target.columns.push(ColumnInfo::new(column, ColumnType::Text));
        for row in &mut target.rows {
            row.insert(column.to_string(), String::new());
        }
        Ok(())
    }

    fn convert_to_text(&mut self, table: &TableName, column: &str) -> Result<(), DestinationError> {
        let mut db = self.handle.lock();
        if db.frozen_columns.contains(column) {
            return Err(DestinationError::Statement(format!(
                "Column '{column}' cannot be modified"
            )));
        }
        let target = db.table_mut(table)?;
        let info = target
            .columns
            .iter_mut()
            .find(|info| info.name == column)
            .ok_or_else(|| {
                DestinationError::Statement(format!("Unknown column '{column}' in '{table}'"))
            })?;
        info.column_type = ColumnType::Text;
        Ok(())
    }

    fn insert_rows(&mut self, statement: &InsertStatement) -> Result<u64, DestinationError> {
        let mut db = self.handle.lock();
        let target = db.table(&statement.table)?;
        if let Some(unknown) = statement.columns.iter().find(|c| !target.has_column(c)) {
            return Err(DestinationError::Statement(format!(
                "Unknown column '{unknown}' in 'field list'"
            )));
        }
        let all_columns: Vec<String> = target.columns.iter().map(|c| c.name.clone()).collect();

        let mut staged = Vec::with_capacity(statement.rows.len());
        for (idx, row) in statement.rows.iter().enumerate() {
            if let Some(bad) = row.iter().find(|cell| db.rejected_values.contains(*cell)) {
                return Err(DestinationError::Statement(format!(
                    "Incorrect value '{bad}' at row {}",
                    idx + 1
                )));
            }
            let mut stored: BTreeMap<String, String> = all_columns
                .iter()
                .map(|name| (name.clone(), String::new()))
                .collect();
            for (column, cell) in statement.columns.iter().zip(row) {
                stored.insert(column.clone(), cell.clone());
            }
            staged.push(stored);
        }

        let written = staged.len() as u64;
        db.table_mut(&statement.table)?.rows.extend(staged);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableName {
        TableName::new("t")
    }

    #[test]
    fn varchar_width_counts_length_prefix() {
        assert_eq!(column_width(&ColumnType::VarChar(10)), 41);
        assert_eq!(column_width(&ColumnType::VarChar(100)), 402);
        assert_eq!(column_width(&ColumnType::Char(3)), 12);
    }

    #[test]
    fn adding_past_the_ceiling_is_a_capacity_error() {
        let dest = MemoryDestination::new().with_table(
            "t",
            vec![ColumnInfo::new("wide", ColumnType::VarChar(16_382))],
        );
        let mut session = dest.connect().expect("session");
        let err = session.add_text_column(&table(), "extra").unwrap_err();
        assert!(err.is_capacity());

        session.convert_to_text(&table(), "wide").expect("convert");
        session.add_text_column(&table(), "extra").expect("add after widening");
    }

    #[test]
    fn failed_batch_leaves_table_untouched() {
        let dest = MemoryDestination::new().reject_value("boom");
        let mut session = dest.connect().expect("session");
        session.create_table(&table(), &["a".to_string()]).expect("create");
        let statement = InsertStatement {
            table: table(),
            columns: vec!["a".into()],
            rows: vec![vec!["1".into()], vec!["boom".into()], vec!["3".into()]],
        };
        assert!(session.insert_rows(&statement).is_err());
        assert_eq!(dest.row_count("t"), 0);
    }

    #[test]
    fn sessions_are_counted_until_dropped() {
        let dest = MemoryDestination::new();
        {
            let _session = dest.connect().expect("session");
            assert_eq!(dest.open_sessions(), 1);
        }
        assert_eq!(dest.open_sessions(), 0);
        dest.set_refuse_connections(true);
        assert!(dest.connect().unwrap_err().is_connection());
    }
}
