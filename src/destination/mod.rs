//! Destination database abstraction.
//!
//! A [`Connect`] implementation hands out one [`Destination`] session per
//! source file. Sessions expose only the handful of catalog and DDL operations
//! the reconciler needs plus an atomic batch insert. Errors come back already
//! classified as [`DestinationError`] so callers never parse message text.

pub mod memory;
pub mod mysql;

use std::fmt;

use itertools::Itertools;

use crate::{error::DestinationError, router::TableName};

pub use memory::MemoryDestination;
pub use mysql::{MySqlConnector, MySqlSession};

/// Declared type of a destination column, as far as reconciliation cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// Unconstrained-length text (`TEXT`, `MEDIUMTEXT`, `LONGTEXT`).
    Text,
    VarChar(u32),
    Char(u32),
    Other(String),
}

impl ColumnType {
    /// Bounded-length columns count their full width against the row-size ceiling.
    pub fn is_bounded(&self) -> bool {
        matches!(self, ColumnType::VarChar(_) | ColumnType::Char(_))
    }

    pub fn from_catalog(data_type: &str, max_length: Option<i64>) -> Self {
        let length = max_length
            .and_then(|len| u32::try_from(len).ok())
            .unwrap_or(0);
        match data_type.trim().to_ascii_lowercase().as_str() {
            "text" | "tinytext" | "mediumtext" | "longtext" => ColumnType::Text,
            "varchar" => ColumnType::VarChar(length),
            "char" => ColumnType::Char(length),
            other => ColumnType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Text => f.write_str("TEXT"),
            ColumnType::VarChar(len) => write!(f, "VARCHAR({len})"),
            ColumnType::Char(len) => write!(f, "CHAR({len})"),
            ColumnType::Other(name) => f.write_str(&name.to_ascii_uppercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A parameterized multi-row insert covering a whole normalized record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: TableName,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl InsertStatement {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// SQL for `row_count` rows with one `?` placeholder per cell.
    pub fn sql(&self, row_count: usize) -> String {
        let column_list = self.columns.iter().map(|c| quote_identifier(c)).join(", ");
        let tuple = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![tuple.as_str(); row_count].join(", ");
        format!(
            "INSERT INTO {} ({column_list}) VALUES {values}",
            quote_identifier(self.table.as_str())
        )
    }

    /// Splits the rows so no chunk binds more than `max_params` placeholders.
    pub fn chunks(&self, max_params: usize) -> impl Iterator<Item = &[Vec<String>]> {
        let per_row = self.columns.len().max(1);
        let rows_per_chunk = (max_params / per_row).max(1);
        self.rows.chunks(rows_per_chunk)
    }
}

/// Quotes an identifier with back-ticks, doubling embedded back-ticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// One session against the destination database.
pub trait Destination {
    fn table_exists(&mut self, table: &TableName) -> Result<bool, DestinationError>;

    /// Columns in ordinal order; empty when the table does not exist.
    fn columns(&mut self, table: &TableName) -> Result<Vec<ColumnInfo>, DestinationError>;

    /// Creates `table` with every column typed as unconstrained text.
    fn create_table(&mut self, table: &TableName, columns: &[String])
    -> Result<(), DestinationError>;

    fn add_text_column(&mut self, table: &TableName, column: &str)
    -> Result<(), DestinationError>;

    /// Retypes an existing column as unconstrained text.
    fn convert_to_text(&mut self, table: &TableName, column: &str)
    -> Result<(), DestinationError>;

    /// Writes every row or none; returns the number of rows committed.
    fn insert_rows(&mut self, statement: &InsertStatement) -> Result<u64, DestinationError>;
}

/// Opens destination sessions. Each call yields a fresh, independently scoped session.
pub trait Connect {
    type Session: Destination;

    fn connect(&self) -> Result<Self::Session, DestinationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_types_map_to_column_types() {
        assert_eq!(ColumnType::from_catalog("varchar", Some(255)), ColumnType::VarChar(255));
        assert_eq!(ColumnType::from_catalog("LONGTEXT", None), ColumnType::Text);
        assert_eq!(ColumnType::from_catalog("char", Some(3)), ColumnType::Char(3));
        assert_eq!(
            ColumnType::from_catalog("int", None),
            ColumnType::Other("int".to_string())
        );
        assert!(ColumnType::VarChar(10).is_bounded());
        assert!(!ColumnType::Text.is_bounded());
    }

    #[test]
    fn identifiers_are_backtick_quoted() {
        assert_eq!(quote_identifier("order"), "`order`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn insert_sql_has_one_placeholder_per_cell() {
        let statement = InsertStatement {
            table: TableName::new("rates"),
            columns: vec!["Rate".into(), "From Date".into()],
            rows: vec![vec!["1".into(), "2".into()]; 3],
        };
        assert_eq!(
            statement.sql(2),
            "INSERT INTO `rates` (`Rate`, `From Date`) VALUES (?, ?), (?, ?)"
        );
    }

    #[test]
    fn chunks_respect_the_placeholder_budget() {
        let statement = InsertStatement {
            table: TableName::new("t"),
            columns: vec!["a".into(), "b".into(), "c".into()],
            rows: vec![vec!["x".into(); 3]; 10],
        };
        let sizes: Vec<usize> = statement.chunks(9).map(|chunk| chunk.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }
}
