//! Error taxonomy for the ingestion engine.
//!
//! Destination clients report failures as [`DestinationError`], already
//! classified by kind so the reconciler can react to row-size overflow without
//! inspecting message text. The per-file pipeline lifts those into
//! [`IngestError`], which is what operators see in the run summary.

use serde::{Serialize, Serializer, ser::SerializeStruct};
use thiserror::Error;

/// A failure surfaced by a destination client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DestinationError {
    /// The destination could not be reached or the session was lost.
    #[error("destination unreachable: {0}")]
    Connection(String),
    /// The engine refused a definition because the row would be too wide.
    #[error("row size limit exceeded: {0}")]
    Capacity(String),
    /// Any other rejected statement.
    #[error("{0}")]
    Statement(String),
}

impl DestinationError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, DestinationError::Capacity(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, DestinationError::Connection(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("schema change on '{table}' failed{}: {message}", column_suffix(.column))]
    Schema {
        table: String,
        column: Option<String>,
        message: String,
    },

    #[error("row size limit reached adding column '{column}' to '{table}': {message}")]
    Capacity {
        table: String,
        column: String,
        message: String,
    },

    #[error("insert into '{table}' failed and was rolled back: {message}")]
    Insert { table: String, message: String },

    #[error("no table mapping for file '{file}'")]
    Mapping { file: String },

    #[error("table '{table}' is missing column(s): {}", .columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("could not read '{file}': {message}")]
    Read { file: String, message: String },
}

fn column_suffix(column: &Option<String>) -> String {
    column
        .as_deref()
        .map(|name| format!(" for column '{name}'"))
        .unwrap_or_default()
}

impl IngestError {
    pub fn schema(table: &str, column: Option<&str>, source: &DestinationError) -> Self {
        match source {
            DestinationError::Connection(message) => IngestError::Connection(message.clone()),
            other => IngestError::Schema {
                table: table.to_string(),
                column: column.map(str::to_string),
                message: other.to_string(),
            },
        }
    }

    /// Short category label used in summaries and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Connection(_) => "connection",
            IngestError::Schema { .. } => "schema",
            IngestError::Capacity { .. } => "capacity",
            IngestError::Insert { .. } => "insert",
            IngestError::Mapping { .. } => "mapping",
            IngestError::MissingColumns { .. } => "missing-columns",
            IngestError::Read { .. } => "read",
        }
    }
}

/// Reports carry the category and the rendered message.
impl Serialize for IngestError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IngestError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
