//! Schema reconciliation.
//!
//! Brings a destination table up to the column set of the batch about to be
//! written. Changes are strictly additive: tables are created when absent,
//! missing columns are added as `TEXT`, and existing columns are never dropped.
//! The only retyping performed is widening bounded columns to `TEXT` when the
//! engine refuses a new column because the row would exceed its size ceiling.
//!
//! Reconciliation assumes a single writer per table. Two loaders racing on the
//! same table can both observe a column as missing and one `ADD COLUMN` will
//! fail; that failure is recorded like any other per-column failure.

use std::collections::HashSet;

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    destination::Destination,
    error::{DestinationError, IngestError},
    router::TableName,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Created,
    AlreadyExists,
}

/// Outcome of a column pass over an existing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaState {
    /// Every desired column is present.
    Complete,
    /// Every desired column is present after bounded columns were widened.
    Widened,
    /// At least one desired column could not be added.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnFailure {
    pub column: String,
    pub error: IngestError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnReport {
    pub added: Vec<String>,
    /// Columns converted to `TEXT` during capacity remediation.
    pub widened: Vec<String>,
    pub widening_passes: usize,
    pub failures: Vec<ColumnFailure>,
}

impl std::fmt::Display for SchemaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SchemaState::Complete => "complete",
            SchemaState::Widened => "widened",
            SchemaState::Partial => "partial",
        })
    }
}

impl ColumnReport {
    pub fn state(&self) -> SchemaState {
        if !self.failures.is_empty() {
            SchemaState::Partial
        } else if self.widening_passes > 0 {
            SchemaState::Widened
        } else {
            SchemaState::Complete
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidenReport {
    pub converted: Vec<String>,
    pub failed: Vec<(String, DestinationError)>,
}

pub struct SchemaReconciler<'a, D: Destination + ?Sized> {
    destination: &'a mut D,
}

impl<'a, D: Destination + ?Sized> SchemaReconciler<'a, D> {
    pub fn new(destination: &'a mut D) -> Self {
        Self { destination }
    }

    /// Creates `table` with exactly `desired` as `TEXT` columns if it does not exist.
    pub fn ensure_table(
        &mut self,
        table: &TableName,
        desired: &[String],
    ) -> Result<TableState, IngestError> {
        let exists = self
            .destination
            .table_exists(table)
            .map_err(|err| IngestError::schema(table.as_str(), None, &err))?;
        if exists {
            debug!("Table '{table}' already exists");
            return Ok(TableState::AlreadyExists);
        }
        self.destination
            .create_table(table, desired)
            .map_err(|err| IngestError::schema(table.as_str(), None, &err))?;
        info!(
            "Created table '{table}' with {} TEXT column(s)",
            desired.len()
        );
        Ok(TableState::Created)
    }

    /// Adds every column of `desired` the table lacks.
    ///
    /// A column that fails is recorded in the report and the pass moves on.
    /// Only a lost connection or an unreadable catalog aborts the pass.
    pub fn ensure_columns(
        &mut self,
        table: &TableName,
        desired: &[String],
    ) -> Result<ColumnReport, IngestError> {
        let exists = self
            .destination
            .table_exists(table)
            .map_err(|err| IngestError::schema(table.as_str(), None, &err))?;
        if !exists {
            return Err(IngestError::Schema {
                table: table.to_string(),
                column: None,
                message: "table does not exist".to_string(),
            });
        }

        let existing: HashSet<String> = self
            .destination
            .columns(table)
            .map_err(|err| IngestError::schema(table.as_str(), None, &err))?
            .into_iter()
            .map(|column| column.name)
            .collect();
        let mut pending = HashSet::new();
        let missing: Vec<&String> = desired
            .iter()
            .filter(|column| !existing.contains(*column) && pending.insert(column.as_str()))
            .collect();

        let mut report = ColumnReport::default();
        if missing.is_empty() {
            return Ok(report);
        }
        debug!("Table '{table}' is missing {} column(s)", missing.len());

        for column in missing {
            match self.destination.add_text_column(table, column) {
                Ok(()) => {
                    info!("Added column '{column}' to '{table}' as TEXT");
                    report.added.push(column.clone());
                }
                Err(err) if err.is_capacity() => {
                    self.remediate_capacity(table, column, err, &mut report)?;
                }
                Err(err) if err.is_connection() => {
                    return Err(IngestError::schema(table.as_str(), Some(column.as_str()), &err));
                }
                Err(err) => {
                    let error = IngestError::schema(table.as_str(), Some(column.as_str()), &err);
                    warn!("{error}");
                    report.failures.push(ColumnFailure {
                        column: column.clone(),
                        error,
                    });
                }
            }
        }
        Ok(report)
    }

    fn remediate_capacity(
        &mut self,
        table: &TableName,
        column: &str,
        err: DestinationError,
        report: &mut ColumnReport,
    ) -> Result<(), IngestError> {
        let capacity = IngestError::Capacity {
            table: table.to_string(),
            column: column.to_string(),
            message: err.to_string(),
        };
        warn!("{capacity}; converting bounded columns to TEXT");

        let widened = self.widen_columns(table)?;
        report.widening_passes += 1;
        report.widened.extend(widened.converted);

        match self.destination.add_text_column(table, column) {
            Ok(()) => {
                info!("Added column '{column}' to '{table}' after widening");
                report.added.push(column.to_string());
                Ok(())
            }
            Err(retry_err) if retry_err.is_connection() => {
                Err(IngestError::schema(table.as_str(), Some(column), &retry_err))
            }
            Err(retry_err) => {
                let error = IngestError::Schema {
                    table: table.to_string(),
                    column: Some(column.to_string()),
                    message: format!("still failing after widening: {retry_err}"),
                };
                warn!("{error}");
                report.failures.push(ColumnFailure {
                    column: column.to_string(),
                    error,
                });
                Ok(())
            }
        }
    }

    /// Converts every bounded-length column of `table` to `TEXT`.
    ///
    /// Columns are converted independently; one failed conversion is logged
    /// and the pass continues.
    pub fn widen_columns(&mut self, table: &TableName) -> Result<WidenReport, IngestError> {
        let bounded: Vec<String> = self
            .destination
            .columns(table)
            .map_err(|err| IngestError::schema(table.as_str(), None, &err))?
            .into_iter()
            .filter(|column| column.column_type.is_bounded())
            .map(|column| column.name)
            .collect();

        let mut report = WidenReport::default();
        for column in bounded {
            match self.destination.convert_to_text(table, &column) {
                Ok(()) => {
                    info!("Converted column '{column}' of '{table}' to TEXT to free row space");
                    report.converted.push(column);
                }
                Err(err) => {
                    warn!("Couldn't convert column '{column}' of '{table}': {err}");
                    report.failed.push((column, err));
                }
            }
        }
        Ok(report)
    }
}
