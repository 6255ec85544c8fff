//! Atomic batch insertion.

use std::collections::HashSet;

use log::{debug, info};

use crate::{
    destination::{Destination, InsertStatement},
    error::{DestinationError, IngestError},
    records::NormalizedRecordSet,
    router::TableName,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub rows: u64,
}

pub struct BulkInserter<'a, D: Destination + ?Sized> {
    destination: &'a mut D,
}

impl<'a, D: Destination + ?Sized> BulkInserter<'a, D> {
    pub fn new(destination: &'a mut D) -> Self {
        Self { destination }
    }

    /// Columns of `records` the table does not currently have.
    pub fn missing_columns(
        &mut self,
        table: &TableName,
        records: &NormalizedRecordSet,
    ) -> Result<Vec<String>, IngestError> {
        let present: HashSet<String> = self
            .destination
            .columns(table)
            .map_err(|err| IngestError::schema(table.as_str(), None, &err))?
            .into_iter()
            .map(|column| column.name)
            .collect();
        Ok(records
            .columns()
            .iter()
            .filter(|column| !present.contains(*column))
            .cloned()
            .collect())
    }

    /// Writes the whole record set in one transaction, or nothing.
    ///
    /// The table's live column set is checked first; if any column is still
    /// missing the write is refused rather than inserting a partial row shape.
    pub fn insert(
        &mut self,
        table: &TableName,
        records: &NormalizedRecordSet,
    ) -> Result<InsertOutcome, IngestError> {
        let missing = self.missing_columns(table, records)?;
        if !missing.is_empty() {
            return Err(IngestError::MissingColumns {
                table: table.to_string(),
                columns: missing,
            });
        }

        if records.is_empty() {
            debug!("No rows to insert into '{table}'");
            return Ok(InsertOutcome { rows: 0 });
        }

        let statement = InsertStatement {
            table: table.clone(),
            columns: records.columns().to_vec(),
            rows: records.rows().to_vec(),
        };
        let rows = self
            .destination
            .insert_rows(&statement)
            .map_err(|err| match err {
                DestinationError::Connection(message) => IngestError::Connection(message),
                other => IngestError::Insert {
                    table: table.to_string(),
                    message: other.to_string(),
                },
            })?;
        info!("Inserted {rows} row(s) into '{table}'");
        Ok(InsertOutcome { rows })
    }
}
