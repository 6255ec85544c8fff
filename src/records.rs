//! In-memory record sets.
//!
//! [`SourceRecordSet`] is what a reader or a programmatic caller hands to the
//! normalizer: ordered columns over rows of loosely typed [`Value`] cells.
//! [`NormalizedRecordSet`] is the canonical text-only shape produced by
//! [`crate::normalize`] and consumed by the reconciler and inserter.

use std::{fmt, io::Read};

use anyhow::{Context, Result, bail};
use encoding_rs::{Encoding, UTF_8};

use crate::io_utils;

/// Tokens read as not-a-value unless the configuration overrides them.
pub const DEFAULT_NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// True for explicit nulls and floating point not-a-number.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(value) => value.is_nan(),
            _ => false,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Value::Text(text) => text,
            value if value.is_missing() => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Float(value) if value.is_nan() => Ok(()),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecordSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl SourceRecordSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Text-only record set with sanitized, unique column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRecordSet {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<String>>,
}

impl NormalizedRecordSet {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<NormalizedRecordSet> for SourceRecordSet {
    fn from(set: NormalizedRecordSet) -> Self {
        SourceRecordSet {
            columns: set.columns,
            rows: set
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(Value::Text).collect())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub null_markers: Vec<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
            null_markers: DEFAULT_NULL_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ReadOptions {
    fn is_null_marker(&self, value: &str) -> bool {
        self.null_markers.iter().any(|marker| marker == value)
    }
}

/// Reads a delimited file with a mandatory header row.
///
/// Short rows are padded with nulls; a row wider than the header is an error.
pub fn read_csv<R: Read>(reader: R, options: &ReadOptions) -> Result<SourceRecordSet> {
    let mut reader = io_utils::open_csv_reader(reader, options.delimiter);
    let columns = io_utils::reader_headers(&mut reader, options.encoding)
        .context("Reading header row")?;
    if columns.is_empty() || (columns.len() == 1 && columns[0].is_empty()) {
        bail!("Missing header row");
    }

    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    let mut line = 1usize;
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading row {}", line + 1))?
    {
        line += 1;
        if record.len() > columns.len() {
            bail!(
                "Row {line} has {} field(s) but the header declares {}",
                record.len(),
                columns.len()
            );
        }
        let decoded = io_utils::decode_record(&record, options.encoding)
            .with_context(|| format!("Decoding row {line}"))?;
        let mut row = decoded
            .into_iter()
            .map(|field| {
                if options.is_null_marker(&field) {
                    Value::Null
                } else {
                    Value::Text(field)
                }
            })
            .collect::<Vec<_>>();
        row.resize(columns.len(), Value::Null);
        rows.push(row);
    }

    Ok(SourceRecordSet { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_markers_become_nulls() {
        let data = "id,amount,note\n1,NaN,\n2,3.5,N/A\n";
        let set = read_csv(data.as_bytes(), &ReadOptions::default()).expect("read");
        assert_eq!(set.columns, vec!["id", "amount", "note"]);
        assert_eq!(set.rows[0][1], Value::Null);
        assert_eq!(set.rows[0][2], Value::Null);
        assert_eq!(set.rows[1][1], Value::Text("3.5".into()));
        assert_eq!(set.rows[1][2], Value::Null);
    }

    #[test]
    fn short_rows_are_padded() {
        let data = "a,b,c\n1\n";
        let set = read_csv(data.as_bytes(), &ReadOptions::default()).expect("read");
        assert_eq!(
            set.rows[0],
            vec![Value::Text("1".into()), Value::Null, Value::Null]
        );
    }

    #[test]
    fn wide_rows_are_rejected() {
        let data = "a,b\n1,2,3\n";
        let err = read_csv(data.as_bytes(), &ReadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Row 2 has 3 field(s)"));
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = read_csv("".as_bytes(), &ReadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Missing header row"));
    }

    #[test]
    fn missing_values_render_as_empty_text() {
        assert_eq!(Value::Float(f64::NAN).into_text(), "");
        assert_eq!(Value::Null.into_text(), "");
        assert_eq!(Value::Integer(42).into_text(), "42");
        assert_eq!(Value::Float(1.5).into_text(), "1.5");
        assert_eq!(Value::Bool(true).into_text(), "true");
    }
}
