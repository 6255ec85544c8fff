//! Per-file ingestion loop.
//!
//! Every listed file runs route → read → normalize → reconcile → insert to
//! completion before the next one starts. Failures are captured in the file's
//! [`FileOutcome`]; nothing raised while handling one file stops the batch.

use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::Serialize;

use crate::{
    config::{LoadOptions, LoaderConfig},
    destination::Connect,
    error::{DestinationError, IngestError},
    insert::BulkInserter,
    normalize::normalize,
    records::{ReadOptions, read_csv},
    reconcile::{ColumnFailure, SchemaReconciler, SchemaState, TableState},
    router::{FileRouter, Route, TableName},
};

/// Where source extracts come from.
pub trait SourceFiles {
    /// File names available for loading, in processing order.
    fn list(&self) -> Result<Vec<String>>;
    fn open(&self, name: &str) -> Result<Box<dyn Read>>;
}

/// Extracts mirrored into a local directory.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceFiles for LocalDirectory {
    fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Listing source directory {:?}", self.root))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Listing source directory {:?}", self.root))?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!("Ignoring non UTF-8 file name {raw:?}"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn open(&self, name: &str) -> Result<Box<dyn Read>> {
        let path = self.root.join(name);
        let file = File::open(&path).with_context(|| format!("Opening source file {path:?}"))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    Loaded {
        table: TableName,
        rows: u64,
        table_created: bool,
        columns_added: usize,
        schema: SchemaState,
    },
    Skipped {
        reason: String,
    },
    Failed {
        table: TableName,
        error: IngestError,
        /// Columns reconciliation could not add, which usually explain `error`.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        column_failures: Vec<ColumnFailure>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub file: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn loaded(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Loaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Failed { .. }))
    }

    pub fn rows(&self) -> u64 {
        self.files
            .iter()
            .map(|report| match report.outcome {
                FileOutcome::Loaded { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome(&self, file: &str) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|report| report.file == file)
            .map(|report| &report.outcome)
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }

    /// Header and rows for the operator-facing summary table.
    pub fn table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let headers = ["file", "table", "status", "rows", "detail"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows = self
            .files
            .iter()
            .map(|report| match &report.outcome {
                FileOutcome::Loaded {
                    table,
                    rows,
                    table_created,
                    columns_added,
                    schema,
                } => {
                    let mut detail = vec![format!("schema {schema}")];
                    if *table_created {
                        detail.push("table created".to_string());
                    }
                    if *columns_added > 0 {
                        detail.push(format!("{columns_added} column(s) added"));
                    }
                    vec![
                        report.file.clone(),
                        table.to_string(),
                        "loaded".to_string(),
                        rows.to_string(),
                        detail.join(", "),
                    ]
                }
                FileOutcome::Skipped { reason } => vec![
                    report.file.clone(),
                    "-".to_string(),
                    "skipped".to_string(),
                    "0".to_string(),
                    reason.clone(),
                ],
                FileOutcome::Failed {
                    table,
                    error,
                    column_failures,
                } => {
                    let detail = std::iter::once(error.to_string())
                        .chain(column_failures.iter().map(|failure| failure.error.to_string()))
                        .collect::<Vec<_>>()
                        .join("; ");
                    vec![
                        report.file.clone(),
                        table.to_string(),
                        format!("failed ({})", error.kind()),
                        "0".to_string(),
                        detail,
                    ]
                }
            })
            .collect();
        (headers, rows)
    }
}

pub struct Pipeline<'a, C: Connect> {
    connector: &'a C,
    router: FileRouter,
    read_options: ReadOptions,
    options: LoadOptions,
}

impl<'a, C: Connect> Pipeline<'a, C> {
    pub fn new(
        connector: &'a C,
        router: FileRouter,
        read_options: ReadOptions,
        options: LoadOptions,
    ) -> Self {
        Self {
            connector,
            router,
            read_options,
            options,
        }
    }

    pub fn from_config(connector: &'a C, config: &LoaderConfig) -> Result<Self> {
        Ok(Self::new(
            connector,
            config.router(),
            config.source.read_options()?,
            config.options,
        ))
    }

    /// Loads every file `source` lists. Only a failure to list the source is
    /// returned as an error.
    pub fn run<S: SourceFiles + ?Sized>(&self, source: &S) -> Result<RunSummary> {
        let files = source.list()?;
        info!("Found {} file(s) to process", files.len());
        let mut summary = RunSummary::default();
        for file in files {
            let outcome = self.process_file(source, &file);
            summary.files.push(FileReport { file, outcome });
        }
        info!(
            "Run finished: {} loaded, {} skipped, {} failed, {} row(s) written",
            summary.loaded(),
            summary.skipped(),
            summary.failed(),
            summary.rows()
        );
        Ok(summary)
    }

    pub fn process_file<S: SourceFiles + ?Sized>(&self, source: &S, file: &str) -> FileOutcome {
        let table = match self.router.resolve(file) {
            Route::Found(table) => table,
            Route::NotFound => {
                let error = IngestError::Mapping {
                    file: file.to_string(),
                };
                warn!("Skipping '{file}': {error}");
                return FileOutcome::Skipped {
                    reason: error.to_string(),
                };
            }
        };
        info!("Processing '{file}' into table '{table}'");
        let mut column_failures = Vec::new();
        match self.load_file(source, file, &table, &mut column_failures) {
            Ok(outcome) => outcome,
            Err(error) => {
                error!("Failed to load '{file}': {error}");
                FileOutcome::Failed {
                    table,
                    error,
                    column_failures,
                }
            }
        }
    }

    fn load_file<S: SourceFiles + ?Sized>(
        &self,
        source: &S,
        file: &str,
        table: &TableName,
        column_failures: &mut Vec<ColumnFailure>,
    ) -> Result<FileOutcome, IngestError> {
        let read_error = |err: anyhow::Error| IngestError::Read {
            file: file.to_string(),
            message: format!("{err:#}"),
        };
        let reader = source.open(file).map_err(read_error)?;
        let records = read_csv(reader, &self.read_options).map_err(read_error)?;
        let normalized = normalize(records);
        if normalized.columns().is_empty() {
            return Err(IngestError::Schema {
                table: table.to_string(),
                column: None,
                message: "no data columns left after normalization".to_string(),
            });
        }

        let mut session = self
            .connector
            .connect()
            .map_err(|err| match err {
                DestinationError::Connection(message) => IngestError::Connection(message),
                other => IngestError::Connection(other.to_string()),
            })?;

        let mut table_created = false;
        let mut columns_added = 0;
        let mut schema = SchemaState::Complete;
        {
            let mut reconciler = SchemaReconciler::new(&mut session);
            if self.options.create_missing_tables {
                let state = reconciler.ensure_table(table, normalized.columns())?;
                table_created = state == TableState::Created;
            }
            if self.options.add_missing_columns {
                let report = reconciler.ensure_columns(table, normalized.columns())?;
                columns_added = report.added.len();
                schema = report.state();
                column_failures.extend(report.failures);
            }
        }

        let outcome = BulkInserter::new(&mut session).insert(table, &normalized)?;
        Ok(FileOutcome::Loaded {
            table: table.clone(),
            rows: outcome.rows,
            table_created,
            columns_added,
            schema,
        })
    }
}
