//! Filename to table routing.
//!
//! Every extract that lands in the source container is matched against a
//! static mapping table. Files without an entry resolve to [`Route::NotFound`]
//! so the pipeline can skip them instead of inventing a table name.

use std::{collections::BTreeMap, fmt, path::Path};

use serde::{Deserialize, Serialize};

/// Built-in extract mapping: source filename to destination table.
pub const DEFAULT_MAPPINGS: &[(&str, &str)] = &[
    ("TABLE_ALLRATES.csv", "rates"),
    ("TableMasterLoanSterling.csv", "master_data"),
    ("Table_ExtensionDefault.csv", "ext"),
    ("TableCashbookEuro.csv", "tablecashbookeuro"),
    ("TableCashbookEuroNFL.csv", "tablecashbookeuronfl"),
    ("TableCashbookItemType.csv", "tableCashbookItemtype"),
    ("TableCashbookNCLEURO.csv", "tableCashbookncleuro"),
    ("TableCashbookNCLSTERLING.csv", "tablecashbooknclsterling"),
    ("TableCashbookSterling.csv", "tablecashbooksterling"),
    ("TableTermLoan.csv", "TableTermLoan"),
    ("TableVariableRateMapping.csv", "TableVariableRateMapping"),
    ("TableBorrower.csv", "TableBorrower"),
    ("TableBorrowerContact.csv", "TableBorrowerContact"),
    ("TableCashbookNCLSTERLING_II.csv", "TableCashbookNCLSTERLING_II"),
    ("TableCashbookNPLSTERLING.csv", "TableCashbookNPLSTERLING"),
    ("TableLawyer.csv", "TableLawyer"),
    ("Table_EIR.csv", "Table_EIR"),
];

/// A destination table name produced by the router.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Found(TableName),
    NotFound,
}

impl Route {
    pub fn table(&self) -> Option<&TableName> {
        match self {
            Route::Found(table) => Some(table),
            Route::NotFound => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileRouter {
    mappings: BTreeMap<String, TableName>,
}

impl Default for FileRouter {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_MAPPINGS.iter().copied())
    }
}

impl FileRouter {
    pub fn new(mappings: BTreeMap<String, String>) -> Self {
        Self {
            mappings: mappings
                .into_iter()
                .map(|(file, table)| (file, TableName::new(table)))
                .collect(),
        }
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self {
            mappings: pairs
                .into_iter()
                .map(|(file, table)| (file.to_string(), TableName::new(table)))
                .collect(),
        }
    }

    /// Resolves a file identifier. Only the final path component is matched,
    /// and the match is exact (case-sensitive).
    pub fn resolve(&self, file: &str) -> Route {
        let name = Path::new(file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(file);
        match self.mappings.get(name) {
            Some(table) => Route::Found(table.clone()),
            None => Route::NotFound,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TableName)> {
        self.mappings.iter().map(|(file, table)| (file.as_str(), table))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
