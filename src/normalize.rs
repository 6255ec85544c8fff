//! Record normalization.
//!
//! Turns a [`SourceRecordSet`] into a [`NormalizedRecordSet`]:
//!
//! 1. drop storage-protocol metadata and error-report columns,
//! 2. sanitize column names with literal, ordered substitutions,
//! 3. coerce every cell to text (missing values become `""`),
//! 4. apply the sentinel replacement table.
//!
//! Normalizing an already normalized set returns it unchanged.

use std::collections::HashSet;

use crate::records::{NormalizedRecordSet, SourceRecordSet};

/// Columns injected by the export tooling that never carry business data.
pub const NON_DATA_COLUMNS: &[&str] = &["@odata.etag", "ItemInternalId", "Errors"];

/// Literal substitutions applied to column names, in order.
pub const NAME_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("#_", ""),
    (" ", "_"),
    ("-", ""),
    ("/", "_"),
    ("_x0023__", ""),
    ("%", "Perc"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueReplacement {
    pub from: &'static str,
    pub to: &'static str,
}

/// Whole-cell sentinel replacements applied after text coercion.
pub const SENTINEL_REPLACEMENTS: &[ValueReplacement] = &[
    ValueReplacement { from: "nan", to: "" },
    ValueReplacement { from: "NaT", to: "" },
    ValueReplacement { from: "-", to: "" },
    ValueReplacement { from: "#REF!", to: "0" },
    ValueReplacement { from: "#DIV/0!", to: "0" },
];

fn sanitize_once(name: &str) -> String {
    let mut current = name.to_string();
    for (from, to) in NAME_SUBSTITUTIONS {
        if current.contains(from) {
            current = current.replace(from, to);
        }
    }
    current.trim().to_string()
}

/// Sanitizes a column name into an identifier the destination accepts.
///
/// The substitution list is re-applied until the name is stable, since removing
/// one marker can expose another (`#-_` → `#_` → ``).
pub fn sanitize_column_name(name: &str) -> String {
    let mut current = sanitize_once(name);
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sentinel_replacement(value: &str) -> Option<&'static str> {
    SENTINEL_REPLACEMENTS
        .iter()
        .find(|replacement| replacement.from == value)
        .map(|replacement| replacement.to)
}

fn is_non_data_column(raw: &str, sanitized: &str) -> bool {
    NON_DATA_COLUMNS
        .iter()
        .any(|name| *name == raw || *name == sanitized)
}

/// Assigns names to empty identifiers and suffixes collisions.
fn unique_names(names: Vec<(usize, String)>) -> Vec<String> {
    let mut taken: HashSet<String> = names
        .iter()
        .map(|(_, name)| name.clone())
        .filter(|name| !name.is_empty())
        .collect();
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(names.len());
    for (position, name) in names {
        let base = if name.is_empty() {
            format!("column_{}", position + 1)
        } else {
            name
        };
        if seen.insert(base.clone()) {
            taken.insert(base.clone());
            resolved.push(base);
            continue;
        }
        let mut suffix = 2usize;
        let candidate = loop {
            let candidate = sanitize_column_name(&format!("{base}_{suffix}"));
            if !candidate.is_empty() && !taken.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        taken.insert(candidate.clone());
        seen.insert(candidate.clone());
        resolved.push(candidate);
    }
    resolved
}

pub fn normalize(source: SourceRecordSet) -> NormalizedRecordSet {
    let SourceRecordSet { columns, rows } = source;

    let mut keep = Vec::with_capacity(columns.len());
    let mut names = Vec::with_capacity(columns.len());
    for (idx, raw) in columns.iter().enumerate() {
        let sanitized = sanitize_column_name(raw);
        if is_non_data_column(raw, &sanitized) {
            continue;
        }
        keep.push(idx);
        names.push((idx, sanitized));
    }
    let columns = unique_names(names);

    let rows = rows
        .into_iter()
        .map(|row| {
            let mut cells: Vec<Option<_>> = row.into_iter().map(Some).collect();
            keep.iter()
                .map(|&idx| {
                    let text = cells
                        .get_mut(idx)
                        .and_then(Option::take)
                        .map(|value| value.into_text())
                        .unwrap_or_default();
                    match sentinel_replacement(&text) {
                        Some(replacement) => replacement.to_string(),
                        None => text,
                    }
                })
                .collect()
        })
        .collect();

    NormalizedRecordSet { columns, rows }
}
