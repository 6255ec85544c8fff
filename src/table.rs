//! Plain-text tables for run summaries and previews.

use std::{borrow::Cow, fmt::Write as _};

use itertools::Itertools;

/// Cells wider than this are cut and end in `...`.
pub const MAX_CELL_WIDTH: usize = 60;
const ELLIPSIS: &str = "...";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let cells: Vec<Vec<Cow<'_, str>>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .take(headers.len())
                .map(|cell| fit_cell(cell))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| char_width(h).max(3)).collect();
    for row in &cells {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(char_width(cell));
        }
    }
    let numeric: Vec<bool> = (0..headers.len())
        .map(|idx| {
            !cells.is_empty()
                && cells
                    .iter()
                    .all(|row| row.get(idx).is_some_and(|cell| is_number(cell)))
        })
        .collect();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers.iter().map(|h| h.as_str()), &widths, &[]));
    let _ = writeln!(
        output,
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).join("  ")
    );
    for row in &cells {
        let _ = writeln!(
            output,
            "{}",
            format_row(row.iter().map(|c| c.as_ref()), &widths, &numeric)
        );
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row<'a>(
    values: impl Iterator<Item = &'a str>,
    widths: &[usize],
    right_align: &[bool],
) -> String {
    let line = values
        .zip(widths)
        .enumerate()
        .map(|(idx, (value, &width))| {
            if right_align.get(idx).copied().unwrap_or(false) {
                format!("{value:>width$}")
            } else {
                format!("{value:<width$}")
            }
        })
        .join("  ");
    line.trim_end().to_string()
}

fn fit_cell(value: &str) -> Cow<'_, str> {
    let flattened = if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    };
    if char_width(&flattened) <= MAX_CELL_WIDTH {
        return flattened;
    }
    let kept: String = flattened
        .chars()
        .take(MAX_CELL_WIDTH - ELLIPSIS.len())
        .collect();
    Cow::Owned(format!("{kept}{ELLIPSIS}"))
}

fn char_width(value: &str) -> usize {
    value.chars().count()
}

fn is_number(value: &str) -> bool {
    !value.is_empty() && value.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn numeric_columns_are_right_aligned() {
        let rendered = render_table(
            &strings(&["file", "rows"]),
            &[strings(&["a.csv", "7"]), strings(&["bb.csv", "120"])],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec!["file    rows", "------  ----", "a.csv      7", "bb.csv   120"]
        );
    }

    #[test]
    fn long_cells_are_truncated_and_flattened() {
        let long = format!("line1\n{}", "x".repeat(100));
        let rendered = render_table(&strings(&["detail"]), &[vec![long]]);
        let last = rendered.lines().last().unwrap();
        assert_eq!(last.chars().count(), MAX_CELL_WIDTH);
        assert!(last.starts_with("line1 x"));
        assert!(last.ends_with("..."));
    }
}
