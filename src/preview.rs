use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::PreviewArgs,
    io_utils,
    normalize::normalize,
    records::{ReadOptions, read_csv},
    table,
};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let options = ReadOptions {
        delimiter: io_utils::resolve_input_delimiter(&args.input, args.delimiter),
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
        ..ReadOptions::default()
    };
    let reader = io_utils::open_input(&args.input)?;
    let records =
        read_csv(reader, &options).with_context(|| format!("Reading {:?}", args.input))?;
    let source_columns = records.columns.len();
    let normalized = normalize(records);

    let rows: Vec<Vec<String>> = normalized.rows().iter().take(args.rows).cloned().collect();
    table::print_table(normalized.columns(), &rows);
    info!(
        "Displayed {} of {} row(s) from {:?}; {} of {} column(s) kept",
        rows.len(),
        normalized.row_count(),
        args.input,
        normalized.columns().len(),
        source_columns
    );
    Ok(())
}
