use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load CSV extracts into MySQL, evolving table schemas as files change",
    long_about = None
)]
pub struct Cli {
    /// Append log lines to this file instead of writing them to stderr
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load every mapped extract in the source directory into its table
    Load(LoadArgs),
    /// Show which table each file name routes to
    Route(RouteArgs),
    /// List the active file name to table mappings
    Mappings(MappingsArgs),
    /// Normalize a CSV file and show its first rows as they would be loaded
    Preview(PreviewArgs),
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory holding the extracts (overrides source.directory)
    #[arg(long = "source-dir")]
    pub source_dir: Option<PathBuf>,
    /// Load into a throwaway in-memory database instead of MySQL
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Fail files whose table does not exist instead of creating it
    #[arg(long = "no-create-tables")]
    pub no_create_tables: bool,
    /// Fail files with columns the table lacks instead of adding them
    #[arg(long = "no-add-columns")]
    pub no_add_columns: bool,
    /// Write the run summary as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    /// File names to resolve
    #[arg(required = true)]
    pub files: Vec<String>,
    /// YAML configuration file supplying custom mappings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MappingsArgs {
    /// YAML configuration file supplying custom mappings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// CSV file to preview (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_names_are_accepted() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn load_flags_parse() {
        let cli = Cli::parse_from([
            "lake-loader",
            "--log-file",
            "run.log",
            "load",
            "--dry-run",
            "--no-add-columns",
            "--source-dir",
            "in",
        ]);
        assert_eq!(cli.log_file, Some(PathBuf::from("run.log")));
        match cli.command {
            Commands::Load(args) => {
                assert!(args.dry_run);
                assert!(args.no_add_columns);
                assert!(!args.no_create_tables);
                assert_eq!(args.source_dir, Some(PathBuf::from("in")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
