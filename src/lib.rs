pub mod cli;
pub mod config;
pub mod destination;
pub mod error;
pub mod insert;
pub mod io_utils;
pub mod normalize;
pub mod pipeline;
mod preview;
pub mod reconcile;
pub mod records;
pub mod router;
pub mod table;

use std::{
    env,
    fs::{File, OpenOptions},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    config::LoaderConfig,
    destination::{Connect, MemoryDestination, MySqlConnector},
    pipeline::{LocalDirectory, Pipeline},
    router::Route,
};

static LOGGER: OnceLock<()> = OnceLock::new();

/// Installs the global logger once; later calls are no-ops.
///
/// With `log_file` set, log lines are appended to that file.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let target = match log_file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Opening log file {path:?}"))?,
        ),
        None => None,
    };
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("lake_loader", LevelFilter::Info);
        }
        if let Some(file) = target {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;
    match cli.command {
        Commands::Load(args) => handle_load(&args),
        Commands::Route(args) => handle_route(&args),
        Commands::Mappings(args) => handle_mappings(&args),
        Commands::Preview(args) => preview::execute(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<LoaderConfig> {
    match path {
        Some(path) => {
            LoaderConfig::load(path).with_context(|| format!("Loading config from {path:?}"))
        }
        None => Ok(LoaderConfig::default()),
    }
}

fn handle_load(args: &cli::LoadArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = &args.source_dir {
        config.source.directory = dir.clone();
    }
    if args.no_create_tables {
        config.options.create_missing_tables = false;
    }
    if args.no_add_columns {
        config.options.add_missing_columns = false;
    }

    if args.dry_run {
        info!("Dry run: loading into an in-memory database");
        load_with(&MemoryDestination::new(), &config, args)
    } else {
        config.validate_destination()?;
        info!("Loading into {}", config.destination.describe());
        let connector = MySqlConnector::new(config.destination.clone())
            .context("Starting database runtime")?;
        load_with(&connector, &config, args)
    }
}

fn load_with<C: Connect>(
    connector: &C,
    config: &LoaderConfig,
    args: &cli::LoadArgs,
) -> Result<()> {
    let source = LocalDirectory::new(config.source.root());
    info!("Reading extracts from {:?}", source.root());
    let summary = Pipeline::from_config(connector, config)?.run(&source)?;

    let (headers, rows) = summary.table();
    table::print_table(&headers, &rows);
    println!(
        "{} loaded, {} skipped, {} failed, {} row(s) written",
        summary.loaded(),
        summary.skipped(),
        summary.failed(),
        summary.rows()
    );

    if let Some(path) = &args.report {
        let file = File::create(path).with_context(|| format!("Creating report {path:?}"))?;
        serde_json::to_writer_pretty(file, &summary)
            .with_context(|| format!("Writing report {path:?}"))?;
        info!("Run report written to {path:?}");
    }

    if summary.failed() > 0 {
        bail!("{} file(s) failed to load", summary.failed());
    }
    Ok(())
}

fn handle_route(args: &cli::RouteArgs) -> Result<()> {
    let router = load_config(args.config.as_deref())?.router();
    let rows = args
        .files
        .iter()
        .map(|file| {
            let table = match router.resolve(file) {
                Route::Found(table) => table.to_string(),
                Route::NotFound => "unmapped".to_string(),
            };
            vec![file.clone(), table]
        })
        .collect::<Vec<_>>();
    table::print_table(&["file".to_string(), "table".to_string()], &rows);
    Ok(())
}

fn handle_mappings(args: &cli::MappingsArgs) -> Result<()> {
    let router = load_config(args.config.as_deref())?.router();
    let rows = router
        .entries()
        .map(|(file, table)| vec![file.to_string(), table.to_string()])
        .collect::<Vec<_>>();
    table::print_table(&["file".to_string(), "table".to_string()], &rows);
    info!("{} mapping(s)", router.len());
    Ok(())
}
