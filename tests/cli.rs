mod common;

use std::fs;

use assert_cmd::Command;
use common::{TestWorkspace, csv};
use predicates::prelude::*;
use predicates::str::contains;

fn loader() -> Command {
    let mut cmd = Command::cargo_bin("lake-loader").expect("binary exists");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn seeded_workspace() -> TestWorkspace {
    let workspace = TestWorkspace::new();
    workspace.write(
        "TABLE_ALLRATES.csv",
        &csv("Rate %,From Date", &["4.5,2024-01-01", "#DIV/0!,-"]),
    );
    workspace.write("unknown.csv", &csv("a", &["1"]));
    workspace
}

#[test]
fn route_reports_table_or_unmapped() {
    loader()
        .args(["route", "TABLE_ALLRATES.csv", "unknown.csv"])
        .assert()
        .success()
        .stdout(contains("rates").and(contains("unmapped")));
}

#[test]
fn mappings_lists_builtin_table() {
    loader()
        .arg("mappings")
        .assert()
        .success()
        .stdout(contains("TableMasterLoanSterling.csv").and(contains("master_data")));
}

#[test]
fn mappings_from_config_replace_builtin_table() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_config("mappings:\n  orders.csv: orders\n");
    loader()
        .args(["mappings", "--config", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("orders.csv").and(contains("master_data").not()));
}

#[test]
fn preview_prints_normalized_header_and_rows() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "extract.csv",
        &csv(
            "ItemInternalId,#_Loan Amount-GBP/Month%,Status",
            &["1,100,open", "2,#REF!,nan", "3,7,closed"],
        ),
    );
    loader()
        .args(["preview", "-i", input.to_str().unwrap(), "--rows", "2"])
        .assert()
        .success()
        .stdout(
            contains("Loan_AmountGBP_MonthPerc")
                .and(contains("ItemInternalId").not())
                .and(contains("open"))
                .and(contains("closed").not()),
        );
}

#[test]
fn dry_run_load_prints_summary_and_writes_report() {
    let workspace = seeded_workspace();
    let report_dir = TestWorkspace::new();
    let report = report_dir.path().join("report.json");

    loader()
        .args([
            "load",
            "--dry-run",
            "--source-dir",
            workspace.path().to_str().unwrap(),
            "--report",
            report.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("1 loaded, 1 skipped, 0 failed, 2 row(s) written"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).expect("read report")).expect("json");
    let files = json["files"].as_array().expect("files array");
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["file"], "TABLE_ALLRATES.csv");
    assert_eq!(files[0]["status"], "loaded");
    assert_eq!(files[0]["rows"], 2);
    assert_eq!(files[0]["schema"], "complete");
    assert_eq!(files[1]["status"], "skipped");
}

#[test]
fn dry_run_load_reads_source_directory_from_config() {
    let workspace = seeded_workspace();
    let config = workspace.write_config("options:\n  create_missing_tables: true\n");
    loader()
        .args(["load", "--dry-run", "--config", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("TABLE_ALLRATES.csv"));
}

#[test]
fn load_exits_non_zero_when_a_file_fails() {
    let workspace = seeded_workspace();
    loader()
        .args([
            "load",
            "--dry-run",
            "--no-create-tables",
            "--source-dir",
            workspace.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stdout(contains("0 loaded, 1 skipped, 1 failed"))
        .stderr(contains("1 file(s) failed to load"));
}

#[test]
fn log_file_is_appended_across_runs() {
    let workspace = seeded_workspace();
    let logs = TestWorkspace::new();
    let log_file = logs.path().join("loader.log");

    for _ in 0..2 {
        loader()
            .args([
                "--log-file",
                log_file.to_str().unwrap(),
                "load",
                "--dry-run",
                "--source-dir",
                workspace.path().to_str().unwrap(),
            ])
            .assert()
            .success();
    }

    let log = fs::read_to_string(&log_file).expect("read log");
    assert_eq!(log.matches("Run finished").count(), 2);
    assert!(log.contains("Skipping 'unknown.csv'"));
}

#[test]
fn real_load_requires_destination_settings() {
    let workspace = seeded_workspace();
    loader()
        .args(["load", "--source-dir", workspace.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("destination.host must be set"));
}
