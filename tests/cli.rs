use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

#[test]
fn descent_prints_report_without_exporting() {
    Command::cargo_bin("descent")
        .expect("descent bin")
        .args(["--no-export", "--link-counts", "1,2", "--log-level", "warn"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Final Altitude (ft): 5000"))
        .stdout(predicate::str::contains("Total Fuel (kg):"))
        .stdout(predicate::str::contains("Baseline Throughput (aircraft/s):"))
        .stdout(predicate::str::contains("STA Times for N=2"));
}

#[test]
fn descent_rejects_unreadable_config() {
    Command::cargo_bin("descent")
        .expect("descent bin")
        .args(["--no-export", "--config", "configs/missing.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read configuration"));
}

#[test]
fn descent_exports_and_plot_renders_png() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("results");

    Command::cargo_bin("descent")
        .expect("descent bin")
        .args([
            "--config",
            "configs/descent.toml",
            "--output-dir",
            out.to_str().unwrap(),
            "--link-counts",
            "1,2",
            "--log-level",
            "warn",
        ])
        .assert()
        .success();

    let json_path = out.join("cda_results.json");
    let csv_path = out.join("cda_trajectory.csv");
    let archive: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).expect("archive")).expect("json");
    assert_eq!(archive["links"].as_array().map(Vec::len), Some(2));
    assert_eq!(archive["trajectory"]["time_s"].as_array().map(Vec::len), Some(21));
    let table = fs::read_to_string(&csv_path).expect("csv");
    assert!(table.starts_with("time_s,"));
    assert_eq!(table.lines().count(), 22);

    let png_path = dir.path().join("figure.png");
    Command::cargo_bin("descent_plot")
        .expect("descent_plot bin")
        .args([
            "--input",
            json_path.to_str().unwrap(),
            "--output",
            png_path.to_str().unwrap(),
            "--width",
            "400",
            "--height",
            "300",
        ])
        .assert()
        .success();

    let metadata = fs::metadata(&png_path).expect("png metadata");
    assert!(metadata.len() > 0, "png should be non-empty");
}
