/// CLI tests for `kanalytics`.
///
/// Each test writes its fixtures into a temporary directory and runs the
/// compiled binary against them.
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const RECORDS: &str = r#"[
    {"status": "open", "points": 3, "due_date": "2024-03-11", "date_created": "2024-01-15"},
    {
        "status": {"status": "closed"},
        "points": 5,
        "due_date": "2024-03-11",
        "date_done": "2024-03-12",
        "date_created": "2024-01-31"
    },
    {"status": "open", "points": 8, "date_done": "2024-03-12", "date_created": "2024-02-10"}
]"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn kanalytics() -> Command {
    let mut cmd = Command::cargo_bin("kanalytics").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_aggregate_grouped() {
    let dir = TempDir::new().unwrap();
    let records = write(&dir, "records.json", RECORDS);
    let config = write(
        &dir,
        "config.json",
        r#"{"aggregationType": "sum", "field": "points", "groupBy": "status"}"#,
    );

    kanalytics()
        .arg("aggregate")
        .arg(&records)
        .arg("-c")
        .arg(&config)
        .arg("--compact")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"[{"count":1,"group":"closed","value":5},{"count":2,"group":"open","value":11}]"#,
        ));
}

#[test]
fn test_aggregate_rejects_missing_field() {
    let dir = TempDir::new().unwrap();
    let records = write(&dir, "records.json", RECORDS);
    let config = write(&dir, "config.json", r#"{"aggregationType": "median"}"#);

    kanalytics()
        .arg("aggregate")
        .arg(&records)
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires a 'field'"));
}

#[test]
fn test_aggregate_accepts_records_envelope() {
    let dir = TempDir::new().unwrap();
    let records = write(&dir, "records.json", &format!(r#"{{"records": {}}}"#, RECORDS));
    let config = write(&dir, "config.json", r#"{"aggregationType": "count"}"#);

    kanalytics()
        .arg("aggregate")
        .arg(&records)
        .arg("-c")
        .arg(&config)
        .arg("--compact")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"[{"value":3}]"#));
}

#[test]
fn test_compare_by_weekday() {
    let dir = TempDir::new().unwrap();
    let records = write(&dir, "records.json", RECORDS);
    let config = write(
        &dir,
        "config.json",
        r#"{"aggregationType": "count", "groupBy": "day_of_week"}"#,
    );

    kanalytics()
        .arg("compare")
        .arg(&records)
        .arg("-c")
        .arg(&config)
        .args(["--forecast", "due_date", "--actual", "date_done", "--compact"])
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!(
            r#"[{"actual":0,"forecast":2,"group":"Monday"},"#,
            r#"{"actual":2,"forecast":0,"group":"Tuesday"}]"#,
        )));
}

#[test]
fn test_formula_arithmetic_and_named() {
    kanalytics()
        .args(["formula", "(points + 1) * 2", "-r", r#"{"points": 4}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("10"));

    kanalytics()
        .args([
            "--now",
            "2024-03-15T00:00:00Z",
            "formula",
            "task_age",
            "-r",
            r#"{"date_created": "2024-03-01"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("14\n"));
}

#[test]
fn test_formula_rejects_bad_record_json() {
    kanalytics()
        .args(["formula", "points", "-r", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid JSON record"));
}

#[test]
fn test_cache_key_is_stable() {
    let dir = TempDir::new().unwrap();
    let records = write(&dir, "records.json", RECORDS);
    let config = write(&dir, "config.json", r#"{"aggregationType": "count"}"#);

    let run = || {
        let output = kanalytics()
            .args(["--now", "2024-03-15T00:00:00Z", "cache-key"])
            .arg(&records)
            .arg("-c")
            .arg(&config)
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    };

    let first = run();
    assert_eq!(first.trim().len(), 64);
    assert_eq!(first, run());
}
