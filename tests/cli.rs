use std::process::{Command, Output};

fn icftl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_icftl"))
        .args(args)
        .output()
        .expect("run icftl")
}

#[test]
fn validate() {
    let output = icftl(&["./tests/specs.icftl", "validate"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 specifications in 'specs.icftl' successfully validated"));
}

#[test]
fn validate_rejects_invalid() {
    let output = icftl(&["./tests/invalid.icftl", "validate"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("specification 'undeclared'"));
}

#[test]
fn monitor_csv() {
    let output = icftl(&["./tests/specs.icftl", "monitor", "./tests/trace.csv"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("positive_input: 1 satisfied, 1 violated, 0 inconclusive"));
    assert!(stdout.contains("positive_input [ctx=2] binding 1 (evidence at 2)"));
}

#[test]
fn monitor_jsonl_report() {
    let output = icftl(&[
        "./tests/specs.icftl",
        "monitor",
        "--json",
        "--parallel",
        "./tests/trace.jsonl",
    ]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON report");
    assert_eq!(report["events"], 5);
    assert_eq!(report["unknown_points"], 1);
    assert_eq!(report["tallies"]["positive_input"]["satisfied"], 1);
    assert_eq!(report["tallies"]["positive_input"]["violated"], 1);
    assert_eq!(report["verdicts"][0]["decided_by"], 1);
}

#[test]
fn missing_trace() {
    let output = icftl(&["./tests/specs.icftl", "monitor", "./tests/missing.csv"]);
    assert!(!output.status.success());
}
