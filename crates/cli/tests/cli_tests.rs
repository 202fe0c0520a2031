use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

fn mpulse() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mpulse"));
    cmd.env_remove("MPULSE_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}):\n{stdout}"))
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn message_ids(records: &Value) -> Vec<i64> {
    records
        .as_array()
        .expect("array of records")
        .iter()
        .map(|r| r["messageId"].as_i64().expect("messageId"))
        .collect()
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// ============================================================================
// run
// ============================================================================

#[test]
fn run_with_rules_commits_survivors() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("processed.jsonl");

    let output = mpulse()
        .args(["run"])
        .arg(fixture("colors.csv"))
        .arg("--rules")
        .arg(fixture("rules.json"))
        .arg("--output")
        .arg(&out)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report = stdout_json(&output);
    assert_eq!(report["inputRows"], 11);
    assert_eq!(report["normalizedRows"], 10);
    assert_eq!(report["excludedCount"], 4);
    assert_eq!(report["rulesApplied"], 2);
    assert_eq!(report["processedCount"], 6);
    assert_eq!(report["normalizationErrors"][0]["column"], "quoteDate");
    assert_eq!(report["receipt"]["processingType"], "AUTOMATED");

    let lines = read_lines(&out);
    let ids: Vec<i64> = lines.iter().map(|r| r["messageId"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![105, 101, 103, 106, 107, 110]);
    assert!(lines.iter().all(|r| r["processingType"] == "AUTOMATED"));
}

#[test]
fn run_override_ignores_rules() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("processed.jsonl");

    let output = mpulse()
        .arg("run")
        .arg(fixture("colors.csv"))
        .arg("--rules")
        .arg(fixture("rules.json"))
        .arg("--override")
        .arg("-o")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("committed 10 record(s)"));
    assert_eq!(read_lines(&out).len(), 10);
}

#[test]
fn run_appends_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/processed.jsonl");

    for _ in 0..2 {
        let status = mpulse()
            .arg("run")
            .arg(fixture("colors.csv"))
            .arg("--override")
            .arg("-o")
            .arg(&out)
            .status()
            .unwrap();
        assert!(status.success());
    }
    assert_eq!(read_lines(&out).len(), 20);
}

#[test]
fn run_strict_refuses_dropped_rows() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("processed.jsonl");

    let output = mpulse()
        .arg("run")
        .arg(fixture("colors.csv"))
        .arg("--strict")
        .arg("-o")
        .arg(&out)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(stderr(&output).contains("quoteDate"));
    assert!(!out.exists());
}

#[test]
fn run_missing_input() {
    let output = mpulse()
        .args(["run", "/nonexistent/colors.csv"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).starts_with("error:"));
}

#[test]
fn run_invalid_rules() {
    let dir = tempfile::tempdir().unwrap();
    let rules = dir.path().join("bad.json");
    std::fs::write(
        &rules,
        r#"[{"id": 1, "name": "bad", "tree": {"type": "leaf", "column": "source", "operator": "greater than", "value": "A"}}]"#,
    )
    .unwrap();

    let output = mpulse()
        .arg("run")
        .arg(fixture("colors.csv"))
        .arg("--rules")
        .arg(&rules)
        .arg("-o")
        .arg(dir.path().join("out.jsonl"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).contains("rule 'bad'"));
    assert!(!dir.path().join("out.jsonl").exists());
}

#[test]
fn run_with_config_aliases_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("desk.csv");
    std::fs::write(
        &input,
        "msg;bond;as_of;rank;level\n1;A;2026-03-02;2;100\n2;A;2026-03-02;1;99\n",
    )
    .unwrap();

    let output = mpulse()
        .current_dir(dir.path())
        .arg("run")
        .arg(&input)
        .arg("--config")
        .arg(fixture("desk.toml"))
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let lines = read_lines(&dir.path().join("desk_out.jsonl"));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["messageId"], 2);
    assert_eq!(lines[0]["isParent"], true);
    assert_eq!(lines[1]["parentMessageId"], 2);
    assert_eq!(lines[1]["diffStatus"], "HIGHER");
}

#[test]
fn run_bad_config_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[columns]\nprice = [\"px\"]\nbid = [\"px\"]\n").unwrap();

    let output = mpulse()
        .arg("run")
        .arg(fixture("colors.csv"))
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("hint:"));
}

// ============================================================================
// review
// ============================================================================

#[test]
fn review_preset_then_rule_then_save() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("processed.jsonl");

    let output = mpulse()
        .arg("review")
        .arg(fixture("colors.csv"))
        .arg("--preset-delete")
        .arg(fixture("rules.json"))
        .args(["--preset-id", "10"])
        .arg("--apply-rules")
        .arg(fixture("rules.json"))
        .args(["--rule-id", "1"])
        .arg("--save")
        .arg("--json")
        .arg("-o")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report = stdout_json(&output);
    assert_eq!(report["session"]["status"], "SAVED");
    assert_eq!(report["session"]["sourceFilename"], "colors.csv");
    assert_eq!(message_ids(&report["session"]["records"]), vec![101, 103, 106, 107, 110]);
    assert_eq!(report["presets"][0]["selected"], 4);
    assert_eq!(report["rules"]["excludedIds"], serde_json::json!([102]));
    assert_eq!(report["commit"]["receipt"]["recordsWritten"], 5);

    let lines = read_lines(&out);
    assert_eq!(lines.len(), 5);
    assert!(lines.iter().all(|r| r["processingType"] == "MANUAL"));
}

#[test]
fn review_without_save_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("processed.jsonl");

    let output = mpulse()
        .arg("review")
        .arg(fixture("colors.csv"))
        .args(["--delete", "102,108"])
        .arg("--json")
        .arg("-o")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report = stdout_json(&output);
    assert_eq!(report["session"]["status"], "OPEN");
    assert_eq!(report["deleted"]["removed"], 2);
    assert_eq!(report["session"]["deletedIds"], serde_json::json!([102, 108]));
    assert!(report.get("commit").is_none());
    assert!(!out.exists());
}

#[test]
fn review_unknown_preset() {
    let output = mpulse()
        .arg("review")
        .arg(fixture("colors.csv"))
        .arg("--preset-delete")
        .arg(fixture("rules.json"))
        .args(["--preset-id", "99"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(11));
    assert!(stderr(&output).contains("preset 99 not found"));
}

#[test]
fn review_preset_file_without_ids_is_usage_error() {
    let output = mpulse()
        .arg("review")
        .arg(fixture("colors.csv"))
        .arg("--preset-delete")
        .arg(fixture("rules.json"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("--preset-id"));
}

#[test]
fn review_save_after_deleting_everything() {
    let dir = tempfile::tempdir().unwrap();
    let all: Vec<String> = (101..=111).map(|i| i.to_string()).collect();

    let output = mpulse()
        .arg("review")
        .arg(fixture("colors.csv"))
        .arg("--delete")
        .arg(all.join(","))
        .arg("--save")
        .arg("-o")
        .arg(dir.path().join("out.jsonl"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(22));
    assert!(stderr(&output).contains("no records to save"));
}

// ============================================================================
// rules
// ============================================================================

#[test]
fn rules_validate_fixture() {
    let output = mpulse()
        .args(["rules", "validate"])
        .arg(fixture("rules.json"))
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("3 rule(s) (2 active), 2 preset(s)"));
}

#[test]
fn rules_validate_rejects_ranking_column() {
    let dir = tempfile::tempdir().unwrap();
    let rules = dir.path().join("derived.json");
    std::fs::write(
        &rules,
        r#"{"rules": [{"id": 1, "name": "moved up", "tree": {"type": "leaf", "column": "diffStatus", "operator": "equals", "value": "HIGHER"}}]}"#,
    )
    .unwrap();

    let output = mpulse().args(["rules", "validate"]).arg(&rules).output().unwrap();
    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).contains("only set by ranking"));
}

#[test]
fn rules_test_counts_matches() {
    let output = mpulse()
        .args(["rules", "test"])
        .arg(fixture("rules.json"))
        .arg(fixture("colors.csv"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report = stdout_json(&output);
    assert_eq!(report["records"], 10);
    assert_eq!(report["droppedRows"], 1);
    assert_eq!(report["excludedCount"], 4);
    assert_eq!(report["remaining"], 6);

    let rules = report["rules"].as_array().unwrap();
    assert_eq!(rules[0]["matchedIds"], serde_json::json!([102, 104, 108]));
    // inactive rules are still reported
    assert_eq!(rules[1]["isActive"], false);
    assert_eq!(rules[1]["matchedIds"], serde_json::json!([103, 110]));
    assert_eq!(rules[2]["matchedIds"], serde_json::json!([109]));
}

// ============================================================================
// read
// ============================================================================

#[test]
fn read_returns_committed_records() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("processed.jsonl");

    let output = mpulse().arg("read").arg("-o").arg(&out).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), serde_json::json!([]));

    let status = mpulse()
        .arg("run")
        .arg(fixture("colors.csv"))
        .arg("--override")
        .arg("-o")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let output = mpulse()
        .args(["read", "--limit", "2", "-o"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(message_ids(&stdout_json(&output)), vec![107, 110]);
}

#[test]
fn read_corrupt_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("processed.jsonl");
    std::fs::write(&out, "not json\n").unwrap();

    let output = mpulse().arg("read").arg("-o").arg(&out).output().unwrap();
    assert_eq!(output.status.code(), Some(30));
}

// ============================================================================
// misc
// ============================================================================

#[test]
fn no_command_prints_usage() {
    let output = mpulse().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Usage: mpulse"));
}
