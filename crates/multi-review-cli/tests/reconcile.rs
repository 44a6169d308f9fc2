use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use std::fs::write;

const INLINE_VARS: [&str; 3] = [
    "INLINE_MAX_COMMENTS",
    "INLINE_MIN_SEVERITY",
    "INLINE_MIN_AGREEMENT",
];

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("multi-review-cli").unwrap();
    for var in INLINE_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn write_findings(dir: &tempfile::TempDir) -> (String, String) {
    let first = dir.path().join("p1.json");
    write(
        &first,
        r#"[
            {"file": "src/cache.rs", "line": 12, "severity": "major", "title": "Stale entry returned"},
            {"file": "src/util.rs", "line": 3, "severity": "minor", "title": "Nit"}
        ]"#,
    )
    .unwrap();
    let second = dir.path().join("p2.jsonl");
    write(
        &second,
        "{\"file\": \"src/cache.rs\", \"line\": 12, \"severity\": \"critical\", \"title\": \"stale entry returned\"}\n",
    )
    .unwrap();
    (
        format!("opencode/big-pickle={}", first.display()),
        format!("openrouter/x/y={}", second.display()),
    )
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).unwrap()
}

#[test]
fn reconcile_emits_posting_payload() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_findings(&temp);

    let output = cli()
        .args(["reconcile", "--findings", &first, "--findings", &second])
        .output()
        .unwrap();
    assert!(output.status.success());

    let comments = stdout_json(&output.stdout);
    let comments = comments.as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["path"], "src/cache.rs");
    assert_eq!(comments[0]["line"], 12);
    assert_eq!(comments[0]["side"], "RIGHT");
    assert!(comments[0]["body"]
        .as_str()
        .unwrap()
        .starts_with("**critical**: stale entry returned"));
}

#[test]
fn agreement_flag_requires_multiple_providers() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_findings(&temp);

    let output = cli()
        .args([
            "reconcile",
            "--findings",
            &first,
            "--findings",
            &second,
            "--min-severity",
            "minor",
            "--min-agreement",
            "2",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let comments = stdout_json(&output.stdout);
    assert_eq!(comments.as_array().unwrap().len(), 1);
    assert_eq!(comments[0]["path"], "src/cache.rs");
}

#[test]
fn empty_inputs_produce_empty_array() {
    cli()
        .arg("reconcile")
        .assert()
        .success()
        .stdout(predicate::eq("[]\n"));
}

#[test]
fn unusable_structured_block_is_ignored() {
    let temp = tempfile::tempdir().unwrap();
    let block = temp.path().join("struct.json");
    write(&block, "not json at all").unwrap();

    cli()
        .args(["reconcile", "--structured", block.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::eq("[]\n"));
}

#[test]
fn structured_block_findings_are_posted() {
    let temp = tempfile::tempdir().unwrap();
    let block = temp.path().join("struct.json");
    write(
        &block,
        r#"{"findings": [{"file": "a.py", "line": 4, "severity": "critical", "message": "Division by zero"}]}"#,
    )
    .unwrap();

    cli()
        .args([
            "reconcile",
            "--structured",
            block.to_str().unwrap(),
            "--format",
            "human",
        ])
        .assert()
        .success()
        .stdout(contains("a.py:4 [critical] Division by zero"))
        .stdout(contains("providers: synthesis"));
}

#[test]
fn environment_overrides_default_cap() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("many.json");
    write(
        &path,
        r#"[
            {"file": "a.rs", "line": 1, "severity": "major", "title": "one"},
            {"file": "a.rs", "line": 2, "severity": "major", "title": "two"},
            {"file": "a.rs", "line": 3, "severity": "major", "title": "three"}
        ]"#,
    )
    .unwrap();
    let findings = format!("opencode/big-pickle={}", path.display());

    let output = cli()
        .env("INLINE_MAX_COMMENTS", "1")
        .args(["reconcile", "--findings", &findings])
        .output()
        .unwrap();
    assert!(output.status.success());
    let comments = stdout_json(&output.stdout);
    assert_eq!(comments.as_array().unwrap().len(), 1);
    assert_eq!(comments[0]["line"], 1);

    let output = cli()
        .env("INLINE_MAX_COMMENTS", "1")
        .args([
            "reconcile",
            "--findings",
            &findings,
            "--max-comments",
            "2",
        ])
        .output()
        .unwrap();
    assert_eq!(stdout_json(&output.stdout).as_array().unwrap().len(), 2);
}

#[test]
fn config_file_thresholds_apply() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_findings(&temp);
    let config = temp.path().join("review.yml");
    write(&config, "inline_min_severity: minor\ninline_max_comments: 5\n").unwrap();

    let output = cli()
        .args([
            "reconcile",
            "--findings",
            &first,
            "--findings",
            &second,
            "--config",
            config.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output.stdout).as_array().unwrap().len(), 2);
}

#[test]
fn changed_files_limit_scope() {
    let temp = tempfile::tempdir().unwrap();
    let (first, second) = write_findings(&temp);
    let pr_files = temp.path().join("pr_files.json");
    write(&pr_files, r#"[{"filename": "src/util.rs", "additions": 1}]"#).unwrap();

    let output = cli()
        .args([
            "reconcile",
            "--findings",
            &first,
            "--findings",
            &second,
            "--min-severity",
            "minor",
            "--pr-files",
            pr_files.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    let comments = stdout_json(&output.stdout);
    assert_eq!(comments.as_array().unwrap().len(), 1);
    assert_eq!(comments[0]["path"], "src/util.rs");
}

#[test]
fn invalid_threshold_fails() {
    cli()
        .args(["reconcile", "--max-comments", "lots"])
        .assert()
        .failure()
        .stderr(contains("max_comments must be an integer"));
}

#[test]
fn malformed_findings_file_fails() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.jsonl");
    write(&path, "{\"file\": \"a.rs\", \"line\": 1}\n{oops\n").unwrap();

    cli()
        .args(["reconcile", "--findings", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("invalid JSON finding"));
}
