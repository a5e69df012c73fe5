//! Command-line tests for the `sql-guard` binary.
//!
//! Each test runs the built binary with a clean environment:
//!
//! ```bash
//! cargo test --test cli_tests
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

fn sql_guard() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sql-guard"));
    cmd.env_clear();
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn scratch_file(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "sql-guard-cli-{}.sql",
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_check_accepts_argument() {
    let output = sql_guard()
        .args(["check", "SELECT * FROM accounts WHERE id = 5"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "BEGIN;\n-- User SQL\nSELECT * FROM accounts WHERE id = 5;\nCOMMIT;\n"
    );
}

#[test]
fn test_check_reads_stdin() {
    let mut cmd = sql_guard();
    cmd.arg("check");
    let output = run_with_stdin(cmd, "DELETE FROM t WHERE id = 3;\n");

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "BEGIN;\n-- Safety check\nSELECT COUNT(*) FROM t WHERE id = 3;\n-- User SQL\nDELETE FROM t WHERE id = 3;\nCOMMIT;\n"
    );
}

#[test]
fn test_check_reads_file() {
    let path = scratch_file("UPDATE accounts SET balance = 0 WHERE id = 5\n");
    let output = sql_guard()
        .arg("check")
        .arg("--file")
        .arg(&path)
        .output()
        .unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output)
        .contains("-- Safety check\nSELECT COUNT(*) FROM accounts WHERE id = 5;\n"));
}

#[test]
fn test_check_rejection_exits_2() {
    let output = sql_guard()
        .args(["check", "DROP TABLE accounts"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("error: forbidden keyword(s): DROP"));

    let output = sql_guard().args(["check", "   "]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("empty statement"));
}

#[test]
fn test_check_json_output() {
    let output = sql_guard()
        .args(["check", "--format", "json", "DELETE FROM t WHERE id = 2"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["leading_verb"], "DELETE");
    assert_eq!(json["safety_check"], "SELECT COUNT(*) FROM t WHERE id = 2;");
    assert!(json["wrapped_script"]
        .as_str()
        .unwrap()
        .starts_with("BEGIN;\n"));
    assert!(json.get("reason").is_none());

    let output = sql_guard()
        .args(["--format", "json", "check", "SELECT set_config('role', 'x', false)"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "rejected");
    assert_eq!(json["reason"], "forbidden keyword(s): SET");
    assert!(json.get("wrapped_script").is_none());
}

#[test]
fn test_check_ignores_unrelated_settings() {
    let output = sql_guard()
        .env("SQLGUARD_DB_PORT", "not-a-port")
        .env("SQLGUARD_BRANCH_MAP", "main")
        .args(["check", "SELECT 1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let output = sql_guard()
        .env("SQLGUARD_ALLOWED_VERBS", "INSERT")
        .args(["check", "SELECT 1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(78));
}

#[test]
fn test_run_dry_run_and_rejection() {
    let output = sql_guard()
        .env("SQLGUARD_HOST_DEV", "{client}-dev.db.internal")
        .args([
            "run",
            "--client",
            "acme",
            "--database",
            "billing",
            "--branch",
            "develop",
            "--dry-run",
            "SELECT 1",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(stdout(&output), "BEGIN;\n-- User SQL\nSELECT 1;\nCOMMIT;\n");
    assert!(stderr(&output).contains("acme-dev.db.internal"));

    let output = sql_guard()
        .env("SQLGUARD_HOST_DEV", "{client}-dev.db.internal")
        .args([
            "run",
            "--client",
            "acme",
            "--database",
            "billing",
            "--branch",
            "develop",
            "TRUNCATE invoices",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("TRUNCATE"));
}
