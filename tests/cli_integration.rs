//! Command-line interface: index, lookup, apply, rollback and history.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const UTILS: &str = "\
import os


def a():
    return 1


def validate_x(v):
    return v > a()


def b():
    return 2
";

fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("utils.py"), UTILS).unwrap();
    fs::write(
        dir.path().join("app.py"),
        "from utils import validate_x\n\n\ndef run(v):\n    return validate_x(v)\n",
    )
    .unwrap();
    dir
}

fn patchwright(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_patchwright"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn apply_help_describes_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_patchwright"))
        .args(["apply", "--help"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("Resolve, stage and apply a batch of proposed edits"));
}

#[test]
fn index_reports_parsed_files() {
    let project = setup_project();
    let output = patchwright(project.path(), &["--json", "index"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let indexed = report["indexed"].as_array().unwrap();
    assert_eq!(indexed.len(), 2);
}

#[test]
fn lookup_prints_symbol_location() {
    let project = setup_project();
    let output = patchwright(project.path(), &["--json", "lookup", "validate_x"]);
    assert!(output.status.success());

    let symbol: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(symbol["name"], "validate_x");
    assert_eq!(symbol["path"], "utils.py");

    let missing = patchwright(project.path(), &["lookup", "nope"]);
    assert!(!missing.status.success());
}

#[test]
fn dry_run_leaves_files_untouched() {
    let project = setup_project();
    let batch = project.path().join("batch.txt");
    fs::write(
        &batch,
        "utils.py\n<<<<<<< SEARCH\n    return 2\n=======\n    return 22\n>>>>>>> REPLACE\n",
    )
    .unwrap();

    let output = patchwright(
        project.path(),
        &["apply", batch.to_str().unwrap(), "--format", "blocks", "--dry-run"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("DRY RUN"));
    assert_eq!(fs::read_to_string(project.path().join("utils.py")).unwrap(), UTILS);
}

#[test]
fn apply_rollback_and_history() {
    let project = setup_project();
    let batch = project.path().join("batch.json");
    fs::write(
        &batch,
        r#"{"edits": [{"id": "bump", "op": "replace",
            "target": {"symbol": {"name": "b"}},
            "payload": "def b():\n    return 3"}]}"#,
    )
    .unwrap();

    let output = patchwright(project.path(), &["--json", "apply", batch.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let review: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(review["state"], "applied");
    let tx_id = review["tx_id"].as_str().unwrap().to_string();
    assert!(fs::read_to_string(project.path().join("utils.py"))
        .unwrap()
        .contains("return 3"));

    let output = patchwright(project.path(), &["rollback", &tx_id]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(project.path().join("utils.py")).unwrap(), UTILS);

    let output = patchwright(project.path(), &["--json", "history"]);
    let history: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let states: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["state"].as_str().unwrap())
        .collect();
    assert_eq!(states, vec!["applied", "rolled_back"]);
}

#[test]
fn unresolved_edit_blocks_apply_without_allow_partial() {
    let project = setup_project();
    let batch = project.path().join("batch.json");
    fs::write(
        &batch,
        r#"[{"op": "delete", "target": {"symbol": {"name": "ghost"}}},
            {"op": "replace", "target": {"symbol": {"name": "b"}},
             "payload": "def b():\n    return 3"}]"#,
    )
    .unwrap();

    let output = patchwright(project.path(), &["apply", batch.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("symbol_not_found"));
    assert_eq!(fs::read_to_string(project.path().join("utils.py")).unwrap(), UTILS);

    let output = patchwright(
        project.path(),
        &["apply", batch.to_str().unwrap(), "--allow-partial"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(fs::read_to_string(project.path().join("utils.py"))
        .unwrap()
        .contains("return 3"));
}
