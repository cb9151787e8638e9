//! CLI surface tests for the `emberc` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_source(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create source");
    file.write_all(content.as_bytes()).expect("write source");
    path
}

#[test]
fn test_valid_source_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(&dir, "ok.em", "a := 5 + 7 * 2;\n");

    Command::cargo_bin("emberc")
        .unwrap()
        .arg(&source)
        .assert()
        .success();
}

#[test]
fn test_parse_error_exits_nonzero_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(&dir, "bad.em", "a := ;\n");

    Command::cargo_bin("emberc")
        .unwrap()
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[B021]"));
}

#[test]
fn test_missing_file_reports_context() {
    Command::cargo_bin("emberc")
        .unwrap()
        .arg("does-not-exist.em")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.em"));
}

#[test]
fn test_no_arguments_shows_usage() {
    Command::cargo_bin("emberc")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_verbose_writes_graph_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(&dir, "ok.em", "a := 1 + 2;\n");
    let ast_path = dir.path().join("ast.dot");
    let dom_path = dir.path().join("dom.dot");

    Command::cargo_bin("emberc")
        .unwrap()
        .arg(&source)
        .arg("--verbose")
        .arg("--ast-graph")
        .arg(&ast_path)
        .arg("--dom-graph")
        .arg(&dom_path)
        .assert()
        .success();

    assert!(ast_path.exists());
    assert!(dom_path.exists());
    let ast_text = std::fs::read_to_string(&ast_path).unwrap();
    assert!(ast_text.starts_with("digraph"));
}

#[test]
fn test_unresolved_identifier_fails() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(&dir, "bad.em", "a := nowhere;\n");

    Command::cargo_bin("emberc")
        .unwrap()
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[P003]"));
}
