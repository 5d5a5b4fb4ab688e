use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn chx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("chx");
    path
}

/// Temp dir with a config that stores snapshots locally, points `gh` at a
/// program that does not exist, and disables the evaluator.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[storage]
root = "{}/harnesses"

[remote]
gh_program = "{}/no-such-gh"

[evaluator]
provider = "disabled"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("harness.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_chx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = chx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run chx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(chx_binary()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["snapshot", "list-snapshots", "evaluate", "batch-evaluate", "create-issue"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_missing_config_file_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_chx(&tmp.path().join("nope.toml"), &["classrooms"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[clone]\ntool = \"svn\"\n").unwrap();
    let (_, stderr, success) = run_chx(&config_path, &["classrooms"]);
    assert!(!success);
    assert!(stderr.contains("Unknown clone tool"), "stderr={}", stderr);
}

#[test]
fn test_all_and_student_conflict() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) =
        run_chx(&config_path, &["snapshot", "42", "--all", "--student", "alice"]);
    assert!(!success);
    assert!(stderr.contains("cannot be used with"), "stderr={}", stderr);
}

#[test]
fn test_evaluate_requires_rubric_flag() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_chx(&config_path, &["evaluate", "doc.md"]);
    assert!(!success);
}

#[test]
fn test_evaluate_missing_harness_file() {
    let (tmp, config_path) = setup_test_env();
    let rubric = tmp.path().join("rubric.md");
    fs::write(&rubric, "# Rubric").unwrap();

    let missing = tmp.path().join("missing.md");
    let (_, stderr, success) = run_chx(
        &config_path,
        &["evaluate", missing.to_str().unwrap(), "--rubric", rubric.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("Harness file not found"), "stderr={}", stderr);
}

#[test]
fn test_evaluate_missing_rubric_file() {
    let (tmp, config_path) = setup_test_env();
    let harness = tmp.path().join("2024-01-01.md");
    fs::write(&harness, "# Harness").unwrap();

    let rubric = tmp.path().join("missing-rubric.md");
    let (_, stderr, success) = run_chx(
        &config_path,
        &["evaluate", harness.to_str().unwrap(), "--rubric", rubric.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("Rubric file not found"), "stderr={}", stderr);
}

#[test]
fn test_evaluate_with_disabled_evaluator() {
    let (tmp, config_path) = setup_test_env();
    let harness = tmp.path().join("2024-01-01.md");
    let rubric = tmp.path().join("rubric.md");
    fs::write(&harness, "# Harness").unwrap();
    fs::write(&rubric, "# Rubric").unwrap();

    let (_, stderr, success) = run_chx(
        &config_path,
        &["evaluate", harness.to_str().unwrap(), "--rubric", rubric.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("evaluator is disabled"), "stderr={}", stderr);
    assert!(!tmp.path().join("draft-feedback-2024-01-01.md").exists());
}

#[test]
fn test_list_snapshots_reads_index_without_remote() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path().join("harnesses");
    fs::create_dir_all(&root).unwrap();
    fs::write(
        root.join("index.json"),
        r#"{
  "77": {
    "alice": {
      "snapshots": [
        {"date": "2024-02-01", "path": "assignments/77/alice/2024-02-01.md", "created": "2024-02-01T10:00:00+00:00"}
      ],
      "latest": "assignments/77/alice/2024-02-01.md"
    }
  },
  "hw-77": {
    "bob": {
      "snapshots": [
        {"date": "2024-03-01", "path": "assignments/hw-77/bob/2024-03-01.md", "created": "2024-03-01T10:00:00+00:00"}
      ],
      "latest": "assignments/hw-77/bob/2024-03-01.md"
    }
  }
}"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_chx(&config_path, &["list-snapshots", "77"]);
    assert!(success, "list failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("alice: 1 snapshot(s)"));
    assert!(stdout.contains("2024-02-01"));
    assert!(!stdout.contains("hw-77"), "stdout={}", stdout);
    assert!(!stdout.contains("bob"));
}

#[test]
fn test_list_snapshots_empty_index() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_chx(&config_path, &["list-snapshots", "5"]);
    assert!(success);
    assert!(stdout.contains("No snapshots found"));
}

#[test]
fn test_snapshot_unreachable_remote_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_chx(&config_path, &["snapshot", "42", "--all"]);
    assert!(!success);
    assert!(stderr.contains("could not fetch assignment 42"), "stderr={}", stderr);
}
