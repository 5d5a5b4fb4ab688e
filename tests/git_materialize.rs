//! Clone-and-extract against real local git repositories.
//!
//! Skipped when `git` is not on PATH.

use classroom_harness::config::ExtractConfig;
use classroom_harness::materialize::{extract, GitCloner, RepoCloner};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str], date: &str) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Test Student", "-c", "user.email=student@example.com"])
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=trunk"])
        .args(args)
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// `<tmp>/org/hw1-student` with two commits on branch `trunk`.
fn make_origin(tmp: &TempDir) -> std::path::PathBuf {
    let repo = tmp.path().join("org/hw1-student");
    fs::create_dir_all(repo.join("src")).unwrap();
    fs::create_dir_all(repo.join("unit_tests")).unwrap();

    git(&repo, &["init", "--quiet"], "2024-03-01T09:00:00+00:00");
    fs::write(repo.join("README.md"), "# Homework\n").unwrap();
    fs::write(repo.join("src/app.py"), "print('v1')\n").unwrap();
    git(&repo, &["add", "."], "2024-03-01T09:00:00+00:00");
    git(&repo, &["commit", "--quiet", "-m", "Initial commit"], "2024-03-01T09:00:00+00:00");

    fs::write(repo.join("unit_tests/test_app.py"), "def test_app(): pass\n").unwrap();
    git(&repo, &["add", "."], "2024-03-04T18:30:00+00:00");
    git(&repo, &["commit", "--quiet", "-m", "Add tests"], "2024-03-04T18:30:00+00:00");
    git(&repo, &["branch", "-M", "trunk"], "2024-03-04T18:30:00+00:00");
    repo
}

#[test]
fn clone_falls_back_to_default_branch_and_extracts() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let origin = TempDir::new().unwrap();
    make_origin(&origin);

    let work = TempDir::new().unwrap();
    let target = work.path().join("hw1-student");
    let cloner = GitCloner::new(&format!("file://{}", origin.path().display()));
    cloner
        .clone_repo("org/hw1-student", &target, "main")
        .unwrap();

    let extraction = extract(&target, &ExtractConfig::default()).unwrap();
    assert_eq!(extraction.branch, "trunk");
    assert_eq!(extraction.commit_sha.len(), 40);
    assert_eq!(extraction.readme, "# Homework\n");

    assert_eq!(extraction.commits.len(), 2);
    assert_eq!(extraction.commits[0].subject, "Add tests");
    assert_eq!(extraction.commits[0].date, "2024-03-04");
    assert_eq!(extraction.commits[1].date, "2024-03-01");
    assert_eq!(extraction.commits[0].short_sha.len(), 7);
    assert_eq!(extraction.commits[0].author, "Test Student");

    assert_eq!(extraction.source_files.len(), 1);
    assert_eq!(extraction.source_files[0].relative_path, "src/app.py");
    assert_eq!(extraction.source_files[0].last_modified, "2024-03-01");
    assert_eq!(extraction.test_files[0].last_modified, "2024-03-04");
}

#[test]
fn commit_limit_bounds_history() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let origin = TempDir::new().unwrap();
    let repo = make_origin(&origin);

    let config = ExtractConfig {
        commit_limit: 1,
        ..Default::default()
    };
    let extraction = extract(&repo, &config).unwrap();
    assert_eq!(extraction.commits.len(), 1);
    assert_eq!(extraction.commits[0].subject, "Add tests");
}

#[test]
fn missing_repository_is_an_error() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let origin = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let target = work.path().join("ghost");
    let cloner = GitCloner::new(&format!("file://{}", origin.path().display()));
    assert!(cloner.clone_repo("org/ghost", &target, "main").is_err());
    assert!(!target.exists());
}
