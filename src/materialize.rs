//! Clone a submission and pull a normalized snapshot out of the checkout.
//!
//! Workflow:
//! 1. Clone into a [`CloneWorkspace`](crate::workspace::CloneWorkspace),
//!    trying the preferred branch first and the repository default second.
//! 2. Walk `src/` and each test directory, applying include globs.
//! 3. Read the first README variant that exists.
//! 4. Ask git for HEAD, the branch name, per-file dates and the recent log.
//!
//! Git metadata is best-effort: a checkout without history still extracts,
//! with `unknown` dates and an empty commit log.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{CloneConfig, Config, ExtractConfig};
use crate::models::{
    CommitRecord, FileRecord, MISSING_README_PLACEHOLDER, UNKNOWN_DATE,
    UNREADABLE_FILE_PLACEHOLDER,
};

/// Field separator for `git log` output; cannot occur in names or subjects.
const LOG_SEP: char = '\u{1f}';

/// Clone operation consumed by the snapshot pipeline.
pub trait RepoCloner {
    /// Clone `full_name` (`owner/repo`) into `target`, preferring `branch`.
    ///
    /// Implementations fall back to the repository's default branch when the
    /// named branch cannot be checked out.
    fn clone_repo(&self, full_name: &str, target: &Path, branch: &str) -> Result<()>;
}

/// Clones with `gh repo clone`, which reuses the CLI's credentials.
pub struct GhCloner {
    program: String,
}

impl GhCloner {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl RepoCloner for GhCloner {
    fn clone_repo(&self, full_name: &str, target: &Path, branch: &str) -> Result<()> {
        let attempt = |with_branch: bool| -> Result<std::process::Output> {
            let mut cmd = Command::new(&self.program);
            cmd.args(["repo", "clone", full_name]).arg(target);
            if with_branch {
                cmd.args(["--", "-b", branch]);
            }
            cmd.output()
                .with_context(|| format!("Failed to execute '{} repo clone'. Is gh installed?", self.program))
        };
        run_with_branch_fallback(full_name, target, branch, attempt)
    }
}

/// Clones `<url_base>/<full_name>` with plain `git`.
pub struct GitCloner {
    url_base: String,
}

impl GitCloner {
    pub fn new(url_base: &str) -> Self {
        Self {
            url_base: url_base.trim_end_matches('/').to_string(),
        }
    }
}

impl RepoCloner for GitCloner {
    fn clone_repo(&self, full_name: &str, target: &Path, branch: &str) -> Result<()> {
        let url = format!("{}/{}", self.url_base, full_name);
        let attempt = |with_branch: bool| -> Result<std::process::Output> {
            let mut cmd = Command::new("git");
            cmd.args(["clone", "--quiet"]);
            if with_branch {
                cmd.args(["--branch", branch]);
            }
            cmd.arg(&url).arg(target);
            cmd.output()
                .with_context(|| "Failed to execute 'git clone'. Is git installed?")
        };
        run_with_branch_fallback(full_name, target, branch, attempt)
    }
}

fn run_with_branch_fallback(
    full_name: &str,
    target: &Path,
    branch: &str,
    attempt: impl Fn(bool) -> Result<std::process::Output>,
) -> Result<()> {
    let output = attempt(true)?;
    if output.status.success() {
        return Ok(());
    }
    info!(
        repo = full_name,
        branch,
        "clone of preferred branch failed, retrying with default branch"
    );
    // A failed clone can leave a partial directory behind
    if target.exists() {
        std::fs::remove_dir_all(target)
            .with_context(|| format!("Failed to clear {}", target.display()))?;
    }
    let output = attempt(false)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{}", stderr.trim());
    }
    Ok(())
}

/// Pick the cloner named by `clone.tool`.
pub fn cloner_for(config: &Config) -> Box<dyn RepoCloner> {
    cloner_from(&config.clone, &config.remote.gh_program)
}

fn cloner_from(clone: &CloneConfig, gh_program: &str) -> Box<dyn RepoCloner> {
    match clone.tool.as_str() {
        "git" => Box::new(GitCloner::new(&clone.url_base)),
        _ => Box::new(GhCloner::new(gh_program)),
    }
}

/// Everything read out of one checkout.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub source_files: Vec<FileRecord>,
    pub test_files: Vec<FileRecord>,
    pub readme: String,
    pub commits: Vec<CommitRecord>,
    pub commit_sha: String,
    pub branch: String,
}

/// Extract sources, tests, README and history from a checkout.
pub fn extract(repo_dir: &Path, config: &ExtractConfig) -> Result<Extraction> {
    if !repo_dir.is_dir() {
        bail!("checkout does not exist: {}", repo_dir.display());
    }
    let include_set = build_globset(&config.include_globs)?;

    let source_files = find_files(repo_dir, &config.source_dir, &include_set)?
        .iter()
        .map(|path| read_file_record(repo_dir, path))
        .collect::<Vec<_>>();

    let mut test_paths = Vec::new();
    for dir in &config.test_dirs {
        test_paths.extend(find_files(repo_dir, dir, &include_set)?);
    }
    test_paths.sort();
    test_paths.dedup();
    let test_files = test_paths
        .iter()
        .map(|path| read_file_record(repo_dir, path))
        .collect::<Vec<_>>();

    Ok(Extraction {
        source_files,
        test_files,
        readme: read_readme(repo_dir, &config.readme_names),
        commits: commit_log(repo_dir, config.commit_limit),
        commit_sha: git_output(repo_dir, &["rev-parse", "HEAD"])
            .unwrap_or_else(|| "unknown".to_string()),
        branch: git_output(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])
            .unwrap_or_else(|| "main".to_string()),
    })
}

/// Files under `repo_dir/subdir` whose subdir-relative path matches, sorted.
fn find_files(repo_dir: &Path, subdir: &str, include_set: &GlobSet) -> Result<Vec<PathBuf>> {
    let root = repo_dir.join(subdir);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
        if include_set.is_match(relative) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn read_file_record(repo_dir: &Path, path: &Path) -> FileRecord {
    let relative = relative_path(repo_dir, path);
    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| {
            debug!(path = %relative, "not valid UTF-8, using placeholder");
            UNREADABLE_FILE_PLACEHOLDER.to_string()
        }),
        Err(e) => {
            debug!(path = %relative, error = %e, "unreadable, using placeholder");
            UNREADABLE_FILE_PLACEHOLDER.to_string()
        }
    };
    let last_modified = git_output(repo_dir, &["log", "-1", "--format=%aI", "--", &relative])
        .map(|date| truncate_to_day(&date))
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());
    FileRecord::new(relative, content, last_modified)
}

/// Repository-relative path with `/` separators.
fn relative_path(repo_dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(repo_dir).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Content of the first README variant present, or the placeholder.
pub fn read_readme(repo_dir: &Path, names: &[String]) -> String {
    for name in names {
        let path = repo_dir.join(name);
        if !path.is_file() {
            continue;
        }
        match std::fs::read(&path) {
            Ok(bytes) => return String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => debug!(path = %path.display(), error = %e, "README unreadable"),
        }
    }
    MISSING_README_PLACEHOLDER.to_string()
}

/// The most recent `limit` commits on HEAD, newest first.
pub fn commit_log(repo_dir: &Path, limit: usize) -> Vec<CommitRecord> {
    let format = format!("--format=%H{0}%an{0}%aI{0}%s", LOG_SEP);
    let limit_arg = format!("-{}", limit);
    let Some(output) = git_output(repo_dir, &["log", &limit_arg, &format]) else {
        return Vec::new();
    };
    output.lines().filter_map(parse_log_line).collect()
}

fn parse_log_line(line: &str) -> Option<CommitRecord> {
    let mut parts = line.splitn(4, LOG_SEP);
    let sha = parts.next()?;
    let author = parts.next()?;
    let date = parts.next()?;
    let subject = parts.next()?;
    Some(CommitRecord {
        short_sha: sha.chars().take(7).collect(),
        author: author.to_string(),
        date: truncate_to_day(date),
        subject: subject.to_string(),
    })
}

fn truncate_to_day(iso: &str) -> String {
    iso.trim().chars().take(10).collect()
}

/// Trimmed stdout of a successful, non-empty `git -C <repo_dir> ...`.
fn git_output(repo_dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
