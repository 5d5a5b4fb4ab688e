//! On-disk snapshot storage.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/index.json
//! <root>/assignments/<assignment>/<student>/<YYYY-MM-DD>.md
//! <root>/assignments/<assignment>/<student>/latest.md
//! <root>/assignments/<assignment>/<student>/draft-feedback-<stem>.md
//! ```
//!
//! Every save writes the dated file (overwriting an earlier save from the
//! same day), repoints `latest.md`, and appends a fresh index entry.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;
use crate::index::{IndexStore, JsonIndexFile, SnapshotEntry, SnapshotIndex};

pub const LATEST_ALIAS: &str = "latest.md";
const ASSIGNMENTS_DIR: &str = "assignments";
const DRAFT_PREFIX: &str = "draft-feedback-";

pub struct SnapshotStore {
    root: PathBuf,
    index: Box<dyn IndexStore>,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, index: Box<dyn IndexStore>) -> Self {
        Self {
            root: root.into(),
            index,
        }
    }

    /// Store rooted at `storage.root` with its JSON index.
    pub fn open(config: &Config) -> Self {
        Self::new(
            config.storage.root.clone(),
            Box::new(JsonIndexFile::new(config.index_path())),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assignment_dir(&self, assignment: &str) -> PathBuf {
        self.root.join(ASSIGNMENTS_DIR).join(assignment)
    }

    pub fn student_dir(&self, assignment: &str, student: &str) -> PathBuf {
        self.assignment_dir(assignment).join(student)
    }

    /// Save a rendered document dated today.
    pub fn save(&self, rendered: &str, assignment: &str, student: &str) -> Result<PathBuf> {
        self.save_at(rendered, assignment, student, Local::now())
    }

    /// Save a rendered document as taken at `now`.
    pub fn save_at(
        &self,
        rendered: &str,
        assignment: &str,
        student: &str,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        let date = now.format("%Y-%m-%d").to_string();
        let dir = self.student_dir(assignment, student);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let file_name = format!("{}.md", date);
        let dated = dir.join(&file_name);
        std::fs::write(&dated, rendered)
            .with_context(|| format!("Failed to write snapshot: {}", dated.display()))?;
        point_latest(&dir, &file_name)?;

        let mut loaded = self.index.load()?;
        loaded.index.append(
            assignment,
            student,
            SnapshotEntry {
                date,
                path: format!("{}/{}/{}/{}", ASSIGNMENTS_DIR, assignment, student, file_name),
                created: now.to_rfc3339(),
                digest: Some(digest(rendered)),
            },
        );
        self.index.save(&loaded.index).with_context(|| {
            format!("Failed to update snapshot index: {}", self.index.describe())
        })?;

        debug!(snapshot = %dated.display(), "snapshot saved");
        Ok(dated)
    }

    pub fn load_index(&self) -> Result<SnapshotIndex> {
        Ok(self.index.load()?.index)
    }

    /// Student directories of an assignment, sorted by name.
    ///
    /// An assignment with no stored snapshots yields an empty list.
    pub fn student_dirs(&self, assignment: &str) -> Result<Vec<(String, PathBuf)>> {
        let dir = self.assignment_dir(assignment);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// SHA-256 hex digest of a rendered document.
pub fn digest(rendered: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Most recent snapshot in a student directory.
///
/// Prefers `latest.md`; otherwise the lexicographically last file named
/// `YYYY-MM-DD.md`. Drafts and other files are never candidates.
pub fn resolve_latest(student_dir: &Path) -> Option<PathBuf> {
    let alias = student_dir.join(LATEST_ALIAS);
    if alias.is_file() {
        return Some(alias);
    }

    let mut dated: Vec<PathBuf> = std::fs::read_dir(student_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_dated_snapshot(p))
        .collect();
    dated.sort();
    dated.pop()
}

fn is_dated_snapshot(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return false;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| NaiveDate::parse_from_str(stem, "%Y-%m-%d").is_ok())
        .unwrap_or(false)
}

/// Where feedback for `snapshot` is drafted: beside it, named after its stem.
pub fn draft_path(snapshot: &Path) -> PathBuf {
    let stem = snapshot
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let dir = snapshot.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}{}.md", DRAFT_PREFIX, stem))
}

pub fn save_draft(snapshot: &Path, feedback: &str) -> Result<PathBuf> {
    let path = draft_path(snapshot);
    std::fs::write(&path, feedback)
        .with_context(|| format!("Failed to write feedback draft: {}", path.display()))?;
    Ok(path)
}

#[cfg(unix)]
fn point_latest(dir: &Path, file_name: &str) -> Result<()> {
    let alias = dir.join(LATEST_ALIAS);
    remove_alias(&alias)?;
    std::os::unix::fs::symlink(file_name, &alias)
        .with_context(|| format!("Failed to link {}", alias.display()))
}

#[cfg(not(unix))]
fn point_latest(dir: &Path, file_name: &str) -> Result<()> {
    let alias = dir.join(LATEST_ALIAS);
    remove_alias(&alias)?;
    std::fs::copy(dir.join(file_name), &alias)
        .with_context(|| format!("Failed to copy {}", alias.display()))?;
    Ok(())
}

fn remove_alias(alias: &Path) -> Result<()> {
    match std::fs::symlink_metadata(alias) {
        Ok(_) => std::fs::remove_file(alias)
            .with_context(|| format!("Failed to replace {}", alias.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to inspect {}", alias.display())),
    }
}
