//! The snapshot index: assignment → student → snapshot history.
//!
//! The index is append-only per entry. Saving a snapshot pushes a new entry
//! and repoints `latest`; existing entries are never rewritten.
//!
//! Persistence goes through the [`IndexStore`] trait so the snapshot store
//! can be handed a JSON file in production and an in-memory index in tests.
//!
//! # Concurrency
//!
//! Loading and saving are whole-file operations with no locking. Only one
//! process may write a given index at a time. Writes go through a temp file
//! and a rename, so an interrupted run leaves either the old or the new
//! index on disk, never a truncated one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

/// One saved snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// `YYYY-MM-DD` the snapshot was taken.
    pub date: String,
    /// Path of the snapshot file, relative to the storage root.
    pub path: String,
    /// RFC 3339 timestamp of the save.
    pub created: String,
    /// SHA-256 of the rendered document. Absent in entries written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Every snapshot of one (assignment, student) pair, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentHistory {
    #[serde(default)]
    pub snapshots: Vec<SnapshotEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
}

pub type AssignmentSnapshots = BTreeMap<String, StudentHistory>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotIndex {
    assignments: BTreeMap<String, AssignmentSnapshots>,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` for the pair and make it `latest`.
    pub fn append(&mut self, assignment: &str, student: &str, entry: SnapshotEntry) {
        let history = self
            .assignments
            .entry(assignment.to_string())
            .or_default()
            .entry(student.to_string())
            .or_default();
        history.latest = Some(entry.path.clone());
        history.snapshots.push(entry);
    }

    pub fn history(&self, assignment: &str, student: &str) -> Option<&StudentHistory> {
        self.assignments.get(assignment)?.get(student)
    }

    pub fn assignment(&self, assignment: &str) -> Option<&AssignmentSnapshots> {
        self.assignments.get(assignment)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssignmentSnapshots)> {
        self.assignments.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// How an index load went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    /// No index existed yet.
    Missing,
    Parsed,
    /// The stored index was unreadable and an empty one was substituted.
    Recovered { reason: String },
}

#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub index: SnapshotIndex,
    pub source: IndexSource,
}

impl LoadedIndex {
    fn empty(source: IndexSource) -> Self {
        Self {
            index: SnapshotIndex::new(),
            source,
        }
    }
}

/// Persistence for the snapshot index.
pub trait IndexStore {
    /// Load the index. A missing or malformed index loads as empty.
    fn load(&self) -> Result<LoadedIndex>;

    /// Replace the stored index with `index`.
    fn save(&self, index: &SnapshotIndex) -> Result<()>;

    /// Human-readable location, for messages.
    fn describe(&self) -> String;
}

/// Index stored as pretty-printed JSON in a single file.
pub struct JsonIndexFile {
    path: PathBuf,
}

impl JsonIndexFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexStore for JsonIndexFile {
    fn load(&self) -> Result<LoadedIndex> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedIndex::empty(IndexSource::Missing));
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read index: {}", self.path.display())
                })
            }
        };

        match serde_json::from_slice::<SnapshotIndex>(&bytes) {
            Ok(index) => Ok(LoadedIndex {
                index,
                source: IndexSource::Parsed,
            }),
            Err(e) => {
                warn!(
                    index = %self.path.display(),
                    error = %e,
                    "snapshot index is malformed, falling back to an empty index"
                );
                Ok(LoadedIndex::empty(IndexSource::Recovered {
                    reason: e.to_string(),
                }))
            }
        }
    }

    fn save(&self, index: &SnapshotIndex) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index.json".to_string());
        let temp_path = parent.join(format!("{}.tmp.{}", file_name, std::process::id()));

        let json = serde_json::to_string_pretty(index)?;
        let mut file = std::fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace index: {}", self.path.display()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process index, for tests and dry runs.
#[derive(Default)]
pub struct MemoryIndex {
    index: RwLock<Option<SnapshotIndex>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SnapshotIndex {
        self.index
            .read()
            .map(|guard| guard.clone().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl IndexStore for MemoryIndex {
    fn load(&self) -> Result<LoadedIndex> {
        let guard = self
            .index
            .read()
            .map_err(|_| anyhow::anyhow!("memory index lock poisoned"))?;
        Ok(match guard.as_ref() {
            Some(index) => LoadedIndex {
                index: index.clone(),
                source: IndexSource::Parsed,
            },
            None => LoadedIndex::empty(IndexSource::Missing),
        })
    }

    fn save(&self, index: &SnapshotIndex) -> Result<()> {
        let mut guard = self
            .index
            .write()
            .map_err(|_| anyhow::anyhow!("memory index lock poisoned"))?;
        *guard = Some(index.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "(in-memory index)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(date: &str, path: &str) -> SnapshotEntry {
        SnapshotEntry {
            date: date.to_string(),
            path: path.to_string(),
            created: format!("{}T12:00:00+00:00", date),
            digest: None,
        }
    }

    #[test]
    fn append_moves_latest_and_keeps_history() {
        let mut index = SnapshotIndex::new();
        index.append("hw1", "alice", entry("2024-01-01", "a/1.md"));
        index.append("hw1", "alice", entry("2024-01-02", "a/2.md"));
        index.append("hw1", "bob", entry("2024-01-02", "b/2.md"));

        let alice = index.history("hw1", "alice").unwrap();
        assert_eq!(alice.snapshots.len(), 2);
        assert_eq!(alice.snapshots[0].path, "a/1.md");
        assert_eq!(alice.latest.as_deref(), Some("a/2.md"));
        assert_eq!(index.assignment("hw1").unwrap().len(), 2);
    }

    #[test]
    fn json_shape_matches_on_disk_format() {
        let mut index = SnapshotIndex::new();
        index.append("hw1", "alice", entry("2024-01-01", "a/1.md"));
        let value = serde_json::to_value(&index).unwrap();
        assert_eq!(value["hw1"]["alice"]["latest"], "a/1.md");
        assert_eq!(value["hw1"]["alice"]["snapshots"][0]["date"], "2024-01-01");
        assert!(value["hw1"]["alice"]["snapshots"][0].get("digest").is_none());
    }

    #[test]
    fn loads_entries_without_digest() {
        let json = r#"{"hw1": {"alice": {"snapshots": [
            {"date": "2024-01-01", "path": "p.md", "created": "2024-01-01T00:00:00"}
        ], "latest": "p.md"}}}"#;
        let index: SnapshotIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.history("hw1", "alice").unwrap().snapshots.len(), 1);
    }

    #[test]
    fn file_round_trip_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonIndexFile::new(tmp.path().join("nested/index.json"));
        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, IndexSource::Missing);
        assert!(loaded.index.is_empty());

        let mut index = SnapshotIndex::new();
        index.append("hw1", "alice", entry("2024-01-01", "a/1.md"));
        store.save(&index).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, IndexSource::Parsed);
        assert_eq!(loaded.index, index);

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_file_recovers_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(&path, "{ not json").unwrap();
        let loaded = JsonIndexFile::new(&path).load().unwrap();
        assert!(loaded.index.is_empty());
        assert!(matches!(loaded.source, IndexSource::Recovered { .. }));
    }

    #[test]
    fn assignment_lookup_is_exact() {
        let mut index = SnapshotIndex::new();
        index.append("homework-intro", "alice", entry("2024-01-01", "a.md"));
        index.append("project-1", "bob", entry("2024-01-01", "p.md"));
        index.append("hw-10", "carol", entry("2024-01-01", "h.md"));
        let students = index.assignment("homework-intro").unwrap();
        assert_eq!(students.keys().collect::<Vec<_>>(), vec!["alice"]);
        assert!(index.assignment("1").is_none());
        assert!(index.assignment("hw-1").is_none());
    }

    #[test]
    fn memory_index_round_trip() {
        let store = MemoryIndex::new();
        assert_eq!(store.load().unwrap().source, IndexSource::Missing);
        let mut index = SnapshotIndex::new();
        index.append("hw1", "alice", entry("2024-01-01", "a.md"));
        store.save(&index).unwrap();
        assert_eq!(store.snapshot(), index);
    }
}
