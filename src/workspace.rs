//! Ephemeral clone workspaces.
//!
//! A [`CloneWorkspace`] is a uniquely named directory under the system temp
//! dir. It is removed when the value is dropped, whether the submission it
//! served succeeded or not. Removal is retried a bounded number of times,
//! since a just-exited `git` can still hold files open on some platforms.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CloneConfig;

/// How many times, and how far apart, to try removing a workspace.
#[derive(Debug, Clone, Copy)]
pub struct ReleasePolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl From<&CloneConfig> for ReleasePolicy {
    fn from(config: &CloneConfig) -> Self {
        Self {
            max_attempts: config.cleanup_attempts.max(1),
            delay: Duration::from_millis(config.cleanup_delay_ms),
        }
    }
}

pub struct CloneWorkspace {
    root: PathBuf,
    policy: ReleasePolicy,
}

impl CloneWorkspace {
    /// Create a fresh workspace under the system temp dir.
    pub fn create(policy: ReleasePolicy) -> Result<Self> {
        Self::create_in(&std::env::temp_dir(), policy)
    }

    pub fn create_in(parent: &Path, policy: ReleasePolicy) -> Result<Self> {
        let root = parent.join(format!("classroom-harness-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create workspace: {}", root.display()))?;
        debug!(workspace = %root.display(), "workspace created");
        Ok(Self { root, policy })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Where a repository named `repo_name` should be cloned.
    pub fn checkout_dir(&self, repo_name: &str) -> PathBuf {
        self.root.join(repo_name)
    }
}

impl Drop for CloneWorkspace {
    fn drop(&mut self) {
        if let Err(e) = remove_with_retries(&self.root, self.policy) {
            warn!(workspace = %self.root.display(), error = %e, "workspace cleanup failed");
        }
    }
}

/// Remove `dir` recursively, retrying up to `policy.max_attempts` times.
///
/// A directory that is already gone counts as removed.
pub fn remove_with_retries(dir: &Path, policy: ReleasePolicy) -> std::io::Result<()> {
    let mut attempt = 1;
    loop {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if attempt >= policy.max_attempts => return Err(e),
            Err(e) => {
                debug!(
                    dir = %dir.display(),
                    attempt,
                    error = %e,
                    "workspace removal failed, retrying"
                );
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> ReleasePolicy {
        ReleasePolicy {
            max_attempts: 2,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let ws = CloneWorkspace::create_in(parent.path(), quick()).unwrap();
            std::fs::create_dir_all(ws.checkout_dir("repo").join("src")).unwrap();
            std::fs::write(ws.checkout_dir("repo").join("src/a.py"), "x").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn removed_on_early_return() {
        let parent = tempfile::tempdir().unwrap();
        let mut seen = None;
        let run = |seen: &mut Option<PathBuf>| -> Result<()> {
            let ws = CloneWorkspace::create_in(parent.path(), quick())?;
            *seen = Some(ws.path().to_path_buf());
            anyhow::bail!("clone failed")
        };
        assert!(run(&mut seen).is_err());
        assert!(!seen.unwrap().exists());
    }

    #[test]
    fn missing_dir_counts_as_removed() {
        let parent = tempfile::tempdir().unwrap();
        remove_with_retries(&parent.path().join("gone"), quick()).unwrap();
    }

    #[test]
    fn workspaces_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let a = CloneWorkspace::create_in(parent.path(), quick()).unwrap();
        let b = CloneWorkspace::create_in(parent.path(), quick()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
