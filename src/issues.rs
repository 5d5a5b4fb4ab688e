//! Posting reviewed feedback as an issue on a student's repository.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::warn;

use crate::classroom::ClassroomApi;
use crate::evaluate::read_required;

pub trait IssuePoster {
    /// Open an issue and return its URL.
    fn post_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        label: Option<&str>,
    ) -> Result<String>;
}

/// [`IssuePoster`] backed by `gh issue create`.
pub struct GhIssues {
    program: String,
}

impl GhIssues {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl IssuePoster for GhIssues {
    fn post_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        label: Option<&str>,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["issue", "create", "--repo", repo, "--title", title, "--body", body]);
        if let Some(label) = label {
            cmd.args(["--label", label]);
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to run {}", self.program))?;
        if !output.status.success() {
            bail!(
                "gh issue create failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Post with `label`, retrying once without it if that fails.
///
/// A repository that lacks the label rejects the whole request, so the
/// second attempt drops it rather than giving up on the feedback.
pub fn post_with_label_fallback(
    poster: &dyn IssuePoster,
    repo: &str,
    title: &str,
    body: &str,
    label: Option<&str>,
) -> Result<String> {
    let Some(label) = label else {
        return poster.post_issue(repo, title, body, None);
    };
    match poster.post_issue(repo, title, body, Some(label)) {
        Ok(url) => Ok(url),
        Err(e) => {
            warn!(repo, label, error = %format!("{:#}", e), "retrying issue without label");
            poster
                .post_issue(repo, title, body, None)
                .context("Failed to create issue")
        }
    }
}

/// Post a feedback file to the repository of the submission containing `login`.
///
/// The issue is titled `Feedback: <file stem>`.
pub fn create_feedback_issue(
    api: &dyn ClassroomApi,
    poster: &dyn IssuePoster,
    assignment_id: &str,
    login: &str,
    feedback_file: &Path,
    label: Option<&str>,
) -> Result<String> {
    let body = read_required("Feedback file", feedback_file)?;

    let repo = api
        .accepted_submissions(assignment_id)?
        .into_iter()
        .find(|s| s.submitters.contains_login(login))
        .and_then(|s| s.repo_full_name().map(str::to_string))
        .ok_or_else(|| anyhow!("No repository found for student {}", login))?;

    let stem = feedback_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    post_with_label_fallback(poster, &repo, &format!("Feedback: {}", stem), &body, label)
}
