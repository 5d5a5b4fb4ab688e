//! Read access to the classroom API.
//!
//! [`ClassroomApi`] is the seam the snapshot pipeline talks to; [`GhCli`]
//! implements it by shelling out to `gh api`, which owns authentication.
//! Paginated responses (`gh api --paginate` prints one JSON document per
//! page) are concatenated into a single ordered list.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::process::Command;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::ConfigError;
use crate::models::{AcceptedAssignment, Assignment, Submission};

/// Remote query service consumed by the snapshot pipeline.
pub trait ClassroomApi {
    /// Fetch assignment metadata. `Ok(None)` when the assignment cannot be found.
    fn assignment(&self, assignment_id: &str) -> Result<Option<Assignment>>;

    /// Every accepted submission, across all pages, in API order.
    fn accepted_submissions(&self, assignment_id: &str) -> Result<Vec<Submission>>;
}

/// [`ClassroomApi`] backed by the `gh` CLI.
pub struct GhCli {
    program: String,
}

impl GhCli {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            program: config.gh_program.clone(),
        }
    }

    /// Run `gh api <endpoint>` and parse the response.
    ///
    /// With `paginate`, every page must be a JSON array and the arrays are
    /// concatenated; a non-array page is appended as a single item.
    pub fn api(&self, endpoint: &str, paginate: bool) -> Result<Value> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["api", endpoint, "--header", "Accept: application/vnd.github+json"]);
        if paginate {
            cmd.arg("--paginate");
        }
        debug!(endpoint, paginate, "gh api");

        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute '{} api'. Is gh installed?", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("gh api {} failed: {}", endpoint, stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if paginate {
            Ok(Value::Array(concat_pages(&stdout)?))
        } else if stdout.trim().is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str(&stdout)
                .with_context(|| format!("gh api {} returned invalid JSON", endpoint))
        }
    }

    pub fn classrooms(&self) -> Result<Value> {
        self.api("/classrooms", true)
    }

    pub fn classroom_assignments(&self, classroom_id: &str) -> Result<Value> {
        self.api(&format!("/classrooms/{}/assignments", classroom_id), true)
    }

    pub fn raw_assignment(&self, assignment_id: &str) -> Result<Value> {
        self.api(&format!("/assignments/{}", assignment_id), false)
    }

    pub fn raw_accepted(&self, assignment_id: &str) -> Result<Value> {
        self.api(
            &format!("/assignments/{}/accepted_assignments", assignment_id),
            true,
        )
    }
}

impl ClassroomApi for GhCli {
    fn assignment(&self, assignment_id: &str) -> Result<Option<Assignment>> {
        let value = self.raw_assignment(assignment_id)?;
        if value.as_object().map_or(true, |o| o.is_empty()) {
            return Ok(None);
        }
        let assignment = serde_json::from_value(value)
            .with_context(|| format!("Unexpected assignment payload for {}", assignment_id))?;
        Ok(Some(assignment))
    }

    fn accepted_submissions(&self, assignment_id: &str) -> Result<Vec<Submission>> {
        let Value::Array(items) = self.raw_accepted(assignment_id)? else {
            return Ok(Vec::new());
        };
        items
            .into_iter()
            .map(|item| {
                let accepted: AcceptedAssignment = serde_json::from_value(item)
                    .context("Unexpected accepted_assignments payload")?;
                Ok(Submission::from(accepted))
            })
            .collect()
    }
}

/// Split concatenated JSON documents and flatten array pages.
fn concat_pages(stdout: &str) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    for page in serde_json::Deserializer::from_str(stdout).into_iter::<Value>() {
        match page.context("gh api returned invalid JSON page")? {
            Value::Array(values) => items.extend(values),
            other => items.push(other),
        }
    }
    Ok(items)
}

/// Resolve an assignment or fail with a configuration error.
pub fn require_assignment(api: &dyn ClassroomApi, assignment_id: &str) -> Result<Assignment> {
    match api.assignment(assignment_id) {
        Ok(Some(assignment)) => Ok(assignment),
        Ok(None) => Err(ConfigError::UnknownAssignment(assignment_id.to_string()).into()),
        Err(e) => Err(e.context(ConfigError::UnknownAssignment(assignment_id.to_string()))),
    }
}
