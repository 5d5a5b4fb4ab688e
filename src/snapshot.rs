//! The snapshot pipeline.
//!
//! For each selected submission, in API order:
//!
//! ```text
//! clone → extract → build document → render → store (+ index entry)
//! ```
//!
//! Submissions are processed one at a time, each in its own
//! [`CloneWorkspace`] that is removed before the next one starts. A failure
//! in one submission is recorded as a [`SubmissionError`] and the run moves
//! on; only problems that make the whole run meaningless (unknown
//! assignment, unreadable submission list) abort it.

use anyhow::Result;
use chrono::Local;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::classroom::{require_assignment, ClassroomApi};
use crate::config::Config;
use crate::document::build_document;
use crate::error::SubmissionError;
use crate::materialize::{extract, RepoCloner};
use crate::models::{Assignment, Submission};
use crate::render::render;
use crate::slug::{assignment_slug, submission_slug};
use crate::store::SnapshotStore;
use crate::workspace::{CloneWorkspace, ReleasePolicy};

/// Which submissions a `snapshot` run touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Print the accepted submissions without cloning anything.
    List,
    All,
    /// Every submission whose members include this login.
    Student(String),
}

#[derive(Debug)]
pub enum SubmissionOutcome {
    Saved { student: String, path: PathBuf },
    Failed { student: String, error: SubmissionError },
}

#[derive(Debug, Default)]
pub struct SnapshotReport {
    pub assignment_slug: String,
    pub outcomes: Vec<SubmissionOutcome>,
}

impl SnapshotReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SubmissionOutcome::Saved { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn summary(&self) -> String {
        format!(
            "Completed: {} saved, {} failed ({} submissions)",
            self.succeeded(),
            self.failed(),
            self.outcomes.len()
        )
    }
}

pub fn run_snapshot(
    api: &dyn ClassroomApi,
    cloner: &dyn RepoCloner,
    store: &SnapshotStore,
    config: &Config,
    assignment_id: &str,
    selection: &Selection,
) -> Result<SnapshotReport> {
    let assignment = require_assignment(api, assignment_id)?;
    let slug = assignment_slug(&assignment, assignment_id);
    let submissions = api.accepted_submissions(assignment_id)?;

    println!("Assignment: {}", assignment.title());
    println!("Submissions: {}", submissions.len());

    let mut report = SnapshotReport {
        assignment_slug: slug.clone(),
        outcomes: Vec::new(),
    };

    let selected: Vec<&Submission> = match selection {
        Selection::List => {
            for submission in &submissions {
                println!(
                    "  {}: {}",
                    submission_slug(submission),
                    submission.submitters.display_names()
                );
            }
            println!("\nUse --all to snapshot every submission, or --student <login> for one.");
            return Ok(report);
        }
        Selection::All => submissions.iter().collect(),
        Selection::Student(login) => {
            let matched: Vec<&Submission> = submissions
                .iter()
                .filter(|s| s.submitters.contains_login(login))
                .collect();
            if matched.is_empty() {
                println!("No submission found for student: {}", login);
                return Ok(report);
            }
            matched
        }
    };

    for submission in selected {
        let student = submission_slug(submission);
        println!("\nProcessing {} ({})...", submission.submitters.display_names(), student);

        let outcome = match snapshot_submission(
            cloner,
            store,
            config,
            assignment_id,
            &assignment,
            &slug,
            submission,
        ) {
            Ok(path) => {
                println!("  saved: {}", path.display());
                SubmissionOutcome::Saved { student, path }
            }
            Err(error) => {
                warn!(student = %student, error = %error, "submission failed");
                println!("  failed: {}", error);
                SubmissionOutcome::Failed { student, error }
            }
        };
        report.outcomes.push(outcome);
    }

    println!("\n{}", report.summary());
    Ok(report)
}

/// Snapshot one submission. The clone workspace is gone when this returns.
pub fn snapshot_submission(
    cloner: &dyn RepoCloner,
    store: &SnapshotStore,
    config: &Config,
    assignment_id: &str,
    assignment: &Assignment,
    assignment_slug: &str,
    submission: &Submission,
) -> Result<PathBuf, SubmissionError> {
    let full_name = submission
        .repo_full_name()
        .ok_or(SubmissionError::MissingRepository)?;
    let student = submission_slug(submission);

    let workspace = CloneWorkspace::create(ReleasePolicy::from(&config.clone))
        .map_err(|e| SubmissionError::Clone {
            repo: full_name.to_string(),
            reason: format!("{:#}", e),
        })?;
    let checkout = workspace.checkout_dir(submission.repo_name());

    cloner
        .clone_repo(full_name, &checkout, &config.clone.branch)
        .map_err(|e| SubmissionError::Clone {
            repo: full_name.to_string(),
            reason: format!("{:#}", e),
        })?;
    info!(repo = full_name, "cloned");

    let extraction = extract(&checkout, &config.extract).map_err(|source| {
        SubmissionError::Extract {
            repo: full_name.to_string(),
            source,
        }
    })?;

    let now = Local::now();
    let document = build_document(
        assignment_id,
        assignment,
        submission,
        extraction,
        &config.extract.language,
        now.date_naive(),
    );
    let rendered = render(&document);

    store
        .save_at(&rendered, assignment_slug, &student, now)
        .map_err(SubmissionError::Store)
}

/// Index key of an assignment: its slug when it resolves, the raw id otherwise.
pub fn index_key(api: &dyn ClassroomApi, assignment_id: &str) -> String {
    match api.assignment(assignment_id) {
        Ok(Some(assignment)) => assignment_slug(&assignment, assignment_id),
        Ok(None) => assignment_id.to_string(),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "could not resolve assignment, using raw id");
            assignment_id.to_string()
        }
    }
}

/// Print the snapshot index entries for an assignment and return their count.
pub fn list_snapshots(
    api: &dyn ClassroomApi,
    store: &SnapshotStore,
    assignment_id: &str,
) -> Result<usize> {
    let key = index_key(api, assignment_id);
    let index = store.load_index()?;
    let Some(students) = index.assignment(&key) else {
        println!("No snapshots found for assignment: {}", assignment_id);
        return Ok(0);
    };

    let mut count = 0;
    println!("\n{}:", key);
    for (student, history) in students {
        println!("  {}: {} snapshot(s)", student, history.snapshots.len());
        for entry in &history.snapshots {
            println!("    {} → {}", entry.date, entry.path);
        }
        count += history.snapshots.len();
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexStore, MemoryIndex, SnapshotEntry, SnapshotIndex};

    struct FixedAssignment(Option<Assignment>);

    impl ClassroomApi for FixedAssignment {
        fn assignment(&self, _assignment_id: &str) -> Result<Option<Assignment>> {
            Ok(self.0.clone())
        }

        fn accepted_submissions(&self, _assignment_id: &str) -> Result<Vec<Submission>> {
            Ok(Vec::new())
        }
    }

    fn store_with(keys: &[&str]) -> SnapshotStore {
        let mut index = SnapshotIndex::new();
        for key in keys {
            index.append(
                key,
                "alice",
                SnapshotEntry {
                    date: "2024-01-01".to_string(),
                    path: format!("assignments/{}/alice/2024-01-01.md", key),
                    created: "2024-01-01T00:00:00+00:00".to_string(),
                    digest: None,
                },
            );
        }
        let memory = MemoryIndex::new();
        memory.save(&index).unwrap();
        SnapshotStore::new("unused", Box::new(memory))
    }

    #[test]
    fn resolved_slug_ignores_similar_keys() {
        let store = store_with(&["homework-intro", "project-1", "hw-10"]);
        let api = FixedAssignment(Some(Assignment {
            slug: Some("homework-intro".to_string()),
            ..Default::default()
        }));
        assert_eq!(list_snapshots(&api, &store, "1").unwrap(), 1);
    }

    #[test]
    fn unresolved_assignment_matches_raw_id_exactly() {
        let store = store_with(&["77", "hw-77", "177"]);
        let api = FixedAssignment(None);
        assert_eq!(index_key(&api, "77"), "77");
        assert_eq!(list_snapshots(&api, &store, "77").unwrap(), 1);
        assert_eq!(list_snapshots(&api, &store, "7").unwrap(), 0);
    }

    #[test]
    fn summary_reports_failures() {
        let report = SnapshotReport {
            assignment_slug: "hw1".to_string(),
            outcomes: vec![
                SubmissionOutcome::Saved {
                    student: "alice".to_string(),
                    path: PathBuf::from("a.md"),
                },
                SubmissionOutcome::Failed {
                    student: "bob".to_string(),
                    error: SubmissionError::MissingRepository,
                },
                SubmissionOutcome::Saved {
                    student: "carol".to_string(),
                    path: PathBuf::from("c.md"),
                },
            ],
        };
        assert_eq!(report.summary(), "Completed: 2 saved, 1 failed (3 submissions)");
    }
}
