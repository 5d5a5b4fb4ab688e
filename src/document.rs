//! Assemble a [`HarnessDocument`] from API metadata and an [`Extraction`].
//!
//! Pure: the snapshot date is passed in rather than read from the clock.

use chrono::NaiveDate;

use crate::materialize::Extraction;
use crate::models::{Assignment, FileRecord, HarnessDocument, Submission};

pub fn build_document(
    assignment_id: &str,
    assignment: &Assignment,
    submission: &Submission,
    extraction: Extraction,
    language: &str,
    snapshot_date: NaiveDate,
) -> HarnessDocument {
    let repo_url = submission
        .repository
        .as_ref()
        .and_then(|r| r.html_url.clone())
        .unwrap_or_default();

    HarnessDocument {
        assignment_id: assignment_id.to_string(),
        assignment_name: assignment.title().to_string(),
        classroom_name: assignment.classroom_name().to_string(),
        repo_name: submission.repo_name().to_string(),
        repo_url,
        branch: extraction.branch,
        commit_sha: extraction.commit_sha,
        snapshot_date: snapshot_date.format("%Y-%m-%d").to_string(),
        submitters: submission.submitters.clone(),
        readme: extraction.readme,
        source_files: sorted_unique(extraction.source_files),
        test_files: sorted_unique(extraction.test_files),
        commits: extraction.commits,
        language: language.to_string(),
    }
}

/// Sort by path and drop later duplicates.
fn sorted_unique(mut files: Vec<FileRecord>) -> Vec<FileRecord> {
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    files.dedup_by(|later, earlier| later.relative_path == earlier.relative_path);
    files
}
