//! Filesystem-safe identifiers for assignments and submitters.

use crate::models::{Assignment, Submission, Submitters};

/// Keep `[A-Za-z0-9._-]`, collapse everything else into single `-`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    // ".." or "." alone would escape or alias the directory
    if out.is_empty() || out.chars().all(|c| c == '.') {
        return "unknown".to_string();
    }
    out
}

/// The API slug when present, else the slugified title, else the id.
pub fn assignment_slug(assignment: &Assignment, assignment_id: &str) -> String {
    if let Some(slug) = assignment.slug.as_deref().filter(|s| !s.is_empty()) {
        return slugify(slug);
    }
    if let Some(title) = assignment.title.as_deref().filter(|t| !t.is_empty()) {
        return slugify(title);
    }
    slugify(assignment_id)
}

/// A single member's login, or every member's login sorted and joined by `-`.
///
/// Unlinked members (empty login) are left out; with no logins at all the
/// slug is `unknown`.
pub fn submitters_slug(submitters: &Submitters) -> String {
    let mut logins: Vec<&str> = submitters
        .members()
        .iter()
        .map(|m| m.login.as_str())
        .filter(|login| !login.is_empty())
        .collect();
    match logins.as_slice() {
        [] => "unknown".to_string(),
        [only] => slugify(only),
        _ => {
            logins.sort_unstable();
            slugify(&logins.join("-"))
        }
    }
}

/// Storage key for a submission: its submitters' slug, or the repository
/// name when no member has a linked login.
pub fn submission_slug(submission: &Submission) -> String {
    let has_login = submission
        .submitters
        .members()
        .iter()
        .any(|m| !m.login.is_empty());
    if has_login {
        submitters_slug(&submission.submitters)
    } else {
        slugify(submission.repo_name())
    }
}
