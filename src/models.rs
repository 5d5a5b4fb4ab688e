//! Core data models.
//!
//! Two families live here: the payloads returned by the classroom API
//! (deserialized straight from its JSON), and the harness document model that
//! every snapshot is built from. Payloads are normalized into the document
//! model exactly once, in [`Submission::from`].

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// Classroom payloads
// ═══════════════════════════════════════════════════════════════════════

/// Assignment metadata as returned by `GET /assignments/{id}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Assignment {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub invite_link: Option<String>,
    #[serde(default)]
    pub classroom: Option<ClassroomRef>,
    #[serde(default)]
    pub starter_code_repository: Option<RepositoryRef>,
}

impl Assignment {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("unknown")
    }

    pub fn classroom_name(&self) -> &str {
        self.classroom
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassroomRef {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RepositoryRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl RepositoryRef {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StudentRef {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One entry of `GET /assignments/{id}/accepted_assignments`.
///
/// Group assignments carry `students`, individual ones `student`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AcceptedAssignment {
    #[serde(default)]
    pub students: Option<Vec<StudentRef>>,
    #[serde(default)]
    pub student: Option<StudentRef>,
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
}

// ═══════════════════════════════════════════════════════════════════════
// Submitters
// ═══════════════════════════════════════════════════════════════════════

/// A student as recorded in a harness document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// May be empty when the classroom roster entry is not linked to an account.
    pub login: String,
    pub display_name: String,
}

impl From<&StudentRef> for Member {
    fn from(student: &StudentRef) -> Self {
        let login = student.login.clone().unwrap_or_default();
        let display_name = match student.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => login.clone(),
        };
        Self {
            login,
            display_name,
        }
    }
}

/// Who owns a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitters {
    Individual(Member),
    Group(Vec<Member>),
}

impl Submitters {
    pub fn members(&self) -> &[Member] {
        match self {
            Submitters::Individual(member) => std::slice::from_ref(member),
            Submitters::Group(members) => members,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Submitters::Group(_))
    }

    pub fn contains_login(&self, login: &str) -> bool {
        self.members().iter().any(|m| m.login == login)
    }

    /// Comma-separated display names, for listings.
    pub fn display_names(&self) -> String {
        self.members()
            .iter()
            .map(|m| m.display_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// An accepted submission, normalized.
#[derive(Debug, Clone)]
pub struct Submission {
    pub submitters: Submitters,
    pub repository: Option<RepositoryRef>,
}

impl From<AcceptedAssignment> for Submission {
    fn from(accepted: AcceptedAssignment) -> Self {
        let submitters = match (accepted.students.as_deref(), accepted.student.as_ref()) {
            (Some([only]), _) => Submitters::Individual(Member::from(only)),
            (Some(students), _) if !students.is_empty() => {
                Submitters::Group(students.iter().map(Member::from).collect())
            }
            (_, Some(student)) => Submitters::Individual(Member::from(student)),
            _ => Submitters::Group(Vec::new()),
        };
        Self {
            submitters,
            repository: accepted.repository,
        }
    }
}

impl Submission {
    pub fn repo_name(&self) -> &str {
        self.repository
            .as_ref()
            .map(RepositoryRef::name)
            .unwrap_or("unknown")
    }

    pub fn repo_full_name(&self) -> Option<&str> {
        self.repository
            .as_ref()
            .and_then(|r| r.full_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Harness document
// ═══════════════════════════════════════════════════════════════════════

/// Text substituted for a file whose bytes are not valid UTF-8.
pub const UNREADABLE_FILE_PLACEHOLDER: &str = "(unable to read file)";

/// Text substituted when a repository has no README.
pub const MISSING_README_PLACEHOLDER: &str = "*No README found*";

/// `last_modified` value when git has no history for a file.
pub const UNKNOWN_DATE: &str = "unknown";

/// A matched source or test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Repository-relative, `/`-separated.
    pub relative_path: String,
    pub content: String,
    pub line_count: usize,
    /// `YYYY-MM-DD` of the last commit touching the file, or [`UNKNOWN_DATE`].
    pub last_modified: String,
}

impl FileRecord {
    pub fn new(relative_path: String, content: String, last_modified: String) -> Self {
        let line_count = content.lines().count();
        Self {
            relative_path,
            content,
            line_count,
            last_modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub short_sha: String,
    pub author: String,
    /// ISO date truncated to the day.
    pub date: String,
    pub subject: String,
}

/// The normalized view of one submission at one point in time.
///
/// Owns copies of everything it shows; it never points back into the clone
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessDocument {
    pub assignment_id: String,
    pub assignment_name: String,
    pub classroom_name: String,
    pub repo_name: String,
    pub repo_url: String,
    pub branch: String,
    pub commit_sha: String,
    pub snapshot_date: String,
    pub submitters: Submitters,
    pub readme: String,
    /// Sorted by path, no duplicates.
    pub source_files: Vec<FileRecord>,
    /// Sorted by path, no duplicates.
    pub test_files: Vec<FileRecord>,
    /// Newest first.
    pub commits: Vec<CommitRecord>,
    /// Info string for code fences.
    pub language: String,
}

impl HarnessDocument {
    pub fn members(&self) -> &[Member] {
        self.submitters.members()
    }

    pub fn total_source_lines(&self) -> usize {
        self.source_files.iter().map(|f| f.line_count).sum()
    }
}
