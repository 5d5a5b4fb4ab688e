//! Markdown rendering of harness documents.
//!
//! The output is a pure function of the [`HarnessDocument`]: no clock, no
//! hash-map iteration order, nothing environment-dependent. Snapshots of an
//! unchanged submission therefore diff clean and hash identically.
//!
//! Layout, top to bottom:
//!
//! | Section | Content |
//! |---------|---------|
//! | front matter | ids, members, file and line counts |
//! | header | title, repository link, snapshot date, short commit |
//! | commit history | table, total, contributor histogram, date range |
//! | README | fenced, between `BEGIN README` / `END README` markers |
//! | source files | file tree, then one fenced section per file |
//! | test files | listing table, then one fenced section per file |
//!
//! Every fenced section sits between `<!-- BEGIN <key> -->` and
//! `<!-- END <key> -->` lines. The fence is always longer than any backtick
//! run inside the content, so [`extract_section`] recovers the content
//! byte-for-byte.

use crate::models::{CommitRecord, FileRecord, HarnessDocument, Submitters};

pub const HARNESS_VERSION: &str = "1.0";

/// Section key of the README block.
pub const README_KEY: &str = "README";

pub const NO_COMMITS: &str = "*No commits found*";
pub const NO_SOURCE_FILES: &str = "*No source files found*";
pub const NO_TEST_FILES: &str = "*No test files found*";

/// Longest commit subject shown in the history table.
const SUBJECT_WIDTH: usize = 60;

const BEGIN_PREFIX: &str = "<!-- BEGIN ";
const END_PREFIX: &str = "<!-- END ";
const MARKER_SUFFIX: &str = " -->";

pub fn render(doc: &HarnessDocument) -> String {
    let mut lines: Vec<String> = Vec::new();

    render_front_matter(doc, &mut lines);
    render_header(doc, &mut lines);
    render_commits(&doc.commits, &mut lines);

    lines.push("## README".to_string());
    lines.push(String::new());
    push_section(&mut lines, README_KEY, "markdown", &doc.readme);
    lines.push(String::new());
    push_rule(&mut lines);

    render_source_files(doc, &mut lines);
    render_test_files(doc, &mut lines);

    lines.push("## End of Harness".to_string());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render_front_matter(doc: &HarnessDocument, lines: &mut Vec<String>) {
    lines.push("---".to_string());
    lines.push(format!("harness_version: {}", quote(HARNESS_VERSION)));
    lines.push(format!("assignment_id: {}", quote(&doc.assignment_id)));
    lines.push(format!("assignment_name: {}", quote(&doc.assignment_name)));
    lines.push(format!("classroom: {}", quote(&doc.classroom_name)));
    lines.push(format!("repo_name: {}", quote(&doc.repo_name)));
    lines.push(format!("repo_url: {}", quote(&doc.repo_url)));
    lines.push(format!("branch: {}", quote(&doc.branch)));
    lines.push(format!("commit_sha: {}", quote(&doc.commit_sha)));
    lines.push(format!("snapshot_date: {}", quote(&doc.snapshot_date)));
    let kind = if doc.submitters.is_group() {
        "group"
    } else {
        "individual"
    };
    lines.push(format!("type: {}", quote(kind)));
    if doc.members().is_empty() {
        lines.push("members: []".to_string());
    } else {
        lines.push("members:".to_string());
        for member in doc.members() {
            lines.push(format!("  - login: {}", quote(&member.login)));
            lines.push(format!("    name: {}", quote(&member.display_name)));
        }
    }
    lines.push("stats:".to_string());
    lines.push(format!("  source_files: {}", doc.source_files.len()));
    lines.push(format!("  test_files: {}", doc.test_files.len()));
    lines.push(format!("  total_lines: {}", doc.total_source_lines()));
    lines.push("---".to_string());
    lines.push(String::new());
}

fn render_header(doc: &HarnessDocument, lines: &mut Vec<String>) {
    let title_name = match &doc.submitters {
        Submitters::Individual(member) => member.display_name.clone(),
        Submitters::Group(members) => format!(
            "Team ({})",
            members
                .iter()
                .map(|m| m.login.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let short_sha: String = doc.commit_sha.chars().take(7).collect();

    lines.push(format!(
        "# Feedback Harness: {} - {}",
        title_name, doc.assignment_name
    ));
    lines.push(String::new());
    lines.push(format!("> **Assignment**: {}  ", doc.assignment_name));
    lines.push(format!(
        "> **Repository**: [{}]({})  ",
        doc.repo_name, doc.repo_url
    ));
    lines.push(format!("> **Snapshot Date**: {}  ", doc.snapshot_date));
    lines.push(format!("> **Commit**: `{}`", short_sha));
    lines.push(String::new());
    push_rule(lines);
}

fn render_commits(commits: &[CommitRecord], lines: &mut Vec<String>) {
    lines.push(format!("## Commit History (Recent {})", commits.len()));
    lines.push(String::new());

    if commits.is_empty() {
        lines.push(NO_COMMITS.to_string());
        lines.push(String::new());
        push_rule(lines);
        return;
    }

    lines.push("| Date | Author | Message | SHA |".to_string());
    lines.push("|------|--------|---------|-----|".to_string());
    for commit in commits {
        let subject: String = escape_cell(&commit.subject)
            .chars()
            .take(SUBJECT_WIDTH)
            .collect();
        lines.push(format!(
            "| {} | {} | {} | `{}` |",
            commit.date,
            escape_cell(&commit.author),
            subject,
            commit.short_sha
        ));
    }
    lines.push(String::new());

    let contributors = contributor_histogram(commits)
        .iter()
        .map(|(author, count)| format!("{} ({})", author, count))
        .collect::<Vec<_>>()
        .join(", ");
    let (oldest, newest) = date_range(commits).unwrap_or_default();

    lines.push("### Commit Activity Summary".to_string());
    lines.push(String::new());
    lines.push(format!("- **Total commits**: {}", commits.len()));
    lines.push(format!("- **Contributors**: {}", contributors));
    lines.push(format!("- **Date range**: {} to {}", oldest, newest));
    lines.push(String::new());
    push_rule(lines);
}

fn render_source_files(doc: &HarnessDocument, lines: &mut Vec<String>) {
    lines.push("## Source Files".to_string());
    lines.push(String::new());

    if doc.source_files.is_empty() {
        lines.push(NO_SOURCE_FILES.to_string());
        lines.push(String::new());
        push_rule(lines);
        return;
    }

    lines.push("### File Tree".to_string());
    lines.push(String::new());
    lines.push("```".to_string());
    for file in &doc.source_files {
        lines.push(format!("  {}", file.relative_path));
    }
    lines.push("```".to_string());
    lines.push(String::new());
    push_rule(lines);

    for file in &doc.source_files {
        lines.push(format!("### `{}`", file.relative_path));
        lines.push(String::new());
        lines.push(format!(
            "**Lines**: {} | **Last Modified**: {}",
            file.line_count, file.last_modified
        ));
        lines.push(String::new());
        push_file(lines, file, &doc.language);
    }
}

fn render_test_files(doc: &HarnessDocument, lines: &mut Vec<String>) {
    lines.push("## Test Files".to_string());
    lines.push(String::new());

    if doc.test_files.is_empty() {
        lines.push(NO_TEST_FILES.to_string());
        lines.push(String::new());
        push_rule(lines);
        return;
    }

    lines.push("### Test File Listing".to_string());
    lines.push(String::new());
    lines.push("| File | Lines |".to_string());
    lines.push("|------|-------|".to_string());
    for file in &doc.test_files {
        lines.push(format!(
            "| `{}` | {} |",
            escape_cell(&file.relative_path),
            file.line_count
        ));
    }
    lines.push(String::new());

    for file in &doc.test_files {
        lines.push(format!("### `{}`", file.relative_path));
        lines.push(String::new());
        push_file(lines, file, &doc.language);
    }
}

fn push_file(lines: &mut Vec<String>, file: &FileRecord, language: &str) {
    push_section(lines, &file.relative_path, language, &file.content);
    lines.push(String::new());
    push_rule(lines);
}

fn push_section(lines: &mut Vec<String>, key: &str, language: &str, content: &str) {
    let fence = fence_for(content);
    lines.push(format!("{}{}{}", BEGIN_PREFIX, key, MARKER_SUFFIX));
    lines.push(format!("{}{}", fence, language));
    lines.push(content.to_string());
    lines.push(fence);
    lines.push(format!("{}{}{}", END_PREFIX, key, MARKER_SUFFIX));
}

fn push_rule(lines: &mut Vec<String>) {
    lines.push("---".to_string());
    lines.push(String::new());
}

/// Authors by descending commit count; ties keep first-appearance order.
pub fn contributor_histogram(commits: &[CommitRecord]) -> Vec<(&str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for commit in commits {
        match counts.iter_mut().find(|(author, _)| *author == commit.author) {
            Some((_, count)) => *count += 1,
            None => counts.push((commit.author.as_str(), 1)),
        }
    }
    // stable sort keeps first-appearance order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// `(commits[last].date, commits[first].date)`.
///
/// Assumes newest-first order, as `git log` produces. A log in any other
/// order yields a reversed range; this is not corrected here.
pub fn date_range(commits: &[CommitRecord]) -> Option<(String, String)> {
    let first = commits.first()?;
    let last = commits.last()?;
    Some((last.date.clone(), first.date.clone()))
}

/// A backtick fence longer than any backtick run in `content`.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Double-quoted YAML scalar (JSON string syntax is valid YAML).
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// One `BEGIN`/`END` section of a rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub key: &'a str,
    pub content: &'a str,
}

/// All marked sections, in document order.
///
/// Section bodies are skipped as a whole, so marker-like text inside file
/// content is never mistaken for a real marker.
pub fn sections(rendered: &str) -> Vec<Section<'_>> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(section_end) = next_section(rendered, pos, &mut found) {
        pos = section_end;
    }
    found
}

/// Content of the section keyed `key` (a file path or [`README_KEY`]).
pub fn extract_section<'a>(rendered: &'a str, key: &str) -> Option<&'a str> {
    sections(rendered)
        .into_iter()
        .find(|s| s.key == key)
        .map(|s| s.content)
}

/// Parse the next section at or after `from`; returns the offset just past it.
fn next_section<'a>(rendered: &'a str, from: usize, out: &mut Vec<Section<'a>>) -> Option<usize> {
    let rest = &rendered[from..];
    let begin_at = if rest.starts_with(BEGIN_PREFIX) {
        from
    } else {
        from + rest.find(&format!("\n{}", BEGIN_PREFIX))? + 1
    };

    let marker_line_end = begin_at + rendered[begin_at..].find('\n')?;
    let marker = &rendered[begin_at..marker_line_end];
    let key = marker
        .strip_prefix(BEGIN_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?;

    let fence_line_start = marker_line_end + 1;
    let fence_line_end = fence_line_start + rendered[fence_line_start..].find('\n')?;
    let fence_line = &rendered[fence_line_start..fence_line_end];
    let fence_len = fence_line.chars().take_while(|c| *c == '`').count();
    if fence_len < 3 {
        return None;
    }
    let fence = &fence_line[..fence_len];

    let body_start = fence_line_end + 1;
    let closing = format!("\n{}\n{}{}{}", fence, END_PREFIX, key, MARKER_SUFFIX);
    // the separating newline may be the very first byte of the body
    let body_end = rendered
        .get(body_start - 1..)?
        .find(&closing)
        .map(|i| body_start - 1 + i)?;
    let content = if body_end < body_start {
        ""
    } else {
        &rendered[body_start..body_end]
    };

    out.push(Section { key, content });
    Some(body_end + closing.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Member;

    fn commit(author: &str, date: &str) -> CommitRecord {
        CommitRecord {
            short_sha: "1234567".to_string(),
            author: author.to_string(),
            date: date.to_string(),
            subject: "work".to_string(),
        }
    }

    fn doc() -> HarnessDocument {
        HarnessDocument {
            assignment_id: "42".to_string(),
            assignment_name: "Homework 1".to_string(),
            classroom_name: "CS 101".to_string(),
            repo_name: "hw1-alice".to_string(),
            repo_url: "https://github.com/org/hw1-alice".to_string(),
            branch: "main".to_string(),
            commit_sha: "abcdef0123456789".to_string(),
            snapshot_date: "2024-05-06".to_string(),
            submitters: Submitters::Individual(Member {
                login: "alice".to_string(),
                display_name: "Alice \"Al\" Smith".to_string(),
            }),
            readme: "# Homework\n\nHello".to_string(),
            source_files: vec![
                FileRecord::new("src/a.py".into(), "a = 1\n".into(), "2024-05-01".into()),
                FileRecord::new("src/b.py".into(), "b = 2".into(), "unknown".into()),
            ],
            test_files: vec![],
            commits: vec![commit("alice", "2024-05-05"), commit("alice", "2024-05-01")],
            language: "python".to_string(),
        }
    }

    #[test]
    fn deterministic() {
        let d = doc();
        assert_eq!(render(&d), render(&d));
        assert_eq!(render(&d), render(&d.clone()));
    }

    #[test]
    fn front_matter_precedes_content() {
        let out = render(&doc());
        assert!(out.starts_with("---\nharness_version: \"1.0\"\n"));
        let fm_end = 3 + out[3..].find("\n---\n").unwrap();
        let front = &out[..fm_end];
        assert!(front.contains("name: \"Alice \\\"Al\\\" Smith\""));
        assert!(front.contains("type: \"individual\""));
        assert!(front.contains("  source_files: 2"));
        assert!(front.contains("  test_files: 0"));
        assert!(front.contains("  total_lines: 2"));
        assert!(out.find("<!-- BEGIN").unwrap() > fm_end);
    }

    #[test]
    fn header_uses_short_sha_and_team_title() {
        let mut d = doc();
        d.submitters = Submitters::Group(vec![
            Member {
                login: "amy".into(),
                display_name: "Amy".into(),
            },
            Member {
                login: "bo".into(),
                display_name: "Bo".into(),
            },
        ]);
        let out = render(&d);
        assert!(out.contains("# Feedback Harness: Team (amy, bo) - Homework 1"));
        assert!(out.contains("> **Commit**: `abcdef0`"));
        assert!(out.contains("type: \"group\""));
    }

    #[test]
    fn empty_sections_have_placeholders() {
        let mut d = doc();
        d.commits.clear();
        d.source_files.clear();
        let out = render(&d);
        assert!(out.contains(NO_COMMITS));
        assert!(out.contains(NO_SOURCE_FILES));
        assert!(out.contains(NO_TEST_FILES));
        assert!(!out.contains("### Commit Activity Summary"));
    }

    #[test]
    fn histogram_ties_keep_first_appearance() {
        let commits = vec![
            commit("A", "2024-01-05"),
            commit("B", "2024-01-04"),
            commit("C", "2024-01-03"),
            commit("B", "2024-01-02"),
            commit("A", "2024-01-01"),
        ];
        assert_eq!(
            contributor_histogram(&commits),
            vec![("A", 2), ("B", 2), ("C", 1)]
        );
        let mut d = doc();
        d.commits = commits;
        assert!(render(&d).contains("- **Contributors**: A (2), B (2), C (1)"));
    }

    #[test]
    fn date_range_is_last_to_first() {
        let out = render(&doc());
        assert!(out.contains("- **Date range**: 2024-05-01 to 2024-05-05"));
        assert_eq!(date_range(&[]), None);
    }

    #[test]
    fn subjects_are_escaped_and_truncated() {
        let mut d = doc();
        d.commits = vec![CommitRecord {
            short_sha: "1234567".into(),
            author: "x".into(),
            date: "2024-01-01".into(),
            subject: format!("a|b {}", "y".repeat(100)),
        }];
        let out = render(&d);
        let row = out.lines().find(|l| l.starts_with("| 2024-01-01")).unwrap();
        assert!(row.contains("a\\|b "));
        // the escaped prefix uses five of the sixty characters
        assert!(row.contains(&"y".repeat(55)));
        assert!(!row.contains(&"y".repeat(56)));
    }

    #[test]
    fn sections_round_trip() {
        let out = render(&doc());
        assert_eq!(extract_section(&out, "src/a.py"), Some("a = 1\n"));
        assert_eq!(extract_section(&out, "src/b.py"), Some("b = 2"));
        assert_eq!(extract_section(&out, README_KEY), Some("# Homework\n\nHello"));
        assert_eq!(extract_section(&out, "src/missing.py"), None);
    }

    #[test]
    fn adversarial_content_round_trips() {
        let tricky = "```python\nx = 1\n```\n<!-- END src/a.py -->\n<!-- BEGIN src/b.py -->\n````\n";
        let mut d = doc();
        d.source_files[0].content = tricky.to_string();
        d.source_files[1].content = String::new();
        let out = render(&d);
        assert!(out.contains("`````python"));
        assert_eq!(extract_section(&out, "src/a.py"), Some(tricky));
        assert_eq!(extract_section(&out, "src/b.py"), Some(""));
        let keys: Vec<_> = sections(&out).iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![README_KEY, "src/a.py", "src/b.py"]);
    }

    #[test]
    fn fence_grows_with_content() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("``` inside"), "````");
        assert_eq!(fence_for("a `tick`"), "```");
    }
}
