//! Evaluation driver.
//!
//! Feeds stored harness documents and a rubric to an [`Evaluator`] and saves
//! the returned feedback as a draft beside the snapshot it was made from.
//!
//! # Evaluators
//!
//! - **[`AnthropicEvaluator`]** calls the Anthropic Messages API with retry
//!   and backoff.
//! - Tests supply their own implementation of the trait.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (other) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... capped at 32s
//!
//! # Batches
//!
//! `batch_evaluate` walks every student directory of an assignment in name
//! order. A student whose evaluation fails is recorded as an error and the
//! batch continues; a student with no snapshot is skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::EvaluatorConfig;
use crate::error::ConfigError;
use crate::store::{resolve_latest, save_draft, SnapshotStore};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Characters of feedback shown after a single evaluation.
pub const PREVIEW_CHARS: usize = 500;

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, document: &str, rubric: &str) -> Result<String>;
}

/// Build the evaluator named by `evaluator.provider`.
///
/// A disabled provider or a missing API key is a [`ConfigError`], reported
/// before any document is read.
pub fn create_evaluator(config: &EvaluatorConfig) -> Result<Box<dyn Evaluator>> {
    match config.provider.as_str() {
        "disabled" => Err(ConfigError::EvaluatorDisabled.into()),
        "anthropic" => Ok(Box::new(AnthropicEvaluator::from_env(config)?)),
        other => bail!("Unknown evaluator provider: {}", other),
    }
}

pub struct AnthropicEvaluator {
    config: EvaluatorConfig,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicEvaluator {
    pub fn from_env(config: &EvaluatorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredentials {
                var: config.api_key_env.clone(),
            })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &EvaluatorConfig, api_key: String) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Evaluator for AnthropicEvaluator {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn evaluate(&self, document: &str, rubric: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "user", "content": build_prompt(document, rubric)}
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying evaluator request"
                );
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.config.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_messages_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Anthropic API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Anthropic API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Evaluation failed after retries")))
    }
}

/// Concatenate the text blocks of a Messages API response.
fn parse_messages_response(json: &serde_json::Value) -> Result<String> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Anthropic response: missing content array"))?;

    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Invalid Anthropic response: no text content");
    }
    Ok(text.join("\n"))
}

pub fn build_prompt(document: &str, rubric: &str) -> String {
    format!(
        r#"You are evaluating a student submission for an AI course.

## Rubric

{rubric}

## Student Submission (Harness File)

{document}

## Instructions

1. Evaluate the submission against each criterion in the rubric.
2. For each criterion, provide:
   - Score (0-4 as defined in the rubric)
   - Brief justification with specific examples from the submission
3. Be constructive and educational in your feedback.
4. End with an overall summary and total score.

## Format your response as:

### [Criterion Name]
**Score: X/4**
[Justification with specific examples]

...

### Overall Summary
**Total Score: X/Y**
[Summary paragraph with key strengths and areas for improvement]
"#
    )
}

/// Read a required input file, mapping absence to [`ConfigError::MissingFile`].
pub fn read_required(what: &'static str, path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(ConfigError::MissingFile {
            what,
            path: path.to_path_buf(),
        }
        .into());
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[derive(Debug)]
pub struct Evaluation {
    pub draft: PathBuf,
    pub feedback: String,
}

/// Evaluate one stored document and save the draft beside it.
pub async fn evaluate_file(
    evaluator: &dyn Evaluator,
    harness: &Path,
    rubric: &str,
) -> Result<Evaluation> {
    let document = std::fs::read_to_string(harness)
        .with_context(|| format!("Failed to read {}", harness.display()))?;
    let feedback = evaluator.evaluate(&document, rubric).await?;
    let draft = save_draft(&snapshot_target(harness), &feedback)?;
    info!(draft = %draft.display(), evaluator = evaluator.name(), "feedback drafted");
    Ok(Evaluation { draft, feedback })
}

/// The dated file behind a `latest` alias, or the path itself.
fn snapshot_target(path: &Path) -> PathBuf {
    match std::fs::read_link(path) {
        Ok(target) if target.is_relative() => path
            .parent()
            .map(|dir| dir.join(&target))
            .unwrap_or(target),
        Ok(target) => target,
        Err(_) => path.to_path_buf(),
    }
}

/// First `max_chars` characters of `feedback`, with `...` when cut.
pub fn preview(feedback: &str, max_chars: usize) -> String {
    match feedback.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &feedback[..cut]),
        None => feedback.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentStatus {
    Success { draft: PathBuf },
    Error { message: String },
    /// No snapshot file in the student's directory.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StudentResult {
    pub student: String,
    pub status: StudentStatus,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<StudentResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, StudentStatus::Success { .. }))
            .count()
    }

    /// Students that had a snapshot to evaluate.
    pub fn attempted(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status != StudentStatus::Skipped)
            .count()
    }
}

/// Evaluate the most recent snapshot of every student of an assignment.
pub async fn batch_evaluate(
    evaluator: &dyn Evaluator,
    store: &SnapshotStore,
    assignment_slug: &str,
    rubric: &str,
) -> Result<BatchReport> {
    let students = store.student_dirs(assignment_slug)?;
    if students.is_empty() {
        return Err(ConfigError::MissingFile {
            what: "Snapshot directory",
            path: store.assignment_dir(assignment_slug),
        })
        .context("Run 'snapshot --all' first to create harness files");
    }

    println!("Found {} student(s)", students.len());
    println!("{}", "-".repeat(40));

    let mut report = BatchReport::default();
    for (student, dir) in students {
        let Some(harness) = resolve_latest(&dir) else {
            println!("  {}: No harness file found, skipping", student);
            report.results.push(StudentResult {
                student,
                status: StudentStatus::Skipped,
            });
            continue;
        };

        println!("  {}: Evaluating...", student);
        let status = match evaluate_file(evaluator, &harness, rubric).await {
            Ok(evaluation) => {
                println!("    -> Saved: {}", evaluation.draft.display());
                StudentStatus::Success {
                    draft: evaluation.draft,
                }
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(student = %student, error = %message, "evaluation failed");
                println!("    -> Error: {}", message);
                StudentStatus::Error { message }
            }
        };
        report.results.push(StudentResult { student, status });
    }

    println!("{}", "-".repeat(40));
    println!(
        "Completed: {}/{} students",
        report.succeeded(),
        report.attempted()
    );
    Ok(report)
}
