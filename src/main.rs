//! # Classroom Harness CLI (`chx`)
//!
//! Snapshots accepted classroom submissions into reviewable harness
//! documents, tracks them in a snapshot index, and drives rubric-based
//! evaluation of the stored documents.
//!
//! ## Usage
//!
//! ```bash
//! chx --config ./config/harness.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chx snapshot <id> [--all \| --student <login>]` | Snapshot submissions (lists them without a flag) |
//! | `chx list-snapshots <id>` | Show index entries for an assignment |
//! | `chx evaluate <file> --rubric <file>` | Evaluate one harness document |
//! | `chx batch-evaluate <id> --rubric <file>` | Evaluate every student's latest snapshot |
//! | `chx create-issue <id> <login> <file>` | Post reviewed feedback as an issue |
//! | `chx classrooms` | List classrooms |
//! | `chx assignments <classroom>` | List a classroom's assignments |
//! | `chx assignment <id>` | Show assignment metadata |
//! | `chx accepted <id>` | Show accepted submissions |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

use classroom_harness::classroom::{ClassroomApi, GhCli};
use classroom_harness::config::{self, Config};
use classroom_harness::error::ConfigError;
use classroom_harness::evaluate::{self, PREVIEW_CHARS};
use classroom_harness::issues::{self, GhIssues};
use classroom_harness::logging;
use classroom_harness::materialize::cloner_for;
use classroom_harness::slug::assignment_slug;
use classroom_harness::snapshot::{self, Selection};
use classroom_harness::store::SnapshotStore;

/// Classroom Harness: snapshot, index, and evaluate classroom submissions.
///
/// Remote access goes through the `gh` CLI, which must be installed and
/// authenticated.
#[derive(Parser)]
#[command(name = "chx", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harness.toml`; built-in defaults apply when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot accepted submissions of an assignment.
    ///
    /// Without `--all` or `--student`, lists the submissions and exits.
    Snapshot {
        assignment_id: String,

        /// Snapshot every accepted submission.
        #[arg(long, conflicts_with = "student")]
        all: bool,

        /// Snapshot only submissions that include this login.
        #[arg(long)]
        student: Option<String>,
    },

    /// List stored snapshots for an assignment.
    ListSnapshots { assignment_id: String },

    /// Evaluate a harness document against a rubric.
    ///
    /// The feedback is saved as `draft-feedback-<name>.md` beside the document.
    Evaluate {
        harness_file: PathBuf,

        #[arg(long)]
        rubric: PathBuf,
    },

    /// Evaluate the latest snapshot of every student of an assignment.
    BatchEvaluate {
        assignment_id: String,

        #[arg(long)]
        rubric: PathBuf,
    },

    /// Post a feedback file as an issue on a student's repository.
    CreateIssue {
        assignment_id: String,
        student_login: String,
        feedback_file: PathBuf,
    },

    /// List classrooms visible to the authenticated user.
    Classrooms,

    /// List the assignments of a classroom.
    Assignments { classroom_id: String },

    /// Show assignment metadata.
    Assignment { assignment_id: String },

    /// Show accepted submissions for an assignment.
    Accepted { assignment_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(cli.config.as_deref())?;
    let gh = GhCli::new(&cfg.remote);

    match cli.command {
        Commands::Snapshot {
            assignment_id,
            all,
            student,
        } => {
            let selection = match (all, student) {
                (true, _) => Selection::All,
                (false, Some(login)) => Selection::Student(login),
                (false, None) => Selection::List,
            };
            let store = SnapshotStore::open(&cfg);
            let cloner = cloner_for(&cfg);
            snapshot::run_snapshot(
                &gh,
                cloner.as_ref(),
                &store,
                &cfg,
                &assignment_id,
                &selection,
            )?;
        }
        Commands::ListSnapshots { assignment_id } => {
            let store = SnapshotStore::open(&cfg);
            snapshot::list_snapshots(&gh, &store, &assignment_id)?;
        }
        Commands::Evaluate {
            harness_file,
            rubric,
        } => {
            run_evaluate(&cfg, harness_file, rubric).await?;
        }
        Commands::BatchEvaluate {
            assignment_id,
            rubric,
        } => {
            run_batch_evaluate(&cfg, &gh, &assignment_id, rubric).await?;
        }
        Commands::CreateIssue {
            assignment_id,
            student_login,
            feedback_file,
        } => {
            let poster = GhIssues::new(&cfg.remote.gh_program);
            let url = issues::create_feedback_issue(
                &gh,
                &poster,
                &assignment_id,
                &student_login,
                &feedback_file,
                cfg.issues.label.as_deref(),
            )?;
            println!("Created issue: {}", url);
        }
        Commands::Classrooms => print_json(&gh.classrooms()?)?,
        Commands::Assignments { classroom_id } => {
            print_json(&gh.classroom_assignments(&classroom_id)?)?
        }
        Commands::Assignment { assignment_id } => {
            print_json(&gh.raw_assignment(&assignment_id)?)?
        }
        Commands::Accepted { assignment_id } => print_json(&gh.raw_accepted(&assignment_id)?)?,
    }

    Ok(())
}

async fn run_evaluate(cfg: &Config, harness_file: PathBuf, rubric: PathBuf) -> Result<()> {
    if !harness_file.is_file() {
        return Err(ConfigError::MissingFile {
            what: "Harness file",
            path: harness_file,
        }
        .into());
    }
    let rubric_text = evaluate::read_required("Rubric file", &rubric)?;
    let evaluator = evaluate::create_evaluator(&cfg.evaluator)?;

    println!("Evaluating: {}", harness_file.display());
    println!("Using rubric: {}", file_name(&rubric));

    let evaluation = evaluate::evaluate_file(evaluator.as_ref(), &harness_file, &rubric_text).await?;
    println!("\nDraft feedback saved: {}", evaluation.draft.display());
    println!("\n--- Preview ---\n");
    println!("{}", evaluate::preview(&evaluation.feedback, PREVIEW_CHARS));
    Ok(())
}

async fn run_batch_evaluate(
    cfg: &Config,
    api: &dyn ClassroomApi,
    assignment_id: &str,
    rubric: PathBuf,
) -> Result<()> {
    let rubric_text = evaluate::read_required("Rubric file", &rubric)?;
    let evaluator = evaluate::create_evaluator(&cfg.evaluator)?;

    let slug = match api.assignment(assignment_id) {
        Ok(Some(assignment)) => assignment_slug(&assignment, assignment_id),
        Ok(None) => assignment_id.to_string(),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "could not resolve assignment, using id as slug");
            assignment_id.to_string()
        }
    };

    let store = SnapshotStore::open(cfg);
    println!("Using rubric: {}", file_name(&rubric));
    let report = evaluate::batch_evaluate(evaluator.as_ref(), &store, &slug, &rubric_text).await?;

    if report.succeeded() > 0 {
        println!(
            "\nDraft feedback files are in: {}/*/",
            store.assignment_dir(&slug).display()
        );
        println!("Review each draft-feedback-*.md file before posting.");
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
