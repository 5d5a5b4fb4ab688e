//! Error categories that callers need to tell apart.
//!
//! Everything else travels as [`anyhow::Error`].

use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems detected before any side effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} environment variable not set")]
    MissingCredentials { var: String },

    #[error("evaluator is disabled (evaluator.provider = \"disabled\")")]
    EvaluatorDisabled,

    #[error("{what} not found: {}", .path.display())]
    MissingFile { what: &'static str, path: PathBuf },

    #[error("could not fetch assignment {0}")]
    UnknownAssignment(String),
}

/// Problems confined to a single submission. The batch records them and moves on.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("submission has no repository")]
    MissingRepository,

    #[error("failed to clone {repo}: {reason}")]
    Clone { repo: String, reason: String },

    #[error("failed to extract {repo}: {source}")]
    Extract {
        repo: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to store snapshot: {0}")]
    Store(#[source] anyhow::Error),
}
