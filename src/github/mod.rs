//! CI Integration Module
//!
//! Everything that talks to the CI runner or the code host rather than
//! to the CLI.
//!
//! - [`commands`]: Workflow commands and step outputs
//! - [`env`]: CI environment snapshot
//! - [`summary`]: Job summary rendering
//! - [`pr`]: Pull request comments

pub mod commands;
pub mod env;
pub mod pr;
pub mod summary;

use std::path::PathBuf;

use thiserror::Error;

pub use commands::WorkflowCommands;
pub use env::GithubEnv;
pub use pr::{GithubClient, PullRequestApi};

/// CI integration errors.
#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GITHUB_REPOSITORY is not set or not in owner/name form")]
    MissingRepository,

    #[error("Missing pull request event data. Set 'comment-on-pr-number' or run on a pull_request event.")]
    MissingPullRequest,

    #[error("github-token is missing.")]
    MissingToken,

    #[error("Unable to find environment variable for $GITHUB_STEP_SUMMARY. Check if your runtime environment supports job summaries.")]
    MissingSummaryFile,

    #[error("Unable to access summary file: '{}'. Check if the file has correct read/write permissions.", .0.display())]
    SummaryFileNotFound(PathBuf),

    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
