//! CI Environment
//!
//! Values the CI runner exposes to every step. Outside CI most of these
//! are absent; the workspace then falls back to the current directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde_json::Value;

use super::GithubError;

const DEFAULT_API_URL: &str = "https://api.github.com";

/// Snapshot of the CI environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GithubEnv {
    pub workspace: PathBuf,
    pub repository: Option<String>,
    pub event_name: Option<String>,
    pub event_path: Option<PathBuf>,
    pub api_url: String,
    pub output_file: Option<PathBuf>,
    pub path_file: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
}

impl GithubEnv {
    /// Reads the environment of the current process.
    pub fn from_env() -> Self {
        let var = |key: &str| env::var(key).ok().filter(|v| !v.is_empty());
        let path = |key: &str| var(key).map(PathBuf::from);

        let workspace = path("GITHUB_WORKSPACE")
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            workspace,
            repository: var("GITHUB_REPOSITORY"),
            event_name: var("GITHUB_EVENT_NAME"),
            event_path: path("GITHUB_EVENT_PATH"),
            api_url: var("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            output_file: path("GITHUB_OUTPUT"),
            path_file: path("GITHUB_PATH"),
            summary_file: path("GITHUB_STEP_SUMMARY"),
        }
    }

    /// Resolves a possibly relative directory against the workspace.
    pub fn resolve(&self, dir: &str) -> PathBuf {
        let dir = Path::new(dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.workspace.join(dir)
        }
    }

    /// Splits `owner/name`.
    pub fn repo(&self) -> Result<(&str, &str), GithubError> {
        self.repository
            .as_deref()
            .and_then(|r| r.split_once('/'))
            .ok_or(GithubError::MissingRepository)
    }

    /// Pull request number from the triggering event, if any.
    pub fn pull_request_number(&self) -> Option<u64> {
        let path = self.event_path.as_ref()?;
        let content = fs::read_to_string(path)
            .map_err(|e| debug!("Cannot read event payload {}: {}", path.display(), e))
            .ok()?;
        let payload: Value = serde_json::from_str(&content).ok()?;
        payload
            .get("pull_request")
            .and_then(|pr| pr.get("number"))
            .and_then(Value::as_u64)
    }
}
