//! Pull Request Comments
//!
//! Posts the operation output as a PR comment. With editing enabled,
//! an earlier comment for the same stack is updated in place instead
//! of adding a new one on every push.

use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};

use super::summary::trim_output;
use super::GithubError;
use crate::action::inputs::Command;

/// Comment bodies are capped below the 65,536 character API limit.
pub const MAX_COMMENT_OUTPUT_BYTES: usize = 64_000;

const CLIENT_USER_AGENT: &str = concat!("stackrun/", env!("CARGO_PKG_VERSION"));

/// An existing issue comment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

/// Page size requested when listing comments.
pub const COMMENTS_PER_PAGE: usize = 100;

const MAX_COMMENT_PAGES: u32 = 100;

/// The subset of the issues API used for PR comments.
pub trait PullRequestApi {
    /// One page of comments, 1-based, at most [`COMMENTS_PER_PAGE`] long.
    fn list_comments(&self, issue: u64, page: u32) -> Result<Vec<IssueComment>, GithubError>;
    fn create_comment(&self, issue: u64, body: &str) -> Result<(), GithubError>;
    fn update_comment(&self, comment_id: u64, body: &str) -> Result<(), GithubError>;
}

/// What to post and where.
#[derive(Debug, Clone)]
pub struct CommentRequest<'a> {
    pub command: Command,
    pub project: &'a str,
    pub stack: &'a str,
    pub output: &'a str,
    /// Explicit PR number; wins over the event payload
    pub pr_number: Option<u64>,
    /// PR number from the triggering event
    pub event_pr_number: Option<u64>,
    pub edit: bool,
    pub comment_id: &'a str,
    pub always_include_summary: bool,
}

fn heading(command: Command, project: &str, stack: &str) -> String {
    format!("#### :tropical_drink: `{}` on {}/{}", command, project, stack)
}

fn marker(comment_id: &str) -> String {
    format!("<!-- pulumi-comment-id: {} -->", comment_id)
}

/// Builds the comment body.
pub fn build_comment_body(request: &CommentRequest<'_>) -> String {
    let (message, trimmed) = trim_output(
        request.output,
        MAX_COMMENT_OUTPUT_BYTES,
        request.always_include_summary,
    );

    let mut body = format!(
        "{}\n\n<details>\n<summary>Pulumi report</summary>\n\n```\n{}\n```\n",
        heading(request.command, request.project, request.stack),
        message
    );

    if trimmed && request.always_include_summary {
        body.push_str(":warning: **Warn**: The output was too long and trimmed from the front.");
    } else if trimmed {
        body.push_str(":warning: **Warn**: The output was too long and trimmed.");
    }
    body.push_str("\n</details>");

    if request.edit {
        body.push('\n');
        body.push_str(&marker(request.comment_id));
    }
    body
}

/// Every comment on the issue, page by page until a short page.
fn all_comments(api: &dyn PullRequestApi, issue: u64) -> Result<Vec<IssueComment>, GithubError> {
    let mut comments = Vec::new();
    for page in 1..=MAX_COMMENT_PAGES {
        let batch = api.list_comments(issue, page)?;
        let done = batch.len() < COMMENTS_PER_PAGE;
        comments.extend(batch);
        if done {
            break;
        }
    }
    debug!("Fetched {} comments from #{}", comments.len(), issue);
    Ok(comments)
}

/// Finds an earlier comment for the same stack. A marker match wins
/// over a heading match.
fn find_previous(
    comments: &[IssueComment],
    heading: &str,
    marker: &str,
) -> Option<u64> {
    let find = |pred: &dyn Fn(&str) -> bool| {
        comments
            .iter()
            .find(|c| c.body.as_deref().is_some_and(pred))
            .map(|c| c.id)
    };
    find(&|b| b.contains(marker)).or_else(|| find(&|b| b.starts_with(heading)))
}

/// Creates or updates the PR comment.
pub fn handle_pull_request_message(
    api: &dyn PullRequestApi,
    request: &CommentRequest<'_>,
) -> Result<(), GithubError> {
    let issue = request
        .pr_number
        .or(request.event_pr_number)
        .ok_or(GithubError::MissingPullRequest)?;

    let body = build_comment_body(request);

    if request.edit {
        let comments = all_comments(api, issue)?;
        let heading = heading(request.command, request.project, request.stack);
        if let Some(comment_id) = find_previous(&comments, &heading, &marker(request.comment_id)) {
            info!("Updating comment {} on pull request #{}", comment_id, issue);
            return api.update_comment(comment_id, &body);
        }
        debug!("No previous comment found on #{}", issue);
    }

    info!("Commenting on pull request #{}", issue);
    api.create_comment(issue, &body)
}

/// Issues API client.
pub struct GithubClient {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    token: String,
}

impl GithubClient {
    pub fn new(
        api_url: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, path)
    }

    fn request(&self, builder: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response, GithubError> {
        let response = builder
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().unwrap_or_default();
            Err(GithubError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[derive(Serialize)]
struct CommentPayload<'a> {
    body: &'a str,
}

impl PullRequestApi for GithubClient {
    fn list_comments(&self, issue: u64, page: u32) -> Result<Vec<IssueComment>, GithubError> {
        let url = self.url(&format!(
            "issues/{}/comments?per_page={}&page={}",
            issue, COMMENTS_PER_PAGE, page
        ));
        let response = self.request(self.client.get(url))?;
        Ok(response.json()?)
    }

    fn create_comment(&self, issue: u64, body: &str) -> Result<(), GithubError> {
        let url = self.url(&format!("issues/{}/comments", issue));
        self.request(self.client.post(url).json(&CommentPayload { body }))?;
        Ok(())
    }

    fn update_comment(&self, comment_id: u64, body: &str) -> Result<(), GithubError> {
        let url = self.url(&format!("issues/comments/{}", comment_id));
        self.request(self.client.patch(url).json(&CommentPayload { body }))?;
        Ok(())
    }
}
