//! Core types for backport-bot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository coordinates (`owner/repo`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
}

impl RepoId {
    /// Create a new repository id
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Key used to route webhooks and name workspaces (`owner-repo`)
    pub fn key(&self) -> String {
        format!("{}-{}", self.owner, self.repo)
    }

    /// Parse `owner/repo`
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, repo) = full_name.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(owner, repo))
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Platform configuration
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Custom host (None for github.com)
    pub host: Option<String>,
}

impl PlatformConfig {
    /// Repository id for this configuration
    pub fn repo_id(&self) -> RepoId {
        RepoId::new(&self.owner, &self.repo)
    }

    /// Web host (`github.com` unless a custom host is configured)
    pub fn web_host(&self) -> &str {
        self.host.as_deref().unwrap_or("github.com")
    }

    /// Web URL of a pull request in this repository
    pub fn pr_url(&self, number: i64) -> String {
        format!(
            "https://{}/{}/{}/pull/{number}",
            self.web_host(),
            self.owner,
            self.repo
        )
    }
}

/// A pull request created by the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// PR number (`-1` for a dry-run submission)
    pub number: i64,
    /// Web URL for the PR
    pub html_url: String,
    /// Base branch name
    pub base_ref: String,
    /// Head branch name
    pub head_ref: String,
    /// PR title
    pub title: String,
}

/// Fields for opening a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    /// Title, `"<source title> (#<source number>)"` for cherry picks
    pub title: String,
    /// Head in `user:branch` form
    pub head: String,
    /// Target branch
    pub base: String,
    /// Description
    pub body: String,
    /// Whether maintainers may push to the head branch
    pub maintainer_can_modify: bool,
    /// Whether to open as draft
    pub draft: bool,
}

/// PR state (open, closed, merged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrState {
    /// PR is open
    Open,
    /// PR was closed without merging
    Closed,
    /// PR was merged
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// Pull request details as needed by cherry picks and merge jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestDetails {
    /// PR number
    pub number: i64,
    /// PR title
    pub title: String,
    /// PR body/description
    pub body: Option<String>,
    /// Current state of the PR
    pub state: PrState,
    /// Login of the PR author
    pub author: String,
    /// Head branch name
    pub head_ref: String,
    /// Head label (`user:branch`)
    pub head_label: String,
    /// Head commit SHA
    pub head_sha: String,
    /// Base branch name
    pub base_ref: String,
    /// SHA of the merge commit, once merged
    pub merge_commit_sha: Option<String>,
    /// Label names, in GitHub order
    pub labels: Vec<String>,
    /// Logins of currently requested reviewers
    pub requested_reviewers: Vec<String>,
    /// Web URL for the PR
    pub html_url: String,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
}

impl PullRequestDetails {
    /// Whether the PR has been merged
    pub fn is_merged(&self) -> bool {
        self.state == PrState::Merged
    }

    /// Whether the PR carries `label`
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// State of a commit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    /// Passed
    Success,
    /// Still running
    Pending,
    /// Failed
    Failure,
    /// Errored
    Error,
}

impl StatusState {
    /// Parse a GitHub status state; unknown values are treated as pending
    pub fn parse(state: &str) -> Self {
        match state {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }
}

/// A commit status on the head commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    /// Status context (CI job name)
    pub context: String,
    /// Status state
    pub state: StatusState,
}

/// A check run on the head commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    /// Check name
    pub name: String,
    /// `queued`, `in_progress`, `completed`, ...
    pub status: String,
    /// Conclusion once completed (`success`, `failure`, ...)
    pub conclusion: Option<String>,
}

impl CheckRun {
    /// Whether the check run has finished
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Result of a merge operation
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Whether the merge was successful
    pub merged: bool,
    /// The SHA of the merge commit (if successful)
    pub sha: Option<String>,
    /// Message from the merge operation (especially on failure)
    pub message: Option<String>,
}

/// Merge strategy/method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    /// Squash all commits into one
    Squash,
    /// Create a merge commit
    Merge,
    /// Rebase commits onto base branch
    Rebase,
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

/// Parameters of a merge call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    /// Merge method
    pub method: MergeMethod,
    /// Commit title
    pub title: String,
    /// Commit message body (e.g. sign-off lines)
    pub message: Option<String>,
}

/// Outcome of a branch update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchUpdate {
    /// GitHub accepted the update
    Requested,
    /// The head already contains the base
    NotNeeded,
}
