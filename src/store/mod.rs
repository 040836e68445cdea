//! Persistence for observed PRs, cherry-pick records, merge jobs and chat users
//!
//! Each concern is a separate trait so handlers only see what they use.
//! [`MemoryStore`] keeps everything in process; [`SqliteStore`] survives
//! restarts.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::RepoId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pull request the bot has seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// PR number
    pub pr_id: i64,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// PR title at first observation
    pub title: String,
    /// Labels in the order they were applied
    pub labels: Vec<String>,
    /// Whether the PR was merged when first observed
    pub merged: bool,
    /// PR creation time
    pub created_at: DateTime<Utc>,
}

/// One cherry pick of a source PR onto one target branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CherryPickRecord {
    /// Number of the cherry-pick PR (0 until it exists)
    pub pr_id: i64,
    /// Number of the source PR
    pub from_pr: i64,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Cherry-pick PR title
    pub title: String,
    /// Cherry-pick PR head (`user:branch`)
    pub head: String,
    /// Target branch
    pub base: String,
    /// Cherry-pick PR body
    pub body: String,
    /// Whether the bot opened the PR (false for manual picks)
    pub created_by_bot: bool,
    /// 1 when the PR was found to exist already, otherwise 0
    pub try_time: i64,
    /// Whether a PR exists for this pick
    pub success: bool,
    /// Whether an attempt currently holds the claim
    pub in_flight: bool,
}

impl CherryPickRecord {
    /// A fresh, unsuccessful record for `(from_pr, base)`
    pub fn pending(repo: &RepoId, from_pr: i64, base: &str) -> Self {
        Self {
            pr_id: 0,
            from_pr,
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            title: String::new(),
            head: String::new(),
            base: base.to_string(),
            body: String::new(),
            created_by_bot: true,
            try_time: 0,
            success: false,
            in_flight: false,
        }
    }

    /// Repository the record belongs to
    pub fn repo_id(&self) -> RepoId {
        RepoId::new(&self.owner, &self.repo)
    }
}

/// Outcome of claiming a cherry pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// The caller owns the attempt; the record is marked in flight
    Claimed(CherryPickRecord),
    /// A PR already exists for this pick
    AlreadyDone(CherryPickRecord),
    /// Another attempt holds the claim
    InFlight,
}

/// A queued auto-merge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeJob {
    /// PR number
    pub pr_id: i64,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Whether the test cycle has begun
    pub started: bool,
    /// Whether the job reached a terminal outcome
    pub status: bool,
    /// Queue time
    pub created_at: DateTime<Utc>,
}

impl MergeJob {
    /// Repository the job belongs to
    pub fn repo_id(&self) -> RepoId {
        RepoId::new(&self.owner, &self.repo)
    }
}

/// Outcome of queueing a merge job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// A new (or reset) job was queued
    Queued,
    /// An unfinished job already exists for the PR
    AlreadyQueued,
}

/// Chat identity of a GitHub user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackUser {
    /// GitHub login
    pub github: String,
    /// Email address, used to look up the Slack id when `slack` is empty
    pub email: String,
    /// Slack user id
    pub slack: String,
}

/// Observed pull requests and their labels
#[async_trait]
pub trait PullRequestStore: Send + Sync {
    /// Fetch a PR record
    async fn get_pull_request(&self, repo: &RepoId, pr_id: i64)
    -> Result<Option<PullRequestRecord>>;

    /// Insert a PR record unless one exists; returns whether it was inserted
    async fn insert_pull_request(&self, record: &PullRequestRecord) -> Result<bool>;

    /// Append a label to a PR record (no-op if present or the PR is unknown)
    async fn add_label(&self, repo: &RepoId, pr_id: i64, label: &str) -> Result<()>;

    /// Remove a label from a PR record
    async fn remove_label(&self, repo: &RepoId, pr_id: i64, label: &str) -> Result<()>;
}

/// Cherry-pick records keyed by `(owner, repo, from_pr, base)`
#[async_trait]
pub trait CherryPickStore: Send + Sync {
    /// Fetch the record for a source PR and target branch
    async fn get_cherry_pick(
        &self,
        repo: &RepoId,
        from_pr: i64,
        base: &str,
    ) -> Result<Option<CherryPickRecord>>;

    /// Atomically insert-or-inspect the record for `(from_pr, base)`
    ///
    /// A missing or previously failed record is marked in flight and
    /// returned as [`ClaimResult::Claimed`].
    async fn claim_cherry_pick(&self, repo: &RepoId, from_pr: i64, base: &str)
    -> Result<ClaimResult>;

    /// Write a record back, releasing or keeping the claim per `in_flight`
    async fn save_cherry_pick(&self, record: &CherryPickRecord) -> Result<()>;

    /// Insert a record unless one exists; returns whether it was inserted
    async fn insert_cherry_pick(&self, record: &CherryPickRecord) -> Result<bool>;
}

/// Merge jobs keyed by `(owner, repo, pr_id)`
#[async_trait]
pub trait MergeJobStore: Send + Sync {
    /// Queue a job, resetting a finished one for the same PR
    async fn enqueue_merge_job(
        &self,
        repo: &RepoId,
        pr_id: i64,
        now: DateTime<Utc>,
    ) -> Result<EnqueueResult>;

    /// Jobs with `status == false`, oldest first
    async fn list_unfinished_merge_jobs(&self, repo: &RepoId) -> Result<Vec<MergeJob>>;

    /// Persist job flags
    async fn save_merge_job(&self, job: &MergeJob) -> Result<()>;
}

/// Read-only GitHub login to chat identity mapping
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by GitHub login
    async fn find_by_github(&self, login: &str) -> Result<Option<SlackUser>>;
}

/// Everything the bot persists
pub trait Store: PullRequestStore + CherryPickStore + MergeJobStore + UserDirectory {}

impl<T> Store for T where T: PullRequestStore + CherryPickStore + MergeJobStore + UserDirectory {}
