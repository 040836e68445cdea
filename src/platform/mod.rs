//! Platform service for GitHub
//!
//! Provides the narrow interface the cherry-pick and merge workflows need
//! from the code-hosting platform.

mod github;

pub use github::GitHubService;

use crate::error::Result;
use crate::types::{
    BranchUpdate, CheckRun, CommitStatus, MergeRequest, MergeResult, NewPullRequest,
    PlatformConfig, PullRequest, PullRequestDetails,
};
use async_trait::async_trait;

/// Platform service trait for PR operations on one repository
///
/// The GitHub implementation talks to the REST API; tests substitute a mock.
#[async_trait]
pub trait PlatformService: Send + Sync {
    /// Get the platform configuration
    fn config(&self) -> &PlatformConfig;

    /// Get full PR details including labels, reviewers and merge commit
    async fn get_pr_details(&self, pr_number: i64) -> Result<PullRequestDetails>;

    /// Find an existing open PR for a head (`user:branch`)
    async fn find_existing_pr(&self, head: &str) -> Result<Option<PullRequest>>;

    /// Open a new PR
    ///
    /// A duplicate submission surfaces as [`Error::SubmissionDuplicate`].
    ///
    /// [`Error::SubmissionDuplicate`]: crate::error::Error::SubmissionDuplicate
    async fn create_pr(&self, pr: &NewPullRequest) -> Result<PullRequest>;

    /// Create a comment on a PR
    async fn create_pr_comment(&self, pr_number: i64, body: &str) -> Result<()>;

    /// Add labels to a PR
    async fn add_labels(&self, pr_number: i64, labels: &[String]) -> Result<()>;

    /// Remove a label from a PR
    async fn remove_label(&self, pr_number: i64, label: &str) -> Result<()>;

    /// Logins of everyone who has submitted a review, in review order
    async fn list_review_authors(&self, pr_number: i64) -> Result<Vec<String>>;

    /// Request reviews from the given logins
    async fn request_reviewers(&self, pr_number: i64, reviewers: &[String]) -> Result<()>;

    /// Download the PR as a mailbox-format patch (suitable for `git am`)
    async fn fetch_patch(&self, pr_number: i64) -> Result<String>;

    // =========================================================================
    // Merge-related methods
    // =========================================================================

    /// Whether the PR head is behind its base branch
    async fn is_behind_base(&self, pr: &PullRequestDetails) -> Result<bool>;

    /// Merge the base branch into the PR head
    ///
    /// "Nothing to update" answers are reported as [`BranchUpdate::NotNeeded`],
    /// not as errors.
    async fn update_branch(&self, pr_number: i64) -> Result<BranchUpdate>;

    /// Commit statuses (latest per context) for a commit
    async fn list_commit_statuses(&self, sha: &str) -> Result<Vec<CommitStatus>>;

    /// Check runs for a commit
    async fn list_check_runs(&self, sha: &str) -> Result<Vec<CheckRun>>;

    /// `Signed-off-by` lines, one per distinct commit author of the PR
    async fn signed_off_message(&self, pr_number: i64) -> Result<String>;

    /// Merge a PR
    async fn merge_pr(&self, pr_number: i64, request: &MergeRequest) -> Result<MergeResult>;
}
