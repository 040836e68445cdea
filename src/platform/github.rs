//! GitHub platform service implementation

use crate::error::{Error, Result};
use crate::platform::PlatformService;
use crate::types::{
    BranchUpdate, CheckRun, CommitStatus, MergeMethod, MergeRequest, MergeResult,
    NewPullRequest, PlatformConfig, PrState, PullRequest, PullRequestDetails, StatusState,
};
use async_trait::async_trait;
use octocrab::Octocrab;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// GitHub service using octocrab
pub struct GitHubService {
    client: Octocrab,
    config: PlatformConfig,
    /// Token for raw HTTP requests (statuses, patches, branch updates)
    token: String,
    /// HTTP client for raw requests
    http_client: Client,
    /// API host for raw requests
    api_host: String,
}

impl GitHubService {
    /// Create a new GitHub service
    pub fn new(token: &str, owner: String, repo: String, host: Option<String>) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());

        let api_host = if let Some(ref h) = host {
            let base_url = format!("https://{h}/api/v3");
            builder = builder
                .base_uri(&base_url)
                .map_err(|e| Error::GitHubApi(e.to_string()))?;
            format!("{h}/api/v3")
        } else {
            "api.github.com".to_string()
        };

        let client = builder
            .build()
            .map_err(|e| Error::GitHubApi(e.to_string()))?;

        let http_client = Client::builder()
            .user_agent("backport-bot")
            .build()
            .map_err(|e| Error::GitHubApi(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: PlatformConfig { owner, repo, host },
            token: token.to_string(),
            http_client,
            api_host,
        })
    }

    /// Build an authenticated request against `/repos/{owner}/{repo}/{path}`
    fn repo_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "https://{}/repos/{}/{}/{path}",
            self.api_host, self.config.owner, self.config.repo
        );
        self.http_client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Send a request, mapping transport failures and non-success statuses
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to {what}: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GitHubApi(format!("Failed to {what}: {status} {body}")));
        }
        Ok(response)
    }
}

/// Convert a PR number to octocrab's unsigned form
fn pr_u64(pr_number: i64) -> Result<u64> {
    u64::try_from(pr_number).map_err(|_| Error::GitHubApi(format!("invalid PR number {pr_number}")))
}

/// Convert an octocrab PR number back to ours
fn pr_i64(number: u64) -> i64 {
    i64::try_from(number).unwrap_or(i64::MAX)
}

/// Helper to convert octocrab PR to our `PullRequest` type
fn pr_from_octocrab(pr: &octocrab::models::pulls::PullRequest) -> PullRequest {
    PullRequest {
        number: pr_i64(pr.number),
        html_url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        base_ref: pr.base.ref_field.clone(),
        head_ref: pr.head.ref_field.clone(),
        title: pr.title.as_deref().unwrap_or_default().to_string(),
    }
}

/// Helper to convert octocrab PR to `PullRequestDetails`
fn details_from_octocrab(pr: &octocrab::models::pulls::PullRequest) -> PullRequestDetails {
    let state = match pr.state {
        Some(octocrab::models::IssueState::Open) => PrState::Open,
        Some(octocrab::models::IssueState::Closed) if pr.merged_at.is_some() => PrState::Merged,
        // IssueState is non-exhaustive, so use wildcard for Closed and any future variants
        Some(_) | None => PrState::Closed,
    };

    PullRequestDetails {
        number: pr_i64(pr.number),
        title: pr.title.clone().unwrap_or_default(),
        body: pr.body.clone(),
        state,
        author: pr
            .user
            .as_ref()
            .map(|u| u.login.clone())
            .unwrap_or_default(),
        head_ref: pr.head.ref_field.clone(),
        head_label: pr
            .head
            .label
            .clone()
            .unwrap_or_else(|| pr.head.ref_field.clone()),
        head_sha: pr.head.sha.clone(),
        base_ref: pr.base.ref_field.clone(),
        merge_commit_sha: pr.merge_commit_sha.clone(),
        labels: pr
            .labels
            .as_ref()
            .map(|labels| labels.iter().map(|l| l.name.clone()).collect())
            .unwrap_or_default(),
        requested_reviewers: pr
            .requested_reviewers
            .as_ref()
            .map(|users| users.iter().map(|u| u.login.clone()).collect())
            .unwrap_or_default(),
        html_url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        created_at: pr.created_at,
    }
}

/// Build `Signed-off-by` lines for distinct commit authors, in commit order
pub(crate) fn sign_off_lines<'a>(authors: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut lines: Vec<String> = Vec::new();
    for (name, email) in authors {
        let line = format!("Signed-off-by: {name} <{email}>");
        if !lines.contains(&line) {
            lines.push(line);
        }
    }
    lines.join("\n")
}

#[async_trait]
impl PlatformService for GitHubService {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }

    async fn get_pr_details(&self, pr_number: i64) -> Result<PullRequestDetails> {
        debug!(pr_number, "getting PR details");

        let pr = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .get(pr_u64(pr_number)?)
            .await?;

        let details = details_from_octocrab(&pr);
        debug!(pr_number, state = %details.state, "got PR details");
        Ok(details)
    }

    async fn find_existing_pr(&self, head: &str) -> Result<Option<PullRequest>> {
        debug!(head, "finding existing PR");

        let prs = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .list()
            .head(head.to_string())
            .state(octocrab::params::State::Open)
            .send()
            .await?;

        let result = prs.items.first().map(pr_from_octocrab);
        if let Some(ref pr) = result {
            debug!(pr_number = pr.number, "found existing PR");
        } else {
            debug!("no existing PR found");
        }
        Ok(result)
    }

    async fn create_pr(&self, pr: &NewPullRequest) -> Result<PullRequest> {
        debug!(head = %pr.head, base = %pr.base, "creating PR");

        let created = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .create(&pr.title, &pr.head, &pr.base)
            .body(&pr.body)
            .draft(pr.draft)
            .maintainer_can_modify(pr.maintainer_can_modify)
            .send()
            .await?;

        let result = pr_from_octocrab(&created);
        debug!(pr_number = result.number, "created PR");
        Ok(result)
    }

    async fn create_pr_comment(&self, pr_number: i64, body: &str) -> Result<()> {
        debug!(pr_number, "creating PR comment");
        self.client
            .issues(&self.config.owner, &self.config.repo)
            .create_comment(pr_u64(pr_number)?, body)
            .await?;
        debug!(pr_number, "created PR comment");
        Ok(())
    }

    async fn add_labels(&self, pr_number: i64, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        debug!(pr_number, ?labels, "adding labels");
        self.client
            .issues(&self.config.owner, &self.config.repo)
            .add_labels(pr_u64(pr_number)?, labels)
            .await?;
        Ok(())
    }

    async fn remove_label(&self, pr_number: i64, label: &str) -> Result<()> {
        debug!(pr_number, label, "removing label");
        self.client
            .issues(&self.config.owner, &self.config.repo)
            .remove_label(pr_u64(pr_number)?, label)
            .await?;
        Ok(())
    }

    async fn list_review_authors(&self, pr_number: i64) -> Result<Vec<String>> {
        debug!(pr_number, "listing reviews");
        let reviews = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .list_reviews(pr_u64(pr_number)?)
            .send()
            .await?;

        Ok(reviews
            .items
            .into_iter()
            .filter_map(|r| r.user.map(|u| u.login))
            .collect())
    }

    async fn request_reviewers(&self, pr_number: i64, reviewers: &[String]) -> Result<()> {
        if reviewers.is_empty() {
            return Ok(());
        }
        debug!(pr_number, ?reviewers, "requesting reviewers");
        let request = self
            .repo_request(
                Method::POST,
                &format!("pulls/{pr_number}/requested_reviewers"),
            )
            .json(&serde_json::json!({ "reviewers": reviewers }));
        self.send(request, "request reviewers").await?;
        Ok(())
    }

    async fn fetch_patch(&self, pr_number: i64) -> Result<String> {
        debug!(pr_number, "downloading patch");
        let request = self
            .repo_request(Method::GET, &format!("pulls/{pr_number}"))
            .header("Accept", "application/vnd.github.v3.patch");
        let response = self.send(request, "download patch").await?;
        response
            .text()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to read patch: {e}")))
    }

    // =========================================================================
    // Merge-related methods
    // =========================================================================

    async fn is_behind_base(&self, pr: &PullRequestDetails) -> Result<bool> {
        #[derive(Deserialize)]
        struct Comparison {
            behind_by: u64,
        }

        let request = self.repo_request(
            Method::GET,
            &format!("compare/{}...{}", pr.base_ref, pr.head_sha),
        );
        let comparison: Comparison = self
            .send(request, "compare branches")
            .await?
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse comparison: {e}")))?;

        debug!(
            pr_number = pr.number,
            behind_by = comparison.behind_by,
            "compared head with base"
        );
        Ok(comparison.behind_by > 0)
    }

    async fn update_branch(&self, pr_number: i64) -> Result<BranchUpdate> {
        debug!(pr_number, "updating branch");
        let response = self
            .repo_request(Method::PUT, &format!("pulls/{pr_number}/update-branch"))
            .send()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to update branch: {e}")))?;

        match response.status() {
            status if status.is_success() => Ok(BranchUpdate::Requested),
            // 422 is returned when there is nothing to merge from the base
            StatusCode::UNPROCESSABLE_ENTITY => {
                debug!(pr_number, "branch already up to date");
                Ok(BranchUpdate::NotNeeded)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::GitHubApi(format!(
                    "Failed to update branch: {status} {body}"
                )))
            }
        }
    }

    async fn list_commit_statuses(&self, sha: &str) -> Result<Vec<CommitStatus>> {
        #[derive(Deserialize)]
        struct CombinedStatus {
            statuses: Vec<RawStatus>,
        }

        #[derive(Deserialize)]
        struct RawStatus {
            context: String,
            state: String,
        }

        let request = self.repo_request(Method::GET, &format!("commits/{sha}/status"));
        let combined: CombinedStatus = self
            .send(request, "fetch commit status")
            .await?
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse commit status: {e}")))?;

        debug!(sha, count = combined.statuses.len(), "fetched commit statuses");
        Ok(combined
            .statuses
            .into_iter()
            .map(|s| CommitStatus {
                context: s.context,
                state: StatusState::parse(&s.state),
            })
            .collect())
    }

    async fn list_check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        #[derive(Deserialize)]
        struct CheckRunsResponse {
            check_runs: Vec<RawCheckRun>,
        }

        #[derive(Deserialize)]
        struct RawCheckRun {
            name: String,
            status: String,
            conclusion: Option<String>,
        }

        let request = self
            .repo_request(Method::GET, &format!("commits/{sha}/check-runs"))
            .query(&[("per_page", "100")]);
        let response: CheckRunsResponse = self
            .send(request, "fetch check runs")
            .await?
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse check runs: {e}")))?;

        debug!(sha, count = response.check_runs.len(), "fetched check runs");
        Ok(response
            .check_runs
            .into_iter()
            .map(|r| CheckRun {
                name: r.name,
                status: r.status,
                conclusion: r.conclusion,
            })
            .collect())
    }

    async fn signed_off_message(&self, pr_number: i64) -> Result<String> {
        #[derive(Deserialize)]
        struct RawCommit {
            commit: CommitDetail,
        }

        #[derive(Deserialize)]
        struct CommitDetail {
            author: Option<GitActor>,
        }

        #[derive(Deserialize)]
        struct GitActor {
            name: String,
            email: String,
        }

        let request = self
            .repo_request(Method::GET, &format!("pulls/{pr_number}/commits"))
            .query(&[("per_page", "100")]);
        let commits: Vec<RawCommit> = self
            .send(request, "list PR commits")
            .await?
            .json()
            .await
            .map_err(|e| Error::GitHubApi(format!("Failed to parse PR commits: {e}")))?;

        Ok(sign_off_lines(
            commits
                .iter()
                .filter_map(|c| c.commit.author.as_ref())
                .map(|a| (a.name.as_str(), a.email.as_str())),
        ))
    }

    async fn merge_pr(&self, pr_number: i64, request: &MergeRequest) -> Result<MergeResult> {
        debug!(pr_number, method = %request.method, "merging PR");

        let octocrab_method = match request.method {
            MergeMethod::Squash => octocrab::params::pulls::MergeMethod::Squash,
            MergeMethod::Merge => octocrab::params::pulls::MergeMethod::Merge,
            MergeMethod::Rebase => octocrab::params::pulls::MergeMethod::Rebase,
        };

        let pulls = self.client.pulls(&self.config.owner, &self.config.repo);
        let mut builder = pulls
            .merge(pr_u64(pr_number)?)
            .method(octocrab_method)
            .title(request.title.clone());
        if let Some(ref message) = request.message {
            builder = builder.message(message.clone());
        }
        let result = builder
            .send()
            .await
            .map_err(|e| Error::GitHubApi(format!("Merge failed: {e}")))?;

        let merge_result = MergeResult {
            merged: result.merged,
            sha: result.sha,
            message: result.message,
        };

        debug!(
            pr_number,
            merged = merge_result.merged,
            sha = ?merge_result.sha,
            "merge complete"
        );
        Ok(merge_result)
    }
}
