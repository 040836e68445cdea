//! Mock platform service for testing
//!
//! These are test utilities - not all may be used in every test binary.

#![allow(dead_code)]

use async_trait::async_trait;
use backport_bot::error::{Error, Result};
use backport_bot::platform::PlatformService;
use backport_bot::types::{
    BranchUpdate, CheckRun, CommitStatus, MergeMethod, MergeRequest, MergeResult,
    NewPullRequest, PlatformConfig, PrState, PullRequest, PullRequestDetails, StatusState,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Call record for `create_pr_comment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCommentCall {
    pub pr_number: i64,
    pub body: String,
}

/// Call record for `add_labels`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLabelsCall {
    pub pr_number: i64,
    pub labels: Vec<String>,
}

/// Call record for `remove_label`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveLabelCall {
    pub pr_number: i64,
    pub label: String,
}

/// Call record for `request_reviewers`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReviewersCall {
    pub pr_number: i64,
    pub reviewers: Vec<String>,
}

/// Call record for `merge_pr`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePrCall {
    pub pr_number: i64,
    pub method: MergeMethod,
    pub title: String,
    pub message: Option<String>,
}

/// Simple mock platform service for testing
///
/// Features:
/// - Auto-incrementing PR numbers for `create_pr`
/// - Call tracking for verification
/// - Configurable responses per PR and per commit
/// - Error injection for failure path testing
pub struct MockPlatformService {
    config: PlatformConfig,
    next_pr_number: AtomicI64,
    // Responses
    pr_details: Mutex<HashMap<i64, PullRequestDetails>>,
    find_pr_responses: Mutex<HashMap<String, PullRequest>>,
    review_authors: Mutex<HashMap<i64, Vec<String>>>,
    patches: Mutex<HashMap<i64, String>>,
    behind: Mutex<HashMap<i64, bool>>,
    branch_update: Mutex<BranchUpdate>,
    statuses: Mutex<HashMap<String, Vec<CommitStatus>>>,
    check_runs: Mutex<HashMap<String, Vec<CheckRun>>>,
    sign_off: Mutex<String>,
    merge_result: Mutex<Option<MergeResult>>,
    // Call tracking
    create_pr_calls: Mutex<Vec<NewPullRequest>>,
    create_comment_calls: Mutex<Vec<CreateCommentCall>>,
    add_labels_calls: Mutex<Vec<AddLabelsCall>>,
    remove_label_calls: Mutex<Vec<RemoveLabelCall>>,
    request_reviewers_calls: Mutex<Vec<RequestReviewersCall>>,
    update_branch_calls: Mutex<Vec<i64>>,
    status_calls: Mutex<Vec<String>>,
    merge_pr_calls: Mutex<Vec<MergePrCall>>,
    // Error injection
    error_on_create_pr: Mutex<Option<Error>>,
    error_on_statuses: Mutex<Option<String>>,
    error_on_merge_pr: Mutex<Option<String>>,
    error_on_comment: Mutex<Option<String>>,
}

impl MockPlatformService {
    /// Create a new mock with the given config
    pub fn with_config(config: PlatformConfig) -> Self {
        Self {
            config,
            next_pr_number: AtomicI64::new(1000),
            pr_details: Mutex::new(HashMap::new()),
            find_pr_responses: Mutex::new(HashMap::new()),
            review_authors: Mutex::new(HashMap::new()),
            patches: Mutex::new(HashMap::new()),
            behind: Mutex::new(HashMap::new()),
            branch_update: Mutex::new(BranchUpdate::Requested),
            statuses: Mutex::new(HashMap::new()),
            check_runs: Mutex::new(HashMap::new()),
            sign_off: Mutex::new(String::new()),
            merge_result: Mutex::new(None),
            create_pr_calls: Mutex::new(Vec::new()),
            create_comment_calls: Mutex::new(Vec::new()),
            add_labels_calls: Mutex::new(Vec::new()),
            remove_label_calls: Mutex::new(Vec::new()),
            request_reviewers_calls: Mutex::new(Vec::new()),
            update_branch_calls: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
            merge_pr_calls: Mutex::new(Vec::new()),
            error_on_create_pr: Mutex::new(None),
            error_on_statuses: Mutex::new(None),
            error_on_merge_pr: Mutex::new(None),
            error_on_comment: Mutex::new(None),
        }
    }

    /// Set the number the next created PR gets
    pub fn set_next_pr_number(&self, number: i64) {
        self.next_pr_number.store(number, Ordering::SeqCst);
    }

    // === Error injection methods ===

    /// Make `create_pr` return an error
    pub fn fail_create_pr(&self, error: Error) {
        *self.error_on_create_pr.lock().unwrap() = Some(error);
    }

    /// Make status and check-run queries return an error
    pub fn fail_statuses(&self, msg: &str) {
        *self.error_on_statuses.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear injected status errors
    pub fn clear_status_failure(&self) {
        *self.error_on_statuses.lock().unwrap() = None;
    }

    /// Make `merge_pr` return an error
    pub fn fail_merge_pr(&self, msg: &str) {
        *self.error_on_merge_pr.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `create_pr_comment` return an error
    pub fn fail_comments(&self, msg: &str) {
        *self.error_on_comment.lock().unwrap() = Some(msg.to_string());
    }

    // === Response setup ===

    /// Set the response for `get_pr_details`
    pub fn set_pr_details(&self, details: PullRequestDetails) {
        self.pr_details
            .lock()
            .unwrap()
            .insert(details.number, details);
    }

    /// Change the state of a stored PR
    pub fn set_pr_state(&self, pr_number: i64, state: PrState) {
        if let Some(pr) = self.pr_details.lock().unwrap().get_mut(&pr_number) {
            pr.state = state;
        }
    }

    /// Replace the labels of a stored PR
    pub fn set_pr_labels(&self, pr_number: i64, labels: &[&str]) {
        if let Some(pr) = self.pr_details.lock().unwrap().get_mut(&pr_number) {
            pr.labels = labels.iter().map(ToString::to_string).collect();
        }
    }

    /// Set the response for `find_existing_pr`
    pub fn set_find_pr_response(&self, head: &str, pr: PullRequest) {
        self.find_pr_responses
            .lock()
            .unwrap()
            .insert(head.to_string(), pr);
    }

    /// Set review authors of a PR
    pub fn set_review_authors(&self, pr_number: i64, authors: &[&str]) {
        self.review_authors
            .lock()
            .unwrap()
            .insert(pr_number, authors.iter().map(ToString::to_string).collect());
    }

    /// Set whether a PR head is behind its base
    pub fn set_behind(&self, pr_number: i64, behind: bool) {
        self.behind.lock().unwrap().insert(pr_number, behind);
    }

    /// Set the answer of `update_branch`
    pub fn set_branch_update(&self, update: BranchUpdate) {
        *self.branch_update.lock().unwrap() = update;
    }

    /// Set commit statuses for a SHA
    pub fn set_statuses(&self, sha: &str, statuses: &[(&str, StatusState)]) {
        self.statuses.lock().unwrap().insert(
            sha.to_string(),
            statuses
                .iter()
                .map(|(context, state)| CommitStatus {
                    context: (*context).to_string(),
                    state: *state,
                })
                .collect(),
        );
    }

    /// Set check runs for a SHA as `(name, status, conclusion)`
    pub fn set_check_runs(&self, sha: &str, runs: &[(&str, &str, Option<&str>)]) {
        self.check_runs.lock().unwrap().insert(
            sha.to_string(),
            runs.iter()
                .map(|(name, status, conclusion)| CheckRun {
                    name: (*name).to_string(),
                    status: (*status).to_string(),
                    conclusion: conclusion.map(ToString::to_string),
                })
                .collect(),
        );
    }

    /// Set the sign-off message
    pub fn set_sign_off(&self, message: &str) {
        *self.sign_off.lock().unwrap() = message.to_string();
    }

    /// Set the result of `merge_pr`
    pub fn set_merge_result(&self, result: MergeResult) {
        *self.merge_result.lock().unwrap() = Some(result);
    }

    // === Call verification methods ===

    /// Get all `create_pr` calls
    pub fn get_create_pr_calls(&self) -> Vec<NewPullRequest> {
        self.create_pr_calls.lock().unwrap().clone()
    }

    /// Get all `create_pr_comment` calls
    pub fn get_create_comment_calls(&self) -> Vec<CreateCommentCall> {
        self.create_comment_calls.lock().unwrap().clone()
    }

    /// Comment bodies posted on one PR
    pub fn comments_on(&self, pr_number: i64) -> Vec<String> {
        self.get_create_comment_calls()
            .into_iter()
            .filter(|c| c.pr_number == pr_number)
            .map(|c| c.body)
            .collect()
    }

    /// Get all `add_labels` calls
    pub fn get_add_labels_calls(&self) -> Vec<AddLabelsCall> {
        self.add_labels_calls.lock().unwrap().clone()
    }

    /// Get all `remove_label` calls
    pub fn get_remove_label_calls(&self) -> Vec<RemoveLabelCall> {
        self.remove_label_calls.lock().unwrap().clone()
    }

    /// Get all `request_reviewers` calls
    pub fn get_request_reviewers_calls(&self) -> Vec<RequestReviewersCall> {
        self.request_reviewers_calls.lock().unwrap().clone()
    }

    /// Get all `update_branch` calls
    pub fn get_update_branch_calls(&self) -> Vec<i64> {
        self.update_branch_calls.lock().unwrap().clone()
    }

    /// Get all SHAs whose statuses were queried
    pub fn get_status_calls(&self) -> Vec<String> {
        self.status_calls.lock().unwrap().clone()
    }

    /// Get all `merge_pr` calls
    pub fn get_merge_pr_calls(&self) -> Vec<MergePrCall> {
        self.merge_pr_calls.lock().unwrap().clone()
    }

    /// Get count of `merge_pr` calls
    pub fn merge_call_count(&self) -> usize {
        self.merge_pr_calls.lock().unwrap().len()
    }

    /// Assert that `create_pr` was called with specific head and base
    pub fn assert_create_pr_called(&self, head: &str, base: &str) {
        let calls = self.get_create_pr_calls();
        assert!(
            calls.iter().any(|c| c.head == head && c.base == base),
            "Expected create_pr({head}, {base}) but got: {calls:?}"
        );
    }

    /// Assert that `merge_pr` was NOT called for a specific PR
    pub fn assert_merge_not_called(&self, pr_number: i64) {
        let calls = self.get_merge_pr_calls();
        assert!(
            !calls.iter().any(|c| c.pr_number == pr_number),
            "Expected merge_pr({pr_number}) NOT to be called but it was: {calls:?}"
        );
    }

    fn statuses_error(&self) -> Option<Error> {
        self.error_on_statuses
            .lock()
            .unwrap()
            .as_ref()
            .map(|msg| Error::GitHubApi(msg.clone()))
    }
}

#[async_trait]
impl PlatformService for MockPlatformService {
    fn config(&self) -> &PlatformConfig {
        &self.config
    }

    async fn get_pr_details(&self, pr_number: i64) -> Result<PullRequestDetails> {
        self.pr_details
            .lock()
            .unwrap()
            .get(&pr_number)
            .cloned()
            .ok_or_else(|| Error::GitHubApi(format!("PR #{pr_number} not found")))
    }

    async fn find_existing_pr(&self, head: &str) -> Result<Option<PullRequest>> {
        Ok(self.find_pr_responses.lock().unwrap().get(head).cloned())
    }

    async fn create_pr(&self, pr: &NewPullRequest) -> Result<PullRequest> {
        self.create_pr_calls.lock().unwrap().push(pr.clone());

        if let Some(error) = self.error_on_create_pr.lock().unwrap().take() {
            return Err(error);
        }

        let number = self.next_pr_number.fetch_add(1, Ordering::SeqCst);
        Ok(PullRequest {
            number,
            html_url: self.config.pr_url(number),
            base_ref: pr.base.clone(),
            head_ref: pr.head.clone(),
            title: pr.title.clone(),
        })
    }

    async fn create_pr_comment(&self, pr_number: i64, body: &str) -> Result<()> {
        self.create_comment_calls
            .lock()
            .unwrap()
            .push(CreateCommentCall {
                pr_number,
                body: body.to_string(),
            });
        if let Some(msg) = self.error_on_comment.lock().unwrap().as_ref() {
            return Err(Error::GitHubApi(msg.clone()));
        }
        Ok(())
    }

    async fn add_labels(&self, pr_number: i64, labels: &[String]) -> Result<()> {
        self.add_labels_calls.lock().unwrap().push(AddLabelsCall {
            pr_number,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    async fn remove_label(&self, pr_number: i64, label: &str) -> Result<()> {
        self.remove_label_calls.lock().unwrap().push(RemoveLabelCall {
            pr_number,
            label: label.to_string(),
        });
        Ok(())
    }

    async fn list_review_authors(&self, pr_number: i64) -> Result<Vec<String>> {
        Ok(self
            .review_authors
            .lock()
            .unwrap()
            .get(&pr_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn request_reviewers(&self, pr_number: i64, reviewers: &[String]) -> Result<()> {
        self.request_reviewers_calls
            .lock()
            .unwrap()
            .push(RequestReviewersCall {
                pr_number,
                reviewers: reviewers.to_vec(),
            });
        Ok(())
    }

    async fn fetch_patch(&self, pr_number: i64) -> Result<String> {
        Ok(self
            .patches
            .lock()
            .unwrap()
            .get(&pr_number)
            .cloned()
            .unwrap_or_else(|| {
                format!("From 0000 Mon Sep 17 00:00:00 2001\nSubject: PR {pr_number}\n")
            }))
    }

    async fn is_behind_base(&self, pr: &PullRequestDetails) -> Result<bool> {
        Ok(self
            .behind
            .lock()
            .unwrap()
            .get(&pr.number)
            .copied()
            .unwrap_or(false))
    }

    async fn update_branch(&self, pr_number: i64) -> Result<BranchUpdate> {
        self.update_branch_calls.lock().unwrap().push(pr_number);
        // GitHub brings the head up to date asynchronously
        self.behind.lock().unwrap().insert(pr_number, false);
        Ok(*self.branch_update.lock().unwrap())
    }

    async fn list_commit_statuses(&self, sha: &str) -> Result<Vec<CommitStatus>> {
        self.status_calls.lock().unwrap().push(sha.to_string());
        if let Some(error) = self.statuses_error() {
            return Err(error);
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(sha)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        if let Some(error) = self.statuses_error() {
            return Err(error);
        }
        Ok(self
            .check_runs
            .lock()
            .unwrap()
            .get(sha)
            .cloned()
            .unwrap_or_default())
    }

    async fn signed_off_message(&self, _pr_number: i64) -> Result<String> {
        Ok(self.sign_off.lock().unwrap().clone())
    }

    async fn merge_pr(&self, pr_number: i64, request: &MergeRequest) -> Result<MergeResult> {
        self.merge_pr_calls.lock().unwrap().push(MergePrCall {
            pr_number,
            method: request.method,
            title: request.title.clone(),
            message: request.message.clone(),
        });

        if let Some(msg) = self.error_on_merge_pr.lock().unwrap().as_ref() {
            return Err(Error::GitHubApi(msg.clone()));
        }

        let result = self.merge_result.lock().unwrap().clone().unwrap_or(MergeResult {
            merged: true,
            sha: Some(format!("merged_sha_{pr_number}")),
            message: None,
        });
        if result.merged {
            if let Some(pr) = self.pr_details.lock().unwrap().get_mut(&pr_number) {
                pr.state = PrState::Merged;
            }
        }
        Ok(result)
    }
}
