//! Store wrapper that fails cherry-pick writes on demand

#![allow(dead_code)]

use async_trait::async_trait;
use backport_bot::error::{Error, Result};
use backport_bot::store::{
    CherryPickRecord, CherryPickStore, ClaimResult, EnqueueResult, MemoryStore, MergeJob,
    MergeJobStore, PullRequestRecord, PullRequestStore, SlackUser, UserDirectory,
};
use backport_bot::types::RepoId;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Delegates to a [`MemoryStore`] but rejects `save_cherry_pick` a set number of times
pub struct FailingStore {
    inner: Arc<MemoryStore>,
    save_failures: Mutex<u32>,
    failed_saves: Mutex<u32>,
}

impl FailingStore {
    /// Wrap `inner` with every write succeeding
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            save_failures: Mutex::new(0),
            failed_saves: Mutex::new(0),
        }
    }

    /// Reject the next `times` cherry-pick saves
    pub fn fail_saves(&self, times: u32) {
        *self.save_failures.lock().unwrap() = times;
    }

    /// Number of saves rejected so far
    pub fn failed_saves(&self) -> u32 {
        *self.failed_saves.lock().unwrap()
    }
}

#[async_trait]
impl PullRequestStore for FailingStore {
    async fn get_pull_request(
        &self,
        repo: &RepoId,
        pr_id: i64,
    ) -> Result<Option<PullRequestRecord>> {
        self.inner.get_pull_request(repo, pr_id).await
    }

    async fn insert_pull_request(&self, record: &PullRequestRecord) -> Result<bool> {
        self.inner.insert_pull_request(record).await
    }

    async fn add_label(&self, repo: &RepoId, pr_id: i64, label: &str) -> Result<()> {
        self.inner.add_label(repo, pr_id, label).await
    }

    async fn remove_label(&self, repo: &RepoId, pr_id: i64, label: &str) -> Result<()> {
        self.inner.remove_label(repo, pr_id, label).await
    }
}

#[async_trait]
impl CherryPickStore for FailingStore {
    async fn get_cherry_pick(
        &self,
        repo: &RepoId,
        from_pr: i64,
        base: &str,
    ) -> Result<Option<CherryPickRecord>> {
        self.inner.get_cherry_pick(repo, from_pr, base).await
    }

    async fn claim_cherry_pick(
        &self,
        repo: &RepoId,
        from_pr: i64,
        base: &str,
    ) -> Result<ClaimResult> {
        self.inner.claim_cherry_pick(repo, from_pr, base).await
    }

    async fn save_cherry_pick(&self, record: &CherryPickRecord) -> Result<()> {
        {
            let mut remaining = self.save_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                *self.failed_saves.lock().unwrap() += 1;
                return Err(Error::Store {
                    operation: "save cherry pick",
                    message: "database is locked".to_string(),
                });
            }
        }
        self.inner.save_cherry_pick(record).await
    }

    async fn insert_cherry_pick(&self, record: &CherryPickRecord) -> Result<bool> {
        self.inner.insert_cherry_pick(record).await
    }
}

#[async_trait]
impl MergeJobStore for FailingStore {
    async fn enqueue_merge_job(
        &self,
        repo: &RepoId,
        pr_id: i64,
        now: DateTime<Utc>,
    ) -> Result<EnqueueResult> {
        self.inner.enqueue_merge_job(repo, pr_id, now).await
    }

    async fn list_unfinished_merge_jobs(&self, repo: &RepoId) -> Result<Vec<MergeJob>> {
        self.inner.list_unfinished_merge_jobs(repo).await
    }

    async fn save_merge_job(&self, job: &MergeJob) -> Result<()> {
        self.inner.save_merge_job(job).await
    }
}

#[async_trait]
impl UserDirectory for FailingStore {
    async fn find_by_github(&self, login: &str) -> Result<Option<SlackUser>> {
        self.inner.find_by_github(login).await
    }
}
