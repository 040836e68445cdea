//! In-memory store; all state is lost on restart.

use super::{
    CherryPickRecord, CherryPickStore, ClaimResult, EnqueueResult, MergeJob, MergeJobStore,
    PullRequestRecord, PullRequestStore, SlackUser, UserDirectory,
};
use crate::error::Result;
use crate::types::RepoId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

type PrKey = (String, String, i64);
type PickKey = (String, String, i64, String);

fn pr_key(repo: &RepoId, pr_id: i64) -> PrKey {
    (repo.owner.clone(), repo.repo.clone(), pr_id)
}

fn pick_key(repo: &RepoId, from_pr: i64, base: &str) -> PickKey {
    (repo.owner.clone(), repo.repo.clone(), from_pr, base.to_string())
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    pull_requests: RwLock<HashMap<PrKey, PullRequestRecord>>,
    cherry_picks: RwLock<HashMap<PickKey, CherryPickRecord>>,
    /// Insertion order doubles as arrival order for equal timestamps
    merge_jobs: RwLock<Vec<MergeJob>>,
    users: RwLock<HashMap<String, SlackUser>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chat user
    pub async fn insert_user(&self, user: SlackUser) {
        self.users.write().await.insert(user.github.clone(), user);
    }

    /// Every cherry-pick record, for inspection
    pub async fn cherry_picks(&self) -> Vec<CherryPickRecord> {
        self.cherry_picks.read().await.values().cloned().collect()
    }

    /// Every merge job, for inspection
    pub async fn merge_jobs(&self) -> Vec<MergeJob> {
        self.merge_jobs.read().await.clone()
    }
}

#[async_trait]
impl PullRequestStore for MemoryStore {
    async fn get_pull_request(
        &self,
        repo: &RepoId,
        pr_id: i64,
    ) -> Result<Option<PullRequestRecord>> {
        Ok(self
            .pull_requests
            .read()
            .await
            .get(&pr_key(repo, pr_id))
            .cloned())
    }

    async fn insert_pull_request(&self, record: &PullRequestRecord) -> Result<bool> {
        let key = (record.owner.clone(), record.repo.clone(), record.pr_id);
        let mut prs = self.pull_requests.write().await;
        if prs.contains_key(&key) {
            return Ok(false);
        }
        prs.insert(key, record.clone());
        Ok(true)
    }

    async fn add_label(&self, repo: &RepoId, pr_id: i64, label: &str) -> Result<()> {
        if let Some(record) = self
            .pull_requests
            .write()
            .await
            .get_mut(&pr_key(repo, pr_id))
        {
            if !record.labels.iter().any(|l| l == label) {
                record.labels.push(label.to_string());
            }
        }
        Ok(())
    }

    async fn remove_label(&self, repo: &RepoId, pr_id: i64, label: &str) -> Result<()> {
        if let Some(record) = self
            .pull_requests
            .write()
            .await
            .get_mut(&pr_key(repo, pr_id))
        {
            record.labels.retain(|l| l != label);
        }
        Ok(())
    }
}

#[async_trait]
impl CherryPickStore for MemoryStore {
    async fn get_cherry_pick(
        &self,
        repo: &RepoId,
        from_pr: i64,
        base: &str,
    ) -> Result<Option<CherryPickRecord>> {
        Ok(self
            .cherry_picks
            .read()
            .await
            .get(&pick_key(repo, from_pr, base))
            .cloned())
    }

    async fn claim_cherry_pick(
        &self,
        repo: &RepoId,
        from_pr: i64,
        base: &str,
    ) -> Result<ClaimResult> {
        let mut picks = self.cherry_picks.write().await;
        let record = picks
            .entry(pick_key(repo, from_pr, base))
            .or_insert_with(|| CherryPickRecord::pending(repo, from_pr, base));

        if record.success {
            return Ok(ClaimResult::AlreadyDone(record.clone()));
        }
        if record.in_flight {
            return Ok(ClaimResult::InFlight);
        }
        record.in_flight = true;
        Ok(ClaimResult::Claimed(record.clone()))
    }

    async fn save_cherry_pick(&self, record: &CherryPickRecord) -> Result<()> {
        self.cherry_picks.write().await.insert(
            pick_key(&record.repo_id(), record.from_pr, &record.base),
            record.clone(),
        );
        Ok(())
    }

    async fn insert_cherry_pick(&self, record: &CherryPickRecord) -> Result<bool> {
        let key = pick_key(&record.repo_id(), record.from_pr, &record.base);
        let mut picks = self.cherry_picks.write().await;
        if picks.contains_key(&key) {
            return Ok(false);
        }
        picks.insert(key, record.clone());
        Ok(true)
    }
}

#[async_trait]
impl MergeJobStore for MemoryStore {
    async fn enqueue_merge_job(
        &self,
        repo: &RepoId,
        pr_id: i64,
        now: DateTime<Utc>,
    ) -> Result<EnqueueResult> {
        let mut jobs = self.merge_jobs.write().await;
        let existing = jobs
            .iter()
            .position(|j| j.owner == repo.owner && j.repo == repo.repo && j.pr_id == pr_id);

        match existing {
            Some(idx) if !jobs[idx].status => Ok(EnqueueResult::AlreadyQueued),
            Some(idx) => {
                // Re-queue at the back so arrival order stays meaningful
                let mut job = jobs.remove(idx);
                job.started = false;
                job.status = false;
                job.created_at = now;
                jobs.push(job);
                Ok(EnqueueResult::Queued)
            }
            None => {
                jobs.push(MergeJob {
                    pr_id,
                    owner: repo.owner.clone(),
                    repo: repo.repo.clone(),
                    started: false,
                    status: false,
                    created_at: now,
                });
                Ok(EnqueueResult::Queued)
            }
        }
    }

    async fn list_unfinished_merge_jobs(&self, repo: &RepoId) -> Result<Vec<MergeJob>> {
        let mut jobs: Vec<MergeJob> = self
            .merge_jobs
            .read()
            .await
            .iter()
            .filter(|j| j.owner == repo.owner && j.repo == repo.repo && !j.status)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn save_merge_job(&self, job: &MergeJob) -> Result<()> {
        let mut jobs = self.merge_jobs.write().await;
        if let Some(existing) = jobs
            .iter_mut()
            .find(|j| j.owner == job.owner && j.repo == job.repo && j.pr_id == job.pr_id)
        {
            *existing = job.clone();
        } else {
            jobs.push(job.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_github(&self, login: &str) -> Result<Option<SlackUser>> {
        Ok(self.users.read().await.get(login).cloned())
    }
}
