//! Merge scheduler - effectful operations
//!
//! One scheduler per repository. Each tick advances at most one job: a
//! started job is evaluated, otherwise the oldest queued job is started.

use crate::error::{Error, Result};
use crate::merge::ci::{Precheck, aggregate_ci, merge_title, precheck};
use crate::notify::{self, Notifier, messages};
use crate::platform::PlatformService;
use crate::store::{EnqueueResult, MergeJob, MergeJobStore, Store};
use crate::types::{BranchUpdate, MergeMethod, MergeRequest, PrState, PullRequestDetails};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scheduler settings for one repository
#[derive(Debug, Clone)]
pub struct MergeSettings {
    /// Label marking a PR as mergeable
    pub can_merge_label: String,
    /// Comment that triggers CI
    pub test_command: String,
    /// Add `Signed-off-by` lines to merge commits
    pub signed_off_message: bool,
    /// Tick interval
    pub interval: Duration,
    /// Wait after requesting a branch update
    pub update_settle: Duration,
    /// Wait after triggering CI
    pub test_settle: Duration,
    /// Logins notified when an author has no chat mapping
    pub default_checkers: Vec<String>,
}

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    /// The PR was merged outside the bot
    AlreadyMerged,
    /// The mergeable label was removed
    Abandoned,
    /// The bot merged the PR
    Merged,
    /// CI was green but the merge call failed
    MergeFailed,
    /// CI failed
    CiFailed,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No unfinished jobs
    Idle,
    /// A job's test cycle was started
    Started {
        /// PR number
        pr_id: i64,
    },
    /// Starting failed; the job stays queued
    StartFailed {
        /// PR number
        pr_id: i64,
    },
    /// The head fell behind the base and the test cycle was restarted
    Restarted {
        /// PR number
        pr_id: i64,
    },
    /// CI is still running
    Waiting {
        /// PR number
        pr_id: i64,
    },
    /// Fetching state failed; the job is evaluated again next tick
    EvaluationFailed {
        /// PR number
        pr_id: i64,
    },
    /// The job reached a terminal outcome
    Completed {
        /// PR number
        pr_id: i64,
        /// Terminal outcome
        result: JobResult,
    },
}

/// Auto-merge scheduler for one repository
pub struct MergeScheduler {
    platform: Arc<dyn PlatformService>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    settings: MergeSettings,
    shutdown: CancellationToken,
}

impl MergeScheduler {
    /// Create a scheduler; `shutdown` aborts the loop and any settle wait
    pub fn new(
        platform: Arc<dyn PlatformService>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        settings: MergeSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            platform,
            store,
            notifier,
            settings,
            shutdown,
        }
    }

    /// Tick until shutdown
    pub async fn run(&self) {
        let repo = self.platform.config().repo_id();
        let interval = self.settings.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(%repo, interval = ?self.settings.interval, "merge scheduler started");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.tick().await {
                Ok(TickOutcome::Idle) => {}
                Ok(outcome) => debug!(%repo, ?outcome, "merge tick"),
                Err(Error::Cancelled) => break,
                Err(e) => warn!(%repo, error = %e, "merge tick failed"),
            }
        }
        info!(%repo, "merge scheduler stopped");
    }

    /// Advance at most one job
    pub async fn tick(&self) -> Result<TickOutcome> {
        let repo = self.platform.config().repo_id();
        let jobs = self.store.list_unfinished_merge_jobs(&repo).await?;

        if let Some(active) = jobs.iter().find(|j| j.started) {
            return self.evaluate(active.clone()).await;
        }
        let Some(next) = jobs.into_iter().next() else {
            return Ok(TickOutcome::Idle);
        };

        let pr_id = next.pr_id;
        info!(%repo, pr_number = pr_id, "starting merge job");
        self.start(next).await
    }

    /// Queue a job for `pr` if it is open and carries the mergeable label
    pub async fn enqueue(&self, pr: &PullRequestDetails) -> Result<Option<EnqueueResult>> {
        if pr.state != PrState::Open || !pr.has_label(&self.settings.can_merge_label) {
            return Ok(None);
        }
        let repo = self.platform.config().repo_id();
        let result = self
            .store
            .enqueue_merge_job(&repo, pr.number, Utc::now())
            .await?;

        if result == EnqueueResult::Queued {
            let position = self
                .store
                .list_unfinished_merge_jobs(&repo)
                .await?
                .iter()
                .position(|j| j.pr_id == pr.number)
                .unwrap_or_default();
            info!(%repo, pr_number = pr.number, position, "queued merge job");
            if let Err(e) = self
                .platform
                .create_pr_comment(pr.number, &messages::queued_comment(position))
                .await
            {
                warn!(pr_number = pr.number, error = %e, "failed to post queue comment");
            }
        }
        Ok(Some(result))
    }

    async fn start(&self, mut job: MergeJob) -> Result<TickOutcome> {
        let pr_id = job.pr_id;
        let pr = match self.platform.get_pr_details(pr_id).await {
            Ok(pr) => pr,
            Err(e) => {
                warn!(pr_number = pr_id, error = %e, "failed to fetch PR for merge job");
                return Ok(TickOutcome::StartFailed { pr_id });
            }
        };
        if pr.is_merged() {
            return self.complete(job, JobResult::AlreadyMerged).await;
        }

        match self.platform.is_behind_base(&pr).await {
            Ok(true) => match self.platform.update_branch(pr_id).await {
                Ok(BranchUpdate::Requested) => {
                    debug!(pr_number = pr_id, "branch update requested");
                    self.settle(self.settings.update_settle).await?;
                }
                Ok(BranchUpdate::NotNeeded) => debug!(pr_number = pr_id, "branch already current"),
                Err(e) => {
                    warn!(pr_number = pr_id, error = %e, "failed to update branch");
                    return Ok(TickOutcome::StartFailed { pr_id });
                }
            },
            Ok(false) => {}
            Err(e) => warn!(pr_number = pr_id, error = %e, "failed to compare with base"),
        }

        if let Err(e) = self
            .platform
            .create_pr_comment(pr_id, &self.settings.test_command)
            .await
        {
            warn!(pr_number = pr_id, error = %e, "failed to trigger tests");
            return Ok(TickOutcome::StartFailed { pr_id });
        }

        let restarted = job.started;
        job.started = true;
        self.store.save_merge_job(&job).await?;
        self.settle(self.settings.test_settle).await?;

        Ok(if restarted {
            TickOutcome::Restarted { pr_id }
        } else {
            TickOutcome::Started { pr_id }
        })
    }

    async fn evaluate(&self, job: MergeJob) -> Result<TickOutcome> {
        let pr_id = job.pr_id;
        let pr = match self.platform.get_pr_details(pr_id).await {
            Ok(pr) => pr,
            Err(e) => {
                warn!(pr_number = pr_id, error = %e, "failed to fetch PR");
                return Ok(TickOutcome::EvaluationFailed { pr_id });
            }
        };

        match precheck(&pr, &self.settings.can_merge_label) {
            Precheck::AlreadyMerged => return self.complete(job, JobResult::AlreadyMerged).await,
            Precheck::Abandoned => {
                info!(pr_number = pr_id, "mergeable label removed, dropping job");
                return self.complete(job, JobResult::Abandoned).await;
            }
            Precheck::Continue => {}
        }

        match self.platform.is_behind_base(&pr).await {
            Ok(true) => {
                info!(pr_number = pr_id, "head behind base, restarting job");
                return self.start(job).await;
            }
            Ok(false) => {}
            Err(e) => warn!(pr_number = pr_id, error = %e, "failed to compare with base"),
        }

        let signals = async {
            let statuses = self.platform.list_commit_statuses(&pr.head_sha).await?;
            let checks = self.platform.list_check_runs(&pr.head_sha).await?;
            Ok::<_, Error>((statuses, checks))
        };
        let (statuses, checks) = match signals.await {
            Ok(signals) => signals,
            Err(e) => {
                warn!(pr_number = pr_id, error = %e, "failed to poll CI");
                return Ok(TickOutcome::EvaluationFailed { pr_id });
            }
        };

        let verdict = aggregate_ci(&statuses, &checks);
        debug!(pr_number = pr_id, ?verdict, "CI verdict");

        if verdict.can_merge() {
            let result = self.merge(&pr).await;
            return self.complete(job, result).await;
        }
        if !verdict.success {
            info!(pr_number = pr_id, "CI failed");
            if let Err(e) = self
                .platform
                .create_pr_comment(pr_id, &messages::merge_failed_comment(&pr.author))
                .await
            {
                warn!(pr_number = pr_id, error = %e, "failed to post failure comment");
            }
            self.notify_author(&pr, false).await;
            return self.complete(job, JobResult::CiFailed).await;
        }
        Ok(TickOutcome::Waiting { pr_id })
    }

    async fn merge(&self, pr: &PullRequestDetails) -> JobResult {
        let message = if self.settings.signed_off_message {
            match self.platform.signed_off_message(pr.number).await {
                Ok(message) if !message.is_empty() => Some(message),
                Ok(_) => None,
                Err(e) => {
                    warn!(pr_number = pr.number, error = %e, "failed to build sign-off message");
                    None
                }
            }
        } else {
            None
        };

        let request = MergeRequest {
            method: MergeMethod::Squash,
            title: merge_title(pr),
            message,
        };
        let merged = match self.platform.merge_pr(pr.number, &request).await {
            Ok(result) if result.merged => {
                info!(pr_number = pr.number, sha = ?result.sha, "merged");
                true
            }
            Ok(result) => {
                warn!(pr_number = pr.number, message = ?result.message, "merge rejected");
                false
            }
            Err(e) => {
                warn!(pr_number = pr.number, error = %e, "merge failed");
                false
            }
        };
        self.notify_author(pr, merged).await;
        if merged {
            JobResult::Merged
        } else {
            JobResult::MergeFailed
        }
    }

    async fn complete(&self, mut job: MergeJob, result: JobResult) -> Result<TickOutcome> {
        job.status = true;
        self.store.save_merge_job(&job).await?;
        Ok(TickOutcome::Completed {
            pr_id: job.pr_id,
            result,
        })
    }

    async fn notify_author(&self, pr: &PullRequestDetails, merged: bool) {
        let url = if pr.html_url.is_empty() {
            self.platform.config().pr_url(pr.number)
        } else {
            pr.html_url.clone()
        };
        let text = if merged {
            messages::merge_succeeded(pr.number, &pr.title, &url)
        } else {
            messages::merge_failed(pr.number, &pr.title, &url)
        };
        let checkers: Vec<&str> = self
            .settings
            .default_checkers
            .iter()
            .map(String::as_str)
            .collect();
        let channels = notify::author_channels(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &pr.author,
            &checkers,
        )
        .await;
        notify::broadcast(self.notifier.as_ref(), &channels, &text).await;
    }

    /// Sleep unless shutdown comes first
    async fn settle(&self, duration: Duration) -> Result<()> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = self.shutdown.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
