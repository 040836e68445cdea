//! Per-repository event dispatcher

use crate::cherry::{CherryPickOutcome, CherryPicker};
use crate::error::Result;
use crate::event::{BotEvent, PullRequestAction, PullRequestEvent};
use crate::merge::MergeScheduler;
use crate::platform::PlatformService;
use crate::store::{PullRequestRecord, PullRequestStore, Store};
use crate::types::{PullRequestDetails, RepoId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether a bot may handle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed but not wired; events are dropped
    Uninitialized,
    /// Handling events
    Ready,
}

/// Handles webhook events for one repository
pub struct RepoBot {
    repo: RepoId,
    webhook_secret: String,
    lifecycle: Lifecycle,
    platform: Arc<dyn PlatformService>,
    store: Arc<dyn Store>,
    picker: Option<CherryPicker>,
    scheduler: Option<Arc<MergeScheduler>>,
}

impl RepoBot {
    /// Create a bot with neither cherry picking nor merging enabled
    pub fn new(
        webhook_secret: impl Into<String>,
        lifecycle: Lifecycle,
        platform: Arc<dyn PlatformService>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            repo: platform.config().repo_id(),
            webhook_secret: webhook_secret.into(),
            lifecycle,
            platform,
            store,
            picker: None,
            scheduler: None,
        }
    }

    /// Enable cherry picking
    #[must_use]
    pub fn with_cherry_picker(mut self, picker: CherryPicker) -> Self {
        self.picker = Some(picker);
        self
    }

    /// Enable the merge queue
    #[must_use]
    pub fn with_merge_scheduler(mut self, scheduler: Arc<MergeScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Repository this bot serves
    pub const fn repo(&self) -> &RepoId {
        &self.repo
    }

    /// Secret used to verify webhook signatures
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    /// Current lifecycle
    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Handle one event
    ///
    /// Failures in one step are logged and do not stop the others.
    pub async fn handle(&self, event: BotEvent) -> Result<()> {
        if self.lifecycle == Lifecycle::Uninitialized {
            warn!(repo = %self.repo, "bot not initialized, dropping event");
            return Ok(());
        }

        match event {
            BotEvent::Ignored { kind } => {
                debug!(repo = %self.repo, kind, "ignoring event");
                Ok(())
            }
            BotEvent::PullRequest(event) => self.handle_pull_request(event).await,
        }
    }

    async fn handle_pull_request(&self, event: PullRequestEvent) -> Result<()> {
        if event.repo != self.repo {
            warn!(repo = %self.repo, event_repo = %event.repo, "event for another repository");
            return Ok(());
        }
        debug!(
            repo = %self.repo,
            pr_number = event.number,
            action = ?event.action,
            "pull request event"
        );

        if let Err(e) = self.track(&event).await {
            warn!(pr_number = event.number, error = %e, "failed to record pull request");
        }

        let wants_pick = self.picker.is_some()
            && match event.action {
                PullRequestAction::Labeled => event.merged && event.label.is_some(),
                PullRequestAction::Closed => event.merged,
                PullRequestAction::Opened => true,
                _ => false,
            };
        let wants_merge = self.scheduler.is_some()
            && matches!(
                event.action,
                PullRequestAction::Opened
                    | PullRequestAction::Reopened
                    | PullRequestAction::Labeled
                    | PullRequestAction::Synchronize
            );
        if !wants_pick && !wants_merge {
            return Ok(());
        }

        let details = self.platform.get_pr_details(event.number).await?;

        if wants_pick {
            self.cherry_pick(&event, &details).await;
        }
        if let Some(scheduler) = self.scheduler.as_ref().filter(|_| wants_merge) {
            if let Err(e) = scheduler.enqueue(&details).await {
                warn!(pr_number = event.number, error = %e, "failed to queue merge job");
            }
        }
        Ok(())
    }

    async fn track(&self, event: &PullRequestEvent) -> Result<()> {
        match event.action {
            PullRequestAction::Opened | PullRequestAction::Labeled => {
                let record = PullRequestRecord {
                    pr_id: event.number,
                    owner: self.repo.owner.clone(),
                    repo: self.repo.repo.clone(),
                    title: event.title.clone(),
                    labels: Vec::new(),
                    merged: event.merged,
                    created_at: event.created_at.unwrap_or_else(Utc::now),
                };
                if self.store.insert_pull_request(&record).await? {
                    debug!(pr_number = event.number, "recorded pull request");
                }
                if let (PullRequestAction::Labeled, Some(label)) = (&event.action, &event.label) {
                    self.store.add_label(&self.repo, event.number, label).await?;
                }
            }
            PullRequestAction::Unlabeled => {
                if let Some(label) = &event.label {
                    self.store
                        .remove_label(&self.repo, event.number, label)
                        .await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn cherry_pick(&self, event: &PullRequestEvent, details: &PullRequestDetails) {
        let Some(picker) = &self.picker else {
            return;
        };

        match event.action {
            PullRequestAction::Opened => match picker.record_manual_pick(details).await {
                Ok(_) => {}
                Err(e) => warn!(
                    pr_number = details.number,
                    error = %e,
                    "failed to record manual cherry pick"
                ),
            },
            PullRequestAction::Labeled => {
                if let Some(label) = &event.label {
                    self.pick_one(picker, details, label).await;
                }
            }
            PullRequestAction::Closed => {
                for label in &details.labels {
                    self.pick_one(picker, details, label).await;
                }
            }
            _ => {}
        }
    }

    async fn pick_one(&self, picker: &CherryPicker, details: &PullRequestDetails, label: &str) {
        match picker.pick(details, label).await {
            Ok(CherryPickOutcome::NotCherryPickLabel) => {}
            Ok(outcome) => {
                info!(pr_number = details.number, label, ?outcome, "cherry pick handled");
            }
            Err(e) => warn!(pr_number = details.number, label, error = %e, "cherry pick failed"),
        }
    }
}
