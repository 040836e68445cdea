//! Cherry-pick orchestration
//!
//! Resolve the label, claim the `(source PR, target)` record, run the
//! workspace, submit the PR and do the follow-up bookkeeping. Follow-up
//! failures are logged and never undo a recorded pick. Once a pick is
//! claimed, store write failures are logged as well and failure reports
//! still go out.

use crate::cherry::target::{Resolver, Target};
use crate::cherry::workspace::{WorkspaceFailure, WorkspaceManager};
use crate::error::{Error, Result};
use crate::notify::{self, Notifier, messages};
use crate::platform::PlatformService;
use crate::retry::retry_on_error;
use crate::store::{CherryPickRecord, CherryPickStore, ClaimResult, Store};
use crate::types::{NewPullRequest, PullRequest, PullRequestDetails};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one cherry-pick request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CherryPickOutcome {
    /// The label is not a cherry-pick label
    NotCherryPickLabel,
    /// The source PR is not merged (or has no merge commit)
    NotMerged,
    /// A PR already exists for this target
    AlreadyPicked {
        /// Number of the existing cherry-pick PR
        pr_id: i64,
    },
    /// Another attempt for this target is running
    InFlight,
    /// A new PR was opened (`-1` in dry-run mode, where nothing is recorded)
    Created {
        /// Number of the new PR
        pr_number: i64,
        /// Target branch
        target: String,
    },
    /// GitHub reported the PR as already existing
    SubmissionDuplicate {
        /// Number of the existing PR when it could be found (0 otherwise)
        pr_id: i64,
    },
    /// The workspace run failed
    WorkspaceFailed(WorkspaceFailure),
    /// Opening the PR failed
    SubmissionFailed(String),
}

/// Settings the orchestrator needs from repository configuration
#[derive(Debug, Clone, Default)]
pub struct CherryPickSettings {
    /// Simulate submission, leave no record and skip every write after it
    pub dryrun: bool,
    /// Comment posted on new PRs to trigger CI (empty to skip)
    pub run_test_command: String,
    /// Channel receiving every cherry-pick notification (empty to skip)
    pub cherry_pick_channel: String,
    /// Logins notified when an author has no chat mapping
    pub default_checkers: Vec<String>,
}

/// Reviewers for a cherry-pick PR
///
/// Prior review authors followed by currently requested reviewers, without
/// the source author and without duplicates.
pub fn collect_reviewers(
    author: &str,
    review_authors: &[String],
    requested: &[String],
) -> Vec<String> {
    let mut reviewers: Vec<String> = Vec::new();
    for login in review_authors.iter().chain(requested) {
        if login != author && !reviewers.contains(login) {
            reviewers.push(login.clone());
        }
    }
    reviewers
}

/// Source PR number from a cherry-pick title ending in `(#<n>)`
pub fn source_pr_from_title(title: &str) -> Option<i64> {
    let rest = title.strip_suffix(')')?;
    let digits = &rest[rest.rfind("(#")? + 2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Runs cherry picks for one repository
pub struct CherryPicker {
    platform: Arc<dyn PlatformService>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    manager: WorkspaceManager,
    resolver: Resolver,
    settings: CherryPickSettings,
}

impl CherryPicker {
    /// Create an orchestrator
    pub fn new(
        platform: Arc<dyn PlatformService>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        manager: WorkspaceManager,
        resolver: Resolver,
        settings: CherryPickSettings,
    ) -> Self {
        Self {
            platform,
            store,
            notifier,
            manager,
            resolver,
            settings,
        }
    }

    /// Label resolver for this repository
    pub const fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Cherry pick `source` to the branch named by `label`
    pub async fn pick(
        &self,
        source: &PullRequestDetails,
        label: &str,
    ) -> Result<CherryPickOutcome> {
        let target = match self.resolver.resolve(label) {
            Ok(target) => target,
            Err(Error::PatternMismatch(_)) => return Ok(CherryPickOutcome::NotCherryPickLabel),
            Err(e) => return Err(e),
        };
        let Some(merge_sha) = source
            .merge_commit_sha
            .as_deref()
            .filter(|_| source.is_merged())
        else {
            debug!(pr_number = source.number, "source PR not merged, skipping");
            return Ok(CherryPickOutcome::NotMerged);
        };

        let repo = self.platform.config().repo_id();
        let mut record = match self
            .store
            .claim_cherry_pick(&repo, source.number, &target.branch)
            .await?
        {
            ClaimResult::Claimed(record) => record,
            ClaimResult::AlreadyDone(record) => {
                debug!(pr_number = source.number, target = %target.branch, "already picked");
                return Ok(CherryPickOutcome::AlreadyPicked {
                    pr_id: record.pr_id,
                });
            }
            ClaimResult::InFlight => {
                debug!(pr_number = source.number, target = %target.branch, "pick in flight");
                return Ok(CherryPickOutcome::InFlight);
            }
        };

        info!(pr_number = source.number, target = %target.branch, "cherry picking");

        let draft = match self.manager.run(source, &target, merge_sha).await {
            Ok(draft) => draft,
            Err(failure) => {
                warn!(
                    pr_number = source.number,
                    target = %target.branch,
                    %failure,
                    "workspace failed"
                );
                self.release(record).await;
                self.report_failure(source, &target, &failure.message).await;
                return Ok(CherryPickOutcome::WorkspaceFailed(failure));
            }
        };

        record.title.clone_from(&draft.title);
        record.head.clone_from(&draft.head);
        record.body.clone_from(&draft.body);
        record.created_by_bot = true;

        match self.submit(&draft).await {
            Ok(pr) if self.settings.dryrun => {
                // Nothing was opened; a later live run must be able to claim the pair
                self.release(record).await;
                info!(head = %draft.head, base = %draft.base, "dry run, skipping follow-ups");
                Ok(CherryPickOutcome::Created {
                    pr_number: pr.number,
                    target: target.branch,
                })
            }
            Ok(pr) => {
                record.pr_id = pr.number;
                record.try_time = 0;
                record.success = true;
                record.in_flight = false;
                self.persist(&record).await;
                info!(
                    pr_number = source.number,
                    new_pr = pr.number,
                    target = %target.branch,
                    "cherry pick created"
                );
                self.follow_up(source, &target, &pr).await;
                Ok(CherryPickOutcome::Created {
                    pr_number: pr.number,
                    target: target.branch,
                })
            }
            Err(Error::SubmissionDuplicate(_)) => {
                let existing = match self.platform.find_existing_pr(&draft.head).await {
                    Ok(pr) => pr.map_or(0, |pr| pr.number),
                    Err(e) => {
                        warn!(head = %draft.head, error = %e, "failed to look up existing PR");
                        0
                    }
                };
                record.pr_id = existing;
                record.try_time = 1;
                record.success = true;
                record.in_flight = false;
                self.persist(&record).await;
                info!(pr_number = source.number, existing, "cherry pick PR already exists");
                Ok(CherryPickOutcome::SubmissionDuplicate { pr_id: existing })
            }
            Err(e) => {
                warn!(
                    pr_number = source.number,
                    target = %target.branch,
                    error = %e,
                    "submission failed"
                );
                self.release(record).await;
                self.report_failure(source, &target, &e.to_string()).await;
                Ok(CherryPickOutcome::SubmissionFailed(e.to_string()))
            }
        }
    }

    /// Record a cherry-pick PR opened by hand
    ///
    /// Returns whether a record was written. An existing record for the
    /// same source and base, finished or not, is left alone.
    pub async fn record_manual_pick(&self, pr: &PullRequestDetails) -> Result<bool> {
        let Some(from_pr) = source_pr_from_title(&pr.title) else {
            return Ok(false);
        };
        let repo = self.platform.config().repo_id();
        let record = CherryPickRecord {
            pr_id: pr.number,
            title: pr.title.clone(),
            head: pr.head_label.clone(),
            created_by_bot: false,
            success: true,
            ..CherryPickRecord::pending(&repo, from_pr, &pr.base_ref)
        };
        if !self.store.insert_cherry_pick(&record).await? {
            debug!(pr_number = pr.number, from_pr, base = %pr.base_ref, "pick already recorded");
            return Ok(false);
        }
        info!(pr_number = pr.number, from_pr, base = %pr.base_ref, "recorded manual cherry pick");
        Ok(true)
    }

    async fn submit(&self, draft: &NewPullRequest) -> Result<PullRequest> {
        if self.settings.dryrun {
            info!(
                head = %draft.head,
                base = %draft.base,
                title = %draft.title,
                "dry run, not opening PR"
            );
            return Ok(PullRequest {
                number: -1,
                html_url: String::new(),
                base_ref: draft.base.clone(),
                head_ref: draft.head.clone(),
                title: draft.title.clone(),
            });
        }
        self.platform.create_pr(draft).await
    }

    async fn release(&self, mut record: CherryPickRecord) {
        record.success = false;
        record.in_flight = false;
        self.persist(&record).await;
    }

    /// Write `record` back, retrying once; a lasting failure is only logged
    async fn persist(&self, record: &CherryPickRecord) {
        let saved = retry_on_error(2, "save cherry pick", |_| {
            self.store.save_cherry_pick(record)
        })
        .await;
        if let Err(e) = saved {
            warn!(
                pr_number = record.from_pr,
                target = %record.base,
                in_flight = record.in_flight,
                error = %e,
                "failed to save cherry pick record"
            );
        }
    }

    fn origin_url(&self, source: &PullRequestDetails) -> String {
        if source.html_url.is_empty() {
            self.platform.config().pr_url(source.number)
        } else {
            source.html_url.clone()
        }
    }

    async fn follow_up(&self, source: &PullRequestDetails, target: &Target, pr: &PullRequest) {
        let labels = self.resolver.labels_to_copy(&source.labels, &target.version);
        if !labels.is_empty() {
            if let Err(e) = self.platform.add_labels(pr.number, &labels).await {
                warn!(pr_number = pr.number, error = %e, "failed to copy labels");
            }
        }

        let review_authors = self
            .platform
            .list_review_authors(source.number)
            .await
            .unwrap_or_else(|e| {
                warn!(pr_number = source.number, error = %e, "failed to list reviews");
                Vec::new()
            });
        let reviewers =
            collect_reviewers(&source.author, &review_authors, &source.requested_reviewers);
        if !reviewers.is_empty() {
            if let Err(e) = self.platform.request_reviewers(pr.number, &reviewers).await {
                warn!(pr_number = pr.number, error = %e, "failed to request reviewers");
            }
        }

        if !self.settings.run_test_command.is_empty() {
            if let Err(e) = self
                .platform
                .create_pr_comment(pr.number, &self.settings.run_test_command)
                .await
            {
                warn!(pr_number = pr.number, error = %e, "failed to post test command");
            }
        }

        if let Err(e) = self.replace_labels(source, &target.version).await {
            warn!(pr_number = source.number, error = %e, "failed to replace labels");
        }

        let comment = messages::cherry_pick_comment(&target.branch, Some(pr.number));
        if let Err(e) = self.platform.create_pr_comment(source.number, &comment).await {
            warn!(pr_number = source.number, error = %e, "failed to comment on source PR");
        }

        if !self.settings.cherry_pick_channel.is_empty() {
            let new_url = if pr.html_url.is_empty() {
                self.platform.config().pr_url(pr.number)
            } else {
                pr.html_url.clone()
            };
            let text = messages::cherry_pick_succeeded(
                &source.head_label,
                &target.branch,
                &new_url,
                &self.origin_url(source),
            );
            notify::broadcast(
                self.notifier.as_ref(),
                std::slice::from_ref(&self.settings.cherry_pick_channel),
                &text,
            )
            .await;
        }
    }

    async fn replace_labels(&self, source: &PullRequestDetails, version: &str) -> Result<()> {
        let Some(replacement) = self.resolver.replace_label_for(version) else {
            return Ok(());
        };
        self.platform
            .add_labels(source.number, std::slice::from_ref(&replacement))
            .await?;
        for label in self.resolver.labels_for_version(&source.labels, version) {
            self.platform.remove_label(source.number, label).await?;
        }
        Ok(())
    }

    async fn report_failure(&self, source: &PullRequestDetails, target: &Target, diagnostic: &str) {
        if self.settings.dryrun {
            info!(
                pr_number = source.number,
                target = %target.branch,
                "dry run, not reporting failure"
            );
            return;
        }

        let comment = messages::cherry_pick_comment(&target.branch, None);
        if let Err(e) = self.platform.create_pr_comment(source.number, &comment).await {
            warn!(pr_number = source.number, error = %e, "failed to comment on source PR");
        }

        let text = messages::cherry_pick_failed(
            &source.head_label,
            &target.branch,
            &self.origin_url(source),
            diagnostic,
        );
        let checkers: Vec<&str> = self
            .settings
            .default_checkers
            .iter()
            .map(String::as_str)
            .collect();
        let mut channels = Vec::new();
        if !self.settings.cherry_pick_channel.is_empty() {
            channels.push(self.settings.cherry_pick_channel.clone());
        }
        channels.extend(
            notify::author_channels(
                self.store.as_ref(),
                self.notifier.as_ref(),
                &source.author,
                &checkers,
            )
            .await,
        );
        notify::broadcast(self.notifier.as_ref(), &channels, &text).await;
    }
}
