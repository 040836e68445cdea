//! Isolated git workspace for one cherry-pick attempt
//!
//! [`WorkspaceManager`] walks a fixed sequence of stages, one [`Workspace`]
//! call per transition, and always removes the workspace directory before
//! returning. [`GitWorkspace`] performs the calls with the `git` CLI.

use crate::cherry::diagnostics::ApplyDiagnostics;
use crate::cherry::target::Target;
use crate::error::{Error, Result};
use crate::platform::PlatformService;
use crate::retry::retry_on_error;
use crate::types::{NewPullRequest, PullRequestDetails, RepoId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::Command;
use tracing::{debug, warn};

/// Length of the commit SHA prefix used in branch and directory names
pub const SHORT_SHA_LEN: usize = 12;

/// Result of applying a patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// The patch applied cleanly
    Applied,
    /// The patch was rejected; carries the tool output
    Rejected(String),
}

/// Version-control capability used by the workspace manager
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Clone the upstream repository into `dir`
    async fn clone_repo(&self, dir: &Path) -> Result<()>;

    /// Check out an existing branch
    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Create and switch to a new branch
    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Store patch contents as `file_name` inside the workspace
    async fn write_patch(&self, dir: &Path, file_name: &str, patch: &str) -> Result<()>;

    /// Apply a stored patch with three-way merge
    async fn apply_patch(&self, dir: &Path, file_name: &str) -> Result<ApplyResult>;

    /// Push a branch to the bot's fork
    async fn push(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Remove the workspace directory; missing directories are fine
    async fn cleanup(&self, dir: &Path) -> Result<()>;
}

/// Step that can fail during a workspace run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Cloning upstream
    Clone,
    /// Checking out the target branch
    Checkout,
    /// Creating the cherry-pick branch
    Branch,
    /// Downloading the patch
    FetchPatch,
    /// Applying the patch
    Apply,
    /// Pushing to the fork
    Push,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clone => "clone",
            Self::Checkout => "checkout",
            Self::Branch => "branch",
            Self::FetchPatch => "fetch patch",
            Self::Apply => "apply",
            Self::Push => "push",
        };
        f.write_str(name)
    }
}

/// Stage a workspace run has reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceState {
    /// Nothing done yet
    Cloning,
    /// Upstream cloned and the target branch checked out
    CheckedOutBase,
    /// Cherry-pick branch created
    BranchCreated,
    /// Patch stored in the workspace
    PatchFetched,
    /// Patch applied
    PatchApplied,
    /// Branch pushed
    Pushed,
    /// Draft PR ready
    Done(NewPullRequest),
    /// A phase failed
    Failed(WorkspaceFailure),
}

/// Why a workspace run failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFailure {
    /// Failing phase
    pub phase: Phase,
    /// User-facing message (conflict report for apply failures, possibly empty)
    pub message: String,
}

impl WorkspaceFailure {
    fn new(phase: Phase, target: &str) -> Self {
        let message = match phase {
            Phase::Clone => "git clone failed".to_string(),
            Phase::Checkout => format!("branch {target} not exist"),
            Phase::Branch => "create new branch failed".to_string(),
            Phase::FetchPatch => "download patch file failed".to_string(),
            Phase::Push => "git push failed".to_string(),
            Phase::Apply => String::new(),
        };
        Self { phase, message }
    }
}

impl fmt::Display for WorkspaceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} failed", self.phase)
        } else {
            write!(f, "{} failed: {}", self.phase, self.message)
        }
    }
}

/// First 12 characters of a SHA (or the whole SHA if shorter)
pub fn short_sha(sha: &str) -> &str {
    sha.get(..SHORT_SHA_LEN).unwrap_or(sha)
}

/// Cherry-pick branch name (`<version>-<sha12>`)
pub fn pick_branch_name(version: &str, merge_sha: &str) -> String {
    format!("{version}-{}", short_sha(merge_sha))
}

/// Workspace directory name (`<owner>-<repo>-<sha12>`)
pub fn workspace_dir_name(repo: &RepoId, merge_sha: &str) -> String {
    format!("{}-{}", repo.key(), short_sha(merge_sha))
}

/// Draft PR for a successful pick
pub fn build_draft(
    source: &PullRequestDetails,
    target: &Target,
    bot: &str,
    branch: &str,
) -> NewPullRequest {
    NewPullRequest {
        title: format!("{} (#{})", source.title, source.number),
        head: format!("{bot}:{branch}"),
        base: target.branch.clone(),
        body: format!(
            "cherry-pick #{} to {}\n\n---\n\n{}",
            source.number,
            target.branch,
            source.body.as_deref().unwrap_or_default()
        ),
        maintainer_can_modify: true,
        draft: false,
    }
}

/// Drives a cherry pick through a [`Workspace`]
///
/// Picks of one merge commit to different targets share a directory, so
/// runs are serialized per directory.
pub struct WorkspaceManager {
    workspace: Arc<dyn Workspace>,
    platform: Arc<dyn PlatformService>,
    work_dir: PathBuf,
    bot: String,
    retry_attempts: u32,
    dir_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkspaceManager {
    /// Create a manager rooted at `work_dir`
    pub fn new(
        workspace: Arc<dyn Workspace>,
        platform: Arc<dyn PlatformService>,
        work_dir: impl Into<PathBuf>,
        bot: impl Into<String>,
        retry_attempts: u32,
    ) -> Self {
        Self {
            workspace,
            platform,
            work_dir: work_dir.into(),
            bot: bot.into(),
            retry_attempts,
            dir_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Produce a draft PR for `source` on `target`, retrying whole runs
    pub async fn run(
        &self,
        source: &PullRequestDetails,
        target: &Target,
        merge_sha: &str,
    ) -> std::result::Result<NewPullRequest, WorkspaceFailure> {
        retry_on_error(self.retry_attempts, "cherry-pick workspace", |attempt| {
            debug!(pr_number = source.number, target = %target.branch, attempt, "workspace run");
            self.run_once(source, target, merge_sha)
        })
        .await
    }

    async fn run_once(
        &self,
        source: &PullRequestDetails,
        target: &Target,
        merge_sha: &str,
    ) -> std::result::Result<NewPullRequest, WorkspaceFailure> {
        let repo = self.platform.config().repo_id();
        let dir = self.work_dir.join(workspace_dir_name(&repo, merge_sha));
        let branch = pick_branch_name(&target.version, merge_sha);

        let lock = self.dir_lock(&dir);
        let outcome = {
            let _owner = lock.lock().await;

            // A crashed run may have left the directory behind
            if let Err(e) = self.workspace.cleanup(&dir).await {
                warn!(dir = %dir.display(), error = %e, "failed to remove stale workspace");
            }

            let mut state = WorkspaceState::Cloning;
            loop {
                state = match state {
                    WorkspaceState::Done(draft) => break self.finish(&dir, Ok(draft)).await,
                    WorkspaceState::Failed(failure) => {
                        break self.finish(&dir, Err(failure)).await;
                    }
                    current => self.advance(current, &dir, source, target, &branch).await,
                };
            }
        };
        self.release_dir_lock(&dir, lock);
        outcome
    }

    fn dir_lock(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .dir_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(dir.to_path_buf()).or_default())
    }

    fn release_dir_lock(&self, dir: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .dir_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map and this run hold it: nobody is waiting
        if Arc::strong_count(&lock) == 2 {
            locks.remove(dir);
        }
    }

    /// Perform the call(s) that leave `state`
    async fn advance(
        &self,
        state: WorkspaceState,
        dir: &Path,
        source: &PullRequestDetails,
        target: &Target,
        branch: &str,
    ) -> WorkspaceState {
        let fail = |phase: Phase, e: &Error| {
            debug!(pr_number = source.number, %phase, error = %e, "workspace phase failed");
            WorkspaceState::Failed(WorkspaceFailure::new(phase, &target.branch))
        };
        let patch_file = format!("{}.patch", source.number);

        match state {
            WorkspaceState::Cloning => {
                if let Err(e) = self.workspace.clone_repo(dir).await {
                    return fail(Phase::Clone, &e);
                }
                match self.workspace.checkout(dir, &target.branch).await {
                    Ok(()) => WorkspaceState::CheckedOutBase,
                    Err(e) => fail(Phase::Checkout, &e),
                }
            }
            WorkspaceState::CheckedOutBase => {
                match self.workspace.create_branch(dir, branch).await {
                    Ok(()) => WorkspaceState::BranchCreated,
                    Err(e) => fail(Phase::Branch, &e),
                }
            }
            WorkspaceState::BranchCreated => {
                let fetched = match self.platform.fetch_patch(source.number).await {
                    Ok(patch) => self.workspace.write_patch(dir, &patch_file, &patch).await,
                    Err(e) => Err(e),
                };
                match fetched {
                    Ok(()) => WorkspaceState::PatchFetched,
                    Err(e) => fail(Phase::FetchPatch, &e),
                }
            }
            WorkspaceState::PatchFetched => {
                match self.workspace.apply_patch(dir, &patch_file).await {
                    Ok(ApplyResult::Applied) => WorkspaceState::PatchApplied,
                    Ok(ApplyResult::Rejected(output)) => {
                        WorkspaceState::Failed(WorkspaceFailure {
                            phase: Phase::Apply,
                            message: ApplyDiagnostics::parse(&output).message(),
                        })
                    }
                    Err(e) => fail(Phase::Apply, &e),
                }
            }
            WorkspaceState::PatchApplied => match self.workspace.push(dir, branch).await {
                Ok(()) => WorkspaceState::Pushed,
                Err(e) => fail(Phase::Push, &e),
            },
            WorkspaceState::Pushed => {
                WorkspaceState::Done(build_draft(source, target, &self.bot, branch))
            }
            terminal @ (WorkspaceState::Done(_) | WorkspaceState::Failed(_)) => terminal,
        }
    }

    async fn finish(
        &self,
        dir: &Path,
        outcome: std::result::Result<NewPullRequest, WorkspaceFailure>,
    ) -> std::result::Result<NewPullRequest, WorkspaceFailure> {
        if let Err(e) = self.workspace.cleanup(dir).await {
            warn!(dir = %dir.display(), error = %e, "failed to remove workspace");
        }
        outcome
    }
}

/// [`Workspace`] backed by the `git` CLI
pub struct GitWorkspace {
    /// Authenticated URL of the upstream repository
    origin_url: String,
    /// Authenticated URL of the bot's fork
    fork_url: String,
    bot: String,
    token: String,
}

impl GitWorkspace {
    /// Create a workspace for `repo`, pushing to the bot's fork of it
    pub fn new(repo: &RepoId, host: &str, bot: &str, token: &str) -> Self {
        Self {
            origin_url: format!("https://{bot}:{token}@{host}/{}/{}.git", repo.owner, repo.repo),
            fork_url: format!("https://{bot}:{token}@{host}/{bot}/{}.git", repo.repo),
            bot: bot.to_string(),
            token: token.to_string(),
        }
    }

    /// Run git in `dir`, returning combined output
    ///
    /// `label` names the command in errors so credentials never reach logs.
    async fn git(&self, dir: &Path, label: &str, args: &[&str]) -> Result<(bool, String)> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await
            .map_err(|e| Error::Workspace(format!("failed to run git {label}: {e}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !self.token.is_empty() {
            combined = combined.replace(&self.token, "***");
        }
        Ok((output.status.success(), combined))
    }

    async fn git_ok(&self, dir: &Path, label: &str, args: &[&str]) -> Result<()> {
        let (success, output) = self.git(dir, label, args).await?;
        if success {
            Ok(())
        } else {
            Err(Error::Workspace(format!(
                "git {label} failed: {}",
                output.trim()
            )))
        }
    }
}

#[async_trait]
impl Workspace for GitWorkspace {
    async fn clone_repo(&self, dir: &Path) -> Result<()> {
        let parent = dir
            .parent()
            .ok_or_else(|| Error::Workspace(format!("{} has no parent", dir.display())))?;
        tokio::fs::create_dir_all(parent).await?;
        let target = dir.to_string_lossy().into_owned();
        self.git_ok(parent, "clone", &["clone", &self.origin_url, &target])
            .await
    }

    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        self.git_ok(dir, "checkout", &["checkout", branch]).await
    }

    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.git_ok(dir, "checkout -b", &["checkout", "-b", branch])
            .await
    }

    async fn write_patch(&self, dir: &Path, file_name: &str, patch: &str) -> Result<()> {
        tokio::fs::write(dir.join(file_name), patch).await?;
        Ok(())
    }

    async fn apply_patch(&self, dir: &Path, file_name: &str) -> Result<ApplyResult> {
        let name = format!("user.name={}", self.bot);
        let email = format!("user.email={}@users.noreply.github.com", self.bot);
        let (success, output) = self
            .git(
                dir,
                "am",
                &["-c", &name, "-c", &email, "am", "-3", file_name],
            )
            .await?;

        if !success {
            return Ok(ApplyResult::Rejected(output));
        }
        if let Err(e) = tokio::fs::remove_file(dir.join(file_name)).await {
            warn!(error = %e, "failed to remove patch file");
        }
        Ok(ApplyResult::Applied)
    }

    async fn push(&self, dir: &Path, branch: &str) -> Result<()> {
        self.git_ok(dir, "push", &["push", &self.fork_url, branch])
            .await
    }

    async fn cleanup(&self, dir: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
