//! In-memory stand-in for the git workspace

#![allow(dead_code)]

use async_trait::async_trait;
use backport_bot::cherry::{ApplyResult, Phase, Workspace};
use backport_bot::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Records workspace calls and tracks which directories "exist"
#[derive(Default)]
pub struct FakeWorkspace {
    calls: Mutex<Vec<String>>,
    live_dirs: Mutex<HashSet<PathBuf>>,
    fail_phase: Mutex<Option<Phase>>,
    fail_times: Mutex<u32>,
    reject_output: Mutex<Option<String>>,
    pushed: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    clashes: Mutex<Vec<String>>,
}

impl FakeWorkspace {
    /// Create a workspace where everything succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `phase` on every attempt
    pub fn fail_at(&self, phase: Phase) {
        self.fail_at_times(phase, u32::MAX);
    }

    /// Fail `phase` on the first `times` attempts
    pub fn fail_at_times(&self, phase: Phase, times: u32) {
        *self.fail_phase.lock().unwrap() = Some(phase);
        *self.fail_times.lock().unwrap() = times;
    }

    /// Reject the patch with the given tool output
    pub fn reject_patch(&self, output: &str) {
        *self.reject_output.lock().unwrap() = Some(output.to_string());
    }

    /// Pretend a directory was left behind by a crashed run
    pub fn leave_stale_dir(&self, dir: &Path) {
        self.live_dirs.lock().unwrap().insert(dir.to_path_buf());
    }

    /// Sleep inside every call so concurrent runs interleave
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Calls that found their directory missing or already cloned
    pub fn clashes(&self) -> Vec<String> {
        self.clashes.lock().unwrap().clone()
    }

    /// Calls in order, as `"op arg"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of `clone` calls
    pub fn clone_count(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("clone")).count()
    }

    /// Directories not yet cleaned up
    pub fn live_dirs(&self) -> Vec<PathBuf> {
        self.live_dirs.lock().unwrap().iter().cloned().collect()
    }

    /// Branches pushed
    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Note a call made on a directory this run no longer owns
    fn expect_live(&self, dir: &Path, call: &str) {
        if !self.live_dirs.lock().unwrap().contains(dir) {
            self.clashes
                .lock()
                .unwrap()
                .push(format!("{call} in missing {}", dir.display()));
        }
    }

    fn maybe_fail(&self, phase: Phase) -> Result<()> {
        let mut fail_phase = self.fail_phase.lock().unwrap();
        if *fail_phase != Some(phase) {
            return Ok(());
        }
        let mut times = self.fail_times.lock().unwrap();
        *times = times.saturating_sub(1);
        if *times == 0 {
            *fail_phase = None;
        }
        Err(Error::Workspace(format!("injected {phase} failure")))
    }
}

#[async_trait]
impl Workspace for FakeWorkspace {
    async fn clone_repo(&self, dir: &Path) -> Result<()> {
        self.record(format!("clone {}", dir.display()));
        self.pause().await;
        self.maybe_fail(Phase::Clone)?;
        if !self.live_dirs.lock().unwrap().insert(dir.to_path_buf()) {
            self.clashes
                .lock()
                .unwrap()
                .push(format!("clone over live {}", dir.display()));
        }
        Ok(())
    }

    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        self.record(format!("checkout {branch}"));
        self.pause().await;
        self.expect_live(dir, "checkout");
        self.maybe_fail(Phase::Checkout)
    }

    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.record(format!("branch {branch}"));
        self.pause().await;
        self.expect_live(dir, "branch");
        self.maybe_fail(Phase::Branch)
    }

    async fn write_patch(&self, _dir: &Path, file_name: &str, _patch: &str) -> Result<()> {
        self.record(format!("write {file_name}"));
        self.maybe_fail(Phase::FetchPatch)
    }

    async fn apply_patch(&self, dir: &Path, file_name: &str) -> Result<ApplyResult> {
        self.record(format!("apply {file_name}"));
        self.pause().await;
        self.expect_live(dir, "apply");
        self.maybe_fail(Phase::Apply)?;
        Ok(self
            .reject_output
            .lock()
            .unwrap()
            .clone()
            .map_or(ApplyResult::Applied, ApplyResult::Rejected))
    }

    async fn push(&self, dir: &Path, branch: &str) -> Result<()> {
        self.record(format!("push {branch}"));
        self.pause().await;
        self.expect_live(dir, "push");
        self.maybe_fail(Phase::Push)?;
        self.pushed.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn cleanup(&self, dir: &Path) -> Result<()> {
        self.record(format!("cleanup {}", dir.display()));
        self.live_dirs.lock().unwrap().remove(dir);
        Ok(())
    }
}
