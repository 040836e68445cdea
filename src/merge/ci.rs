//! Merge decisions - pure functions over fetched PR and CI state
//!
//! No I/O happens here; the scheduler gathers data and acts on the result.

use crate::types::{CheckRun, CommitStatus, PullRequestDetails, StatusState};

/// Aggregated CI signal for a head commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CiVerdict {
    /// No status or completed check has failed
    pub success: bool,
    /// Nothing is still running, or something already failed
    pub finish: bool,
}

impl CiVerdict {
    /// Whether the PR may be merged now
    pub const fn can_merge(self) -> bool {
        self.success && self.finish
    }
}

/// Combine commit statuses and check runs
///
/// A failed or errored status, or a completed check whose conclusion is not
/// `success`, fails the verdict. Pending statuses and unfinished checks keep
/// it open unless it has already failed.
pub fn aggregate_ci(statuses: &[CommitStatus], checks: &[CheckRun]) -> CiVerdict {
    let mut success = true;
    let mut pending = false;

    for status in statuses {
        match status.state {
            StatusState::Failure | StatusState::Error => success = false,
            StatusState::Pending => pending = true,
            StatusState::Success => {}
        }
    }

    for check in checks {
        if !check.is_completed() {
            pending = true;
        } else if check.conclusion.as_deref() != Some("success") {
            success = false;
        }
    }

    CiVerdict {
        success,
        finish: !success || !pending,
    }
}

/// What to do with the active job before looking at CI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precheck {
    /// The PR was merged elsewhere
    AlreadyMerged,
    /// The mergeable label was removed
    Abandoned,
    /// Evaluate CI
    Continue,
}

/// Check merge state and label of a freshly fetched PR
pub fn precheck(pr: &PullRequestDetails, can_merge_label: &str) -> Precheck {
    if pr.is_merged() {
        Precheck::AlreadyMerged
    } else if !pr.has_label(can_merge_label) {
        Precheck::Abandoned
    } else {
        Precheck::Continue
    }
}

/// Squash-merge commit title
pub fn merge_title(pr: &PullRequestDetails) -> String {
    format!("{} (#{})", pr.title, pr.number)
}
