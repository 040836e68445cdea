//! Cherry picking merged PRs onto maintenance branches
//!
//! - [`target`]: label to branch resolution and label rewriting (pure)
//! - [`diagnostics`]: conflict reports from patch output (pure)
//! - [`workspace`]: the clone/apply/push sequence behind the `Workspace` trait
//! - [`pick`]: orchestration, dedup and follow-ups

pub mod diagnostics;
pub mod pick;
pub mod target;
pub mod workspace;

pub use diagnostics::ApplyDiagnostics;
pub use pick::{
    CherryPickOutcome, CherryPickSettings, CherryPicker, collect_reviewers, source_pr_from_title,
};
pub use target::{Resolver, Target};
pub use workspace::{
    ApplyResult, GitWorkspace, Phase, Workspace, WorkspaceFailure, WorkspaceManager,
    WorkspaceState,
};
