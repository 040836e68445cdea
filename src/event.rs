//! Webhook events
//!
//! Only pull request events drive the bot. Everything else parses to
//! [`BotEvent::Ignored`] so the server can acknowledge it.

use crate::error::{Error, Result};
use crate::types::RepoId;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Action field of a `pull_request` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestAction {
    /// PR opened
    Opened,
    /// PR reopened
    Reopened,
    /// Label added
    Labeled,
    /// Label removed
    Unlabeled,
    /// PR closed, possibly merged
    Closed,
    /// New commits pushed to the head
    Synchronize,
    /// Any other action
    Other(String),
}

impl PullRequestAction {
    fn parse(action: &str) -> Self {
        match action {
            "opened" => Self::Opened,
            "reopened" => Self::Reopened,
            "labeled" => Self::Labeled,
            "unlabeled" => Self::Unlabeled,
            "closed" => Self::Closed,
            "synchronize" => Self::Synchronize,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A parsed `pull_request` event
#[derive(Debug, Clone)]
pub struct PullRequestEvent {
    /// Repository the event belongs to
    pub repo: RepoId,
    /// What happened
    pub action: PullRequestAction,
    /// PR number
    pub number: i64,
    /// PR title at event time
    pub title: String,
    /// Whether the PR is merged
    pub merged: bool,
    /// Labels on the PR at event time
    pub labels: Vec<String>,
    /// Label added or removed, for `labeled`/`unlabeled`
    pub label: Option<String>,
    /// When the PR was opened
    pub created_at: Option<DateTime<Utc>>,
}

/// Events the bot reacts to
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// A `pull_request` webhook
    PullRequest(PullRequestEvent),
    /// Any other event kind
    Ignored {
        /// Value of the `X-GitHub-Event` header
        kind: String,
    },
}

#[derive(Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

#[derive(Deserialize)]
struct LabelPayload {
    name: String,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    #[serde(default)]
    title: String,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    labels: Vec<LabelPayload>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct PullRequestEventPayload {
    action: String,
    number: i64,
    pull_request: PullRequestPayload,
    #[serde(default)]
    label: Option<LabelPayload>,
    repository: RepositoryPayload,
}

#[derive(Deserialize)]
struct RepositoryOnly {
    repository: Option<RepositoryPayload>,
}

/// Read `repository.full_name` from any webhook body
pub fn repository_of(body: &[u8]) -> Result<RepoId> {
    let payload: RepositoryOnly = serde_json::from_slice(body)
        .map_err(|e| Error::Webhook(format!("invalid payload: {e}")))?;
    let full_name = payload
        .repository
        .map(|r| r.full_name)
        .ok_or_else(|| Error::Webhook("payload has no repository".to_string()))?;
    RepoId::parse(&full_name)
        .ok_or_else(|| Error::Webhook(format!("invalid repository name: {full_name}")))
}

/// Parse a webhook body given its `X-GitHub-Event` kind
pub fn parse_event(kind: &str, body: &[u8]) -> Result<BotEvent> {
    if kind != "pull_request" {
        return Ok(BotEvent::Ignored {
            kind: kind.to_string(),
        });
    }

    let payload: PullRequestEventPayload = serde_json::from_slice(body)
        .map_err(|e| Error::Webhook(format!("invalid pull_request payload: {e}")))?;
    let repo = RepoId::parse(&payload.repository.full_name).ok_or_else(|| {
        Error::Webhook(format!(
            "invalid repository name: {}",
            payload.repository.full_name
        ))
    })?;

    Ok(BotEvent::PullRequest(PullRequestEvent {
        repo,
        action: PullRequestAction::parse(&payload.action),
        number: payload.number,
        title: payload.pull_request.title,
        merged: payload.pull_request.merged,
        labels: payload
            .pull_request
            .labels
            .into_iter()
            .map(|l| l.name)
            .collect(),
        label: payload.label.map(|l| l.name),
        created_at: payload.pull_request.created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELED: &str = r#"{
        "action": "labeled",
        "number": 120,
        "pull_request": {
            "title": "fix panic",
            "merged": true,
            "labels": [{"name": "needs-cherry-pick-4.0"}, {"name": "type/bug"}],
            "created_at": "2020-03-02T08:15:00Z"
        },
        "label": {"name": "needs-cherry-pick-4.0"},
        "repository": {"full_name": "pingcap/tidb"}
    }"#;

    #[test]
    fn test_parse_labeled() {
        let BotEvent::PullRequest(event) = parse_event("pull_request", LABELED.as_bytes()).unwrap()
        else {
            panic!("expected pull request event");
        };
        assert_eq!(event.action, PullRequestAction::Labeled);
        assert_eq!(event.number, 120);
        assert!(event.merged);
        assert_eq!(event.label.as_deref(), Some("needs-cherry-pick-4.0"));
        assert_eq!(event.labels.len(), 2);
        assert_eq!(event.repo.key(), "pingcap-tidb");
        assert_eq!(
            event.created_at.map(|t| t.to_rfc3339()).as_deref(),
            Some("2020-03-02T08:15:00+00:00")
        );
    }

    #[test]
    fn test_other_kinds_ignored() {
        let event = parse_event("issue_comment", b"{}").unwrap();
        assert!(matches!(event, BotEvent::Ignored { kind } if kind == "issue_comment"));
    }

    #[test]
    fn test_unknown_action_kept() {
        let body = LABELED.replace("\"labeled\"", "\"edited\"");
        let BotEvent::PullRequest(event) = parse_event("pull_request", body.as_bytes()).unwrap()
        else {
            panic!("expected pull request event");
        };
        assert_eq!(event.action, PullRequestAction::Other("edited".into()));
    }

    #[test]
    fn test_repository_of() {
        let repo = repository_of(LABELED.as_bytes()).unwrap();
        assert_eq!(repo.owner, "pingcap");
        assert!(repository_of(b"{}").is_err());
        assert!(repository_of(b"not json").is_err());
    }
}
