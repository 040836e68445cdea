//! Error types for backport-bot

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the bot
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file missing, unparsable, or invalid
    #[error("config error: {0}")]
    Config(String),

    /// GitHub API call failed
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// GitHub rejected a pull request as a duplicate ("Validation Failed")
    #[error("pull request already exists: {0}")]
    SubmissionDuplicate(String),

    /// Label does not match the cherry-pick pattern
    #[error("label '{0}' does not match the cherry-pick pattern")]
    PatternMismatch(String),

    /// Store read or write failed
    #[error("store error during {operation}: {message}")]
    Store {
        /// Operation that failed (e.g. "claim cherry pick")
        operation: &'static str,
        /// Underlying message
        message: String,
    },

    /// Workspace (git) operation failed
    #[error("workspace error: {0}")]
    Workspace(String),

    /// Sending a chat notification failed
    #[error("notification error: {0}")]
    Notification(String),

    /// Webhook payload could not be understood
    #[error("webhook error: {0}")]
    Webhook(String),

    /// A settle wait was aborted by shutdown
    #[error("operation cancelled by shutdown")]
    Cancelled,

    /// Invalid regular expression in configuration
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a store error tagged with the operation name
    pub fn store(operation: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Store {
            operation,
            message: message.to_string(),
        }
    }
}

impl From<octocrab::Error> for Error {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } if source.message == "Validation Failed" => {
                Self::SubmissionDuplicate(source.message.clone())
            }
            octocrab::Error::GitHub { source, .. } => Self::GitHubApi(source.message.clone()),
            _ => Self::GitHubApi(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::store("sqlite", err)
    }
}
