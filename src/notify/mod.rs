//! Outbound chat notifications
//!
//! Message text lives in [`messages`]; delivery goes through the
//! [`Notifier`] trait so tests can record instead of sending.

pub mod messages;
mod slack;

pub use slack::SlackNotifier;

use crate::error::Result;
use crate::store::UserDirectory;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Chat delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post `text` to a channel or user id
    async fn send_message(&self, channel: &str, text: &str) -> Result<()>;

    /// Find a chat user id by email
    async fn lookup_user_by_email(&self, email: &str) -> Result<Option<String>>;
}

/// Chat id for a GitHub login: stored id first, then lookup by stored email
pub async fn chat_id_for(
    users: &dyn UserDirectory,
    notifier: &dyn Notifier,
    login: &str,
) -> Option<String> {
    let user = match users.find_by_github(login).await {
        Ok(Some(user)) => user,
        Ok(None) => return None,
        Err(e) => {
            warn!(login, error = %e, "user directory lookup failed");
            return None;
        }
    };

    if !user.slack.is_empty() {
        return Some(user.slack);
    }
    if user.email.is_empty() {
        return None;
    }
    match notifier.lookup_user_by_email(&user.email).await {
        Ok(id) => id,
        Err(e) => {
            warn!(login, error = %e, "chat lookup by email failed");
            None
        }
    }
}

/// Channels to reach an author: their own, or every default checker's
pub async fn author_channels(
    users: &dyn UserDirectory,
    notifier: &dyn Notifier,
    author: &str,
    default_checkers: &[&str],
) -> Vec<String> {
    if let Some(id) = chat_id_for(users, notifier, author).await {
        return vec![id];
    }

    debug!(author, "author has no chat mapping, using default checkers");
    let mut channels = Vec::new();
    for checker in default_checkers {
        if let Some(id) = chat_id_for(users, notifier, checker).await {
            if !channels.contains(&id) {
                channels.push(id);
            }
        }
    }
    channels
}

/// Send `text` to every channel, logging failures
pub async fn broadcast(notifier: &dyn Notifier, channels: &[String], text: &str) {
    for channel in channels {
        if let Err(e) = notifier.send_message(channel, text).await {
            warn!(channel, error = %e, "failed to send notification");
        }
    }
}
