//! Slack Web API notifier

use super::Notifier;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

const SLACK_API: &str = "https://slack.com/api";

/// Notifier posting through `chat.postMessage`
pub struct SlackNotifier {
    client: Client,
    token: String,
    api_base: String,
    mute: bool,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<SlackUserInfo>,
}

#[derive(Deserialize)]
struct SlackUserInfo {
    id: String,
}

impl SlackNotifier {
    /// Create a notifier; a muted notifier only logs
    pub fn new(token: &str, mute: bool) -> Result<Self> {
        Self::with_api_base(token, mute, SLACK_API)
    }

    /// Create a notifier against a custom API base URL
    pub fn with_api_base(token: &str, mute: bool, api_base: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent("backport-bot")
            .build()
            .map_err(|e| Error::Notification(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            token: token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            mute,
        })
    }

    async fn parse(response: reqwest::Response, method: &str) -> Result<SlackResponse> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!("{method}: HTTP {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Notification(format!("{method}: invalid response: {e}")))
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send_message(&self, channel: &str, text: &str) -> Result<()> {
        if self.mute {
            info!(channel, text, "slack muted, not sending");
            return Ok(());
        }

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel": channel, "text": text }))
            .send()
            .await
            .map_err(|e| Error::Notification(format!("chat.postMessage: {e}")))?;

        let body = Self::parse(response, "chat.postMessage").await?;
        if !body.ok {
            return Err(Error::Notification(format!(
                "chat.postMessage: {}",
                body.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        debug!(channel, "sent slack message");
        Ok(())
    }

    async fn lookup_user_by_email(&self, email: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/users.lookupByEmail", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| Error::Notification(format!("users.lookupByEmail: {e}")))?;

        let body = Self::parse(response, "users.lookupByEmail").await?;
        match (body.ok, body.error.as_deref()) {
            (true, _) => Ok(body.user.map(|u| u.id)),
            (false, Some("users_not_found")) => Ok(None),
            (false, error) => Err(Error::Notification(format!(
                "users.lookupByEmail: {}",
                error.unwrap_or("unknown error")
            ))),
        }
    }
}
