//! Notifier that records instead of sending

#![allow(dead_code)]

use async_trait::async_trait;
use backport_bot::error::Result;
use backport_bot::notify::Notifier;
use std::collections::HashMap;
use std::sync::Mutex;

/// A message "sent" to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: String,
    pub text: String,
}

/// Records every message and answers email lookups from a fixed table
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    emails: Mutex<HashMap<String, String>>,
}

impl RecordingNotifier {
    /// Create an empty notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an email to a chat id
    pub fn add_email(&self, email: &str, id: &str) {
        self.emails
            .lock()
            .unwrap()
            .insert(email.to_string(), id.to_string());
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent to one channel
    pub fn sent_to(&self, channel: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.text)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, channel: &str, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            channel: channel.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn lookup_user_by_email(&self, email: &str) -> Result<Option<String>> {
        Ok(self.emails.lock().unwrap().get(email).cloned())
    }
}
