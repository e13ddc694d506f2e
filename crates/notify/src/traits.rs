//! Channel vocabulary, transport traits, and shared error types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use flotilla_core::{Payload, Severity};

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Delivery channels, in the order rules may list them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "in_app",
            Channel::Email => "email",
            Channel::Push => "push",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one channel send attempt.
///
/// Dedupe skips are normal outcomes, not errors, and stay distinguishable
/// from failures in both return values and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    Skipped,
    SkippedDailyDedupe,
    Failed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Skipped => "skipped",
            SendStatus::SkippedDailyDedupe => "skipped_daily_dedupe",
            SendStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered notification handed to a channel transport.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    pub user_id: String,
    pub yacht_id: Option<String>,
    pub event_type: String,
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub payload: Payload,
}

/// Email provider send contract.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &ChannelMessage) -> Result<(), NotifyError>;
}

/// Push provider send contract. No implementation ships yet; the dispatcher
/// keeps the write path identical so a future transport slots in without
/// changing callers.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, message: &ChannelMessage) -> Result<(), NotifyError>;
}
