//! Notification ledger: the system of record for every attempted send.
//!
//! Each attempt is appended with its dedupe key, channel, and status.
//! Idempotence is enforced by querying prior `sent` entries with the same
//! dedupe key (scoped by channel; for email additionally by calendar day)
//! before sending again.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::traits::Channel;

/// Persisted status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Sent,
    Skipped,
    Failed,
    Read,
}

/// One recorded send attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub yacht_id: Option<String>,
    pub channel: Channel,
    pub event_type: String,
    pub dedupe_key: String,
    pub status: LedgerStatus,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    /// Set only for entries that actually went out.
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Input for appending a ledger entry; id/timestamps are filled in.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub yacht_id: Option<String>,
    pub channel: Channel,
    pub event_type: String,
    pub dedupe_key: String,
    pub status: LedgerStatus,
    pub payload: Value,
    pub error: Option<String>,
}

/// Append-only in-memory ledger with dedupe queries.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attempt; returns the new entry id.
    pub fn append(&self, new: NewLedgerEntry) -> String {
        let now = Utc::now();
        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            yacht_id: new.yacht_id,
            channel: new.channel,
            event_type: new.event_type,
            dedupe_key: new.dedupe_key,
            status: new.status,
            payload: new.payload,
            created_at: now,
            sent_at: matches!(new.status, LedgerStatus::Sent).then_some(now),
            error: new.error,
        };
        let id = entry.id.clone();
        self.entries
            .write()
            .expect("ledger lock poisoned")
            .push(entry);
        id
    }

    /// Whether a `sent` entry with this dedupe key exists on the channel
    /// at or after `since`. This is the idempotence check both the
    /// windowed (in-app) and calendar-day (email) dedupe paths use.
    pub fn has_sent_since(&self, dedupe_key: &str, channel: Channel, since: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .expect("ledger lock poisoned")
            .iter()
            .any(|e| {
                e.dedupe_key == dedupe_key
                    && e.channel == channel
                    && matches!(e.status, LedgerStatus::Sent | LedgerStatus::Read)
                    && e.created_at >= since
            })
    }

    /// Mark an in-app entry as read. Returns `false` for unknown ids or
    /// entries that were never sent.
    pub fn mark_read(&self, entry_id: &str) -> bool {
        let mut entries = self.entries.write().expect("ledger lock poisoned");
        match entries
            .iter_mut()
            .find(|e| e.id == entry_id && e.status == LedgerStatus::Sent)
        {
            Some(entry) => {
                entry.status = LedgerStatus::Read;
                true
            }
            None => false,
        }
    }

    pub fn entries_for_user(&self, user_id: &str) -> Vec<LedgerEntry> {
        let entries = self.entries.read().expect("ledger lock poisoned");
        entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn entries_with_key(&self, dedupe_key: &str) -> Vec<LedgerEntry> {
        let entries = self.entries.read().expect("ledger lock poisoned");
        entries
            .iter()
            .filter(|e| e.dedupe_key == dedupe_key)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("ledger lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
