//! Alert store seam.
//!
//! Alerts are owned by an external module; the rule engine only needs
//! upsert/resolve keyed by a dedupe string. The in-memory implementation
//! exists for wiring the standalone worker and for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::severity::Severity;

/// One alert upsert, keyed by `dedupe_key`. Upserting with an existing key
/// refreshes the alert instead of opening a second one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertUpsert {
    pub dedupe_key: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub yacht_id: Option<String>,
    pub assigned_user_id: Option<String>,
    pub raised_at: DateTime<Utc>,
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn upsert(&self, alert: AlertUpsert);
    async fn resolve(&self, dedupe_key: &str);
}

/// In-memory alert store: a map of open alerts by dedupe key.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    open: RwLock<HashMap<String, AlertUpsert>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_alerts(&self) -> Vec<AlertUpsert> {
        self.open
            .read()
            .expect("alert lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.read().expect("alert lock poisoned").len()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn upsert(&self, alert: AlertUpsert) {
        let mut open = self.open.write().expect("alert lock poisoned");
        tracing::debug!(dedupe_key = %alert.dedupe_key, severity = %alert.severity, "alert upsert");
        open.insert(alert.dedupe_key.clone(), alert);
    }

    async fn resolve(&self, dedupe_key: &str) {
        let mut open = self.open.write().expect("alert lock poisoned");
        if open.remove(dedupe_key).is_some() {
            tracing::debug!(dedupe_key, "alert resolved");
        }
    }
}
