//! Event candidates: the ephemeral unit offered to the rule engine.
//!
//! Business modules (maintenance, inventory, HRM, purchase orders, logbook)
//! and the job scheduler raise candidates; the rule engine decides whether
//! any declarative rule turns them into notifications. Candidates are not
//! persisted as their own table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::Payload;
use crate::severity::Severity;

/// A business event offered to the rule engine for possible notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCandidate {
    /// Event type tag that rules match on (e.g. `"maintenance.task_overdue"`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Emitting module tag (e.g. `"maintenance"`, `"inventory"`, `"jobs"`).
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yacht_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub payload: Payload,
    /// User currently assigned to the underlying entity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl EventCandidate {
    pub fn new(event_type: &str, module: &str, severity: Severity) -> Self {
        Self {
            event_type: event_type.to_string(),
            module: module.to_string(),
            yacht_id: None,
            entity_type: None,
            entity_id: None,
            severity,
            payload: Payload::new(),
            assignee_user_id: None,
            occurred_at: Some(Utc::now()),
        }
    }

    pub fn with_yacht(mut self, yacht_id: &str) -> Self {
        self.yacht_id = Some(yacht_id.to_string());
        self
    }

    pub fn with_entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_assignee(mut self, user_id: &str) -> Self {
        self.assignee_user_id = Some(user_id.to_string());
        self
    }

    /// Occurrence timestamp, defaulting to "now" for candidates that
    /// omitted it.
    pub fn occurred_at_or_now(&self) -> DateTime<Utc> {
        self.occurred_at.unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_uses_type_tag() {
        let candidate = EventCandidate::new("inventory.low_stock", "inventory", Severity::Warn)
            .with_yacht("y1")
            .with_entity("inventory_item", "item-9");

        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["type"], "inventory.low_stock");
        assert_eq!(json["yachtId"], "y1");
        assert_eq!(json["entityType"], "inventory_item");
        assert_eq!(json["severity"], "warn");
    }

    #[test]
    fn deserializes_minimal_contract() {
        let candidate: EventCandidate = serde_json::from_str(
            r#"{"type": "hrm.cert_expiring", "module": "hrm", "severity": "info", "payload": {"daysLeft": 12}}"#,
        )
        .unwrap();
        assert_eq!(candidate.event_type, "hrm.cert_expiring");
        assert!(candidate.yacht_id.is_none());
        assert_eq!(candidate.payload.read_optional_f64("daysLeft"), Some(12.0));
        assert!(candidate.occurred_at.is_none());
    }
}
