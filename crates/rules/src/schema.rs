//! Notification rule schema.
//!
//! A rule declares which event candidates it cares about (event type +
//! scope + conditions + severity gate), who gets notified (recipient
//! policy), how (ordered channel list, templates), and how often the same
//! logical notification may repeat (dedupe window; cadence is an
//! informational hint, not a dispatch gate).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flotilla_core::{EventCandidate, Severity};
use flotilla_notify::Channel;

/// A declarative matcher turning event candidates into notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Emitting module this rule listens to (e.g. `"maintenance"`).
    pub module: String,
    /// Event type tag candidates must carry.
    pub event_type: String,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default)]
    pub conditions: RuleConditions,
    #[serde(default)]
    pub cadence: Cadence,
    /// Ordered, non-empty channel subset.
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub min_severity: Severity,
    pub template: RuleTemplate,
    #[serde(default)]
    pub recipients: RecipientPolicy,
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window_hours: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<DateTime<Utc>>,
}

fn default_dedupe_window() -> i64 {
    24
}

fn default_true() -> bool {
    true
}

// ── Scope ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    #[default]
    Fleet,
    Yacht,
    Entity,
}

/// Breadth at which a rule applies: fleet-wide, one yacht, or one entity
/// (optionally yacht-qualified). Unset entity fields act as wildcards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleScope {
    #[serde(default)]
    pub kind: ScopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yacht_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl RuleScope {
    pub fn fleet() -> Self {
        Self::default()
    }

    pub fn yacht(yacht_id: &str) -> Self {
        Self {
            kind: ScopeKind::Yacht,
            yacht_id: Some(yacht_id.to_string()),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Whether this scope matches the candidate.
    pub fn matches(&self, candidate: &EventCandidate) -> bool {
        match self.kind {
            ScopeKind::Fleet => true,
            ScopeKind::Yacht => match (&self.yacht_id, &candidate.yacht_id) {
                (Some(rule_yacht), Some(candidate_yacht)) => rule_yacht == candidate_yacht,
                _ => false,
            },
            ScopeKind::Entity => {
                let yacht_ok = match &self.yacht_id {
                    Some(rule_yacht) => candidate.yacht_id.as_deref() == Some(rule_yacht),
                    None => true,
                };
                let type_ok = match &self.entity_type {
                    Some(rule_type) => candidate.entity_type.as_deref() == Some(rule_type),
                    None => true,
                };
                let id_ok = match &self.entity_id {
                    Some(rule_id) => candidate.entity_id.as_deref() == Some(rule_id),
                    None => true,
                };
                yacht_ok && type_ok && id_ok
            }
        }
    }
}

// ── Conditions ──────────────────────────────────────────────────────

/// Condition operators. `Unknown` catches forward-compat operator names
/// and always evaluates false (fail closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    #[serde(other)]
    Unknown,
}

/// One clause of an `all` condition list: a dot path into the candidate
/// payload, an operator, and a comparison value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionClause {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
}

/// Rule conditions: either an `all` clause list (AND semantics) or a flat
/// key=value equality map. An empty map always matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleConditions {
    All { all: Vec<ConditionClause> },
    Flat(Map<String, Value>),
}

impl Default for RuleConditions {
    fn default() -> Self {
        RuleConditions::Flat(Map::new())
    }
}

// ── Cadence ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceMode {
    #[default]
    Immediate,
    EveryHours,
    Daily,
    Weekly,
}

/// Informational replay-frequency hint; not a hard gate on dispatch
/// timing (the dedupe window is the actual throttle).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cadence {
    #[serde(default)]
    pub mode: CadenceMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
}

// ── Recipients ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientMode {
    #[default]
    Roles,
    Users,
    Assignee,
    RoleThenEscalate,
}

/// How a matched rule's recipients are computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientPolicy {
    #[serde(default)]
    pub mode: RecipientMode,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub escalate_roles: Vec<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

// ── Template ────────────────────────────────────────────────────────

/// Title and message with `{{var}}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTemplate {
    pub title: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(yacht: Option<&str>, entity: Option<(&str, &str)>) -> EventCandidate {
        let mut c = EventCandidate::new("maintenance.task_overdue", "maintenance", Severity::Warn);
        if let Some(y) = yacht {
            c = c.with_yacht(y);
        }
        if let Some((t, id)) = entity {
            c = c.with_entity(t, id);
        }
        c
    }

    #[test]
    fn fleet_scope_matches_everything() {
        let scope = RuleScope::fleet();
        assert!(scope.matches(&candidate(None, None)));
        assert!(scope.matches(&candidate(Some("y1"), Some(("task", "t1")))));
    }

    #[test]
    fn yacht_scope_requires_matching_yacht() {
        let scope = RuleScope::yacht("y1");
        assert!(scope.matches(&candidate(Some("y1"), None)));
        assert!(!scope.matches(&candidate(Some("y2"), None)));
        assert!(!scope.matches(&candidate(None, None)));
    }

    #[test]
    fn entity_scope_unset_fields_are_wildcards() {
        let scope = RuleScope {
            kind: ScopeKind::Entity,
            yacht_id: None,
            entity_type: Some("task".to_string()),
            entity_id: None,
        };
        assert!(scope.matches(&candidate(Some("y1"), Some(("task", "t1")))));
        assert!(scope.matches(&candidate(None, Some(("task", "t9")))));
        assert!(!scope.matches(&candidate(Some("y1"), Some(("part", "p1")))));
    }

    #[test]
    fn entity_scope_yacht_qualified() {
        let scope = RuleScope {
            kind: ScopeKind::Entity,
            yacht_id: Some("y1".to_string()),
            entity_type: Some("task".to_string()),
            entity_id: Some("t1".to_string()),
        };
        assert!(scope.matches(&candidate(Some("y1"), Some(("task", "t1")))));
        assert!(!scope.matches(&candidate(Some("y2"), Some(("task", "t1")))));
        assert!(!scope.matches(&candidate(Some("y1"), Some(("task", "t2")))));
    }

    #[test]
    fn conditions_deserialize_both_shapes() {
        let all: RuleConditions = serde_json::from_str(
            r#"{"all": [{"field": "priority", "op": "eq", "value": "Critical"}]}"#,
        )
        .unwrap();
        match all {
            RuleConditions::All { all } => {
                assert_eq!(all.len(), 1);
                assert_eq!(all[0].op, ConditionOp::Eq);
            }
            _ => panic!("expected all-clause shape"),
        }

        let flat: RuleConditions = serde_json::from_str(r#"{"status": "open"}"#).unwrap();
        match flat {
            RuleConditions::Flat(map) => assert_eq!(map.len(), 1),
            _ => panic!("expected flat shape"),
        }
    }

    #[test]
    fn unknown_op_deserializes_to_unknown() {
        let clause: ConditionClause =
            serde_json::from_str(r#"{"field": "x", "op": "regex_match", "value": 1}"#).unwrap();
        assert_eq!(clause.op, ConditionOp::Unknown);
    }

    #[test]
    fn rule_defaults() {
        let rule: NotificationRule = serde_json::from_str(
            r#"{
                "name": "Low stock",
                "module": "inventory",
                "eventType": "inventory.low_stock",
                "channels": ["in_app", "email"],
                "template": {"title": "Low stock", "message": "{{itemName}} is low"}
            }"#,
        )
        .unwrap();
        assert!(rule.active);
        assert_eq!(rule.dedupe_window_hours, 24);
        assert_eq!(rule.min_severity, Severity::Info);
        assert_eq!(rule.scope.kind, ScopeKind::Fleet);
        assert_eq!(rule.recipients.mode, RecipientMode::Roles);
    }
}
