//! Rule evaluation and dispatch.
//!
//! The engine takes batches of event candidates produced by the domain
//! modules, matches them against active rules (scope, then conditions, then
//! severity), resolves recipients through the membership seam, renders the
//! rule template and hands deliveries to the dispatcher. Warning-level and
//! above matches on a yacht additionally raise an alert.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use flotilla_core::membership::roles;
use flotilla_core::{AlertStore, AlertUpsert, EventCandidate, MembershipResolver, Severity};
use flotilla_notify::{Delivery, Dispatcher, TemplateRenderer};

use crate::conditions::matches_conditions;
use crate::schema::{NotificationRule, RecipientMode};
use crate::store::RuleStore;

/// Outcome of one `dispatch_candidates` batch. `processed` counts
/// scope-matched (candidate, rule) pairs; `dispatched` counts successful
/// channel sends.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DispatchSummary {
    pub processed: usize,
    pub dispatched: usize,
}

/// Dry-run report for `test_rule`: how far a candidate gets through a rule,
/// with the rendered output it would have produced. Never touches the
/// ledger, the rule's trigger timestamp, or the alert store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTestReport {
    pub rule_id: String,
    pub scope_matched: bool,
    pub conditions_matched: bool,
    pub severity_passed: bool,
    pub recipients: Vec<String>,
    pub rendered_title: String,
    pub rendered_message: String,
    pub would_dispatch: bool,
}

pub struct RuleEngine {
    store: Arc<RuleStore>,
    membership: Arc<dyn MembershipResolver>,
    dispatcher: Arc<Dispatcher>,
    alerts: Arc<dyn AlertStore>,
    templates: TemplateRenderer,
}

impl RuleEngine {
    pub fn new(
        store: Arc<RuleStore>,
        membership: Arc<dyn MembershipResolver>,
        dispatcher: Arc<Dispatcher>,
        alerts: Arc<dyn AlertStore>,
    ) -> Self {
        Self {
            store,
            membership,
            dispatcher,
            alerts,
            templates: TemplateRenderer::new(),
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Run every candidate through the active rules for its event type.
    /// Failures inside one (candidate, rule) pair are logged and never
    /// abort the batch.
    pub async fn dispatch_candidates(&self, candidates: &[EventCandidate]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for candidate in candidates {
            for rule in self.store.active_for_event(&candidate.event_type) {
                if !rule.scope.matches(candidate) {
                    continue;
                }
                summary.processed += 1;
                summary.dispatched += self.dispatch_one(&rule, candidate).await;
            }
        }
        if summary.processed > 0 {
            info!(
                candidates = candidates.len(),
                processed = summary.processed,
                dispatched = summary.dispatched,
                "rule dispatch batch"
            );
        }
        summary
    }

    async fn dispatch_one(&self, rule: &NotificationRule, candidate: &EventCandidate) -> usize {
        if !matches_conditions(&rule.conditions, &candidate.payload) {
            debug!(rule_id = %rule.id, event_type = %candidate.event_type, "conditions not met");
            return 0;
        }
        if candidate.severity < rule.min_severity {
            debug!(
                rule_id = %rule.id,
                candidate_severity = %candidate.severity,
                min_severity = %rule.min_severity,
                "below severity floor"
            );
            return 0;
        }

        let recipients = self.resolve_recipients(rule, candidate).await;
        if recipients.is_empty() {
            warn!(rule_id = %rule.id, event_type = %candidate.event_type, "no recipients resolved");
            return 0;
        }

        let vars = template_vars(candidate);
        let title = self.templates.render_or_raw(&rule.template.title, &vars);
        let message = self.templates.render_or_raw(&rule.template.message, &vars);
        let base_key = rule_dedupe_key(rule, candidate);

        let delivery = Delivery {
            base_dedupe_key: base_key.clone(),
            yacht_id: candidate.yacht_id.clone(),
            event_type: candidate.event_type.clone(),
            severity: candidate.severity,
            title: title.clone(),
            body: message.clone(),
            payload: candidate.payload.clone(),
            dedupe_window_hours: Some(rule.dedupe_window_hours),
        };
        let delivered = self
            .dispatcher
            .fan_out(&recipients, &rule.channels, &delivery)
            .await;

        if delivered > 0 {
            self.store.stamp_last_triggered(&rule.id, Utc::now());
        }

        if candidate.severity >= Severity::Warn && candidate.yacht_id.is_some() {
            self.alerts
                .upsert(AlertUpsert {
                    dedupe_key: format!("rule-alert:{}", base_key),
                    title,
                    message,
                    severity: candidate.severity,
                    yacht_id: candidate.yacht_id.clone(),
                    assigned_user_id: recipients.first().cloned(),
                    raised_at: candidate.occurred_at_or_now(),
                })
                .await;
        }

        delivered
    }

    /// Resolve the recipient user ids for a rule/candidate pair. Dedupes
    /// while preserving resolution order; inactive users are dropped.
    pub async fn resolve_recipients(
        &self,
        rule: &NotificationRule,
        candidate: &EventCandidate,
    ) -> Vec<String> {
        let yacht = candidate.yacht_id.as_deref();
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |user_id: String, out: &mut Vec<String>| {
            if seen.insert(user_id.clone()) {
                out.push(user_id);
            }
        };

        match rule.recipients.mode {
            RecipientMode::Users => {
                for user_id in &rule.recipients.user_ids {
                    if self.membership.is_active(user_id).await {
                        push(user_id.clone(), &mut out);
                    }
                }
            }
            RecipientMode::Assignee => {
                if let Some(user_id) = self.active_assignee(candidate).await {
                    push(user_id, &mut out);
                } else {
                    let fallback = [
                        roles::CAPTAIN.to_string(),
                        roles::MANAGEMENT.to_string(),
                        roles::OFFICE.to_string(),
                    ];
                    for user_id in self.membership.resolve_users_by_roles(&fallback, yacht).await {
                        push(user_id, &mut out);
                    }
                }
            }
            RecipientMode::RoleThenEscalate => {
                if let Some(user_id) = self.active_assignee(candidate).await {
                    push(user_id, &mut out);
                }
                let mut role_set = rule.recipients.roles.clone();
                role_set.extend(rule.recipients.escalate_roles.iter().cloned());
                for user_id in self.membership.resolve_users_by_roles(&role_set, yacht).await {
                    push(user_id, &mut out);
                }
            }
            RecipientMode::Roles => {
                for user_id in self
                    .membership
                    .resolve_users_by_roles(&rule.recipients.roles, yacht)
                    .await
                {
                    push(user_id, &mut out);
                }
            }
        }
        out
    }

    async fn active_assignee(&self, candidate: &EventCandidate) -> Option<String> {
        let user_id = candidate.assignee_user_id.as_deref()?;
        if self.membership.is_active(user_id).await {
            Some(user_id.to_string())
        } else {
            None
        }
    }

    /// Dry-run a stored rule against a candidate without side effects.
    pub async fn test_rule(
        &self,
        rule_id: &str,
        candidate: &EventCandidate,
    ) -> Result<RuleTestReport, flotilla_core::FlotillaError> {
        let rule = self.store.get(rule_id)?;
        let scope_matched = rule.scope.matches(candidate);
        let conditions_matched = matches_conditions(&rule.conditions, &candidate.payload);
        let severity_passed = candidate.severity >= rule.min_severity;
        let recipients = self.resolve_recipients(&rule, candidate).await;
        let vars = template_vars(candidate);
        let rendered_title = self.templates.render_or_raw(&rule.template.title, &vars);
        let rendered_message = self.templates.render_or_raw(&rule.template.message, &vars);
        let would_dispatch =
            scope_matched && conditions_matched && severity_passed && !recipients.is_empty();
        Ok(RuleTestReport {
            rule_id: rule.id,
            scope_matched,
            conditions_matched,
            severity_passed,
            recipients,
            rendered_title,
            rendered_message,
            would_dispatch,
        })
    }
}

/// Template context: payload fields first, then candidate metadata. Explicit
/// metadata keys win over payload keys of the same name.
fn template_vars(candidate: &EventCandidate) -> Map<String, Value> {
    let mut vars = candidate.payload.as_map().clone();
    if let Some(yacht_id) = &candidate.yacht_id {
        vars.insert("yachtId".to_string(), Value::String(yacht_id.clone()));
    }
    if let Some(entity_type) = &candidate.entity_type {
        vars.insert("entityType".to_string(), Value::String(entity_type.clone()));
    }
    if let Some(entity_id) = &candidate.entity_id {
        vars.insert("entityId".to_string(), Value::String(entity_id.clone()));
    }
    vars.insert(
        "severity".to_string(),
        Value::String(candidate.severity.to_string()),
    );
    vars.insert(
        "occurredAt".to_string(),
        Value::String(candidate.occurred_at_or_now().to_rfc3339()),
    );
    vars
}

/// Base dedupe key for a rule firing on a candidate. The scope segment is
/// the most specific id available; the bucket segment lets payloads split
/// one rule into parallel dedupe streams (e.g. per item).
fn rule_dedupe_key(rule: &NotificationRule, candidate: &EventCandidate) -> String {
    let scope = candidate
        .entity_id
        .as_deref()
        .or(candidate.yacht_id.as_deref())
        .unwrap_or("fleet");
    let bucket = candidate
        .payload
        .read_optional_str("bucket")
        .unwrap_or("default");
    format!(
        "rule:{}:event:{}:scope:{}:bucket:{}",
        rule.id, candidate.event_type, scope, bucket
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_core::membership::{MembershipRecord, StaticMembership};
    use flotilla_core::{InMemoryAlertStore, Payload};
    use flotilla_notify::{Channel, Ledger, LedgerStatus};

    use crate::schema::{RecipientPolicy, RuleScope, RuleTemplate};

    fn record(user_id: &str, role: &str, yacht_id: Option<&str>) -> MembershipRecord {
        MembershipRecord {
            user_id: user_id.to_string(),
            role: role.to_string(),
            yacht_id: yacht_id.map(str::to_string),
            active: Some(true),
            email: None,
        }
    }

    fn membership() -> Arc<StaticMembership> {
        Arc::new(StaticMembership::new(vec![
            record("u-captain", roles::CAPTAIN, Some("y1")),
            record("u-mgmt", roles::MANAGEMENT, None),
            record("u-mgmt", roles::MANAGEMENT, Some("y1")),
            MembershipRecord {
                user_id: "u-gone".to_string(),
                role: roles::OFFICE.to_string(),
                yacht_id: Some("y1".to_string()),
                active: Some(false),
                email: None,
            },
        ]))
    }

    fn rule(event_type: &str) -> NotificationRule {
        NotificationRule {
            id: "r1".to_string(),
            name: "Test rule".to_string(),
            module: "maintenance".to_string(),
            event_type: event_type.to_string(),
            scope: RuleScope::fleet(),
            conditions: Default::default(),
            cadence: Default::default(),
            channels: vec![Channel::InApp],
            min_severity: Severity::Info,
            template: RuleTemplate {
                title: "{{taskName}} needs attention".to_string(),
                message: "Severity {{severity}} on {{yachtId}}".to_string(),
            },
            recipients: RecipientPolicy {
                mode: RecipientMode::Roles,
                roles: vec![roles::CAPTAIN.to_string()],
                escalate_roles: Vec::new(),
                user_ids: Vec::new(),
            },
            dedupe_window_hours: 24,
            active: true,
            last_triggered_at: None,
        }
    }

    fn candidate(event_type: &str, severity: Severity) -> EventCandidate {
        EventCandidate::new(event_type, "maintenance", severity)
            .with_yacht("y1")
            .with_entity("task", "t1")
            .with_payload(Payload::new().with("taskName", "Oil change"))
    }

    struct Harness {
        engine: RuleEngine,
        dispatcher: Arc<Dispatcher>,
        alerts: Arc<InMemoryAlertStore>,
    }

    fn harness(rules: Vec<NotificationRule>) -> Harness {
        let store = Arc::new(RuleStore::new());
        for r in rules {
            store.create(r).unwrap();
        }
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(Ledger::new()), None, None));
        let alerts = Arc::new(InMemoryAlertStore::new());
        let engine = RuleEngine::new(
            store,
            membership(),
            dispatcher.clone(),
            alerts.clone() as Arc<dyn AlertStore>,
        );
        Harness {
            engine,
            dispatcher,
            alerts,
        }
    }

    #[tokio::test]
    async fn matching_candidate_dispatches_and_stamps_rule() {
        let h = harness(vec![rule("maintenance.task_due")]);
        let summary = h
            .engine
            .dispatch_candidates(&[candidate("maintenance.task_due", Severity::Info)])
            .await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.dispatched, 1);

        let rows = h.dispatcher.ledger().entries_for_user("u-captain");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, LedgerStatus::Sent);
        assert_eq!(
            rows[0].dedupe_key,
            "rule:r1:event:maintenance.task_due:scope:t1:bucket:default:user:u-captain"
        );

        assert!(h.engine.store().get("r1").unwrap().last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_candidates_dedupe_within_window() {
        let h = harness(vec![rule("maintenance.task_due")]);
        let c = candidate("maintenance.task_due", Severity::Info);
        let summary = h.engine.dispatch_candidates(&[c.clone(), c]).await;
        // Both pairs processed, only the first send lands.
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(h.dispatcher.ledger().len(), 1);
    }

    #[tokio::test]
    async fn candidates_below_severity_floor_are_dropped() {
        let mut r = rule("maintenance.task_due");
        r.min_severity = Severity::Critical;
        let h = harness(vec![r]);
        let summary = h
            .engine
            .dispatch_candidates(&[candidate("maintenance.task_due", Severity::Warn)])
            .await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.dispatched, 0);
        assert!(h.dispatcher.ledger().is_empty());
    }

    #[tokio::test]
    async fn scope_mismatch_is_not_processed() {
        let mut r = rule("maintenance.task_due");
        r.scope = RuleScope::yacht("y-other");
        let h = harness(vec![r]);
        let summary = h
            .engine
            .dispatch_candidates(&[candidate("maintenance.task_due", Severity::Info)])
            .await;
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn warn_on_yacht_raises_alert_with_rendered_text() {
        let h = harness(vec![rule("maintenance.task_due")]);
        h.engine
            .dispatch_candidates(&[candidate("maintenance.task_due", Severity::Warn)])
            .await;

        let alerts = h.alerts.open_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Oil change needs attention");
        assert_eq!(alerts[0].message, "Severity warn on y1");
        assert_eq!(alerts[0].assigned_user_id.as_deref(), Some("u-captain"));
        assert!(alerts[0]
            .dedupe_key
            .starts_with("rule-alert:rule:r1:event:maintenance.task_due"));
    }

    #[tokio::test]
    async fn info_matches_do_not_raise_alerts() {
        let h = harness(vec![rule("maintenance.task_due")]);
        h.engine
            .dispatch_candidates(&[candidate("maintenance.task_due", Severity::Info)])
            .await;
        assert_eq!(h.alerts.open_count(), 0);
    }

    #[tokio::test]
    async fn assignee_mode_prefers_active_assignee() {
        let mut r = rule("maintenance.task_due");
        r.recipients.mode = RecipientMode::Assignee;
        let h = harness(vec![r]);

        let c = candidate("maintenance.task_due", Severity::Info).with_assignee("u-mgmt");
        let report = h.engine.test_rule("r1", &c).await.unwrap();
        assert_eq!(report.recipients, vec!["u-mgmt".to_string()]);

        // Inactive assignee falls back to roles on the yacht.
        let c = candidate("maintenance.task_due", Severity::Info).with_assignee("u-gone");
        let report = h.engine.test_rule("r1", &c).await.unwrap();
        assert!(report.recipients.contains(&"u-captain".to_string()));
        assert!(!report.recipients.contains(&"u-gone".to_string()));
    }

    #[tokio::test]
    async fn users_mode_filters_inactive() {
        let mut r = rule("maintenance.task_due");
        r.recipients.mode = RecipientMode::Users;
        r.recipients.user_ids = vec!["u-captain".to_string(), "u-gone".to_string()];
        let h = harness(vec![r]);
        let report = h
            .engine
            .test_rule("r1", &candidate("maintenance.task_due", Severity::Info))
            .await
            .unwrap();
        assert_eq!(report.recipients, vec!["u-captain".to_string()]);
    }

    #[tokio::test]
    async fn test_rule_has_no_side_effects() {
        let h = harness(vec![rule("maintenance.task_due")]);
        let report = h
            .engine
            .test_rule("r1", &candidate("maintenance.task_due", Severity::Warn))
            .await
            .unwrap();
        assert!(report.would_dispatch);
        assert!(h.dispatcher.ledger().is_empty());
        assert_eq!(h.alerts.open_count(), 0);
        assert!(h.engine.store().get("r1").unwrap().last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn inactive_rules_are_ignored() {
        let h = harness(vec![rule("maintenance.task_due")]);
        h.engine.store().set_active("r1", false).unwrap();
        let summary = h
            .engine
            .dispatch_candidates(&[candidate("maintenance.task_due", Severity::Info)])
            .await;
        assert_eq!(summary.processed, 0);
    }
}
