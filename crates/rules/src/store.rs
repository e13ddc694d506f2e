//! In-memory notification rule store with CRUD and validation.
//!
//! Rules are soft-disabled via `active = false` and never hard-deleted
//! from the matching path; the engine only ever sees active rules.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use flotilla_core::FlotillaError;

use crate::schema::NotificationRule;

#[derive(Debug, Default)]
pub struct RuleStore {
    rules: RwLock<HashMap<String, NotificationRule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a rule, assigning an id when none is set.
    pub fn create(&self, mut rule: NotificationRule) -> Result<NotificationRule, FlotillaError> {
        validate(&rule)?;
        if rule.id.is_empty() {
            rule.id = Uuid::new_v4().to_string();
        }
        let mut rules = self.rules.write().expect("rule lock poisoned");
        if rules.contains_key(&rule.id) {
            return Err(FlotillaError::validation(format!(
                "rule '{}' already exists",
                rule.id
            )));
        }
        rules.insert(rule.id.clone(), rule.clone());
        tracing::info!(rule_id = %rule.id, name = %rule.name, "rule created");
        Ok(rule)
    }

    /// Replace an existing rule. `last_triggered_at` is preserved from the
    /// stored rule; updates cannot rewrite trigger history.
    pub fn update(&self, id: &str, mut rule: NotificationRule) -> Result<NotificationRule, FlotillaError> {
        validate(&rule)?;
        let mut rules = self.rules.write().expect("rule lock poisoned");
        let existing = rules
            .get(id)
            .ok_or_else(|| FlotillaError::NotFound(format!("rule '{id}'")))?;
        rule.id = id.to_string();
        rule.last_triggered_at = existing.last_triggered_at;
        rules.insert(id.to_string(), rule.clone());
        tracing::info!(rule_id = %id, "rule updated");
        Ok(rule)
    }

    pub fn get(&self, id: &str) -> Result<NotificationRule, FlotillaError> {
        self.rules
            .read()
            .expect("rule lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| FlotillaError::NotFound(format!("rule '{id}'")))
    }

    /// All rules, active or not, sorted by name for stable listings.
    pub fn list(&self) -> Vec<NotificationRule> {
        let mut rules: Vec<NotificationRule> = self
            .rules
            .read()
            .expect("rule lock poisoned")
            .values()
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules
    }

    /// Active rules listening for this event type.
    pub fn active_for_event(&self, event_type: &str) -> Vec<NotificationRule> {
        self.rules
            .read()
            .expect("rule lock poisoned")
            .values()
            .filter(|r| r.active && r.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Soft enable/disable.
    pub fn set_active(&self, id: &str, active: bool) -> Result<(), FlotillaError> {
        let mut rules = self.rules.write().expect("rule lock poisoned");
        let rule = rules
            .get_mut(id)
            .ok_or_else(|| FlotillaError::NotFound(format!("rule '{id}'")))?;
        rule.active = active;
        Ok(())
    }

    /// Stamp the last successful trigger time.
    pub fn stamp_last_triggered(&self, id: &str, at: DateTime<Utc>) {
        let mut rules = self.rules.write().expect("rule lock poisoned");
        if let Some(rule) = rules.get_mut(id) {
            rule.last_triggered_at = Some(at);
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().expect("rule lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(rule: &NotificationRule) -> Result<(), FlotillaError> {
    if rule.name.trim().is_empty() {
        return Err(FlotillaError::validation("rule name must not be empty"));
    }
    if rule.event_type.trim().is_empty() {
        return Err(FlotillaError::validation("rule eventType must not be empty"));
    }
    if rule.channels.is_empty() {
        return Err(FlotillaError::validation(
            "rule must list at least one channel",
        ));
    }
    Ok(())
}
