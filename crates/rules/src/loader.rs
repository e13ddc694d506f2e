//! YAML rule-file loading.
//!
//! Rules can be provisioned from a directory of `.yml`/`.yaml` files at
//! startup (one rule per file). Invalid files are logged and skipped so a
//! single bad rule never takes the worker down.

use std::path::Path;

use tracing::{info, warn};

use crate::schema::NotificationRule;
use crate::store::RuleStore;

/// Parse all rule files in `dir`. Missing directory yields an empty set.
pub fn load_rules_from_dir(dir: &Path) -> Vec<NotificationRule> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "rules directory not readable, loading none");
            return Vec::new();
        }
    };

    let mut rules = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"))
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }

        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_yaml::from_str::<NotificationRule>(&raw) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping invalid rule file");
                }
            },
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable rule file");
            }
        }
    }
    rules
}

/// Load rule files into a store. Returns how many were accepted; rules that
/// fail store validation are logged and skipped.
pub fn load_into(store: &RuleStore, dir: &Path) -> usize {
    let mut loaded = 0;
    for rule in load_rules_from_dir(dir) {
        let name = rule.name.clone();
        match store.create(rule) {
            Ok(created) => {
                loaded += 1;
                info!(rule_id = %created.id, name = %created.name, "rule loaded");
            }
            Err(e) => {
                warn!(name = %name, error = %e, "rule file rejected by store");
            }
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_RULE: &str = r#"
name: Low stock alert
module: inventory
eventType: inventory.low_stock
scope:
  kind: fleet
conditions:
  all:
    - field: onHand
      op: lte
      value: 5
channels: [in_app, email]
minSeverity: warn
template:
  title: "Low stock: {{itemName}}"
  message: "{{itemName}} is down to {{onHand}} units"
recipients:
  mode: roles
  roles: [Captain]
"#;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_valid_yaml_rules() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "low-stock.yml", VALID_RULE);
        write_file(dir.path(), "notes.txt", "not a rule");

        let rules = load_rules_from_dir(dir.path());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].event_type, "inventory.low_stock");
        assert_eq!(rules[0].channels.len(), 2);
    }

    #[test]
    fn invalid_files_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "good.yaml", VALID_RULE);
        write_file(dir.path(), "bad.yaml", "channels: { not: [valid");

        let store = RuleStore::new();
        assert_eq!(load_into(&store, dir.path()), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_directory_loads_nothing() {
        let rules = load_rules_from_dir(Path::new("/definitely/not/here"));
        assert!(rules.is_empty());
    }

    #[test]
    fn store_validation_rejects_bad_rule_files() {
        let dir = tempfile::tempdir().unwrap();
        // Parses but has no channels → store rejects.
        write_file(
            dir.path(),
            "empty-channels.yml",
            r#"
name: No channels
module: hrm
eventType: hrm.cert_expiring
channels: []
template:
  title: t
  message: m
"#,
        );
        let store = RuleStore::new();
        assert_eq!(load_into(&store, dir.path()), 0);
        assert!(store.is_empty());
    }
}
