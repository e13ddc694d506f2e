//! Role/yacht membership resolution seam.
//!
//! The live membership store (users, roles, yacht access) is an external
//! collaborator. Both the rule engine and the job scheduler only need one
//! narrow capability: "given roles and an optional yacht, which active
//! users match". Modeling it as a trait keeps both engines testable with
//! fixed user sets.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FlotillaError;

/// Well-known role names used by assignment and escalation fallbacks.
pub mod roles {
    pub const CAPTAIN: &str = "Captain";
    pub const CHIEF_ENGINEER: &str = "Chief Engineer";
    pub const MANAGEMENT: &str = "Management";
    pub const ADMIN: &str = "Admin";
    pub const OFFICE: &str = "Office";
}

/// Capability interface over the external user/role store.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// Active user ids holding any of `roles`. With a `yacht_id`, resolution
    /// is scoped to that yacht's active membership and an explicit per-yacht
    /// role override beats the user's global role. Without one, global roles
    /// apply.
    async fn resolve_users_by_roles(&self, roles: &[String], yacht_id: Option<&str>)
        -> Vec<String>;

    /// Whether the user account exists and is active.
    async fn is_active(&self, user_id: &str) -> bool;

    /// Email address for a user, when the store knows one.
    async fn email_for(&self, user_id: &str) -> Option<String> {
        let _ = user_id;
        None
    }
}

// ── Static resolver ─────────────────────────────────────────────────

/// One membership fact: a user's role, optionally scoped to a yacht.
///
/// A record with a `yacht_id` is a per-yacht role override; a record
/// without one is the user's global role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    pub user_id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yacht_id: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Fixed-set resolver backed by a list of membership records.
///
/// Used by tests and by the standalone worker (loaded from a JSON fixture
/// file) until the real membership service is wired in.
#[derive(Debug, Default)]
pub struct StaticMembership {
    records: Vec<MembershipRecord>,
    inactive: HashSet<String>,
    emails: HashMap<String, String>,
}

impl StaticMembership {
    pub fn new(records: Vec<MembershipRecord>) -> Self {
        let inactive = records
            .iter()
            .filter(|r| r.active == Some(false))
            .map(|r| r.user_id.clone())
            .collect();
        let emails = records
            .iter()
            .filter_map(|r| r.email.clone().map(|e| (r.user_id.clone(), e)))
            .collect();
        Self {
            records,
            inactive,
            emails,
        }
    }

    /// Load records from a JSON fixture file (an array of records).
    pub fn from_json_file(path: &Path) -> Result<Self, FlotillaError> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<MembershipRecord> =
            serde_json::from_str(&raw).map_err(|e| FlotillaError::Serialize(e.to_string()))?;
        Ok(Self::new(records))
    }

    /// Effective role for a user in a yacht context: the per-yacht override
    /// when one exists, the global role otherwise.
    fn effective_role(&self, user_id: &str, yacht_id: Option<&str>) -> Option<&str> {
        if let Some(yacht) = yacht_id {
            if let Some(record) = self
                .records
                .iter()
                .find(|r| r.user_id == user_id && r.yacht_id.as_deref() == Some(yacht))
            {
                return Some(&record.role);
            }
        }
        self.records
            .iter()
            .find(|r| r.user_id == user_id && r.yacht_id.is_none())
            .map(|r| r.role.as_str())
    }

    fn user_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.user_id.as_str()))
            .map(|r| r.user_id.as_str())
            .collect()
    }
}

#[async_trait]
impl MembershipResolver for StaticMembership {
    async fn resolve_users_by_roles(
        &self,
        roles: &[String],
        yacht_id: Option<&str>,
    ) -> Vec<String> {
        self.user_ids()
            .into_iter()
            .filter(|uid| !self.inactive.contains(*uid))
            .filter(|uid| {
                // When scoped to a yacht, only users with membership there.
                if let Some(yacht) = yacht_id {
                    let on_yacht = self
                        .records
                        .iter()
                        .any(|r| r.user_id == *uid && r.yacht_id.as_deref() == Some(yacht));
                    if !on_yacht {
                        return false;
                    }
                }
                match self.effective_role(uid, yacht_id) {
                    Some(role) => roles.iter().any(|r| r == role),
                    None => false,
                }
            })
            .map(String::from)
            .collect()
    }

    async fn is_active(&self, user_id: &str) -> bool {
        !self.inactive.contains(user_id)
            && self.records.iter().any(|r| r.user_id == user_id)
    }

    async fn email_for(&self, user_id: &str) -> Option<String> {
        self.emails.get(user_id).cloned()
    }
}
