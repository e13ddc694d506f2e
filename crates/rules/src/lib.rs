//! Declarative notification rules matched against event candidates.
//!
//! This crate provides:
//! - the rule schema: scope, conditions, cadence, channels, severity gate,
//!   recipient policy, and message templates
//! - the condition evaluator (small fixed operator set, fail-closed)
//! - an in-memory rule store with CRUD and validation
//! - a YAML rule-file loader for startup provisioning
//! - the engine that matches candidates, resolves recipients, renders
//!   templates, and fans out through the dispatcher

pub mod conditions;
pub mod engine;
pub mod loader;
pub mod schema;
pub mod store;

pub use engine::{DispatchSummary, RuleEngine, RuleTestReport};
pub use schema::{
    Cadence, CadenceMode, ConditionClause, ConditionOp, NotificationRule, RecipientMode,
    RecipientPolicy, RuleConditions, RuleScope, RuleTemplate, ScopeKind,
};
pub use store::RuleStore;
