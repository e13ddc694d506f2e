pub mod alerts;
pub mod config;
pub mod error;
pub mod event;
pub mod membership;
pub mod payload;
pub mod severity;

pub use alerts::{AlertStore, AlertUpsert, InMemoryAlertStore};
pub use config::Config;
pub use error::*;
pub use event::EventCandidate;
pub use membership::{MembershipRecord, MembershipResolver, StaticMembership};
pub use payload::Payload;
pub use severity::Severity;
