//! Channel-dispatch and dedupe layer shared by the rule engine and the
//! job scheduler.
//!
//! This crate provides:
//! - `Channel` / `SendStatus` vocabulary and the `EmailTransport` /
//!   `PushTransport` seams for pluggable delivery providers
//! - the notification ledger recording every attempted send with a
//!   dedupe key, used for idempotent retries
//! - the dispatcher (`maybe_send_in_app` / `maybe_send_email` /
//!   `maybe_send_push_future`) plus recipient × channel fan-out
//! - minijinja template rendering for notification messages

pub mod dispatcher;
pub mod email;
pub mod ledger;
pub mod templating;
pub mod traits;

pub use dispatcher::{Delivery, DispatchRequest, Dispatcher};
pub use ledger::{Ledger, LedgerEntry, LedgerStatus};
pub use templating::TemplateRenderer;
pub use traits::{Channel, ChannelMessage, EmailTransport, NotifyError, PushTransport, SendStatus};
