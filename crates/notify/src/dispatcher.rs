//! Routes notifications through channels with per-channel dedupe.
//!
//! The dispatcher is the single write path into the notification ledger.
//! In-app sends are local records and always succeed; email consults the
//! ledger for a same-calendar-day `sent` row before calling the transport;
//! push records `skipped` until a transport ships. Individual channel
//! failures never block other channels or recipients.

use std::sync::Arc;

use chrono::{Duration, Utc};

use flotilla_core::{Payload, Severity};

use crate::ledger::{Ledger, LedgerStatus, NewLedgerEntry};
use crate::traits::{Channel, ChannelMessage, EmailTransport, PushTransport, SendStatus};

/// Default in-app/email dedupe window when the caller does not set one.
const DEFAULT_DEDUPE_WINDOW_HOURS: i64 = 24;

/// One notification attempt for one user on one channel.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub user_id: String,
    pub yacht_id: Option<String>,
    pub event_type: String,
    pub dedupe_key: String,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub payload: Payload,
    /// Hours of windowed dedupe for in-app sends (default 24; 0 disables).
    pub dedupe_window_hours: Option<i64>,
}

/// A rendered message fanned out to many recipients across channels.
/// The per-user dedupe key is derived as `{base_dedupe_key}:user:{userId}`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub base_dedupe_key: String,
    pub yacht_id: Option<String>,
    pub event_type: String,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub payload: Payload,
    pub dedupe_window_hours: Option<i64>,
}

/// Sends notifications through the channel set, recording every attempt
/// in the ledger.
pub struct Dispatcher {
    ledger: Arc<Ledger>,
    email: Option<Arc<dyn EmailTransport>>,
    push: Option<Arc<dyn PushTransport>>,
}

impl Dispatcher {
    pub fn new(
        ledger: Arc<Ledger>,
        email: Option<Arc<dyn EmailTransport>>,
        push: Option<Arc<dyn PushTransport>>,
    ) -> Self {
        Self {
            ledger,
            email,
            push,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Dispatch through a single channel.
    pub async fn send_channel(&self, channel: Channel, request: &DispatchRequest) -> SendStatus {
        let status = match channel {
            Channel::InApp => self.maybe_send_in_app(request).await,
            Channel::Email => self.maybe_send_email(request).await,
            Channel::Push => self.maybe_send_push_future(request).await,
        };
        tracing::debug!(
            channel = %channel,
            user_id = %request.user_id,
            dedupe_key = %request.dedupe_key,
            status = %status,
            "channel dispatch"
        );
        status
    }

    /// In-app: windowed dedupe, then a fire-and-forget local `sent` record.
    pub async fn maybe_send_in_app(&self, request: &DispatchRequest) -> SendStatus {
        let window = request
            .dedupe_window_hours
            .unwrap_or(DEFAULT_DEDUPE_WINDOW_HOURS);
        if window > 0 {
            let since = Utc::now() - Duration::hours(window);
            if self
                .ledger
                .has_sent_since(&request.dedupe_key, Channel::InApp, since)
            {
                return SendStatus::Skipped;
            }
        }
        self.record(request, Channel::InApp, LedgerStatus::Sent, None);
        SendStatus::Sent
    }

    /// Email: dedupe against `sent` rows from the current UTC calendar day,
    /// then call the transport and record its outcome.
    pub async fn maybe_send_email(&self, request: &DispatchRequest) -> SendStatus {
        let day_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is valid")
            .and_utc();
        if self
            .ledger
            .has_sent_since(&request.dedupe_key, Channel::Email, day_start)
        {
            return SendStatus::SkippedDailyDedupe;
        }

        let transport = match &self.email {
            Some(t) => Arc::clone(t),
            None => {
                self.record(
                    request,
                    Channel::Email,
                    LedgerStatus::Skipped,
                    Some("email transport not configured".to_string()),
                );
                return SendStatus::Skipped;
            }
        };

        match transport.send(&self.to_message(request)).await {
            Ok(()) => {
                self.record(request, Channel::Email, LedgerStatus::Sent, None);
                SendStatus::Sent
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %request.user_id,
                    dedupe_key = %request.dedupe_key,
                    error = %e,
                    "email delivery failed"
                );
                self.record(request, Channel::Email, LedgerStatus::Failed, Some(e.to_string()));
                SendStatus::Failed
            }
        }
    }

    /// Push: no transport ships yet, so every attempt records `skipped`.
    /// The write path and entry shape match email so a real transport
    /// slots in without changing callers.
    pub async fn maybe_send_push_future(&self, request: &DispatchRequest) -> SendStatus {
        let transport = match &self.push {
            Some(t) => Arc::clone(t),
            None => {
                self.record(request, Channel::Push, LedgerStatus::Skipped, None);
                return SendStatus::Skipped;
            }
        };

        match transport.send(&self.to_message(request)).await {
            Ok(()) => {
                self.record(request, Channel::Push, LedgerStatus::Sent, None);
                SendStatus::Sent
            }
            Err(e) => {
                self.record(request, Channel::Push, LedgerStatus::Failed, Some(e.to_string()));
                SendStatus::Failed
            }
        }
    }

    /// Fan a delivery out to every recipient on every channel. Returns the
    /// number of successful sends. Channels are attempted independently;
    /// one failure never blocks the rest.
    pub async fn fan_out(
        &self,
        recipients: &[String],
        channels: &[Channel],
        delivery: &Delivery,
    ) -> usize {
        let mut delivered = 0;
        for user_id in recipients {
            let request = DispatchRequest {
                user_id: user_id.clone(),
                yacht_id: delivery.yacht_id.clone(),
                event_type: delivery.event_type.clone(),
                dedupe_key: format!("{}:user:{}", delivery.base_dedupe_key, user_id),
                severity: delivery.severity,
                title: delivery.title.clone(),
                body: delivery.body.clone(),
                payload: delivery.payload.clone(),
                dedupe_window_hours: delivery.dedupe_window_hours,
            };
            for channel in channels {
                if self.send_channel(*channel, &request).await == SendStatus::Sent {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn to_message(&self, request: &DispatchRequest) -> ChannelMessage {
        ChannelMessage {
            user_id: request.user_id.clone(),
            yacht_id: request.yacht_id.clone(),
            event_type: request.event_type.clone(),
            title: request.title.clone(),
            body: request.body.clone(),
            severity: request.severity,
            payload: request.payload.clone(),
        }
    }

    fn record(
        &self,
        request: &DispatchRequest,
        channel: Channel,
        status: LedgerStatus,
        error: Option<String>,
    ) {
        self.ledger.append(NewLedgerEntry {
            user_id: request.user_id.clone(),
            yacht_id: request.yacht_id.clone(),
            channel,
            event_type: request.event_type.clone(),
            dedupe_key: request.dedupe_key.clone(),
            status,
            payload: serde_json::to_value(&request.payload).unwrap_or_default(),
            error,
        });
    }
}
