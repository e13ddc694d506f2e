//! SMTP email transport via `lettre` with TLS support.
//!
//! Recipient addresses come from the membership resolver; users without a
//! known address are a transport failure (recorded in the ledger by the
//! dispatcher, never thrown at callers).

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use flotilla_core::config::SmtpConfig;
use flotilla_core::MembershipResolver;

use crate::traits::{ChannelMessage, EmailTransport, NotifyError};

/// Sends notifications as emails via SMTP.
pub struct SmtpEmailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    membership: Arc<dyn MembershipResolver>,
}

impl SmtpEmailTransport {
    /// Build from SMTP config. Returns a config error when no host is set.
    ///
    /// SMTP credentials are resolved from the `SMTP_USERNAME` and
    /// `SMTP_PASSWORD` environment variables; if both are set they are
    /// passed to the transport, otherwise the connection is unauthenticated.
    /// Port 465 uses implicit TLS; everything else uses STARTTLS when TLS
    /// is enabled.
    pub fn from_config(
        config: &SmtpConfig,
        membership: Arc<dyn MembershipResolver>,
    ) -> Result<Self, NotifyError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP host not configured".to_string()))?;

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let mut builder = if config.port == 465 || config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(config.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(config.port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            membership,
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(&self, message: &ChannelMessage) -> Result<(), NotifyError> {
        let address = self
            .membership
            .email_for(&message.user_id)
            .await
            .ok_or_else(|| {
                NotifyError::Transport(format!("no email address for user {}", message.user_id))
            })?;
        let to: Mailbox = address
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Transport(e.to_string()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("[{}] {}", message.severity, message.title))
            .body(message.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(user_id = %message.user_id, event_type = %message.event_type, "email sent");
        Ok(())
    }
}
