//! Outbound email.
//!
//! The fan-out renders an [`OutboundEmail`] and hands it to a [`Mailer`].
//! Two mailers ship with the service:
//!
//! - [`SmtpMailer`] relays through an SMTP server with lettre
//! - [`ConsoleMailer`] only logs, for development and broker-less setups

use crate::config::{MailerConfig, MailerKind, SmtpSettings};
use async_trait::async_trait;
use fulfillment_core::{Decimal, OrderCreated};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Write as _;
use std::sync::Arc;

/// Email delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailError {
    /// A sender or recipient address did not parse
    #[error("invalid address '{address}': {reason}")]
    Address {
        /// The offending address
        address: String,
        /// Parser message
        reason: String,
    },

    /// The message could not be assembled
    #[error("failed to build email: {0}")]
    Build(String),

    /// The relay refused or could not be reached
    #[error("failed to send email: {0}")]
    Transport(String),
}

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

impl OutboundEmail {
    /// Order confirmation for the customer who placed `order`.
    #[must_use]
    pub fn order_confirmation(order: &OrderCreated) -> Self {
        let details = &order.order_details;
        let mut body = format!(
            "Hi {},\n\nThanks for your order #{}. Here is what we received:\n\n",
            order.customer_name, order.order_id
        );
        for item in &details.items {
            let line_total = item.price * Decimal::from(item.quantity);
            let _ = writeln!(
                body,
                "  {} x {} @ {} = {}",
                item.quantity,
                item.name,
                item.price,
                line_total.round_dp(2)
            );
        }
        let _ = write!(
            body,
            "\nTotal: {}\nDelivering to: {}\n\nWe will let you know when it ships.\n",
            details.total, details.delivery_address
        );

        Self {
            to: order.customer_email.clone(),
            subject: format!("Your order #{} is confirmed", order.order_id),
            body,
        }
    }
}

/// Delivers emails.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send `email`.
    ///
    /// # Errors
    ///
    /// [`MailError`] when the email cannot be built or delivered.
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

/// Build the mailer selected by `config`.
///
/// # Errors
///
/// [`MailError`] when the SMTP settings are unusable.
pub fn build_mailer(config: &MailerConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.kind {
        MailerKind::Smtp => Ok(Arc::new(SmtpMailer::new(&config.smtp)?)),
        MailerKind::Console => Ok(Arc::new(ConsoleMailer)),
    }
}

/// SMTP mailer using lettre's async transport.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a mailer relaying through `settings.host`.
    ///
    /// The transport pools its connections, so one mailer serves the whole
    /// process.
    ///
    /// # Errors
    ///
    /// [`MailError`] for an invalid sender or relay host.
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let from = parse_mailbox(&settings.from)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::debug!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Logs emails instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "Email (console mailer)"
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}
