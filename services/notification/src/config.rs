//! Notification service configuration.

use fulfillment_runtime::config::{
    BrokerConfig, ConsumerConfig, Lookup, PostgresConfig, ServerConfig, parse_or, process_env,
    string_or,
};

/// Port the notification service listens on unless `PORT` says otherwise.
pub const DEFAULT_PORT: u16 = 3005;

/// Durable queue of this service.
pub const QUEUE: &str = "notification-service";

/// Sender used when `MAIL_FROM` is unset.
pub const DEFAULT_FROM: &str = "Pharmacy <no-reply@pharmacy.local>";

/// Which mailer delivers confirmation emails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailerKind {
    /// Log emails instead of sending them
    Console,
    /// Relay through an SMTP server
    Smtp,
}

/// SMTP relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    /// Relay host
    pub host: String,
    /// Relay port (587 for STARTTLS)
    pub port: u16,
    /// Login, if the relay requires one
    pub username: Option<String>,
    /// Password for `username`
    pub password: Option<String>,
    /// `From` header, `Name <address>` or a bare address
    pub from: String,
}

/// Mail delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerConfig {
    /// Selected mailer
    pub kind: MailerKind,
    /// Relay settings, used when `kind` is [`MailerKind::Smtp`]
    pub smtp: SmtpSettings,
}

impl MailerConfig {
    /// Load from `lookup`.
    ///
    /// `MAILER=smtp|console` picks the mailer explicitly. Without it, SMTP is
    /// used as soon as `SMTP_HOST` is set.
    #[must_use]
    pub fn from_lookup(lookup: &impl Lookup) -> Self {
        let host = lookup("SMTP_HOST").filter(|h| !h.trim().is_empty());
        let kind = match lookup("MAILER")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("smtp") => MailerKind::Smtp,
            Some("console") => MailerKind::Console,
            _ if host.is_some() => MailerKind::Smtp,
            _ => MailerKind::Console,
        };

        Self {
            kind,
            smtp: SmtpSettings {
                host: host.unwrap_or_else(|| "localhost".to_string()),
                port: parse_or(lookup, "SMTP_PORT", 587),
                username: lookup("SMTP_USER").filter(|u| !u.is_empty()),
                password: lookup("SMTP_PASS").filter(|p| !p.is_empty()),
                from: string_or(lookup, "MAIL_FROM", DEFAULT_FROM),
            },
        }
    }
}

/// Everything the notification binary reads from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database pool
    pub postgres: PostgresConfig,
    /// Broker connection
    pub broker: BrokerConfig,
    /// Redelivery policy
    pub consumer: ConsumerConfig,
    /// HTTP listener
    pub server: ServerConfig,
    /// Confirmation emails
    pub mailer: MailerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    /// Load configuration through an arbitrary lookup.
    #[must_use]
    pub fn from_lookup(lookup: &impl Lookup) -> Self {
        Self {
            postgres: PostgresConfig::from_lookup(lookup),
            broker: BrokerConfig::from_lookup(lookup),
            consumer: ConsumerConfig::from_lookup(lookup),
            server: ServerConfig::from_lookup(lookup, DEFAULT_PORT),
            mailer: MailerConfig::from_lookup(lookup),
        }
    }
}
