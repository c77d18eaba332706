#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("could not build message: {0}")]
    Build(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("no mail transport configured")]
    Unconfigured,
}

/// A plain-text message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub reply_to: Option<String>,
}

impl Notification {
    pub fn otp(to: &str, code: i32) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your OTP Code for 2-Step Verification".into(),
            body: format!("Your OTP code is: {code}"),
            reply_to: None,
        }
    }

    pub fn contact(to: &str, name: &str, email: &str, subject: &str, message: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Portfolio Message: {subject}"),
            body: format!("From: {name}\nEmail: {email}\n\n{message}"),
            reply_to: Some(email.to_string()),
        }
    }
}

/// Outbound delivery. `send` returns only once the transport accepted or
/// refused the message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

pub struct SmtpNotifier {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("from", &self.from)
            .field("transport", &"<AsyncSmtpTransport>")
            .finish()
    }
}

impl SmtpNotifier {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let from: Mailbox = cfg
            .from_address
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid MAIL_FROM address: {e}"))?;

        let builder = if cfg.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
                .map_err(|e| anyhow::anyhow!("SMTP TLS relay error: {e}"))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.smtp_host)
        };
        let builder = builder.port(cfg.smtp_port);
        let builder = match (&cfg.username, &cfg.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        Ok(Self {
            from,
            transport: builder.build(),
        })
    }
}

fn build_message(from: &Mailbox, n: &Notification) -> Result<Message, NotifyError> {
    let to: Mailbox = n
        .to
        .parse()
        .map_err(|e| NotifyError::Address(format!("{}: {e}", n.to)))?;
    let mut builder = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(&n.subject)
        .header(ContentType::TEXT_PLAIN);
    if let Some(reply_to) = &n.reply_to {
        let reply: Mailbox = reply_to
            .parse()
            .map_err(|e| NotifyError::Address(format!("{reply_to}: {e}")))?;
        builder = builder.reply_to(reply);
    }
    builder
        .body(n.body.clone())
        .map_err(|e| NotifyError::Build(e.to_string()))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        debug!(subject = %notification.subject, "building mail message");
        let message = build_message(&self.from, &notification)?;
        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, "SMTP send failed");
            NotifyError::Transport(e.to_string())
        })?;
        info!(subject = %notification.subject, "mail sent");
        Ok(())
    }
}

/// Stand-in when no SMTP relay is configured. Nothing is kept and every send
/// fails, so callers report the missing delivery instead of claiming success.
#[derive(Debug, Default)]
pub struct UnconfiguredNotifier;

#[async_trait]
impl Notifier for UnconfiguredNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        warn!(subject = %notification.subject, "mail dropped: SMTP_HOST is not set");
        Err(NotifyError::Unconfigured)
    }
}

/// Keeps sent messages in memory so tests can read back OTP codes.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<Notification> {
        self.sent().into_iter().rev().find(|n| n.to == to)
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("recording notifier set to fail".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> Mailbox {
        "Portfolio <noreply@example.com>".parse().unwrap()
    }

    #[test]
    fn otp_message_carries_the_code() {
        let n = Notification::otp("admin@example.com", 123456);
        assert_eq!(n.subject, "Your OTP Code for 2-Step Verification");
        assert_eq!(n.body, "Your OTP code is: 123456");
        let msg = build_message(&from(), &n).expect("message builds");
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("To: admin@example.com"));
        assert!(raw.contains("Your OTP code is: 123456"));
    }

    #[test]
    fn contact_message_replies_to_sender() {
        let n = Notification::contact("owner@example.com", "Ann", "ann@example.com", "Hi", "Hello!");
        assert_eq!(n.subject, "Portfolio Message: Hi");
        assert_eq!(n.body, "From: Ann\nEmail: ann@example.com\n\nHello!");
        let raw = String::from_utf8(build_message(&from(), &n).unwrap().formatted()).unwrap();
        assert!(raw.contains("Reply-To: ann@example.com"));
    }

    #[test]
    fn invalid_recipient_is_an_address_error() {
        let n = Notification::otp("not an address", 111111);
        assert!(matches!(build_message(&from(), &n), Err(NotifyError::Address(_))));
    }

    #[tokio::test]
    async fn recording_notifier_can_fail() {
        let notifier = RecordingNotifier::new();
        notifier.send(Notification::otp("a@x.com", 111111)).await.unwrap();
        notifier.set_failing(true);
        assert!(notifier.send(Notification::otp("a@x.com", 222222)).await.is_err());
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.last_to("a@x.com").unwrap().body, "Your OTP code is: 111111");
    }

    #[tokio::test]
    async fn unconfigured_notifier_fails_every_send() {
        let notifier = UnconfiguredNotifier;
        for i in 0..100 {
            let note = Notification::contact("owner@example.com", "Ann", "ann@example.com", "Hi", &i.to_string());
            assert!(matches!(notifier.send(note).await, Err(NotifyError::Unconfigured)));
        }
        assert_eq!(std::mem::size_of::<UnconfiguredNotifier>(), 0);
    }
}
