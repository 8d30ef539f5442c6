//! Outgoing mail.
//!
//! New accounts receive their staff id and temporary password by email.
//! Delivery runs in a spawned task so account creation never waits on SMTP;
//! failures are logged and otherwise ignored.

use crate::config::{MailConfig, MailTransport};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Subject line of the credentials email.
pub const CREDENTIALS_SUBJECT: &str = "Your Bus Ticketing System Account Details";

/// Mail delivery failures.
#[derive(Error, Debug)]
pub enum MailError {
    /// Sender or recipient is not a valid mailbox.
    #[error("invalid address: {0}")]
    Address(String),

    /// The message could not be assembled.
    #[error("failed to build email: {0}")]
    Build(String),

    /// The relay refused or could not be reached.
    #[error("failed to send email: {0}")]
    Transport(String),
}

/// Login details for a newly created account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsEmail {
    /// Recipient address
    pub to: String,
    /// `name surname`
    pub full_name: String,
    /// Login id
    pub staff_id: String,
    /// Role name
    pub role: String,
    /// Password chosen by the admin
    pub password: String,
    /// Where to sign in
    pub login_url: String,
}

impl CredentialsEmail {
    /// Plain-text body.
    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "Hello {name},\n\
             \n\
             An account has been created for you on the Bus Ticketing System.\n\
             \n\
             Email: {email}\n\
             Staff ID: {staff_id}\n\
             Role: {role}\n\
             Password: {password}\n\
             \n\
             Sign in at {login_url}\n\
             \n\
             Please change your password after your first login.\n",
            name = self.full_name,
            email = self.to,
            staff_id = self.staff_id,
            role = self.role,
            password = self.password,
            login_url = self.login_url,
        )
    }
}

/// Sends account emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a credentials email.
    async fn send_credentials(&self, email: &CredentialsEmail) -> Result<(), MailError>;
}

/// Writes emails to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_credentials(&self, email: &CredentialsEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            staff_id = %email.staff_id,
            subject = CREDENTIALS_SUBJECT,
            "Credentials email (log transport)"
        );
        tracing::debug!(body = %email.body(), "Credentials email body");
        Ok(())
    }
}

/// SMTP delivery through `lettre`.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer").field("from", &self.from).finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Build a mailer for the configured relay.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if the relay host or sender address is invalid.
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| MailError::Address(format!("from: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_credentials(&self, email: &CredentialsEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email
                .to
                .parse()
                .map_err(|e| MailError::Address(format!("to: {e}")))?)
            .subject(CREDENTIALS_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Pick the mailer named by configuration.
///
/// # Errors
///
/// Returns [`MailError`] if SMTP is selected but misconfigured.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    Ok(match config.transport {
        MailTransport::Log => Arc::new(LogMailer),
        MailTransport::Smtp => Arc::new(SmtpMailer::new(config)?),
    })
}

/// Send a credentials email in the background.
pub fn spawn_credentials_email(mailer: Arc<dyn Mailer>, email: CredentialsEmail) -> JoinHandle<()> {
    tokio::spawn(async move {
        match mailer.send_credentials(&email).await {
            Ok(()) => tracing::info!(to = %email.to, "Credentials email sent"),
            Err(e) => tracing::error!(to = %email.to, error = %e, "Failed to send credentials email"),
        }
    })
}

/// Mailer that keeps every message, for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<std::sync::Mutex<Vec<CredentialsEmail>>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingMailer {
    /// Empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<CredentialsEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_credentials(&self, email: &CredentialsEmail) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError::Transport("outbox lock poisoned".to_string()))?
            .push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn email() -> CredentialsEmail {
        CredentialsEmail {
            to: "rudo@example.com".to_string(),
            full_name: "Rudo Chikore".to_string(),
            staff_id: "PSC100".to_string(),
            role: "staff".to_string(),
            password: "s3cret-pass".to_string(),
            login_url: "http://localhost:3000/login".to_string(),
        }
    }

    #[test]
    fn test_body_carries_login_details() {
        let body = email().body();
        assert!(body.starts_with("Hello Rudo Chikore,"));
        for needle in [
            "Email: rudo@example.com",
            "Staff ID: PSC100",
            "Role: staff",
            "Password: s3cret-pass",
            "http://localhost:3000/login",
            "change your password",
        ] {
            assert!(body.contains(needle), "missing {needle:?}");
        }
    }

    #[tokio::test]
    async fn test_spawned_email_reaches_mailer() {
        let mailer = RecordingMailer::new();
        spawn_credentials_email(Arc::new(mailer.clone()), email())
            .await
            .unwrap();
        assert_eq!(mailer.sent(), vec![email()]);
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        assert!(LogMailer.send_credentials(&email()).await.is_ok());
    }
}
