//! Mailer trait and SMTP implementations.

use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::{MailError, OutgoingEmail};

const GMAIL_RELAY: &str = "smtp.gmail.com";
const SMTPS_PORT: u16 = 465;
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider acknowledgement for one accepted message.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Async mail sending seam.
///
/// Implement this to provide alternative backends; tests use mock
/// implementations to drive the dispatch loop without a network.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail<'_>) -> Result<SendReceipt, MailError>;
}

/// SMTP-backed mailer. Constructed once per batch and reused across sends so
/// the underlying connection pool can keep the session open.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Hosted-provider transport: Gmail relay authenticated by address and
    /// app password. No host or port is configurable.
    pub fn hosted(email: &str, app_password: &str) -> Result<SmtpMailer, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(GMAIL_RELAY)
            .map_err(|e| MailError::Smtp(e.to_string()))?
            .credentials(Credentials::new(email.to_string(), app_password.to_string()))
            .timeout(Some(SEND_TIMEOUT))
            .build();
        Ok(SmtpMailer { transport })
    }

    /// Direct-SMTP transport against an explicit host and port. Port 465 is
    /// implicit TLS; any other port upgrades opportunistically via STARTTLS.
    pub fn direct(
        host: &str,
        port: u16,
        email: &str,
        app_password: &str,
    ) -> Result<SmtpMailer, MailError> {
        let builder = if port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| MailError::Smtp(e.to_string()))?
        } else {
            let tls = TlsParameters::new(host.to_string())
                .map_err(|e| MailError::Smtp(e.to_string()))?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Opportunistic(tls))
        };

        let transport = builder
            .port(port)
            .credentials(Credentials::new(email.to_string(), app_password.to_string()))
            .timeout(Some(SEND_TIMEOUT))
            .build();
        Ok(SmtpMailer { transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail<'_>) -> Result<SendReceipt, MailError> {
        let (message, message_id) = email.build_message()?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        Ok(SendReceipt { message_id })
    }
}
