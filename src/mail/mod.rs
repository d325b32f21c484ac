//! Mail transports built on [lettre](https://lettre.rs).
//!
//! Two transport kinds exist: the hosted provider (Gmail relay, authenticated
//! by address + app password) and direct SMTP against a configured host and
//! port. Direct-SMTP senders may carry an alternate port; a transport for it
//! is built lazily the first time a primary send fails and is retried exactly
//! once per message.

mod fallback;
mod mailer;
mod message;

pub use fallback::{transports_for, MailerFactory, TransportPair};
pub use mailer::{Mailer, SendReceipt, SmtpMailer};
pub use message::OutgoingEmail;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("bad attachment {filename}: {reason}")]
    Attachment { filename: String, reason: String },

    #[error("SMTP error: {0}")]
    Smtp(String),
}
