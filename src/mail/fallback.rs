//! Primary transport with a lazily-built fallback.

use std::sync::Arc;

use tokio::sync::OnceCell;

use super::{MailError, Mailer, OutgoingEmail, SendReceipt, SmtpMailer};
use crate::config::ResolvedSender;

/// Deferred constructor for the fallback transport. Only invoked the first
/// time a primary send fails; variants that never fail over never build it.
pub type MailerFactory = Box<dyn Fn() -> Result<Arc<dyn Mailer>, MailError> + Send + Sync>;

struct FallbackSlot {
    factory: MailerFactory,
    cell: OnceCell<Arc<dyn Mailer>>,
}

/// The transports for one batch: a primary mailer and, for direct-SMTP
/// senders with an alternate port, a lazy fallback on that port.
pub struct TransportPair {
    primary: Arc<dyn Mailer>,
    fallback: Option<FallbackSlot>,
}

impl TransportPair {
    pub fn new(primary: Arc<dyn Mailer>) -> TransportPair {
        TransportPair {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(primary: Arc<dyn Mailer>, factory: MailerFactory) -> TransportPair {
        TransportPair {
            primary,
            fallback: Some(FallbackSlot {
                factory,
                cell: OnceCell::new(),
            }),
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Send via the primary transport, retrying exactly once on the fallback
    /// when one exists. The primary's error is what the caller sees whenever
    /// the fallback is absent, fails to build, or also fails.
    pub async fn send_with_fallback(
        &self,
        email: &OutgoingEmail<'_>,
    ) -> Result<SendReceipt, MailError> {
        let primary_err = match self.primary.send(email).await {
            Ok(receipt) => return Ok(receipt),
            Err(err) => err,
        };

        let Some(slot) = &self.fallback else {
            return Err(primary_err);
        };

        let mailer = match slot.cell.get_or_try_init(|| async { (slot.factory)() }).await {
            Ok(mailer) => Arc::clone(mailer),
            Err(build_err) => {
                tracing::warn!(error = %build_err, "could not build fallback transport");
                return Err(primary_err);
            }
        };

        match mailer.send(email).await {
            Ok(receipt) => {
                tracing::info!(to = %email.to, "delivered via fallback transport");
                Ok(receipt)
            }
            Err(fallback_err) => {
                tracing::warn!(error = %fallback_err, "fallback transport also failed");
                Err(primary_err)
            }
        }
    }
}

/// Build the batch's transports from a resolved sender.
pub fn transports_for(sender: &ResolvedSender) -> Result<TransportPair, MailError> {
    let Some(smtp) = &sender.smtp else {
        let mailer = SmtpMailer::hosted(&sender.email, &sender.app_password)?;
        return Ok(TransportPair::new(Arc::new(mailer)));
    };

    let primary: Arc<dyn Mailer> = Arc::new(SmtpMailer::direct(
        &smtp.host,
        smtp.port,
        &sender.email,
        &sender.app_password,
    )?);

    match smtp.port_alt {
        None => Ok(TransportPair::new(primary)),
        Some(alt_port) => {
            let host = smtp.host.clone();
            let email = sender.email.clone();
            let app_password = sender.app_password.clone();
            let factory: MailerFactory = Box::new(move || {
                let mailer = SmtpMailer::direct(&host, alt_port, &email, &app_password)?;
                Ok(Arc::new(mailer) as Arc<dyn Mailer>)
            });
            Ok(TransportPair::with_fallback(primary, factory))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct FixedMailer {
        result: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl FixedMailer {
        fn ok(id: &'static str) -> Arc<FixedMailer> {
            Arc::new(FixedMailer {
                result: Ok(id),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(reason: &'static str) -> Arc<FixedMailer> {
            Arc::new(FixedMailer {
                result: Err(reason),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Mailer for FixedMailer {
        async fn send(&self, _email: &OutgoingEmail<'_>) -> Result<SendReceipt, MailError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.result {
                Ok(id) => Ok(SendReceipt {
                    message_id: id.to_string(),
                }),
                Err(reason) => Err(MailError::Smtp(reason.to_string())),
            }
        }
    }

    fn email() -> OutgoingEmail<'static> {
        OutgoingEmail {
            from: "A <a@x.com>".into(),
            to: "b@x.com".into(),
            subject: "s".into(),
            html: "<p>hi</p>".into(),
            attachments: &[],
        }
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = FixedMailer::ok("primary-id");
        let built = Arc::new(AtomicUsize::new(0));
        let built2 = Arc::clone(&built);
        let pair = TransportPair::with_fallback(
            primary.clone(),
            Box::new(move || {
                built2.fetch_add(1, Ordering::SeqCst);
                Ok(FixedMailer::ok("fallback-id") as Arc<dyn Mailer>)
            }),
        );

        let receipt = pair.send_with_fallback(&email()).await.unwrap();
        assert_eq!(receipt.message_id, "primary-id");
        assert_eq!(primary.calls(), 1);
        assert_eq!(built.load(Ordering::SeqCst), 0, "fallback must stay unbuilt");
    }

    #[tokio::test]
    async fn fallback_attempted_exactly_once() {
        let primary = FixedMailer::failing("primary down");
        let fallback = FixedMailer::ok("fallback-id");
        let fallback2 = fallback.clone();
        let pair = TransportPair::with_fallback(
            primary.clone(),
            Box::new(move || Ok(fallback2.clone() as Arc<dyn Mailer>)),
        );

        let receipt = pair.send_with_fallback(&email()).await.unwrap();
        assert_eq!(receipt.message_id, "fallback-id");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn fallback_is_cached_across_sends() {
        let primary = FixedMailer::failing("primary down");
        let built = Arc::new(AtomicUsize::new(0));
        let built2 = Arc::clone(&built);
        let pair = TransportPair::with_fallback(
            primary,
            Box::new(move || {
                built2.fetch_add(1, Ordering::SeqCst);
                Ok(FixedMailer::ok("fallback-id") as Arc<dyn Mailer>)
            }),
        );

        pair.send_with_fallback(&email()).await.unwrap();
        pair.send_with_fallback(&email()).await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn primary_error_surfaces_when_no_fallback() {
        let primary = FixedMailer::failing("primary down");
        let pair = TransportPair::new(primary.clone());

        let err = pair.send_with_fallback(&email()).await.unwrap_err();
        assert!(err.to_string().contains("primary down"));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn primary_error_surfaces_when_fallback_also_fails() {
        let primary = FixedMailer::failing("primary down");
        let fallback = FixedMailer::failing("fallback down");
        let fallback2 = fallback.clone();
        let pair = TransportPair::with_fallback(
            primary,
            Box::new(move || Ok(fallback2.clone() as Arc<dyn Mailer>)),
        );

        let err = pair.send_with_fallback(&email()).await.unwrap_err();
        assert!(err.to_string().contains("primary down"));
        assert_eq!(fallback.calls(), 1);
    }

    // Pooled transports need a live runtime to drop cleanly.
    #[tokio::test]
    async fn direct_sender_with_alt_port_gets_fallback() {
        let sender = ResolvedSender {
            email: "a@x.com".into(),
            app_password: "pw".into(),
            name: "A".into(),
            smtp: Some(crate::config::DirectSmtp {
                host: "smtp.x.com".into(),
                port: 465,
                port_alt: Some(587),
            }),
        };
        assert!(transports_for(&sender).unwrap().has_fallback());

        let hosted = ResolvedSender {
            smtp: None,
            ..sender
        };
        assert!(!transports_for(&hosted).unwrap().has_fallback());
    }
}
