//! Sequential batch dispatch with throttled, jittered sends.
//!
//! A batch walks its rows in order: render, resolve attachments, send with
//! fallback, record the outcome. One recipient's failure never blocks the
//! rest; the only fatal failures happen before the loop starts (missing
//! request fields or unresolved sender credentials). Between sends the loop
//! suspends on a jittered delay so outbound rate stays under provider limits.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::attachments::{self, AttachmentMap};
use crate::config::{ResolvedSender, SenderStore};
use crate::mail::{self, OutgoingEmail, TransportPair};
use crate::render;
use crate::Error;

/// Delay applied between sends when the request does not specify one.
pub const DEFAULT_DELAY_MS: u64 = 2000;
/// Jitter bound applied to the delay when the request does not specify one.
pub const DEFAULT_JITTER_MS: u64 = 250;

/// One recipient record. Schema-free; only the mapped keys matter.
pub type Row = HashMap<String, String>;

/// Which row fields hold the recipient address, display name, and optionally
/// a literal subject fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub recipient: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// Wire shape of a batch invocation. Required fields are optional here so
/// their absence maps to the configuration error instead of a decode failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub rows: Option<Vec<Row>>,
    #[serde(default)]
    pub mapping: Option<FieldMapping>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub subject_template: Option<String>,
    #[serde(default)]
    pub attachments_by_name: Option<AttachmentMap>,
    #[serde(default)]
    pub delay_ms: Option<i64>,
    #[serde(default)]
    pub jitter_ms: Option<i64>,
    #[serde(default, alias = "variant")]
    pub system_variant: Option<String>,
}

impl BatchRequest {
    /// Validate required fields and settle the delay/jitter defaults.
    pub fn into_batch(self) -> Result<Batch, Error> {
        let rows = self.rows.filter(|r| !r.is_empty()).ok_or(Error::MissingFields)?;
        let mapping = self.mapping.ok_or(Error::MissingFields)?;
        let template = self
            .template
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingFields)?;

        Ok(Batch {
            rows,
            mapping,
            template,
            subject_template: self.subject_template,
            attachments_by_name: self.attachments_by_name,
            delay_ms: match self.delay_ms {
                Some(d) if d >= 0 => d as u64,
                _ => DEFAULT_DELAY_MS,
            },
            jitter_ms: match self.jitter_ms {
                Some(j) if j >= 0 => j as u64,
                _ => DEFAULT_JITTER_MS,
            },
        })
    }
}

/// A validated batch, ready for the dispatch loop.
#[derive(Debug)]
pub struct Batch {
    pub rows: Vec<Row>,
    pub mapping: FieldMapping,
    pub template: String,
    pub subject_template: Option<String>,
    pub attachments_by_name: Option<AttachmentMap>,
    pub delay_ms: u64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Error,
}

/// Outcome for one processed row, in row order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendItem {
    pub to: String,
    pub status: SendStatus,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub attachments: usize,
    pub timestamp: String,
}

/// Final report for one batch invocation. `ok` iff nothing failed.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub ok: bool,
    pub sent: u32,
    pub failed: u32,
    pub items: Vec<SendItem>,
}

/// Resolve the sender for the requested variant, build transports, and run
/// the loop. The two error paths here are the only ones that reach the
/// caller; everything after transport construction is recorded per item.
pub async fn run_batch(store: &SenderStore, req: BatchRequest) -> Result<BatchReport, Error> {
    let requested = req.system_variant.clone();
    let batch = req.into_batch()?;

    let (variant, env) = store.resolve(requested.as_deref());
    let sender = ResolvedSender::from_parts(variant, env)?;
    let transports = mail::transports_for(&sender)?;

    tracing::info!(%variant, rows = batch.rows.len(), "dispatching batch");
    Ok(dispatch_rows(&batch, &sender, &transports).await)
}

/// The batch loop proper. Rows without a recipient value are dropped up
/// front and produce no result item.
pub async fn dispatch_rows(
    batch: &Batch,
    sender: &ResolvedSender,
    transports: &TransportPair,
) -> BatchReport {
    let filtered: Vec<&Row> = batch
        .rows
        .iter()
        .filter(|row| {
            row.get(&batch.mapping.recipient)
                .is_some_and(|v| !v.is_empty())
        })
        .collect();

    let from = sender.from_mailbox();
    let mut items = Vec::with_capacity(filtered.len());
    let mut sent = 0u32;
    let mut failed = 0u32;

    for (index, row) in filtered.iter().copied().enumerate() {
        let to = row
            .get(&batch.mapping.recipient)
            .cloned()
            .unwrap_or_default();

        let rendered = render::render_message(
            &batch.template,
            batch.subject_template.as_deref(),
            row,
            &batch.mapping,
        );
        if rendered.body.is_fallback() || rendered.subject.is_fallback() {
            tracing::warn!(%to, "template render failed; using raw template text");
        }
        let subject = rendered.subject.into_text();
        let html = rendered.body.into_text();

        let atts = attachments::for_row(row, &batch.mapping, batch.attachments_by_name.as_ref());

        let email = OutgoingEmail {
            from: from.clone(),
            to: to.clone(),
            subject: subject.clone(),
            html,
            attachments: atts,
        };

        match transports.send_with_fallback(&email).await {
            Ok(receipt) => {
                sent += 1;
                tracing::info!(%to, attachments = atts.len(), "message sent");
                items.push(SendItem {
                    to,
                    status: SendStatus::Sent,
                    subject,
                    error: None,
                    message_id: Some(receipt.message_id),
                    attachments: atts.len(),
                    timestamp: now_rfc3339(),
                });
            }
            Err(err) => {
                failed += 1;
                tracing::warn!(%to, error = %err, "message failed");
                items.push(SendItem {
                    to,
                    status: SendStatus::Error,
                    subject,
                    error: Some(err.to_string()),
                    message_id: None,
                    attachments: atts.len(),
                    timestamp: now_rfc3339(),
                });
            }
        }

        // No sleep after the final row.
        if batch.delay_ms > 0 && index + 1 < filtered.len() {
            tokio::time::sleep(jittered_wait(batch.delay_ms, batch.jitter_ms)).await;
        }
    }

    BatchReport {
        ok: failed == 0,
        sent,
        failed,
        items,
    }
}

/// Delay plus a uniform offset from `[-jitter, +jitter]`, clamped at zero.
pub fn jittered_wait(delay_ms: u64, jitter_ms: u64) -> Duration {
    let offset = if jitter_ms > 0 {
        rand::thread_rng().gen_range(-(jitter_ms as i64)..=jitter_ms as i64)
    } else {
        0
    };
    Duration::from_millis((delay_ms as i64 + offset).max(0) as u64)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_request() -> BatchRequest {
        BatchRequest {
            rows: Some(vec![Row::from([
                ("email".to_string(), "a@x.com".to_string()),
                ("name".to_string(), "Alice".to_string()),
            ])]),
            mapping: Some(FieldMapping {
                recipient: "email".into(),
                name: "name".into(),
                subject: None,
            }),
            template: Some("Hi {{name}}".into()),
            ..BatchRequest::default()
        }
    }

    #[test]
    fn missing_rows_mapping_or_template_is_fatal() {
        let strips: [fn(&mut BatchRequest); 5] = [
            |r| r.rows = None,
            |r| r.rows = Some(vec![]),
            |r| r.mapping = None,
            |r| r.template = None,
            |r| r.template = Some(String::new()),
        ];
        for strip in strips {
            let mut req = minimal_request();
            strip(&mut req);
            let err = req.into_batch().expect_err("must be rejected");
            assert_eq!(err.to_string(), "Missing required fields");
        }
    }

    #[test]
    fn delay_and_jitter_defaults() {
        let batch = minimal_request().into_batch().unwrap();
        assert_eq!(batch.delay_ms, DEFAULT_DELAY_MS);
        assert_eq!(batch.jitter_ms, DEFAULT_JITTER_MS);

        let mut req = minimal_request();
        req.delay_ms = Some(0);
        req.jitter_ms = Some(0);
        let batch = req.into_batch().unwrap();
        assert_eq!(batch.delay_ms, 0);
        assert_eq!(batch.jitter_ms, 0);

        let mut req = minimal_request();
        req.delay_ms = Some(-5);
        req.jitter_ms = Some(-5);
        let batch = req.into_batch().unwrap();
        assert_eq!(batch.delay_ms, DEFAULT_DELAY_MS);
        assert_eq!(batch.jitter_ms, DEFAULT_JITTER_MS);
    }

    #[test]
    fn jittered_wait_stays_in_bounds() {
        for _ in 0..1000 {
            let wait = jittered_wait(100, 250).as_millis() as u64;
            assert!(wait <= 100 + 250, "wait {wait} above bound");
        }
        assert_eq!(jittered_wait(100, 0), Duration::from_millis(100));
        assert_eq!(jittered_wait(0, 0), Duration::ZERO);
    }

    #[test]
    fn request_accepts_camel_case_wire_names() {
        let req: BatchRequest = serde_json::from_str(
            r#"{
                "rows": [{"email": "a@x.com", "name": "Alice"}],
                "mapping": {"recipient": "email", "name": "name"},
                "template": "Hi {{name}}",
                "subjectTemplate": "Welcome",
                "delayMs": 10,
                "jitterMs": 0,
                "systemVariant": "icpep"
            }"#,
        )
        .unwrap();
        assert_eq!(req.subject_template.as_deref(), Some("Welcome"));
        assert_eq!(req.delay_ms, Some(10));
        assert_eq!(req.system_variant.as_deref(), Some("icpep"));
    }
}
