//! Outgoing message assembly.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use uuid::Uuid;

use super::MailError;
use crate::attachments::AttachmentRecord;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// One rendered message ready for a transport: HTML body plus the recipient's
/// still-encoded attachments. Attachment base64 is decoded here, at the
/// transport boundary, not when the batch request is parsed.
#[derive(Debug)]
pub struct OutgoingEmail<'a> {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: &'a [AttachmentRecord],
}

impl OutgoingEmail<'_> {
    /// Build the lettre message and the Message-ID assigned to it.
    pub(crate) fn build_message(&self) -> Result<(Message, String), MailError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(self.from.clone()))?;
        let to: Mailbox = self
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(self.to.clone()))?;

        let message_id = format!("<{}@{}>", Uuid::new_v4(), from.email.domain());
        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.clone())
            .message_id(Some(message_id.clone()));

        let html = SinglePart::html(self.html.clone());
        let message = if self.attachments.is_empty() {
            builder.singlepart(html)
        } else {
            let mut parts = MultiPart::mixed().singlepart(html);
            for record in self.attachments {
                parts = parts.singlepart(decode_attachment(record)?);
            }
            builder.multipart(parts)
        }
        .map_err(|e| MailError::Build(e.to_string()))?;

        Ok((message, message_id))
    }
}

fn decode_attachment(record: &AttachmentRecord) -> Result<SinglePart, MailError> {
    let bytes = BASE64
        .decode(record.content_base64.trim().as_bytes())
        .map_err(|e| MailError::Attachment {
            filename: record.filename.clone(),
            reason: e.to_string(),
        })?;

    let declared = record
        .content_type
        .as_deref()
        .unwrap_or(FALLBACK_CONTENT_TYPE);
    let content_type = ContentType::parse(declared)
        .or_else(|_| ContentType::parse(FALLBACK_CONTENT_TYPE))
        .map_err(|e| MailError::Build(e.to_string()))?;

    Ok(Attachment::new(record.filename.clone()).body(Body::new(bytes), content_type))
}
