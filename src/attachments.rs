//! Attachment bundles keyed by normalized recipient name.
//!
//! Uploaded attachments arrive grouped by a canonical form of the recipient's
//! display name, so "  Alice  " and "alice" resolve to the same bucket.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dispatch::{FieldMapping, Row};

/// A single attachment as it travels over the wire: base64 content with an
/// optional declared content type. Decoding happens at the transport boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    pub filename: String,
    pub content_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Mapping from normalized name key to that recipient's attachments.
pub type AttachmentMap = HashMap<String, Vec<AttachmentRecord>>;

/// Canonicalize a display name into a bucket key: trimmed, lowercased, inner
/// whitespace collapsed to single spaces.
pub fn normalize_name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Look up the attachments for a row. Returns an empty slice when the row has
/// no usable name or no bundle matches; never errors.
pub fn for_row<'a>(
    row: &Row,
    mapping: &FieldMapping,
    attachments: Option<&'a AttachmentMap>,
) -> &'a [AttachmentRecord] {
    let name = row.get(&mapping.name).map(String::as_str).unwrap_or("");
    let key = normalize_name_key(name);
    if key.is_empty() {
        return &[];
    }
    attachments
        .and_then(|map| map.get(&key))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
