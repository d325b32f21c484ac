//! Per-recipient template rendering.
//!
//! Body and subject templates are rendered with minijinja against a context
//! built from the row's fields plus the derived `name` and `recipient` keys.
//! A template that fails to render is never fatal: the raw template text is
//! used instead, and the degradation is reported so the caller can log it.

use std::collections::HashMap;

use minijinja::{Environment, UndefinedBehavior};

use crate::dispatch::{FieldMapping, Row};

/// Result of rendering one template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Render {
    /// The template rendered cleanly.
    Rendered(String),
    /// Rendering failed; carries the raw template text and the engine error.
    Fallback(String, String),
}

impl Render {
    /// The text to send, regardless of whether rendering succeeded.
    pub fn into_text(self) -> String {
        match self {
            Render::Rendered(text) | Render::Fallback(text, _) => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Render::Fallback(..))
    }
}

/// A fully rendered message body and subject for one recipient.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub body: Render,
    pub subject: Render,
}

fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    // Unknown variables render as empty rather than erroring, matching the
    // behavior recipients' spreadsheets rely on.
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env
}

fn render_str(env: &Environment<'_>, source: &str, ctx: &HashMap<&str, &str>) -> Render {
    match env.render_str(source, ctx) {
        Ok(text) => Render::Rendered(text),
        Err(err) => Render::Fallback(source.to_string(), err.to_string()),
    }
}

/// Render the body and subject for one row.
///
/// Subject precedence: a non-empty subject template wins; otherwise a mapped
/// subject field's literal value; otherwise the empty string.
pub fn render_message(
    body_template: &str,
    subject_template: Option<&str>,
    row: &Row,
    mapping: &FieldMapping,
) -> RenderedMessage {
    let mut ctx: HashMap<&str, &str> = row
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    ctx.insert("name", row.get(&mapping.name).map(String::as_str).unwrap_or(""));
    ctx.insert(
        "recipient",
        row.get(&mapping.recipient).map(String::as_str).unwrap_or(""),
    );

    let env = template_env();
    let body = render_str(&env, body_template, &ctx);

    let subject = match subject_template {
        Some(tpl) if !tpl.is_empty() => render_str(&env, tpl, &ctx),
        _ => {
            let literal = mapping
                .subject
                .as_ref()
                .and_then(|field| row.get(field))
                .filter(|value| !value.is_empty())
                .cloned()
                .unwrap_or_default();
            Render::Rendered(literal)
        }
    };

    RenderedMessage { body, subject }
}
