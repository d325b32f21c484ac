//! Throttled batch mail dispatch with per-variant sender profiles.
//!
//! The core lives in [`dispatch`]: given recipient rows, a template, and
//! per-recipient attachments, it renders each message, sends through a
//! [`mail`] transport with a one-shot fallback, and reports a per-recipient
//! outcome while pacing sends with a jittered delay. Everything else —
//! sender profiles ([`config`]), the template repository ([`templates`]),
//! admin sessions ([`auth`]), and the HTTP surface ([`http`]) — feeds that
//! loop.

pub mod attachments;
pub mod auth;
pub mod config;
pub mod dispatch;
mod error;
pub mod http;
pub mod mail;
pub mod render;
pub mod serve;
pub mod templates;

pub use error::Error;
