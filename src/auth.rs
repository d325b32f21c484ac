//! Admin login and cookie sessions.
//!
//! A single admin identity comes from `ADMIN_EMAIL` / `ADMIN_PASSWORD`.
//! Successful logins mint an opaque random token; only its SHA-256 hash is
//! kept server-side, and the token travels in an http-only cookie.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::Error;

pub const AUTH_COOKIE: &str = "mailbatch_session";
const SESSION_MAX_AGE: time::Duration = time::Duration::days(7);

/// Cookie attributes shared by the session and its removal cookie.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    /// Set the `Secure` attribute; off by default for plain-HTTP dev setups.
    pub secure: bool,
}

impl CookieSettings {
    pub fn from_env() -> CookieSettings {
        let secure = std::env::var("COOKIE_SECURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        CookieSettings { secure }
    }
}

/// Admin credentials as configured in the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminCredentials {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AdminCredentials {
    fn configured(&self) -> Result<(&str, &str), Error> {
        let email = self
            .admin_email
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let password = self
            .admin_password
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match (email, password) {
            (Some(email), Some(password)) => Ok((email, password)),
            (email, password) => {
                let mut missing = Vec::new();
                if email.is_none() {
                    missing.push("ADMIN_EMAIL");
                }
                if password.is_none() {
                    missing.push("ADMIN_PASSWORD");
                }
                Err(Error::AdminNotConfigured { missing })
            }
        }
    }

    /// Check a login attempt. Email comparison is case-insensitive; both
    /// sides are trimmed.
    pub fn verify(&self, email: &str, password: &str) -> Result<(), Error> {
        let (admin_email, admin_password) = self.configured()?;

        let email = email.trim();
        let password = password.trim();
        if email.is_empty() || password.is_empty() {
            return Err(Error::MissingLogin);
        }

        if email.to_lowercase() == admin_email.to_lowercase() && password == admin_password {
            Ok(())
        } else {
            Err(Error::InvalidCredentials)
        }
    }
}

/// In-memory set of active session token hashes.
#[derive(Clone, Default)]
pub struct SessionStore {
    tokens: Arc<RwLock<HashSet<String>>>,
}

impl SessionStore {
    /// Mint a new session and return the plaintext token for the cookie.
    pub fn issue(&self) -> String {
        let token = generate_token();
        self.tokens
            .write()
            .expect("session lock")
            .insert(hash_token(&token));
        token
    }

    pub fn verify(&self, token: &str) -> bool {
        self.tokens
            .read()
            .expect("session lock")
            .contains(&hash_token(token))
    }

    pub fn revoke(&self, token: &str) {
        self.tokens
            .write()
            .expect("session lock")
            .remove(&hash_token(token));
    }
}

/// The session cookie for a freshly issued token.
pub fn session_cookie(token: String, settings: CookieSettings) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .max_age(SESSION_MAX_AGE)
        .build()
}

/// An expired cookie that clears the session on the client.
pub fn removal_cookie(settings: CookieSettings) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Extractor proving the request carries a valid admin session.
pub struct AdminSession;

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
    SessionStore: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionStore::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        match jar.get(AUTH_COOKIE) {
            Some(cookie) if sessions.verify(cookie.value()) => Ok(AdminSession),
            _ => Err(Error::Unauthorized),
        }
    }
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
