//! HTTP surface: routes and handlers wrapping the dispatch engine, the
//! sender store, the template repository, and admin sessions.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{FromRef, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{self, AdminCredentials, AdminSession, CookieSettings, SessionStore};
use crate::config::{EnvConfig, EnvStatus, SenderEnv, SenderStore, Variant};
use crate::dispatch::{self, BatchReport, BatchRequest};
use crate::templates::TemplateStore;
use crate::Error;

/// Shared state for all handlers.
#[derive(Clone, FromRef)]
pub struct Context {
    pub senders: Arc<SenderStore>,
    pub sessions: SessionStore,
    pub templates: TemplateStore,
    pub admin: AdminCredentials,
    pub cookies: CookieSettings,
}

impl Context {
    pub fn from_env(templates_dir: impl Into<PathBuf>) -> Context {
        Context {
            senders: Arc::new(SenderStore::from_env()),
            sessions: SessionStore::default(),
            templates: TemplateStore::new(templates_dir),
            admin: AdminCredentials::from_env().unwrap_or_default(),
            cookies: CookieSettings::from_env(),
        }
    }
}

pub fn router(ctx: Context) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/env", get(env_status).post(upload_env).delete(clear_env))
        .route("/api/env/variant", post(set_variant))
        .route("/api/templates", get(list_templates))
        .route("/api/templates/:id", get(get_template))
        .route("/api/send", post(send_batch))
        .with_state(ctx)
}

#[derive(Debug, Default, Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

async fn login(
    State(ctx): State<Context>,
    jar: CookieJar,
    Json(body): Json<LoginBody>,
) -> Result<(CookieJar, Json<Value>), Error> {
    ctx.admin.verify(
        body.email.as_deref().unwrap_or(""),
        body.password.as_deref().unwrap_or(""),
    )?;

    let token = ctx.sessions.issue();
    let jar = jar.add(auth::session_cookie(token, ctx.cookies));
    Ok((jar, Json(json!({ "ok": true }))))
}

async fn logout(State(ctx): State<Context>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    if let Some(cookie) = jar.get(auth::AUTH_COOKIE) {
        ctx.sessions.revoke(cookie.value());
    }
    let jar = jar.add(auth::removal_cookie(ctx.cookies));
    (jar, Json(json!({ "ok": true })))
}

#[derive(Debug, Default, Deserialize)]
struct VariantQuery {
    #[serde(default)]
    variant: Option<String>,
}

async fn env_status(
    _session: AdminSession,
    State(ctx): State<Context>,
    Query(query): Query<VariantQuery>,
) -> Json<EnvStatus> {
    Json(ctx.senders.env_status(query.variant.as_deref()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadEnvBody {
    #[serde(default)]
    env_text: Option<String>,
    #[serde(default)]
    profile: Option<String>,
}

async fn upload_env(
    _session: AdminSession,
    State(ctx): State<Context>,
    Json(body): Json<UploadEnvBody>,
) -> Result<Json<Value>, Error> {
    let text = body.env_text.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(Error::EmptyEnvUpload);
    }

    let profile = body
        .profile
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "custom".to_string());

    let env = SenderEnv::from_dotenv_text(&text);
    let stored = env.sender_entries();
    let missing = env.missing_keys();
    ctx.senders.set_profile(&profile, env);

    Ok(Json(json!({
        "ok": missing.is_empty(),
        "stored": stored,
        "missing": missing,
        "profile": profile,
    })))
}

async fn clear_env(_session: AdminSession, State(ctx): State<Context>) -> Json<Value> {
    ctx.senders.clear_profiles();
    Json(json!({ "ok": true }))
}

#[derive(Debug, Default, Deserialize)]
struct VariantBody {
    #[serde(default)]
    variant: Option<String>,
}

async fn set_variant(
    _session: AdminSession,
    State(ctx): State<Context>,
    Json(body): Json<VariantBody>,
) -> Result<Json<Value>, Error> {
    let variant = body
        .variant
        .as_deref()
        .and_then(Variant::parse)
        .ok_or(Error::InvalidVariant)?;

    ctx.senders.set_system_variant(variant);
    Ok(Json(json!({ "ok": true, "variant": variant })))
}

async fn list_templates(_session: AdminSession, State(ctx): State<Context>) -> Json<Vec<String>> {
    Json(ctx.templates.list().await)
}

async fn get_template(
    _session: AdminSession,
    State(ctx): State<Context>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Error> {
    let html = ctx.templates.get(&id).await?;
    Ok(Json(json!({ "ok": true, "html": html })))
}

async fn send_batch(
    _session: AdminSession,
    State(ctx): State<Context>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchReport>, Error> {
    let report = dispatch::run_batch(&ctx.senders, req).await?;
    Ok(Json(report))
}
