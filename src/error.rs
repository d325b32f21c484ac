use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::mail::MailError;

/// Top-level error type for the service.
///
/// The first two variants are the only failures that abort a batch before any
/// mail is sent; per-recipient delivery failures are recorded inside the
/// batch report and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Sender env vars missing")]
    SenderNotConfigured,

    #[error("Missing email or password")]
    MissingLogin,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Admin credentials not configured")]
    AdminNotConfigured { missing: Vec<&'static str> },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid variant")]
    InvalidVariant,

    #[error("No env content provided")]
    EmptyEnvUpload,

    #[error("Missing template ID")]
    MissingTemplateId,

    #[error("Invalid template ID")]
    InvalidTemplateId,

    #[error("Template not found")]
    TemplateNotFound,

    #[error("Failed to read template file")]
    TemplateRead(#[source] std::io::Error),

    #[error(transparent)]
    Mail(#[from] MailError),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::MissingFields
            | Error::SenderNotConfigured
            | Error::MissingLogin
            | Error::InvalidVariant
            | Error::EmptyEnvUpload
            | Error::MissingTemplateId
            | Error::InvalidTemplateId => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials | Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::TemplateNotFound => StatusCode::NOT_FOUND,
            Error::AdminNotConfigured { .. } | Error::TemplateRead(_) | Error::Mail(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = match &self {
            Error::AdminNotConfigured { missing } => {
                json!({ "ok": false, "error": self.to_string(), "missing": missing })
            }
            _ => json!({ "ok": false, "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
