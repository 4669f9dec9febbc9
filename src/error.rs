//! Errors surfaced through the registration API.
//!
//! Lower layers keep their own error enums (`ProtocolError`,
//! `TransportError`, `HandshakeError`, `ConnectError`, `PoolError`,
//! `ConfigError`). This module maps them onto HTTP statuses and the JSON
//! envelope callers see.

use crate::pool::{LeaseToken, PoolError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Response body for every API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<LeaseToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn ok() -> Self {
        Self {
            success: true,
            token: None,
            error: None,
        }
    }

    pub fn with_token(token: LeaseToken) -> Self {
        Self {
            token: Some(token),
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            token: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown token")]
    UnknownToken,

    #[error("upstream connection failed: {0}")]
    Upstream(String),
}

impl ApiError {
    /// Static code for logs and metrics.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::UnknownToken => "unknown_token",
            Self::Upstream(_) => "upstream_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownToken => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        match e {
            e @ PoolError::InvalidIdentity(_) => Self::BadRequest(e.to_string()),
            PoolError::UnknownToken => Self::UnknownToken,
            PoolError::Connect(e) => Self::Upstream(e.to_string()),
            PoolError::Send(e) => Self::Upstream(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::debug!(code = self.error_code(), error = %self, "API request failed");
        (self.status(), Json(Envelope::failure(self.to_string()))).into_response()
    }
}
