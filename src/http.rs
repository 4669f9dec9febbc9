//! Registration API and Prometheus endpoint.
//!
//! - `POST /register`   `{"config": {...identity...}}` -> `{"success":true,"token":"..."}`
//! - `POST /unregister` `{"token": "..."}` -> `{"success":true}`
//! - `GET /metrics`     Prometheus text format

use crate::error::{ApiError, Envelope};
use crate::pool::{ConnectionPool, LeaseToken};
use crate::upstream::ServerIdentity;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    config: ServerIdentity,
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    #[serde(default)]
    token: String,
}

/// Build the API router over a shared pool.
pub fn router(pool: Arc<ConnectionPool>, metrics: bool) -> Router {
    let mut app = Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister));
    if metrics {
        app = app.route("/metrics", get(metrics_handler));
    }
    app.with_state(pool)
}

/// Serve the API on an already-bound listener until the server fails.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Registration API listening");
    }
    axum::serve(listener, app).await
}

/// Decode a JSON body; failures become 400 envelopes.
fn decode<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, ApiError> {
    Ok(serde_json::from_slice(body)?)
}

async fn register(
    State(pool): State<Arc<ConnectionPool>>,
    body: Bytes,
) -> Result<Json<Envelope>, ApiError> {
    let RegisterRequest { config } = decode(&body)?;
    let token = pool.connect(config).await?;
    Ok(Json(Envelope::with_token(token)))
}

async fn unregister(
    State(pool): State<Arc<ConnectionPool>>,
    body: Bytes,
) -> Result<Json<Envelope>, ApiError> {
    let TokenRequest { token } = decode(&body)?;
    if token.is_empty() {
        return Err(ApiError::BadRequest("missing token".into()));
    }

    pool.unregister(&LeaseToken::from(token))?;
    Ok(Json(Envelope::ok()))
}

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}
