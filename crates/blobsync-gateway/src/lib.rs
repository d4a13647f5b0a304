#![warn(missing_docs)]

//! blobsync HTTP front door.
//!
//! Accepts direct replication requests of the form
//! `{"s3_bucket": "...", "s3_key": "..."}` and acknowledges them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use blobsync_repl::{normalize, ReplicationRequest};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned when either request field is absent or empty.
pub const MISSING_FIELDS: &str = "Missing s3_bucket or s3_key";

/// Errors surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Body was not valid JSON.
    #[error("{0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Container or key missing from the body.
    #[error("{}", MISSING_FIELDS)]
    MissingFields,
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidJson(_) | GatewayError::MissingFields => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Acknowledgement for an accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Received {
    /// Always `"Received"`.
    pub message: String,
    /// Source container.
    pub bucket: String,
    /// Object key, verbatim.
    pub key: String,
}

/// Shared gateway state.
#[derive(Debug, Default)]
pub struct Gateway {
    received: AtomicU64,
}

impl Gateway {
    /// Create a gateway with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests accepted so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Build the HTTP router.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/v1/replicate", post(replicate_handler))
            .with_state(self)
    }

    /// Bind `addr` and serve until the process exits.
    pub async fn serve(self: Arc<Self>, addr: std::net::SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("gateway listening on {}", addr);

        axum::serve(listener, self.router().into_make_service()).await?;
        Ok(())
    }
}

/// Parse and validate a direct request body.
///
/// Any shape the replication core would reject becomes [`GatewayError::MissingFields`].
pub fn parse_request(body: &[u8]) -> Result<ReplicationRequest, GatewayError> {
    let raw: serde_json::Value = serde_json::from_slice(body)?;
    normalize(&raw).map_err(|e| {
        tracing::debug!(error = %e, "request did not normalize");
        GatewayError::MissingFields
    })
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn replicate_handler(
    State(gateway): State<Arc<Gateway>>,
    body: Bytes,
) -> Result<Json<Received>, GatewayError> {
    let request = parse_request(&body).map_err(|e| {
        tracing::warn!(error = %e, "rejected replication request");
        e
    })?;

    gateway.received.fetch_add(1, Ordering::Relaxed);
    tracing::info!(
        bucket = %request.source_container,
        key = %request.object_key,
        "received replication request"
    );

    Ok(Json(Received {
        message: "Received".to_string(),
        bucket: request.source_container,
        key: request.object_key,
    }))
}
