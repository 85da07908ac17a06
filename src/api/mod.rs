//! HTTP API
//!
//! Thin axum surface over the anchoring pipeline: ingest records, trigger
//! anchoring, list batches and verify individual records.

pub mod routes;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::anchor::{BatchAnchorer, LedgerClient, RecordVerifier};
use crate::config::AppConfig;
use crate::database::Database;
use crate::error::{AnchorError, ErrorKind};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub database: Database,
    pub ledger: Arc<dyn LedgerClient>,
    pub anchorer: Arc<BatchAnchorer>,
    pub verifier: Arc<RecordVerifier>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/status", get(routes::status_endpoint))
        .route("/records", post(routes::ingest_record))
        .route("/records/:record_id/verify", get(routes::verify_record))
        .route("/batches", get(routes::list_batches))
        .route("/batches/anchor", post(routes::anchor_batch))
        .route("/batches/:batch_id", get(routes::get_batch))
        .route("/batches/:batch_id/ledger", get(routes::ledger_root))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).into_inner())
        .with_state(state)
}

/// JSON error body returned by every handler
pub struct ApiError(pub AnchorError);

impl From<AnchorError> for ApiError {
    fn from(err: AnchorError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::EmptyBatch
        | ErrorKind::InvalidLeafIndex
        | ErrorKind::InvalidDigest
        | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NoRecordsAvailable
        | ErrorKind::RecordNotFound
        | ErrorKind::RecordNotAnchored
        | ErrorKind::BatchNotOnLedger
        | ErrorKind::BatchNotFound => StatusCode::NOT_FOUND,
        ErrorKind::MalformedRecord => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::DuplicateBatchId => StatusCode::CONFLICT,
        ErrorKind::AnchoringTimedOut => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::AnchoringRejected => StatusCode::BAD_GATEWAY,
        ErrorKind::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::PersistenceFailed
        | ErrorKind::Archive
        | ErrorKind::Config
        | ErrorKind::Database
        | ErrorKind::Serialization => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let mut body = json!({
            "error": kind.as_str(),
            "message": self.0.to_string(),
            "retry_safe": kind.is_retry_safe(),
        });

        // The root is on the ledger; the caller needs the batch identity to reconcile
        if let AnchorError::PersistenceFailed { batch, .. } = &self.0 {
            body["batch_id"] = json!(batch.batch_id);
            body["merkle_root"] = json!(batch.root);
            body["tx_ref"] = json!(batch.receipt.tx_ref);
        }

        (status_for(kind), Json(body)).into_response()
    }
}
