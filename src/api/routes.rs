use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::anchor::AnchorRequest;
use crate::api::{ApiError, AppState};
use crate::error::AnchorError;
use crate::record::LogRecord;

type ApiResult<T> = Result<T, ApiError>;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "log-anchor",
        "timestamp": chrono::Utc::now()
    }))
}

pub async fn status_endpoint(State(state): State<AppState>) -> Json<Value> {
    let mut status = json!({
        "status": "healthy",
        "service": "log-anchor",
        "timestamp": chrono::Utc::now(),
        "ledger": state.ledger.name(),
        "batch": {
            "default_size": state.config.batch.default_size,
            "max_size": state.config.batch.max_size
        },
        "proof_export": state.config.proofs.export_dir.is_some()
    });

    match state.database.stats().await {
        Ok(stats) => {
            status["database"] = json!({
                "status": "healthy",
                "total_records": stats.total_records,
                "anchored_records": stats.anchored_records,
                "total_batches": stats.total_batches,
                "last_anchored_at": stats.last_anchored_at
            });
        }
        Err(e) => {
            error!("Failed to read store stats: {}", e);
            status["database"] = json!({ "status": "error" });
        }
    }

    Json(status)
}

/// Accepts a single record document; unknown fields are kept but never hashed
pub async fn ingest_record(
    State(state): State<AppState>,
    Json(document): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let record = LogRecord::from_document(document)?;
    let leaf_digest = record.leaf_digest()?;
    let record_id = state.database.insert_record(&record).await?;

    info!("Ingested record {}", record_id);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": record_id,
            "leafDigestHex": leaf_digest
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnchorBody {
    pub batch_size: Option<usize>,
    pub batch_id: Option<String>,
}

impl AnchorBody {
    /// An empty body means defaults; anything else must parse exactly
    pub fn parse(body: &[u8]) -> Result<Self, AnchorError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| AnchorError::InvalidRequest(format!("anchor request body: {}", e)))
    }
}

pub async fn anchor_batch(State(state): State<AppState>, body: Bytes) -> ApiResult<(StatusCode, Json<Value>)> {
    let body = AnchorBody::parse(&body)?;
    let request = AnchorRequest {
        batch_size: body.batch_size.unwrap_or(state.config.batch.default_size),
        batch_id: body.batch_id,
    };

    let batch = state.anchorer.anchor_next_batch(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "batchId": batch.batch_id,
            "merkleRoot": batch.root,
            "recordCount": batch.record_count(),
            "recordIds": batch.record_ids(),
            "txRef": batch.receipt.tx_ref,
            "blockNumber": batch.receipt.block_number,
            "ledgerTimestamp": batch.receipt.ledger_timestamp,
            "explorerUrl": batch.receipt.explorer_url,
            "proofs": batch.proofs
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.limit.unwrap_or(10).min(state.config.batch.max_size);
    let batches = state.database.list_batches(limit).await?;
    Ok(Json(json!({ "batches": batches })))
}

pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let metadata = state
        .database
        .get_batch(&batch_id)
        .await?
        .ok_or_else(|| AnchorError::BatchNotFound(batch_id.clone()))?;
    let proofs = state.database.batch_proofs(&batch_id).await?;

    Ok(Json(json!({ "batch": metadata, "proofs": proofs })))
}

/// Root as recorded on the ledger, independent of the local store
pub async fn ledger_root(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let anchored = state
        .ledger
        .fetch_anchored_root(&batch_id)
        .await?
        .ok_or_else(|| AnchorError::BatchNotOnLedger(batch_id.clone()))?;

    Ok(Json(json!(anchored)))
}

pub async fn verify_record(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let report = state.verifier.verify_record(&record_id).await?;
    Ok(Json(json!({
        "report": report,
        "summary": report.summary()
    })))
}
