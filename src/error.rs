use thiserror::Error;

use crate::anchor::batch::Batch;

impl From<serde_json::Error> for AnchorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for AnchorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(format!("Database error: {}", err))
    }
}

impl From<config::ConfigError> for AnchorError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<reqwest::Error> for AnchorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::AnchoringTimedOut(format!("Ledger request timed out: {}", err))
        } else {
            Self::LedgerUnavailable(format!("Ledger request failed: {}", err))
        }
    }
}

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Cannot build a Merkle tree from an empty batch")]
    EmptyBatch,

    #[error("No log records available to anchor")]
    NoRecordsAvailable,

    #[error("Malformed log record {record_id}: {reason}")]
    MalformedRecord { record_id: String, reason: String },

    #[error("Leaf index {index} out of range for tree of {leaf_count} leaves")]
    InvalidLeafIndex { index: usize, leaf_count: usize },

    #[error("Batch {0} is already anchored or being anchored")]
    DuplicateBatchId(String),

    #[error("Anchoring timed out: {0}")]
    AnchoringTimedOut(String),

    #[error("Ledger rejected anchor: {0}")]
    AnchoringRejected(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Batch {} anchored on ledger (tx {}) but persisting proofs failed: {reason}", .batch.batch_id, .batch.receipt.tx_ref)]
    PersistenceFailed { batch: Box<Batch>, reason: String },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record {0} is not part of any anchored batch")]
    RecordNotAnchored(String),

    #[error("Batch {0} has no root on the ledger")]
    BatchNotOnLedger(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Proof archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, AnchorError>;

/// Copyable discriminant of [`AnchorError`], carried by failed batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyBatch,
    NoRecordsAvailable,
    MalformedRecord,
    InvalidLeafIndex,
    DuplicateBatchId,
    AnchoringTimedOut,
    AnchoringRejected,
    LedgerUnavailable,
    PersistenceFailed,
    RecordNotFound,
    RecordNotAnchored,
    BatchNotOnLedger,
    BatchNotFound,
    InvalidDigest,
    InvalidRequest,
    Archive,
    Config,
    Database,
    Serialization,
}

impl ErrorKind {
    /// Whether re-submitting the same batch id can never double-anchor.
    ///
    /// Timeouts and transport failures are safe because the ledger rejects a
    /// second root under an existing id. A duplicate is a no-op. Rejections
    /// are not retried automatically.
    pub fn is_retry_safe(&self) -> bool {
        matches!(
            self,
            ErrorKind::AnchoringTimedOut | ErrorKind::LedgerUnavailable | ErrorKind::DuplicateBatchId
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EmptyBatch => "empty_batch",
            ErrorKind::NoRecordsAvailable => "no_records_available",
            ErrorKind::MalformedRecord => "malformed_record",
            ErrorKind::InvalidLeafIndex => "invalid_leaf_index",
            ErrorKind::DuplicateBatchId => "duplicate_batch_id",
            ErrorKind::AnchoringTimedOut => "anchoring_timed_out",
            ErrorKind::AnchoringRejected => "anchoring_rejected",
            ErrorKind::LedgerUnavailable => "ledger_unavailable",
            ErrorKind::PersistenceFailed => "persistence_failed",
            ErrorKind::RecordNotFound => "record_not_found",
            ErrorKind::RecordNotAnchored => "record_not_anchored",
            ErrorKind::BatchNotOnLedger => "batch_not_on_ledger",
            ErrorKind::BatchNotFound => "batch_not_found",
            ErrorKind::InvalidDigest => "invalid_digest",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Archive => "archive",
            ErrorKind::Config => "config",
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AnchorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnchorError::EmptyBatch => ErrorKind::EmptyBatch,
            AnchorError::NoRecordsAvailable => ErrorKind::NoRecordsAvailable,
            AnchorError::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            AnchorError::InvalidLeafIndex { .. } => ErrorKind::InvalidLeafIndex,
            AnchorError::DuplicateBatchId(_) => ErrorKind::DuplicateBatchId,
            AnchorError::AnchoringTimedOut(_) => ErrorKind::AnchoringTimedOut,
            AnchorError::AnchoringRejected(_) => ErrorKind::AnchoringRejected,
            AnchorError::LedgerUnavailable(_) => ErrorKind::LedgerUnavailable,
            AnchorError::PersistenceFailed { .. } => ErrorKind::PersistenceFailed,
            AnchorError::RecordNotFound(_) => ErrorKind::RecordNotFound,
            AnchorError::RecordNotAnchored(_) => ErrorKind::RecordNotAnchored,
            AnchorError::BatchNotOnLedger(_) => ErrorKind::BatchNotOnLedger,
            AnchorError::BatchNotFound(_) => ErrorKind::BatchNotFound,
            AnchorError::InvalidDigest(_) => ErrorKind::InvalidDigest,
            AnchorError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AnchorError::Archive(_) => ErrorKind::Archive,
            AnchorError::Config(_) => ErrorKind::Config,
            AnchorError::Database(_) => ErrorKind::Database,
            AnchorError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub fn malformed(record_id: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            record_id: record_id.to_string(),
            reason: reason.into(),
        }
    }
}
