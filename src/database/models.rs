use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::merkle::hash::MerkleHash;
use crate::merkle::proof::ProofRecord;
use crate::record::LogRecord;

/// A record as held by the log store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub seq: i64,
    pub record: LogRecord,
    pub received_at: DateTime<Utc>,
}

/// A persisted proof together with the batch facts needed to verify it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProof {
    pub batch_id: String,
    pub leaf_index: i64,
    pub proof: ProofRecord,
    pub merkle_root: MerkleHash,
    pub tx_ref: String,
    pub anchored_at: DateTime<Utc>,
}

/// Counters reported by the status endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: i64,
    pub anchored_records: i64,
    pub total_batches: i64,
    pub last_anchored_at: Option<DateTime<Utc>>,
}
