//! Anchored Batch
//!
//! A batch is the ordered set of records committed under one Merkle root and
//! one ledger write. Its order is fixed once the tree is built and is the
//! order proof indices refer to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::anchor::client::LedgerReceipt;
use crate::error::ErrorKind;
use crate::merkle::hash::MerkleHash;
use crate::merkle::proof::ProofRecord;
use crate::merkle::tree::OddNodePolicy;
use crate::record::LogRecord;

/// Lifecycle of one anchoring attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "error")]
pub enum BatchState {
    Collecting,
    Hashing,
    TreeBuilt,
    Anchoring,
    Anchored,
    /// Terminal; carries the kind of the error that stopped the attempt
    Failed(ErrorKind),
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Anchored | BatchState::Failed(_))
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Collecting => write!(f, "collecting"),
            BatchState::Hashing => write!(f, "hashing"),
            BatchState::TreeBuilt => write!(f, "tree_built"),
            BatchState::Anchoring => write!(f, "anchoring"),
            BatchState::Anchored => write!(f, "anchored"),
            BatchState::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}

/// A batch whose root is on the ledger
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_id: String,
    /// Records in leaf order
    pub records: Vec<LogRecord>,
    pub root: MerkleHash,
    /// One proof per record, in leaf order
    pub proofs: Vec<ProofRecord>,
    pub receipt: LedgerReceipt,
    pub policy: OddNodePolicy,
    pub anchored_at: DateTime<Utc>,
}

impl Batch {
    pub fn record_ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn proof_for(&self, record_id: &str) -> Option<&ProofRecord> {
        self.proofs.iter().find(|p| p.record_id == record_id)
    }

    pub fn metadata(&self) -> BatchMetadata {
        BatchMetadata {
            batch_id: self.batch_id.clone(),
            merkle_root: self.root,
            record_count: self.records.len(),
            record_ids: self.record_ids(),
            tx_ref: self.receipt.tx_ref.clone(),
            block_number: self.receipt.block_number,
            ledger_timestamp: self.receipt.ledger_timestamp,
            explorer_url: self.receipt.explorer_url.clone(),
            odd_node_policy: self.policy,
            anchored_at: self.anchored_at,
        }
    }
}

/// Persisted description of an anchored batch, without its proofs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    pub batch_id: String,
    pub merkle_root: MerkleHash,
    pub record_count: usize,
    pub record_ids: Vec<String>,
    pub tx_ref: String,
    pub block_number: Option<u64>,
    pub ledger_timestamp: DateTime<Utc>,
    pub explorer_url: Option<String>,
    pub odd_node_policy: OddNodePolicy,
    pub anchored_at: DateTime<Utc>,
}

/// `batch-<unix millis>-<record count>`
pub fn generate_batch_id(record_count: usize) -> String {
    format!("batch-{}-{}", Utc::now().timestamp_millis(), record_count)
}
