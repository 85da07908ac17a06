//! Record Verification
//!
//! Checks that a stored record is unchanged since it was anchored: rehash
//! the record as it is now, replay its stored sibling path, and compare
//! the result with the root read back from the ledger.
//!
//! A mismatch is a normal outcome (`verified = false`), not an error.
//! Errors mean the check could not be carried out at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::anchor::client::LedgerClient;
use crate::database::Database;
use crate::error::{AnchorError, Result};
use crate::merkle::hash::MerkleHash;
use crate::merkle::proof::ProofRecord;
use crate::merkle::verify::recompute_root;
use crate::record::LogRecord;

/// Outcome of verifying one record against one root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub record_id: String,
    pub batch_id: Option<String>,
    pub verified: bool,
    /// Digest of the record as it is now
    pub leaf_digest: MerkleHash,
    /// Digest recorded in the proof at anchoring time
    pub anchored_leaf_digest: MerkleHash,
    pub recomputed_root: MerkleHash,
    /// Root the record was checked against (the on-ledger root when online)
    pub claimed_root: MerkleHash,
    /// Root recorded locally for the batch, when known
    pub stored_root: Option<MerkleHash>,
    pub ledger_timestamp: Option<DateTime<Utc>>,
    pub submitter: Option<String>,
    pub tx_ref: Option<String>,
}

impl VerificationReport {
    /// The record content no longer hashes to the anchored leaf
    pub fn record_modified(&self) -> bool {
        self.leaf_digest != self.anchored_leaf_digest
    }

    /// The locally stored root differs from the one on the ledger
    pub fn stored_root_diverges(&self) -> bool {
        self.stored_root
            .map(|stored| stored != self.claimed_root)
            .unwrap_or(false)
    }

    pub fn summary(&self) -> String {
        if self.verified {
            format!(
                "✅ Record {} verified: recomputed root {} matches anchored root",
                self.record_id, self.recomputed_root
            )
        } else {
            format!(
                "❌ Record {} FAILED verification: recomputed root {} != anchored root {}",
                self.record_id, self.recomputed_root, self.claimed_root
            )
        }
    }

    pub fn detailed_status(&self) -> String {
        let mut lines = vec![self.summary()];

        if let Some(batch_id) = &self.batch_id {
            lines.push(format!("Batch: {}", batch_id));
        }
        lines.push(format!("Current leaf digest:  {}", self.leaf_digest));
        lines.push(format!("Anchored leaf digest: {}", self.anchored_leaf_digest));
        if self.record_modified() {
            lines.push("Record content changed since anchoring".to_string());
        }
        if let Some(stored) = &self.stored_root {
            lines.push(format!("Stored root:          {}", stored));
            if self.stored_root_diverges() {
                lines.push("Stored root differs from the ledger".to_string());
            }
        }
        if let Some(tx_ref) = &self.tx_ref {
            lines.push(format!("Anchor transaction: {}", tx_ref));
        }
        if let Some(timestamp) = &self.ledger_timestamp {
            lines.push(format!("Anchored at: {}", timestamp.to_rfc3339()));
        }
        if let Some(submitter) = &self.submitter {
            lines.push(format!("Submitted by: {}", submitter));
        }

        lines.join("\n")
    }
}

/// Verify a record against a proof and a root with no store or ledger access
pub fn verify_record_proof(
    record: &LogRecord,
    proof: &ProofRecord,
    claimed_root: &MerkleHash,
) -> Result<VerificationReport> {
    let leaf_digest = record.leaf_digest()?;
    let recomputed_root = recompute_root(&leaf_digest, &proof.proof);

    Ok(VerificationReport {
        record_id: proof.record_id.clone(),
        batch_id: None,
        verified: recomputed_root == *claimed_root,
        leaf_digest,
        anchored_leaf_digest: proof.leaf_digest,
        recomputed_root,
        claimed_root: *claimed_root,
        stored_root: None,
        ledger_timestamp: None,
        submitter: None,
        tx_ref: None,
    })
}

/// Verifies stored records against roots on the ledger
pub struct RecordVerifier {
    database: Database,
    ledger: Arc<dyn LedgerClient>,
}

impl RecordVerifier {
    pub fn new(database: Database, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { database, ledger }
    }

    pub async fn verify_record(&self, record_id: &str) -> Result<VerificationReport> {
        info!("Verifying record {}", record_id);

        let stored = self
            .database
            .get_record(record_id)
            .await?
            .ok_or_else(|| AnchorError::RecordNotFound(record_id.to_string()))?;

        let proof = self
            .database
            .find_proof_for_record(record_id)
            .await?
            .ok_or_else(|| AnchorError::RecordNotAnchored(record_id.to_string()))?;

        debug!(
            "Record {} is leaf {} of batch {}",
            record_id, proof.leaf_index, proof.batch_id
        );

        let anchored = self
            .ledger
            .fetch_anchored_root(&proof.batch_id)
            .await?
            .ok_or_else(|| AnchorError::BatchNotOnLedger(proof.batch_id.clone()))?;

        let mut report = verify_record_proof(&stored.record, &proof.proof, &anchored.root)?;
        report.batch_id = Some(proof.batch_id);
        report.stored_root = Some(proof.merkle_root);
        report.ledger_timestamp = Some(anchored.ledger_timestamp);
        report.submitter = Some(anchored.submitter);
        report.tx_ref = Some(proof.tx_ref);

        if report.verified {
            info!("{}", report.summary());
        } else {
            warn!(
                record_modified = report.record_modified(),
                stored_root_diverges = report.stored_root_diverges(),
                "{}",
                report.summary()
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::tree::MerkleTree;

    fn records() -> Vec<LogRecord> {
        (0..5)
            .map(|i| {
                LogRecord::new(
                    format!("evt-{}", i),
                    format!("<img src=x onerror={}>", i),
                    "XSS",
                    0.66,
                    "203.0.113.50",
                    "/profile",
                    "2025-07-04T08:00:00Z",
                )
            })
            .collect()
    }

    #[test]
    fn test_offline_verification_passes() {
        let records = records();
        let tree = MerkleTree::from_records(&records).unwrap();
        let proof = tree.prove(3).unwrap().to_record(&records[3].id);

        let report = verify_record_proof(&records[3], &proof, &tree.root()).unwrap();
        assert!(report.verified);
        assert!(!report.record_modified());
        assert!(report.summary().starts_with("✅"));
    }

    #[test]
    fn test_offline_verification_detects_tampering() {
        let records = records();
        let tree = MerkleTree::from_records(&records).unwrap();
        let proof = tree.prove(1).unwrap().to_record(&records[1].id);

        let mut tampered = records[1].clone();
        tampered.classification = "benign".to_string();

        let report = verify_record_proof(&tampered, &proof, &tree.root()).unwrap();
        assert!(!report.verified);
        assert!(report.record_modified());
        assert_ne!(report.recomputed_root, report.claimed_root);
        assert!(report.detailed_status().contains("changed since anchoring"));
    }

    #[test]
    fn test_offline_verification_against_wrong_root() {
        let records = records();
        let tree = MerkleTree::from_records(&records).unwrap();
        let proof = tree.prove(0).unwrap().to_record(&records[0].id);

        let report = verify_record_proof(&records[0], &proof, &tree.root().with_bit_flipped(0)).unwrap();
        assert!(!report.verified);
        assert!(!report.record_modified());
    }
}
