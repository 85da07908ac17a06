//! Batch Anchoring Orchestrator
//!
//! Drives one batch through `Collecting -> Hashing -> TreeBuilt ->
//! Anchoring -> Anchored`, or into `Failed` carrying the error kind.
//!
//! Proofs are only persisted after the ledger confirms the root, so a
//! proof in the store always refers to a root that exists on the ledger.
//! The reverse can break: if persisting fails after a confirmed anchor the
//! ledger holds a root the store does not know about. That case is
//! reported as [`AnchorError::PersistenceFailed`] with the full batch
//! attached, so the caller can retry the write with
//! [`BatchAnchorer::retry_persistence`] instead of anchoring again.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::anchor::archive::ProofArchive;
use crate::anchor::batch::{generate_batch_id, Batch, BatchState};
use crate::anchor::client::LedgerClient;
use crate::database::LogStore;
use crate::error::{AnchorError, Result};
use crate::merkle::proof::ProofRecord;
use crate::merkle::tree::MerkleTree;
use crate::record::{hash_records, LogRecord};

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Parameters for one anchoring run
#[derive(Debug, Clone)]
pub struct AnchorRequest {
    pub batch_size: usize,
    /// Caller-chosen id; generated as `batch-<millis>-<count>` when absent
    pub batch_id: Option<String>,
}

impl Default for AnchorRequest {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_id: None,
        }
    }
}

/// Label used in state logs until a generated batch id is known
const PENDING_BATCH_ID: &str = "pending";

/// Tracks and logs the state of one anchoring attempt
struct BatchRun {
    batch_id: String,
    state: BatchState,
}

impl BatchRun {
    fn new(batch_id: &str) -> Self {
        debug!(batch_id, state = %BatchState::Collecting, "Batch state");
        Self {
            batch_id: batch_id.to_string(),
            state: BatchState::Collecting,
        }
    }

    fn assign_id(&mut self, batch_id: &str) {
        debug!(from = %self.batch_id, to = batch_id, "Batch id assigned");
        self.batch_id = batch_id.to_string();
    }

    fn advance(&mut self, next: BatchState) {
        debug!(batch_id = %self.batch_id, from = %self.state, to = %next, "Batch state");
        self.state = next;
    }

    /// Move to `Failed` and hand the error back
    fn fail(&mut self, err: AnchorError) -> AnchorError {
        let next = BatchState::Failed(err.kind());
        warn!(
            batch_id = %self.batch_id,
            from = %self.state,
            to = %next,
            retry_safe = err.kind().is_retry_safe(),
            "Batch anchoring failed: {}",
            err
        );
        self.state = next;
        err
    }
}

/// Removes a batch id from the in-flight set when dropped
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    batch_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.batch_id);
    }
}

pub struct BatchAnchorer {
    store: Arc<dyn LogStore>,
    ledger: Arc<dyn LedgerClient>,
    archive: Option<ProofArchive>,
    ledger_timeout: Duration,
    max_batch_size: usize,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl BatchAnchorer {
    pub fn new(store: Arc<dyn LogStore>, ledger: Arc<dyn LedgerClient>, ledger_timeout: Duration) -> Self {
        Self {
            store,
            ledger,
            archive: None,
            ledger_timeout,
            max_batch_size: 1000,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Also export proof files for every anchored batch
    pub fn with_archive(mut self, archive: ProofArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Anchor the most recent `request.batch_size` records as one batch
    pub async fn anchor_next_batch(&self, request: AnchorRequest) -> Result<Batch> {
        let mut run = BatchRun::new(request.batch_id.as_deref().unwrap_or(PENDING_BATCH_ID));
        if request.batch_size == 0 {
            return Err(run.fail(AnchorError::EmptyBatch));
        }

        let batch_size = if request.batch_size > self.max_batch_size {
            warn!(
                "Requested batch size {} exceeds maximum {}, clamping",
                request.batch_size, self.max_batch_size
            );
            self.max_batch_size
        } else {
            request.batch_size
        };

        let claimed = match &request.batch_id {
            Some(batch_id) => Some(self.claim(batch_id).map_err(|e| run.fail(e))?),
            None => None,
        };

        info!(batch_id = %run.batch_id, "Collecting up to {} records for anchoring", batch_size);
        let records = match self.store.fetch_recent(batch_size).await {
            Ok(records) => records,
            Err(e) => return Err(run.fail(e)),
        };
        if records.is_empty() {
            return Err(run.fail(AnchorError::NoRecordsAvailable));
        }

        let batch_id = match request.batch_id {
            Some(batch_id) => batch_id,
            None => {
                let batch_id = generate_batch_id(records.len());
                run.assign_id(&batch_id);
                batch_id
            }
        };
        let _guard = match claimed {
            Some(guard) => guard,
            None => self.claim(&batch_id).map_err(|e| run.fail(e))?,
        };

        self.run_batch(run, &batch_id, records).await
    }

    /// Anchor an already collected, ordered record set under `batch_id`
    pub async fn anchor_records(&self, batch_id: &str, records: Vec<LogRecord>) -> Result<Batch> {
        let mut run = BatchRun::new(batch_id);
        let _guard = self.claim(batch_id).map_err(|e| run.fail(e))?;
        self.run_batch(run, batch_id, records).await
    }

    /// Hashing through persistence; the caller holds the in-flight claim
    async fn run_batch(&self, mut run: BatchRun, batch_id: &str, records: Vec<LogRecord>) -> Result<Batch> {
        if records.is_empty() {
            return Err(run.fail(AnchorError::EmptyBatch));
        }

        run.advance(BatchState::Hashing);
        let leaves = match hash_records(&records) {
            Ok(leaves) => leaves,
            Err(e) => return Err(run.fail(e)),
        };

        let tree = match MerkleTree::build(&leaves) {
            Ok(tree) => tree,
            Err(e) => {
                error!(batch_id, "Tree construction failed on non-empty input: {}", e);
                return Err(run.fail(e));
            }
        };
        let proofs: Vec<ProofRecord> = match tree.prove_all() {
            Ok(proofs) => proofs
                .iter()
                .zip(&records)
                .map(|(proof, record)| proof.to_record(&record.id))
                .collect(),
            Err(e) => return Err(run.fail(e)),
        };
        run.advance(BatchState::TreeBuilt);

        let root = tree.root();
        info!(
            batch_id,
            records = records.len(),
            depth = tree.depth(),
            "Built Merkle root {}",
            root
        );

        run.advance(BatchState::Anchoring);
        let receipt = match tokio::time::timeout(self.ledger_timeout, self.ledger.submit_root(batch_id, &root)).await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => return Err(run.fail(e)),
            Err(_) => {
                return Err(run.fail(AnchorError::AnchoringTimedOut(format!(
                    "no ledger confirmation for batch {} within {:?}",
                    batch_id, self.ledger_timeout
                ))))
            }
        };
        run.advance(BatchState::Anchored);

        info!(
            batch_id,
            tx_ref = %receipt.tx_ref,
            block_number = ?receipt.block_number,
            "Batch root anchored on {} ledger",
            self.ledger.name()
        );

        let batch = Batch {
            batch_id: batch_id.to_string(),
            records,
            root,
            proofs,
            receipt,
            policy: tree.policy(),
            anchored_at: Utc::now(),
        };

        if let Err(e) = self.persist(&batch).await {
            error!(
                alert = "ledger_local_divergence",
                batch_id,
                tx_ref = %batch.receipt.tx_ref,
                root = %batch.root,
                "Root anchored on ledger but proofs were not persisted: {}",
                e
            );
            return Err(AnchorError::PersistenceFailed {
                reason: e.to_string(),
                batch: Box::new(batch),
            });
        }

        Ok(batch)
    }

    /// Write the proofs of an already anchored batch again, without touching the ledger
    pub async fn retry_persistence(&self, batch: &Batch) -> Result<()> {
        info!(
            batch_id = %batch.batch_id,
            tx_ref = %batch.receipt.tx_ref,
            "Retrying proof persistence"
        );
        self.persist(batch).await
    }

    async fn persist(&self, batch: &Batch) -> Result<()> {
        self.store.persist_batch_metadata(batch).await?;
        if let Some(archive) = &self.archive {
            archive.write_batch(batch)?;
        }
        Ok(())
    }

    fn claim(&self, batch_id: &str) -> Result<InFlightGuard> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(batch_id.to_string()) {
            warn!("Batch {} is already being anchored", batch_id);
            return Err(AnchorError::DuplicateBatchId(batch_id.to_string()));
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            batch_id: batch_id.to_string(),
        })
    }
}
