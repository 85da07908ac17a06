//! Ledger Anchoring
//!
//! Collects recent log records into batches, commits each batch root to
//! the ledger, persists per-record proofs and verifies records later.

pub mod archive;
pub mod batch;
pub mod client;
pub mod orchestrator;
pub mod verify;

pub use archive::ProofArchive;
pub use batch::{generate_batch_id, Batch, BatchMetadata, BatchState};
pub use client::{ledger_from_config, AnchoredRoot, HttpLedgerClient, LedgerClient, LedgerReceipt, MemoryLedger};
pub use orchestrator::{AnchorRequest, BatchAnchorer, DEFAULT_BATCH_SIZE};
pub use verify::{verify_record_proof, RecordVerifier, VerificationReport};
