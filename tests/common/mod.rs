#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log_anchor::anchor::{AnchoredRoot, Batch, LedgerClient, LedgerReceipt};
use log_anchor::database::{Database, LogStore};
use log_anchor::error::{AnchorError, Result};
use log_anchor::merkle::hash::{hash_bytes, MerkleHash};
use log_anchor::record::LogRecord;

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory().await.expect("Failed to create test database")
}

const CLASSIFICATIONS: [&str; 4] = ["SQLi", "XSS", "LFI", "benign"];

/// Deterministic, distinct test record
pub fn sample_record(i: usize) -> LogRecord {
    LogRecord::new(
        format!("evt-{:04}", i),
        format!("payload #{} ' OR '1'='1", i),
        CLASSIFICATIONS[i % CLASSIFICATIONS.len()],
        0.5 + (i % 50) as f64 / 100.0,
        format!("203.0.113.{}", i % 250),
        format!("/api/endpoint/{}", i % 7),
        format!("2025-03-{:02}T10:{:02}:00.000Z", 1 + i % 28, i % 60),
    )
}

pub fn sample_records(count: usize) -> Vec<LogRecord> {
    (0..count).map(sample_record).collect()
}

pub async fn seed_records(db: &Database, count: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for record in sample_records(count) {
        ids.push(db.insert_record(&record).await.expect("Failed to insert record"));
    }
    ids
}

/// Overwrite a stored document in place, bypassing the append-only API
pub async fn tamper_stored_record(db: &Database, record_id: &str, field: &str, value: serde_json::Value) {
    let stored = db.get_record(record_id).await.unwrap().expect("record exists");
    let mut document = serde_json::to_value(&stored.record).unwrap();
    document[field] = value;

    sqlx::query("UPDATE log_records SET document = ? WHERE record_id = ?")
        .bind(serde_json::to_string(&document).unwrap())
        .bind(record_id)
        .execute(db.pool())
        .await
        .unwrap();
}

/// Ledger that never answers within any reasonable timeout
pub struct StalledLedger {
    pub delay: Duration,
}

#[async_trait]
impl LedgerClient for StalledLedger {
    async fn submit_root(&self, _batch_id: &str, _root: &MerkleHash) -> Result<LedgerReceipt> {
        tokio::time::sleep(self.delay).await;
        Err(AnchorError::LedgerUnavailable("stalled".to_string()))
    }

    async fn fetch_anchored_root(&self, _batch_id: &str) -> Result<Option<AnchoredRoot>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// Ledger that rejects every submission
pub struct RejectingLedger;

#[async_trait]
impl LedgerClient for RejectingLedger {
    async fn submit_root(&self, batch_id: &str, _root: &MerkleHash) -> Result<LedgerReceipt> {
        Err(AnchorError::AnchoringRejected(format!("contract reverted for {}", batch_id)))
    }

    async fn fetch_anchored_root(&self, _batch_id: &str) -> Result<Option<AnchoredRoot>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "rejecting"
    }
}

/// Store wrapper that fails the first `failures` persistence attempts
pub struct FlakyStore {
    pub inner: Database,
    pub failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Database, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl LogStore for FlakyStore {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<LogRecord>> {
        self.inner.fetch_recent(limit).await
    }

    async fn persist_batch_metadata(&self, batch: &Batch) -> Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AnchorError::Database("disk I/O error".to_string()));
        }
        self.inner.persist_batch_metadata(batch).await
    }
}

/// Arbitrary but fixed root for ledger-level tests
pub fn some_root(tag: &str) -> MerkleHash {
    hash_bytes(tag.as_bytes())
}
