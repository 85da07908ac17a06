pub mod models;
pub mod queries;
pub mod schema;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::anchor::batch::{Batch, BatchMetadata};
use crate::database::models::{StoreStats, StoredProof, StoredRecord};
use crate::database::queries::Queries;
use crate::error::Result;
use crate::merkle::proof::ProofRecord;
use crate::record::LogRecord;

/// The log store operations the anchoring pipeline depends on
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Up to `limit` most recent records, newest first
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<LogRecord>>;

    /// Write batch metadata and every proof atomically.
    ///
    /// Must be idempotent for a given batch id so a failed write can be retried.
    async fn persist_batch_metadata(&self, batch: &Batch) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Database { pool })
    }

    /// Private in-memory database with the schema applied
    pub async fn new_in_memory() -> Result<Self> {
        // Every in-memory connection is its own database; keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        for (name, sql) in schema::MIGRATIONS {
            debug!("Applying migration {}", name);
            sqlx::raw_sql(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Validate and append a record, assigning a UUID when it has no id
    pub async fn insert_record(&self, record: &LogRecord) -> Result<String> {
        record.validate()?;

        let mut record = record.clone();
        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let document = serde_json::to_value(&record)?;
        let seq = Queries::insert_record(&self.pool, &record.id, &document, Utc::now()).await?;
        debug!("Stored record {} at seq {}", record.id, seq);

        Ok(record.id)
    }

    pub async fn get_record(&self, record_id: &str) -> Result<Option<StoredRecord>> {
        Queries::get_record(&self.pool, record_id).await
    }

    pub async fn get_batch(&self, batch_id: &str) -> Result<Option<BatchMetadata>> {
        Queries::get_batch(&self.pool, batch_id).await
    }

    pub async fn list_batches(&self, limit: usize) -> Result<Vec<BatchMetadata>> {
        Queries::list_batches(&self.pool, limit).await
    }

    pub async fn batch_proofs(&self, batch_id: &str) -> Result<Vec<ProofRecord>> {
        Queries::batch_proofs(&self.pool, batch_id).await
    }

    pub async fn find_proof_for_record(&self, record_id: &str) -> Result<Option<StoredProof>> {
        Queries::find_latest_proof(&self.pool, record_id).await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        Queries::stats(&self.pool).await
    }
}

#[async_trait]
impl LogStore for Database {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<LogRecord>> {
        let records = Queries::fetch_recent_records(&self.pool, limit).await?;
        Ok(records.into_iter().map(|stored| stored.record).collect())
    }

    async fn persist_batch_metadata(&self, batch: &Batch) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Queries::upsert_batch(&mut *tx, batch).await?;
        tx.commit().await?;

        info!(
            "Persisted batch {} ({} proofs, root {})",
            batch.batch_id,
            batch.proofs.len(),
            batch.root
        );
        Ok(())
    }
}
