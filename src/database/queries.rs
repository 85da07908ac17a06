use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::anchor::batch::{Batch, BatchMetadata};
use crate::database::models::*;
use crate::error::{AnchorError, Result};
use crate::merkle::hash::MerkleHash;
use crate::merkle::proof::ProofRecord;
use crate::merkle::tree::OddNodePolicy;
use crate::record::LogRecord;

pub struct Queries;

impl Queries {
    pub async fn insert_record(
        pool: &SqlitePool,
        record_id: &str,
        document: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO log_records (record_id, document, received_at)
            VALUES (?, ?, ?)
            ON CONFLICT (record_id) DO NOTHING
            "#,
        )
        .bind(record_id)
        .bind(serde_json::to_string(document)?)
        .bind(received_at)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AnchorError::Database(format!(
                "Record {} already exists; records are append-only",
                record_id
            )));
        }

        Ok(result.last_insert_rowid())
    }

    pub async fn get_record(pool: &SqlitePool, record_id: &str) -> Result<Option<StoredRecord>> {
        let row = sqlx::query(
            r#"
            SELECT seq, record_id, document, received_at
            FROM log_records
            WHERE record_id = ?
            "#,
        )
        .bind(record_id)
        .fetch_optional(pool)
        .await?;

        row.map(|row| Self::stored_record_from_row(&row)).transpose()
    }

    /// Most recently ingested records first
    pub async fn fetch_recent_records(pool: &SqlitePool, limit: usize) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, record_id, document, received_at
            FROM log_records
            ORDER BY seq DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        rows.iter().map(Self::stored_record_from_row).collect()
    }

    /// Replace any earlier row for the batch, then write the batch and its proofs
    pub async fn upsert_batch(conn: &mut SqliteConnection, batch: &Batch) -> Result<()> {
        sqlx::query("DELETE FROM batch_proofs WHERE batch_id = ?")
            .bind(&batch.batch_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM anchored_batches WHERE batch_id = ?")
            .bind(&batch.batch_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO anchored_batches
                (batch_id, merkle_root, record_count, tx_ref, block_number,
                 ledger_timestamp, explorer_url, odd_node_policy, anchored_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.batch_id)
        .bind(batch.root.to_hex())
        .bind(batch.record_count() as i64)
        .bind(&batch.receipt.tx_ref)
        .bind(batch.receipt.block_number.map(|n| n as i64))
        .bind(batch.receipt.ledger_timestamp)
        .bind(&batch.receipt.explorer_url)
        .bind(batch.policy.as_str())
        .bind(batch.anchored_at)
        .execute(&mut *conn)
        .await?;

        for (leaf_index, proof) in batch.proofs.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO batch_proofs (batch_id, leaf_index, record_id, leaf_digest, proof)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&batch.batch_id)
            .bind(leaf_index as i64)
            .bind(&proof.record_id)
            .bind(proof.leaf_digest.to_hex())
            .bind(serde_json::to_string(&proof.proof)?)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    pub async fn get_batch(pool: &SqlitePool, batch_id: &str) -> Result<Option<BatchMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT batch_id, merkle_root, record_count, tx_ref, block_number,
                   ledger_timestamp, explorer_url, odd_node_policy, anchored_at
            FROM anchored_batches
            WHERE batch_id = ?
            "#,
        )
        .bind(batch_id)
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => {
                let record_ids = Self::batch_record_ids(pool, batch_id).await?;
                Ok(Some(Self::batch_from_row(&row, record_ids)?))
            }
            None => Ok(None),
        }
    }

    /// Most recently anchored batches first
    pub async fn list_batches(pool: &SqlitePool, limit: usize) -> Result<Vec<BatchMetadata>> {
        let rows = sqlx::query(
            r#"
            SELECT batch_id, merkle_root, record_count, tx_ref, block_number,
                   ledger_timestamp, explorer_url, odd_node_policy, anchored_at
            FROM anchored_batches
            ORDER BY anchored_at DESC, batch_id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        let mut batches = Vec::with_capacity(rows.len());
        for row in rows {
            let batch_id: String = row.try_get("batch_id")?;
            let record_ids = Self::batch_record_ids(pool, &batch_id).await?;
            batches.push(Self::batch_from_row(&row, record_ids)?);
        }

        Ok(batches)
    }

    pub async fn batch_proofs(pool: &SqlitePool, batch_id: &str) -> Result<Vec<ProofRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT record_id, leaf_digest, proof
            FROM batch_proofs
            WHERE batch_id = ?
            ORDER BY leaf_index ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(pool)
        .await?;

        rows.iter().map(Self::proof_from_row).collect()
    }

    /// Proof from the most recent batch containing the record
    pub async fn find_latest_proof(pool: &SqlitePool, record_id: &str) -> Result<Option<StoredProof>> {
        let row = sqlx::query(
            r#"
            SELECT p.batch_id, p.leaf_index, p.record_id, p.leaf_digest, p.proof,
                   b.merkle_root, b.tx_ref, b.anchored_at
            FROM batch_proofs p
            JOIN anchored_batches b ON b.batch_id = p.batch_id
            WHERE p.record_id = ?
            ORDER BY b.anchored_at DESC, p.batch_id DESC
            LIMIT 1
            "#,
        )
        .bind(record_id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let merkle_root: String = row.try_get("merkle_root")?;
        Ok(Some(StoredProof {
            batch_id: row.try_get("batch_id")?,
            leaf_index: row.try_get("leaf_index")?,
            proof: Self::proof_from_row(&row)?,
            merkle_root: MerkleHash::from_hex(&merkle_root)?,
            tx_ref: row.try_get("tx_ref")?,
            anchored_at: row.try_get("anchored_at")?,
        }))
    }

    pub async fn stats(pool: &SqlitePool) -> Result<StoreStats> {
        let total_records: i64 = sqlx::query("SELECT COUNT(*) AS n FROM log_records")
            .fetch_one(pool)
            .await?
            .try_get("n")?;
        let anchored_records: i64 =
            sqlx::query("SELECT COUNT(DISTINCT record_id) AS n FROM batch_proofs")
                .fetch_one(pool)
                .await?
                .try_get("n")?;
        let total_batches: i64 = sqlx::query("SELECT COUNT(*) AS n FROM anchored_batches")
            .fetch_one(pool)
            .await?
            .try_get("n")?;
        let last_anchored_at = sqlx::query(
            "SELECT anchored_at FROM anchored_batches ORDER BY anchored_at DESC LIMIT 1",
        )
        .fetch_optional(pool)
        .await?
        .map(|row| row.try_get::<DateTime<Utc>, _>("anchored_at"))
        .transpose()?;

        Ok(StoreStats {
            total_records,
            anchored_records,
            total_batches,
            last_anchored_at,
        })
    }

    async fn batch_record_ids(pool: &SqlitePool, batch_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT record_id FROM batch_proofs WHERE batch_id = ? ORDER BY leaf_index ASC",
        )
        .bind(batch_id)
        .fetch_all(pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("record_id").map_err(AnchorError::from))
            .collect()
    }

    fn stored_record_from_row(row: &SqliteRow) -> Result<StoredRecord> {
        let record_id: String = row.try_get("record_id")?;
        let document: String = row.try_get("document")?;
        let document: Value = serde_json::from_str(&document)
            .map_err(|e| AnchorError::malformed(&record_id, format!("stored document is not JSON: {}", e)))?;

        let mut record = LogRecord::from_document(document)?;
        record.id = record_id;

        Ok(StoredRecord {
            seq: row.try_get("seq")?,
            record,
            received_at: row.try_get("received_at")?,
        })
    }

    fn proof_from_row(row: &SqliteRow) -> Result<ProofRecord> {
        let leaf_digest: String = row.try_get("leaf_digest")?;
        let proof: String = row.try_get("proof")?;

        Ok(ProofRecord {
            record_id: row.try_get("record_id")?,
            leaf_digest: MerkleHash::from_hex(&leaf_digest)?,
            proof: serde_json::from_str(&proof)?,
        })
    }

    fn batch_from_row(row: &SqliteRow, record_ids: Vec<String>) -> Result<BatchMetadata> {
        let merkle_root: String = row.try_get("merkle_root")?;
        let record_count: i64 = row.try_get("record_count")?;
        let block_number: Option<i64> = row.try_get("block_number")?;
        let policy: String = row.try_get("odd_node_policy")?;

        Ok(BatchMetadata {
            batch_id: row.try_get("batch_id")?,
            merkle_root: MerkleHash::from_hex(&merkle_root)?,
            record_count: record_count as usize,
            record_ids,
            tx_ref: row.try_get("tx_ref")?,
            block_number: block_number.map(|n| n as u64),
            ledger_timestamp: row.try_get("ledger_timestamp")?,
            explorer_url: row.try_get("explorer_url")?,
            odd_node_policy: OddNodePolicy::parse(&policy)?,
            anchored_at: row.try_get("anchored_at")?,
        })
    }
}
