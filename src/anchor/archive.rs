//! Proof Archive
//!
//! Exports each anchored batch as two JSON files so records can be verified
//! offline, without the store: `<batch_id>_anchor.json` with the batch
//! metadata and `<batch_id>_proofs.json` with one proof record per leaf.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::anchor::batch::{Batch, BatchMetadata};
use crate::error::{AnchorError, Result};
use crate::merkle::proof::ProofRecord;

const ANCHOR_SUFFIX: &str = "_anchor.json";
const PROOFS_SUFFIX: &str = "_proofs.json";

#[derive(Debug, Clone)]
pub struct ProofArchive {
    dir: PathBuf,
}

impl ProofArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn anchor_path(&self, batch_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", batch_id, ANCHOR_SUFFIX))
    }

    pub fn proofs_path(&self, batch_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", batch_id, PROOFS_SUFFIX))
    }

    /// Write both files for `batch`, overwriting earlier exports of the same id
    pub fn write_batch(&self, batch: &Batch) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AnchorError::Archive(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let anchor_path = self.anchor_path(&batch.batch_id);
        let proofs_path = self.proofs_path(&batch.batch_id);

        write_json(&anchor_path, &batch.metadata())?;
        write_json(&proofs_path, &batch.proofs)?;

        debug!(
            "Exported batch {} to {} and {}",
            batch.batch_id,
            anchor_path.display(),
            proofs_path.display()
        );
        Ok((anchor_path, proofs_path))
    }

    pub fn load_metadata(path: &Path) -> Result<BatchMetadata> {
        read_json(path)
    }

    pub fn load_proofs(path: &Path) -> Result<Vec<ProofRecord>> {
        read_json(path)
    }

    /// Scan exported proof files for `record_id`; returns the batch id and proof
    pub fn find_record_proof(&self, record_id: &str) -> Result<Option<(String, ProofRecord)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AnchorError::Archive(format!(
                    "Failed to read {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut proof_files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.ends_with(PROOFS_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        // Later batch ids sort later; prefer the most recent export
        proof_files.sort();

        for path in proof_files.iter().rev() {
            let proofs = Self::load_proofs(path)?;
            if let Some(proof) = proofs.into_iter().find(|p| p.record_id == record_id) {
                let batch_id = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.strip_suffix(PROOFS_SUFFIX))
                    .unwrap_or_default()
                    .to_string();
                return Ok(Some((batch_id, proof)));
            }
        }

        Ok(None)
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)
        .map_err(|e| AnchorError::Archive(format!("Failed to write {}: {}", path.display(), e)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| AnchorError::Archive(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}
