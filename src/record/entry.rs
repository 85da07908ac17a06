//! Security Event Log Record
//!
//! Structured value type for one security event. Only a fixed, ordered
//! subset of fields feeds the leaf digest; everything else rides along in
//! `attributes` and never influences hashing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AnchorError, Result};
use crate::merkle::hash::{hash_bytes, MerkleHash};

/// Security event emitted by the detection backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Store-assigned identifier, never hashed
    #[serde(default, alias = "event_id")]
    pub id: String,
    /// Raw attack payload / request input
    pub payload: String,
    /// Classifier label (e.g. `SQLi`, `XSS`, `benign`)
    pub classification: String,
    /// Classifier confidence score
    pub confidence: f64,
    #[serde(alias = "ip")]
    pub source_ip: String,
    pub endpoint: String,
    /// ISO-8601 timestamp, kept verbatim as emitted
    #[serde(alias = "timestampISO")]
    pub timestamp: String,
    /// Implementation-specific fields outside the hashed subset
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Hashed field subset in its fixed order.
///
/// Struct fields serialize in declaration order, so the JSON object layout
/// is independent of how the source document was built.
#[derive(Serialize)]
struct CanonicalFields<'a> {
    payload: &'a str,
    classification: &'a str,
    confidence: f64,
    ip: &'a str,
    endpoint: &'a str,
    timestamp: &'a str,
}

impl LogRecord {
    pub fn new(
        id: impl Into<String>,
        payload: impl Into<String>,
        classification: impl Into<String>,
        confidence: f64,
        source_ip: impl Into<String>,
        endpoint: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            classification: classification.into(),
            confidence,
            source_ip: source_ip.into(),
            endpoint: endpoint.into(),
            timestamp: timestamp.into(),
            attributes: Map::new(),
        }
    }

    /// Parse an untyped store document; a missing hashed field is `MalformedRecord`
    pub fn from_document(document: Value) -> Result<Self> {
        let record_id = document
            .get("id")
            .or_else(|| document.get("event_id"))
            .and_then(Value::as_str)
            .unwrap_or("<unidentified>")
            .to_string();

        if !document.is_object() {
            return Err(AnchorError::malformed(&record_id, "document is not a JSON object"));
        }

        serde_json::from_value(document).map_err(|e| AnchorError::malformed(&record_id, e.to_string()))
    }

    /// Value checks applied at ingestion and before anchoring.
    ///
    /// Hashing never calls this: a stored record that no longer passes is
    /// still encoded as-is so verification can report the mismatch.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("classification", &self.classification),
            ("source_ip", &self.source_ip),
            ("endpoint", &self.endpoint),
            ("timestamp", &self.timestamp),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AnchorError::malformed(&self.id, format!("field `{}` is empty", name)));
            }
        }

        if !self.confidence.is_finite() {
            return Err(AnchorError::malformed(
                &self.id,
                format!("confidence must be finite, got {}", self.confidence),
            ));
        }

        if !is_iso8601(&self.timestamp) {
            return Err(AnchorError::malformed(
                &self.id,
                format!("timestamp `{}` is not ISO-8601", self.timestamp),
            ));
        }

        Ok(())
    }

    /// Deterministic byte encoding of the hashed field subset
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let fields = CanonicalFields {
            payload: &self.payload,
            classification: &self.classification,
            confidence: self.confidence,
            ip: &self.source_ip,
            endpoint: &self.endpoint,
            timestamp: &self.timestamp,
        };

        serde_json::to_vec(&fields).map_err(|e| AnchorError::malformed(&self.id, e.to_string()))
    }

    /// Leaf digest: SHA-256 of the canonical encoding
    pub fn leaf_digest(&self) -> Result<MerkleHash> {
        Ok(hash_bytes(&self.canonical_bytes()?))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} [{} @ {:.2}] {} -> {}",
            self.id, self.classification, self.confidence, self.source_ip, self.endpoint
        )
    }
}

/// Validate and hash every record in order; the first malformed record aborts the whole set
pub fn hash_records(records: &[LogRecord]) -> Result<Vec<MerkleHash>> {
    records
        .iter()
        .map(|record| {
            record.validate()?;
            record.leaf_digest()
        })
        .collect()
}

const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"];

/// Extended-format ISO-8601 date-times, with or without an offset, or a bare date
fn is_iso8601(value: &str) -> bool {
    let value = value.trim();

    DateTime::parse_from_rfc3339(value).is_ok()
        || OFFSET_FORMATS
            .iter()
            .any(|format| DateTime::parse_from_str(value, format).is_ok())
        || LOCAL_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok())
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}
