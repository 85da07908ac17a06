//! Ledger Client
//!
//! Capability interface to the immutable ledger that stores one 32-byte
//! root per batch identifier, plus the HTTP gateway client used in
//! production and an in-process ledger for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{LedgerBackend, LedgerConfig};
use crate::error::{AnchorError, Result};
use crate::merkle::hash::{hash_bytes, MerkleHash};

/// Receipt returned by the ledger for a successful anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    /// Transaction reference (hash) of the anchoring write
    pub tx_ref: String,
    pub block_number: Option<u64>,
    pub ledger_timestamp: DateTime<Utc>,
    pub explorer_url: Option<String>,
}

/// Root stored on the ledger for a batch identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoredRoot {
    pub batch_id: String,
    pub root: MerkleHash,
    pub ledger_timestamp: DateTime<Utc>,
    /// Identity (account / address) that submitted the root
    pub submitter: String,
}

/// The two ledger operations the anchoring core relies on
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Store `root` under `batch_id`.
    ///
    /// A second submission for an existing id fails with
    /// [`AnchorError::DuplicateBatchId`] and never creates a second entry.
    async fn submit_root(&self, batch_id: &str, root: &MerkleHash) -> Result<LedgerReceipt>;

    /// Root previously anchored under `batch_id`, `None` when unknown
    async fn fetch_anchored_root(&self, batch_id: &str) -> Result<Option<AnchoredRoot>>;

    /// Short label for logs and status output
    fn name(&self) -> &str;
}

/// Build the configured ledger client
pub fn ledger_from_config(config: &LedgerConfig) -> Result<Arc<dyn LedgerClient>> {
    match config.backend {
        LedgerBackend::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                AnchorError::Config("ledger.endpoint is required for the http backend".to_string())
            })?;
            let client = HttpLedgerClient::new(
                endpoint,
                config.api_key.as_deref(),
                Duration::from_secs(config.timeout_secs),
            )?
            .with_explorer_url(config.explorer_url.clone());
            Ok(Arc::new(client))
        }
        LedgerBackend::Memory => {
            warn!("Using in-memory ledger; anchors will not survive a restart");
            Ok(Arc::new(
                MemoryLedger::new("memory-ledger").with_explorer_url(config.explorer_url.clone()),
            ))
        }
    }
}

fn explorer_link(base: &Option<String>, tx_ref: &str) -> Option<String> {
    base.as_ref()
        .map(|base| format!("{}/{}", base.trim_end_matches('/'), tx_ref))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    batch_id: &'a str,
    merkle_root: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    transaction_hash: String,
    block_number: Option<u64>,
    /// Unix seconds of the including block
    timestamp: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    merkle_root: String,
    timestamp: i64,
    committer: String,
}

/// Client for an HTTP anchoring gateway in front of the log-anchor contract
pub struct HttpLedgerClient {
    http_client: Client,
    base_url: Url,
    explorer_url: Option<String>,
}

impl HttpLedgerClient {
    /// Create a client for `endpoint`; `request_timeout` bounds each HTTP call
    pub fn new(endpoint: &str, api_key: Option<&str>, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| AnchorError::Config(format!("Invalid ledger endpoint {}: {}", endpoint, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AnchorError::Config(format!("Ledger endpoint cannot be a base URL: {}", endpoint)));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| AnchorError::Config(format!("Invalid ledger API key: {}", e)))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        let http_client = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| AnchorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            explorer_url: None,
        })
    }

    pub fn with_explorer_url(mut self, explorer_url: Option<String>) -> Self {
        self.explorer_url = explorer_url;
        self
    }

    fn anchors_url(&self, batch_id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "v1", "anchors"]);
            if let Some(id) = batch_id {
                segments.push(id);
            }
        }
        url
    }

    async fn error_body(response: reqwest::Response) -> String {
        response.text().await.unwrap_or_default()
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit_root(&self, batch_id: &str, root: &MerkleHash) -> Result<LedgerReceipt> {
        info!("Submitting root {} for batch {}", root, batch_id);

        let request = SubmitRequest {
            batch_id,
            merkle_root: root.to_hex(),
        };

        let response = self
            .http_client
            .post(self.anchors_url(None))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: SubmitResponse = response.json().await?;
            let ledger_timestamp = body
                .timestamp
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .unwrap_or_else(Utc::now);

            debug!("Batch {} anchored in tx {}", batch_id, body.transaction_hash);
            Ok(LedgerReceipt {
                explorer_url: explorer_link(&self.explorer_url, &body.transaction_hash),
                tx_ref: body.transaction_hash,
                block_number: body.block_number,
                ledger_timestamp,
            })
        } else if status == StatusCode::CONFLICT {
            Err(AnchorError::DuplicateBatchId(batch_id.to_string()))
        } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            Err(AnchorError::AnchoringTimedOut(format!(
                "ledger gateway returned {} for batch {}",
                status.as_u16(),
                batch_id
            )))
        } else if status == StatusCode::BAD_GATEWAY || status == StatusCode::SERVICE_UNAVAILABLE {
            let body = Self::error_body(response).await;
            Err(AnchorError::LedgerUnavailable(format!("{}: {}", status.as_u16(), body)))
        } else {
            let body = Self::error_body(response).await;
            Err(AnchorError::AnchoringRejected(format!("{}: {}", status.as_u16(), body)))
        }
    }

    async fn fetch_anchored_root(&self, batch_id: &str) -> Result<Option<AnchoredRoot>> {
        debug!("Fetching anchored root for batch {}", batch_id);

        let response = self
            .http_client
            .get(self.anchors_url(Some(batch_id)))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = Self::error_body(response).await;
            return Err(AnchorError::LedgerUnavailable(format!("{}: {}", status.as_u16(), body)));
        }

        let body: BatchResponse = response.json().await?;
        let root = MerkleHash::from_hex(&body.merkle_root)?;

        // Unset contract storage reads back as a zero root at time zero
        if body.timestamp == 0 && root == MerkleHash::from_bytes([0u8; 32]) {
            return Ok(None);
        }

        let ledger_timestamp = Utc
            .timestamp_opt(body.timestamp, 0)
            .single()
            .ok_or_else(|| AnchorError::LedgerUnavailable(format!("invalid ledger timestamp {}", body.timestamp)))?;

        Ok(Some(AnchoredRoot {
            batch_id: batch_id.to_string(),
            root,
            ledger_timestamp,
            submitter: body.committer,
        }))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// In-process ledger with the same uniqueness rule as the contract
pub struct MemoryLedger {
    submitter: String,
    explorer_url: Option<String>,
    anchors: Mutex<HashMap<String, (AnchoredRoot, LedgerReceipt)>>,
}

impl MemoryLedger {
    pub fn new(submitter: impl Into<String>) -> Self {
        Self {
            submitter: submitter.into(),
            explorer_url: None,
            anchors: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_explorer_url(mut self, explorer_url: Option<String>) -> Self {
        self.explorer_url = explorer_url;
        self
    }

    /// Number of distinct batch ids on the ledger
    pub async fn anchor_count(&self) -> usize {
        self.anchors.lock().await.len()
    }

    pub async fn receipt(&self, batch_id: &str) -> Option<LedgerReceipt> {
        self.anchors
            .lock()
            .await
            .get(batch_id)
            .map(|(_, receipt)| receipt.clone())
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn submit_root(&self, batch_id: &str, root: &MerkleHash) -> Result<LedgerReceipt> {
        let mut anchors = self.anchors.lock().await;
        if anchors.contains_key(batch_id) {
            warn!("Ledger rejected duplicate batch id {}", batch_id);
            return Err(AnchorError::DuplicateBatchId(batch_id.to_string()));
        }

        let block_number = anchors.len() as u64 + 1;
        let mut preimage = Vec::with_capacity(batch_id.len() + 40);
        preimage.extend_from_slice(batch_id.as_bytes());
        preimage.extend_from_slice(root.as_bytes());
        preimage.extend_from_slice(&block_number.to_be_bytes());
        let tx_ref = hash_bytes(&preimage).to_hex();

        let now = Utc::now();
        let receipt = LedgerReceipt {
            explorer_url: explorer_link(&self.explorer_url, &tx_ref),
            tx_ref,
            block_number: Some(block_number),
            ledger_timestamp: now,
        };
        let anchored = AnchoredRoot {
            batch_id: batch_id.to_string(),
            root: *root,
            ledger_timestamp: now,
            submitter: self.submitter.clone(),
        };

        anchors.insert(batch_id.to_string(), (anchored, receipt.clone()));
        info!("Anchored batch {} in memory ledger block {}", batch_id, block_number);
        Ok(receipt)
    }

    async fn fetch_anchored_root(&self, batch_id: &str) -> Result<Option<AnchoredRoot>> {
        Ok(self
            .anchors
            .lock()
            .await
            .get(batch_id)
            .map(|(anchored, _)| anchored.clone()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
