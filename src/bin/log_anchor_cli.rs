//! Log Anchoring CLI
//!
//! Operator tool for ingesting records, anchoring batches and verifying
//! records, either against the ledger or offline from exported proof files.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use log_anchor::anchor::{
    ledger_from_config, verify_record_proof, AnchorRequest, BatchAnchorer, ProofArchive, RecordVerifier,
};
use log_anchor::config::AppConfig;
use log_anchor::database::Database;
use log_anchor::merkle::hash::MerkleHash;
use log_anchor::record::LogRecord;
use log_anchor::AnchorError;

#[derive(Parser)]
#[command(name = "log-anchor-cli")]
#[command(about = "Anchor security event log batches and verify records")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $LOG_ANCHOR_CONFIG or log-anchor.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Anchor the most recent records as one batch
    Anchor {
        /// Number of records to include
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Batch identifier (generated when omitted)
        #[arg(long)]
        batch_id: Option<String>,
    },

    /// Verify a stored record against the root on the ledger
    Verify {
        /// Record ID
        record_id: String,
    },

    /// Verify a record from files only, without store or ledger access
    VerifyOffline {
        /// JSON file holding the record document
        #[arg(short, long)]
        record: PathBuf,

        /// Exported `<batch>_proofs.json` file
        #[arg(short, long)]
        proofs: PathBuf,

        /// Root to check against (hex)
        #[arg(long, conflicts_with = "anchor")]
        root: Option<String>,

        /// Exported `<batch>_anchor.json` file to take the root from
        #[arg(long)]
        anchor: Option<PathBuf>,

        /// Record ID to look up in the proofs file (defaults to the record's id)
        #[arg(long)]
        record_id: Option<String>,
    },

    /// List recently anchored batches
    Batches {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Ingest records from a JSON file (one object, an array, or JSON lines)
    Ingest {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        tracing::Level::ERROR
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::VerifyOffline {
            record,
            proofs,
            root,
            anchor,
            record_id,
        } => {
            let verified = verify_offline(record, proofs, root, anchor, record_id, cli.verbose)?;
            if !verified {
                std::process::exit(1);
            }
        }
        command => {
            let config = match &cli.config {
                Some(path) => AppConfig::load_from(Some(path.clone()))?,
                None => AppConfig::load()?,
            };
            config.validate()?;
            run_online(command, config, cli.verbose).await?;
        }
    }

    Ok(())
}

async fn run_online(command: Commands, config: AppConfig, verbose: bool) -> Result<()> {
    let database = Database::new(&config.database_url).await?;
    database.run_migrations().await?;

    match command {
        Commands::Anchor { batch_size, batch_id } => {
            let ledger = ledger_from_config(&config.ledger)?;
            let mut anchorer = BatchAnchorer::new(Arc::new(database.clone()), ledger, config.ledger_timeout())
                .with_max_batch_size(config.batch.max_size);
            if let Some(dir) = &config.proofs.export_dir {
                anchorer = anchorer.with_archive(ProofArchive::new(dir));
            }

            let request = AnchorRequest {
                batch_size: batch_size.unwrap_or(config.batch.default_size),
                batch_id,
            };

            let batch = match anchorer.anchor_next_batch(request).await {
                Ok(batch) => batch,
                Err(AnchorError::PersistenceFailed { batch, reason }) => {
                    warn!("Persisting batch {} failed ({}), retrying once", batch.batch_id, reason);
                    if let Err(e) = anchorer.retry_persistence(&batch).await {
                        error!(
                            "Batch {} is on the ledger (tx {}, root {}) but its proofs are not stored: {}",
                            batch.batch_id, batch.receipt.tx_ref, batch.root, e
                        );
                        std::process::exit(2);
                    }
                    *batch
                }
                Err(e) => return Err(e.into()),
            };

            println!("✓ Anchored batch {}", batch.batch_id);
            println!("  Records:     {}", batch.record_count());
            println!("  Merkle root: {}", batch.root);
            println!("  Transaction: {}", batch.receipt.tx_ref);
            if let Some(url) = &batch.receipt.explorer_url {
                println!("  Explorer:    {}", url);
            }
            if verbose {
                for proof in &batch.proofs {
                    println!("  {} -> {} ({} steps)", proof.record_id, proof.leaf_digest, proof.proof.len());
                }
            }
        }
        Commands::Verify { record_id } => {
            let ledger = ledger_from_config(&config.ledger)?;
            let verifier = RecordVerifier::new(database, ledger);
            let report = verifier.verify_record(&record_id).await?;

            if verbose {
                println!("{}", report.detailed_status());
            } else {
                println!("{}", report.summary());
            }
            if !report.verified {
                std::process::exit(1);
            }
        }
        Commands::Batches { limit } => {
            let batches = database.list_batches(limit).await?;
            if batches.is_empty() {
                println!("No anchored batches");
            }
            for batch in batches {
                println!(
                    "{}  {} records  root {}  tx {}  at {}",
                    batch.batch_id,
                    batch.record_count,
                    batch.merkle_root,
                    batch.tx_ref,
                    batch.anchored_at.to_rfc3339()
                );
            }
        }
        Commands::Ingest { file } => {
            let content = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let documents = parse_documents(&content)?;

            let mut ingested = 0;
            for document in documents {
                let record = LogRecord::from_document(document)?;
                let id = database.insert_record(&record).await?;
                info!("Ingested record {}", id);
                ingested += 1;
            }
            println!("✓ Ingested {} records", ingested);
        }
        Commands::VerifyOffline { .. } => unreachable!("handled before connecting to the store"),
    }

    Ok(())
}

fn parse_documents(content: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Ok(vec![other]),
        Err(_) => content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| format!("Invalid JSON on record line {}", i + 1))
            })
            .collect(),
    }
}

fn verify_offline(
    record_path: PathBuf,
    proofs_path: PathBuf,
    root: Option<String>,
    anchor_path: Option<PathBuf>,
    record_id: Option<String>,
    verbose: bool,
) -> Result<bool> {
    let content = fs::read_to_string(&record_path)
        .with_context(|| format!("Failed to read {}", record_path.display()))?;
    let record = LogRecord::from_document(serde_json::from_str(&content)?)?;

    let claimed_root = match (root, anchor_path) {
        (Some(hex), _) => MerkleHash::from_hex(&hex)?,
        (None, Some(path)) => ProofArchive::load_metadata(&path)?.merkle_root,
        (None, None) => return Err(anyhow!("Either --root or --anchor is required")),
    };

    let record_id = record_id.unwrap_or_else(|| record.id.clone());
    let proofs = ProofArchive::load_proofs(&proofs_path)?;
    let proof = proofs
        .iter()
        .find(|p| p.record_id == record_id)
        .ok_or_else(|| anyhow!("No proof for record {} in {}", record_id, proofs_path.display()))?;

    let report = verify_record_proof(&record, proof, &claimed_root)?;
    if verbose {
        println!("{}", report.detailed_status());
    } else {
        println!("{}", report.summary());
    }

    Ok(report.verified)
}
