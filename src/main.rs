use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use log_anchor::anchor::{ledger_from_config, BatchAnchorer, ProofArchive, RecordVerifier};
use log_anchor::api::{self, AppState};
use log_anchor::config::AppConfig;
use log_anchor::database::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "log_anchor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting log anchoring service");

    // Load configuration
    let config = AppConfig::load()?;
    config.validate()?;
    info!("Configuration loaded");

    // Initialize database
    let database = Database::new(&config.database_url).await?;
    info!("Database connected");

    database.run_migrations().await?;
    info!("Database migrations completed");

    let ledger = ledger_from_config(&config.ledger)?;
    info!("Using {} ledger", ledger.name());

    let mut anchorer = BatchAnchorer::new(Arc::new(database.clone()), ledger.clone(), config.ledger_timeout())
        .with_max_batch_size(config.batch.max_size);
    if let Some(dir) = &config.proofs.export_dir {
        info!("Exporting proof files to {}", dir);
        anchorer = anchorer.with_archive(ProofArchive::new(dir));
    }

    let verifier = RecordVerifier::new(database.clone(), ledger.clone());

    let addr: SocketAddr = config.bind_address().parse()?;
    let app = api::router(AppState {
        config,
        database,
        ledger,
        anchorer: Arc::new(anchorer),
        verifier: Arc::new(verifier),
    });

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
