use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use site_ledger::api::{self, AppState};
use site_ledger::config::LedgerConfig;
use site_ledger::database::Database;
use site_ledger::ledger::{AuditSweep, ChainVerifier, Ledger};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "site_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting site ledger");

    let config_path = std::env::var_os("SITE_LEDGER_CONFIG").map(PathBuf::from);
    let config = LedgerConfig::load(config_path.as_deref())?;
    info!(
        "Configuration loaded (hash window {}s, verify mode {})",
        config.hash_period_seconds, config.verify_mode
    );

    let database = Database::new(&config.database_url).await?;
    database.run_migrations().await?;
    info!("Database migrations completed");

    let ledger = Ledger::from_config(Arc::new(database.clone()), &config);
    let verifier = ChainVerifier::for_ledger(&ledger, config.verify_mode);

    // Periodic verification sweep
    let sweep = AuditSweep::from_config(&ledger, &config);
    let _sweep_task = sweep.spawn(Duration::from_secs(config.verify_interval_secs));
    info!(
        "Ledger verification sweep started (every {}s)",
        config.verify_interval_secs
    );

    let app = api::router(AppState { ledger, verifier });

    let addr = config.listen_addr();
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    database.close().await;
    Ok(())
}
