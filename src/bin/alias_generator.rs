//! Standalone maintenance worker: turns unmatched-team log entries into
//! aliases. Run with `--auto-create` to persist high-confidence matches,
//! `--once` for a single pass.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use odds_harvester::alias_generator::AliasGenerator;
use odds_harvester::catalog::IdentityCatalog;
use odds_harvester::store::postgres::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let interval_seconds: u64 = std::env::var("ALIAS_GENERATOR_INTERVAL_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);

    let auto_create = std::env::args().any(|arg| arg == "--auto-create");
    let run_once = std::env::args().any(|arg| arg == "--once");

    info!(
        "Starting alias generator (interval: {}s, auto-create: {})",
        interval_seconds, auto_create
    );

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    let store = Arc::new(PgStore::new(pool));
    let catalog = Arc::new(IdentityCatalog::new());
    let generator = AliasGenerator::new(store, catalog, auto_create);

    if run_once {
        let report = generator.run_once().await?;
        info!(
            "Done: {} processed, {} created, {} suggested",
            report.processed, report.created, report.suggested
        );
        return Ok(());
    }

    loop {
        if let Err(e) = generator.run_once().await {
            error!("Alias generator pass failed: {}", e);
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval_seconds)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down alias generator");
                return Ok(());
            }
        }
    }
}
