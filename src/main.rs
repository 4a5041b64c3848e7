use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use odds_harvester::config::Config;
use odds_harvester::orchestrator::Orchestrator;
use odds_harvester::sources::ShutdownSignal;
use odds_harvester::store::bucket::BucketStore;
use odds_harvester::store::postgres::PgStore;
use odds_harvester::store::ObjectStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenvy::dotenv().ok();

    info!("🚀 Starting Odds Harvester...");

    let config = Config::from_env();
    info!(
        "📋 Configuration loaded (interval: {}s, primary bookmaker: {})",
        config.scrape_interval_seconds, config.primary_bookmaker
    );

    info!("🔌 Connecting to Postgres...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;
    info!("✅ Connected to Postgres");

    let store = Arc::new(PgStore::new(pool));
    let objects: Arc<dyn ObjectStore> = Arc::new(
        BucketStore::new(
            &config.storage_url,
            &config.storage_bucket,
            &config.storage_service_key,
        )
        .map_err(|e| anyhow::anyhow!("{}", e))?,
    );

    let orchestrator = Orchestrator::new(config.clone(), store, objects);

    // Per-site acquisition adapters register themselves here; the
    // pipeline runs regardless, which is useful for smoke deployments.
    if orchestrator.source_count() == 0 {
        warn!("No sources registered; cycles will collect nothing");
    }

    let (shutdown_tx, shutdown) = ShutdownSignal::new();
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Termination signal received; finishing current cycle...");
        let _ = shutdown_tx.send(true);
    });

    // Health endpoint for process supervision.
    let app = Router::new().route("/health", get(health_check));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                info!("🌐 Health server listening on {}", addr);
                if let Err(e) = axum::serve(listener, app).await {
                    error!("Health server error: {}", e);
                }
            }
            Err(e) => error!("Failed to bind health server on {}: {}", addr, e),
        }
    });

    let run_once = std::env::args().any(|arg| arg == "--once");
    if run_once {
        orchestrator.initialize(&shutdown).await;
        let summary = orchestrator.run_once(&shutdown).await;
        orchestrator.shutdown_sources().await;
        info!(
            "Single run complete: {}",
            serde_json::to_string(&summary).unwrap_or_default()
        );
    } else {
        orchestrator.run_forever(shutdown).await;
    }

    info!("👋 Odds Harvester stopped");
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
