use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::AlertDetector;
use crate::catalog::IdentityCatalog;
use crate::config::Config;
use crate::normalizer::Normalizer;
use crate::publisher::Publisher;
use crate::resolver::{LeagueResolver, TeamResolver};
use crate::sources::{ShutdownSignal, Source};
use crate::store::{ObjectStore, Store};
use crate::types::{CycleSummary, FootballOddsRow, SourceFailure};

/// Drives the collection cycle: reload caches, fan sources out in
/// parallel, normalize, detect alerts, retire started matches, publish.
/// Transient failures never fail a cycle; partial output is carried
/// forward and the cycle proceeds.
pub struct Orchestrator {
    config: Config,
    store: Arc<dyn Store>,
    catalog: Arc<IdentityCatalog>,
    teams: Arc<TeamResolver>,
    normalizer: Normalizer,
    alerts: AlertDetector,
    publisher: Publisher,
    sources: Vec<Arc<dyn Source>>,
}

impl Orchestrator {
    pub fn new(config: Config, store: Arc<dyn Store>, objects: Arc<dyn ObjectStore>) -> Self {
        let catalog = Arc::new(IdentityCatalog::new());
        let teams = Arc::new(TeamResolver::new(
            Arc::clone(&catalog),
            Arc::clone(&store),
            &config.primary_bookmaker,
        ));
        let normalizer = Normalizer::new(
            Arc::clone(&catalog),
            Arc::clone(&teams),
            LeagueResolver::new(Arc::clone(&catalog)),
            Arc::clone(&store),
            &config.primary_bookmaker,
        );
        let alerts = AlertDetector::new(
            Arc::clone(&store),
            config.arbitrage_threshold,
            config.value_bet_threshold,
        );
        let publisher = Publisher::new(Arc::clone(&store), objects, &config.odds_json_path);

        Self {
            config,
            store,
            catalog,
            teams,
            normalizer,
            alerts,
            publisher,
            sources: Vec::new(),
        }
    }

    pub fn register_source(&mut self, source: Arc<dyn Source>) {
        info!("Registered source: {}", source.name());
        self.sources.push(source);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub async fn initialize(&self, shutdown: &ShutdownSignal) {
        info!("Initializing orchestrator...");

        if let Err(e) = self.catalog.reload(self.store.as_ref()).await {
            error!("Failed to load catalog: {}", e);
        }

        for source in &self.sources {
            if let Err(e) = source.setup(shutdown).await {
                error!("Setup failed for source {}: {}", source.name(), e);
            }
        }

        info!("Initialized with {} sources", self.sources.len());
    }

    /// Execute a single collection cycle and return its summary. Never
    /// panics or errors out; everything recoverable is in `errors`.
    pub async fn run_once(&self, shutdown: &ShutdownSignal) -> CycleSummary {
        let started_at = Utc::now();
        let mut summary = CycleSummary::new(started_at);
        summary.sources_run = self.sources.len();

        info!("Starting collection cycle...");
        self.teams.begin_cycle();

        // A failed reload keeps the previous snapshot; with no snapshot at
        // all the cycle yields zero work.
        if let Err(e) = self.catalog.reload(self.store.as_ref()).await {
            error!("Failed to reload caches: {}", e);
        }
        if !self.catalog.is_loaded() {
            warn!("No catalog snapshot available; skipping cycle");
            summary.duration_seconds = elapsed_seconds(started_at);
            return summary;
        }

        let offers = self.collect_all(shutdown, &mut summary).await;
        summary.sources_failed = summary.errors.len();
        summary.odds_collected = offers.len();

        let normalized = self.normalizer.normalize_and_insert(offers).await;
        summary.football_inserted = normalized.football_inserted;
        summary.basketball_inserted = normalized.basketball_inserted;

        if !normalized.football.is_empty() {
            let grouped = group_by_match(&normalized.football);
            summary.alerts_created = self.alerts.check_for_alerts(&grouped).await;
        }

        summary.matches_cleaned = self.cleanup_started_matches().await;
        summary.json_uploaded = self.publisher.generate_and_upload().await;

        summary.duration_seconds = elapsed_seconds(started_at);
        info!(
            "Cycle complete: {} odds inserted, {} alerts created, {} matches cleaned, JSON uploaded: {} in {:.2}s",
            summary.football_inserted + summary.basketball_inserted,
            summary.alerts_created,
            summary.matches_cleaned,
            summary.json_uploaded,
            summary.duration_seconds
        );

        summary
    }

    /// One task per source; individual failures (including cancellation)
    /// are recoverable and reported in the summary.
    async fn collect_all(
        &self,
        shutdown: &ShutdownSignal,
        summary: &mut CycleSummary,
    ) -> Vec<crate::types::RawOffer> {
        let mut handles = Vec::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let signal = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let name = source.name().to_string();
                (name, source.collect(signal).await)
            }));
        }

        let mut offers = Vec::new();
        for outcome in join_all(handles).await {
            match outcome {
                Ok((name, Ok(collected))) => {
                    info!("{}: collected {} odds", name, collected.len());
                    offers.extend(collected);
                }
                Ok((name, Err(e))) => {
                    error!("Source {} failed: {}", name, e);
                    summary.errors.push(SourceFailure {
                        source: name,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    error!("Source task aborted: {}", e);
                    summary.errors.push(SourceFailure {
                        source: "unknown".to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        offers
    }

    async fn cleanup_started_matches(&self) -> u64 {
        let mut cleaned = 0;

        match self.store.retire_started_football_matches().await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleaned up {} old football matches", count);
                }
                cleaned += count;
            }
            Err(e) => warn!("Failed to cleanup old football matches: {}", e),
        }

        match self.store.retire_started_basketball_matches().await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleaned up {} old basketball matches", count);
                }
                cleaned += count;
            }
            Err(e) => warn!("Failed to cleanup old basketball matches: {}", e),
        }

        cleaned
    }

    /// Continuous operation: the interval is measured from cycle
    /// completion, not a fixed tick.
    pub async fn run_forever(&self, mut shutdown: ShutdownSignal) {
        let interval = Duration::from_secs(self.config.scrape_interval_seconds);
        info!(
            "Starting continuous collection (interval: {}s)",
            self.config.scrape_interval_seconds
        );

        self.initialize(&shutdown).await;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let summary = self.run_once(&shutdown).await;
            if let Ok(json) = serde_json::to_string(&summary) {
                debug!("Cycle summary: {}", json);
            }

            if shutdown.is_cancelled() {
                break;
            }

            info!("Sleeping for {} seconds...", interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Shutting down; tearing down sources...");
        self.shutdown_sources().await;
    }

    pub async fn shutdown_sources(&self) {
        for source in &self.sources {
            if let Err(e) = source.teardown().await {
                warn!("Teardown failed for source {}: {}", source.name(), e);
            }
        }
    }
}

pub fn group_by_match(rows: &[FootballOddsRow]) -> HashMap<Uuid, Vec<&FootballOddsRow>> {
    let mut grouped: HashMap<Uuid, Vec<&FootballOddsRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.match_id).or_default().push(row);
    }
    grouped
}

fn elapsed_seconds(started_at: chrono::DateTime<Utc>) -> f64 {
    (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0
}
