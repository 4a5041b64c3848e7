use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::catalog::{self, CatalogSnapshot, IdentityCatalog};
use crate::resolver::fuzzy;
use crate::store::{Store, StoreError};

/// Auto-create an alias at or above this confidence.
const AUTO_CREATE_THRESHOLD: f64 = 95.0;
/// Log a SQL suggestion at or above this confidence.
const SUGGEST_THRESHOLD: f64 = 80.0;

#[derive(Debug, Default)]
pub struct AliasGenReport {
    pub processed: usize,
    pub created: usize,
    pub suggested: usize,
}

/// Maintenance worker over the unmatched-team log: fuzzy-matches pending
/// raw names against the full catalog, auto-creates high-confidence
/// aliases, and prints ready-to-run SQL for the borderline ones.
pub struct AliasGenerator {
    store: Arc<dyn Store>,
    catalog: Arc<IdentityCatalog>,
    auto_create: bool,
}

impl AliasGenerator {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<IdentityCatalog>, auto_create: bool) -> Self {
        Self {
            store,
            catalog,
            auto_create,
        }
    }

    pub async fn run_once(&self) -> Result<AliasGenReport, StoreError> {
        self.catalog.reload(self.store.as_ref()).await?;

        let unmatched = self.store.fetch_unmatched_teams(100).await?;
        let mut report = AliasGenReport::default();
        if unmatched.is_empty() {
            debug!("No unmatched teams pending");
            return Ok(report);
        }

        info!("Processing {} unmatched teams...", unmatched.len());
        let snapshot = self.catalog.snapshot();

        for entry in unmatched {
            report.processed += 1;

            let Some((team_id, standard_name, score)) =
                find_best_match(&snapshot, &entry.raw_name)
            else {
                debug!("No candidate for '{}'", entry.raw_name);
                continue;
            };

            if self.auto_create && score >= AUTO_CREATE_THRESHOLD {
                match self
                    .store
                    .create_team_alias(team_id, &entry.raw_name, &entry.bookmaker)
                    .await
                {
                    Ok(()) | Err(StoreError::Duplicate) => {
                        if let Err(e) = self.store.resolve_unmatched_team(entry.id, team_id).await {
                            error!("Failed to mark '{}' resolved: {}", entry.raw_name, e);
                            continue;
                        }
                        info!(
                            "Created alias: '{}' ({}) -> '{}' ({:.0}%)",
                            entry.raw_name, entry.bookmaker, standard_name, score
                        );
                        report.created += 1;
                    }
                    Err(e) => error!("Failed to create alias '{}': {}", entry.raw_name, e),
                }
            } else if score >= SUGGEST_THRESHOLD {
                info!(
                    "Suggested alias ({:.0}%): INSERT INTO team_aliases (team_id, alias_name, bookmaker_source) VALUES ('{}', '{}', '{}');",
                    score,
                    team_id,
                    entry.raw_name.replace('\'', "''"),
                    entry.bookmaker.to_lowercase()
                );
                report.suggested += 1;
            }
        }

        info!(
            "Alias generator pass: {} processed, {} created, {} suggested",
            report.processed, report.created, report.suggested
        );
        Ok(report)
    }
}

fn find_best_match(snapshot: &CatalogSnapshot, raw_name: &str) -> Option<(Uuid, String, f64)> {
    let normalized = catalog::normalize_key(raw_name);

    if let Some(id) = snapshot.teams_global.get(&normalized) {
        let name = snapshot.teams_by_id.get(id).cloned().unwrap_or_default();
        return Some((*id, name, 100.0));
    }

    let candidates: Vec<(&Uuid, &String)> = snapshot.teams_by_id.iter().collect();
    let names: Vec<&str> = candidates.iter().map(|(_, name)| name.as_str()).collect();
    let (idx, score) = fuzzy::extract_one(
        &catalog::normalize_name(raw_name),
        names.iter().copied(),
        fuzzy::token_sort_ratio,
        SUGGEST_THRESHOLD,
    )?;

    let (id, name) = candidates[idx];
    Some((*id, name.clone(), score))
}
