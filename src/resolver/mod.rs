pub mod fuzzy;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{self, CatalogSnapshot, IdentityCatalog};
use crate::store::{Store, StoreError};

const MIN_SCORE: f64 = 85.0;
/// Partial matches need a higher bar to avoid substring false positives.
const MIN_SCORE_PARTIAL: f64 = 92.0;
/// Confidence required to reuse a team from another league instead of
/// creating a duplicate during cross-league auto-creation.
const GLOBAL_REUSE_SCORE: f64 = 95.0;
const LEAGUE_MIN_SCORE: f64 = 80.0;

/// Known-bad fuzzy pairs. A candidate is rejected when either direction
/// of the pair applies.
const BLOCKED_MATCHES: &[(&str, &str)] = &[
    ("inter milan", "ac milan"),
    ("internazionale", "ac milan"),
    ("brest", "nottingham forest"),
];

/// Competitions whose entrants come from different domestic leagues;
/// only these permit lookups outside the offer's own league.
const CROSS_LEAGUE_COMPETITIONS: &[&str] = &[
    "fa cup",
    "efl cup",
    "carabao cup",
    "community shield",
    "champions league",
    "europa league",
    "conference league",
    "copa do brasil",
    "copa america",
    "libertadores",
    "sul-americana",
    "supercopa",
    "recopa",
    "coppa italia",
    "supercoppa",
    "dfb pokal",
    "supercup",
    "coupe de france",
    "trophee des champions",
    "copa do rei",
    "supercopa de espana",
    "taca de portugal",
    "supertaca",
    "knvb beker",
    "johan cruijff schaal",
    "world cup",
    "euro",
    "nations league",
];

pub fn is_cross_league_competition(league_name: &str) -> bool {
    let league = league_name.to_lowercase();
    CROSS_LEAGUE_COMPETITIONS
        .iter()
        .any(|comp| league.contains(comp))
}

fn is_blocked(a: &str, b: &str) -> bool {
    BLOCKED_MATCHES.iter().any(|(from, to)| {
        (a == *from && (b.contains(to) || to.contains(b)))
            || (b == *from && (a.contains(to) || to.contains(a)))
    })
}

/// Maps raw bookmaker team names onto canonical team ids.
///
/// Exact alias hits come first, then league-scoped exact and fuzzy
/// lookups, then a cross-league fallback for cup competitions. Fuzzy hits
/// learn an alias so the next resolution of the same name is an exact
/// hit. Only the primary bookmaker may create teams.
pub struct TeamResolver {
    catalog: Arc<IdentityCatalog>,
    store: Arc<dyn Store>,
    primary_bookmaker: String,
    unmatched_logged: DashSet<String>,
}

impl TeamResolver {
    pub fn new(catalog: Arc<IdentityCatalog>, store: Arc<dyn Store>, primary_bookmaker: &str) -> Self {
        Self {
            catalog,
            store,
            primary_bookmaker: primary_bookmaker.trim().to_lowercase(),
            unmatched_logged: DashSet::new(),
        }
    }

    /// Reset per-cycle state. Call at the start of every cycle.
    pub fn begin_cycle(&self) {
        self.unmatched_logged.clear();
    }

    /// Full resolution path, including alias persistence and team
    /// auto-creation for the primary bookmaker. Never fails: an offer
    /// whose name cannot be mapped is dropped by the caller.
    pub async fn resolve(
        &self,
        raw_name: &str,
        bookmaker: &str,
        league_id: Option<Uuid>,
        league_name: Option<&str>,
    ) -> Option<Uuid> {
        if raw_name.trim().is_empty() {
            return None;
        }

        let snapshot = self.catalog.snapshot();
        let normalized = catalog::normalize_key(raw_name);
        let bookmaker_key = bookmaker.trim().to_lowercase();
        let is_primary = bookmaker_key == self.primary_bookmaker;

        if let Some(id) = alias_lookup(&snapshot, raw_name, &normalized, &bookmaker_key) {
            debug!("Exact alias match: {} -> {}", raw_name, id);
            return Some(id);
        }

        if let Some(lid) = league_id {
            if let Some(teams) = snapshot.league_teams(&lid) {
                if let Some(id) = teams.get(&normalized) {
                    return Some(*id);
                }
            }
            if let Some(id) = self.fuzzy_match_in_league(&snapshot, raw_name, &lid) {
                self.learn_alias(id, raw_name, bookmaker, true);
                return Some(id);
            }
        } else if let Some(id) = snapshot.teams_global.get(&normalized) {
            // No league context: exact global lookup only, never fuzzy.
            return Some(*id);
        }

        if let Some(name) = league_name {
            if let Some(id) = self.find_team_cross_league(&snapshot, raw_name, name) {
                self.learn_alias(id, raw_name, bookmaker, true);
                info!("[Cross-league] Found '{}' from another league -> {}", raw_name, id);
                return Some(id);
            }
        }

        if is_primary {
            if let Some(lid) = league_id {
                // For cup competitions, check every league first so a
                // domestic team is reused rather than duplicated.
                if league_name.map(is_cross_league_competition).unwrap_or(false) {
                    if let Some(existing) = self.find_team_global(&snapshot, raw_name) {
                        info!(
                            "[Cross-league] Reusing existing team: '{}' -> {}",
                            raw_name, existing
                        );
                        self.learn_alias(existing, raw_name, bookmaker, true);
                        return Some(existing);
                    }
                }

                info!(
                    "[Auto-create] Attempting to create team: '{}' league={} bookmaker={}",
                    raw_name,
                    league_name.unwrap_or("?"),
                    bookmaker
                );
                if let Some(id) = self.create_team(raw_name.trim(), lid).await {
                    return Some(id);
                }
                warn!("[Auto-create] Failed to create team: '{}'", raw_name);
            }
        }

        self.log_unmatched(raw_name, bookmaker, league_name, is_primary);
        None
    }

    /// Cache-only path for non-primary bookmakers: same lookup chain, no
    /// store writes beyond the best-effort unmatched log. Fuzzy hits are
    /// memoized in the in-memory alias index for the rest of the cycle.
    pub fn resolve_cached(
        &self,
        raw_name: &str,
        bookmaker: &str,
        league_id: Option<Uuid>,
        league_name: Option<&str>,
    ) -> Option<Uuid> {
        if raw_name.trim().is_empty() {
            return None;
        }

        let snapshot = self.catalog.snapshot();
        let normalized = catalog::normalize_key(raw_name);
        let bookmaker_key = bookmaker.trim().to_lowercase();

        if let Some(id) = alias_lookup(&snapshot, raw_name, &normalized, &bookmaker_key) {
            return Some(id);
        }

        if let Some(lid) = league_id {
            if let Some(teams) = snapshot.league_teams(&lid) {
                if let Some(id) = teams.get(&normalized) {
                    return Some(*id);
                }
            }
            if let Some(id) = self.fuzzy_match_in_league(&snapshot, raw_name, &lid) {
                self.learn_alias(id, raw_name, bookmaker, false);
                return Some(id);
            }
        }

        if let Some(name) = league_name {
            if let Some(id) = self.find_team_cross_league(&snapshot, raw_name, name) {
                self.learn_alias(id, raw_name, bookmaker, false);
                return Some(id);
            }
        }

        if league_id.is_none() {
            if let Some(id) = snapshot.teams_global.get(&normalized) {
                return Some(*id);
            }
        }

        self.log_unmatched(raw_name, bookmaker, league_name, false);
        None
    }

    fn fuzzy_match_in_league(
        &self,
        snapshot: &CatalogSnapshot,
        raw_name: &str,
        league_id: &Uuid,
    ) -> Option<Uuid> {
        let league_teams = snapshot.league_teams(league_id)?;

        // The league index holds several keys per team; score each team once.
        let mut seen = HashSet::new();
        let mut candidates: Vec<(Uuid, &str)> = Vec::new();
        for id in league_teams.values() {
            if seen.insert(*id) {
                if let Some(name) = snapshot.teams_by_id.get(id) {
                    candidates.push((*id, name.as_str()));
                }
            }
        }
        if candidates.is_empty() {
            return None;
        }

        let input = catalog::normalize_key(raw_name);
        let input_stripped = catalog::normalize_for_fuzzy(raw_name);

        let mut best: Option<(f64, Uuid, String, &'static str)> = None;
        for (id, name) in &candidates {
            let cand = catalog::normalize_key(name);
            let cand_stripped = catalog::normalize_for_fuzzy(name);

            let scores = [
                (fuzzy::token_sort_ratio(&input, &cand), "token_sort", MIN_SCORE),
                (fuzzy::token_set_ratio(&input, &cand), "token_set", MIN_SCORE),
                (fuzzy::partial_ratio(&input, &cand), "partial", MIN_SCORE_PARTIAL),
                (
                    fuzzy::token_sort_ratio(&input_stripped, &cand_stripped),
                    "token_sort_stripped",
                    MIN_SCORE,
                ),
                (
                    fuzzy::token_set_ratio(&input_stripped, &cand_stripped),
                    "token_set_stripped",
                    MIN_SCORE,
                ),
            ];

            for (score, strategy, threshold) in scores {
                if score >= threshold && best.as_ref().map_or(true, |(b, ..)| score > *b) {
                    best = Some((score, *id, cand.clone(), strategy));
                }
            }
        }

        let (score, id, matched, strategy) = best?;
        if is_blocked(&input, &matched) {
            debug!("Blocked match: '{}' -> '{}'", raw_name, matched);
            return None;
        }

        // Low-confidence matches are worth surfacing in the log.
        if score < 90.0 {
            info!(
                "Fuzzy match in-league ({}): '{}' -> '{}' (score: {:.1})",
                strategy, raw_name, matched, score
            );
        }
        Some(id)
    }

    fn find_team_cross_league(
        &self,
        snapshot: &CatalogSnapshot,
        raw_name: &str,
        league_name: &str,
    ) -> Option<Uuid> {
        if !is_cross_league_competition(league_name) {
            return None;
        }

        let normalized = catalog::normalize_key(raw_name);
        if let Some(id) = snapshot.teams_global.get(&normalized) {
            return Some(*id);
        }
        self.cross_league_fuzzy(snapshot, raw_name)
    }

    fn cross_league_fuzzy(&self, snapshot: &CatalogSnapshot, raw_name: &str) -> Option<Uuid> {
        let input = catalog::normalize_key(raw_name);
        let input_stripped = catalog::normalize_for_fuzzy(raw_name);

        let mut best: Option<(f64, Uuid, String)> = None;
        for (id, name) in &snapshot.teams_by_id {
            let cand = catalog::normalize_key(name);
            let cand_stripped = catalog::normalize_for_fuzzy(name);

            let score = fuzzy::token_sort_ratio(&input, &cand)
                .max(fuzzy::token_set_ratio(&input, &cand))
                .max(fuzzy::token_sort_ratio(&input_stripped, &cand_stripped))
                .max(fuzzy::token_set_ratio(&input_stripped, &cand_stripped));

            if score >= MIN_SCORE && best.as_ref().map_or(true, |(b, ..)| score > *b) {
                best = Some((score, *id, cand.clone()));
            }
        }

        let (score, id, matched) = best?;
        if is_blocked(&input, &matched) {
            debug!("[Cross-league] Blocked match: '{}' -> '{}'", raw_name, matched);
            return None;
        }

        info!(
            "[Cross-league] Fuzzy match: '{}' -> '{}' (score: {:.1})",
            raw_name, matched, score
        );
        Some(id)
    }

    /// Exact or very-high-confidence lookup across every league. Used
    /// before auto-creating a team for a cross-league competition.
    fn find_team_global(&self, snapshot: &CatalogSnapshot, raw_name: &str) -> Option<Uuid> {
        let normalized = catalog::normalize_key(raw_name);
        if let Some(id) = snapshot.teams_global.get(&normalized) {
            return Some(*id);
        }

        let mut best: Option<(f64, Uuid)> = None;
        for (id, name) in &snapshot.teams_by_id {
            let score = fuzzy::token_sort_ratio(&normalized, &catalog::normalize_key(name));
            if score >= GLOBAL_REUSE_SCORE && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, *id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Insert the alias into the in-memory index immediately so repeat
    /// resolutions this cycle are exact hits, then persist it in the
    /// background. A duplicate-key rejection keeps the cache entry; any
    /// other failure evicts it.
    fn learn_alias(&self, team_id: Uuid, raw_name: &str, bookmaker: &str, persist: bool) {
        if !self.catalog.insert_alias(raw_name, bookmaker, team_id) {
            debug!("Alias already exists: '{}' ({})", raw_name, bookmaker);
            return;
        }
        if !persist {
            return;
        }

        let store = Arc::clone(&self.store);
        let catalog = Arc::clone(&self.catalog);
        let alias = raw_name.to_string();
        let source = bookmaker.to_string();
        tokio::spawn(async move {
            match store.create_team_alias(team_id, &alias, &source).await {
                Ok(()) => info!("Created alias: '{}' ({}) -> {}", alias, source, team_id),
                Err(StoreError::Duplicate) => {
                    debug!("Alias already exists in DB: '{}' ({})", alias, source)
                }
                Err(e) => {
                    catalog.remove_alias(&alias, &source);
                    error!("Failed to create alias '{}': {}", alias, e);
                }
            }
        });
    }

    async fn create_team(&self, name: &str, league_id: Uuid) -> Option<Uuid> {
        match self.store.create_team(name, league_id).await {
            Ok(team) => {
                let id = team.id;
                self.catalog.insert_team(&team);
                info!("[Auto-create] Success: '{}' -> {}", name, id);
                Some(id)
            }
            Err(e) => {
                error!("Failed to create team '{}': {}", name, e);
                None
            }
        }
    }

    /// Warn and write to the unmatched-team log, at most once per cycle
    /// per normalized name.
    fn log_unmatched(
        &self,
        raw_name: &str,
        bookmaker: &str,
        league_name: Option<&str>,
        is_primary: bool,
    ) {
        let dedup_key = catalog::normalize_key(raw_name);
        if !self.unmatched_logged.insert(dedup_key) {
            return;
        }

        let mut context = vec![format!("bookmaker={}", bookmaker)];
        if let Some(league) = league_name {
            context.push(format!("league={}", league));
        }
        if is_primary {
            context.push("primary=true".to_string());
        }
        warn!("No match found for: '{}' ({})", raw_name, context.join(", "));

        let store = Arc::clone(&self.store);
        let raw = raw_name.to_string();
        let bookmaker = bookmaker.to_string();
        let league = league_name.map(|s| s.to_string());
        tokio::spawn(async move {
            if let Err(e) = store.log_unmatched_team(&raw, &bookmaker, league.as_deref()).await {
                debug!("Failed to log unmatched team '{}': {}", raw, e);
            }
        });
    }
}

fn alias_lookup(
    snapshot: &CatalogSnapshot,
    raw_name: &str,
    normalized: &str,
    bookmaker_key: &str,
) -> Option<Uuid> {
    for variant in [raw_name.trim().to_lowercase(), normalized.to_string()] {
        if let Some(id) = snapshot.alias_index.get(&(variant, bookmaker_key.to_string())) {
            return Some(*id);
        }
    }
    None
}

/// Exact-then-fuzzy league name matching, token-sort with cutoff 80.
/// Offers for leagues that stay unresolved are intentionally dropped.
pub struct LeagueResolver {
    catalog: Arc<IdentityCatalog>,
}

impl LeagueResolver {
    pub fn new(catalog: Arc<IdentityCatalog>) -> Self {
        Self { catalog }
    }

    pub fn find_league_id(&self, raw_name: &str) -> Option<Uuid> {
        let snapshot = self.catalog.snapshot();
        let key = raw_name.trim().to_lowercase();

        if let Some(id) = snapshot.leagues_by_key.get(&key) {
            return Some(*id);
        }

        let mut best: Option<(f64, Uuid)> = None;
        for (id, name) in &snapshot.leagues_by_id {
            let score = fuzzy::token_sort_ratio(&key, &name.trim().to_lowercase());
            if score >= LEAGUE_MIN_SCORE && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, *id));
            }
        }
        best.map(|(_, id)| id)
    }
}
