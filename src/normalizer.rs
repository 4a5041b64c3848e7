use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::IdentityCatalog;
use crate::resolver::{LeagueResolver, TeamResolver};
use crate::store::Store;
use crate::types::{
    BasketballOddsRow, FootballOddsRow, MatchUpsert, RawOffer, Sport,
};

/// Output of one normalization pass: the rows that made it into the
/// store, split by sport. The football rows feed alert detection.
pub struct NormalizedCycle {
    pub football: Vec<FootballOddsRow>,
    pub basketball: Vec<BasketballOddsRow>,
    pub football_inserted: usize,
    pub basketball_inserted: usize,
}

struct PendingOffer {
    offer: RawOffer,
    bookmaker_id: Uuid,
    league_id: Uuid,
    home_team_id: Uuid,
    away_team_id: Uuid,
}

/// Turns raw offers into canonical odds rows: resolves bookmaker, league
/// and team identities, batches fixture upserts per sport, and appends
/// the odds history. Offers that cannot be fully resolved are dropped,
/// never stored with placeholder ids.
pub struct Normalizer {
    catalog: Arc<IdentityCatalog>,
    teams: Arc<TeamResolver>,
    leagues: LeagueResolver,
    store: Arc<dyn Store>,
    primary_bookmaker: String,
}

impl Normalizer {
    pub fn new(
        catalog: Arc<IdentityCatalog>,
        teams: Arc<TeamResolver>,
        leagues: LeagueResolver,
        store: Arc<dyn Store>,
        primary_bookmaker: &str,
    ) -> Self {
        Self {
            catalog,
            teams,
            leagues,
            store,
            primary_bookmaker: primary_bookmaker.trim().to_lowercase(),
        }
    }

    pub async fn normalize_and_insert(&self, offers: Vec<RawOffer>) -> NormalizedCycle {
        let mut cycle = NormalizedCycle {
            football: Vec::new(),
            basketball: Vec::new(),
            football_inserted: 0,
            basketball_inserted: 0,
        };
        if offers.is_empty() {
            return cycle;
        }

        let basketball_pre_count = offers.iter().filter(|o| is_basketball(o)).count();
        if basketball_pre_count > 0 {
            info!(
                "Basketball pre-normalization: {} odds from sources",
                basketball_pre_count
            );
        }

        // Phase 1: per-offer identity resolution off the in-memory caches.
        let snapshot = self.catalog.snapshot();
        let mut football_pre: Vec<PendingOffer> = Vec::new();
        let mut basketball_pre: Vec<PendingOffer> = Vec::new();

        for offer in offers {
            // Odds at or below 1.0 are suspended or mis-parsed outcomes.
            if offer.home_odd <= 1.0
                || offer.away_odd <= 1.0
                || offer.draw_odd.map_or(false, |d| d <= 1.0)
            {
                debug!(
                    "Dropping offer with out-of-range odds from {}",
                    offer.bookmaker_name
                );
                continue;
            }

            let bookmaker_key = offer.bookmaker_name.trim().to_lowercase();
            let Some(bookmaker_id) = snapshot.bookmakers_by_key.get(&bookmaker_key).copied()
            else {
                warn!("Unknown bookmaker: {}", offer.bookmaker_name);
                continue;
            };

            // Unconfigured leagues are intentionally ignored, without log noise.
            let Some(league_id) = self.leagues.find_league_id(&offer.league_raw) else {
                continue;
            };

            let basketball = is_basketball(&offer);

            let (home_team_id, away_team_id) = if bookmaker_key == self.primary_bookmaker {
                let home = self
                    .teams
                    .resolve(
                        &offer.home_team_raw,
                        &offer.bookmaker_name,
                        Some(league_id),
                        Some(&offer.league_raw),
                    )
                    .await;
                let away = self
                    .teams
                    .resolve(
                        &offer.away_team_raw,
                        &offer.bookmaker_name,
                        Some(league_id),
                        Some(&offer.league_raw),
                    )
                    .await;
                (home, away)
            } else {
                (
                    self.teams.resolve_cached(
                        &offer.home_team_raw,
                        &offer.bookmaker_name,
                        Some(league_id),
                        Some(&offer.league_raw),
                    ),
                    self.teams.resolve_cached(
                        &offer.away_team_raw,
                        &offer.bookmaker_name,
                        Some(league_id),
                        Some(&offer.league_raw),
                    ),
                )
            };

            let (Some(home_team_id), Some(away_team_id)) = (home_team_id, away_team_id) else {
                continue;
            };

            let pending = PendingOffer {
                offer,
                bookmaker_id,
                league_id,
                home_team_id,
                away_team_id,
            };
            if basketball {
                basketball_pre.push(pending);
            } else {
                football_pre.push(pending);
            }
        }

        // Phase 2: batched fixture upserts and odds appends, per sport.
        self.process_football(football_pre, &mut cycle).await;
        self.process_basketball(basketball_pre, &mut cycle).await;

        info!("Football normalized: {} odds", cycle.football.len());
        if !cycle.basketball.is_empty() {
            info!("Basketball normalized: {} odds", cycle.basketball.len());
        }

        cycle
    }

    async fn process_football(&self, items: Vec<PendingOffer>, cycle: &mut NormalizedCycle) {
        if items.is_empty() {
            return;
        }

        let requests: Vec<MatchUpsert> = items.iter().map(to_upsert).collect();
        let match_map = match self.store.upsert_football_matches(&requests).await {
            Ok(map) => map,
            Err(e) => {
                error!("Error in batch football match lookup: {}", e);
                return;
            }
        };

        for item in items {
            let key = (item.league_id, item.home_team_id, item.away_team_id);
            let Some(record) = match_map.get(&key) else {
                continue;
            };

            let offer = item.offer;
            cycle.football.push(FootballOddsRow {
                match_id: record.id,
                bookmaker_id: item.bookmaker_id,
                market_type: offer.market_type,
                home_odd: offer.home_odd,
                draw_odd: offer.draw_odd,
                away_odd: offer.away_odd,
                odds_type: offer.odds_type,
                scraped_at: offer.scraped_at,
                extra_data: offer.extra_data,
            });
        }

        match self.store.insert_football_odds(&cycle.football).await {
            Ok(count) => cycle.football_inserted = count,
            Err(e) => error!("Error inserting football odds: {}", e),
        }
    }

    async fn process_basketball(&self, items: Vec<PendingOffer>, cycle: &mut NormalizedCycle) {
        if items.is_empty() {
            return;
        }

        let requests: Vec<MatchUpsert> = items.iter().map(to_upsert).collect();
        let match_map = match self.store.upsert_basketball_matches(&requests).await {
            Ok(map) => map,
            Err(e) => {
                error!("Error in batch basketball match lookup: {}", e);
                return;
            }
        };

        for item in items {
            let key = (item.league_id, item.home_team_id, item.away_team_id);
            let Some(record) = match_map.get(&key) else {
                continue;
            };

            let offer = item.offer;
            let mut home_odd = offer.home_odd;
            let mut away_odd = offer.away_odd;
            let mut extra_data = offer.extra_data;

            // The source listed the pair in the opposite order from the
            // stored record; realign the odds with the stored orientation.
            if record.is_inverted {
                std::mem::swap(&mut home_odd, &mut away_odd);
                extra_data.insert("teams_swapped".to_string(), Value::Bool(true));
                debug!(
                    "Swapped odds for inverted match: {} vs {}",
                    item.home_team_id, item.away_team_id
                );
            }

            cycle.basketball.push(BasketballOddsRow {
                match_id: record.id,
                bookmaker_id: item.bookmaker_id,
                home_odd,
                away_odd,
                odds_type: offer.odds_type,
                scraped_at: offer.scraped_at,
                extra_data,
            });
        }

        match self.store.insert_basketball_odds(&cycle.basketball).await {
            Ok(count) => cycle.basketball_inserted = count,
            Err(e) => error!("Error inserting basketball odds: {}", e),
        }
    }
}

fn is_basketball(offer: &RawOffer) -> bool {
    offer.sport == Sport::Basketball || offer.league_raw.eq_ignore_ascii_case("nba")
}

fn to_upsert(item: &PendingOffer) -> MatchUpsert {
    MatchUpsert {
        league_id: item.league_id,
        home_team_id: item.home_team_id,
        away_team_id: item.away_team_id,
        match_date: item.offer.match_date,
    }
}
