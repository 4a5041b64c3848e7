//! In-memory store, object store and source fakes for pipeline tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Map;
use uuid::Uuid;

use odds_harvester::sources::{parse, ShutdownSignal, Source, SourceError};
use odds_harvester::store::{ObjectStore, ObjectStoreError, Store, StoreError};
use odds_harvester::types::{
    AlertRow, BasketballOddsRow, Bookmaker, ComparisonRow, FootballOddsRow, League, MatchKey,
    MatchRecord, MatchUpsert, OddsType, RawOffer, Sport, Team, TeamAlias, UnmatchedTeam,
};

#[derive(Default)]
pub struct MemoryState {
    pub teams: Vec<Team>,
    pub aliases: Vec<TeamAlias>,
    pub leagues: Vec<League>,
    pub bookmakers: Vec<Bookmaker>,
    pub football_matches: Vec<MatchRecord>,
    pub basketball_matches: Vec<MatchRecord>,
    pub football_odds: Vec<FootballOddsRow>,
    pub basketball_odds: Vec<BasketballOddsRow>,
    pub alerts: Vec<AlertRow>,
    pub unmatched: Vec<UnmatchedTeam>,
    pub unmatched_resolved: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_league(&self, name: &str, country: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().leagues.push(League {
            id,
            name: name.to_string(),
            country: country.map(|c| c.to_string()),
            status: "active".to_string(),
        });
        id
    }

    pub fn add_bookmaker(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().bookmakers.push(Bookmaker {
            id,
            name: name.to_string(),
            status: "active".to_string(),
        });
        id
    }

    pub fn add_team(&self, name: &str, league_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().teams.push(Team {
            id,
            standard_name: name.to_string(),
            league_id,
            logo_url: None,
        });
        id
    }

    pub fn add_alias(&self, team_id: Uuid, alias_name: &str, bookmaker_source: &str) {
        self.state.lock().aliases.push(TeamAlias {
            team_id,
            alias_name: alias_name.to_string(),
            bookmaker_source: bookmaker_source.to_string(),
        });
    }

    fn upsert_matches(
        matches: &mut Vec<MatchRecord>,
        requests: &[MatchUpsert],
        allow_inversion: bool,
    ) -> HashMap<MatchKey, MatchRecord> {
        let mut result: HashMap<MatchKey, MatchRecord> = HashMap::new();
        if requests.is_empty() {
            return result;
        }

        let mut window_min = requests[0].match_date;
        let mut window_max = requests[0].match_date;
        for request in requests {
            window_min = window_min.min(request.match_date);
            window_max = window_max.max(request.match_date);
        }
        let window_min = window_min - Duration::days(1);
        let window_max = window_max + Duration::days(1);
        let in_window =
            |m: &MatchRecord| m.match_date >= window_min && m.match_date <= window_max;

        for request in requests {
            let key = request.key();
            if result.contains_key(&key) {
                continue;
            }

            if let Some(found) = matches.iter().find(|m| {
                in_window(m) && (m.league_id, m.home_team_id, m.away_team_id) == key
            }) {
                result.insert(key, found.clone());
                continue;
            }

            if allow_inversion {
                if let Some(found) = matches.iter().find(|m| {
                    in_window(m) && (m.league_id, m.away_team_id, m.home_team_id) == key
                }) {
                    let mut inverted = found.clone();
                    inverted.is_inverted = true;
                    result.insert(key, inverted);
                    continue;
                }
            }

            let record = MatchRecord {
                id: Uuid::new_v4(),
                league_id: request.league_id,
                home_team_id: request.home_team_id,
                away_team_id: request.away_team_id,
                match_date: request.match_date,
                status: "scheduled".to_string(),
                is_inverted: false,
            };
            matches.push(record.clone());
            result.insert(key, record);
        }

        result
    }

    fn comparison_rows(state: &MemoryState, sport: Sport) -> Vec<ComparisonRow> {
        let (matches, odds): (&Vec<MatchRecord>, Vec<(Uuid, Uuid, f64, Option<f64>, f64, OddsType, DateTime<Utc>, Map<String, serde_json::Value>)>) =
            match sport {
                Sport::Football => (
                    &state.football_matches,
                    state
                        .football_odds
                        .iter()
                        .map(|o| {
                            (
                                o.match_id,
                                o.bookmaker_id,
                                o.home_odd,
                                o.draw_odd,
                                o.away_odd,
                                o.odds_type,
                                o.scraped_at,
                                o.extra_data.clone(),
                            )
                        })
                        .collect(),
                ),
                Sport::Basketball => (
                    &state.basketball_matches,
                    state
                        .basketball_odds
                        .iter()
                        .map(|o| {
                            (
                                o.match_id,
                                o.bookmaker_id,
                                o.home_odd,
                                None,
                                o.away_odd,
                                o.odds_type,
                                o.scraped_at,
                                o.extra_data.clone(),
                            )
                        })
                        .collect(),
                ),
            };

        let now = Utc::now();
        let mut rows = Vec::new();
        for (match_id, bookmaker_id, home_odd, draw_odd, away_odd, odds_type, scraped_at, extra) in
            odds
        {
            let Some(record) = matches.iter().find(|m| m.id == match_id) else {
                continue;
            };
            let home = state.teams.iter().find(|t| t.id == record.home_team_id);
            let away = state.teams.iter().find(|t| t.id == record.away_team_id);
            let league = state.leagues.iter().find(|l| l.id == record.league_id);
            let bookmaker = state.bookmakers.iter().find(|b| b.id == bookmaker_id);
            let (Some(home), Some(away), Some(league), Some(bookmaker)) =
                (home, away, league, bookmaker)
            else {
                continue;
            };

            rows.push(ComparisonRow {
                match_id,
                match_date: record.match_date,
                match_status: record.status.clone(),
                league_name: league.name.clone(),
                league_country: league.country.clone(),
                sport_type: sport,
                home_team: home.standard_name.clone(),
                home_team_logo: home.logo_url.clone(),
                away_team: away.standard_name.clone(),
                away_team_logo: away.logo_url.clone(),
                bookmaker_id,
                bookmaker_name: bookmaker.name.clone(),
                home_odd,
                draw_odd,
                away_odd,
                odds_type,
                margin_percentage: Some(parse::margin(home_odd, draw_odd, away_odd)),
                data_age_seconds: Some((now - scraped_at).num_seconds()),
                scraped_at,
                extra_data: extra,
            });
        }
        rows.sort_by_key(|r| r.match_date);
        rows
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_teams(&self) -> Result<Vec<Team>, StoreError> {
        Ok(self.state.lock().teams.clone())
    }

    async fn fetch_team_aliases(&self) -> Result<Vec<TeamAlias>, StoreError> {
        Ok(self.state.lock().aliases.clone())
    }

    async fn fetch_leagues(&self) -> Result<Vec<League>, StoreError> {
        Ok(self.state.lock().leagues.clone())
    }

    async fn fetch_bookmakers(&self) -> Result<Vec<Bookmaker>, StoreError> {
        Ok(self.state.lock().bookmakers.clone())
    }

    async fn create_team(&self, standard_name: &str, league_id: Uuid) -> Result<Team, StoreError> {
        let mut state = self.state.lock();
        if let Some(existing) = state
            .teams
            .iter()
            .find(|t| t.standard_name == standard_name && t.league_id == league_id)
        {
            return Ok(existing.clone());
        }
        let team = Team {
            id: Uuid::new_v4(),
            standard_name: standard_name.to_string(),
            league_id,
            logo_url: None,
        };
        state.teams.push(team.clone());
        Ok(team)
    }

    async fn create_team_alias(
        &self,
        team_id: Uuid,
        alias_name: &str,
        bookmaker_source: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let exists = state.aliases.iter().any(|a| {
            a.alias_name.eq_ignore_ascii_case(alias_name)
                && a.bookmaker_source.eq_ignore_ascii_case(bookmaker_source)
        });
        if exists {
            return Err(StoreError::Duplicate);
        }
        state.aliases.push(TeamAlias {
            team_id,
            alias_name: alias_name.to_string(),
            bookmaker_source: bookmaker_source.to_string(),
        });
        Ok(())
    }

    async fn upsert_football_matches(
        &self,
        requests: &[MatchUpsert],
    ) -> Result<HashMap<MatchKey, MatchRecord>, StoreError> {
        let mut state = self.state.lock();
        Ok(Self::upsert_matches(
            &mut state.football_matches,
            requests,
            false,
        ))
    }

    async fn upsert_basketball_matches(
        &self,
        requests: &[MatchUpsert],
    ) -> Result<HashMap<MatchKey, MatchRecord>, StoreError> {
        let mut state = self.state.lock();
        Ok(Self::upsert_matches(
            &mut state.basketball_matches,
            requests,
            true,
        ))
    }

    async fn insert_football_odds(&self, rows: &[FootballOddsRow]) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        state.football_odds.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn insert_basketball_odds(
        &self,
        rows: &[BasketballOddsRow],
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        state.basketball_odds.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn insert_alerts(&self, alerts: &[AlertRow]) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        state.alerts.extend_from_slice(alerts);
        Ok(alerts.len())
    }

    async fn retire_started_football_matches(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let mut count = 0;
        for record in &mut state.football_matches {
            if record.status == "scheduled" && record.match_date < now {
                record.status = "started".to_string();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn retire_started_basketball_matches(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let mut count = 0;
        for record in &mut state.basketball_matches {
            if record.status == "scheduled" && record.match_date < now {
                record.status = "started".to_string();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn football_comparison_view(&self) -> Result<Vec<ComparisonRow>, StoreError> {
        let state = self.state.lock();
        Ok(Self::comparison_rows(&state, Sport::Football))
    }

    async fn basketball_comparison_view(&self) -> Result<Vec<ComparisonRow>, StoreError> {
        let state = self.state.lock();
        Ok(Self::comparison_rows(&state, Sport::Basketball))
    }

    async fn log_unmatched_team(
        &self,
        raw_name: &str,
        bookmaker: &str,
        league_name: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.unmatched.push(UnmatchedTeam {
            id: Uuid::new_v4(),
            raw_name: raw_name.to_string(),
            bookmaker: bookmaker.to_string(),
            league_name: league_name.map(|l| l.to_string()),
        });
        Ok(())
    }

    async fn fetch_unmatched_teams(&self, limit: i64) -> Result<Vec<UnmatchedTeam>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .unmatched
            .iter()
            .filter(|u| !state.unmatched_resolved.contains_key(&u.id))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn resolve_unmatched_team(&self, id: Uuid, team_id: Uuid) -> Result<(), StoreError> {
        self.state.lock().unmatched_resolved.insert(id, team_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_upload(&self) -> Option<(String, Vec<u8>)> {
        self.uploads.lock().last().cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.uploads.lock().push((path.to_string(), bytes));
        Ok(())
    }
}

/// Replays one pre-built batch of offers per cycle.
pub struct StaticSource {
    name: String,
    batches: Mutex<VecDeque<Vec<RawOffer>>>,
}

impl StaticSource {
    pub fn new(name: &str, batches: Vec<Vec<RawOffer>>) -> Self {
        Self {
            name: name.to_string(),
            batches: Mutex::new(batches.into()),
        }
    }
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&self, _shutdown: &ShutdownSignal) -> Result<(), SourceError> {
        Ok(())
    }

    async fn teardown(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn collect(&self, _shutdown: ShutdownSignal) -> Result<Vec<RawOffer>, SourceError> {
        Ok(self.batches.lock().pop_front().unwrap_or_default())
    }
}

/// Always fails; used to check that one bad source never aborts a cycle.
pub struct BrokenSource;

#[async_trait]
impl Source for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    async fn setup(&self, _shutdown: &ShutdownSignal) -> Result<(), SourceError> {
        Ok(())
    }

    async fn teardown(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn collect(&self, _shutdown: ShutdownSignal) -> Result<Vec<RawOffer>, SourceError> {
        Err(SourceError::Network("connection reset by anti-bot".to_string()))
    }
}

#[allow(clippy::too_many_arguments)]
pub fn offer(
    bookmaker: &str,
    home: &str,
    away: &str,
    league: &str,
    sport: Sport,
    match_date: DateTime<Utc>,
    home_odd: f64,
    draw_odd: Option<f64>,
    away_odd: f64,
) -> RawOffer {
    RawOffer {
        bookmaker_name: bookmaker.to_string(),
        home_team_raw: home.to_string(),
        away_team_raw: away.to_string(),
        league_raw: league.to_string(),
        match_date,
        home_odd,
        draw_odd,
        away_odd,
        sport,
        market_type: if sport == Sport::Basketball {
            "moneyline".to_string()
        } else {
            "1x2".to_string()
        },
        odds_type: OddsType::Pa,
        scraped_at: Utc::now(),
        extra_data: Map::new(),
    }
}

pub fn test_config(primary_bookmaker: &str) -> odds_harvester::config::Config {
    odds_harvester::config::Config {
        database_url: String::new(),
        storage_url: String::new(),
        storage_service_key: String::new(),
        storage_bucket: "odds-data".to_string(),
        odds_json_path: "odds.json".to_string(),
        scrape_interval_seconds: 30,
        arbitrage_threshold: 1.0,
        value_bet_threshold: 10.0,
        primary_bookmaker: primary_bookmaker.to_string(),
        server_port: 0,
    }
}

