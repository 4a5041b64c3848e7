use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Football,
    Basketball,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
        }
    }

    pub fn from_db(value: &str) -> Sport {
        if value.eq_ignore_ascii_case("basketball") {
            Sport::Basketball
        } else {
            Sport::Football
        }
    }
}

/// PA = Pagamento Antecipado (early payout market), SO = Super Odds
/// (promotional boost). Both are parallel variants of the same 1X2 /
/// moneyline market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OddsType {
    #[serde(rename = "PA")]
    Pa,
    #[serde(rename = "SO")]
    So,
}

impl OddsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OddsType::Pa => "PA",
            OddsType::So => "SO",
        }
    }

    pub fn from_db(value: &str) -> OddsType {
        if value.eq_ignore_ascii_case("SO") {
            OddsType::So
        } else {
            OddsType::Pa
        }
    }
}

/// One offer as collected from a bookmaker, before any identity
/// resolution. Team and league names are the raw strings the site uses.
#[derive(Debug, Clone)]
pub struct RawOffer {
    pub bookmaker_name: String,
    pub home_team_raw: String,
    pub away_team_raw: String,
    pub league_raw: String,
    pub match_date: DateTime<Utc>,
    pub home_odd: f64,
    pub draw_odd: Option<f64>,
    pub away_odd: f64,
    pub sport: Sport,
    pub market_type: String,
    pub odds_type: OddsType,
    pub scraped_at: DateTime<Utc>,
    pub extra_data: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Bookmaker {
    pub id: Uuid,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct League {
    pub id: Uuid,
    pub name: String,
    pub country: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct Team {
    pub id: Uuid,
    pub standard_name: String,
    pub league_id: Uuid,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TeamAlias {
    pub team_id: Uuid,
    pub alias_name: String,
    pub bookmaker_source: String,
}

/// Key identifying a fixture inside one cycle: (league, home, away).
/// The match date is carried separately and matched within a window.
pub type MatchKey = (Uuid, Uuid, Uuid);

#[derive(Debug, Clone)]
pub struct MatchUpsert {
    pub league_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub match_date: DateTime<Utc>,
}

impl MatchUpsert {
    pub fn key(&self) -> MatchKey {
        (self.league_id, self.home_team_id, self.away_team_id)
    }
}

#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub id: Uuid,
    pub league_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub match_date: DateTime<Utc>,
    pub status: String,
    /// Basketball only: the stored record lists the teams in the opposite
    /// order from the request that found it.
    pub is_inverted: bool,
}

#[derive(Debug, Clone)]
pub struct FootballOddsRow {
    pub match_id: Uuid,
    pub bookmaker_id: Uuid,
    pub market_type: String,
    pub home_odd: f64,
    pub draw_odd: Option<f64>,
    pub away_odd: f64,
    pub odds_type: OddsType,
    pub scraped_at: DateTime<Utc>,
    pub extra_data: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct BasketballOddsRow {
    pub match_id: Uuid,
    pub bookmaker_id: Uuid,
    pub home_odd: f64,
    pub away_odd: f64,
    pub odds_type: OddsType,
    pub scraped_at: DateTime<Utc>,
    pub extra_data: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Arbitrage,
    ValueBet,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Arbitrage => "arbitrage",
            AlertType::ValueBet => "value_bet",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertRow {
    pub match_id: Uuid,
    pub alert_type: AlertType,
    pub title: String,
    pub details: Value,
}

/// Row from the unmatched-team log, consumed by the alias generator.
#[derive(Debug, Clone)]
pub struct UnmatchedTeam {
    pub id: Uuid,
    pub raw_name: String,
    pub bookmaker: String,
    pub league_name: Option<String>,
}

/// One pre-joined row of a comparison view: match, teams, league and
/// bookmaker names plus the derived margin and data age.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub match_id: Uuid,
    pub match_date: DateTime<Utc>,
    pub match_status: String,
    pub league_name: String,
    pub league_country: Option<String>,
    pub sport_type: Sport,
    pub home_team: String,
    pub home_team_logo: Option<String>,
    pub away_team: String,
    pub away_team_logo: Option<String>,
    pub bookmaker_id: Uuid,
    pub bookmaker_name: String,
    pub home_odd: f64,
    pub draw_odd: Option<f64>,
    pub away_odd: f64,
    pub odds_type: OddsType,
    pub margin_percentage: Option<f64>,
    pub data_age_seconds: Option<i64>,
    pub scraped_at: DateTime<Utc>,
    pub extra_data: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub sources_run: usize,
    pub sources_failed: usize,
    pub odds_collected: usize,
    pub football_inserted: usize,
    pub basketball_inserted: usize,
    pub alerts_created: usize,
    pub matches_cleaned: u64,
    pub json_uploaded: bool,
    pub errors: Vec<SourceFailure>,
}

impl CycleSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_seconds: 0.0,
            sources_run: 0,
            sources_failed: 0,
            odds_collected: 0,
            football_inserted: 0,
            basketball_inserted: 0,
            alerts_created: 0,
            matches_cleaned: 0,
            json_uploaded: false,
            errors: Vec::new(),
        }
    }
}
