use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::{ObjectStore, Store};
use crate::types::{ComparisonRow, OddsType, Sport};

/// The frontend-ready artifact, exactly as uploaded.
#[derive(Debug, Serialize)]
pub struct OddsArtifact {
    pub generated_at: String,
    pub matches_count: usize,
    pub matches: Vec<MatchGroup>,
}

#[derive(Debug, Serialize)]
pub struct MatchGroup {
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
    pub odds: Vec<BookmakerOdds>,
    pub best_home: f64,
    pub best_draw: f64,
    pub best_away: f64,
    pub worst_home: f64,
    pub worst_draw: f64,
    pub worst_away: f64,
}

#[derive(Debug, Serialize)]
pub struct BookmakerOdds {
    pub bookmaker_id: Uuid,
    pub bookmaker_name: String,
    pub home_odd: f64,
    pub draw_odd: f64,
    pub away_odd: f64,
    pub odds_type: OddsType,
    pub margin_percentage: Option<f64>,
    pub data_age_seconds: Option<i64>,
    pub scraped_at: DateTime<Utc>,
    pub extra_data: Map<String, Value>,
}

/// Reads both comparison views, groups odds per fixture, and uploads one
/// JSON blob for the frontend. Upload failures are logged; the next
/// cycle retries naturally.
pub struct Publisher {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStore>,
    object_path: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn Store>, objects: Arc<dyn ObjectStore>, object_path: &str) -> Self {
        Self {
            store,
            objects,
            object_path: object_path.to_string(),
        }
    }

    pub async fn generate_and_upload(&self) -> bool {
        let football = match self.store.football_comparison_view().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Error fetching football odds for export: {}", e);
                return false;
            }
        };
        let basketball = match self.store.basketball_comparison_view().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Error fetching basketball odds for export: {}", e);
                return false;
            }
        };

        info!(
            "JSON export: {} football, {} basketball odds rows",
            football.len(),
            basketball.len()
        );

        let mut all_rows = football;
        all_rows.extend(basketball);
        if all_rows.is_empty() {
            warn!("No odds data to export");
            return false;
        }

        let now = Utc::now();
        let matches = group_for_publication(all_rows, now);
        let artifact = OddsArtifact {
            generated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            matches_count: matches.len(),
            matches,
        };

        let bytes = match serde_json::to_vec(&artifact) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to serialize odds artifact: {}", e);
                return false;
            }
        };
        let size = bytes.len();

        match self
            .objects
            .put(&self.object_path, bytes, "application/json")
            .await
        {
            Ok(()) => {
                info!(
                    "Uploaded {} with {} matches ({} bytes)",
                    self.object_path, artifact.matches_count, size
                );
                true
            }
            Err(e) => {
                error!("Error uploading odds artifact: {}", e);
                false
            }
        }
    }
}

/// Group rows by `(home, away, date-only)`. The composite key collapses
/// rows that differ only by match id, so a recreated fixture does not
/// produce duplicate cards. Matches more than five minutes underway are
/// dropped.
pub fn group_for_publication(rows: Vec<ComparisonRow>, now: DateTime<Utc>) -> Vec<MatchGroup> {
    let cutoff = now - Duration::minutes(5);
    let mut groups: HashMap<String, MatchGroup> = HashMap::new();

    for row in rows {
        if row.match_date < cutoff {
            continue;
        }

        let key = format!(
            "{}_{}_{}",
            row.home_team,
            row.away_team,
            row.match_date.date_naive()
        );
        let group = groups.entry(key).or_insert_with(|| MatchGroup {
            match_id: row.match_id,
            match_date: row.match_date,
            match_status: row.match_status.clone(),
            league_name: row.league_name.clone(),
            league_country: row.league_country.clone(),
            sport_type: row.sport_type,
            home_team: row.home_team.clone(),
            home_team_logo: row.home_team_logo.clone(),
            away_team: row.away_team.clone(),
            away_team_logo: row.away_team_logo.clone(),
            odds: Vec::new(),
            best_home: 0.0,
            best_draw: 0.0,
            best_away: 0.0,
            worst_home: f64::INFINITY,
            worst_draw: f64::INFINITY,
            worst_away: f64::INFINITY,
        });

        let home_odd = row.home_odd;
        let draw_odd = row.draw_odd.unwrap_or(0.0);
        let away_odd = row.away_odd;

        group.odds.push(BookmakerOdds {
            bookmaker_id: row.bookmaker_id,
            bookmaker_name: row.bookmaker_name,
            home_odd,
            draw_odd,
            away_odd,
            odds_type: row.odds_type,
            margin_percentage: row.margin_percentage,
            data_age_seconds: row.data_age_seconds,
            scraped_at: row.scraped_at,
            extra_data: row.extra_data,
        });

        if home_odd > group.best_home {
            group.best_home = home_odd;
        }
        if draw_odd > group.best_draw {
            group.best_draw = draw_odd;
        }
        if away_odd > group.best_away {
            group.best_away = away_odd;
        }
        if home_odd > 0.0 && home_odd < group.worst_home {
            group.worst_home = home_odd;
        }
        if draw_odd > 0.0 && draw_odd < group.worst_draw {
            group.worst_draw = draw_odd;
        }
        if away_odd > 0.0 && away_odd < group.worst_away {
            group.worst_away = away_odd;
        }
    }

    let mut result: Vec<MatchGroup> = groups
        .into_values()
        .map(|mut group| {
            // No positive observation leaves a worst at infinity; publish 0.
            if group.worst_home.is_infinite() {
                group.worst_home = 0.0;
            }
            if group.worst_draw.is_infinite() {
                group.worst_draw = 0.0;
            }
            if group.worst_away.is_infinite() {
                group.worst_away = 0.0;
            }
            group
        })
        .collect();

    result.sort_by_key(|group| group.match_date);
    result
}
