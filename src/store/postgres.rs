use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::types::{
    AlertRow, BasketballOddsRow, Bookmaker, ComparisonRow, FootballOddsRow, League, MatchKey,
    MatchRecord, MatchUpsert, OddsType, Sport, Team, TeamAlias, UnmatchedTeam,
};

/// Postgres-backed store. All queries are runtime-bound; schema migration
/// is owned by the database, not this service.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Shared find-or-create used by both sports. Basketball additionally
    /// matches the inverted `(league, away, home)` tuple so sources that
    /// swap the pair reuse the stored fixture.
    async fn upsert_matches(
        &self,
        table: &str,
        requests: &[MatchUpsert],
        allow_inversion: bool,
    ) -> Result<HashMap<MatchKey, MatchRecord>, StoreError> {
        let mut result: HashMap<MatchKey, MatchRecord> = HashMap::new();
        if requests.is_empty() {
            return Ok(result);
        }

        let mut window_min = requests[0].match_date;
        let mut window_max = requests[0].match_date;
        for request in requests {
            window_min = window_min.min(request.match_date);
            window_max = window_max.max(request.match_date);
        }
        let window_min = window_min - Duration::days(1);
        let window_max = window_max + Duration::days(1);

        let select_sql = format!(
            r#"
            SELECT id, league_id, home_team_id, away_team_id, match_date, status
            FROM {}
            WHERE match_date >= $1 AND match_date <= $2
            "#,
            table
        );

        let rows = sqlx::query(&select_sql)
            .bind(window_min)
            .bind(window_max)
            .fetch_all(&self.pool)
            .await?;

        let mut existing: HashMap<MatchKey, MatchRecord> = HashMap::new();
        let mut existing_inverted: HashMap<MatchKey, MatchRecord> = HashMap::new();
        for row in &rows {
            let record = row_to_match(row);
            let key = (record.league_id, record.home_team_id, record.away_team_id);
            let inverted_key = (record.league_id, record.away_team_id, record.home_team_id);
            existing.entry(key).or_insert_with(|| record.clone());
            if allow_inversion {
                existing_inverted.entry(inverted_key).or_insert(record);
            }
        }

        let mut pending: Vec<&MatchUpsert> = Vec::new();
        let mut pending_keys: HashSet<MatchKey> = HashSet::new();
        for request in requests {
            let key = request.key();
            if result.contains_key(&key) || pending_keys.contains(&key) {
                continue;
            }
            if let Some(record) = existing.get(&key) {
                result.insert(key, record.clone());
                continue;
            }
            if allow_inversion {
                if let Some(record) = existing_inverted.get(&key) {
                    let mut inverted = record.clone();
                    inverted.is_inverted = true;
                    debug!(
                        "Using inverted match {} for {} vs {}",
                        inverted.id, request.home_team_id, request.away_team_id
                    );
                    result.insert(key, inverted);
                    continue;
                }
            }
            pending_keys.insert(key);
            pending.push(request);
        }

        let found = result.len();

        if !pending.is_empty() {
            let mut builder = QueryBuilder::new(format!(
                "INSERT INTO {} (league_id, home_team_id, away_team_id, match_date, status) ",
                table
            ));
            builder.push_values(pending.iter(), |mut b, request| {
                b.push_bind(request.league_id)
                    .push_bind(request.home_team_id)
                    .push_bind(request.away_team_id)
                    .push_bind(request.match_date)
                    .push_bind("scheduled");
            });
            builder.push(
                " ON CONFLICT DO NOTHING RETURNING id, league_id, home_team_id, away_team_id, match_date, status",
            );

            let inserted = builder.build().fetch_all(&self.pool).await?;
            for row in &inserted {
                let record = row_to_match(row);
                let key = (record.league_id, record.home_team_id, record.away_team_id);
                result.insert(key, record);
            }

            // Keys skipped by ON CONFLICT were inserted by a concurrent
            // writer; re-read the window and map them.
            let missing: HashSet<MatchKey> = pending_keys
                .iter()
                .filter(|key| !result.contains_key(*key))
                .copied()
                .collect();
            if !missing.is_empty() {
                let rows = sqlx::query(&select_sql)
                    .bind(window_min)
                    .bind(window_max)
                    .fetch_all(&self.pool)
                    .await?;
                for row in &rows {
                    let record = row_to_match(row);
                    let key = (record.league_id, record.home_team_id, record.away_team_id);
                    if missing.contains(&key) && !result.contains_key(&key) {
                        result.insert(key, record);
                        continue;
                    }
                    if allow_inversion {
                        let inverted_key =
                            (record.league_id, record.away_team_id, record.home_team_id);
                        if missing.contains(&inverted_key) && !result.contains_key(&inverted_key) {
                            let mut inverted = record;
                            inverted.is_inverted = true;
                            result.insert(inverted_key, inverted);
                        }
                    }
                }
            }
        }

        info!(
            "Batch matches ({}): {} found, {} created",
            table,
            found,
            pending.len()
        );
        Ok(result)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn fetch_teams(&self) -> Result<Vec<Team>, StoreError> {
        let rows = sqlx::query("SELECT id, standard_name, league_id, logo_url FROM teams")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Team {
                id: row.get("id"),
                standard_name: row.get("standard_name"),
                league_id: row.get("league_id"),
                logo_url: row.get("logo_url"),
            })
            .collect())
    }

    async fn fetch_team_aliases(&self) -> Result<Vec<TeamAlias>, StoreError> {
        let rows = sqlx::query("SELECT team_id, alias_name, bookmaker_source FROM team_aliases")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| TeamAlias {
                team_id: row.get("team_id"),
                alias_name: row.get("alias_name"),
                bookmaker_source: row.get("bookmaker_source"),
            })
            .collect())
    }

    async fn fetch_leagues(&self) -> Result<Vec<League>, StoreError> {
        let rows =
            sqlx::query("SELECT id, name, country, status FROM leagues WHERE status = 'active'")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .iter()
            .map(|row| League {
                id: row.get("id"),
                name: row.get("name"),
                country: row.get("country"),
                status: row.get("status"),
            })
            .collect())
    }

    async fn fetch_bookmakers(&self) -> Result<Vec<Bookmaker>, StoreError> {
        let rows = sqlx::query("SELECT id, name, status FROM bookmakers WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Bookmaker {
                id: row.get("id"),
                name: row.get("name"),
                status: row.get("status"),
            })
            .collect())
    }

    async fn create_team(&self, standard_name: &str, league_id: Uuid) -> Result<Team, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO teams (standard_name, league_id)
            VALUES ($1, $2)
            ON CONFLICT (standard_name, league_id) DO NOTHING
            RETURNING id, standard_name, league_id, logo_url
            "#,
        )
        .bind(standard_name)
        .bind(league_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match inserted {
            Some(row) => row,
            None => {
                // Lost a race with a concurrent writer; the row exists now.
                debug!("Team already exists: '{}'", standard_name);
                sqlx::query(
                    r#"
                    SELECT id, standard_name, league_id, logo_url
                    FROM teams
                    WHERE standard_name = $1 AND league_id = $2
                    "#,
                )
                .bind(standard_name)
                .bind(league_id)
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(Team {
            id: row.get("id"),
            standard_name: row.get("standard_name"),
            league_id: row.get("league_id"),
            logo_url: row.get("logo_url"),
        })
    }

    async fn create_team_alias(
        &self,
        team_id: Uuid,
        alias_name: &str,
        bookmaker_source: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO team_aliases (team_id, alias_name, bookmaker_source) VALUES ($1, $2, $3)",
        )
        .bind(team_id)
        .bind(alias_name)
        .bind(bookmaker_source)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate(&e) => Err(StoreError::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_football_matches(
        &self,
        requests: &[MatchUpsert],
    ) -> Result<HashMap<MatchKey, MatchRecord>, StoreError> {
        self.upsert_matches("matches", requests, false).await
    }

    async fn upsert_basketball_matches(
        &self,
        requests: &[MatchUpsert],
    ) -> Result<HashMap<MatchKey, MatchRecord>, StoreError> {
        self.upsert_matches("basketball_matches", requests, true).await
    }

    async fn insert_football_odds(&self, rows: &[FootballOddsRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO odds_history \
             (match_id, bookmaker_id, market_type, home_odd, draw_odd, away_odd, odds_type, scraped_at, extra_data) ",
        );
        builder.push_values(rows.iter(), |mut b, row| {
            b.push_bind(row.match_id)
                .push_bind(row.bookmaker_id)
                .push_bind(&row.market_type)
                .push_bind(row.home_odd)
                .push_bind(row.draw_odd)
                .push_bind(row.away_odd)
                .push_bind(row.odds_type.as_str())
                .push_bind(row.scraped_at)
                .push_bind(Value::Object(row.extra_data.clone()));
        });

        let result = builder.build().execute(&self.pool).await?;
        let count = result.rows_affected() as usize;
        info!("Inserted {} odds records", count);
        Ok(count)
    }

    async fn insert_basketball_odds(
        &self,
        rows: &[BasketballOddsRow],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO basketball_odds_history \
             (match_id, bookmaker_id, home_odd, away_odd, odds_type, scraped_at, extra_data) ",
        );
        builder.push_values(rows.iter(), |mut b, row| {
            b.push_bind(row.match_id)
                .push_bind(row.bookmaker_id)
                .push_bind(row.home_odd)
                .push_bind(row.away_odd)
                .push_bind(row.odds_type.as_str())
                .push_bind(row.scraped_at)
                .push_bind(Value::Object(row.extra_data.clone()));
        });

        let result = builder.build().execute(&self.pool).await?;
        let count = result.rows_affected() as usize;
        info!("Inserted {} basketball odds records", count);
        Ok(count)
    }

    async fn insert_alerts(&self, alerts: &[AlertRow]) -> Result<usize, StoreError> {
        if alerts.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO alerts (match_id, alert_type, title, details, is_read) ",
        );
        builder.push_values(alerts.iter(), |mut b, alert| {
            b.push_bind(alert.match_id)
                .push_bind(alert.alert_type.as_str())
                .push_bind(&alert.title)
                .push_bind(alert.details.clone())
                .push_bind(false);
        });

        let result = builder.build().execute(&self.pool).await?;
        let count = result.rows_affected() as usize;
        info!("Inserted {} alert records", count);
        Ok(count)
    }

    async fn retire_started_football_matches(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE matches SET status = 'started' WHERE status = 'scheduled' AND match_date < NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn retire_started_basketball_matches(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE basketball_matches SET status = 'started' WHERE status = 'scheduled' AND match_date < NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn football_comparison_view(&self) -> Result<Vec<ComparisonRow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM odds_comparison ORDER BY match_date ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row_to_comparison(row, Sport::Football))
            .collect())
    }

    async fn basketball_comparison_view(&self) -> Result<Vec<ComparisonRow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM basketball_odds_comparison ORDER BY match_date ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row_to_comparison(row, Sport::Basketball))
            .collect())
    }

    async fn log_unmatched_team(
        &self,
        raw_name: &str,
        bookmaker: &str,
        league_name: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO unmatched_teams_log (raw_name, bookmaker, league_name, resolved)
            VALUES ($1, $2, $3, false)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(raw_name)
        .bind(bookmaker)
        .bind(league_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_unmatched_teams(&self, limit: i64) -> Result<Vec<UnmatchedTeam>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, raw_name, bookmaker, league_name
            FROM unmatched_teams_log
            WHERE resolved = false
            ORDER BY scraped_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| UnmatchedTeam {
                id: row.get("id"),
                raw_name: row.get("raw_name"),
                bookmaker: row.get("bookmaker"),
                league_name: row.get("league_name"),
            })
            .collect())
    }

    async fn resolve_unmatched_team(&self, id: Uuid, team_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE unmatched_teams_log
            SET resolved = true, resolved_team_id = $2, resolved_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(team_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn is_duplicate(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn row_to_match(row: &PgRow) -> MatchRecord {
    MatchRecord {
        id: row.get("id"),
        league_id: row.get("league_id"),
        home_team_id: row.get("home_team_id"),
        away_team_id: row.get("away_team_id"),
        match_date: row.get("match_date"),
        status: row.get("status"),
        is_inverted: false,
    }
}

fn row_to_comparison(row: &PgRow, sport: Sport) -> ComparisonRow {
    let odds_type: String = row.get("odds_type");
    let extra_data: Option<Value> = row.try_get("extra_data").unwrap_or(None);

    ComparisonRow {
        match_id: row.get("match_id"),
        match_date: row.get("match_date"),
        match_status: row.get("match_status"),
        league_name: row.get("league_name"),
        league_country: row.try_get("league_country").unwrap_or(None),
        sport_type: sport,
        home_team: row.get("home_team"),
        home_team_logo: row.try_get("home_team_logo").unwrap_or(None),
        away_team: row.get("away_team"),
        away_team_logo: row.try_get("away_team_logo").unwrap_or(None),
        bookmaker_id: row.get("bookmaker_id"),
        bookmaker_name: row.get("bookmaker_name"),
        home_odd: row.get("home_odd"),
        // The basketball view has no draw column.
        draw_odd: row.try_get("draw_odd").unwrap_or(None),
        away_odd: row.get("away_odd"),
        odds_type: OddsType::from_db(&odds_type),
        margin_percentage: row.try_get("margin_percentage").unwrap_or(None),
        data_age_seconds: row.try_get("data_age_seconds").unwrap_or(None),
        scraped_at: row.get("scraped_at"),
        extra_data: extra_data
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default(),
    }
}
