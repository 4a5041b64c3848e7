pub mod bucket;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{
    AlertRow, BasketballOddsRow, Bookmaker, ComparisonRow, FootballOddsRow, League, MatchKey,
    MatchRecord, MatchUpsert, Team, TeamAlias, UnmatchedTeam,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint violation; races with concurrent writers are
    /// resolved by re-reading, not by failing the cycle.
    #[error("duplicate key")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Other(String),
}

/// Typed persistence interface consumed by the pipeline. The Postgres
/// implementation lives in [`postgres`]; tests substitute an in-memory
/// one.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_teams(&self) -> Result<Vec<Team>, StoreError>;
    async fn fetch_team_aliases(&self) -> Result<Vec<TeamAlias>, StoreError>;
    async fn fetch_leagues(&self) -> Result<Vec<League>, StoreError>;
    async fn fetch_bookmakers(&self) -> Result<Vec<Bookmaker>, StoreError>;

    /// Create a team, or return the existing row when `(standard_name,
    /// league_id)` already exists.
    async fn create_team(&self, standard_name: &str, league_id: Uuid) -> Result<Team, StoreError>;

    /// Errors with [`StoreError::Duplicate`] when the alias already
    /// exists for this bookmaker.
    async fn create_team_alias(
        &self,
        team_id: Uuid,
        alias_name: &str,
        bookmaker_source: &str,
    ) -> Result<(), StoreError>;

    /// Find-or-create fixtures in batch. Existing matches are looked up
    /// by exact `(league, home, away)` tuple inside the dynamic window
    /// `[min(match_date) − 1d, max(match_date) + 1d]`.
    async fn upsert_football_matches(
        &self,
        requests: &[MatchUpsert],
    ) -> Result<HashMap<MatchKey, MatchRecord>, StoreError>;

    /// Basketball variant: when no exact tuple exists but the inverted
    /// tuple does, that match is returned flagged `is_inverted` instead
    /// of creating a duplicate.
    async fn upsert_basketball_matches(
        &self,
        requests: &[MatchUpsert],
    ) -> Result<HashMap<MatchKey, MatchRecord>, StoreError>;

    async fn insert_football_odds(&self, rows: &[FootballOddsRow]) -> Result<usize, StoreError>;
    async fn insert_basketball_odds(&self, rows: &[BasketballOddsRow])
        -> Result<usize, StoreError>;

    async fn insert_alerts(&self, alerts: &[AlertRow]) -> Result<usize, StoreError>;

    /// Mark scheduled matches whose kickoff has passed; returns the
    /// affected count.
    async fn retire_started_football_matches(&self) -> Result<u64, StoreError>;
    async fn retire_started_basketball_matches(&self) -> Result<u64, StoreError>;

    /// Pre-joined comparison rows (teams, league, bookmaker, margin,
    /// data age) for the publisher.
    async fn football_comparison_view(&self) -> Result<Vec<ComparisonRow>, StoreError>;
    async fn basketball_comparison_view(&self) -> Result<Vec<ComparisonRow>, StoreError>;

    /// Best-effort; feeds the alias-generator maintenance worker.
    async fn log_unmatched_team(
        &self,
        raw_name: &str,
        bookmaker: &str,
        league_name: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn fetch_unmatched_teams(&self, limit: i64) -> Result<Vec<UnmatchedTeam>, StoreError>;
    async fn resolve_unmatched_team(&self, id: Uuid, team_id: Uuid) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Destination for the published odds artifact.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;
}
