use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::store::{Store, StoreError};
use crate::types::{Bookmaker, League, Team, TeamAlias};

/// Connector words dropped before fuzzy scoring so bookmaker variations
/// with and without prepositions collide ("Atlético de Madrid" vs
/// "Atlético Madrid").
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "de", "do", "da", "del", "la", "fc", "sc", "cf", "ac", "ss", "club", "sporting",
    ]
    .into_iter()
    .collect()
});

/// Reduced set used when the full set would strip a name down to a single
/// token.
static ARTICLES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["de", "do", "da", "del", "la"].into_iter().collect());

/// Collapse whitespace and strip diacritics ("Bétis" -> "Betis").
/// Preserves case; index keys go through [`normalize_key`].
pub fn normalize_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Lowercased normalized form, the key shared by every catalog index.
pub fn normalize_key(name: &str) -> String {
    normalize_name(name).to_lowercase()
}

/// Variant used only by the fuzzy scorers. Backs off to the article-only
/// subset when full stripping would leave fewer than two tokens.
pub fn normalize_for_fuzzy(name: &str) -> String {
    let normalized = normalize_key(name);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let mut filtered: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !STOPWORDS.contains(w))
        .collect();
    if filtered.len() < 2 && words.len() >= 2 {
        filtered = words
            .iter()
            .copied()
            .filter(|w| !ARTICLES.contains(w))
            .collect();
    }
    if filtered.is_empty() {
        normalized
    } else {
        filtered.join(" ")
    }
}

/// A fully-built, immutable view of the identity catalog. Consumers grab
/// an `Arc` of the current snapshot and keep it for the duration of a
/// lookup; reloads swap the pointer underneath without tearing.
#[derive(Debug, Default, Clone)]
pub struct CatalogSnapshot {
    pub teams_by_id: HashMap<Uuid, String>,
    /// (normalized alias, lowercase bookmaker) -> team id.
    pub alias_index: HashMap<(String, String), Uuid>,
    /// league id -> (normalized name -> team id). Primary index for
    /// league-scoped matching.
    pub teams_by_league: HashMap<Uuid, HashMap<String, Uuid>>,
    /// Global fallback index; first team wins on duplicate names.
    pub teams_global: HashMap<String, Uuid>,
    pub leagues_by_id: HashMap<Uuid, String>,
    pub leagues_by_key: HashMap<String, Uuid>,
    pub bookmakers_by_key: HashMap<String, Uuid>,
}

impl CatalogSnapshot {
    pub fn league_teams(&self, league_id: &Uuid) -> Option<&HashMap<String, Uuid>> {
        self.teams_by_league.get(league_id)
    }
}

#[derive(Debug)]
pub struct DuplicateTeam {
    pub name: String,
    pub canonical_id: Uuid,
    pub duplicate_id: Uuid,
}

pub(crate) fn build_snapshot(
    teams: &[Team],
    aliases: &[TeamAlias],
    leagues: &[League],
    bookmakers: &[Bookmaker],
) -> (CatalogSnapshot, Vec<DuplicateTeam>) {
    let mut snapshot = CatalogSnapshot::default();
    let mut duplicates = Vec::new();

    for team in teams {
        snapshot
            .teams_by_id
            .insert(team.id, team.standard_name.clone());

        let name_lower = team.standard_name.to_lowercase();
        match snapshot.teams_global.get(&name_lower).copied() {
            Some(existing) => duplicates.push(DuplicateTeam {
                name: team.standard_name.clone(),
                canonical_id: existing,
                duplicate_id: team.id,
            }),
            None => {
                snapshot.teams_global.insert(name_lower.clone(), team.id);
            }
        }

        let league = snapshot.teams_by_league.entry(team.league_id).or_default();
        league.insert(name_lower, team.id);
        let normalized = normalize_key(&team.standard_name);
        league.entry(normalized).or_insert(team.id);
    }

    // Normalized variants go in after all exact names so an accented name
    // never shadows another team's exact spelling.
    for team in teams {
        let normalized = normalize_key(&team.standard_name);
        snapshot.teams_global.entry(normalized).or_insert(team.id);
    }

    for alias in aliases {
        let bookmaker = alias.bookmaker_source.to_lowercase();
        snapshot.alias_index.insert(
            (alias.alias_name.to_lowercase(), bookmaker.clone()),
            alias.team_id,
        );
        let normalized = normalize_key(&alias.alias_name);
        snapshot
            .alias_index
            .entry((normalized, bookmaker))
            .or_insert(alias.team_id);
    }

    for league in leagues {
        snapshot.leagues_by_id.insert(league.id, league.name.clone());
        snapshot
            .leagues_by_key
            .insert(league.name.trim().to_lowercase(), league.id);
    }

    for bookmaker in bookmakers {
        snapshot
            .bookmakers_by_key
            .insert(bookmaker.name.trim().to_lowercase(), bookmaker.id);
    }

    (snapshot, duplicates)
}

/// In-memory identity catalog, reloaded at the top of each cycle. Reads
/// are lock-free against a committed snapshot; auto-create writes go
/// through copy-on-write so concurrent readers keep their view.
pub struct IdentityCatalog {
    inner: RwLock<Arc<CatalogSnapshot>>,
    loaded: AtomicBool,
}

impl Default for IdentityCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityCatalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(CatalogSnapshot::default())),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.inner.read().clone()
    }

    /// False until the first successful reload. A cycle without any
    /// snapshot yields zero work instead of resolving against nothing.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub async fn reload(&self, store: &dyn Store) -> Result<(), StoreError> {
        let teams = store.fetch_teams().await?;
        let aliases = store.fetch_team_aliases().await?;
        let leagues = store.fetch_leagues().await?;
        let bookmakers = store.fetch_bookmakers().await?;

        let (snapshot, duplicates) = build_snapshot(&teams, &aliases, &leagues, &bookmakers);

        if !duplicates.is_empty() {
            warn!(
                "[DUPLICATE] Found {} duplicate team name(s) across leagues; global lookups keep the first",
                duplicates.len()
            );
            for dup in &duplicates {
                warn!(
                    "  - '{}': keep {}, merge {}",
                    dup.name, dup.canonical_id, dup.duplicate_id
                );
            }
        }

        info!(
            "Loaded {} teams, {} aliases, {} leagues, {} bookmakers",
            snapshot.teams_by_id.len(),
            snapshot.alias_index.len(),
            snapshot.leagues_by_id.len(),
            snapshot.bookmakers_by_key.len()
        );

        *self.inner.write() = Arc::new(snapshot);
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    /// Insert a freshly-created team into every index so lookups later in
    /// the same cycle see it.
    pub fn insert_team(&self, team: &Team) {
        let mut guard = self.inner.write();
        let snapshot = Arc::make_mut(&mut guard);

        snapshot
            .teams_by_id
            .insert(team.id, team.standard_name.clone());

        let name_lower = team.standard_name.to_lowercase();
        let normalized = normalize_key(&team.standard_name);

        snapshot
            .teams_global
            .entry(name_lower.clone())
            .or_insert(team.id);
        if normalized != name_lower {
            snapshot
                .teams_global
                .entry(normalized.clone())
                .or_insert(team.id);
        }

        let league = snapshot.teams_by_league.entry(team.league_id).or_default();
        league.insert(name_lower, team.id);
        if normalized != team.standard_name.to_lowercase() {
            league.entry(normalized).or_insert(team.id);
        }
    }

    /// Returns false when the alias already exists; the first caller wins.
    pub fn insert_alias(&self, alias_name: &str, bookmaker: &str, team_id: Uuid) -> bool {
        let key = alias_key(alias_name, bookmaker);
        let mut guard = self.inner.write();
        if guard.alias_index.contains_key(&key) {
            return false;
        }
        Arc::make_mut(&mut guard).alias_index.insert(key, team_id);
        true
    }

    /// Evict a speculative alias whose database write failed.
    pub fn remove_alias(&self, alias_name: &str, bookmaker: &str) {
        let key = alias_key(alias_name, bookmaker);
        let mut guard = self.inner.write();
        if guard.alias_index.contains_key(&key) {
            Arc::make_mut(&mut guard).alias_index.remove(&key);
        }
    }
}

pub fn alias_key(alias_name: &str, bookmaker: &str) -> (String, String) {
    (
        alias_name.trim().to_lowercase(),
        bookmaker.trim().to_lowercase(),
    )
}
