mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{offer, test_config, BrokenSource, MemoryObjectStore, MemoryStore, StaticSource};
use odds_harvester::alias_generator::AliasGenerator;
use odds_harvester::catalog::IdentityCatalog;
use odds_harvester::orchestrator::Orchestrator;
use odds_harvester::sources::{ShutdownSignal, Source};
use odds_harvester::store::{ObjectStore, Store};
use odds_harvester::types::Sport;

fn orchestrator_with(
    store: &Arc<MemoryStore>,
    objects: &Arc<MemoryObjectStore>,
    sources: Vec<Arc<dyn Source>>,
) -> (Orchestrator, ShutdownSignal) {
    let mut orchestrator = Orchestrator::new(
        test_config("betano"),
        Arc::clone(store) as Arc<dyn Store>,
        Arc::clone(objects) as Arc<dyn ObjectStore>,
    );
    for source in sources {
        orchestrator.register_source(source);
    }
    let (tx, shutdown) = ShutdownSignal::new();
    std::mem::forget(tx);
    (orchestrator, shutdown)
}

#[tokio::test]
async fn full_cycle_resolves_inserts_and_publishes() {
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let serie_a = store.add_league("Serie A", Some("Itália"));
    store.add_bookmaker("betano");
    let inter = store.add_team("Internazionale", serie_a);
    let milan = store.add_team("AC Milan", serie_a);
    store.add_alias(inter, "FC Internazionale Milano", "betano");

    let kickoff = Utc::now() + Duration::hours(6);
    let offers = vec![offer(
        "betano",
        "FC Internazionale Milano",
        "AC Milan",
        "Serie A",
        Sport::Football,
        kickoff,
        2.10,
        Some(3.40),
        3.30,
    )];

    let (orchestrator, shutdown) = orchestrator_with(
        &store,
        &objects,
        vec![Arc::new(StaticSource::new("betano", vec![offers]))],
    );
    let summary = orchestrator.run_once(&shutdown).await;

    assert_eq!(summary.odds_collected, 1);
    assert_eq!(summary.football_inserted, 1);
    assert!(summary.errors.is_empty());
    assert!(summary.json_uploaded);

    {
        let state = store.state.lock();
        assert_eq!(state.football_matches.len(), 1);
        let record = &state.football_matches[0];
        assert_eq!(record.home_team_id, inter);
        assert_eq!(record.away_team_id, milan);
        assert_eq!(record.league_id, serie_a);

        assert_eq!(state.football_odds.len(), 1);
        let row = &state.football_odds[0];
        assert_eq!(row.match_id, record.id);
        assert_eq!(row.market_type, "1x2");
        assert_eq!(row.odds_type.as_str(), "PA");
        assert_eq!(row.home_odd, 2.10);
        assert_eq!(row.draw_odd, Some(3.40));
        assert_eq!(row.away_odd, 3.30);
    }

    // The published artifact carries the grouped fixture.
    let (path, bytes) = objects.last_upload().expect("artifact uploaded");
    assert_eq!(path, "odds.json");
    let artifact: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(artifact["matches_count"], 1);
    let published = &artifact["matches"][0];
    assert_eq!(published["home_team"], "Internazionale");
    assert_eq!(published["away_team"], "AC Milan");
    assert_eq!(published["sport_type"], "football");
    assert_eq!(published["best_home"], 2.1);
    assert_eq!(published["worst_home"], 2.1);
    assert_eq!(published["odds"][0]["odds_type"], "PA");
}

#[tokio::test]
async fn repeated_cycles_reuse_matches_and_append_odds() {
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let premier = store.add_league("Premier League", Some("Inglaterra"));
    store.add_bookmaker("betano");
    store.add_team("Manchester United", premier);
    store.add_team("Newcastle United", premier);

    let kickoff = Utc::now() + Duration::hours(10);
    let batch = || {
        vec![offer(
            "betano",
            "Manchester United",
            "Newcastle United",
            "Premier League",
            Sport::Football,
            kickoff,
            1.50,
            Some(3.95),
            7.10,
        )]
    };

    let (orchestrator, shutdown) = orchestrator_with(
        &store,
        &objects,
        vec![Arc::new(StaticSource::new("betano", vec![batch(), batch()]))],
    );

    orchestrator.run_once(&shutdown).await;
    orchestrator.run_once(&shutdown).await;

    let state = store.state.lock();
    assert_eq!(state.football_matches.len(), 1, "no duplicate fixture");
    assert_eq!(state.football_odds.len(), 2, "odds history is append-only");
    assert_eq!(
        state.football_odds[0].match_id,
        state.football_odds[1].match_id
    );
}

#[tokio::test]
async fn inverted_basketball_source_swaps_odds() {
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let nba = store.add_league("NBA", Some("EUA"));
    store.add_bookmaker("betano");
    store.add_bookmaker("stake");
    let heat = store.add_team("Miami Heat", nba);
    let lakers = store.add_team("Los Angeles Lakers", nba);

    let kickoff = Utc::now() + Duration::hours(8);
    let first_cycle = vec![offer(
        "betano",
        "Miami Heat",
        "Los Angeles Lakers",
        "NBA",
        Sport::Basketball,
        kickoff,
        1.65,
        None,
        2.30,
    )];
    // Second source lists the pair inverted.
    let second_cycle = vec![offer(
        "stake",
        "Los Angeles Lakers",
        "Miami Heat",
        "NBA",
        Sport::Basketball,
        kickoff,
        2.30,
        None,
        1.65,
    )];

    let (orchestrator, shutdown) = orchestrator_with(
        &store,
        &objects,
        vec![Arc::new(StaticSource::new(
            "mixed",
            vec![first_cycle, second_cycle.clone(), second_cycle],
        ))],
    );

    orchestrator.run_once(&shutdown).await;
    orchestrator.run_once(&shutdown).await;

    {
        let state = store.state.lock();
        assert_eq!(state.basketball_matches.len(), 1, "inverted pair reuses the fixture");
        let record = &state.basketball_matches[0];
        assert_eq!(record.home_team_id, heat);
        assert_eq!(record.away_team_id, lakers);

        assert_eq!(state.basketball_odds.len(), 2);
        let first = &state.basketball_odds[0];
        assert_eq!(first.home_odd, 1.65);
        assert!(first.extra_data.get("teams_swapped").is_none());

        // Stored odds follow the stored orientation, not the source's.
        let second = &state.basketball_odds[1];
        assert_eq!(second.match_id, record.id);
        assert_eq!(second.home_odd, 1.65);
        assert_eq!(second.away_odd, 2.30);
        assert_eq!(
            second.extra_data.get("teams_swapped"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    // The swap is stable across repeated observations.
    orchestrator.run_once(&shutdown).await;
    let state = store.state.lock();
    assert_eq!(state.basketball_matches.len(), 1);
    let third = &state.basketball_odds[2];
    assert_eq!(third.home_odd, 1.65);
    assert_eq!(
        third.extra_data.get("teams_swapped"),
        Some(&serde_json::Value::Bool(true))
    );
}

#[tokio::test]
async fn arbitrage_alert_is_emitted_across_bookmakers() {
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let serie_a = store.add_league("Serie A", Some("Itália"));
    store.add_bookmaker("betano");
    store.add_bookmaker("kto");
    store.add_bookmaker("stake");
    store.add_team("Juventus", serie_a);
    store.add_team("Napoli", serie_a);

    let kickoff = Utc::now() + Duration::hours(5);
    let quote = |bookmaker: &str, home: f64, draw: f64, away: f64| {
        offer(
            bookmaker,
            "Juventus",
            "Napoli",
            "Serie A",
            Sport::Football,
            kickoff,
            home,
            Some(draw),
            away,
        )
    };
    let offers = vec![
        quote("betano", 2.10, 3.60, 4.20),
        quote("kto", 2.05, 3.70, 4.50),
        quote("stake", 2.20, 3.50, 4.10),
    ];

    let (orchestrator, shutdown) = orchestrator_with(
        &store,
        &objects,
        vec![Arc::new(StaticSource::new("all", vec![offers]))],
    );
    let summary = orchestrator.run_once(&shutdown).await;

    assert_eq!(summary.football_inserted, 3);
    assert_eq!(summary.alerts_created, 1);

    let state = store.state.lock();
    let alert = &state.alerts[0];
    assert_eq!(alert.alert_type.as_str(), "arbitrage");
    assert!(state.football_matches.iter().any(|m| m.id == alert.match_id));

    let details = alert.details.as_object().unwrap();
    let best_home = details["best_home"].as_f64().unwrap();
    let best_draw = details["best_draw"].as_f64().unwrap();
    let best_away = details["best_away"].as_f64().unwrap();
    assert_eq!((best_home, best_draw, best_away), (2.20, 3.70, 4.50));

    // Profit is reproducible from the payload itself.
    let profit = details["profit_percentage"].as_f64().unwrap();
    let recomputed = (1.0 - (1.0 / best_home + 1.0 / best_draw + 1.0 / best_away)) * 100.0;
    assert!((profit - (recomputed * 100.0).round() / 100.0).abs() < 1e-9);
    assert!((profit - 5.3).abs() < 0.05);
}

#[tokio::test]
async fn failed_source_does_not_abort_the_cycle() {
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let premier = store.add_league("Premier League", Some("Inglaterra"));
    store.add_bookmaker("betano");
    store.add_team("Arsenal", premier);
    store.add_team("Chelsea", premier);

    let kickoff = Utc::now() + Duration::hours(4);
    let offers = vec![offer(
        "betano",
        "Arsenal",
        "Chelsea",
        "Premier League",
        Sport::Football,
        kickoff,
        2.40,
        Some(3.30),
        2.90,
    )];

    let (orchestrator, shutdown) = orchestrator_with(
        &store,
        &objects,
        vec![
            Arc::new(BrokenSource),
            Arc::new(StaticSource::new("betano", vec![offers])),
        ],
    );
    let summary = orchestrator.run_once(&shutdown).await;

    assert_eq!(summary.sources_run, 2);
    assert_eq!(summary.sources_failed, 1);
    assert_eq!(summary.errors[0].source, "broken");
    assert_eq!(summary.football_inserted, 1);
}

#[tokio::test]
async fn unresolvable_offers_are_dropped_not_stored() {
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let premier = store.add_league("Premier League", Some("Inglaterra"));
    store.add_bookmaker("betano");
    store.add_bookmaker("kto");
    store.add_team("Arsenal", premier);

    let kickoff = Utc::now() + Duration::hours(4);
    let offers = vec![
        // Unknown away team from a non-primary bookmaker: dropped.
        offer(
            "kto",
            "Arsenal",
            "Completely Unknown XI",
            "Premier League",
            Sport::Football,
            kickoff,
            2.40,
            Some(3.30),
            2.90,
        ),
        // Unknown bookmaker: dropped.
        offer(
            "no-such-book",
            "Arsenal",
            "Arsenal",
            "Premier League",
            Sport::Football,
            kickoff,
            1.10,
            Some(9.0),
            21.0,
        ),
        // Unconfigured league: dropped silently.
        offer(
            "betano",
            "Arsenal",
            "Chelsea",
            "Belarus Vysshaya Liga",
            Sport::Football,
            kickoff,
            1.50,
            Some(4.0),
            6.0,
        ),
    ];

    let (orchestrator, shutdown) = orchestrator_with(
        &store,
        &objects,
        vec![Arc::new(StaticSource::new("mixed", vec![offers]))],
    );
    let summary = orchestrator.run_once(&shutdown).await;

    assert_eq!(summary.odds_collected, 3);
    assert_eq!(summary.football_inserted, 0);
    assert!(store.state.lock().football_odds.is_empty());
    assert!(store.state.lock().football_matches.is_empty());

    // The unresolved raw name lands in the unmatched log (best-effort,
    // written in the background).
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let state = store.state.lock();
    assert!(state
        .unmatched
        .iter()
        .any(|u| u.raw_name == "Completely Unknown XI" && u.bookmaker == "kto"));
}

#[tokio::test]
async fn started_matches_are_retired_by_cleanup() {
    let store = Arc::new(MemoryStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let premier = store.add_league("Premier League", Some("Inglaterra"));
    store.add_bookmaker("betano");
    let home = store.add_team("Everton", premier);
    let away = store.add_team("Fulham", premier);

    // A fixture that kicked off an hour ago, left over from earlier cycles.
    store
        .state
        .lock()
        .football_matches
        .push(odds_harvester::types::MatchRecord {
            id: uuid::Uuid::new_v4(),
            league_id: premier,
            home_team_id: home,
            away_team_id: away,
            match_date: Utc::now() - Duration::hours(1),
            status: "scheduled".to_string(),
            is_inverted: false,
        });

    let (orchestrator, shutdown) = orchestrator_with(&store, &objects, vec![]);
    let summary = orchestrator.run_once(&shutdown).await;

    assert_eq!(summary.matches_cleaned, 1);
    assert_eq!(store.state.lock().football_matches[0].status, "started");
}

#[tokio::test]
async fn alias_generator_creates_and_suggests() {
    let store = Arc::new(MemoryStore::new());
    let la_liga = store.add_league("La Liga", Some("Espanha"));
    let premier = store.add_league("Premier League", Some("Inglaterra"));
    let atletico = store.add_team("Atlético Madrid", la_liga);
    store.add_team("Nottingham Forest", premier);

    let store_dyn = Arc::clone(&store) as Arc<dyn Store>;
    store_dyn
        .log_unmatched_team("ATLETICO MADRID", "kto", Some("La Liga"))
        .await
        .unwrap();
    store_dyn
        .log_unmatched_team("Nottingham Forest FC", "stake", Some("Premier League"))
        .await
        .unwrap();

    let catalog = Arc::new(IdentityCatalog::new());
    let generator = AliasGenerator::new(Arc::clone(&store_dyn), catalog, true);
    let report = generator.run_once().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.suggested, 1);

    let state = store.state.lock();
    assert!(state.aliases.iter().any(|a| {
        a.alias_name == "ATLETICO MADRID" && a.bookmaker_source == "kto" && a.team_id == atletico
    }));
    // The auto-created entry is marked resolved; the suggestion is not.
    assert_eq!(state.unmatched_resolved.len(), 1);
}
