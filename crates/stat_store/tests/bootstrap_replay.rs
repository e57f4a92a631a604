//! Replaying a season import against a real database must not grow it.

use std::sync::Arc;
use std::time::Duration;

use stat_store::SqliteStore;
use sync_engine::bootstrap::RosterBootstrapper;
use sync_engine::career::CareerAggregator;
use sync_engine::reconcile::PlayerReconciler;
use sync_engine::source::tables;
use sync_engine::testing::{rows, ScriptedExtractor};
use sync_engine::{FixedDelay, Page, PlayerId, Season, SourceUrls, Table};
use tokio_util::sync::CancellationToken;

const BASE: &str = "https://bref.test";

fn season() -> Season {
    Season::new(2025)
}

fn league(urls: &SourceUrls) -> ScriptedExtractor {
    let roster = |abbr: &str, players: Vec<sync_engine::Row>| {
        Page::new(urls.team_season(abbr, season()))
            .with_table(tables::ROSTER, Table { body: players, footer: vec![] })
    };
    ScriptedExtractor::new()
        .with_rows(
            &urls.team_index(),
            tables::TEAMS_ACTIVE,
            vec![rows::team_index("AAA", "Alpha"), rows::team_index("BBB", "Beta")],
        )
        .with_page(roster("AAA", vec![rows::roster("mover01", "Mo Ver"), rows::roster("one01", "Solo")]))
        .with_page(roster("BBB", vec![rows::roster("mover01", "Mo Ver"), rows::roster("two01", "Duo")]))
        .with_rows(
            &urls.per_game(season()),
            tables::PER_GAME,
            vec![
                rows::basic("mover01", "TOT", 25),
                rows::basic("mover01", "AAA", 10),
                rows::basic("mover01", "BBB", 15),
                rows::basic("one01", "AAA", 30),
                rows::basic("two01", "BBB", 28),
            ],
        )
        .with_rows(
            &urls.advanced(season()),
            tables::ADVANCED,
            vec![rows::advanced("mover01", "TOT", 14.0), rows::advanced("mover01", "AAA", 11.0)],
        )
        .with_rows(&urls.per_poss(season()), tables::PER_POSS, vec![rows::ratings("one01", "AAA", 112.0, 108.0)])
        .with_rows(&urls.rookies(season()), tables::ROOKIES, vec![rows::rookie("two01")])
}

/// One leaderboard naming an active player twice, plus that player's page.
fn career_source(urls: &SourceUrls) -> ScriptedExtractor {
    let nba = |stats: &[(&str, &str)]| {
        stats
            .iter()
            .fold(sync_engine::Row::new().with_cell("lg_id", "NBA"), |row, (k, v)| row.with_cell(*k, *v))
    };
    let mut page = Page::new(urls.player(&pid("star01")))
        .with_table(
            tables::CAREER_PER_GAME,
            Table {
                body: vec![sync_engine::Row::new().with_cell("pos", "PG")],
                footer: vec![nba(&[("g", "820"), ("pts_per_g", "24.3"), ("tov_per_g", "3.2")])],
            },
        )
        .with_table(
            tables::PLAYOFFS_PER_GAME,
            Table { body: vec![], footer: vec![nba(&[("g", "150"), ("pts_per_g", "26.0")])] },
        );
    page.heading = Some("Star".to_string());
    page.meta_lines = vec!["Experience: 11 years".to_string()];
    page.bling = vec!["4x All-Star".to_string()];

    ScriptedExtractor::new()
        .with_rows(
            &urls.leaderboards()[0],
            tables::LEADERS,
            vec![rows::rookie("star01"), rows::rookie("star01")],
        )
        .with_page(page)
}

fn pid(raw: &str) -> PlayerId {
    PlayerId::new(raw).unwrap()
}

#[tokio::test]
async fn bootstrap_twice_leaves_identical_row_counts() {
    let urls = SourceUrls::new(BASE);
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let bootstrapper = RosterBootstrapper::new(
        store.clone(),
        Arc::new(league(&urls)),
        Arc::new(FixedDelay::new(Duration::ZERO)),
        urls.clone(),
    );

    let first = bootstrapper.run(season(), &CancellationToken::new()).await.unwrap();
    let counts = store.row_counts().unwrap();
    let second = bootstrapper.run(season(), &CancellationToken::new()).await.unwrap();

    assert_eq!(first.inserted, 3);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 3);
    assert_eq!(store.row_counts().unwrap(), counts);

    let mover = store.player(&pid("mover01")).unwrap().unwrap();
    assert_eq!(mover.team, "BBB");
    let line = store.season_stats(&pid("mover01"), season()).unwrap().unwrap();
    assert_eq!(line.games, 25);
    assert!(store.season_stats(&pid("two01"), season()).unwrap().unwrap().rookie);
}

#[tokio::test]
async fn incremental_after_bootstrap_only_touches_changed_players() {
    let urls = SourceUrls::new(BASE);
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let extractor = Arc::new(league(&urls));
    let throttle = Arc::new(FixedDelay::new(Duration::ZERO));

    RosterBootstrapper::new(store.clone(), extractor.clone(), throttle.clone(), urls.clone())
        .run(season(), &CancellationToken::new())
        .await
        .unwrap();

    extractor.set_page(
        Page::new(urls.per_game(season())).with_table(
            tables::PER_GAME,
            Table {
                body: vec![
                    rows::basic("mover01", "TOT", 25),
                    rows::basic("mover01", "AAA", 10),
                    rows::basic("mover01", "BBB", 15),
                    rows::basic("one01", "AAA", 31),
                    rows::basic("two01", "BBB", 28),
                ],
                footer: vec![],
            },
        ),
    );
    let report = PlayerReconciler::new(store.clone(), extractor, throttle, urls)
        .run(season(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.inserted, 0);
    assert_eq!(store.season_stats(&pid("one01"), season()).unwrap().unwrap().games, 31);
    assert_eq!(store.player(&pid("mover01")).unwrap().unwrap().team, "BBB");
}

#[tokio::test]
async fn career_discovery_twice_keeps_one_player_and_two_lines() {
    let urls = SourceUrls::new(BASE);
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let aggregator = CareerAggregator::new(
        store.clone(),
        Arc::new(career_source(&urls)),
        Arc::new(FixedDelay::new(Duration::ZERO)),
        urls,
    )
    .with_failure_pause(Duration::ZERO);

    let count = |table: &str| {
        store
            .row_counts()
            .unwrap()
            .into_iter()
            .find(|(t, _)| *t == table)
            .map(|(_, n)| n)
            .unwrap()
    };

    let first = aggregator.run_discovery(&CancellationToken::new()).await.unwrap();
    assert_eq!(first.inserted, 1);
    assert_eq!(count("career_players"), 1);
    assert_eq!(count("career_stats"), 2);

    let second = aggregator.run_discovery(&CancellationToken::new()).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(count("career_players"), 1);
    assert_eq!(count("career_stats"), 2);

    let regular = store.career_stats(&pid("star01"), false).unwrap().unwrap();
    assert_eq!(regular.games, 820);
    assert_eq!(regular.turnovers, 3.2);
    assert!(regular.active);
    assert_eq!(store.career_stats(&pid("star01"), true).unwrap().unwrap().games, 150);
}
