//! Incremental season reconciliation.
//!
//! Scraped season lines are classified against the last known games-played
//! snapshot. Only players whose games count grew (or who are new) are
//! written; everyone else is left alone.

use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, RepoError, SyncError};
use crate::extract::{Extractor, Row};
use crate::merge::{merge_feeds, MergedPlayer, SeasonFeeds, StatMerger};
use crate::model::{Player, PlayerId, Season};
use crate::report::BatchReport;
use crate::repository::Repository;
use crate::source::{tables, SourceUrls};
use crate::throttle::Throttle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Never seen before.
    Insert,
    /// Known player without a line for this season.
    UpdateExisting,
    /// Games played grew since the last snapshot.
    Update { previous_games: u32 },
    Unchanged,
}

/// Decision for a player present in the snapshot.
pub fn classify_known(games: u32, previous_games: u32) -> Classification {
    if games > previous_games {
        Classification::Update { previous_games }
    } else {
        Classification::Unchanged
    }
}

pub struct PlayerReconciler {
    repo: Arc<dyn Repository>,
    extractor: Arc<dyn Extractor>,
    throttle: Arc<dyn Throttle>,
    merger: StatMerger,
    urls: SourceUrls,
}

impl PlayerReconciler {
    pub fn new(
        repo: Arc<dyn Repository>,
        extractor: Arc<dyn Extractor>,
        throttle: Arc<dyn Throttle>,
        urls: SourceUrls,
    ) -> Self {
        let merger = StatMerger::new(extractor.clone(), throttle.clone(), urls.clone());
        Self { repo, extractor, throttle, merger, urls }
    }

    pub async fn run(&self, season: Season, cancel: &CancellationToken) -> Result<BatchReport, SyncError> {
        let feeds = self.merger.fetch_feeds(season).await?;
        let merged = merge_feeds(season, &feeds);

        let snapshot = match self.repo.season_games_played(season).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(season = %season, "games snapshot unreadable, treating every player as unseen: {e}");
                HashMap::new()
            }
        };

        let (mut report, written) = self.apply(&merged, &snapshot, cancel).await?;
        report.skipped += unkeyed_rows(&feeds.basic);

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let traded: IndexSet<PlayerId> = merged
            .iter()
            .filter(|m| m.traded && written.contains(&m.id))
            .map(|m| m.id.clone())
            .collect();
        if !traded.is_empty() {
            self.throttle.pace().await;
            let fresh = self.merger.fetch_feeds(season).await?;
            report.absorb(correct_traded(self.repo.as_ref(), season, &fresh, &traded).await);
        }

        self.throttle.pace().await;
        report.absorb(
            mark_rookies(self.repo.as_ref(), self.extractor.as_ref(), &self.urls, season).await?,
        );

        if let Err(e) = self.repo.record_season(&season.label()).await {
            report.fail(season.label(), "season_catalog", e);
        }

        info!(season = %season, "reconciliation finished: {report}");
        Ok(report)
    }

    /// Classifies one merged line. Existence is double-checked for players
    /// missing from the snapshot so that a player without a season line is
    /// updated rather than inserted twice.
    pub async fn classify(
        &self,
        record: &MergedPlayer,
        snapshot: &HashMap<PlayerId, u32>,
    ) -> Result<Classification, RepoError> {
        if let Some(&previous) = snapshot.get(&record.id) {
            return Ok(classify_known(record.stats.games, previous));
        }
        if self.repo.player_exists(&record.id).await? {
            Ok(Classification::UpdateExisting)
        } else {
            Ok(Classification::Insert)
        }
    }

    /// Writes every inserted or updated line and returns the ids it wrote.
    pub async fn apply(
        &self,
        merged: &[MergedPlayer],
        snapshot: &HashMap<PlayerId, u32>,
        cancel: &CancellationToken,
    ) -> Result<(BatchReport, IndexSet<PlayerId>), SyncError> {
        let mut report = BatchReport::default();
        let mut written = IndexSet::new();

        for record in merged {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let classification = match self.classify(record, snapshot).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(player = %record.id, "existence check failed: {e}");
                    report.fail(record.id.to_string(), "existence_check", e);
                    continue;
                }
            };

            let result = match classification {
                Classification::Unchanged => {
                    report.unchanged += 1;
                    continue;
                }
                Classification::Insert => self.insert(record).await,
                Classification::UpdateExisting | Classification::Update { .. } => {
                    self.update(record).await
                }
            };

            match result {
                Ok(()) => {
                    if classification == Classification::Insert {
                        report.inserted += 1;
                    } else {
                        report.updated += 1;
                    }
                    written.insert(record.id.clone());
                }
                Err(e) => {
                    warn!(player = %record.id, ?classification, "write failed: {e}");
                    report.fail(record.id.to_string(), "persist", e);
                }
            }
            debug!(player = %record.id, ?classification, "reconciled");
        }

        Ok((report, written))
    }

    async fn insert(&self, record: &MergedPlayer) -> Result<(), RepoError> {
        self.repo.upsert_player(&player_from_merged(record)).await?;
        self.repo.upsert_season_stats(&record.stats).await?;
        self.repo.upsert_advanced_stats(&record.advanced).await?;
        Ok(())
    }

    async fn update(&self, record: &MergedPlayer) -> Result<(), RepoError> {
        self.repo
            .update_player_details(&record.id, record.age, &record.team)
            .await?;
        self.repo.upsert_season_stats(&record.stats).await?;
        self.repo.upsert_advanced_stats(&record.advanced).await?;
        Ok(())
    }
}

/// Rows that carry data but no player link (league averages, separators).
fn unkeyed_rows(rows: &[Row]) -> usize {
    rows.iter()
        .filter(|r| !r.is_empty() && r.player_id().is_none())
        .count()
}

pub(crate) fn player_from_merged(record: &MergedPlayer) -> Player {
    Player {
        id: record.id.clone(),
        name: record.name.clone(),
        college: String::new(),
        height: String::new(),
        weight: String::new(),
        team: record.team.clone(),
        age: record.age,
        position: record.stats.position.clone(),
    }
}

/// Rewrites the statistics of the listed traded players from the aggregate
/// line, leaving the stored team alone.
pub async fn correct_traded(
    repo: &dyn Repository,
    season: Season,
    feeds: &SeasonFeeds,
    players: &IndexSet<PlayerId>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let merged = merge_feeds(season, feeds);
    for record in merged.iter().filter(|m| m.traded && players.contains(&m.id)) {
        let result: Result<u64, RepoError> = async {
            repo.update_traded_stats(&record.stats).await?;
            repo.update_traded_advanced(&record.advanced).await
        }
        .await;
        if let Err(e) = result {
            warn!(player = %record.id, "traded correction failed: {e}");
            report.fail(record.id.to_string(), "traded_correction", e);
        }
    }
    report
}

/// Flags every player on the season's rookie listing.
pub async fn mark_rookies(
    repo: &dyn Repository,
    extractor: &dyn Extractor,
    urls: &SourceUrls,
    season: Season,
) -> Result<BatchReport, ExtractError> {
    let rows = extractor.fetch_rows(&urls.rookies(season), tables::ROOKIES).await?;
    let ids: IndexSet<PlayerId> = rows.iter().filter_map(Row::player_id).collect();

    let mut report = BatchReport::default();
    for id in ids {
        if let Err(e) = repo.set_rookie(&id, season).await {
            warn!(player = %id, "rookie flag failed: {e}");
            report.fail(id.to_string(), "rookie", e);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SeasonStatRecord;
    use crate::testing::{rows, MemoryRepository, ScriptedExtractor};
    use crate::throttle::FixedDelay;
    use std::time::Duration;

    const BASE: &str = "https://bref.test";

    fn season() -> Season {
        Season::new(2025)
    }

    fn script(basic: Vec<Row>, advanced: Vec<Row>, ratings: Vec<Row>, rookies: Vec<Row>) -> ScriptedExtractor {
        let urls = SourceUrls::new(BASE);
        ScriptedExtractor::new()
            .with_rows(&urls.per_game(season()), tables::PER_GAME, basic)
            .with_rows(&urls.advanced(season()), tables::ADVANCED, advanced)
            .with_rows(&urls.per_poss(season()), tables::PER_POSS, ratings)
            .with_rows(&urls.rookies(season()), tables::ROOKIES, rookies)
    }

    fn reconciler(repo: Arc<MemoryRepository>, extractor: ScriptedExtractor) -> PlayerReconciler {
        PlayerReconciler::new(
            repo,
            Arc::new(extractor),
            Arc::new(FixedDelay::new(Duration::ZERO)),
            SourceUrls::new(BASE),
        )
    }

    fn seed_known(repo: &MemoryRepository, id: &str, games: u32) {
        let pid = PlayerId::new(id).unwrap();
        repo.seed_player(Player {
            id: pid.clone(),
            name: id.to_string(),
            college: String::new(),
            height: String::new(),
            weight: String::new(),
            team: "BOS".to_string(),
            age: 26,
            position: "SG".to_string(),
        });
        repo.seed_season_stats(SeasonStatRecord {
            games,
            team: "BOS".to_string(),
            ..SeasonStatRecord::empty(pid, season())
        });
    }

    #[test]
    fn games_gate_is_strict() {
        assert_eq!(classify_known(41, 41), Classification::Unchanged);
        assert_eq!(classify_known(40, 41), Classification::Unchanged);
        assert_eq!(classify_known(45, 41), Classification::Update { previous_games: 41 });
    }

    #[tokio::test]
    async fn equal_games_are_not_written() {
        let repo = Arc::new(MemoryRepository::new());
        seed_known(&repo, "smithjo01", 41);
        let extractor = script(vec![rows::basic("smithjo01", "BOS", 41)], vec![], vec![], vec![]);

        let report = reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.updated + report.inserted, 0);
        assert_eq!(repo.entity_writes(), 0);
    }

    #[tokio::test]
    async fn grown_games_produce_exactly_one_update() {
        let repo = Arc::new(MemoryRepository::new());
        seed_known(&repo, "smithjo01", 41);
        let extractor = script(vec![rows::basic("smithjo01", "NYK", 45)], vec![], vec![], vec![]);

        let report = reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.inserted, 0);
        let stats = repo.season_stats("smithjo01", season()).unwrap();
        assert_eq!(stats.games, 45);
        assert_eq!(repo.player("smithjo01").unwrap().team, "NYK");
        assert_eq!(repo.player_count(), 1);
    }

    #[tokio::test]
    async fn known_player_without_season_line_is_updated_not_duplicated() {
        let repo = Arc::new(MemoryRepository::new());
        repo.seed_player(Player {
            id: PlayerId::new("veteran01").unwrap(),
            name: "Vet".to_string(),
            college: "UCLA".to_string(),
            height: "6-6".to_string(),
            weight: "210".to_string(),
            team: "LAL".to_string(),
            age: 34,
            position: "SF".to_string(),
        });
        let extractor = script(vec![rows::basic("veteran01", "LAL", 3)], vec![], vec![], vec![]);

        let report = reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.inserted, 0);
        assert_eq!(repo.player_count(), 1);
        // bio is kept, only age and team refreshed
        assert_eq!(repo.player("veteran01").unwrap().college, "UCLA");
        assert!(repo.season_stats("veteran01", season()).is_some());
    }

    #[tokio::test]
    async fn new_player_gets_all_three_records() {
        let repo = Arc::new(MemoryRepository::new());
        let extractor = script(
            vec![rows::basic("newguy01", "MIA", 12)],
            vec![rows::advanced("newguy01", "MIA", 14.2)],
            vec![rows::ratings("newguy01", "MIA", 112.0, 109.0)],
            vec![],
        );

        let report = reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert!(repo.player("newguy01").is_some());
        assert_eq!(repo.season_stats("newguy01", season()).unwrap().games, 12);
        let adv = repo.advanced_stats("newguy01", season()).unwrap();
        assert_eq!(adv.per, 14.2);
        assert_eq!(adv.off_rating, 112.0);
    }

    #[tokio::test]
    async fn failed_existence_check_never_inserts_blind() {
        let repo = Arc::new(MemoryRepository::new());
        repo.fail_exists_for("ghost01");
        let extractor = script(
            vec![rows::basic("ghost01", "DEN", 5), rows::basic("real01", "DEN", 5)],
            vec![],
            vec![],
            vec![],
        );

        let report = reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed_keys(), vec!["ghost01"]);
        assert_eq!(report.failures[0].stage, "existence_check");
        assert!(repo.player("ghost01").is_none());
        assert!(repo.player("real01").is_some());
    }

    #[tokio::test]
    async fn unreadable_snapshot_fails_open() {
        let repo = Arc::new(MemoryRepository::new());
        seed_known(&repo, "smithjo01", 41);
        repo.fail_snapshot_reads();
        let extractor = script(vec![rows::basic("smithjo01", "BOS", 41)], vec![], vec![], vec![]);

        let report = reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap();

        // unseen but existing -> update path, never a duplicate
        assert_eq!(report.updated, 1);
        assert_eq!(repo.player_count(), 1);
    }

    #[tokio::test]
    async fn missing_feed_aborts_before_any_write() {
        let repo = Arc::new(MemoryRepository::new());
        let urls = SourceUrls::new(BASE);
        let extractor = ScriptedExtractor::new()
            .with_rows(&urls.per_game(season()), tables::PER_GAME, vec![rows::basic("a01", "ATL", 3)])
            .with_failure(&urls.advanced(season()));

        let err = reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Extraction(_)));
        assert_eq!(repo.entity_writes(), 0);
        assert!(repo.seasons().is_empty());
    }

    #[tokio::test]
    async fn one_failed_write_does_not_stop_the_batch() {
        let repo = Arc::new(MemoryRepository::new());
        repo.fail_writes_for("bad01");
        let extractor = script(
            vec![
                rows::basic("good01", "PHX", 4),
                rows::basic("bad01", "PHX", 4),
                rows::basic("good02", "PHX", 4),
            ],
            vec![],
            vec![],
            vec![],
        );

        let report = reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed_keys(), vec!["bad01"]);
        assert!(repo.player("good02").is_some());
        assert_eq!(repo.seasons(), vec!["2025".to_string()]);
    }

    #[tokio::test]
    async fn traded_correction_keeps_stored_team() {
        let repo = MemoryRepository::new();
        let pid = PlayerId::new("mover01").unwrap();
        repo.seed_season_stats(SeasonStatRecord {
            games: 10,
            team: "AAA".to_string(),
            ..SeasonStatRecord::empty(pid, season())
        });
        let feeds = SeasonFeeds {
            basic: vec![
                rows::basic("mover01", "TOT", 25),
                rows::basic("mover01", "AAA", 10),
                rows::basic("mover01", "BBB", 15),
                rows::basic("stayer01", "CCC", 30),
            ],
            ..SeasonFeeds::default()
        };

        let only: IndexSet<PlayerId> = PlayerId::new("mover01").into_iter().collect();
        let report = correct_traded(&repo, season(), &feeds, &only).await;

        assert!(report.failures.is_empty());
        let stats = repo.season_stats("mover01", season()).unwrap();
        assert_eq!(stats.games, 25);
        assert_eq!(stats.team, "AAA");
        assert!(repo.season_stats("stayer01", season()).is_none());
    }

    #[tokio::test]
    async fn unchanged_traded_player_is_not_corrected() {
        let repo = Arc::new(MemoryRepository::new());
        seed_known(&repo, "mover01", 41);
        let urls = SourceUrls::new(BASE);
        let extractor = Arc::new(script(
            vec![
                rows::basic("mover01", "TOT", 41),
                rows::basic("mover01", "AAA", 20),
                rows::basic("mover01", "BBB", 21),
            ],
            vec![rows::advanced("mover01", "TOT", 16.0)],
            vec![],
            vec![],
        ));
        let reconciler = PlayerReconciler::new(
            repo.clone(),
            extractor.clone(),
            Arc::new(FixedDelay::new(Duration::ZERO)),
            urls.clone(),
        );

        let report = reconciler.run(season(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.updated + report.inserted, 0);
        assert_eq!(repo.entity_writes(), 0);
        // no second pass over the league feeds
        assert_eq!(extractor.request_count(&urls.per_game(season())), 1);
    }

    #[tokio::test]
    async fn updated_traded_player_is_corrected_once() {
        let repo = Arc::new(MemoryRepository::new());
        seed_known(&repo, "mover01", 30);
        let urls = SourceUrls::new(BASE);
        let extractor = Arc::new(script(
            vec![
                rows::basic("mover01", "TOT", 41),
                rows::basic("mover01", "AAA", 20),
                rows::basic("mover01", "BBB", 21),
            ],
            vec![],
            vec![],
            vec![],
        ));
        let reconciler = PlayerReconciler::new(
            repo.clone(),
            extractor.clone(),
            Arc::new(FixedDelay::new(Duration::ZERO)),
            urls.clone(),
        );

        let report = reconciler.run(season(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(extractor.request_count(&urls.per_game(season())), 2);
        let line = repo.season_stats("mover01", season()).unwrap();
        assert_eq!(line.games, 41);
        assert_eq!(repo.player("mover01").unwrap().team, "BBB");
    }

    #[tokio::test]
    async fn rookies_are_flagged_after_the_batch() {
        let repo = Arc::new(MemoryRepository::new());
        let extractor = script(
            vec![rows::basic("rook01", "SAS", 20), rows::basic("vet01", "SAS", 20)],
            vec![],
            vec![],
            vec![rows::rookie("rook01"), rows::rookie("rook01")],
        );

        reconciler(repo.clone(), extractor)
            .run(season(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(repo.season_stats("rook01", season()).unwrap().rookie);
        assert!(!repo.season_stats("vet01", season()).unwrap().rookie);
    }

    #[tokio::test]
    async fn cancelled_run_stops_at_the_next_player() {
        let repo = Arc::new(MemoryRepository::new());
        let extractor = script(vec![rows::basic("a01", "ATL", 3)], vec![], vec![], vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = reconciler(repo.clone(), extractor).run(season(), &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(repo.entity_writes(), 0);
    }
}
