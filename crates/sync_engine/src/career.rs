//! All-time ("GOAT") career aggregation.
//!
//! Candidates come from the union of several all-time leaderboards. Each
//! candidate's page provides career footer lines for the regular season and
//! the playoffs; only the first NBA line of each table is used.

use indexmap::IndexSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::achievements::Achievements;
use crate::error::{ExtractError, RepoError, SyncError};
use crate::extract::{Extractor, Page, Row};
use crate::model::{CareerPlayer, CareerStatRecord, PlayerId, CAREER_SEASON_LABELS};
use crate::report::BatchReport;
use crate::repository::{Repository, UpsertOutcome};
use crate::source::{tables, SourceUrls, LEAGUE_MARKER};
use crate::throttle::Throttle;

pub const DEFAULT_FAILURE_PAUSE: Duration = Duration::from_secs(4);

/// Everything scraped from one player page.
#[derive(Debug, Clone, PartialEq)]
pub struct CareerProfile {
    pub player: CareerPlayer,
    pub regular: CareerStatRecord,
    pub playoffs: CareerStatRecord,
}

fn league_footer<'a>(page: &'a Page, table: &str) -> Option<&'a Row> {
    page.table(table)?
        .footer
        .iter()
        .find(|row| row.text("lg_id") == LEAGUE_MARKER)
}

struct CareerTables {
    per_game: &'static str,
    totals: &'static str,
    advanced: &'static str,
    per_poss: &'static str,
}

const REGULAR: CareerTables = CareerTables {
    per_game: tables::CAREER_PER_GAME,
    totals: tables::CAREER_TOTALS,
    advanced: tables::CAREER_ADVANCED,
    per_poss: tables::CAREER_PER_POSS,
};

const PLAYOFFS: CareerTables = CareerTables {
    per_game: tables::PLAYOFFS_PER_GAME,
    totals: tables::PLAYOFFS_TOTALS,
    advanced: tables::PLAYOFFS_ADVANCED,
    per_poss: tables::PLAYOFFS_PER_POSS,
};

fn career_line(page: &Page, id: &PlayerId, is_playoffs: bool, source: &CareerTables) -> CareerStatRecord {
    let mut line = CareerStatRecord::empty(id.clone(), is_playoffs);

    if let Some(row) = league_footer(page, source.per_game) {
        line.games = row.count("g");
        line.minutes = row.float("mp_per_g");
        line.points = row.float("pts_per_g");
        line.rebounds = row.float("trb_per_g");
        line.assists = row.float("ast_per_g");
        line.steals = row.float("stl_per_g");
        line.blocks = row.float("blk_per_g");
        line.turnovers = row.float("tov_per_g");
        line.fg_pct = row.percent("fg_pct");
        line.fg3_pct = row.percent("fg3_pct");
        line.ft_pct = row.percent("ft_pct");
    }
    if let Some(row) = league_footer(page, source.totals) {
        line.total_points = row.count("pts");
        line.total_rebounds = row.count("trb");
        line.total_assists = row.count("ast");
        line.total_steals = row.count("stl");
        line.total_blocks = row.count("blk");
    }
    if let Some(row) = league_footer(page, source.advanced) {
        line.per = row.float("per");
        line.ows = row.float("ows");
        line.dws = row.float("dws");
        line.ws = row.float("ws");
        line.obpm = row.float("obpm");
        line.dbpm = row.float("dbpm");
        line.bpm = row.float("bpm");
        line.vorp = row.float("vorp");
    }
    if let Some(row) = league_footer(page, source.per_poss) {
        line.off_rating = row.float("off_rtg");
        line.def_rating = row.float("def_rtg");
    }
    line
}

/// Builds the career profile of `id` from its player page.
pub fn parse_career_page(id: &PlayerId, page: &Page) -> CareerProfile {
    let active = page.meta_lines.iter().any(|line| line.contains("Experience"));
    let name = page
        .heading
        .clone()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| id.to_string());

    // most recent season line with a listed position
    let position = page
        .table(tables::CAREER_PER_GAME)
        .and_then(|t| t.body.iter().rev().map(|r| r.text("pos")).find(|p| !p.is_empty()))
        .unwrap_or("")
        .to_string();

    let mut regular = career_line(page, id, false, &REGULAR);
    let mut playoffs = career_line(page, id, true, &PLAYOFFS);
    for line in [&mut regular, &mut playoffs] {
        line.position = position.clone();
        line.active = active;
    }

    CareerProfile {
        player: CareerPlayer {
            id: id.clone(),
            name,
            active,
            achievements: Achievements::parse(&page.bling),
        },
        regular,
        playoffs,
    }
}

pub struct CareerAggregator {
    repo: Arc<dyn Repository>,
    extractor: Arc<dyn Extractor>,
    throttle: Arc<dyn Throttle>,
    urls: SourceUrls,
    failure_pause: Duration,
}

impl CareerAggregator {
    pub fn new(
        repo: Arc<dyn Repository>,
        extractor: Arc<dyn Extractor>,
        throttle: Arc<dyn Throttle>,
        urls: SourceUrls,
    ) -> Self {
        Self {
            repo,
            extractor,
            throttle,
            urls,
            failure_pause: DEFAULT_FAILURE_PAUSE,
        }
    }

    /// Pause taken after a persistence failure before the next candidate.
    pub fn with_failure_pause(mut self, pause: Duration) -> Self {
        self.failure_pause = pause;
        self
    }

    /// Union of leaderboard player ids in first-seen order. Unreadable
    /// leaderboards are skipped; the run fails only if none could be read.
    pub async fn discover_candidates(&self, cancel: &CancellationToken) -> Result<Vec<PlayerId>, SyncError> {
        let mut ids: IndexSet<PlayerId> = IndexSet::new();
        let mut last_error: Option<ExtractError> = None;
        let mut read = 0usize;

        for url in self.urls.leaderboards() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.extractor.fetch_rows(&url, tables::LEADERS).await {
                Ok(rows) => {
                    read += 1;
                    ids.extend(rows.iter().filter_map(Row::player_id));
                }
                Err(e) => {
                    warn!(%url, "leaderboard skipped: {e}");
                    last_error = Some(e);
                }
            }
            self.throttle.pace().await;
        }

        match (read, last_error) {
            (0, Some(e)) => Err(SyncError::Extraction(e)),
            _ => {
                info!(candidates = ids.len(), leaderboards = read, "career candidates collected");
                Ok(ids.into_iter().collect())
            }
        }
    }

    pub async fn scrape(&self, id: &PlayerId) -> Result<CareerProfile, ExtractError> {
        let page = self.extractor.fetch_page(&self.urls.player(id)).await?;
        Ok(parse_career_page(id, &page))
    }

    /// Leaderboard discovery followed by insert-or-update of every candidate.
    pub async fn run_discovery(&self, cancel: &CancellationToken) -> Result<BatchReport, SyncError> {
        let candidates = self.discover_candidates(cancel).await?;
        let mut report = self.persist_candidates(&candidates, cancel).await?;

        for label in CAREER_SEASON_LABELS {
            if let Err(e) = self.repo.record_season(label).await {
                report.fail(label, "season_catalog", e);
            }
        }
        info!("career discovery finished: {report}");
        Ok(report)
    }

    /// Scrapes and upserts the given candidates. Retired players already on
    /// record are left untouched.
    pub async fn persist_candidates(
        &self,
        candidates: &[PlayerId],
        cancel: &CancellationToken,
    ) -> Result<BatchReport, SyncError> {
        let mut report = BatchReport::default();

        for id in candidates {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match self.repo.career_player_active(id).await {
                Ok(Some(false)) => {
                    debug!(player = %id, "retired and on record, skipping");
                    report.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => warn!(player = %id, "career status unreadable, scraping anyway: {e}"),
            }

            let profile = match self.scrape(id).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(player = %id, "career page unreadable: {e}");
                    report.fail(id.to_string(), "scrape", e);
                    self.throttle.pace().await;
                    continue;
                }
            };
            self.throttle.pace().await;

            match self.upsert_profile(&profile).await {
                Ok(outcome) => report.count(outcome),
                Err(e) => {
                    warn!(player = %id, "career write failed: {e}");
                    report.fail(id.to_string(), "persist", e);
                    tokio::time::sleep(self.failure_pause).await;
                }
            }
        }

        Ok(report)
    }

    async fn upsert_profile(&self, profile: &CareerProfile) -> Result<UpsertOutcome, RepoError> {
        let outcome = self.repo.upsert_career_player(&profile.player).await?;
        self.repo.upsert_career_stats(&profile.regular).await?;
        self.repo.upsert_career_stats(&profile.playoffs).await?;
        Ok(outcome)
    }

    /// Re-scrapes players still flagged active. Update only: a player that
    /// retired since is written once with `active = false` and drops out of
    /// later refreshes.
    pub async fn run_refresh(&self, cancel: &CancellationToken) -> Result<BatchReport, SyncError> {
        let active = self.repo.active_career_players().await?;
        let mut report = BatchReport::default();

        for id in &active {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let profile = match self.scrape(id).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(player = %id, "career page unreadable: {e}");
                    report.fail(id.to_string(), "scrape", e);
                    self.throttle.pace().await;
                    continue;
                }
            };
            self.throttle.pace().await;

            match self.update_profile(&profile).await {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    warn!(player = %id, "career refresh write failed: {e}");
                    report.fail(id.to_string(), "persist", e);
                    tokio::time::sleep(self.failure_pause).await;
                }
            }
        }

        info!(active = active.len(), "career refresh finished: {report}");
        Ok(report)
    }

    async fn update_profile(&self, profile: &CareerProfile) -> Result<(), RepoError> {
        self.repo.update_career_player(&profile.player).await?;
        self.repo.update_career_stats(&profile.regular).await?;
        self.repo.update_career_stats(&profile.playoffs).await?;
        Ok(())
    }
}
