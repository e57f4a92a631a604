//! Full import of one season: franchises, rosters and every player's lines.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, RepoError, SyncError};
use crate::extract::{Extractor, Row};
use crate::merge::{MergedPlayer, StatMerger};
use crate::model::{Player, PlayerId, Season, Team};
use crate::reconcile::{mark_rookies, player_from_merged};
use crate::report::BatchReport;
use crate::repository::Repository;
use crate::source::{tables, SourceUrls};
use crate::teams::team_from_index_row;
use crate::throttle::Throttle;

/// Biography lines of a team page roster, attributed to `team`.
pub fn roster_players(rows: &[Row], team: &str) -> Vec<Player> {
    rows.iter()
        .filter_map(|row| {
            Some(Player {
                id: row.player_id()?,
                name: row.player_name().to_string(),
                college: row.text("college").to_string(),
                height: row.text("height").to_string(),
                weight: row.text("weight").to_string(),
                team: team.to_string(),
                age: 0,
                position: row.text("pos").to_string(),
            })
        })
        .collect()
}

pub struct RosterBootstrapper {
    repo: Arc<dyn Repository>,
    extractor: Arc<dyn Extractor>,
    throttle: Arc<dyn Throttle>,
    merger: StatMerger,
    urls: SourceUrls,
}

impl RosterBootstrapper {
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
        let mut report = BatchReport::default();

        let teams = self.fetch_teams().await?;
        info!(season = %season, teams = teams.len(), "bootstrap: franchise index read");

        let mut roster: IndexMap<PlayerId, Player> = IndexMap::new();
        for mut team in teams {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.throttle.pace().await;

            let page = self
                .extractor
                .fetch_page(&self.urls.team_season(&team.abbreviation, season))
                .await?;
            team.logo_url = page.logo.clone().unwrap_or_default();

            match page.table(tables::ROSTER) {
                Some(table) => {
                    for player in roster_players(&table.body, &team.abbreviation) {
                        roster.insert(player.id.clone(), player);
                    }
                }
                None => {
                    let missing = ExtractError::MissingTable {
                        url: page.url.clone(),
                        table: tables::ROSTER.to_string(),
                    };
                    warn!(team = %team.abbreviation, "{missing}");
                    report.fail(team.abbreviation.clone(), "roster", missing);
                }
            }

            if let Err(e) = self.repo.upsert_team(&team).await {
                warn!(team = %team.abbreviation, "team write failed: {e}");
                report.fail(team.abbreviation.clone(), "team", e);
            }
        }

        self.throttle.pace().await;
        let merged = self.merger.merge_season(season).await?;
        let mut by_id: HashMap<&PlayerId, &MergedPlayer> = merged.iter().map(|m| (&m.id, m)).collect();

        // Roster players first, then anyone who only shows up in the league feeds.
        let mut work: Vec<(Player, Option<&MergedPlayer>)> = roster
            .into_values()
            .map(|player| {
                let line = by_id.remove(&player.id);
                (player, line)
            })
            .collect();
        work.extend(
            merged
                .iter()
                .filter(|m| by_id.contains_key(&m.id))
                .map(|m| (player_from_merged(m), Some(m))),
        );

        for (player, line) in work {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let player = with_season_line(player, line);
            match self.write_player(&player, line, &mut report).await {
                Ok(()) => debug!(player = %player.id, "bootstrapped"),
                Err(e) => {
                    warn!(player = %player.id, "bootstrap write failed: {e}");
                    report.fail(player.id.to_string(), "persist", e);
                }
            }
        }

        self.throttle.pace().await;
        report.absorb(
            mark_rookies(self.repo.as_ref(), self.extractor.as_ref(), &self.urls, season).await?,
        );

        if let Err(e) = self.repo.record_season(&season.label()).await {
            report.fail(season.label(), "season_catalog", e);
        }

        info!(season = %season, "bootstrap finished: {report}");
        Ok(report)
    }

    async fn fetch_teams(&self) -> Result<Vec<Team>, ExtractError> {
        let rows = self
            .extractor
            .fetch_rows(&self.urls.team_index(), tables::TEAMS_ACTIVE)
            .await?;
        Ok(rows
            .iter()
            .filter(|row| row.has_class("full_table"))
            .filter_map(team_from_index_row)
            .collect())
    }

    async fn write_player(
        &self,
        player: &Player,
        line: Option<&MergedPlayer>,
        report: &mut BatchReport,
    ) -> Result<(), RepoError> {
        let outcome = self.repo.upsert_player(player).await?;
        if let Some(line) = line {
            self.repo.upsert_season_stats(&line.stats).await?;
            self.repo.upsert_advanced_stats(&line.advanced).await?;
        }
        report.count(outcome);
        Ok(())
    }
}

/// Age, current team and position come from the league feed when present.
fn with_season_line(mut player: Player, line: Option<&MergedPlayer>) -> Player {
    if let Some(line) = line {
        player.age = line.age;
        if !line.team.is_empty() {
            player.team = line.team.clone();
        }
        if player.position.is_empty() {
            player.position = line.stats.position.clone();
        }
    }
    player
}
