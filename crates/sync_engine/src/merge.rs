//! Merge of the three league-wide season feeds into one record per player.
//!
//! A traded player appears once per team plus once with the aggregate team
//! marker. The aggregate line carries the statistics; the last per-team line
//! in source order names the team the player currently plays for.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::ExtractError;
use crate::extract::{Extractor, Row};
use crate::model::{AdvancedStatRecord, PlayerId, Season, SeasonStatRecord};
use crate::source::{tables, SourceUrls, AGGREGATE_TEAM};
use crate::throttle::Throttle;

/// Raw rows of the three feeds for one season.
#[derive(Debug, Clone, Default)]
pub struct SeasonFeeds {
    pub basic: Vec<Row>,
    pub advanced: Vec<Row>,
    pub ratings: Vec<Row>,
}

/// Which secondary feeds had a line for the player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedCoverage {
    pub advanced: bool,
    pub ratings: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedPlayer {
    pub id: PlayerId,
    pub name: String,
    pub age: u32,
    /// Current team (last per-team line).
    pub team: String,
    /// Whether an aggregate line was present.
    pub traded: bool,
    pub stats: SeasonStatRecord,
    pub advanced: AdvancedStatRecord,
    pub coverage: FeedCoverage,
}

pub struct StatMerger {
    extractor: Arc<dyn Extractor>,
    throttle: Arc<dyn Throttle>,
    urls: SourceUrls,
}

impl StatMerger {
    pub fn new(extractor: Arc<dyn Extractor>, throttle: Arc<dyn Throttle>, urls: SourceUrls) -> Self {
        Self { extractor, throttle, urls }
    }

    /// basic -> advanced -> ratings, paced. Any failure aborts.
    pub async fn fetch_feeds(&self, season: Season) -> Result<SeasonFeeds, ExtractError> {
        let basic = self
            .extractor
            .fetch_rows(&self.urls.per_game(season), tables::PER_GAME)
            .await?;
        self.throttle.pace().await;

        let advanced = self
            .extractor
            .fetch_rows(&self.urls.advanced(season), tables::ADVANCED)
            .await?;
        self.throttle.pace().await;

        let ratings = self
            .extractor
            .fetch_rows(&self.urls.per_poss(season), tables::PER_POSS)
            .await?;

        debug!(
            season = %season,
            basic = basic.len(),
            advanced = advanced.len(),
            ratings = ratings.len(),
            "season feeds fetched"
        );
        Ok(SeasonFeeds { basic, advanced, ratings })
    }

    pub async fn merge_season(&self, season: Season) -> Result<Vec<MergedPlayer>, ExtractError> {
        let feeds = self.fetch_feeds(season).await?;
        Ok(merge_feeds(season, &feeds))
    }
}

fn is_aggregate(row: &Row) -> bool {
    row.team() == AGGREGATE_TEAM
}

#[derive(Default)]
struct BasicGroup<'a> {
    aggregate: Option<&'a Row>,
    first_fragment: Option<&'a Row>,
    last_team: Option<&'a str>,
}

/// Per-player slot for a secondary feed.
struct Slot<'a> {
    row: &'a Row,
    aggregate: bool,
}

/// First aggregate row wins; a per-team row only fills an empty slot.
fn collect_slots(rows: &[Row]) -> HashMap<PlayerId, Slot<'_>> {
    let mut slots: HashMap<PlayerId, Slot<'_>> = HashMap::new();
    for row in rows {
        let Some(id) = row.player_id() else { continue };
        let aggregate = is_aggregate(row);
        match slots.get_mut(&id) {
            None => {
                slots.insert(id, Slot { row, aggregate });
            }
            Some(slot) if aggregate && !slot.aggregate => {
                *slot = Slot { row, aggregate };
            }
            Some(_) => {}
        }
    }
    slots
}

/// Merges already-fetched feeds. Output follows first appearance in the basic feed.
pub fn merge_feeds(season: Season, feeds: &SeasonFeeds) -> Vec<MergedPlayer> {
    let mut groups: IndexMap<PlayerId, BasicGroup<'_>> = IndexMap::new();
    for row in &feeds.basic {
        let Some(id) = row.player_id() else { continue };
        let group = groups.entry(id).or_default();
        if is_aggregate(row) {
            group.aggregate.get_or_insert(row);
        } else {
            group.first_fragment.get_or_insert(row);
            group.last_team = Some(row.team());
        }
    }

    let advanced = collect_slots(&feeds.advanced);
    let ratings = collect_slots(&feeds.ratings);

    groups
        .into_iter()
        .filter_map(|(id, group)| {
            let source = group.aggregate.or(group.first_fragment)?;
            let team = group.last_team.unwrap_or_else(|| source.team()).to_string();

            let stats = season_stats_from_row(id.clone(), season, &team, source);

            let mut adv = AdvancedStatRecord::empty(id.clone(), season);
            adv.team = team.clone();
            let mut coverage = FeedCoverage::default();
            if let Some(slot) = advanced.get(&id) {
                fill_advanced(&mut adv, slot.row);
                coverage.advanced = true;
            }
            if let Some(slot) = ratings.get(&id) {
                fill_ratings(&mut adv, slot.row);
                coverage.ratings = true;
            }

            Some(MergedPlayer {
                name: source.player_name().to_string(),
                age: source.count("age"),
                traded: group.aggregate.is_some(),
                id,
                team,
                stats,
                advanced: adv,
                coverage,
            })
        })
        .collect()
}

/// Per-game line from a basic feed row, attributed to `team`.
pub fn season_stats_from_row(id: PlayerId, season: Season, team: &str, row: &Row) -> SeasonStatRecord {
    SeasonStatRecord {
        team: team.to_string(),
        position: row.text("pos").to_string(),
        games: row.count("g"),
        games_started: row.count("gs"),
        minutes: row.float("mp_per_g"),
        points: row.float("pts_per_g"),
        rebounds: row.float("trb_per_g"),
        assists: row.float("ast_per_g"),
        steals: row.float("stl_per_g"),
        blocks: row.float("blk_per_g"),
        turnovers: row.float("tov_per_g"),
        fg_pct: row.percent("fg_pct"),
        fg3_pct: row.percent("fg3_pct"),
        ft_pct: row.percent("ft_pct"),
        ..SeasonStatRecord::empty(id, season)
    }
}

pub fn fill_advanced(record: &mut AdvancedStatRecord, row: &Row) {
    record.per = row.float("per");
    record.ts_pct = row.float("ts_pct");
    record.usg_pct = row.float("usg_pct");
    record.ows = row.float("ows");
    record.dws = row.float("dws");
    record.ws = row.float("ws");
    record.obpm = row.float("obpm");
    record.dbpm = row.float("dbpm");
    record.bpm = row.float("bpm");
    record.vorp = row.float("vorp");
}

pub fn fill_ratings(record: &mut AdvancedStatRecord, row: &Row) {
    record.off_rating = row.float("off_rtg");
    record.def_rating = row.float("def_rtg");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(id: &str, team: &str, games: u32, pts: f64) -> Row {
        Row::new()
            .with_link("player", id, format!("/players/{}/{}.html", &id[..1], id))
            .with_cell("team_id", team)
            .with_cell("g", games.to_string())
            .with_cell("pts_per_g", pts.to_string())
            .with_cell("pos", "SF")
    }

    fn adv(id: &str, team: &str, per: f64) -> Row {
        Row::new()
            .with_link("player", id, format!("/players/{}/{}.html", &id[..1], id))
            .with_cell("team_id", team)
            .with_cell("per", per.to_string())
    }

    fn rating(id: &str, team: &str, ortg: f64) -> Row {
        Row::new()
            .with_link("player", id, format!("/players/{}/{}.html", &id[..1], id))
            .with_cell("team_id", team)
            .with_cell("off_rtg", ortg.to_string())
            .with_cell("def_rtg", "110")
    }

    #[test]
    fn aggregate_stats_with_last_fragment_team() {
        let feeds = SeasonFeeds {
            basic: vec![
                basic("traded01", "TOT", 25, 18.0),
                basic("traded01", "AAA", 10, 15.0),
                basic("traded01", "BBB", 15, 20.0),
            ],
            ..SeasonFeeds::default()
        };
        let merged = merge_feeds(Season::new(2025), &feeds);
        assert_eq!(merged.len(), 1);
        let p = &merged[0];
        assert!(p.traded);
        assert_eq!(p.stats.games, 25);
        assert_eq!(p.team, "BBB");
        assert_eq!(p.stats.team, "BBB");
        assert_eq!(p.advanced.team, "BBB");
    }

    #[test]
    fn aggregate_position_in_source_does_not_matter() {
        let feeds = SeasonFeeds {
            basic: vec![
                basic("traded01", "AAA", 10, 15.0),
                basic("traded01", "BBB", 15, 20.0),
                basic("traded01", "TOT", 25, 18.0),
            ],
            ..SeasonFeeds::default()
        };
        let merged = merge_feeds(Season::new(2025), &feeds);
        assert_eq!(merged[0].stats.games, 25);
        assert_eq!(merged[0].team, "BBB");
    }

    #[test]
    fn secondary_feeds_prefer_aggregate_and_never_downgrade() {
        let feeds = SeasonFeeds {
            basic: vec![basic("traded01", "TOT", 25, 18.0)],
            advanced: vec![
                adv("traded01", "AAA", 11.0),
                adv("traded01", "TOT", 17.5),
                adv("traded01", "BBB", 22.0),
                adv("traded01", "TOT", 99.0),
            ],
            ratings: vec![rating("traded01", "AAA", 104.0), rating("traded01", "BBB", 120.0)],
        };
        let merged = merge_feeds(Season::new(2025), &feeds);
        let p = &merged[0];
        assert_eq!(p.advanced.per, 17.5);
        // no aggregate rating line: first fragment fills the slot
        assert_eq!(p.advanced.off_rating, 104.0);
        assert_eq!(p.coverage, FeedCoverage { advanced: true, ratings: true });
    }

    #[test]
    fn missing_secondary_lines_default_to_zero() {
        let feeds = SeasonFeeds {
            basic: vec![basic("rookie01", "CHO", 3, 2.0)],
            ..SeasonFeeds::default()
        };
        let merged = merge_feeds(Season::new(2025), &feeds);
        let p = &merged[0];
        assert!(!p.traded);
        assert_eq!(p.advanced.per, 0.0);
        assert_eq!(p.advanced.def_rating, 0.0);
        assert_eq!(p.coverage, FeedCoverage::default());
    }

    #[test]
    fn rows_without_player_link_are_ignored_and_order_is_kept() {
        let feeds = SeasonFeeds {
            basic: vec![
                basic("bravo01", "BOS", 5, 1.0),
                Row::new().with_cell("player", "League Average").with_cell("g", "82"),
                basic("alpha01", "ATL", 7, 2.0),
            ],
            ..SeasonFeeds::default()
        };
        let ids: Vec<_> = merge_feeds(Season::new(2025), &feeds)
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["bravo01", "alpha01"]);
    }

    #[test]
    fn historical_codes_and_renamed_columns() {
        let feeds = SeasonFeeds {
            basic: vec![
                Row::new()
                    .with_link("name_display", "Deron Williams", "/players/w/willide01.html")
                    .with_cell("team_name_abbr", "NJN")
                    .with_cell("g", "55"),
            ],
            advanced: vec![adv("willide01", "NJN", 19.5)],
            ..SeasonFeeds::default()
        };
        let merged = merge_feeds(Season::new(2012), &feeds);
        let p = &merged[0];
        assert_eq!(p.name, "Deron Williams");
        assert_eq!(p.team, "BRK");
        assert_eq!(p.stats.team, "BRK");
        assert_eq!(p.advanced.team, "BRK");
        assert_eq!(p.stats.games, 55);
        assert_eq!(p.advanced.per, 19.5);
    }
}
