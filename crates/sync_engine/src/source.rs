//! Source page addresses and table ids.

use crate::model::{PlayerId, Season};

pub const DEFAULT_BASE_URL: &str = "https://www.basketball-reference.com";

/// Team value the source uses for a traded player's combined line.
pub const AGGREGATE_TEAM: &str = "TOT";

/// League marker of the career footer rows we keep.
pub const LEAGUE_MARKER: &str = "NBA";

pub mod tables {
    pub const PER_GAME: &str = "per_game_stats";
    pub const ADVANCED: &str = "advanced_stats";
    pub const PER_POSS: &str = "per_poss_stats";
    pub const ROOKIES: &str = "rookies";
    pub const TEAMS_ACTIVE: &str = "teams_active";
    pub const ROSTER: &str = "roster";
    pub const LEADERS: &str = "nba";

    pub const CAREER_PER_GAME: &str = "per_game";
    pub const CAREER_TOTALS: &str = "totals";
    pub const CAREER_ADVANCED: &str = "advanced";
    pub const CAREER_PER_POSS: &str = "per_poss";
    pub const PLAYOFFS_PER_GAME: &str = "playoffs_per_game";
    pub const PLAYOFFS_TOTALS: &str = "playoffs_totals";
    pub const PLAYOFFS_ADVANCED: &str = "playoffs_advanced";
    pub const PLAYOFFS_PER_POSS: &str = "playoffs_per_poss";
}

/// All-time leaderboards scanned for career candidates.
const LEADERBOARDS: [&str; 10] = [
    "pts_per_g_career",
    "per_career",
    "orb_pct_career",
    "dbpm_career",
    "pts_per_g_career_p",
    "per_career_p",
    "orb_pct_career_p",
    "bpm_career_p",
    "def_rtg_career_p",
    "trb_per_g_career_p",
];

#[derive(Debug, Clone)]
pub struct SourceUrls {
    base: String,
}

impl Default for SourceUrls {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl SourceUrls {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self { base: base.trim_end_matches('/').to_string() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn per_game(&self, season: Season) -> String {
        format!("{}/leagues/NBA_{}_per_game.html", self.base, season)
    }

    pub fn advanced(&self, season: Season) -> String {
        format!("{}/leagues/NBA_{}_advanced.html", self.base, season)
    }

    pub fn per_poss(&self, season: Season) -> String {
        format!("{}/leagues/NBA_{}_per_poss.html", self.base, season)
    }

    pub fn rookies(&self, season: Season) -> String {
        format!("{}/leagues/NBA_{}_rookies.html", self.base, season)
    }

    pub fn team_index(&self) -> String {
        format!("{}/teams/", self.base)
    }

    pub fn team_season(&self, abbreviation: &str, season: Season) -> String {
        format!("{}/teams/{}/{}.html", self.base, abbreviation, season)
    }

    pub fn player(&self, id: &PlayerId) -> String {
        format!("{}/players/{}/{}.html", self.base, id.first_letter(), id)
    }

    pub fn leaderboards(&self) -> Vec<String> {
        LEADERBOARDS
            .iter()
            .map(|slug| format!("{}/leaders/{}.html", self.base, slug))
            .collect()
    }
}
