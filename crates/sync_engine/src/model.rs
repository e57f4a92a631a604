//! Domain records persisted by the engine.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::achievements::Achievements;

/// Stable source identifier of a player, e.g. `jamesle01`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    /// Returns `None` for blank input.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Parses a player link like `/players/j/jamesle01.html`.
    pub fn from_href(href: &str) -> Option<Self> {
        let mut parts = href.split('/');
        // "", "players", "<letter>", "<id>.html"
        if parts.nth(1)? != "players" {
            return None;
        }
        let file = parts.nth(1)?;
        Self::new(file.trim_end_matches(".html"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory letter used by the source's player page scheme.
    pub fn first_letter(&self) -> char {
        self.0.chars().next().unwrap_or('_')
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A season named by the calendar year in which it ends (2024-25 is `2025`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Season(i32);

impl Season {
    pub fn new(end_year: i32) -> Self {
        Self(end_year)
    }

    pub fn end_year(self) -> i32 {
        self.0
    }

    /// Season in progress on `today`: from the start date on, the label rolls to next year.
    pub fn current(today: NaiveDate, start: SeasonStart) -> Self {
        if (today.month(), today.day()) >= (start.month, start.day) {
            Self(today.year() + 1)
        } else {
            Self(today.year())
        }
    }

    pub fn label(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Calendar day on which a new season begins (default November 1st).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonStart {
    month: u32,
    day: u32,
}

impl Default for SeasonStart {
    fn default() -> Self {
        Self { month: 11, day: 1 }
    }
}

impl SeasonStart {
    pub fn new(month: u32, day: u32) -> Option<Self> {
        // 2024 is a leap year so Feb 29 is accepted here.
        NaiveDate::from_ymd_opt(2024, month, day)?;
        Some(Self { month, day })
    }

    /// Parses `MM-DD`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (m, d) = raw.trim().split_once('-')?;
        Self::new(m.parse().ok()?, d.parse().ok()?)
    }

    /// Next midnight UTC on this calendar day strictly after `now`.
    pub fn next_after(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut year = now.year();
        loop {
            if let Some(date) = NaiveDate::from_ymd_opt(year, self.month, self.day) {
                if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                    let candidate = Utc.from_utc_datetime(&midnight);
                    if candidate > now {
                        return candidate;
                    }
                }
            }
            year += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub college: String,
    pub height: String,
    pub weight: String,
    pub team: String,
    pub age: u32,
    pub position: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Team {
    pub abbreviation: String,
    pub name: String,
    pub logo_url: String,
    /// 0-100
    pub win_loss_pct: f64,
    pub playoffs: u32,
    pub division_titles: u32,
    pub conference_titles: u32,
    pub championships: u32,
}

/// Per-game line for one (player, season). Percentages are 0-100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonStatRecord {
    pub player_id: PlayerId,
    pub season: Season,
    pub team: String,
    pub position: String,
    pub games: u32,
    pub games_started: u32,
    pub minutes: f64,
    pub points: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turnovers: f64,
    pub fg_pct: f64,
    pub fg3_pct: f64,
    pub ft_pct: f64,
    pub rookie: bool,
}

impl SeasonStatRecord {
    pub fn empty(player_id: PlayerId, season: Season) -> Self {
        Self {
            player_id,
            season,
            team: String::new(),
            position: String::new(),
            games: 0,
            games_started: 0,
            minutes: 0.0,
            points: 0.0,
            rebounds: 0.0,
            assists: 0.0,
            steals: 0.0,
            blocks: 0.0,
            turnovers: 0.0,
            fg_pct: 0.0,
            fg3_pct: 0.0,
            ft_pct: 0.0,
            rookie: false,
        }
    }
}

/// Advanced metrics for one (player, season), ratings included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedStatRecord {
    pub player_id: PlayerId,
    pub season: Season,
    pub team: String,
    pub per: f64,
    pub ts_pct: f64,
    pub usg_pct: f64,
    pub ows: f64,
    pub dws: f64,
    pub ws: f64,
    pub obpm: f64,
    pub dbpm: f64,
    pub bpm: f64,
    pub vorp: f64,
    pub off_rating: f64,
    pub def_rating: f64,
}

impl AdvancedStatRecord {
    pub fn empty(player_id: PlayerId, season: Season) -> Self {
        Self {
            player_id,
            season,
            team: String::new(),
            per: 0.0,
            ts_pct: 0.0,
            usg_pct: 0.0,
            ows: 0.0,
            dws: 0.0,
            ws: 0.0,
            obpm: 0.0,
            dbpm: 0.0,
            bpm: 0.0,
            vorp: 0.0,
            off_rating: 0.0,
            def_rating: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CareerPlayer {
    pub id: PlayerId,
    pub name: String,
    pub active: bool,
    pub achievements: Achievements,
}

/// Career line for one player, regular season or playoffs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CareerStatRecord {
    pub player_id: PlayerId,
    pub is_playoffs: bool,
    pub position: String,
    pub active: bool,
    pub games: u32,
    pub minutes: f64,
    pub points: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turnovers: f64,
    pub fg_pct: f64,
    pub fg3_pct: f64,
    pub ft_pct: f64,
    pub per: f64,
    pub ows: f64,
    pub dws: f64,
    pub ws: f64,
    pub obpm: f64,
    pub dbpm: f64,
    pub bpm: f64,
    pub vorp: f64,
    pub off_rating: f64,
    pub def_rating: f64,
    pub total_points: u32,
    pub total_rebounds: u32,
    pub total_assists: u32,
    pub total_steals: u32,
    pub total_blocks: u32,
}

impl CareerStatRecord {
    pub fn empty(player_id: PlayerId, is_playoffs: bool) -> Self {
        Self {
            player_id,
            is_playoffs,
            position: String::new(),
            active: false,
            games: 0,
            minutes: 0.0,
            points: 0.0,
            rebounds: 0.0,
            assists: 0.0,
            steals: 0.0,
            blocks: 0.0,
            turnovers: 0.0,
            fg_pct: 0.0,
            fg3_pct: 0.0,
            ft_pct: 0.0,
            per: 0.0,
            ows: 0.0,
            dws: 0.0,
            ws: 0.0,
            obpm: 0.0,
            dbpm: 0.0,
            bpm: 0.0,
            vorp: 0.0,
            off_rating: 0.0,
            def_rating: 0.0,
            total_points: 0,
            total_rebounds: 0,
            total_assists: 0,
            total_steals: 0,
            total_blocks: 0,
        }
    }
}

/// Independent synchronisation flows, each with its own watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncKind {
    Regular,
    Career,
}

impl SyncKind {
    /// Watermark key as stored.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncKind::Regular => "Regular",
            SyncKind::Career => "GOAT",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Season catalog labels written after a career discovery.
pub const CAREER_SEASON_LABELS: [&str; 3] = ["All", "Playoff", "Career"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_from_link() {
        let id = PlayerId::from_href("/players/j/jamesle01.html").unwrap();
        assert_eq!(id.as_str(), "jamesle01");
        assert_eq!(id.first_letter(), 'j');
        assert!(PlayerId::from_href("/teams/LAL/2025.html").is_none());
        assert!(PlayerId::from_href("").is_none());
        assert!(PlayerId::new("   ").is_none());
    }

    #[test]
    fn season_rolls_over_on_start_date() {
        let start = SeasonStart::default();
        let oct = NaiveDate::from_ymd_opt(2024, 10, 31).unwrap();
        let nov = NaiveDate::from_ymd_opt(2024, 11, 1).unwrap();
        assert_eq!(Season::current(oct, start), Season::new(2024));
        assert_eq!(Season::current(nov, start), Season::new(2025));
    }

    #[test]
    fn next_season_start_is_strictly_in_the_future() {
        let start = SeasonStart::parse("11-01").unwrap();
        let on_the_day = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
        assert_eq!(
            start.next_after(on_the_day),
            Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap()
        );
        let summer = Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap();
        assert_eq!(
            start.next_after(summer),
            Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn season_start_rejects_garbage() {
        assert!(SeasonStart::parse("13-01").is_none());
        assert!(SeasonStart::parse("november").is_none());
        assert!(SeasonStart::parse("02-29").is_some());
    }

    #[test]
    fn sync_kind_keys() {
        assert_eq!(SyncKind::Regular.as_str(), "Regular");
        assert_eq!(SyncKind::Career.as_str(), "GOAT");
    }
}
