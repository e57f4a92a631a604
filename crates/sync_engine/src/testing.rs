//! In-memory collaborators for engine tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{ExtractError, RepoError};
use crate::extract::{Extractor, Page, Row, Table};
use crate::model::{
    AdvancedStatRecord, CareerPlayer, CareerStatRecord, Player, PlayerId, Season,
    SeasonStatRecord, SyncKind, Team,
};
use crate::repository::{Repository, UpsertOutcome};

/// Serves pre-built pages by exact URL and records every request.
#[derive(Default)]
pub struct ScriptedExtractor {
    pages: Mutex<HashMap<String, Result<Page, ExtractError>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page: Page) -> Self {
        self.set_page(page);
        self
    }

    /// Page with a single table holding `rows` as body.
    pub fn with_rows(self, url: &str, table: &str, rows: Vec<Row>) -> Self {
        let page = Page::new(url).with_table(table, Table { body: rows, footer: Vec::new() });
        self.with_page(page)
    }

    pub fn with_failure(self, url: &str) -> Self {
        self.set_failure(url);
        self
    }

    pub fn set_page(&self, page: Page) {
        if let Ok(mut pages) = self.pages.lock() {
            pages.insert(page.url.clone(), Ok(page));
        }
    }

    pub fn set_failure(&self, url: &str) {
        if let Ok(mut pages) = self.pages.lock() {
            pages.insert(
                url.to_string(),
                Err(ExtractError::Transport {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                }),
            );
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == url).count()
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn fetch_page(&self, url: &str) -> Result<Page, ExtractError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        let pages = self.pages.lock().map_err(|_| ExtractError::Transport {
            url: url.to_string(),
            message: "script poisoned".to_string(),
        })?;
        match pages.get(url) {
            Some(result) => result.clone(),
            None => Err(ExtractError::Status { url: url.to_string(), status: 404 }),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    teams: HashMap<String, Team>,
    players: HashMap<PlayerId, Player>,
    season_stats: HashMap<(PlayerId, Season), SeasonStatRecord>,
    advanced: HashMap<(PlayerId, Season), AdvancedStatRecord>,
    career_players: HashMap<PlayerId, CareerPlayer>,
    career_stats: HashMap<(PlayerId, bool), CareerStatRecord>,
    watermarks: HashMap<SyncKind, DateTime<Utc>>,
    seasons: Vec<String>,
    entity_writes: usize,
    failing_writes: HashSet<String>,
    failing_exists: HashSet<String>,
    fail_snapshot: bool,
    fail_watermark_read: bool,
    fail_watermark_write: bool,
}

impl MemoryState {
    fn guard_write(&mut self, key: &str) -> Result<(), RepoError> {
        if self.failing_writes.contains(key) {
            return Err(RepoError::Backend(format!("write rejected for {key}")));
        }
        self.entity_writes += 1;
        Ok(())
    }
}

/// Map-backed repository with failure injection keyed by natural key.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T, RepoError> {
        let mut state = self.state.lock().map_err(|_| RepoError::Poisoned)?;
        Ok(f(&mut *state))
    }

    fn read<T: Default>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        self.state.lock().map(|s| f(&*s)).unwrap_or_default()
    }

    pub fn fail_writes_for(&self, key: &str) {
        let _ = self.with_state(|s| s.failing_writes.insert(key.to_string()));
    }

    pub fn fail_exists_for(&self, key: &str) {
        let _ = self.with_state(|s| s.failing_exists.insert(key.to_string()));
    }

    pub fn fail_snapshot_reads(&self) {
        let _ = self.with_state(|s| s.fail_snapshot = true);
    }

    pub fn fail_watermark_reads(&self) {
        let _ = self.with_state(|s| s.fail_watermark_read = true);
    }

    pub fn fail_watermark_writes(&self, fail: bool) {
        let _ = self.with_state(|s| s.fail_watermark_write = fail);
    }

    pub fn seed_player(&self, player: Player) {
        let _ = self.with_state(|s| s.players.insert(player.id.clone(), player));
    }

    pub fn seed_season_stats(&self, stats: SeasonStatRecord) {
        let _ = self.with_state(|s| {
            s.season_stats.insert((stats.player_id.clone(), stats.season), stats)
        });
    }

    pub fn seed_career_player(&self, player: CareerPlayer) {
        let _ = self.with_state(|s| s.career_players.insert(player.id.clone(), player));
    }

    pub fn seed_watermark(&self, kind: SyncKind, at: DateTime<Utc>) {
        let _ = self.with_state(|s| s.watermarks.insert(kind, at));
    }

    pub fn player(&self, id: &str) -> Option<Player> {
        let id = PlayerId::new(id)?;
        self.read(|s| s.players.get(&id).cloned())
    }

    pub fn player_count(&self) -> usize {
        self.read(|s| s.players.len())
    }

    pub fn team(&self, abbreviation: &str) -> Option<Team> {
        self.read(|s| s.teams.get(abbreviation).cloned())
    }

    pub fn team_count(&self) -> usize {
        self.read(|s| s.teams.len())
    }

    pub fn season_stats(&self, id: &str, season: Season) -> Option<SeasonStatRecord> {
        let id = PlayerId::new(id)?;
        self.read(|s| s.season_stats.get(&(id, season)).cloned())
    }

    pub fn season_stats_count(&self) -> usize {
        self.read(|s| s.season_stats.len())
    }

    pub fn advanced_stats(&self, id: &str, season: Season) -> Option<AdvancedStatRecord> {
        let id = PlayerId::new(id)?;
        self.read(|s| s.advanced.get(&(id, season)).cloned())
    }

    pub fn career_player(&self, id: &str) -> Option<CareerPlayer> {
        let id = PlayerId::new(id)?;
        self.read(|s| s.career_players.get(&id).cloned())
    }

    pub fn career_player_count(&self) -> usize {
        self.read(|s| s.career_players.len())
    }

    pub fn career_stats(&self, id: &str, playoffs: bool) -> Option<CareerStatRecord> {
        let id = PlayerId::new(id)?;
        self.read(|s| s.career_stats.get(&(id, playoffs)).cloned())
    }

    pub fn seasons(&self) -> Vec<String> {
        self.read(|s| s.seasons.clone())
    }

    pub fn stored_watermark(&self, kind: SyncKind) -> Option<DateTime<Utc>> {
        self.read(|s| s.watermarks.get(&kind).copied())
    }

    /// Successful entity writes (upserts, updates, rookie flags).
    pub fn entity_writes(&self) -> usize {
        self.read(|s| s.entity_writes)
    }
}

fn upsert<K: std::hash::Hash + Eq, V>(map: &mut HashMap<K, V>, key: K, value: V) -> UpsertOutcome {
    match map.insert(key, value) {
        Some(_) => UpsertOutcome::Updated(1),
        None => UpsertOutcome::Inserted,
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn upsert_team(&self, team: &Team) -> Result<UpsertOutcome, RepoError> {
        self.with_state(|s| {
            s.guard_write(&team.abbreviation)?;
            Ok(upsert(&mut s.teams, team.abbreviation.clone(), team.clone()))
        })?
    }

    async fn upsert_player(&self, player: &Player) -> Result<UpsertOutcome, RepoError> {
        self.with_state(|s| {
            s.guard_write(player.id.as_str())?;
            Ok(upsert(&mut s.players, player.id.clone(), player.clone()))
        })?
    }

    async fn update_player_details(&self, id: &PlayerId, age: u32, team: &str) -> Result<u64, RepoError> {
        self.with_state(|s| {
            s.guard_write(id.as_str())?;
            Ok(match s.players.get_mut(id) {
                Some(p) => {
                    p.age = age;
                    p.team = team.to_string();
                    1
                }
                None => 0,
            })
        })?
    }

    async fn upsert_season_stats(&self, stats: &SeasonStatRecord) -> Result<UpsertOutcome, RepoError> {
        self.with_state(|s| {
            s.guard_write(stats.player_id.as_str())?;
            let key = (stats.player_id.clone(), stats.season);
            let mut record = stats.clone();
            if let Some(existing) = s.season_stats.get(&key) {
                record.rookie = existing.rookie;
            }
            Ok(upsert(&mut s.season_stats, key, record))
        })?
    }

    async fn upsert_advanced_stats(&self, stats: &AdvancedStatRecord) -> Result<UpsertOutcome, RepoError> {
        self.with_state(|s| {
            s.guard_write(stats.player_id.as_str())?;
            let key = (stats.player_id.clone(), stats.season);
            Ok(upsert(&mut s.advanced, key, stats.clone()))
        })?
    }

    async fn update_traded_stats(&self, stats: &SeasonStatRecord) -> Result<u64, RepoError> {
        self.with_state(|s| {
            s.guard_write(stats.player_id.as_str())?;
            let key = (stats.player_id.clone(), stats.season);
            Ok(match s.season_stats.get_mut(&key) {
                Some(existing) => {
                    let team = std::mem::take(&mut existing.team);
                    let rookie = existing.rookie;
                    *existing = SeasonStatRecord { team, rookie, ..stats.clone() };
                    1
                }
                None => 0,
            })
        })?
    }

    async fn update_traded_advanced(&self, stats: &AdvancedStatRecord) -> Result<u64, RepoError> {
        self.with_state(|s| {
            s.guard_write(stats.player_id.as_str())?;
            let key = (stats.player_id.clone(), stats.season);
            Ok(match s.advanced.get_mut(&key) {
                Some(existing) => {
                    let team = std::mem::take(&mut existing.team);
                    *existing = AdvancedStatRecord { team, ..stats.clone() };
                    1
                }
                None => 0,
            })
        })?
    }

    async fn set_rookie(&self, id: &PlayerId, season: Season) -> Result<u64, RepoError> {
        self.with_state(|s| {
            s.guard_write(id.as_str())?;
            Ok(match s.season_stats.get_mut(&(id.clone(), season)) {
                Some(existing) => {
                    existing.rookie = true;
                    1
                }
                None => 0,
            })
        })?
    }

    async fn player_exists(&self, id: &PlayerId) -> Result<bool, RepoError> {
        self.with_state(|s| {
            if s.failing_exists.contains(id.as_str()) {
                return Err(RepoError::Backend(format!("lookup failed for {id}")));
            }
            Ok(s.players.contains_key(id))
        })?
    }

    async fn season_games_played(&self, season: Season) -> Result<HashMap<PlayerId, u32>, RepoError> {
        self.with_state(|s| {
            if s.fail_snapshot {
                return Err(RepoError::Backend("snapshot unavailable".to_string()));
            }
            Ok(s.season_stats
                .values()
                .filter(|r| r.season == season)
                .map(|r| (r.player_id.clone(), r.games))
                .collect())
        })?
    }

    async fn upsert_career_player(&self, player: &CareerPlayer) -> Result<UpsertOutcome, RepoError> {
        self.with_state(|s| {
            s.guard_write(player.id.as_str())?;
            Ok(upsert(&mut s.career_players, player.id.clone(), player.clone()))
        })?
    }

    async fn upsert_career_stats(&self, stats: &CareerStatRecord) -> Result<UpsertOutcome, RepoError> {
        self.with_state(|s| {
            s.guard_write(stats.player_id.as_str())?;
            let key = (stats.player_id.clone(), stats.is_playoffs);
            Ok(upsert(&mut s.career_stats, key, stats.clone()))
        })?
    }

    async fn update_career_player(&self, player: &CareerPlayer) -> Result<u64, RepoError> {
        self.with_state(|s| {
            s.guard_write(player.id.as_str())?;
            Ok(match s.career_players.get_mut(&player.id) {
                Some(existing) => {
                    *existing = player.clone();
                    1
                }
                None => 0,
            })
        })?
    }

    async fn update_career_stats(&self, stats: &CareerStatRecord) -> Result<u64, RepoError> {
        self.with_state(|s| {
            s.guard_write(stats.player_id.as_str())?;
            let key = (stats.player_id.clone(), stats.is_playoffs);
            Ok(match s.career_stats.get_mut(&key) {
                Some(existing) => {
                    *existing = stats.clone();
                    1
                }
                None => 0,
            })
        })?
    }

    async fn career_player_active(&self, id: &PlayerId) -> Result<Option<bool>, RepoError> {
        self.with_state(|s| s.career_players.get(id).map(|p| p.active))
    }

    async fn active_career_players(&self) -> Result<Vec<PlayerId>, RepoError> {
        self.with_state(|s| {
            let mut ids: Vec<PlayerId> = s
                .career_players
                .values()
                .filter(|p| p.active)
                .map(|p| p.id.clone())
                .collect();
            ids.sort();
            ids
        })
    }

    async fn watermark(&self, kind: SyncKind) -> Result<Option<DateTime<Utc>>, RepoError> {
        self.with_state(|s| {
            if s.fail_watermark_read {
                return Err(RepoError::Backend("watermark table unreadable".to_string()));
            }
            Ok(s.watermarks.get(&kind).copied())
        })?
    }

    async fn set_watermark(&self, kind: SyncKind, at: DateTime<Utc>) -> Result<(), RepoError> {
        self.with_state(|s| {
            if s.fail_watermark_write {
                return Err(RepoError::Backend("watermark table read-only".to_string()));
            }
            s.watermarks.insert(kind, at);
            Ok(())
        })?
    }

    async fn record_season(&self, label: &str) -> Result<(), RepoError> {
        self.with_state(|s| {
            if !s.seasons.iter().any(|l| l == label) {
                s.seasons.push(label.to_string());
            }
        })
    }
}

/// Row builders shaped like the source's league tables.
pub mod rows {
    use crate::extract::Row;

    pub fn player_href(id: &str) -> String {
        let letter = id.chars().next().unwrap_or('x');
        format!("/players/{letter}/{id}.html")
    }

    pub fn basic(id: &str, team: &str, games: u32) -> Row {
        Row::new()
            .with_link("player", id, player_href(id))
            .with_cell("team_id", team)
            .with_cell("age", "27")
            .with_cell("pos", "SG")
            .with_cell("g", games.to_string())
            .with_cell("gs", games.to_string())
            .with_cell("mp_per_g", "31.5")
            .with_cell("pts_per_g", format!("{}.0", 10 + games % 20))
            .with_cell("fg_pct", ".471")
    }

    pub fn advanced(id: &str, team: &str, per: f64) -> Row {
        Row::new()
            .with_link("player", id, player_href(id))
            .with_cell("team_id", team)
            .with_cell("per", per.to_string())
            .with_cell("ws", "4.2")
    }

    pub fn ratings(id: &str, team: &str, off: f64, def: f64) -> Row {
        Row::new()
            .with_link("player", id, player_href(id))
            .with_cell("team_id", team)
            .with_cell("off_rtg", off.to_string())
            .with_cell("def_rtg", def.to_string())
    }

    pub fn rookie(id: &str) -> Row {
        Row::new().with_link("player", id, player_href(id))
    }

    pub fn roster(id: &str, name: &str) -> Row {
        Row::new()
            .with_link("player", name, player_href(id))
            .with_cell("pos", "F")
            .with_cell("height", "6-8")
            .with_cell("weight", "230")
            .with_cell("college", "Duke")
    }

    pub fn team_index(abbreviation: &str, name: &str) -> Row {
        Row::new()
            .with_class("full_table")
            .with_link("franch_name", name, format!("/teams/{abbreviation}/"))
            .with_cell("win_loss_pct", ".550")
            .with_cell("years_playoffs", "20")
            .with_cell("years_league_champion", "1")
    }
}
