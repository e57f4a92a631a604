//! SQLite-backed [`Repository`].
//!
//! Writes follow update-then-insert: the update runs first and the insert only
//! happens when it touched no row. A single connection sits behind a mutex;
//! every statement is short and none is held across an await.

mod schema;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use sync_engine::repository::{Repository, UpsertOutcome};
use sync_engine::{
    AdvancedStatRecord, CareerPlayer, CareerStatRecord, Player, PlayerId, RepoError, Season,
    SeasonStatRecord, SyncKind, Team,
};

pub use schema::TABLES;

fn backend(e: rusqlite::Error) -> RepoError {
    RepoError::Backend(e.to_string())
}

fn update_then_insert(
    conn: &Connection,
    update: &str,
    insert: &str,
    params: &[&dyn ToSql],
) -> rusqlite::Result<UpsertOutcome> {
    let changed = conn.execute(update, params)?;
    if changed == 0 {
        conn.execute(insert, params)?;
    }
    Ok(UpsertOutcome::from_updated_rows(changed as u64))
}

const UPDATE_TEAM: &str = "UPDATE teams SET name=?2, logo_url=?3, win_loss_pct=?4, playoffs=?5, \
     division_titles=?6, conference_titles=?7, championships=?8 WHERE abbreviation=?1";
const INSERT_TEAM: &str = "INSERT INTO teams(abbreviation, name, logo_url, win_loss_pct, playoffs, \
     division_titles, conference_titles, championships) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const UPDATE_PLAYER: &str = "UPDATE players SET name=?2, college=?3, height=?4, weight=?5, team=?6, \
     age=?7, position=?8 WHERE id=?1";
const INSERT_PLAYER: &str = "INSERT INTO players(id, name, college, height, weight, team, age, position) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

// An upsert never clears a rookie flag set by `set_rookie`.
const UPDATE_SEASON: &str = "UPDATE season_stats SET team=?3, position=?4, games=?5, games_started=?6, \
     minutes=?7, points=?8, rebounds=?9, assists=?10, steals=?11, blocks=?12, turnovers=?13, \
     fg_pct=?14, fg3_pct=?15, ft_pct=?16, rookie=MAX(rookie, ?17) WHERE player_id=?1 AND season=?2";
const INSERT_SEASON: &str = "INSERT INTO season_stats(player_id, season, team, position, games, \
     games_started, minutes, points, rebounds, assists, steals, blocks, turnovers, fg_pct, fg3_pct, \
     ft_pct, rookie) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)";
const UPDATE_SEASON_TRADED: &str = "UPDATE season_stats SET position=?3, games=?4, games_started=?5, \
     minutes=?6, points=?7, rebounds=?8, assists=?9, steals=?10, blocks=?11, turnovers=?12, \
     fg_pct=?13, fg3_pct=?14, ft_pct=?15 WHERE player_id=?1 AND season=?2";

const UPDATE_ADVANCED: &str = "UPDATE advanced_stats SET team=?3, per=?4, ts_pct=?5, usg_pct=?6, ows=?7, \
     dws=?8, ws=?9, obpm=?10, dbpm=?11, bpm=?12, vorp=?13, off_rating=?14, def_rating=?15 \
     WHERE player_id=?1 AND season=?2";
const INSERT_ADVANCED: &str = "INSERT INTO advanced_stats(player_id, season, team, per, ts_pct, usg_pct, \
     ows, dws, ws, obpm, dbpm, bpm, vorp, off_rating, def_rating) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";
const UPDATE_ADVANCED_TRADED: &str = "UPDATE advanced_stats SET per=?3, ts_pct=?4, usg_pct=?5, ows=?6, \
     dws=?7, ws=?8, obpm=?9, dbpm=?10, bpm=?11, vorp=?12, off_rating=?13, def_rating=?14 \
     WHERE player_id=?1 AND season=?2";

const UPDATE_CAREER_PLAYER: &str = "UPDATE career_players SET name=?2, active=?3, all_star=?4, \
     all_nba=?5, all_defensive=?6, championships=?7, dpoy=?8, roy=?9, finals_mvp=?10, mvp=?11 WHERE id=?1";
const INSERT_CAREER_PLAYER: &str = "INSERT INTO career_players(id, name, active, all_star, all_nba, \
     all_defensive, championships, dpoy, roy, finals_mvp, mvp) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const UPDATE_CAREER_STATS: &str = "UPDATE career_stats SET position=?3, active=?4, games=?5, \
     minutes=?6, points=?7, rebounds=?8, assists=?9, steals=?10, blocks=?11, turnovers=?12, fg_pct=?13, \
     fg3_pct=?14, ft_pct=?15, per=?16, ows=?17, dws=?18, ws=?19, obpm=?20, dbpm=?21, bpm=?22, vorp=?23, \
     off_rating=?24, def_rating=?25, total_points=?26, total_rebounds=?27, total_assists=?28, \
     total_steals=?29, total_blocks=?30 WHERE player_id=?1 AND is_playoffs=?2";
const INSERT_CAREER_STATS: &str = "INSERT INTO career_stats(player_id, is_playoffs, position, active, \
     games, minutes, points, rebounds, assists, steals, blocks, turnovers, fg_pct, fg3_pct, ft_pct, per, \
     ows, dws, ws, obpm, dbpm, bpm, vorp, off_rating, def_rating, total_points, total_rebounds, \
     total_assists, total_steals, total_blocks) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, \
     ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30)";

fn career_player_params<'a>(id: &'a &'a str, p: &'a CareerPlayer) -> [&'a dyn ToSql; 11] {
    let a = &p.achievements;
    [
        id as &dyn ToSql,
        &p.name,
        &p.active,
        &a.all_star,
        &a.all_nba,
        &a.all_defensive,
        &a.championships,
        &a.dpoy,
        &a.roy,
        &a.finals_mvp,
        &a.mvp,
    ]
}

fn career_stats_params<'a>(id: &'a &'a str, s: &'a CareerStatRecord) -> [&'a dyn ToSql; 30] {
    [
        id as &dyn ToSql,
        &s.is_playoffs,
        &s.position,
        &s.active,
        &s.games,
        &s.minutes,
        &s.points,
        &s.rebounds,
        &s.assists,
        &s.steals,
        &s.blocks,
        &s.turnovers,
        &s.fg_pct,
        &s.fg3_pct,
        &s.ft_pct,
        &s.per,
        &s.ows,
        &s.dws,
        &s.ws,
        &s.obpm,
        &s.dbpm,
        &s.bpm,
        &s.vorp,
        &s.off_rating,
        &s.def_rating,
        &s.total_points,
        &s.total_rebounds,
        &s.total_assists,
        &s.total_steals,
        &s.total_blocks,
    ]
}

fn format_watermark(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_watermark(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| RepoError::Backend(format!("bad watermark {raw:?}: {e}")))
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).map_err(backend)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        info!(path = %path.display(), "stat store opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepoError> {
        Self::with_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepoError> {
        schema::init_schema(&conn).map_err(backend)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, RepoError> {
        let conn = self.conn.lock().map_err(|_| RepoError::Poisoned)?;
        f(&conn).map_err(backend)
    }

    /// Row count of every table, in schema order.
    pub fn row_counts(&self) -> Result<Vec<(&'static str, i64)>, RepoError> {
        self.with_conn(|conn| {
            TABLES
                .iter()
                .map(|table| {
                    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
                    Ok((*table, n))
                })
                .collect()
        })
    }

    pub fn player(&self, id: &PlayerId) -> Result<Option<Player>, RepoError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, college, height, weight, team, age, position FROM players WHERE id=?1",
                params![id.as_str()],
                |r| {
                    Ok(Player {
                        id: id.clone(),
                        name: r.get(0)?,
                        college: r.get(1)?,
                        height: r.get(2)?,
                        weight: r.get(3)?,
                        team: r.get(4)?,
                        age: r.get(5)?,
                        position: r.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn season_stats(&self, id: &PlayerId, season: Season) -> Result<Option<SeasonStatRecord>, RepoError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT team, position, games, games_started, minutes, points, rebounds, assists, \
                 steals, blocks, turnovers, fg_pct, fg3_pct, ft_pct, rookie \
                 FROM season_stats WHERE player_id=?1 AND season=?2",
                params![id.as_str(), season.end_year()],
                |r| {
                    Ok(SeasonStatRecord {
                        player_id: id.clone(),
                        season,
                        team: r.get(0)?,
                        position: r.get(1)?,
                        games: r.get(2)?,
                        games_started: r.get(3)?,
                        minutes: r.get(4)?,
                        points: r.get(5)?,
                        rebounds: r.get(6)?,
                        assists: r.get(7)?,
                        steals: r.get(8)?,
                        blocks: r.get(9)?,
                        turnovers: r.get(10)?,
                        fg_pct: r.get(11)?,
                        fg3_pct: r.get(12)?,
                        ft_pct: r.get(13)?,
                        rookie: r.get(14)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn career_stats(&self, id: &PlayerId, is_playoffs: bool) -> Result<Option<CareerStatRecord>, RepoError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT position, active, games, minutes, points, rebounds, assists, steals, blocks, \
                 turnovers, fg_pct, fg3_pct, ft_pct, per, ows, dws, ws, obpm, dbpm, bpm, vorp, \
                 off_rating, def_rating, total_points, total_rebounds, total_assists, total_steals, \
                 total_blocks FROM career_stats WHERE player_id=?1 AND is_playoffs=?2",
                params![id.as_str(), is_playoffs],
                |r| {
                    Ok(CareerStatRecord {
                        player_id: id.clone(),
                        is_playoffs,
                        position: r.get(0)?,
                        active: r.get(1)?,
                        games: r.get(2)?,
                        minutes: r.get(3)?,
                        points: r.get(4)?,
                        rebounds: r.get(5)?,
                        assists: r.get(6)?,
                        steals: r.get(7)?,
                        blocks: r.get(8)?,
                        turnovers: r.get(9)?,
                        fg_pct: r.get(10)?,
                        fg3_pct: r.get(11)?,
                        ft_pct: r.get(12)?,
                        per: r.get(13)?,
                        ows: r.get(14)?,
                        dws: r.get(15)?,
                        ws: r.get(16)?,
                        obpm: r.get(17)?,
                        dbpm: r.get(18)?,
                        bpm: r.get(19)?,
                        vorp: r.get(20)?,
                        off_rating: r.get(21)?,
                        def_rating: r.get(22)?,
                        total_points: r.get(23)?,
                        total_rebounds: r.get(24)?,
                        total_assists: r.get(25)?,
                        total_steals: r.get(26)?,
                        total_blocks: r.get(27)?,
                    })
                },
            )
            .optional()
        })
    }
}

#[async_trait]
impl Repository for SqliteStore {
    async fn upsert_team(&self, t: &Team) -> Result<UpsertOutcome, RepoError> {
        self.with_conn(|conn| {
            update_then_insert(
                conn,
                UPDATE_TEAM,
                INSERT_TEAM,
                params![
                    t.abbreviation,
                    t.name,
                    t.logo_url,
                    t.win_loss_pct,
                    t.playoffs,
                    t.division_titles,
                    t.conference_titles,
                    t.championships,
                ],
            )
        })
    }

    async fn upsert_player(&self, p: &Player) -> Result<UpsertOutcome, RepoError> {
        self.with_conn(|conn| {
            update_then_insert(
                conn,
                UPDATE_PLAYER,
                INSERT_PLAYER,
                params![p.id.as_str(), p.name, p.college, p.height, p.weight, p.team, p.age, p.position],
            )
        })
    }

    async fn update_player_details(&self, id: &PlayerId, age: u32, team: &str) -> Result<u64, RepoError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE players SET age=?2, team=?3 WHERE id=?1", params![id.as_str(), age, team])
                .map(|n| n as u64)
        })
    }

    async fn upsert_season_stats(&self, s: &SeasonStatRecord) -> Result<UpsertOutcome, RepoError> {
        self.with_conn(|conn| {
            update_then_insert(
                conn,
                UPDATE_SEASON,
                INSERT_SEASON,
                params![
                    s.player_id.as_str(),
                    s.season.end_year(),
                    s.team,
                    s.position,
                    s.games,
                    s.games_started,
                    s.minutes,
                    s.points,
                    s.rebounds,
                    s.assists,
                    s.steals,
                    s.blocks,
                    s.turnovers,
                    s.fg_pct,
                    s.fg3_pct,
                    s.ft_pct,
                    s.rookie,
                ],
            )
        })
    }

    async fn upsert_advanced_stats(&self, s: &AdvancedStatRecord) -> Result<UpsertOutcome, RepoError> {
        self.with_conn(|conn| {
            update_then_insert(
                conn,
                UPDATE_ADVANCED,
                INSERT_ADVANCED,
                params![
                    s.player_id.as_str(),
                    s.season.end_year(),
                    s.team,
                    s.per,
                    s.ts_pct,
                    s.usg_pct,
                    s.ows,
                    s.dws,
                    s.ws,
                    s.obpm,
                    s.dbpm,
                    s.bpm,
                    s.vorp,
                    s.off_rating,
                    s.def_rating,
                ],
            )
        })
    }

    async fn update_traded_stats(&self, s: &SeasonStatRecord) -> Result<u64, RepoError> {
        self.with_conn(|conn| {
            conn.execute(
                UPDATE_SEASON_TRADED,
                params![
                    s.player_id.as_str(),
                    s.season.end_year(),
                    s.position,
                    s.games,
                    s.games_started,
                    s.minutes,
                    s.points,
                    s.rebounds,
                    s.assists,
                    s.steals,
                    s.blocks,
                    s.turnovers,
                    s.fg_pct,
                    s.fg3_pct,
                    s.ft_pct,
                ],
            )
            .map(|n| n as u64)
        })
    }

    async fn update_traded_advanced(&self, s: &AdvancedStatRecord) -> Result<u64, RepoError> {
        self.with_conn(|conn| {
            conn.execute(
                UPDATE_ADVANCED_TRADED,
                params![
                    s.player_id.as_str(),
                    s.season.end_year(),
                    s.per,
                    s.ts_pct,
                    s.usg_pct,
                    s.ows,
                    s.dws,
                    s.ws,
                    s.obpm,
                    s.dbpm,
                    s.bpm,
                    s.vorp,
                    s.off_rating,
                    s.def_rating,
                ],
            )
            .map(|n| n as u64)
        })
    }

    async fn set_rookie(&self, id: &PlayerId, season: Season) -> Result<u64, RepoError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE season_stats SET rookie=1 WHERE player_id=?1 AND season=?2",
                params![id.as_str(), season.end_year()],
            )
            .map(|n| n as u64)
        })
    }

    async fn player_exists(&self, id: &PlayerId) -> Result<bool, RepoError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1 FROM players WHERE id=?1", params![id.as_str()], |_| Ok(()))
                .optional()
                .map(|found| found.is_some())
        })
    }

    async fn season_games_played(&self, season: Season) -> Result<HashMap<PlayerId, u32>, RepoError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT player_id, games FROM season_stats WHERE season=?1")?;
            let rows = stmt
                .query_map(params![season.end_year()], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u32>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        debug!(season = %season, players = rows.len(), "games snapshot read");
        Ok(rows
            .into_iter()
            .filter_map(|(id, games)| Some((PlayerId::new(id)?, games)))
            .collect())
    }

    async fn upsert_career_player(&self, p: &CareerPlayer) -> Result<UpsertOutcome, RepoError> {
        let id = p.id.as_str();
        self.with_conn(|conn| {
            update_then_insert(conn, UPDATE_CAREER_PLAYER, INSERT_CAREER_PLAYER, &career_player_params(&id, p))
        })
    }

    async fn upsert_career_stats(&self, s: &CareerStatRecord) -> Result<UpsertOutcome, RepoError> {
        let id = s.player_id.as_str();
        self.with_conn(|conn| {
            update_then_insert(conn, UPDATE_CAREER_STATS, INSERT_CAREER_STATS, &career_stats_params(&id, s))
        })
    }

    async fn update_career_player(&self, p: &CareerPlayer) -> Result<u64, RepoError> {
        let id = p.id.as_str();
        self.with_conn(|conn| {
            conn.execute(UPDATE_CAREER_PLAYER, &career_player_params(&id, p)[..])
                .map(|n| n as u64)
        })
    }

    async fn update_career_stats(&self, s: &CareerStatRecord) -> Result<u64, RepoError> {
        let id = s.player_id.as_str();
        self.with_conn(|conn| {
            conn.execute(UPDATE_CAREER_STATS, &career_stats_params(&id, s)[..])
                .map(|n| n as u64)
        })
    }

    async fn career_player_active(&self, id: &PlayerId) -> Result<Option<bool>, RepoError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT active FROM career_players WHERE id=?1", params![id.as_str()], |r| r.get(0))
                .optional()
        })
    }

    async fn active_career_players(&self) -> Result<Vec<PlayerId>, RepoError> {
        let ids = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM career_players WHERE active=1 ORDER BY id")?;
            let ids = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })?;
        Ok(ids.into_iter().filter_map(PlayerId::new).collect())
    }

    async fn watermark(&self, kind: SyncKind) -> Result<Option<DateTime<Utc>>, RepoError> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT last_sync_time FROM sync_watermarks WHERE name=?1",
                params![kind.as_str()],
                |r| r.get(0),
            )
            .optional()
        })?;
        raw.as_deref().map(parse_watermark).transpose()
    }

    async fn set_watermark(&self, kind: SyncKind, at: DateTime<Utc>) -> Result<(), RepoError> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO sync_watermarks(name, last_sync_time) VALUES (?1, ?2)
                ON CONFLICT(name) DO UPDATE SET last_sync_time=excluded.last_sync_time
                "#,
                params![kind.as_str(), format_watermark(at)],
            )
            .map(|_| ())
        })
    }

    async fn record_season(&self, label: &str) -> Result<(), RepoError> {
        self.with_conn(|conn| {
            conn.execute("INSERT OR IGNORE INTO seasons(label) VALUES (?1)", params![label])
                .map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sync_engine::Achievements;

    fn pid(raw: &str) -> PlayerId {
        PlayerId::new(raw).unwrap()
    }

    fn player(id: &str, team: &str) -> Player {
        Player {
            id: pid(id),
            name: "Test Player".into(),
            college: "Duke".into(),
            height: "6-8".into(),
            weight: "230".into(),
            team: team.into(),
            age: 24,
            position: "F".into(),
        }
    }

    fn count(store: &SqliteStore, table: &str) -> i64 {
        store
            .row_counts()
            .unwrap()
            .into_iter()
            .find(|(t, _)| *t == table)
            .map(|(_, n)| n)
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.upsert_player(&player("a01", "BOS")).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(
            store.upsert_player(&player("a01", "MIA")).await.unwrap(),
            UpsertOutcome::Updated(1)
        );
        assert_eq!(count(&store, "players"), 1);
        assert_eq!(store.player(&pid("a01")).unwrap().unwrap().team, "MIA");

        assert!(store.player_exists(&pid("a01")).await.unwrap());
        assert!(!store.player_exists(&pid("zz99")).await.unwrap());
        assert_eq!(store.update_player_details(&pid("zz99"), 30, "LAL").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn season_line_keeps_rookie_flag_and_traded_update_keeps_team() {
        let store = SqliteStore::open_in_memory().unwrap();
        let season = Season::new(2025);
        let mut line = SeasonStatRecord::empty(pid("a01"), season);
        line.team = "BRK".into();
        line.games = 10;
        store.upsert_season_stats(&line).await.unwrap();
        assert_eq!(store.set_rookie(&pid("a01"), season).await.unwrap(), 1);

        line.games = 12;
        store.upsert_season_stats(&line).await.unwrap();
        let stored = store.season_stats(&pid("a01"), season).unwrap().unwrap();
        assert!(stored.rookie);
        assert_eq!(stored.games, 12);

        let mut traded = line.clone();
        traded.team = "TOT".into();
        traded.games = 40;
        assert_eq!(store.update_traded_stats(&traded).await.unwrap(), 1);
        let stored = store.season_stats(&pid("a01"), season).unwrap().unwrap();
        assert_eq!(stored.team, "BRK");
        assert_eq!(stored.games, 40);

        let snapshot = store.season_games_played(season).await.unwrap();
        assert_eq!(snapshot.get(&pid("a01")), Some(&40));
        assert!(store.season_games_played(Season::new(2024)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn career_rows_and_active_listing() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, active) in [("b01", true), ("a01", true), ("c01", false)] {
            let p = CareerPlayer {
                id: pid(id),
                name: id.into(),
                active,
                achievements: Achievements { all_star: 3, ..Achievements::default() },
            };
            store.upsert_career_player(&p).await.unwrap();
            for playoffs in [false, true] {
                store.upsert_career_stats(&CareerStatRecord::empty(pid(id), playoffs)).await.unwrap();
            }
        }
        assert_eq!(count(&store, "career_stats"), 6);

        let mut playoffs = CareerStatRecord::empty(pid("b01"), true);
        playoffs.turnovers = 2.7;
        playoffs.total_points = 4012;
        assert_eq!(store.update_career_stats(&playoffs).await.unwrap(), 1);
        let stored = store.career_stats(&pid("b01"), true).unwrap().unwrap();
        assert_eq!(stored.turnovers, 2.7);
        assert_eq!(stored.total_points, 4012);
        assert_eq!(store.career_stats(&pid("b01"), false).unwrap().unwrap().turnovers, 0.0);
        assert_eq!(store.active_career_players().await.unwrap(), vec![pid("a01"), pid("b01")]);
        assert_eq!(store.career_player_active(&pid("c01")).await.unwrap(), Some(false));
        assert_eq!(store.career_player_active(&pid("d01")).await.unwrap(), None);

        let retired = CareerPlayer {
            id: pid("a01"),
            name: "a01".into(),
            active: false,
            achievements: Achievements::default(),
        };
        assert_eq!(store.update_career_player(&retired).await.unwrap(), 1);
        assert_eq!(store.active_career_players().await.unwrap(), vec![pid("b01")]);
    }

    #[tokio::test]
    async fn watermarks_round_trip_per_kind() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.watermark(SyncKind::Regular).await.unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::microseconds(7);
        store.set_watermark(SyncKind::Regular, at).await.unwrap();
        store.set_watermark(SyncKind::Regular, at).await.unwrap();
        assert_eq!(store.watermark(SyncKind::Regular).await.unwrap(), Some(at));
        assert!(store.watermark(SyncKind::Career).await.unwrap().is_none());
        assert_eq!(count(&store, "sync_watermarks"), 1);
    }

    #[tokio::test]
    async fn season_catalog_ignores_repeats() {
        let store = SqliteStore::open_in_memory().unwrap();
        for label in ["2025", "2025", "All"] {
            store.record_season(label).await.unwrap();
        }
        assert_eq!(count(&store, "seasons"), 2);
    }

    #[test]
    fn file_store_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hoopsync.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.row_counts().unwrap().len(), TABLES.len());
    }
}
