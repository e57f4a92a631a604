use rusqlite::Connection;

/// Tables counted by [`crate::SqliteStore::row_counts`].
pub const TABLES: [&str; 8] = [
    "teams",
    "players",
    "season_stats",
    "advanced_stats",
    "career_players",
    "career_stats",
    "sync_watermarks",
    "seasons",
];

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            abbreviation TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            logo_url TEXT NOT NULL,
            win_loss_pct REAL NOT NULL,
            playoffs INTEGER NOT NULL,
            division_titles INTEGER NOT NULL,
            conference_titles INTEGER NOT NULL,
            championships INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS players (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            college TEXT NOT NULL,
            height TEXT NOT NULL,
            weight TEXT NOT NULL,
            team TEXT NOT NULL,
            age INTEGER NOT NULL,
            position TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS season_stats (
            player_id TEXT NOT NULL,
            season INTEGER NOT NULL,
            team TEXT NOT NULL,
            position TEXT NOT NULL,
            games INTEGER NOT NULL,
            games_started INTEGER NOT NULL,
            minutes REAL NOT NULL,
            points REAL NOT NULL,
            rebounds REAL NOT NULL,
            assists REAL NOT NULL,
            steals REAL NOT NULL,
            blocks REAL NOT NULL,
            turnovers REAL NOT NULL,
            fg_pct REAL NOT NULL,
            fg3_pct REAL NOT NULL,
            ft_pct REAL NOT NULL,
            rookie INTEGER NOT NULL DEFAULT 0,
            UNIQUE(player_id, season)
        );

        CREATE INDEX IF NOT EXISTS idx_season_stats_season ON season_stats(season);

        CREATE TABLE IF NOT EXISTS advanced_stats (
            player_id TEXT NOT NULL,
            season INTEGER NOT NULL,
            team TEXT NOT NULL,
            per REAL NOT NULL,
            ts_pct REAL NOT NULL,
            usg_pct REAL NOT NULL,
            ows REAL NOT NULL,
            dws REAL NOT NULL,
            ws REAL NOT NULL,
            obpm REAL NOT NULL,
            dbpm REAL NOT NULL,
            bpm REAL NOT NULL,
            vorp REAL NOT NULL,
            off_rating REAL NOT NULL,
            def_rating REAL NOT NULL,
            UNIQUE(player_id, season)
        );

        CREATE TABLE IF NOT EXISTS career_players (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            active INTEGER NOT NULL,
            all_star INTEGER NOT NULL,
            all_nba INTEGER NOT NULL,
            all_defensive INTEGER NOT NULL,
            championships INTEGER NOT NULL,
            dpoy INTEGER NOT NULL,
            roy INTEGER NOT NULL,
            finals_mvp INTEGER NOT NULL,
            mvp INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_career_players_active ON career_players(active);

        CREATE TABLE IF NOT EXISTS career_stats (
            player_id TEXT NOT NULL,
            is_playoffs INTEGER NOT NULL,
            position TEXT NOT NULL,
            active INTEGER NOT NULL,
            games INTEGER NOT NULL,
            minutes REAL NOT NULL,
            points REAL NOT NULL,
            rebounds REAL NOT NULL,
            assists REAL NOT NULL,
            steals REAL NOT NULL,
            blocks REAL NOT NULL,
            turnovers REAL NOT NULL,
            fg_pct REAL NOT NULL,
            fg3_pct REAL NOT NULL,
            ft_pct REAL NOT NULL,
            per REAL NOT NULL,
            ows REAL NOT NULL,
            dws REAL NOT NULL,
            ws REAL NOT NULL,
            obpm REAL NOT NULL,
            dbpm REAL NOT NULL,
            bpm REAL NOT NULL,
            vorp REAL NOT NULL,
            off_rating REAL NOT NULL,
            def_rating REAL NOT NULL,
            total_points INTEGER NOT NULL,
            total_rebounds INTEGER NOT NULL,
            total_assists INTEGER NOT NULL,
            total_steals INTEGER NOT NULL,
            total_blocks INTEGER NOT NULL,
            UNIQUE(player_id, is_playoffs)
        );

        CREATE TABLE IF NOT EXISTS sync_watermarks (
            name TEXT PRIMARY KEY,
            last_sync_time TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS seasons (
            label TEXT PRIMARY KEY
        );
        "#,
    )
}
