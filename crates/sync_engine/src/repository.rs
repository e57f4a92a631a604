//! Persistence seam. Every write is keyed by a natural key: update first,
//! insert only when the update touched nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::RepoError;
use crate::model::{
    AdvancedStatRecord, CareerPlayer, CareerStatRecord, Player, PlayerId, Season,
    SeasonStatRecord, SyncKind, Team,
};

/// Result of an update-then-insert write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated(u64),
}

impl UpsertOutcome {
    /// Zero rows touched by the update phase means the row was inserted.
    pub fn from_updated_rows(rows: u64) -> Self {
        if rows == 0 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated(rows)
        }
    }

    pub fn is_insert(self) -> bool {
        matches!(self, UpsertOutcome::Inserted)
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn upsert_team(&self, team: &Team) -> Result<UpsertOutcome, RepoError>;

    async fn upsert_player(&self, player: &Player) -> Result<UpsertOutcome, RepoError>;

    /// Refreshes the mutable part of a known player. Returns rows updated.
    async fn update_player_details(
        &self,
        id: &PlayerId,
        age: u32,
        team: &str,
    ) -> Result<u64, RepoError>;

    async fn upsert_season_stats(&self, stats: &SeasonStatRecord) -> Result<UpsertOutcome, RepoError>;

    async fn upsert_advanced_stats(
        &self,
        stats: &AdvancedStatRecord,
    ) -> Result<UpsertOutcome, RepoError>;

    /// Overwrites the statistical fields of an existing season line, team untouched.
    async fn update_traded_stats(&self, stats: &SeasonStatRecord) -> Result<u64, RepoError>;

    /// Same as `update_traded_stats` for the advanced line.
    async fn update_traded_advanced(&self, stats: &AdvancedStatRecord) -> Result<u64, RepoError>;

    async fn set_rookie(&self, id: &PlayerId, season: Season) -> Result<u64, RepoError>;

    async fn player_exists(&self, id: &PlayerId) -> Result<bool, RepoError>;

    /// Last known games played per player for one season.
    async fn season_games_played(&self, season: Season) -> Result<HashMap<PlayerId, u32>, RepoError>;

    async fn upsert_career_player(&self, player: &CareerPlayer) -> Result<UpsertOutcome, RepoError>;

    async fn upsert_career_stats(&self, stats: &CareerStatRecord) -> Result<UpsertOutcome, RepoError>;

    async fn update_career_player(&self, player: &CareerPlayer) -> Result<u64, RepoError>;

    async fn update_career_stats(&self, stats: &CareerStatRecord) -> Result<u64, RepoError>;

    /// `None` when the player was never stored, otherwise its active flag.
    async fn career_player_active(&self, id: &PlayerId) -> Result<Option<bool>, RepoError>;

    async fn active_career_players(&self) -> Result<Vec<PlayerId>, RepoError>;

    async fn watermark(&self, kind: SyncKind) -> Result<Option<DateTime<Utc>>, RepoError>;

    async fn set_watermark(&self, kind: SyncKind, at: DateTime<Utc>) -> Result<(), RepoError>;

    /// Adds a label to the season catalog; repeated labels are a no-op.
    async fn record_season(&self, label: &str) -> Result<(), RepoError>;
}
