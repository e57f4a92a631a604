//! hoopsync engine: keeps a local store of NBA player, team and career
//! statistics in step with basketball-reference.
//!
//! The engine is I/O-agnostic. Pages come in through [`Extractor`], records go
//! out through [`Repository`], and request pacing is a [`Throttle`].
//! [`SyncScheduler`] ties the pipelines together and owns the timers.

pub mod achievements;
pub mod bootstrap;
pub mod career;
pub mod error;
pub mod extract;
pub mod merge;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod repository;
pub mod scheduler;
pub mod source;
pub mod teams;
pub mod throttle;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use achievements::{Achievement, Achievements};
pub use error::{ExtractError, RepoError, SyncError};
pub use extract::{Cell, Extractor, Page, Row, Table};
pub use model::{
    AdvancedStatRecord, CareerPlayer, CareerStatRecord, Player, PlayerId, Season, SeasonStart,
    SeasonStatRecord, SyncKind, Team,
};
pub use report::{BatchReport, ItemFailure};
pub use repository::{Repository, UpsertOutcome};
pub use scheduler::{RunState, ScheduleConfig, Staleness, SyncScheduler};
pub use source::SourceUrls;
pub use throttle::{FixedDelay, QuotaThrottle, Throttle};
