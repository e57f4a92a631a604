//! Run orchestration: staleness checks, timers, watermarks and run state.
//!
//! Each trigger is its own long-lived task. Runs of the same kind are
//! serialised; runs of different kinds may overlap and rely on idempotent
//! writes. All tasks stop at their next wake-up once the token is cancelled.

use chrono::{DateTime, SubsecRound, Timelike, Utc};
use logger::{EventLogger, ItemFailureEvent, SyncRunEvent, WatermarkEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bootstrap::RosterBootstrapper;
use crate::career::{CareerAggregator, DEFAULT_FAILURE_PAUSE};
use crate::error::{RepoError, SyncError};
use crate::extract::Extractor;
use crate::model::{Season, SeasonStart, SyncKind};
use crate::reconcile::PlayerReconciler;
use crate::report::BatchReport;
use crate::repository::Repository;
use crate::source::SourceUrls;
use crate::throttle::Throttle;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// A watermark older than this triggers a sync at startup.
    pub stale_after: chrono::Duration,
    /// UTC hour in which the daily reconciliation may run.
    pub daily_hour: u32,
    pub daily_period: Duration,
    pub season_start: SeasonStart,
    pub career_refresh_every: Duration,
    pub career_failure_pause: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            stale_after: chrono::Duration::days(10),
            daily_hour: 8,
            daily_period: Duration::from_secs(24 * 60 * 60),
            season_start: SeasonStart::default(),
            career_refresh_every: Duration::from_secs(3 * 24 * 60 * 60),
            career_failure_pause: DEFAULT_FAILURE_PAUSE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Checking,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Checking => "Checking",
            RunState::Running => "Running",
            RunState::Succeeded => "Succeeded",
            RunState::Failed => "Failed",
        }
    }
}

/// Result of a watermark check.
#[derive(Debug, Clone, PartialEq)]
pub enum Staleness {
    Missing,
    /// The watermark could not be read; treated as stale.
    Unreadable(String),
    Stale(chrono::Duration),
    Fresh(chrono::Duration),
}

impl Staleness {
    pub fn evaluate(
        watermark: Result<Option<DateTime<Utc>>, RepoError>,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
    ) -> Self {
        match watermark {
            Err(e) => Staleness::Unreadable(e.to_string()),
            Ok(None) => Staleness::Missing,
            Ok(Some(at)) => {
                let age = now - at;
                if age > stale_after {
                    Staleness::Stale(age)
                } else {
                    Staleness::Fresh(age)
                }
            }
        }
    }

    pub fn needs_sync(&self) -> bool {
        !matches!(self, Staleness::Fresh(_))
    }
}

/// Completion time to store: `now`, or just past `previous` if the clock went backwards.
pub fn next_watermark(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match previous {
        Some(prev) if prev >= now => prev + chrono::Duration::microseconds(1),
        _ => now,
    }
}

/// Time from `now` until the start of the next `hour:00` UTC window; zero inside the window.
pub fn delay_until_hour(now: DateTime<Utc>, hour: u32) -> chrono::Duration {
    if now.hour() == hour {
        return chrono::Duration::zero();
    }
    let today = now.date_naive();
    let start = today
        .and_hms_opt(hour, 0, 0)
        .map(|t| t.and_utc())
        .filter(|start| *start > now)
        .or_else(|| {
            today
                .succ_opt()
                .and_then(|d| d.and_hms_opt(hour, 0, 0))
                .map(|t| t.and_utc())
        });
    match start {
        Some(start) => start - now,
        None => chrono::Duration::zero(),
    }
}

/// Whether a successful run moves its kind's watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watermark {
    Advance,
    Keep,
}

pub struct SyncScheduler {
    repo: Arc<dyn Repository>,
    reconciler: PlayerReconciler,
    bootstrapper: RosterBootstrapper,
    career: CareerAggregator,
    config: ScheduleConfig,
    events: Option<Arc<EventLogger>>,
    alert_topic: Option<String>,
    states: Mutex<HashMap<SyncKind, RunState>>,
    outcomes: Mutex<HashMap<SyncKind, RunState>>,
    regular_gate: tokio::sync::Mutex<()>,
    career_gate: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(
        repo: Arc<dyn Repository>,
        extractor: Arc<dyn Extractor>,
        throttle: Arc<dyn Throttle>,
        urls: SourceUrls,
        config: ScheduleConfig,
    ) -> Self {
        let reconciler =
            PlayerReconciler::new(repo.clone(), extractor.clone(), throttle.clone(), urls.clone());
        let bootstrapper =
            RosterBootstrapper::new(repo.clone(), extractor.clone(), throttle.clone(), urls.clone());
        let career = CareerAggregator::new(repo.clone(), extractor, throttle, urls)
            .with_failure_pause(config.career_failure_pause);
        Self {
            repo,
            reconciler,
            bootstrapper,
            career,
            config,
            events: None,
            alert_topic: None,
            states: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(HashMap::new()),
            regular_gate: tokio::sync::Mutex::new(()),
            career_gate: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_log(mut self, events: Arc<EventLogger>) -> Self {
        self.events = Some(events);
        self
    }

    /// ntfy topic notified when a run fails.
    pub fn with_alert_topic(mut self, topic: impl Into<String>) -> Self {
        self.alert_topic = Some(topic.into());
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn state(&self, kind: SyncKind) -> RunState {
        self.states
            .lock()
            .ok()
            .and_then(|s| s.get(&kind).copied())
            .unwrap_or(RunState::Idle)
    }

    /// Terminal state of the most recent run of `kind`.
    pub fn last_outcome(&self, kind: SyncKind) -> Option<RunState> {
        self.outcomes.lock().ok().and_then(|o| o.get(&kind).copied())
    }

    fn set_state(&self, kind: SyncKind, state: RunState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(kind, state);
        }
        if matches!(state, RunState::Succeeded | RunState::Failed) {
            if let Ok(mut outcomes) = self.outcomes.lock() {
                outcomes.insert(kind, state);
            }
        }
        debug!(kind = %kind, state = state.as_str(), "run state");
    }

    pub fn current_season(&self) -> Season {
        Season::current(Utc::now().date_naive(), self.config.season_start)
    }

    pub async fn staleness(&self, kind: SyncKind) -> Staleness {
        self.set_state(kind, RunState::Checking);
        let staleness = Staleness::evaluate(
            self.repo.watermark(kind).await,
            Utc::now(),
            self.config.stale_after,
        );
        match &staleness {
            Staleness::Unreadable(e) => warn!(kind = %kind, "watermark unreadable, assuming stale: {e}"),
            other => info!(kind = %kind, staleness = ?other, "watermark checked"),
        }
        if !staleness.needs_sync() {
            self.set_state(kind, RunState::Idle);
        }
        staleness
    }

    // ── host operations ──────────────────────────────────────────────────────

    // Only the bootstrap writes the "Regular" watermark and only discovery
    // writes "GOAT"; the watermarks gate those two runs at startup.

    pub async fn run_bootstrap(&self, season: Season) -> Result<BatchReport, SyncError> {
        let run = self.bootstrapper.run(season, &self.cancel);
        self.execute(SyncKind::Regular, "bootstrap", Watermark::Advance, run).await
    }

    pub async fn run_incremental_sync(&self) -> Result<BatchReport, SyncError> {
        let run = self.reconciler.run(self.current_season(), &self.cancel);
        self.execute(SyncKind::Regular, "incremental", Watermark::Keep, run).await
    }

    pub async fn run_career_discovery(&self) -> Result<BatchReport, SyncError> {
        let run = self.career.run_discovery(&self.cancel);
        self.execute(SyncKind::Career, "discovery", Watermark::Advance, run).await
    }

    pub async fn run_career_refresh(&self) -> Result<BatchReport, SyncError> {
        let run = self.career.run_refresh(&self.cancel);
        self.execute(SyncKind::Career, "refresh", Watermark::Keep, run).await
    }

    /// Bootstraps the current season if the regular watermark is stale.
    pub async fn startup_check(&self) -> Result<Option<BatchReport>, SyncError> {
        if !self.staleness(SyncKind::Regular).await.needs_sync() {
            return Ok(None);
        }
        self.run_bootstrap(self.current_season()).await.map(Some)
    }

    /// Runs career discovery if the career watermark is stale.
    pub async fn career_startup_check(&self) -> Result<Option<BatchReport>, SyncError> {
        if !self.staleness(SyncKind::Career).await.needs_sync() {
            return Ok(None);
        }
        self.run_career_discovery().await.map(Some)
    }

    async fn execute<F>(
        &self,
        kind: SyncKind,
        trigger: &'static str,
        watermark: Watermark,
        run: F,
    ) -> Result<BatchReport, SyncError>
    where
        F: Future<Output = Result<BatchReport, SyncError>>,
    {
        let gate = match kind {
            SyncKind::Regular => &self.regular_gate,
            SyncKind::Career => &self.career_gate,
        };
        let _running = gate.lock().await;

        self.set_state(kind, RunState::Running);
        let started = Utc::now();
        info!(kind = %kind, trigger, "sync run started");

        let result = match run.await {
            Ok(report) if watermark == Watermark::Advance => {
                self.advance_watermark(kind).await.map(|_| report)
            }
            other => other,
        };

        let outcome = if result.is_ok() { RunState::Succeeded } else { RunState::Failed };
        self.set_state(kind, outcome);
        self.record_run(kind, trigger, started, outcome, &result).await;
        self.set_state(kind, RunState::Idle);
        result
    }

    async fn advance_watermark(&self, kind: SyncKind) -> Result<DateTime<Utc>, SyncError> {
        let previous = match self.repo.watermark(kind).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(kind = %kind, "previous watermark unreadable: {e}");
                None
            }
        };
        let at = next_watermark(previous, Utc::now());
        self.repo.set_watermark(kind, at).await?;
        info!(kind = %kind, at = %at, "watermark advanced");

        if let Some(events) = &self.events {
            let event = WatermarkEvent {
                ts: logger::now_iso(),
                event: "WATERMARK_ADVANCED",
                kind: kind.as_str().to_string(),
                at: at.to_rfc3339(),
            };
            if let Err(e) = events.log(&event) {
                warn!("event log write failed: {e}");
            }
        }
        Ok(at)
    }

    async fn record_run(
        &self,
        kind: SyncKind,
        trigger: &'static str,
        started: DateTime<Utc>,
        outcome: RunState,
        result: &Result<BatchReport, SyncError>,
    ) {
        let empty = BatchReport::default();
        let (report, error) = match result {
            Ok(report) => {
                info!(kind = %kind, trigger, "sync run succeeded: {report}");
                (report, None)
            }
            Err(e) => {
                warn!(kind = %kind, trigger, "sync run failed: {e}");
                (&empty, Some(e.to_string()))
            }
        };
        for failure in &report.failures {
            warn!(kind = %kind, key = %failure.key, stage = failure.stage, "item failed: {}", failure.message);
        }

        if let Some(events) = &self.events {
            let run_event = SyncRunEvent {
                ts: logger::now_iso(),
                event: "SYNC_RUN",
                kind: kind.as_str().to_string(),
                trigger: trigger.to_string(),
                outcome: outcome.as_str().to_string(),
                started_at: started.to_rfc3339(),
                inserted: report.inserted,
                updated: report.updated,
                unchanged: report.unchanged,
                skipped: report.skipped,
                failed: report.failures.len(),
                error: error.clone(),
            };
            if let Err(e) = events.log(&run_event) {
                warn!("event log write failed: {e}");
            }
            for f in &report.failures {
                let item = ItemFailureEvent {
                    ts: logger::now_iso(),
                    event: "SYNC_ITEM_FAILURE",
                    kind: kind.as_str().to_string(),
                    key: f.key.clone(),
                    stage: f.stage.to_string(),
                    message: f.message.clone(),
                };
                if let Err(e) = events.log(&item) {
                    warn!("event log write failed: {e}");
                    break;
                }
            }
        }

        let cancelled = matches!(result, Err(SyncError::Cancelled));
        if let (Some(topic), Some(error), false) = (&self.alert_topic, &error, cancelled) {
            let title = format!("hoopsync {} {} failed", kind.as_str(), trigger);
            logger::send_ntfy_alert(topic, error, &title).await;
        }
    }

    // ── long-lived tasks ─────────────────────────────────────────────────────

    /// Spawns the daily ticker, the annual season trigger and the career task.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().daily_loop()),
            tokio::spawn(self.clone().annual_loop()),
            tokio::spawn(self.clone().career_loop()),
        ]
    }

    async fn daily_loop(self: Arc<Self>) {
        let first = delay_until_hour(Utc::now(), self.config.daily_hour)
            .to_std()
            .unwrap_or_default();
        let mut next = tokio::time::Instant::now() + first;
        info!(in_secs = first.as_secs(), hour = self.config.daily_hour, "daily sync ticker armed");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(next) => {}
            }
            next += self.config.daily_period;

            if Utc::now().hour() != self.config.daily_hour {
                debug!("daily tick outside the sync window");
                continue;
            }
            if let Err(e) = self.run_incremental_sync().await {
                warn!("daily sync failed: {e}");
            }
        }
        info!("daily sync ticker stopped");
    }

    async fn annual_loop(self: Arc<Self>) {
        loop {
            let now = Utc::now();
            let target = self.config.season_start.next_after(now);
            let wait = (target - now).to_std().unwrap_or_default();
            info!(at = %target, "next season bootstrap scheduled");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let season = Season::current(target.date_naive(), self.config.season_start);
            if let Err(e) = self.run_bootstrap(season).await {
                warn!(season = %season, "season bootstrap failed: {e}");
            }
        }
        info!("season trigger stopped");
    }

    async fn career_loop(self: Arc<Self>) {
        if let Err(e) = self.career_startup_check().await {
            warn!("career discovery failed: {e}");
        }
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.career_refresh_every) => {}
            }
            if let Err(e) = self.run_career_refresh().await {
                warn!("career refresh failed: {e}");
            }
        }
        info!("career refresh ticker stopped");
    }
}
