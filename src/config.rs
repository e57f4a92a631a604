//! Runtime settings read from the environment (and `.env` via dotenv).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sync_engine::source::DEFAULT_BASE_URL;
use sync_engine::{ScheduleConfig, SeasonStart};
use tracing::warn;

const DAY_SECS: u64 = 24 * 60 * 60;

/// How fetches are paced: a sleep after every fetch, or a rate quota that
/// only waits when fetches come faster than one per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottleMode {
    #[default]
    Fixed,
    Quota,
}

impl FromStr for ThrottleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(ThrottleMode::Fixed),
            "quota" => Ok(ThrottleMode::Quota),
            other => Err(format!("unknown throttle mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub base_url: String,
    pub throttle: Duration,
    pub throttle_mode: ThrottleMode,
    pub failure_pause: Duration,
    pub stale_days: i64,
    pub daily_hour: u32,
    pub career_refresh_days: u64,
    pub season_start: SeasonStart,
    pub log_dir: PathBuf,
    pub ntfy_topic: Option<String>,
    pub lock_path: PathBuf,
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("{key}={raw:?} is not valid, using the default");
                default
            }
        },
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or malformed values fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let daily_hour = match parsed(&get, "SYNC_DAILY_HOUR", 8u32) {
            h if h < 24 => h,
            h => {
                warn!("SYNC_DAILY_HOUR={h} is out of range, using 8");
                8
            }
        };
        let season_start = match get("SYNC_SEASON_START") {
            None => SeasonStart::default(),
            Some(raw) => SeasonStart::parse(&raw).unwrap_or_else(|| {
                warn!("SYNC_SEASON_START={raw:?} is not MM-DD, using 11-01");
                SeasonStart::default()
            }),
        };

        Self {
            db_path: get("SYNC_DB_PATH").unwrap_or_else(|| "data/hoopsync.db".to_string()).into(),
            base_url: get("SYNC_SOURCE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            throttle: Duration::from_secs(parsed(&get, "SYNC_THROTTLE_SECS", 4)),
            throttle_mode: parsed(&get, "SYNC_THROTTLE_MODE", ThrottleMode::Fixed),
            failure_pause: Duration::from_secs(parsed(&get, "SYNC_FAILURE_PAUSE_SECS", 4)),
            stale_days: parsed(&get, "SYNC_STALE_DAYS", 10),
            daily_hour,
            career_refresh_days: parsed(&get, "SYNC_CAREER_REFRESH_DAYS", 3u64).max(1),
            season_start,
            log_dir: get("SYNC_LOG_DIR").unwrap_or_else(|| "logs".to_string()).into(),
            ntfy_topic: get("SYNC_NTFY_TOPIC").filter(|t| !t.trim().is_empty()),
            lock_path: env::temp_dir().join("hoopsync.lock"),
        }
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            stale_after: chrono::Duration::days(self.stale_days),
            daily_hour: self.daily_hour,
            season_start: self.season_start,
            career_refresh_every: Duration::from_secs(self.career_refresh_days * DAY_SECS),
            career_failure_pause: self.failure_pause,
            ..ScheduleConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.db_path, PathBuf::from("data/hoopsync.db"));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.throttle, Duration::from_secs(4));
        assert_eq!(cfg.throttle_mode, ThrottleMode::Fixed);
        assert_eq!(cfg.daily_hour, 8);
        assert_eq!(cfg.season_start, SeasonStart::default());
        assert!(cfg.ntfy_topic.is_none());

        let schedule = cfg.schedule();
        assert_eq!(schedule.stale_after, chrono::Duration::days(10));
        assert_eq!(schedule.career_refresh_every, Duration::from_secs(3 * DAY_SECS));
    }

    #[test]
    fn overrides_and_bad_values() {
        let cfg = config(&[
            ("SYNC_THROTTLE_SECS", "2"),
            ("SYNC_THROTTLE_MODE", "Quota"),
            ("SYNC_STALE_DAYS", "abc"),
            ("SYNC_DAILY_HOUR", "31"),
            ("SYNC_SEASON_START", "10-15"),
            ("SYNC_NTFY_TOPIC", "hoops-alerts"),
        ]);
        assert_eq!(cfg.throttle, Duration::from_secs(2));
        assert_eq!(cfg.throttle_mode, ThrottleMode::Quota);
        assert_eq!(cfg.stale_days, 10);
        assert_eq!(cfg.daily_hour, 8);
        assert_eq!(cfg.season_start, SeasonStart::new(10, 15).unwrap());
        assert_eq!(cfg.ntfy_topic.as_deref(), Some("hoops-alerts"));
    }

    #[test]
    fn unknown_throttle_mode_falls_back_to_fixed() {
        assert_eq!(config(&[("SYNC_THROTTLE_MODE", "burst")]).throttle_mode, ThrottleMode::Fixed);
    }
}
