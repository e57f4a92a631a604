/// hoopsync logger
/// JSONL audit trail of sync runs, NTFY alerts

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// One JSON object per line, one file per UTC day.
    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let path = self.current_file();
        let line = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    pub fn current_file(&self) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        self.log_dir.join(format!("{date}.jsonl"))
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct SyncRunEvent {
    pub ts:         String,
    pub event:      &'static str,   // "SYNC_RUN"
    pub kind:       String,         // "Regular" | "GOAT"
    pub trigger:    String,         // "startup" | "daily" | "annual" | "refresh" | "manual"
    pub outcome:    String,         // "Succeeded" | "Failed"
    pub started_at: String,
    pub inserted:   usize,
    pub updated:    usize,
    pub unchanged:  usize,
    pub skipped:    usize,
    pub failed:     usize,
    pub error:      Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ItemFailureEvent {
    pub ts:      String,
    pub event:   &'static str,      // "SYNC_ITEM_FAILURE"
    pub kind:    String,
    pub key:     String,            // player id, team code, season label
    pub stage:   String,            // "persist" | "scrape" | "rookie" | ...
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct WatermarkEvent {
    pub ts:    String,
    pub event: &'static str,        // "WATERMARK_ADVANCED"
    pub kind:  String,
    pub at:    String,
}

/// Push a readable alert to an ntfy topic.
pub async fn send_ntfy_alert(topic: &str, msg: &str, title: &str) {
    let client = reqwest::Client::new();
    match client
        .post(format!("https://ntfy.sh/{topic}"))
        .header("Title", title)
        .header("Priority", "high")
        .header("Tags", "basketball")
        .body(msg.to_string())
        .send()
        .await
    {
        Ok(_)  => tracing::info!("NTFY sent: {}", title),
        Err(e) => tracing::warn!("NTFY failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(dir.path().join("logs"));
        for kind in ["Regular", "GOAT"] {
            logger
                .log(&WatermarkEvent {
                    ts: now_iso(),
                    event: "WATERMARK_ADVANCED",
                    kind: kind.to_string(),
                    at: now_iso(),
                })
                .unwrap();
        }

        let body = fs::read_to_string(logger.current_file()).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "WATERMARK_ADVANCED");
        assert_eq!(first["kind"], "Regular");
    }
}
