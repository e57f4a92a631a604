use thiserror::Error;

/// Failure to obtain structured rows from a source page.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("table `{table}` not found on {url}")]
    MissingTable { url: String, table: String },

    #[error("could not parse {url}: {message}")]
    Parse { url: String, message: String },
}

/// Failure reported by a storage backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepoError {
    #[error("storage backend: {0}")]
    Backend(String),

    #[error("storage connection lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// A required page could not be fetched or parsed; the run aborts.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// A write outside the per-item loops failed (watermark, run bookkeeping).
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepoError),

    #[error("run cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
