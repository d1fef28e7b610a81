use serde::{Deserialize, Serialize};

/// Options for one driver run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Stop once this many records have been observed. Only checked every
    /// `status_interval` records, so the stop point is rounded up to it.
    pub entry_limit: Option<usize>,
    /// Records between progress reports.
    pub status_interval: usize,
    /// Suppress progress reports.
    pub silent: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            entry_limit: None,
            status_interval: 5000,
            silent: false,
        }
    }
}

impl RunOptions {
    pub fn with_entry_limit(mut self, limit: usize) -> Self {
        self.entry_limit = Some(limit);
        self
    }

    pub fn with_status_interval(mut self, interval: usize) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}
