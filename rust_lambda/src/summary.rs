use serde::Serialize;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Clean,
    Infected,
    Error,
    Skipped,
}

/// Result of considering a single object.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub key: String,
    pub size: u64,
    pub status: ScanStatus,
    pub signature: Option<String>,
    pub error: Option<String>,
}

impl ScanOutcome {
    pub fn clean(key: impl Into<String>, size: u64) -> Self {
        Self::new(key, size, ScanStatus::Clean)
    }

    pub fn infected(key: impl Into<String>, size: u64, signature: Option<String>) -> Self {
        Self {
            signature,
            ..Self::new(key, size, ScanStatus::Infected)
        }
    }

    pub fn skipped(key: impl Into<String>, size: u64) -> Self {
        Self::new(key, size, ScanStatus::Skipped)
    }

    pub fn error(key: impl Into<String>, size: u64, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(key, size, ScanStatus::Error)
        }
    }

    fn new(key: impl Into<String>, size: u64, status: ScanStatus) -> Self {
        Self {
            key: key.into(),
            size,
            status,
            signature: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanDetail {
    pub key: String,
    pub status: ScanStatus,
    pub size_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ScanOutcome> for ScanDetail {
    fn from(outcome: ScanOutcome) -> Self {
        Self {
            size_mb: (outcome.size as f64 / BYTES_PER_MB * 100.0).round() / 100.0,
            key: outcome.key,
            status: outcome.status,
            signature: outcome.signature,
            error: outcome.error,
        }
    }
}

/// Aggregate returned by one invocation. `total_scanned` counts every object
/// that reached a verdict or failed trying; skipped objects are counted apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    pub total_scanned: usize,
    pub clean: usize,
    pub infected: usize,
    pub errors: usize,
    pub skipped: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_after: Option<String>,
    pub details: Vec<ScanDetail>,
}

impl ScanSummary {
    pub fn record(&mut self, outcome: ScanOutcome) {
        match outcome.status {
            ScanStatus::Clean => self.clean += 1,
            ScanStatus::Infected => self.infected += 1,
            ScanStatus::Error => self.errors += 1,
            ScanStatus::Skipped => self.skipped += 1,
        }
        if outcome.status != ScanStatus::Skipped {
            self.total_scanned += 1;
        }
        self.details.push(outcome.into());
    }

    /// Marks the scan as stopped early; `last_key` is where a follow-up scan should resume.
    pub fn truncate(&mut self, last_key: Option<String>) {
        self.truncated = true;
        self.resume_after = last_key;
    }

    pub fn considered(&self) -> usize {
        self.total_scanned + self.skipped
    }
}
