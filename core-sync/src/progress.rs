//! Download progress reporting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse phase of a setlist download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStage {
    /// Pulling rows from the remote source
    Fetching,
    /// Committing rows into the offline store
    Saving,
    /// Every stage succeeded
    Complete,
    /// The run aborted; the message names the failing stage
    Error,
}

impl DownloadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStage::Fetching => "fetching",
            DownloadStage::Saving => "saving",
            DownloadStage::Complete => "complete",
            DownloadStage::Error => "error",
        }
    }
}

impl fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One progress report delivered to the download callback.
///
/// For a successful run, percentages are non-decreasing and end at 100 with
/// stage [`DownloadStage::Complete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub stage: DownloadStage,
    /// 0-100
    pub percent: u8,
    pub message: String,
}

impl DownloadProgress {
    pub fn new(stage: DownloadStage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent,
            message: message.into(),
        }
    }
}
