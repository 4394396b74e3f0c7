use core_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote fetch failed while {stage}: {message}")]
    Source { stage: String, message: String },

    #[error("Local write failed while {stage}: {source}")]
    Store {
        stage: String,
        #[source]
        source: StoreError,
    },

    #[error("Setlist {0} has no songs")]
    EmptySetlist(String),
}

impl SyncError {
    /// The stage the run failed in, for progress reporting.
    pub fn stage(&self) -> &str {
        match self {
            SyncError::Source { stage, .. } => stage,
            SyncError::Store { stage, .. } => stage,
            SyncError::EmptySetlist(_) => "resolving song list",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
