//! The remote fetch interface consumed by the synchronizer.
//!
//! [`SetlistSource`] abstracts the remote source of truth. Implementations
//! live outside this crate (an HTTP backend, a test double); the downloader
//! only cares about the four set-based reads below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque failure from a remote source implementation.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A setlist as the remote knows it, with its ordered song-id list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSetlist {
    pub id: String,
    pub name: String,
    pub date: String,
    pub theme: Option<String>,
    pub user_id: String,
    /// Song ids in playback order; array index is the position
    pub song_ids: Vec<String>,
}

/// A song row as fetched from the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSong {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub key: Option<String>,
    pub tempo: Option<i64>,
    pub time_signature: Option<String>,
    pub default_transpose: Option<i64>,
    pub user_id: String,
    pub capo: Option<i64>,
}

/// A section row as fetched from the remote.
///
/// The remote representation carries no explicit position; the downloader
/// assigns positions by enumeration order of the fetched rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSection {
    pub id: String,
    pub song_id: String,
    pub name: Option<String>,
    pub bar_count: Option<i64>,
    pub lyrics: Option<String>,
    pub chords: Option<String>,
    pub section_type: Option<String>,
    pub time_signature: Option<String>,
}

/// An arrangement row as fetched from the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArrangement {
    pub id: String,
    pub song_id: String,
    pub section_id: String,
    pub position: i64,
    pub repeat_count: Option<i64>,
    pub notes: Option<String>,
}

/// Read access to the remote source of truth.
///
/// All reads are set-based: one round trip per entity kind for a whole
/// setlist, never one per song.
#[async_trait]
pub trait SetlistSource: Send + Sync {
    /// Fetch a setlist by id, including its ordered song-id list.
    async fn fetch_setlist(&self, setlist_id: &str)
        -> std::result::Result<RemoteSetlist, SourceError>;

    /// Fetch full song rows for an id set.
    async fn fetch_songs(
        &self,
        song_ids: &[String],
    ) -> std::result::Result<Vec<RemoteSong>, SourceError>;

    /// Fetch all sections belonging to a song id set.
    async fn fetch_sections(
        &self,
        song_ids: &[String],
    ) -> std::result::Result<Vec<RemoteSection>, SourceError>;

    /// Fetch all arrangements belonging to a song id set, in sequence order.
    async fn fetch_arrangements(
        &self,
        song_ids: &[String],
    ) -> std::result::Result<Vec<RemoteArrangement>, SourceError>;
}
