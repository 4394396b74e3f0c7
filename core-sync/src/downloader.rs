//! The staged download pipeline.
//!
//! Fetches every row a setlist needs, then commits in dependency order so
//! referenced rows always precede their dependents. Any failure aborts the
//! run; partial writes are left in place because upserts make a retry
//! idempotent and convergent.

use crate::error::{Result, SyncError};
use crate::progress::{DownloadProgress, DownloadStage};
use crate::source::{RemoteSection, RemoteSetlist, RemoteSong, SetlistSource};
use core_store::{OfflineStore, Section, Setlist, SetlistBundle, Song, SongPosition};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Downloads setlist snapshots into the offline store and answers offline
/// availability queries.
pub struct SetlistDownloader {
    store: Arc<OfflineStore>,
    source: Arc<dyn SetlistSource>,
}

impl SetlistDownloader {
    pub fn new(store: Arc<OfflineStore>, source: Arc<dyn SetlistSource>) -> Self {
        Self { store, source }
    }

    /// Download one setlist snapshot.
    ///
    /// Reports each stage through `on_progress` with a non-decreasing
    /// percentage. Returns `true` only when every fetch and commit stage
    /// succeeded; on failure the last report carries
    /// [`DownloadStage::Error`] and the failing stage's message. There is no
    /// mid-flight cancellation — the run completes or fails.
    #[instrument(skip(self, on_progress))]
    pub async fn download_setlist(
        &self,
        setlist_id: &str,
        user_id: &str,
        on_progress: impl Fn(DownloadProgress),
    ) -> bool {
        let report = |stage: DownloadStage, percent: u8, message: &str| {
            on_progress(DownloadProgress::new(stage, percent, message));
        };

        match self.run(setlist_id, &report).await {
            Ok(()) => {
                info!(setlist_id, "Setlist download complete");
                report(DownloadStage::Complete, 100, "Download complete");
                true
            }
            Err(e) => {
                error!(setlist_id, stage = e.stage(), error = %e, "Setlist download failed");
                report(DownloadStage::Error, 0, &e.to_string());
                false
            }
        }
    }

    async fn run(
        &self,
        setlist_id: &str,
        report: &impl Fn(DownloadStage, u8, &str),
    ) -> Result<()> {
        report(DownloadStage::Fetching, 10, "Fetching setlist data...");
        let remote_setlist = self
            .source
            .fetch_setlist(setlist_id)
            .await
            .map_err(|e| source_err("fetching setlist", e))?;

        report(DownloadStage::Fetching, 20, "Resolving song list...");
        if remote_setlist.song_ids.is_empty() {
            return Err(SyncError::EmptySetlist(setlist_id.to_string()));
        }
        let song_ids = remote_setlist.song_ids.clone();

        report(DownloadStage::Fetching, 30, "Fetching song details...");
        let songs = self
            .source
            .fetch_songs(&song_ids)
            .await
            .map_err(|e| source_err("fetching songs", e))?;

        report(DownloadStage::Fetching, 50, "Fetching song sections...");
        let sections = self
            .source
            .fetch_sections(&song_ids)
            .await
            .map_err(|e| source_err("fetching sections", e))?;

        report(DownloadStage::Fetching, 70, "Fetching arrangements...");
        let arrangements = self
            .source
            .fetch_arrangements(&song_ids)
            .await
            .map_err(|e| source_err("fetching arrangements", e))?;

        // Commit in dependency order: setlist, songs, sections, arrangements.
        report(DownloadStage::Saving, 75, "Saving setlist...");
        let setlist = setlist_from_remote(remote_setlist);
        self.store
            .upsert_setlist(&setlist)
            .await
            .map_err(|e| store_err("saving setlist", e))?;

        report(DownloadStage::Saving, 80, "Saving songs...");
        for remote_song in songs {
            let song = song_from_remote(remote_song);
            self.store
                .upsert_song(&song)
                .await
                .map_err(|e| store_err("saving songs", e))?;
        }

        report(DownloadStage::Saving, 85, "Saving sections...");
        // The remote rows carry no position; enumeration order of the
        // fetched rows is the structural order.
        for (index, remote_section) in sections.into_iter().enumerate() {
            let section = section_from_remote(remote_section, index as i64);
            self.store
                .upsert_section(&section)
                .await
                .map_err(|e| store_err("saving sections", e))?;
        }

        report(DownloadStage::Saving, 95, "Saving arrangements...");
        for remote_arrangement in arrangements {
            let arrangement = core_store::Arrangement {
                id: remote_arrangement.id,
                song_id: remote_arrangement.song_id,
                section_id: remote_arrangement.section_id,
                position: remote_arrangement.position,
                repeat_count: remote_arrangement.repeat_count,
                notes: remote_arrangement.notes,
            };
            self.store
                .upsert_arrangement(&arrangement)
                .await
                .map_err(|e| store_err("saving arrangements", e))?;
        }

        Ok(())
    }

    /// Remove a downloaded setlist snapshot.
    pub async fn delete_offline_setlist(&self, setlist_id: &str) -> bool {
        match self.store.delete_setlist(setlist_id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(setlist_id, error = %e, "Failed to delete offline setlist");
                false
            }
        }
    }

    /// All setlists available offline, newest snapshot first.
    pub async fn downloaded_setlists(&self) -> Vec<Setlist> {
        match self.store.setlists().await {
            Ok(setlists) => setlists,
            Err(e) => {
                warn!(error = %e, "Failed to list downloaded setlists");
                Vec::new()
            }
        }
    }

    /// Whether a snapshot of this setlist exists locally.
    pub async fn is_setlist_downloaded(&self, setlist_id: &str) -> bool {
        self.store
            .is_setlist_downloaded(setlist_id)
            .await
            .unwrap_or(false)
    }

    /// The fully reconstructed setlist for offline/live use.
    pub async fn offline_setlist_data(&self, setlist_id: &str) -> Option<SetlistBundle> {
        match self.store.full_setlist_data(setlist_id).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(setlist_id, error = %e, "Failed to load offline setlist data");
                None
            }
        }
    }
}

fn source_err(stage: &str, e: crate::source::SourceError) -> SyncError {
    SyncError::Source {
        stage: stage.to_string(),
        message: e.to_string(),
    }
}

fn store_err(stage: &str, e: core_store::StoreError) -> SyncError {
    SyncError::Store {
        stage: stage.to_string(),
        source: e,
    }
}

fn setlist_from_remote(remote: RemoteSetlist) -> Setlist {
    let songs = remote
        .song_ids
        .iter()
        .enumerate()
        .map(|(index, song_id)| SongPosition {
            song_id: song_id.clone(),
            position: index as i64,
        })
        .collect();

    Setlist {
        id: remote.id,
        name: remote.name,
        date: remote.date,
        theme: remote.theme,
        user_id: remote.user_id,
        downloaded_at: chrono::Utc::now().timestamp(),
        songs,
    }
}

fn song_from_remote(remote: RemoteSong) -> Song {
    Song {
        id: remote.id,
        title: remote.title,
        artist: remote.artist,
        media_url: remote.media_url,
        thumbnail_url: remote.thumbnail_url,
        key: remote.key,
        tempo: remote.tempo,
        time_signature: remote.time_signature,
        default_transpose: remote.default_transpose.unwrap_or(0),
        user_id: remote.user_id,
        capo: remote.capo,
    }
}

fn section_from_remote(remote: RemoteSection, position: i64) -> Section {
    let name = remote
        .name
        .or_else(|| remote.section_type.clone())
        .unwrap_or_else(|| "Section".to_string());

    Section {
        id: remote.id,
        song_id: remote.song_id,
        name,
        position,
        bar_count: remote.bar_count,
        color: None,
        lyrics: remote.lyrics,
        chords: remote.chords,
        section_type: remote.section_type,
        time_signature: remote.time_signature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RemoteSection;

    #[test]
    fn test_setlist_from_remote_enumerates_positions() {
        let remote = RemoteSetlist {
            id: "setlist-1".to_string(),
            name: "Evening Set".to_string(),
            date: "2025-11-02".to_string(),
            theme: None,
            user_id: "user-1".to_string(),
            song_ids: vec!["b".to_string(), "a".to_string()],
        };

        let setlist = setlist_from_remote(remote);
        assert_eq!(setlist.songs.len(), 2);
        assert_eq!(setlist.songs[0].song_id, "b");
        assert_eq!(setlist.songs[0].position, 0);
        assert_eq!(setlist.songs[1].song_id, "a");
        assert_eq!(setlist.songs[1].position, 1);
    }

    #[test]
    fn test_section_name_falls_back_to_type() {
        let remote = RemoteSection {
            id: "sec-1".to_string(),
            song_id: "song-1".to_string(),
            name: None,
            bar_count: None,
            lyrics: None,
            chords: None,
            section_type: Some("chorus".to_string()),
            time_signature: None,
        };

        let section = section_from_remote(remote, 3);
        assert_eq!(section.name, "chorus");
        assert_eq!(section.position, 3);

        let anonymous = RemoteSection {
            id: "sec-2".to_string(),
            song_id: "song-1".to_string(),
            name: None,
            bar_count: None,
            lyrics: None,
            chords: None,
            section_type: None,
            time_signature: None,
        };
        assert_eq!(section_from_remote(anonymous, 0).name, "Section");
    }
}
