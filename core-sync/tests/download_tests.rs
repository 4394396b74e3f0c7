//! Integration tests for the setlist download pipeline
//!
//! These tests verify the complete download workflow including:
//! - Staged progress reporting with non-decreasing percentages
//! - Dependency-ordered commits into the offline store
//! - Abort semantics when a fetch stage fails mid-run
//! - Idempotent retries after a failed run

use async_trait::async_trait;
use core_store::OfflineStore;
use core_sync::{
    DownloadProgress, DownloadStage, RemoteArrangement, RemoteSection, RemoteSetlist, RemoteSong,
    SetlistDownloader, SetlistSource, SourceError,
};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Implementations
// ============================================================================

/// Which stage of the remote fetch sequence should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailAt {
    Nothing,
    Setlist,
    Songs,
    Sections,
    Arrangements,
}

/// Scripted remote source serving one setlist.
struct ScriptedSource {
    setlist: RemoteSetlist,
    songs: Vec<RemoteSong>,
    sections: Vec<RemoteSection>,
    arrangements: Vec<RemoteArrangement>,
    fail_at: Mutex<FailAt>,
}

impl ScriptedSource {
    fn new(song_ids: &[&str]) -> Self {
        let songs = song_ids
            .iter()
            .map(|id| RemoteSong {
                id: id.to_string(),
                title: format!("Song {}", id),
                artist: None,
                media_url: None,
                thumbnail_url: None,
                key: Some("D".to_string()),
                tempo: Some(96),
                time_signature: Some("4/4".to_string()),
                default_transpose: None,
                user_id: "user-1".to_string(),
                capo: None,
            })
            .collect();

        let sections = song_ids
            .iter()
            .flat_map(|id| {
                [
                    RemoteSection {
                        id: format!("{}-verse", id),
                        song_id: id.to_string(),
                        name: Some("Verse 1".to_string()),
                        bar_count: Some(8),
                        lyrics: Some("...".to_string()),
                        chords: Some("D G A".to_string()),
                        section_type: Some("verse".to_string()),
                        time_signature: None,
                    },
                    RemoteSection {
                        id: format!("{}-chorus", id),
                        song_id: id.to_string(),
                        name: None,
                        bar_count: Some(8),
                        lyrics: Some("...".to_string()),
                        chords: Some("G D A".to_string()),
                        section_type: Some("chorus".to_string()),
                        time_signature: None,
                    },
                ]
            })
            .collect();

        let arrangements = song_ids
            .iter()
            .flat_map(|id| {
                [
                    RemoteArrangement {
                        id: format!("{}-arr-0", id),
                        song_id: id.to_string(),
                        section_id: format!("{}-verse", id),
                        position: 0,
                        repeat_count: Some(1),
                        notes: None,
                    },
                    RemoteArrangement {
                        id: format!("{}-arr-1", id),
                        song_id: id.to_string(),
                        section_id: format!("{}-chorus", id),
                        position: 1,
                        repeat_count: Some(2),
                        notes: Some("Build on the repeat".to_string()),
                    },
                ]
            })
            .collect();

        Self {
            setlist: RemoteSetlist {
                id: "setlist-1".to_string(),
                name: "Sunday Evening".to_string(),
                date: "2025-11-02".to_string(),
                theme: Some("Thanksgiving".to_string()),
                user_id: "user-1".to_string(),
                song_ids: song_ids.iter().map(|s| s.to_string()).collect(),
            },
            songs,
            sections,
            arrangements,
            fail_at: Mutex::new(FailAt::Nothing),
        }
    }

    fn fail_at(&self, stage: FailAt) {
        *self.fail_at.lock().unwrap() = stage;
    }

    fn check(&self, stage: FailAt) -> Result<(), SourceError> {
        if *self.fail_at.lock().unwrap() == stage {
            return Err(SourceError::new("remote unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl SetlistSource for ScriptedSource {
    async fn fetch_setlist(&self, _setlist_id: &str) -> Result<RemoteSetlist, SourceError> {
        self.check(FailAt::Setlist)?;
        Ok(self.setlist.clone())
    }

    async fn fetch_songs(&self, _song_ids: &[String]) -> Result<Vec<RemoteSong>, SourceError> {
        self.check(FailAt::Songs)?;
        Ok(self.songs.clone())
    }

    async fn fetch_sections(
        &self,
        _song_ids: &[String],
    ) -> Result<Vec<RemoteSection>, SourceError> {
        self.check(FailAt::Sections)?;
        Ok(self.sections.clone())
    }

    async fn fetch_arrangements(
        &self,
        _song_ids: &[String],
    ) -> Result<Vec<RemoteArrangement>, SourceError> {
        self.check(FailAt::Arrangements)?;
        Ok(self.arrangements.clone())
    }
}

struct Harness {
    downloader: SetlistDownloader,
    store: Arc<OfflineStore>,
    source: Arc<ScriptedSource>,
    reports: Arc<Mutex<Vec<DownloadProgress>>>,
}

impl Harness {
    async fn new(song_ids: &[&str]) -> Self {
        let store = Arc::new(OfflineStore::open_in_memory().await.unwrap());
        let source = Arc::new(ScriptedSource::new(song_ids));
        let downloader = SetlistDownloader::new(store.clone(), source.clone());

        Self {
            downloader,
            store,
            source,
            reports: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn download(&self) -> bool {
        let reports = self.reports.clone();
        self.downloader
            .download_setlist("setlist-1", "user-1", move |progress| {
                reports.lock().unwrap().push(progress);
            })
            .await
    }

    fn reports(&self) -> Vec<DownloadProgress> {
        self.reports.lock().unwrap().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn successful_download_commits_everything() {
    let harness = Harness::new(&["song-a", "song-b"]).await;

    assert!(harness.download().await);

    let setlist = harness.store.setlist("setlist-1").await.unwrap().unwrap();
    assert_eq!(setlist.name, "Sunday Evening");
    assert_eq!(setlist.songs.len(), 2);
    assert_eq!(setlist.songs[0].position, 0);

    let bundle = harness
        .store
        .full_setlist_data("setlist-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bundle.songs.len(), 2);
    assert_eq!(bundle.songs[0].sections.len(), 2);
    assert_eq!(bundle.songs[0].arrangements.len(), 2);

    // The chorus row had no name; it falls back to its type tag
    let chorus = bundle.songs[0]
        .sections
        .iter()
        .find(|s| s.section_type.as_deref() == Some("chorus"))
        .unwrap();
    assert_eq!(chorus.name, "chorus");
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_complete() {
    let harness = Harness::new(&["song-a"]).await;

    assert!(harness.download().await);

    let reports = harness.reports();
    assert!(!reports.is_empty());

    let mut last = 0u8;
    for report in &reports {
        assert!(
            report.percent >= last,
            "Progress went backwards: {} after {}",
            report.percent,
            last
        );
        last = report.percent;
    }

    let final_report = reports.last().unwrap();
    assert_eq!(final_report.stage, DownloadStage::Complete);
    assert_eq!(final_report.percent, 100);
}

#[tokio::test]
async fn empty_song_list_is_a_hard_failure() {
    let harness = Harness::new(&[]).await;

    assert!(!harness.download().await);

    let reports = harness.reports();
    let final_report = reports.last().unwrap();
    assert_eq!(final_report.stage, DownloadStage::Error);
    assert!(reports.iter().all(|r| r.stage != DownloadStage::Complete));

    assert!(!harness.downloader.is_setlist_downloaded("setlist-1").await);
}

#[tokio::test]
async fn section_fetch_failure_aborts_before_any_commit() {
    let harness = Harness::new(&["song-a"]).await;
    harness.source.fail_at(FailAt::Sections);

    assert!(!harness.download().await);

    let reports = harness.reports();
    assert!(reports.iter().all(|r| r.stage != DownloadStage::Complete));
    let final_report = reports.last().unwrap();
    assert_eq!(final_report.stage, DownloadStage::Error);
    assert!(final_report.message.contains("fetching sections"));

    // All fetches precede all commits, so nothing was written
    assert!(!harness.downloader.is_setlist_downloaded("setlist-1").await);
    assert!(harness.store.songs().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_run_then_retry_converges() {
    let harness = Harness::new(&["song-a", "song-b"]).await;

    harness.source.fail_at(FailAt::Arrangements);
    assert!(!harness.download().await);

    harness.source.fail_at(FailAt::Nothing);
    assert!(harness.download().await);

    let bundle = harness
        .store
        .full_setlist_data("setlist-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bundle.songs.len(), 2);
    assert_eq!(bundle.songs[0].arrangements.len(), 2);
}

#[tokio::test]
async fn downloading_twice_leaves_single_rows() {
    let harness = Harness::new(&["song-a"]).await;

    assert!(harness.download().await);
    assert!(harness.download().await);

    assert_eq!(harness.store.songs().await.unwrap().len(), 1);
    assert_eq!(
        harness
            .store
            .sections_for_song("song-a")
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn pass_throughs_reflect_store_contents() {
    let harness = Harness::new(&["song-a"]).await;

    assert!(!harness.downloader.is_setlist_downloaded("setlist-1").await);
    assert!(harness.downloader.downloaded_setlists().await.is_empty());
    assert!(harness
        .downloader
        .offline_setlist_data("setlist-1")
        .await
        .is_none());

    assert!(harness.download().await);

    assert!(harness.downloader.is_setlist_downloaded("setlist-1").await);
    assert_eq!(harness.downloader.downloaded_setlists().await.len(), 1);
    assert!(harness
        .downloader
        .offline_setlist_data("setlist-1")
        .await
        .is_some());

    assert!(harness.downloader.delete_offline_setlist("setlist-1").await);
    assert!(!harness.downloader.is_setlist_downloaded("setlist-1").await);
    assert!(!harness.downloader.delete_offline_setlist("setlist-1").await);
}
