//! The offline store handle.
//!
//! [`OfflineStore`] wraps the connection pool and is constructed once, then
//! passed by reference to whoever needs snapshot data. All writes are
//! insert-or-replace keyed by id so synchronizer retries converge; all reads
//! return empty collections, never errors, when nothing matches.

use crate::db::{create_pool, StoreConfig};
use crate::error::{Result, StoreError};
use crate::models::{
    Arrangement, ArrangementEntry, LiveCheckpoint, Section, Setlist, SetlistBundle, Song,
    SongEntry, SongPosition,
};
use sqlx::{query, query_as, FromRow, Pool, Sqlite};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Raw setlist row; the position list is stored as one JSON column and
/// parsed exactly once, here.
#[derive(FromRow)]
struct SetlistRow {
    id: String,
    name: String,
    date: String,
    theme: Option<String>,
    user_id: String,
    downloaded_at: i64,
    songs_json: String,
}

impl SetlistRow {
    fn into_setlist(self) -> Result<Setlist> {
        let songs: Vec<SongPosition> =
            serde_json::from_str(&self.songs_json).map_err(|e| StoreError::InvalidRecord {
                entity: "Setlist".to_string(),
                message: format!("Corrupt position list for {}: {}", self.id, e),
            })?;

        Ok(Setlist {
            id: self.id,
            name: self.name,
            date: self.date,
            theme: self.theme,
            user_id: self.user_id,
            downloaded_at: self.downloaded_at,
            songs,
        })
    }
}

/// Durable local store for setlist snapshots.
pub struct OfflineStore {
    pool: Pool<Sqlite>,
}

impl OfflineStore {
    /// Open (or create) the store and ensure the schema.
    ///
    /// Safe to call repeatedly over the same database; the schema statements
    /// are idempotent. Failure to open means offline mode is unavailable on
    /// this platform, which callers should treat as degraded, not fatal.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory store (useful for testing).
    pub async fn open_in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory()).await
    }

    /// Release the connection pool. Later operations fail with
    /// [`StoreError::Closed`] until a new store is opened.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ------------------------------------------------------------------
    // Setlists
    // ------------------------------------------------------------------

    /// Insert or replace a setlist keyed by id.
    pub async fn upsert_setlist(&self, setlist: &Setlist) -> Result<()> {
        setlist.validate().map_err(|e| StoreError::InvalidRecord {
            entity: "Setlist".to_string(),
            message: e,
        })?;

        let songs_json =
            serde_json::to_string(&setlist.songs).map_err(|e| StoreError::InvalidRecord {
                entity: "Setlist".to_string(),
                message: e.to_string(),
            })?;

        query(
            r#"
            INSERT OR REPLACE INTO setlists (id, name, date, theme, user_id, downloaded_at, songs_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&setlist.id)
        .bind(&setlist.name)
        .bind(&setlist.date)
        .bind(&setlist.theme)
        .bind(&setlist.user_id)
        .bind(setlist.downloaded_at)
        .bind(&songs_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a setlist by id.
    pub async fn setlist(&self, id: &str) -> Result<Option<Setlist>> {
        let row = query_as::<_, SetlistRow>("SELECT * FROM setlists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SetlistRow::into_setlist).transpose()
    }

    /// All downloaded setlists, newest snapshot first.
    pub async fn setlists(&self) -> Result<Vec<Setlist>> {
        let rows = query_as::<_, SetlistRow>("SELECT * FROM setlists ORDER BY downloaded_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SetlistRow::into_setlist).collect()
    }

    /// Delete a setlist snapshot. Songs are shared across setlists and are
    /// not touched.
    pub async fn delete_setlist(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM setlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether a snapshot of this setlist exists locally.
    pub async fn is_setlist_downloaded(&self, id: &str) -> Result<bool> {
        Ok(self.setlist(id).await?.is_some())
    }

    // ------------------------------------------------------------------
    // Songs
    // ------------------------------------------------------------------

    /// Insert or replace a song keyed by id.
    pub async fn upsert_song(&self, song: &Song) -> Result<()> {
        song.validate().map_err(|e| StoreError::InvalidRecord {
            entity: "Song".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT OR REPLACE INTO songs (
                id, title, artist, media_url, thumbnail_url, key, tempo,
                time_signature, default_transpose, user_id, capo
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&song.id)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.media_url)
        .bind(&song.thumbnail_url)
        .bind(&song.key)
        .bind(song.tempo)
        .bind(&song.time_signature)
        .bind(song.default_transpose)
        .bind(&song.user_id)
        .bind(song.capo)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a song by id.
    pub async fn song(&self, id: &str) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(song)
    }

    /// All locally stored songs in title order.
    pub async fn songs(&self) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>("SELECT * FROM songs ORDER BY title")
            .fetch_all(&self.pool)
            .await?;

        Ok(songs)
    }

    /// Bulk-fetch songs by id set. Unknown ids are simply absent from the
    /// result.
    pub async fn songs_by_ids(&self, ids: &[String]) -> Result<Vec<Song>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT * FROM songs WHERE id IN ({})", placeholders(ids.len()));
        let mut q = query_as::<_, Song>(&sql);
        for id in ids {
            q = q.bind(id);
        }

        Ok(q.fetch_all(&self.pool).await?)
    }

    /// Delete a song. Its sections and arrangements cascade away with it.
    pub async fn delete_song(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    /// Insert or replace a section keyed by id.
    pub async fn upsert_section(&self, section: &Section) -> Result<()> {
        section.validate().map_err(|e| StoreError::InvalidRecord {
            entity: "Section".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT OR REPLACE INTO song_sections (
                id, song_id, name, position, bar_count, color, lyrics, chords,
                section_type, time_signature
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&section.id)
        .bind(&section.song_id)
        .bind(&section.name)
        .bind(section.position)
        .bind(section.bar_count)
        .bind(&section.color)
        .bind(&section.lyrics)
        .bind(&section.chords)
        .bind(&section.section_type)
        .bind(&section.time_signature)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sections of one song in structural order.
    pub async fn sections_for_song(&self, song_id: &str) -> Result<Vec<Section>> {
        let sections = query_as::<_, Section>(
            "SELECT * FROM song_sections WHERE song_id = ? ORDER BY position",
        )
        .bind(song_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sections)
    }

    /// Bulk-fetch sections for a song id set, structural order within each
    /// song.
    pub async fn sections_for_songs(&self, song_ids: &[String]) -> Result<Vec<Section>> {
        if song_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM song_sections WHERE song_id IN ({}) ORDER BY position",
            placeholders(song_ids.len())
        );
        let mut q = query_as::<_, Section>(&sql);
        for id in song_ids {
            q = q.bind(id);
        }

        Ok(q.fetch_all(&self.pool).await?)
    }

    // ------------------------------------------------------------------
    // Arrangements
    // ------------------------------------------------------------------

    /// Insert or replace an arrangement slot keyed by id.
    pub async fn upsert_arrangement(&self, arrangement: &Arrangement) -> Result<()> {
        arrangement.validate().map_err(|e| StoreError::InvalidRecord {
            entity: "Arrangement".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT OR REPLACE INTO arrangements (id, song_id, section_id, position, repeat_count, notes)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&arrangement.id)
        .bind(&arrangement.song_id)
        .bind(&arrangement.section_id)
        .bind(arrangement.position)
        .bind(arrangement.repeat_count)
        .bind(&arrangement.notes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Performance sequence of one song in order.
    pub async fn arrangements_for_song(&self, song_id: &str) -> Result<Vec<Arrangement>> {
        let arrangements = query_as::<_, Arrangement>(
            "SELECT * FROM arrangements WHERE song_id = ? ORDER BY position",
        )
        .bind(song_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(arrangements)
    }

    /// Bulk-fetch arrangements for a song id set, sequence order within each
    /// song.
    pub async fn arrangements_for_songs(&self, song_ids: &[String]) -> Result<Vec<Arrangement>> {
        if song_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM arrangements WHERE song_id IN ({}) ORDER BY position",
            placeholders(song_ids.len())
        );
        let mut q = query_as::<_, Arrangement>(&sql);
        for id in song_ids {
            q = q.bind(id);
        }

        Ok(q.fetch_all(&self.pool).await?)
    }

    // ------------------------------------------------------------------
    // Live-state checkpoint
    // ------------------------------------------------------------------

    /// Write the single crash-recovery checkpoint row.
    pub async fn save_live_checkpoint(&self, checkpoint: &LiveCheckpoint) -> Result<()> {
        query(
            r#"
            INSERT OR REPLACE INTO live_state_cache (id, setlist_id, song_index, section_index, bar, transpose, updated_at)
            VALUES (1, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&checkpoint.setlist_id)
        .bind(checkpoint.song_index)
        .bind(checkpoint.section_index)
        .bind(checkpoint.bar)
        .bind(checkpoint.transpose)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read the checkpoint row, if one was written.
    pub async fn live_checkpoint(&self) -> Result<Option<LiveCheckpoint>> {
        let checkpoint = query_as::<_, LiveCheckpoint>(
            "SELECT setlist_id, song_index, section_index, bar, transpose, updated_at FROM live_state_cache WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(checkpoint)
    }

    /// Clear the checkpoint on session teardown.
    pub async fn clear_live_checkpoint(&self) -> Result<()> {
        query("DELETE FROM live_state_cache")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Reconstruction
    // ------------------------------------------------------------------

    /// Reassemble a full setlist for offline/live use.
    ///
    /// Loads the setlist row, then bulk-fetches every referenced song,
    /// section, and arrangement in three set-based queries — per-row round
    /// trips are expensive on embedded storage. Songs come back in the
    /// setlist's position order; ids that no longer resolve are skipped
    /// silently. Arrangement entries are enriched with their referenced
    /// section where it still exists.
    #[instrument(skip(self))]
    pub async fn full_setlist_data(&self, setlist_id: &str) -> Result<Option<SetlistBundle>> {
        let Some(setlist) = self.setlist(setlist_id).await? else {
            return Ok(None);
        };

        let song_ids = setlist.song_ids();
        let songs = self.songs_by_ids(&song_ids).await?;
        let sections = self.sections_for_songs(&song_ids).await?;
        let arrangements = self.arrangements_for_songs(&song_ids).await?;

        let song_map: HashMap<String, Song> =
            songs.into_iter().map(|s| (s.id.clone(), s)).collect();

        let mut sections_by_song: HashMap<String, Vec<Section>> = HashMap::new();
        for section in sections {
            sections_by_song
                .entry(section.song_id.clone())
                .or_default()
                .push(section);
        }

        let mut arrangements_by_song: HashMap<String, Vec<Arrangement>> = HashMap::new();
        for arrangement in arrangements {
            arrangements_by_song
                .entry(arrangement.song_id.clone())
                .or_default()
                .push(arrangement);
        }

        let mut ordered_slots: Vec<&SongPosition> = setlist.songs.iter().collect();
        ordered_slots.sort_by_key(|s| s.position);

        let mut entries = Vec::with_capacity(ordered_slots.len());
        for slot in ordered_slots {
            let Some(song) = song_map.get(&slot.song_id).cloned() else {
                debug!(song_id = %slot.song_id, "Skipping setlist entry with no local song");
                continue;
            };

            let song_sections = sections_by_song.get(&song.id).cloned().unwrap_or_default();
            let song_arrangements = arrangements_by_song
                .get(&song.id)
                .cloned()
                .unwrap_or_default();

            let arrangements = song_arrangements
                .into_iter()
                .map(|arrangement| {
                    let section = song_sections
                        .iter()
                        .find(|s| s.id == arrangement.section_id)
                        .cloned();
                    ArrangementEntry {
                        arrangement,
                        section,
                    }
                })
                .collect();

            entries.push(SongEntry {
                song,
                position: slot.position,
                sections: song_sections,
                arrangements,
            });
        }

        Ok(Some(SetlistBundle {
            setlist,
            songs: entries,
        }))
    }
}

/// `?, ?, ...` for an IN clause of `count` bindings.
fn placeholders(count: usize) -> String {
    let mut s = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
