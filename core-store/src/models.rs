//! Domain models for the offline setlist snapshot
//!
//! Rich row types with validation plus the assembled views returned by the
//! reconstruction query.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One slot in a setlist's playback order.
///
/// Positions are unique within a setlist and define the order songs are
/// performed in. The referenced song may have been deleted since the
/// snapshot was taken; reconstruction skips such entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongPosition {
    pub song_id: String,
    pub position: i64,
}

/// A downloaded setlist snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setlist {
    /// Unique identifier
    pub id: String,
    /// Setlist name
    pub name: String,
    /// Service/performance date
    pub date: String,
    /// Optional theme
    pub theme: Option<String>,
    /// Owner
    pub user_id: String,
    /// When this snapshot was committed (unix seconds)
    pub downloaded_at: i64,
    /// Ordered playback positions; validated at the storage boundary
    pub songs: Vec<SongPosition>,
}

impl Setlist {
    /// Validate setlist data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Setlist id cannot be empty".to_string());
        }

        if self.name.trim().is_empty() {
            return Err("Setlist name cannot be empty".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for slot in &self.songs {
            if slot.song_id.trim().is_empty() {
                return Err("Position list references an empty song id".to_string());
            }
            if !seen.insert(slot.position) {
                return Err(format!("Duplicate position {} in position list", slot.position));
            }
        }

        Ok(())
    }

    /// Song ids in playback order.
    pub fn song_ids(&self) -> Vec<String> {
        let mut slots: Vec<&SongPosition> = self.songs.iter().collect();
        slots.sort_by_key(|s| s.position);
        slots.into_iter().map(|s| s.song_id.clone()).collect()
    }
}

/// A song with performance metadata. Exists independently of any setlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Song {
    /// Unique identifier
    pub id: String,
    /// Song title
    pub title: String,
    /// Performing/recording artist
    pub artist: Option<String>,
    /// Reference media link
    pub media_url: Option<String>,
    /// Thumbnail for the media link
    pub thumbnail_url: Option<String>,
    /// Musical key (e.g. "G", "Bbm")
    pub key: Option<String>,
    /// Tempo in BPM
    pub tempo: Option<i64>,
    /// Time signature (e.g. "4/4")
    pub time_signature: Option<String>,
    /// Default transpose offset in semitones
    pub default_transpose: i64,
    /// Owner
    pub user_id: String,
    /// Capo fret
    pub capo: Option<i64>,
}

impl Song {
    /// Validate song data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Song id cannot be empty".to_string());
        }

        if self.title.trim().is_empty() {
            return Err("Song title cannot be empty".to_string());
        }

        if let Some(tempo) = self.tempo {
            if tempo <= 0 {
                return Err("Song tempo must be positive".to_string());
            }
        }

        if !(-11..=11).contains(&self.default_transpose) {
            return Err(format!(
                "Default transpose {} is out of semitone range",
                self.default_transpose
            ));
        }

        if let Some(capo) = self.capo {
            if capo < 0 {
                return Err("Capo fret cannot be negative".to_string());
            }
        }

        Ok(())
    }
}

/// A structural section of a song (verse, chorus, bridge, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Section {
    /// Unique identifier
    pub id: String,
    /// Owning song; cascade-deleted with it
    pub song_id: String,
    /// Section name
    pub name: String,
    /// Structural position within the song
    pub position: i64,
    /// Length in bars
    pub bar_count: Option<i64>,
    /// Display color
    pub color: Option<String>,
    /// Lyrics body
    pub lyrics: Option<String>,
    /// Chord chart body
    pub chords: Option<String>,
    /// Section type tag (verse, chorus, ...)
    pub section_type: Option<String>,
    /// Section-specific time signature override
    pub time_signature: Option<String>,
}

impl Section {
    /// Validate section data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Section id cannot be empty".to_string());
        }

        if self.song_id.trim().is_empty() {
            return Err("Section must reference a song".to_string());
        }

        if self.name.trim().is_empty() {
            return Err("Section name cannot be empty".to_string());
        }

        if self.position < 0 {
            return Err("Section position cannot be negative".to_string());
        }

        if let Some(bars) = self.bar_count {
            if bars <= 0 {
                return Err("Section bar count must be positive".to_string());
            }
        }

        Ok(())
    }
}

/// One entry in a song's performance sequence.
///
/// The sequence position is distinct from the referenced section's
/// structural position; a section may appear any number of times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Arrangement {
    /// Unique identifier
    pub id: String,
    /// Owning song; cascade-deleted with it
    pub song_id: String,
    /// Referenced section; cascade-deleted with it
    pub section_id: String,
    /// Position in the performance sequence
    pub position: i64,
    /// How many times the section repeats at this slot
    pub repeat_count: Option<i64>,
    /// Performance notes
    pub notes: Option<String>,
}

impl Arrangement {
    /// Validate arrangement data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Arrangement id cannot be empty".to_string());
        }

        if self.song_id.trim().is_empty() || self.section_id.trim().is_empty() {
            return Err("Arrangement must reference a song and a section".to_string());
        }

        if self.position < 0 {
            return Err("Arrangement position cannot be negative".to_string());
        }

        if let Some(repeat) = self.repeat_count {
            if repeat <= 0 {
                return Err("Arrangement repeat count must be positive".to_string());
            }
        }

        Ok(())
    }
}

/// Single-row crash-recovery checkpoint of the live session position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LiveCheckpoint {
    /// Setlist the session was running
    pub setlist_id: String,
    /// Current song index within the setlist
    pub song_index: i64,
    /// Current section index within the song
    pub section_index: i64,
    /// Current bar within the section
    pub bar: i64,
    /// Transpose offset in semitones
    pub transpose: i64,
    /// When the checkpoint was written (unix millis)
    pub updated_at: i64,
}

/// One arrangement slot enriched with its referenced section.
///
/// The section is `None` when the referenced row no longer resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrangementEntry {
    pub arrangement: Arrangement,
    pub section: Option<Section>,
}

/// A song assembled with its sections and performance sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongEntry {
    pub song: Song,
    /// The song's slot in the setlist playback order
    pub position: i64,
    /// Sections in structural order
    pub sections: Vec<Section>,
    /// Performance sequence in order
    pub arrangements: Vec<ArrangementEntry>,
}

/// A fully reconstructed setlist ready for offline/live use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetlistBundle {
    pub setlist: Setlist,
    /// Songs in playback order; unresolvable ids are dropped
    pub songs: Vec<SongEntry>,
}
