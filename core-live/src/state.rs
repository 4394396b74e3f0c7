//! Replicated live-performance state and wire messages.

use core_store::LiveCheckpoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The shared live-performance position.
///
/// Mutated only by the conductor; followers hold a read-only mirror. The
/// timestamp strictly increases on every conductor mutation and is the sole
/// conflict-resolution key (last writer wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveState {
    pub setlist_id: String,
    pub song_index: u32,
    pub section_index: u32,
    pub bar: u32,
    /// Transpose offset in semitones
    pub transpose: i32,
    pub playing: bool,
    /// Unix millis; strictly increasing across local mutations
    pub timestamp: i64,
}

impl LiveState {
    /// A fresh state at the top of the setlist, stamped now.
    pub fn new(setlist_id: impl Into<String>) -> Self {
        Self {
            setlist_id: setlist_id.into(),
            song_index: 0,
            section_index: 0,
            bar: 0,
            transpose: 0,
            playing: false,
            timestamp: now_millis(),
        }
    }

    /// A zeroed pre-protocol state with no timestamp.
    ///
    /// Used by the lenient role policy when a mutation arrives before any
    /// state exists.
    pub fn zeroed(setlist_id: impl Into<String>) -> Self {
        Self {
            setlist_id: setlist_id.into(),
            song_index: 0,
            section_index: 0,
            bar: 0,
            transpose: 0,
            playing: false,
            timestamp: 0,
        }
    }

    /// The persistable crash-recovery form of this state.
    pub fn to_checkpoint(&self) -> LiveCheckpoint {
        LiveCheckpoint {
            setlist_id: self.setlist_id.clone(),
            song_index: self.song_index as i64,
            section_index: self.section_index as i64,
            bar: self.bar as i64,
            transpose: self.transpose as i64,
            updated_at: self.timestamp,
        }
    }
}

impl From<LiveCheckpoint> for LiveState {
    fn from(checkpoint: LiveCheckpoint) -> Self {
        Self {
            setlist_id: checkpoint.setlist_id,
            song_index: checkpoint.song_index.max(0) as u32,
            section_index: checkpoint.section_index.max(0) as u32,
            bar: checkpoint.bar.max(0) as u32,
            transpose: checkpoint.transpose as i32,
            playing: false,
            timestamp: checkpoint.updated_at,
        }
    }
}

/// Wire message kind.
///
/// Every conductor broadcast carries the full merged state regardless of
/// kind; the kind records the intent that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    StateUpdate,
    SongChange,
    SectionChange,
    BarUpdate,
    TransposeChange,
    Play,
    Pause,
    Stop,
    SyncRequest,
    SyncResponse,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::StateUpdate => "state_update",
            MessageKind::SongChange => "song_change",
            MessageKind::SectionChange => "section_change",
            MessageKind::BarUpdate => "bar_update",
            MessageKind::TransposeChange => "transpose_change",
            MessageKind::Play => "play",
            MessageKind::Pause => "pause",
            MessageKind::Stop => "stop",
            MessageKind::SyncRequest => "sync_request",
            MessageKind::SyncResponse => "sync_response",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A conductor mutation, tagged by intent.
///
/// Coarse position changes invalidate finer ones: changing song resets
/// section and bar, changing section resets bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Jump to a song; section and bar reset to 0
    Song(u32),
    /// Jump to a section within the current song; bar resets to 0
    Section(u32),
    /// Advance/seek to a bar within the current section
    Bar(u32),
    /// Set the transpose offset in semitones
    Transpose(i32),
    /// Start or pause playback
    Playing(bool),
    /// End the session's playback entirely
    Stop,
    /// Jump to an arbitrary position in one step
    Position { song: u32, section: u32, bar: u32 },
}

impl StateChange {
    /// The wire kind announcing this mutation.
    pub fn kind(&self) -> MessageKind {
        match self {
            StateChange::Song(_) => MessageKind::SongChange,
            StateChange::Section(_) => MessageKind::SectionChange,
            StateChange::Bar(_) => MessageKind::BarUpdate,
            StateChange::Transpose(_) => MessageKind::TransposeChange,
            StateChange::Playing(true) => MessageKind::Play,
            StateChange::Playing(false) => MessageKind::Pause,
            StateChange::Stop => MessageKind::Stop,
            StateChange::Position { .. } => MessageKind::StateUpdate,
        }
    }

    /// Merge this mutation into `state`. Does not touch the timestamp.
    pub fn apply(&self, state: &mut LiveState) {
        match *self {
            StateChange::Song(song_index) => {
                state.song_index = song_index;
                state.section_index = 0;
                state.bar = 0;
            }
            StateChange::Section(section_index) => {
                state.section_index = section_index;
                state.bar = 0;
            }
            StateChange::Bar(bar) => state.bar = bar,
            StateChange::Transpose(transpose) => state.transpose = transpose,
            StateChange::Playing(playing) => state.playing = playing,
            StateChange::Stop => state.playing = false,
            StateChange::Position { song, section, bar } => {
                state.song_index = song;
                state.section_index = section;
                state.bar = bar;
            }
        }
    }
}

/// One message on the broadcast scope. Transit-only, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub kind: MessageKind,
    /// Full state on every conductor broadcast; empty on sync_request
    pub payload: Option<LiveState>,
    pub sender_id: String,
    /// Unix millis at send time
    pub sent_at: i64,
}

/// Current wall-clock in unix millis.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_change_resets_finer_position() {
        let mut state = LiveState::new("setlist-1");
        state.song_index = 1;
        state.section_index = 3;
        state.bar = 12;

        StateChange::Song(2).apply(&mut state);

        assert_eq!(state.song_index, 2);
        assert_eq!(state.section_index, 0);
        assert_eq!(state.bar, 0);
    }

    #[test]
    fn test_section_change_resets_bar_only() {
        let mut state = LiveState::new("setlist-1");
        state.song_index = 1;
        state.section_index = 3;
        state.bar = 12;

        StateChange::Section(4).apply(&mut state);

        assert_eq!(state.song_index, 1);
        assert_eq!(state.section_index, 4);
        assert_eq!(state.bar, 0);
    }

    #[test]
    fn test_change_kinds() {
        assert_eq!(StateChange::Song(0).kind(), MessageKind::SongChange);
        assert_eq!(StateChange::Section(0).kind(), MessageKind::SectionChange);
        assert_eq!(StateChange::Bar(0).kind(), MessageKind::BarUpdate);
        assert_eq!(StateChange::Transpose(2).kind(), MessageKind::TransposeChange);
        assert_eq!(StateChange::Playing(true).kind(), MessageKind::Play);
        assert_eq!(StateChange::Playing(false).kind(), MessageKind::Pause);
        assert_eq!(StateChange::Stop.kind(), MessageKind::Stop);
        assert_eq!(
            StateChange::Position {
                song: 1,
                section: 0,
                bar: 0
            }
            .kind(),
            MessageKind::StateUpdate
        );
    }

    #[test]
    fn test_message_wire_format() {
        let message = SyncMessage {
            kind: MessageKind::SongChange,
            payload: Some(LiveState::new("setlist-1")),
            sender_id: "device-1".to_string(),
            sent_at: 1_700_000_000_000,
        };

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"song_change\""));

        let decoded: SyncMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let mut state = LiveState::new("setlist-1");
        state.song_index = 2;
        state.bar = 5;
        state.playing = true;

        let restored = LiveState::from(state.to_checkpoint());

        assert_eq!(restored.setlist_id, state.setlist_id);
        assert_eq!(restored.song_index, 2);
        assert_eq!(restored.bar, 5);
        assert_eq!(restored.timestamp, state.timestamp);
        // Playback never resumes by itself after a crash
        assert!(!restored.playing);
    }
}
