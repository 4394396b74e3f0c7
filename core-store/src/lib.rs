//! # Offline Store Module
//!
//! Owns the local setlist snapshot database and provides the query surface
//! for fully offline use.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite schema for setlists, songs, sections, and arrangements
//! - Insert-or-replace snapshot writes keyed by entity id
//! - Set-based reconstruction of a full setlist for live performance
//! - A single-row live-state checkpoint for crash recovery

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use db::{create_pool, create_test_pool, StoreConfig};
pub use error::{Result, StoreError};
pub use models::{
    Arrangement, ArrangementEntry, LiveCheckpoint, Section, Setlist, SetlistBundle, Song,
    SongEntry, SongPosition,
};
pub use store::OfflineStore;
