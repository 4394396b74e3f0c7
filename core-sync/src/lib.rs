//! # Snapshot Synchronizer Module
//!
//! Pulls one consistent setlist snapshot from a remote source of truth and
//! commits it into the offline store.
//!
//! ## Overview
//!
//! This module manages the download pipeline:
//! - Fetching the setlist, its songs, sections, and arrangements through the
//!   abstract [`SetlistSource`] interface
//! - Committing rows in dependency order with idempotent upserts
//! - Reporting staged, monotonically increasing progress to the caller
//!
//! ## Components
//!
//! - **Remote Source** (`source`): the fetch interface and remote row types
//! - **Progress** (`progress`): download stages and the progress payload
//! - **Downloader** (`downloader`): the staged pipeline and thin offline
//!   pass-throughs

pub mod downloader;
pub mod error;
pub mod progress;
pub mod source;

pub use downloader::SetlistDownloader;
pub use error::{Result, SyncError};
pub use progress::{DownloadProgress, DownloadStage};
pub use source::{
    RemoteArrangement, RemoteSection, RemoteSetlist, RemoteSong, SetlistSource, SourceError,
};
