//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the setlist performance
//! crates:
//! - Logging and tracing bootstrap
//!
//! ## Overview
//!
//! This crate establishes the logging conventions used throughout the
//! workspace. Library crates only emit through `tracing` macros; binaries,
//! demos, and integration harnesses call [`logging::init_logging`] once at
//! startup to install a subscriber.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
