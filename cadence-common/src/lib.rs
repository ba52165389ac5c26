//! # Cadence Common Library
//!
//! Shared code for the Cadence playback-queue crates:
//! - Error type and result alias
//! - Bootstrap configuration loading (TOML + root folder resolution)
//! - Tracing subscriber initialisation
//! - Database pool initialisation and persisted models
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
