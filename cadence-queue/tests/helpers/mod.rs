//! Test Helper Utilities
//!
//! Shared utilities for cadence-queue integration tests

#![allow(dead_code)]

pub mod db_utils;
pub mod log_capture;
pub mod save_utils;

// Re-export commonly used items
pub use db_utils::{create_test_db, create_test_service, track_ids};
pub use log_capture::{capture_logs, LogCapture};
pub use save_utils::lock_holder;
