//! # Cadence Queue Persistence (cadence-queue)
//!
//! Persists a profile's playback queue and arbitrates overlapping save
//! requests.
//!
//! **Architecture:** `QueueService` validates intent and builds save actions;
//! `QueueSaveCoordinator` debounces, cancels and serializes them behind one
//! write lock; the `db` repositories perform the SQL.
//!
//! ```text
//! playback/UI layer -> QueueService -> QueueSaveCoordinator -> db::{queues, queue_tracks}
//! ```

pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod ordering;
pub mod service;
pub mod utils;

pub use config::QueueSaveSettings;
pub use coordinator::{FlushOutcome, QueueSaveCoordinator, SaveAction, SaveOutcome, SaveScope};
pub use error::{Error, Result};
pub use service::{QueueService, QueueState};
