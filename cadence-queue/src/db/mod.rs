//! Database access layer
//!
//! Repositories for the two queue entities plus the settings key-value store.
//! Single-statement functions are generic over `sqlx::Executor` so callers can
//! pass either the pool or an open transaction.

pub mod queue_tracks;
pub mod queues;
pub mod settings;
