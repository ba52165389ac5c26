//! Database models

use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Repeat mode stored on a queue (`'none' | 'all' | 'one'`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    All,
    One,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::None => "none",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(RepeatMode::None),
            "all" => Ok(RepeatMode::All),
            "one" => Ok(RepeatMode::One),
            other => Err(Error::InvalidInput(format!("Unknown repeat mode: {}", other))),
        }
    }
}

/// Mutable queue-level fields, written by metadata saves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueMetadata {
    pub current_track_order: i64,
    pub is_shuffled: bool,
    pub repeat_mode: RepeatMode,
}

/// One row of the `queues` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub queue_id: i64,
    pub profile_id: i64,
    pub current_track_order: i64,
    pub is_shuffled: bool,
    pub repeat_mode: RepeatMode,
    pub last_modified: DateTime<Utc>,
}

impl QueueRecord {
    pub fn metadata(&self) -> QueueMetadata {
        QueueMetadata {
            current_track_order: self.current_track_order,
            is_shuffled: self.is_shuffled,
            repeat_mode: self.repeat_mode,
        }
    }
}

/// One row of the `queue_tracks` table, minus the owning `queue_id`
///
/// `track_order` is the current position; `original_order` is the position
/// before the most recent shuffle. Both are 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTrack {
    pub track_id: String,
    pub track_order: i64,
    pub original_order: i64,
}

impl QueueTrack {
    /// Track at `index` in an unshuffled list
    pub fn sequential(track_id: impl Into<String>, index: usize) -> Self {
        Self {
            track_id: track_id.into(),
            track_order: index as i64,
            original_order: index as i64,
        }
    }
}
