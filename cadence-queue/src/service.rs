//! Queue persistence service
//!
//! `QueueService` is what the playback and UI layers call. It validates
//! requests, decides whether a change is structural or metadata-only, builds
//! the save action and hands it to the coordinator. Nothing here returns an
//! error to the caller: failures are logged and reported as a `SaveOutcome`
//! or an empty result.

use crate::config::QueueSaveSettings;
use crate::coordinator::{
    FlushOutcome, QueueSaveCoordinator, SaveAction, SaveOutcome, SaveScope,
};
use crate::db::{queue_tracks, queues};
use crate::error::{Error, Result};
use crate::ordering;
use crate::utils::retry_on_lock;
use cadence_common::config::{resolve_root_folder, TomlConfig};
use cadence_common::db::{init_database, QueueMetadata, QueueRecord, QueueTrack, RepeatMode};
use futures::FutureExt;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A profile's persisted queue: metadata plus tracks in `track_order`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueState {
    pub queue: QueueRecord,
    pub tracks: Vec<QueueTrack>,
}

impl QueueState {
    pub fn track_ids(&self) -> Vec<&str> {
        self.tracks.iter().map(|t| t.track_id.as_str()).collect()
    }

    pub fn current_track(&self) -> Option<&QueueTrack> {
        usize::try_from(self.queue.current_track_order)
            .ok()
            .and_then(|index| self.tracks.get(index))
    }
}

/// Validated input for a structural save
struct FullSave {
    metadata: QueueMetadata,
    entries: Vec<QueueTrack>,
}

/// Count of repeat-mode requests per profile
///
/// Saves that carry a repeat mode note the count when they are requested.
/// If it has moved by the time they write, a newer repeat-mode request owns
/// the column and they leave it alone.
#[derive(Debug, Default)]
struct RepeatRequests(Mutex<HashMap<i64, u64>>);

/// One profile's repeat-mode request count, taken when a save was requested
#[derive(Debug, Clone, Copy)]
struct RepeatSnapshot {
    profile_id: i64,
    requests_seen: u64,
}

impl RepeatRequests {
    fn counts(&self) -> MutexGuard<'_, HashMap<i64, u64>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, profile_id: i64) -> RepeatSnapshot {
        RepeatSnapshot {
            profile_id,
            requests_seen: self.counts().get(&profile_id).copied().unwrap_or(0),
        }
    }

    fn record_request(&self, profile_id: i64) {
        *self.counts().entry(profile_id).or_insert(0) += 1;
    }

    /// Whether no repeat-mode request arrived since `snapshot` was taken
    fn still_current(&self, snapshot: RepeatSnapshot) -> bool {
        self.snapshot(snapshot.profile_id).requests_seen == snapshot.requests_seen
    }
}

/// Queue persistence entry point
pub struct QueueService {
    pool: SqlitePool,
    coordinator: Arc<QueueSaveCoordinator>,
    settings: QueueSaveSettings,
    repeat_requests: Arc<RepeatRequests>,
}

impl QueueService {
    pub fn new(
        pool: SqlitePool,
        coordinator: Arc<QueueSaveCoordinator>,
        settings: QueueSaveSettings,
    ) -> Self {
        Self {
            pool,
            coordinator,
            settings,
            repeat_requests: Arc::new(RepeatRequests::default()),
        }
    }

    /// Load runtime settings from the database and build a coordinator
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        let settings = QueueSaveSettings::load(&pool).await?;
        let coordinator = Arc::new(QueueSaveCoordinator::new(settings.metadata_debounce));
        Ok(Self::new(pool, coordinator, settings))
    }

    /// Open the database named by the bootstrap configuration and build a service
    ///
    /// `explicit_root` takes priority over the environment and the TOML file.
    pub async fn open_from_config(
        config: &TomlConfig,
        explicit_root: Option<&Path>,
    ) -> Result<Self> {
        let root_folder = resolve_root_folder(explicit_root, Some(config));
        let db_path = config.resolve_database_path(&root_folder);
        info!(db_path = %db_path.display(), "Opening queue database");

        let pool = init_database(&db_path).await?;
        Self::open(pool).await
    }

    pub fn coordinator(&self) -> &Arc<QueueSaveCoordinator> {
        &self.coordinator
    }

    pub fn settings(&self) -> &QueueSaveSettings {
        &self.settings
    }

    /// Load a profile's queue, or `None` if it has never saved one
    ///
    /// Read failures are logged and also yield `None`.
    pub async fn get_current_queue_state(&self, profile_id: i64) -> Option<QueueState> {
        match self.load_queue_state(profile_id).await {
            Ok(state) => state,
            Err(Error::InvalidInput(reason)) => {
                info!(profile_id, %reason, "Queue load rejected");
                None
            }
            Err(e) => {
                error!(category = "playback", profile_id, error = %e, "Failed to load queue");
                None
            }
        }
    }

    async fn load_queue_state(&self, profile_id: i64) -> Result<Option<QueueState>> {
        validate_profile_id(profile_id)?;

        // One read transaction so metadata and tracks come from the same snapshot
        let mut tx = self.pool.begin().await?;
        let Some(mut queue) = queues::get_by_profile(&mut *tx, profile_id).await? else {
            debug!(profile_id, "No saved queue for profile");
            return Ok(None);
        };
        let tracks = queue_tracks::get_by_queue(&mut *tx, queue.queue_id).await?;
        tx.commit().await?;

        let count = tracks.len() as i64;
        if count > 0 && !(0..count).contains(&queue.current_track_order) {
            warn!(
                profile_id,
                queue_id = queue.queue_id,
                stored = queue.current_track_order,
                track_count = count,
                "Stored current track out of range, using 0"
            );
            queue.current_track_order = 0;
        }

        Ok(Some(QueueState { queue, tracks }))
    }

    /// Persist a new or restructured queue immediately
    ///
    /// With `explicit_order_override` the given entries are trusted as the
    /// order (renumbered if they have gaps or duplicates) and `tracks` is
    /// ignored. An empty track list is a no-op that keeps existing state.
    pub async fn save_current_queue_state(
        &self,
        profile_id: i64,
        tracks: &[String],
        current_track_index: i64,
        is_shuffled: bool,
        repeat_mode: RepeatMode,
        explicit_order_override: Option<Vec<QueueTrack>>,
    ) -> SaveOutcome {
        let save = match prepare_full_save(
            profile_id,
            tracks,
            current_track_index,
            is_shuffled,
            repeat_mode,
            explicit_order_override,
        ) {
            Ok(Some(save)) => save,
            Ok(None) => {
                info!(profile_id, "Empty track list, keeping existing queue");
                return SaveOutcome::Completed;
            }
            Err(e) => {
                info!(profile_id, error = %e, "Queue save rejected");
                return SaveOutcome::Failed(e.to_string());
            }
        };

        let pool = self.pool.clone();
        let max_wait = self.settings.max_lock_wait;
        let repeat_requests = Arc::clone(&self.repeat_requests);
        let repeat_seen = repeat_requests.snapshot(profile_id);
        let action: SaveAction = Box::new(move |scope: SaveScope| {
            async move {
                let write_repeat = repeat_requests.still_current(repeat_seen);
                let (pool, save, scope) = (&pool, &save, &scope);
                retry_on_lock("save queue", max_wait, move || {
                    write_full_queue(pool, profile_id, save, write_repeat, scope)
                })
                .await
            }
            .boxed()
        });

        self.coordinator.save_full_queue_immediate(action).await
    }

    /// Turn shuffle on or off, keeping the current track current
    ///
    /// Shuffling moves the current track to the front and randomizes the
    /// rest. Unshuffling restores `original_order` and follows the current
    /// track to its original position. A no-op if the queue is already in
    /// the requested state or does not exist.
    pub async fn set_shuffle(&self, profile_id: i64, shuffle: bool) -> SaveOutcome {
        let Some(state) = self.get_current_queue_state(profile_id).await else {
            info!(profile_id, "No queue for profile, nothing to reorder");
            return SaveOutcome::Completed;
        };
        if state.queue.is_shuffled == shuffle {
            debug!(profile_id, shuffle, "Queue already in requested shuffle state");
            return SaveOutcome::Completed;
        }

        let (entries, current_index) =
            reorder(&state.tracks, state.queue.current_track_order, shuffle);
        info!(profile_id, shuffle, tracks = entries.len(), "Reordering queue");

        self.save_current_queue_state(
            profile_id,
            &[],
            current_index,
            shuffle,
            state.queue.repeat_mode,
            Some(entries),
        )
        .await
    }

    /// Schedule a debounced update of position and shuffle flag
    ///
    /// Returns `None` when nothing was scheduled: invalid profile, or no
    /// queue yet (metadata needs a row created by a structural save). The
    /// index is clamped against the persisted track count when the save runs.
    pub async fn save_queue_metadata_only(
        &self,
        profile_id: i64,
        current_track_index: i64,
        is_shuffled: bool,
        repeat_mode: RepeatMode,
    ) -> Option<JoinHandle<SaveOutcome>> {
        if let Err(e) = validate_profile_id(profile_id) {
            info!(profile_id, error = %e, "Metadata save rejected");
            return None;
        }

        let queue_id = match queues::get_by_profile(&self.pool, profile_id).await {
            Ok(Some(record)) => record.queue_id,
            Ok(None) => {
                info!(profile_id, "No queue for profile, skipping metadata save");
                return None;
            }
            Err(e) => {
                error!(
                    category = "playback",
                    profile_id,
                    error = %e,
                    "Failed to look up queue for metadata save"
                );
                return None;
            }
        };

        let metadata = QueueMetadata {
            current_track_order: current_track_index,
            is_shuffled,
            repeat_mode,
        };
        let pool = self.pool.clone();
        let max_wait = self.settings.max_lock_wait;
        let repeat_requests = Arc::clone(&self.repeat_requests);
        let repeat_seen = repeat_requests.snapshot(profile_id);
        let action: SaveAction = Box::new(move |scope: SaveScope| {
            async move {
                let write_repeat = repeat_requests.still_current(repeat_seen);
                let (pool, scope) = (&pool, &scope);
                retry_on_lock("save queue metadata", max_wait, move || {
                    write_queue_metadata(pool, queue_id, metadata, write_repeat, scope)
                })
                .await
            }
            .boxed()
        });

        Some(self.coordinator.schedule_metadata_save(action))
    }

    /// Persist a repeat-mode change immediately
    ///
    /// Metadata and full saves requested before this call no longer write
    /// their own repeat mode, even if they execute after it.
    pub async fn save_repeat_mode(&self, profile_id: i64, repeat_mode: RepeatMode) -> SaveOutcome {
        if let Err(e) = validate_profile_id(profile_id) {
            info!(profile_id, error = %e, "Repeat mode save rejected");
            return SaveOutcome::Failed(e.to_string());
        }
        self.repeat_requests.record_request(profile_id);

        let pool = self.pool.clone();
        let max_wait = self.settings.max_lock_wait;
        let action: SaveAction = Box::new(move |scope: SaveScope| {
            async move {
                let (pool, scope) = (&pool, &scope);
                retry_on_lock("save repeat mode", max_wait, move || {
                    write_repeat_mode(pool, profile_id, repeat_mode, scope)
                })
                .await
            }
            .boxed()
        });

        self.coordinator.save_repeat_mode_immediate(action).await
    }

    /// Remove all tracks and reset metadata, keeping the queue row
    pub async fn clear_current_queue_for_profile(&self, profile_id: i64) -> SaveOutcome {
        if let Err(e) = validate_profile_id(profile_id) {
            info!(profile_id, error = %e, "Queue clear rejected");
            return SaveOutcome::Failed(e.to_string());
        }

        let pool = self.pool.clone();
        let max_wait = self.settings.max_lock_wait;
        let action: SaveAction = Box::new(move |scope: SaveScope| {
            async move {
                let (pool, scope) = (&pool, &scope);
                retry_on_lock("clear queue", max_wait, move || {
                    clear_queue(pool, profile_id, scope)
                })
                .await
            }
            .boxed()
        });

        self.coordinator.save_full_queue_immediate(action).await
    }

    /// Remove the queue row and its tracks (profile deletion)
    pub async fn delete_queue_for_profile(&self, profile_id: i64) -> SaveOutcome {
        if let Err(e) = validate_profile_id(profile_id) {
            info!(profile_id, error = %e, "Queue delete rejected");
            return SaveOutcome::Failed(e.to_string());
        }

        let pool = self.pool.clone();
        let max_wait = self.settings.max_lock_wait;
        let action: SaveAction = Box::new(move |scope: SaveScope| {
            async move {
                let (pool, scope) = (&pool, &scope);
                retry_on_lock("delete queue", max_wait, move || {
                    delete_queue(pool, profile_id, scope)
                })
                .await
            }
            .boxed()
        });

        self.coordinator.save_full_queue_immediate(action).await
    }

    /// Fire any pending debounced save, waiting at most `timeout` for the lock
    pub async fn flush_on_shutdown(&self, timeout: Duration) -> FlushOutcome {
        self.coordinator.flush_pending_saves_on_shutdown(timeout).await
    }

    /// Flush using the configured shutdown timeout
    pub async fn flush_on_shutdown_default(&self) -> FlushOutcome {
        self.flush_on_shutdown(self.settings.shutdown_flush_timeout).await
    }

    /// Drop every pending save (profile switch, teardown)
    pub fn cancel_pending_saves(&self) {
        self.coordinator.cancel_all_pending_saves();
    }
}

fn validate_profile_id(profile_id: i64) -> Result<()> {
    if profile_id <= 0 {
        return Err(Error::InvalidInput(format!(
            "profile_id must be positive, got {}",
            profile_id
        )));
    }
    Ok(())
}

fn validate_track_ids<'a>(mut ids: impl Iterator<Item = &'a str>) -> Result<()> {
    if ids.any(|id| id.trim().is_empty()) {
        return Err(Error::InvalidInput("track id must not be empty".to_string()));
    }
    Ok(())
}

/// New order for a shuffle toggle, with the current track's new index
fn reorder(
    tracks: &[QueueTrack],
    current_track_order: i64,
    shuffle: bool,
) -> (Vec<QueueTrack>, i64) {
    let current = usize::try_from(current_track_order).unwrap_or(0);
    if shuffle {
        let entries = ordering::shuffled(tracks, current, &mut rand::thread_rng());
        (entries, 0)
    } else {
        let (entries, index) = ordering::unshuffled(tracks, current);
        (entries, index as i64)
    }
}

/// Validate and normalize a structural save; `None` means nothing to save
fn prepare_full_save(
    profile_id: i64,
    tracks: &[String],
    current_track_index: i64,
    is_shuffled: bool,
    repeat_mode: RepeatMode,
    explicit_order_override: Option<Vec<QueueTrack>>,
) -> Result<Option<FullSave>> {
    validate_profile_id(profile_id)?;

    let entries = match explicit_order_override {
        Some(entries) => {
            validate_track_ids(entries.iter().map(|e| e.track_id.as_str()))?;
            let (entries, corrected) = ordering::normalize(entries);
            if corrected {
                warn!(profile_id, "Explicit queue order had gaps or duplicates, renumbered");
            }
            entries
        }
        None => {
            validate_track_ids(tracks.iter().map(String::as_str))?;
            ordering::sequential(tracks)
        }
    };

    if entries.is_empty() {
        return Ok(None);
    }

    let count = entries.len() as i64;
    let current_track_order = if (0..count).contains(&current_track_index) {
        current_track_index
    } else {
        warn!(
            profile_id,
            requested = current_track_index,
            track_count = count,
            "Current track index out of range, clamping to 0"
        );
        0
    };

    Ok(Some(FullSave {
        metadata: QueueMetadata {
            current_track_order,
            is_shuffled,
            repeat_mode,
        },
        entries,
    }))
}

/// Create or update the queue row and replace its tracks in one transaction
///
/// With `write_repeat` false an existing row keeps its stored repeat mode.
async fn write_full_queue(
    pool: &SqlitePool,
    profile_id: i64,
    save: &FullSave,
    write_repeat: bool,
    scope: &SaveScope,
) -> Result<SaveOutcome> {
    let mut tx = pool.begin().await?;
    let existing = queues::get_by_profile(&mut *tx, profile_id).await?;

    if scope.is_cancelled() {
        return Ok(SaveOutcome::Cancelled);
    }

    let queue_id = match existing {
        Some(record) if write_repeat => {
            queues::update_metadata(&mut *tx, record.queue_id, &save.metadata).await?;
            record.queue_id
        }
        Some(record) => {
            debug!(
                profile_id,
                queue_id = record.queue_id,
                "Newer repeat mode request pending, keeping stored repeat mode"
            );
            let metadata = &save.metadata;
            queues::update_position(
                &mut *tx,
                record.queue_id,
                metadata.current_track_order,
                metadata.is_shuffled,
            )
            .await?;
            record.queue_id
        }
        None => {
            let queue_id = queues::create(&mut *tx, profile_id, &save.metadata).await?;
            info!(profile_id, queue_id, "Created queue for profile");
            queue_id
        }
    };
    queue_tracks::replace_all(&mut *tx, queue_id, &save.entries).await?;
    tx.commit().await?;

    debug!(
        profile_id,
        queue_id,
        tracks = save.entries.len(),
        current = save.metadata.current_track_order,
        "Saved queue"
    );
    Ok(SaveOutcome::Completed)
}

/// Write position and shuffle flag, plus repeat mode when `write_repeat`
async fn write_queue_metadata(
    pool: &SqlitePool,
    queue_id: i64,
    mut metadata: QueueMetadata,
    write_repeat: bool,
    scope: &SaveScope,
) -> Result<SaveOutcome> {
    let mut tx = pool.begin().await?;
    let count = queue_tracks::count_by_queue(&mut *tx, queue_id).await?;

    if !(0..count.max(1)).contains(&metadata.current_track_order) {
        warn!(
            queue_id,
            requested = metadata.current_track_order,
            track_count = count,
            "Current track index out of range, clamping to 0"
        );
        metadata.current_track_order = 0;
    }

    if scope.is_cancelled() {
        return Ok(SaveOutcome::Cancelled);
    }

    let updated = if write_repeat {
        queues::update_metadata(&mut *tx, queue_id, &metadata).await?
    } else {
        debug!(queue_id, "Newer repeat mode request pending, keeping stored repeat mode");
        queues::update_position(
            &mut *tx,
            queue_id,
            metadata.current_track_order,
            metadata.is_shuffled,
        )
        .await?
    };
    if !updated {
        info!(queue_id, "Queue removed before metadata save ran");
        return Ok(SaveOutcome::Completed);
    }
    tx.commit().await?;

    debug!(queue_id, current = metadata.current_track_order, "Saved queue metadata");
    Ok(SaveOutcome::Completed)
}

async fn write_repeat_mode(
    pool: &SqlitePool,
    profile_id: i64,
    repeat_mode: RepeatMode,
    scope: &SaveScope,
) -> Result<SaveOutcome> {
    let Some(record) = queues::get_by_profile(pool, profile_id).await? else {
        info!(profile_id, "No queue for profile, skipping repeat mode save");
        return Ok(SaveOutcome::Completed);
    };

    if scope.is_cancelled() {
        return Ok(SaveOutcome::Cancelled);
    }

    queues::update_repeat_mode(pool, record.queue_id, repeat_mode).await?;
    debug!(profile_id, queue_id = record.queue_id, %repeat_mode, "Saved repeat mode");
    Ok(SaveOutcome::Completed)
}

async fn clear_queue(pool: &SqlitePool, profile_id: i64, scope: &SaveScope) -> Result<SaveOutcome> {
    let mut tx = pool.begin().await?;
    let Some(record) = queues::get_by_profile(&mut *tx, profile_id).await? else {
        info!(profile_id, "No queue for profile, nothing to clear");
        return Ok(SaveOutcome::Completed);
    };

    if scope.is_cancelled() {
        return Ok(SaveOutcome::Cancelled);
    }

    let removed = queue_tracks::delete_by_queue(&mut *tx, record.queue_id).await?;
    queues::reset_metadata(&mut *tx, record.queue_id).await?;
    tx.commit().await?;

    info!(profile_id, queue_id = record.queue_id, removed, "Cleared queue");
    Ok(SaveOutcome::Completed)
}

async fn delete_queue(
    pool: &SqlitePool,
    profile_id: i64,
    scope: &SaveScope,
) -> Result<SaveOutcome> {
    let Some(record) = queues::get_by_profile(pool, profile_id).await? else {
        debug!(profile_id, "No queue for profile, nothing to delete");
        return Ok(SaveOutcome::Completed);
    };

    if scope.is_cancelled() {
        return Ok(SaveOutcome::Cancelled);
    }

    queues::delete(pool, record.queue_id).await?;
    info!(profile_id, queue_id = record.queue_id, "Deleted queue");
    Ok(SaveOutcome::Completed)
}
