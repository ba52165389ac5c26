//! Queue save coordination
//!
//! `QueueSaveCoordinator` is the single choke point for queue writes. It
//! distinguishes three save classes:
//!
//! - **Metadata** saves (navigation, shuffle flag) are debounced. Requests
//!   inside one quiet window collapse into a single execution of the latest
//!   request.
//! - **Full** saves (track list + metadata) run immediately. They cancel any
//!   pending metadata save and any older full save that has not yet written.
//! - **Repeat-mode** saves run immediately with their own cancellation scope:
//!   they never cancel the other classes and are never cancelled by them.
//!
//! Every save runs behind one asynchronous write lock. Cancellation is
//! cooperative and checked before the debounce fires, right after the lock
//! is acquired, and by the action itself (via [`SaveScope`]) immediately
//! before its destructive statement.
//!
//! One coordinator exists per application, shared as `Arc<QueueSaveCoordinator>`.

use crate::error::Result;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one save attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SaveOutcome {
    /// The write was performed (or was a legitimate no-op)
    Completed,
    /// Superseded by a newer request before anything was written
    Cancelled,
    /// The write failed; previously persisted state is unchanged
    Failed(String),
}

impl SaveOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SaveOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SaveOutcome::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SaveOutcome::Failed(_))
    }
}

/// Result of a shutdown flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No debounced save was waiting when the flush returned
    NothingPending,
    /// The pending save was executed immediately
    Saved(SaveOutcome),
    /// The write lock was not acquired in time; the pending save was dropped
    LockTimeout,
}

/// Save class, used for logging and passed to actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Metadata,
    Full,
    RepeatMode,
}

impl fmt::Display for SaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SaveKind::Metadata => "metadata",
            SaveKind::Full => "full",
            SaveKind::RepeatMode => "repeat_mode",
        })
    }
}

/// Handle given to a running save action
///
/// Actions call [`SaveScope::is_cancelled`] right before their destructive
/// statement and return `SaveOutcome::Cancelled` if it is set.
#[derive(Debug, Clone)]
pub struct SaveScope {
    save_id: u64,
    kind: SaveKind,
    token: CancellationToken,
}

impl SaveScope {
    pub fn save_id(&self) -> u64 {
        self.save_id
    }

    pub fn kind(&self) -> SaveKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Deferred persistence work
///
/// `Err` is reported as `SaveOutcome::Failed`; `Ok(SaveOutcome::Cancelled)`
/// means the action noticed cancellation before writing.
pub type SaveAction =
    Box<dyn FnOnce(SaveScope) -> BoxFuture<'static, Result<SaveOutcome>> + Send>;

/// The one debounced metadata save that may be waiting
struct PendingMetadata {
    save_id: u64,
    token: CancellationToken,
    /// Cancelled when the debounce task returns, whatever its outcome
    finished: CancellationToken,
    /// Taken by the debounce task when the window elapses, or by a flush
    action: Option<SaveAction>,
}

/// What a shutdown flush found in the metadata slot
enum FlushTarget {
    Nothing,
    Waiting(u64, SaveAction),
    /// Taken by its debounce task; the token fires when that task returns
    InFlight(u64, CancellationToken),
}

struct ActiveSave {
    save_id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct SaveSlots {
    metadata: Option<PendingMetadata>,
    full: Option<ActiveSave>,
    repeat: Vec<ActiveSave>,
}

struct Inner {
    write_lock: tokio::sync::Mutex<()>,
    slots: Mutex<SaveSlots>,
    next_save_id: AtomicU64,
    metadata_debounce: Duration,
}

/// Serializes, debounces and cancels queue saves
pub struct QueueSaveCoordinator {
    inner: Arc<Inner>,
}

impl QueueSaveCoordinator {
    /// Create a coordinator with the given metadata debounce window
    pub fn new(metadata_debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                write_lock: tokio::sync::Mutex::new(()),
                slots: Mutex::new(SaveSlots::default()),
                next_save_id: AtomicU64::new(1),
                metadata_debounce,
            }),
        }
    }

    pub fn metadata_debounce(&self) -> Duration {
        self.inner.metadata_debounce
    }

    /// Whether a debounced metadata save is scheduled or in flight
    pub fn has_pending_metadata_save(&self) -> bool {
        self.inner.slots().metadata.is_some()
    }

    /// Schedule a debounced metadata save
    ///
    /// Returns immediately. Any previously scheduled metadata save that has
    /// not yet started writing is cancelled; only the latest one executes.
    /// The returned handle resolves to this request's outcome and may be
    /// ignored.
    pub fn schedule_metadata_save(&self, action: SaveAction) -> JoinHandle<SaveOutcome> {
        let save_id = self.inner.next_id();
        let token = CancellationToken::new();
        let finished = CancellationToken::new();

        {
            let mut slots = self.inner.slots();
            if let Some(previous) = slots.metadata.replace(PendingMetadata {
                save_id,
                token: token.clone(),
                finished: finished.clone(),
                action: Some(action),
            }) {
                debug!(
                    save_id,
                    superseded = previous.save_id,
                    "Metadata save superseded by newer request"
                );
                previous.token.cancel();
            }
        }

        debug!(
            save_id,
            debounce_ms = self.inner.metadata_debounce.as_millis() as u64,
            "Metadata save scheduled"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_debounced(save_id, token, finished).await })
    }

    /// Run a full save now
    ///
    /// Cancels any pending metadata save and any older full save that has not
    /// yet written, then waits for the write lock. Resolves when this save
    /// has executed or has itself been superseded by a newer full save.
    pub async fn save_full_queue_immediate(&self, action: SaveAction) -> SaveOutcome {
        let save_id = self.inner.next_id();
        let token = CancellationToken::new();

        {
            let mut slots = self.inner.slots();
            if let Some(pending) = slots.metadata.take() {
                info!(
                    save_id,
                    superseded = pending.save_id,
                    "Full save cancels pending metadata save"
                );
                pending.token.cancel();
            }
            if let Some(previous) = slots.full.replace(ActiveSave {
                save_id,
                token: token.clone(),
            }) {
                info!(
                    save_id,
                    superseded = previous.save_id,
                    "Full save cancels older full save"
                );
                previous.token.cancel();
            }
        }

        let outcome = self
            .inner
            .run_exclusive(SaveKind::Full, save_id, &token, action)
            .await;

        let mut slots = self.inner.slots();
        if slots.full.as_ref().map(|s| s.save_id) == Some(save_id) {
            slots.full = None;
        }

        outcome
    }

    /// Run a repeat-mode save now, in its own cancellation scope
    pub async fn save_repeat_mode_immediate(&self, action: SaveAction) -> SaveOutcome {
        let save_id = self.inner.next_id();
        let token = CancellationToken::new();

        self.inner.slots().repeat.push(ActiveSave {
            save_id,
            token: token.clone(),
        });

        let outcome = self
            .inner
            .run_exclusive(SaveKind::RepeatMode, save_id, &token, action)
            .await;

        self.inner.slots().repeat.retain(|s| s.save_id != save_id);
        outcome
    }

    /// Fire any pending debounced save immediately
    ///
    /// Waits at most `timeout` for the write lock. If it cannot be acquired
    /// the pending save is dropped and the loss is logged; the flush never
    /// writes without holding the lock. A save whose debounce already
    /// elapsed is left to its own task, and the flush waits (again at most
    /// `timeout`) until that task has returned.
    pub async fn flush_pending_saves_on_shutdown(&self, timeout: Duration) -> FlushOutcome {
        let pending = {
            let mut slots = self.inner.slots();
            match slots.metadata.take() {
                None => FlushTarget::Nothing,
                Some(mut pending) => match pending.action.take() {
                    Some(action) => {
                        // Stop the debounce task; the flush runs the action itself
                        pending.token.cancel();
                        FlushTarget::Waiting(pending.save_id, action)
                    }
                    None => {
                        // Already past its debounce, waiting on or holding the lock
                        let target =
                            FlushTarget::InFlight(pending.save_id, pending.finished.clone());
                        slots.metadata = Some(pending);
                        target
                    }
                },
            }
        };

        let (save_id, action) = match pending {
            FlushTarget::Waiting(save_id, action) => (save_id, action),
            FlushTarget::InFlight(save_id, finished) => {
                return wait_for_in_flight(save_id, finished, timeout).await;
            }
            FlushTarget::Nothing => {
                debug!("Shutdown flush: no pending metadata save");
                return FlushOutcome::NothingPending;
            }
        };

        info!(
            save_id,
            timeout_ms = timeout.as_millis() as u64,
            "Shutdown flush: executing pending metadata save"
        );

        let _guard = match tokio::time::timeout(timeout, self.inner.write_lock.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                error!(
                    category = "playback",
                    save_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Shutdown flush timed out on the write lock; metadata save abandoned"
                );
                return FlushOutcome::LockTimeout;
            }
        };

        let outcome = self
            .inner
            .execute_locked(SaveKind::Metadata, save_id, CancellationToken::new(), action)
            .await;
        FlushOutcome::Saved(outcome)
    }

    /// Cancel every pending or waiting save (teardown, profile switch)
    ///
    /// Saves already past their final cancellation check finish normally.
    pub fn cancel_all_pending_saves(&self) {
        let cancelled = self.inner.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "Cancelled all pending queue saves");
        } else {
            debug!("No pending queue saves to cancel");
        }
    }
}

async fn wait_for_in_flight(
    save_id: u64,
    finished: CancellationToken,
    timeout: Duration,
) -> FlushOutcome {
    debug!(save_id, "Shutdown flush: waiting for in-flight metadata save");
    match tokio::time::timeout(timeout, finished.cancelled()).await {
        Ok(()) => {
            debug!(save_id, "Shutdown flush: in-flight metadata save finished");
            FlushOutcome::NothingPending
        }
        Err(_) => {
            error!(
                category = "playback",
                save_id,
                timeout_ms = timeout.as_millis() as u64,
                "Shutdown flush timed out on in-flight metadata save; it may not be persisted"
            );
            FlushOutcome::LockTimeout
        }
    }
}

impl Drop for QueueSaveCoordinator {
    fn drop(&mut self) {
        let cancelled = self.inner.cancel_all();
        if cancelled > 0 {
            warn!(cancelled, "Queue save coordinator dropped with pending saves");
        }
    }
}

impl Inner {
    fn slots(&self) -> MutexGuard<'_, SaveSlots> {
        // Slot bookkeeping stays consistent even if a holder panicked
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_save_id.fetch_add(1, Ordering::Relaxed)
    }

    fn cancel_all(&self) -> usize {
        let mut slots = self.slots();
        let mut cancelled = 0;

        if let Some(pending) = slots.metadata.take() {
            pending.token.cancel();
            cancelled += 1;
        }
        if let Some(full) = slots.full.take() {
            full.token.cancel();
            cancelled += 1;
        }
        for repeat in slots.repeat.drain(..) {
            repeat.token.cancel();
            cancelled += 1;
        }

        cancelled
    }

    async fn run_debounced(
        &self,
        save_id: u64,
        token: CancellationToken,
        finished: CancellationToken,
    ) -> SaveOutcome {
        let _finished = finished.drop_guard();

        tokio::select! {
            _ = token.cancelled() => {
                info!(save_id, "Metadata save cancelled before debounce elapsed");
                return SaveOutcome::Cancelled;
            }
            _ = tokio::time::sleep(self.metadata_debounce) => {}
        }

        let action = {
            let mut slots = self.slots();
            slots
                .metadata
                .as_mut()
                .filter(|p| p.save_id == save_id)
                .and_then(|p| p.action.take())
        };

        let outcome = match action {
            Some(action) => {
                self.run_exclusive(SaveKind::Metadata, save_id, &token, action)
                    .await
            }
            None => {
                info!(save_id, "Metadata save superseded as debounce elapsed");
                SaveOutcome::Cancelled
            }
        };

        let mut slots = self.slots();
        if slots.metadata.as_ref().map(|p| p.save_id) == Some(save_id) {
            slots.metadata = None;
        }

        outcome
    }

    /// Wait for the write lock (cancellably), then execute
    async fn run_exclusive(
        &self,
        kind: SaveKind,
        save_id: u64,
        token: &CancellationToken,
        action: SaveAction,
    ) -> SaveOutcome {
        let _guard = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(save_id, %kind, "Queue save cancelled while waiting for write lock");
                return SaveOutcome::Cancelled;
            }
            guard = self.write_lock.lock() => guard,
        };

        if token.is_cancelled() {
            info!(save_id, %kind, "Queue save cancelled after acquiring write lock");
            return SaveOutcome::Cancelled;
        }

        self.execute_locked(kind, save_id, token.clone(), action).await
    }

    /// Execute an action; the caller holds the write lock
    async fn execute_locked(
        &self,
        kind: SaveKind,
        save_id: u64,
        token: CancellationToken,
        action: SaveAction,
    ) -> SaveOutcome {
        let scope = SaveScope { save_id, kind, token };

        match action(scope).await {
            Ok(SaveOutcome::Completed) => {
                debug!(save_id, %kind, "Queue save completed");
                SaveOutcome::Completed
            }
            Ok(SaveOutcome::Cancelled) => {
                info!(save_id, %kind, "Queue save cancelled before writing");
                SaveOutcome::Cancelled
            }
            Ok(SaveOutcome::Failed(reason)) => {
                error!(category = "playback", save_id, %kind, %reason, "Queue save failed");
                SaveOutcome::Failed(reason)
            }
            Err(e) => {
                error!(category = "playback", save_id, %kind, error = %e, "Queue save failed");
                SaveOutcome::Failed(e.to_string())
            }
        }
    }
}
