//! Save Action Test Utilities

use cadence_queue::{SaveAction, SaveOutcome, SaveScope};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

/// An action that holds the write lock until released
///
/// Submit it as a repeat-mode save: no other save class can cancel it.
pub fn lock_holder(started: Arc<Notify>, release: oneshot::Receiver<()>) -> SaveAction {
    Box::new(move |_scope: SaveScope| {
        async move {
            started.notify_one();
            let _ = release.await;
            Ok::<_, cadence_queue::Error>(SaveOutcome::Completed)
        }
        .boxed()
    })
}
