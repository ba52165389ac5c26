//! Queue ordering helpers
//!
//! Pure functions over `QueueTrack` lists. They reconcile `track_order` and
//! `original_order` when a queue is shuffled, unshuffled or handed in with an
//! explicit order; they never decide what plays next.

use cadence_common::db::QueueTrack;
use rand::seq::SliceRandom;
use rand::Rng;

/// Entries for an unshuffled list, in list order
pub fn sequential<S: AsRef<str>>(track_ids: &[S]) -> Vec<QueueTrack> {
    track_ids
        .iter()
        .enumerate()
        .map(|(index, id)| QueueTrack::sequential(id.as_ref(), index))
        .collect()
}

/// Shuffle a queue, moving the current entry to the front
///
/// `entries` must be in `track_order` order. Every entry keeps its
/// `original_order`, so the shuffle can later be undone. If
/// `current_index` is out of range the whole list is shuffled. The new
/// current index is always 0 for a non-empty result.
pub fn shuffled<R: Rng + ?Sized>(
    entries: &[QueueTrack],
    current_index: usize,
    rng: &mut R,
) -> Vec<QueueTrack> {
    let mut rest: Vec<QueueTrack> = entries.to_vec();
    let current = (current_index < rest.len()).then(|| rest.remove(current_index));

    rest.shuffle(rng);

    current
        .into_iter()
        .chain(rest)
        .enumerate()
        .map(|(position, entry)| QueueTrack {
            track_order: position as i64,
            ..entry
        })
        .collect()
}

/// Restore list order from `original_order`
///
/// Returns the renumbered entries and the new index of the entry that was at
/// `current_index` (0 if `current_index` was out of range).
pub fn unshuffled(entries: &[QueueTrack], current_index: usize) -> (Vec<QueueTrack>, usize) {
    let mut indexed: Vec<(usize, &QueueTrack)> = entries.iter().enumerate().collect();
    indexed.sort_by_key(|(_, entry)| entry.original_order);

    let new_index = indexed
        .iter()
        .position(|(old_index, _)| *old_index == current_index)
        .unwrap_or(0);

    let restored = indexed
        .into_iter()
        .enumerate()
        .map(|(position, (_, entry))| QueueTrack::sequential(entry.track_id.clone(), position))
        .collect();

    (restored, new_index)
}

/// Sort by `track_order` and renumber contiguously from 0
///
/// `original_order` values that are not a permutation of `0..len` are reset to
/// the new `track_order`. The flag reports whether anything was corrected.
pub fn normalize(mut entries: Vec<QueueTrack>) -> (Vec<QueueTrack>, bool) {
    entries.sort_by_key(|entry| entry.track_order);

    let mut corrected = false;
    for (position, entry) in entries.iter_mut().enumerate() {
        if entry.track_order != position as i64 {
            entry.track_order = position as i64;
            corrected = true;
        }
    }

    if !is_permutation(entries.iter().map(|e| e.original_order), entries.len()) {
        for entry in entries.iter_mut() {
            entry.original_order = entry.track_order;
        }
        corrected = true;
    }

    (entries, corrected)
}

fn is_permutation(values: impl Iterator<Item = i64>, len: usize) -> bool {
    let mut seen = vec![false; len];
    for value in values {
        match usize::try_from(value).ok().and_then(|v| seen.get_mut(v)) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}
