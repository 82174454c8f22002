//! One windowed batch of keys and its dispatch path.

use std::hash::Hash;

use crate::{
    error::{KeyCountMismatch, SharedError},
    fetch::{Fetched, Fetcher},
    thunk::{KeyResult, Slot},
};

/// A mutable, in-progress collection of keys awaiting a single fetch.
///
/// Keys are unique within a batch (the cache layer deduplicates before
/// appending) and kept in arrival order, which is the order the fetch
/// function sees them in.
pub(crate) struct Batch<K, V> {
    /// Distinguishes this batch from its successors, so a stale window
    /// timer can tell that its batch has already been dispatched.
    id: u64,

    keys: Vec<K>,

    /// Result slot for each key, aligned with `keys`.
    slots: Vec<Slot<V>>,
}

impl<K, V> Batch<K, V> {
    pub(crate) fn new(id: u64) -> Batch<K, V> {
        Batch {
            id,
            keys: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn push(&mut self, key: K, slot: Slot<V>) {
        self.keys.push(key);
        self.slots.push(slot);
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Runs the fetch for a closed batch and fans the results out to its
/// waiters.
///
/// Runs outside the loader lock, so other tasks can keep filling a new
/// batch while this one is in flight.
pub(crate) async fn dispatch<K, V, F>(fetcher: &F, batch: Batch<K, V>)
where
    K: Send + Sync + Eq + Hash + Clone + 'static,
    V: Send + Sync + Clone + 'static,
    F: Fetcher<K, V>,
{
    let Batch { id, keys, slots } = batch;
    tracing::trace!(batch = id, keys = keys.len(), "dispatching batch");

    match fetcher.fetch(keys.clone()).await {
        Ok(fetched) => fan_out(keys, slots, fetched),
        Err(error) => {
            tracing::debug!(batch = id, %error, "batch fetch failed");
            fail_all(slots, SharedError::new(error));
        }
    }
}

/// Demultiplexes one fetch result set back into each key's slot.
fn fan_out<K, V>(keys: Vec<K>, slots: Vec<Slot<V>>, fetched: Fetched<K, V>)
where
    K: Eq + Hash,
{
    let (mut values, mut errors) = fetched.into_parts();

    let requested = keys.len();
    let mut outcomes: Vec<Option<KeyResult<V>>> = Vec::with_capacity(requested);
    for key in &keys {
        let outcome = match errors.remove(key) {
            // A per-key error overrides a value for the same key.
            Some(error) => Some(Err(SharedError::new(error))),
            None => values.remove(key).map(Ok),
        };
        outcomes.push(outcome);
    }

    // A key with neither a value nor a per-key error means the response
    // cannot be trusted to line up with the request: fail the whole batch.
    let resolved = outcomes.iter().flatten().count();
    if resolved != requested {
        tracing::debug!(requested, resolved, "batch fetch came up short");
        let mismatch = KeyCountMismatch {
            requested,
            resolved,
        };
        fail_all(slots, SharedError::new(mismatch.into()));
        return;
    }

    for (slot, outcome) in slots.into_iter().zip(outcomes) {
        if let Some(outcome) = outcome {
            let _ = slot.send(outcome);
        }
    }
}

/// Resolves every slot in a batch to the same shared error.
fn fail_all<V>(slots: Vec<Slot<V>>, error: SharedError) {
    for slot in slots {
        let _ = slot.send(Err(error.clone()));
    }
}
