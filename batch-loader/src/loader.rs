//! The public loader engine: cache, open batch, and batching policy.

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::sleep;
use tracing::Instrument;

use crate::{
    batch::{dispatch, Batch},
    error::SharedError,
    fetch::Fetcher,
    thunk::{Thunk, ThunkAll},
};

/// Debounce window applied to fresh batches unless
/// [`with_wait`](Loader::with_wait) overrides it.
const DEFAULT_WAIT: Duration = Duration::from_millis(16);

/// A batching, memoizing key/value loader.
///
/// Individual requests that arrive within one debounce window (or before the
/// configured batch capacity is reached) are merged into a single call to
/// the [`Fetcher`], and every resolved key is memoized for the lifetime of
/// the loader. See the crate documentation for the batching model.
///
/// `Loader` is a cheap handle: clones share one cache and one open batch.
/// Loading requires a Tokio runtime context, because batch timers and
/// dispatches run as spawned tasks.
pub struct Loader<K, V, F> {
    inner: Arc<Inner<K, V, F>>,
    wait: Duration,
    capacity: usize,
}

struct Inner<K, V, F> {
    fetcher: F,
    state: Mutex<State<K, V>>,
}

struct State<K, V> {
    /// Key to pending-or-resolved thunk.
    ///
    /// There is no eviction: entries live until explicitly cleared.
    cache: HashMap<K, Thunk<V>>,

    /// The batch currently accepting keys, if any.
    batch: Option<Batch<K, V>>,

    /// Id handed to the next batch that opens.
    next_batch_id: u64,
}

impl<K, V, F> Inner<K, V, F> {
    fn lock_state(&self) -> MutexGuard<'_, State<K, V>> {
        self.state
            .lock()
            .expect("previous task panicked while holding the loader state lock")
    }
}

impl<K, V, F> Loader<K, V, F>
where
    K: Send + Sync + Eq + Hash + Clone + 'static,
    V: Send + Sync + Clone + 'static,
    F: Fetcher<K, V>,
{
    /// Creates a loader around `fetcher` with the default options: a 16 ms
    /// debounce window and unbounded batches.
    pub fn new(fetcher: F) -> Loader<K, V, F> {
        Loader {
            inner: Arc::new(Inner {
                fetcher,
                state: Mutex::new(State {
                    cache: HashMap::new(),
                    batch: None,
                    next_batch_id: 0,
                }),
            }),
            wait: DEFAULT_WAIT,
            capacity: 0,
        }
    }

    /// Sets the debounce window, measured from the first key added to a
    /// fresh batch.
    ///
    /// The window is fixed, not sliding: keys added later do not extend it.
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Loader<K, V, F> {
        self.wait = wait;
        self
    }

    /// Sets the maximum number of keys per batch.
    ///
    /// Reaching the capacity dispatches the batch immediately instead of
    /// waiting out the debounce window. `0` (the default) means unbounded:
    /// batches close only when the window elapses.
    #[must_use]
    pub fn with_batch_capacity(mut self, capacity: usize) -> Loader<K, V, F> {
        self.capacity = capacity;
        self
    }

    /// Loads one key, blocking the calling task until its batch resolves.
    pub async fn load(&self, key: K) -> Result<V, SharedError> {
        self.load_thunk(key).await
    }

    /// Returns a deferred handle to `key`'s value without blocking.
    ///
    /// A cache hit (resolved or still in flight) shares the existing entry
    /// without touching any batch. Otherwise the key joins the open batch,
    /// opening a new one and arming its window timer if none is open.
    pub fn load_thunk(&self, key: K) -> Thunk<V> {
        let mut state = self.inner.lock_state();

        if let Some(thunk) = state.cache.get(&key) {
            tracing::trace!("key already cached or in flight");
            return thunk.clone();
        }

        let (thunk, slot) = Thunk::pending();
        state.cache.insert(key.clone(), thunk.clone());

        if state.batch.is_none() {
            let id = state.next_batch_id;
            state.next_batch_id += 1;
            tracing::trace!(batch = id, wait = ?self.wait, "opening batch");
            self.arm_window_timer(id);
            state.batch = Some(Batch::new(id));
        }

        let batch = state.batch.as_mut().expect("a batch was just ensured open");
        batch.push(key, slot);

        if self.capacity != 0 && batch.len() >= self.capacity {
            let batch = state
                .batch
                .take()
                .expect("an open batch was just appended to");
            tracing::trace!(batch = batch.id(), "batch is full");
            drop(state);
            self.spawn_dispatch(batch);
        }

        thunk
    }

    /// Loads many keys, blocking until all of them resolve.
    ///
    /// The result preserves request order, one entry per requested key:
    /// per-key failures surface as `Err` at their position and never
    /// collapse the rest. "No errors at all" is observable as every entry
    /// being `Ok`.
    pub async fn load_all(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Vec<Result<V, SharedError>> {
        self.load_all_thunk(keys).await
    }

    /// Returns a deferred handle to the values of `keys`, in order.
    ///
    /// Each key is deduplicated against the cache and the open batch exactly
    /// as [`load_thunk`](Self::load_thunk) would, including duplicates
    /// within `keys` itself: a duplicate shares the first occurrence's thunk
    /// and is fetched once.
    pub fn load_all_thunk(&self, keys: impl IntoIterator<Item = K>) -> ThunkAll<V> {
        let thunks = keys.into_iter().map(|key| self.load_thunk(key)).collect();
        ThunkAll::new(thunks)
    }

    /// Seeds the cache with a known value for `key`.
    ///
    /// A no-op if the key is already resolved or in flight, so priming never
    /// clobbers a fetch that is underway.
    pub fn prime(&self, key: K, value: V) {
        let mut state = self.inner.lock_state();
        state.cache.entry(key).or_insert_with(|| Thunk::resolved(value));
    }

    /// Evicts `key` from the cache, whether resolved or still in flight.
    ///
    /// An in-flight batch still fetches the key and resolves its existing
    /// waiters; the next [`load`](Self::load) for the key starts over as if
    /// it had never been requested.
    pub fn clear(&self, key: &K) {
        let mut state = self.inner.lock_state();
        state.cache.remove(key);
    }

    /// Arms the debounce timer for batch `id`.
    ///
    /// The deadline is fixed here, when the batch's first key arrives. If
    /// the capacity check dispatches the batch first, the timer finds a
    /// different (or no) open batch under `id` and does nothing.
    fn arm_window_timer(&self, id: u64) {
        let inner = self.inner.clone();
        let window = sleep(self.wait);
        let span = tracing::Span::current();

        tokio::spawn(
            async move {
                window.await;

                let batch = {
                    let mut state = inner.lock_state();
                    state.batch.take_if(|batch| batch.id() == id)
                };

                match batch {
                    Some(batch) => {
                        tracing::trace!(batch = id, "window elapsed");
                        dispatch(&inner.fetcher, batch).await;
                    }
                    None => tracing::trace!(batch = id, "window elapsed after batch closed"),
                }
            }
            .instrument(span),
        );
    }

    /// Dispatches a closed batch on its own task, so the caller that filled
    /// it is not blocked behind the fetch.
    fn spawn_dispatch(&self, batch: Batch<K, V>) {
        let inner = self.inner.clone();
        let span = tracing::Span::current();

        tokio::spawn(async move { dispatch(&inner.fetcher, batch).await }.instrument(span));
    }
}

impl<K, V, F> Clone for Loader<K, V, F> {
    fn clone(&self) -> Loader<K, V, F> {
        Loader {
            inner: self.inner.clone(),
            wait: self.wait,
            capacity: self.capacity,
        }
    }
}

impl<K, V, F> fmt::Debug for Loader<K, V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<Self>();
        f.debug_struct(name)
            .field("wait", &self.wait)
            .field("capacity", &self.capacity)
            .finish()
    }
}
