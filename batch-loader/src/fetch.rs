//! The external fetch capability consumed by the loader.

use std::{collections::HashMap, fmt, future::Future, hash::Hash};

use async_trait::async_trait;

use crate::{error::ErrorMap, BoxError};

/// A batched fetch capability: keys in, values and errors out.
///
/// This is the only collaborator the [`Loader`](crate::Loader) depends on.
/// It must be safe to call repeatedly and concurrently for disjoint key
/// sets, because the loader may have several batches in flight at once. The
/// loader performs no retries; retry policy, if any, belongs inside the
/// fetch implementation.
#[async_trait]
pub trait Fetcher<K, V>: Send + Sync + 'static
where
    K: Send + Sync + Eq + Hash + Clone + 'static,
    V: Send + Sync + Clone + 'static,
{
    /// Fetches values for `keys`, which arrive deduplicated and in
    /// first-request order.
    ///
    /// Returning `Err` fails the whole batch: every key in it resolves to
    /// the same error. Returning `Ok` with per-key errors recorded in the
    /// [`Fetched`] set allows partial failure within one batch.
    async fn fetch(&self, keys: Vec<K>) -> Result<Fetched<K, V>, BoxError>;
}

/// The result set of one batch fetch: values by key, plus optional per-key
/// errors.
///
/// Every requested key must end up with a value or a per-key error,
/// otherwise the loader fails the whole batch with
/// [`KeyCountMismatch`](crate::KeyCountMismatch). A key that has both
/// resolves to its error.
#[derive(Debug)]
pub struct Fetched<K, V> {
    values: HashMap<K, V>,
    errors: ErrorMap<K>,
}

impl<K, V> Default for Fetched<K, V> {
    fn default() -> Fetched<K, V> {
        Fetched {
            values: HashMap::new(),
            errors: ErrorMap::default(),
        }
    }
}

impl<K: Eq + Hash, V> Fetched<K, V> {
    /// Creates an empty result set.
    pub fn new() -> Fetched<K, V> {
        Fetched::default()
    }

    /// Records the value for `key`.
    pub fn insert(&mut self, key: K, value: V) {
        self.values.insert(key, value);
    }

    /// Records a per-key error for `key`; other keys in the batch are
    /// unaffected.
    pub fn insert_error(&mut self, key: K, error: impl Into<BoxError>) {
        self.errors.insert(key, error);
    }

    /// Assembles a result set from separately collected values and errors.
    pub fn from_parts(values: HashMap<K, V>, errors: ErrorMap<K>) -> Fetched<K, V> {
        Fetched { values, errors }
    }

    pub(crate) fn into_parts(self) -> (HashMap<K, V>, ErrorMap<K>) {
        (self.values, self.errors)
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for Fetched<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Fetched<K, V> {
        Fetched {
            values: iter.into_iter().collect(),
            errors: ErrorMap::default(),
        }
    }
}

/// Returns a [`Fetcher`] implemented by the given async closure.
///
/// The batching analogue of `tower::service_fn`: handy when a full trait
/// implementation is more ceremony than the fetch logic deserves.
pub fn fetch_fn<F>(f: F) -> FetchFn<F> {
    FetchFn { f }
}

/// A [`Fetcher`] implemented by an async closure, created by [`fetch_fn`].
#[derive(Clone, Copy)]
pub struct FetchFn<F> {
    f: F,
}

impl<F> fmt::Debug for FetchFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<K, V, F, Fut> Fetcher<K, V> for FetchFn<F>
where
    K: Send + Sync + Eq + Hash + Clone + 'static,
    V: Send + Sync + Clone + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Fetched<K, V>, BoxError>> + Send + 'static,
{
    async fn fetch(&self, keys: Vec<K>) -> Result<Fetched<K, V>, BoxError> {
        (self.f)(keys).await
    }
}
