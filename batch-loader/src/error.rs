//! Error types for the batching loader.

use std::{collections::HashMap, fmt, hash::Hash, sync::Arc};

use crate::BoxError;

/// A cloneable error produced while resolving a batch.
///
/// A single fetch failure has to reach every caller waiting on the same
/// batch, so the underlying error is kept behind an [`Arc`] and cloned
/// handles all point at the same source.
#[derive(Debug, Clone)]
pub struct SharedError {
    inner: Arc<BoxError>,
}

impl SharedError {
    pub(crate) fn new(error: BoxError) -> SharedError {
        SharedError {
            inner: Arc::new(error),
        }
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch fetch failed: {}", self.inner)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&**self.inner)
    }
}

/// An error produced when a batch is dropped before its keys resolve.
///
/// Waiters see this instead of blocking forever when the task driving a
/// fetch aborts abnormally, for example because the fetch future panicked.
#[derive(Debug, Default)]
pub struct Closed {
    _p: (),
}

impl Closed {
    pub(crate) fn new() -> Closed {
        Closed { _p: () }
    }
}

impl fmt::Display for Closed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("batch was dropped before completing")
    }
}

impl std::error::Error for Closed {}

/// The fetch function resolved fewer keys than it was given.
///
/// A short response cannot be trusted to preserve the key/result
/// correspondence, so the whole batch is failed instead of guessing which
/// keys were dropped.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("batch fetch resolved {resolved} of {requested} keys")]
pub struct KeyCountMismatch {
    /// Number of keys sent to the fetch function.
    pub requested: usize,
    /// Number of keys that came back with a value or a per-key error.
    pub resolved: usize,
}

/// Sparse per-key errors returned alongside the values of one fetch.
///
/// A key that is absent from the map has no error; an empty map means no key
/// failed. This is distinct from a whole-batch error, which fails every key
/// in the batch (see [`Fetcher::fetch`](crate::Fetcher::fetch)).
#[derive(Debug)]
pub struct ErrorMap<K> {
    errors: HashMap<K, BoxError>,
}

impl<K> Default for ErrorMap<K> {
    fn default() -> ErrorMap<K> {
        ErrorMap {
            errors: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> ErrorMap<K> {
    /// Creates an empty error map.
    pub fn new() -> ErrorMap<K> {
        ErrorMap::default()
    }

    /// Records an error for `key`, replacing any previous entry.
    pub fn insert(&mut self, key: K, error: impl Into<BoxError>) {
        self.errors.insert(key, error.into());
    }

    /// Returns the error recorded for `key`, if any.
    pub fn get(&self, key: &K) -> Option<&BoxError> {
        self.errors.get(key)
    }

    /// Returns true if no key has an error.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The number of keys with a recorded error.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<BoxError> {
        self.errors.remove(key)
    }
}

impl<K: Eq + Hash, E: Into<BoxError>> FromIterator<(K, E)> for ErrorMap<K> {
    fn from_iter<I: IntoIterator<Item = (K, E)>>(iter: I) -> ErrorMap<K> {
        ErrorMap {
            errors: iter
                .into_iter()
                .map(|(key, error)| (key, error.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_error_display_includes_source() {
        let error = SharedError::new("underlying failure".into());
        assert_eq!(error.to_string(), "batch fetch failed: underlying failure");

        let source = std::error::Error::source(&error).expect("shared error has a source");
        assert_eq!(source.to_string(), "underlying failure");
    }

    #[test]
    fn mismatch_names_both_counts() {
        let mismatch = KeyCountMismatch {
            requested: 10,
            resolved: 9,
        };
        assert_eq!(mismatch.to_string(), "batch fetch resolved 9 of 10 keys");
    }

    #[test]
    fn error_map_distinguishes_missing_keys() {
        let mut errors = ErrorMap::new();
        assert!(errors.is_empty());

        errors.insert("1", "no such user");
        assert_eq!(errors.len(), 1);
        assert!(errors.get(&"1").is_some());
        assert!(errors.get(&"2").is_none());
    }
}
