//! A batching, memoizing key/value loader.
//!
//! This crate solves the "N+1 request" problem: a caller issues many
//! individual key-based lookups in quick succession, and a naive
//! implementation turns each of them into one expensive backend call. The
//! [`Loader`] transparently collects the individual requests that arrive
//! within a short time window (or until a size threshold is reached), merges
//! them into a single call to a user-supplied [`Fetcher`], and hands the
//! results (or errors) back to each original caller exactly once. Results
//! are also memoized per key, so repeated requests for the same key within
//! the loader's lifetime never trigger additional fetches.
//!
//! ## Batching model
//!
//! The first key requested while no batch is open starts a new batch and
//! arms its debounce timer. The window is fixed, not sliding: it is measured
//! from the first key, and later keys do not extend it. A batch closes
//! either when the timer elapses or, if a batch capacity is configured, as
//! soon as that many keys have accumulated. Closing detaches the batch from
//! the loader before the fetch runs, so new requests immediately begin
//! filling a fresh batch; several fetches may be in flight concurrently,
//! each over a disjoint key set.
//!
//! Keys reach the fetch function deduplicated and in first-request order.
//! Callers that request a key already in flight share the pending
//! [`Thunk`] rather than adding the key again.
//!
//! ## Error fan-out
//!
//! A fetch can fail an entire batch (a plain error) or individual keys (an
//! [`ErrorMap`]). Either way, the failure is wrapped in a cloneable
//! [`SharedError`] and handed to every waiter it applies to. A fetch
//! response that leaves some requested key without a value or a per-key
//! error fails the whole batch with [`KeyCountMismatch`], because a short
//! response cannot be trusted to preserve the key/result correspondence.
//!
//! ## Example
//!
//! ```
//! use batch_loader::{fetch_fn, BoxError, Fetched, Loader};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let loader = Loader::new(fetch_fn(|keys: Vec<String>| async move {
//!     // One round trip for the whole batch.
//!     let fetched: Fetched<String, String> =
//!         keys.into_iter().map(|key| (key.clone(), key)).collect();
//!     Ok::<_, BoxError>(fetched)
//! }));
//!
//! let value = loader.load("1".to_string()).await.unwrap();
//! assert_eq!(value, "1");
//! # }
//! ```

#![warn(missing_docs)]
#![deny(clippy::await_holding_lock)]
#![forbid(unsafe_code)]

mod batch;
mod error;
mod fetch;
mod loader;
mod thunk;

/// A boxed [`std::error::Error`], used where fetch functions report opaque
/// failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use self::error::{Closed, ErrorMap, KeyCountMismatch, SharedError};
pub use self::fetch::{fetch_fn, FetchFn, Fetched, Fetcher};
pub use self::loader::Loader;
pub use self::thunk::{Thunk, ThunkAll};
