//! Deferred result handles for keys resolved by a batch.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    future::{join_all, JoinAll, Shared},
    ready, FutureExt,
};
use pin_project::pin_project;
use tokio::sync::oneshot;

use crate::error::{Closed, SharedError};

/// The result fanned out to the waiters of one key.
pub(crate) type KeyResult<V> = Result<V, SharedError>;

/// Sending half of a key's result slot, held by the owning batch until
/// dispatch resolves it.
pub(crate) type Slot<V> = oneshot::Sender<KeyResult<V>>;

/// Receiving half of a key's result slot.
///
/// A dropped sender is mapped into [`Closed`], so waiters are failed rather
/// than parked forever if the task driving the fetch goes away.
#[pin_project]
#[derive(Debug)]
struct SlotFuture<V> {
    #[pin]
    rx: oneshot::Receiver<KeyResult<V>>,
}

impl<V> Future for SlotFuture<V> {
    type Output = KeyResult<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.project().rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_dropped) => Poll::Ready(Err(SharedError::new(Closed::new().into()))),
        }
    }
}

/// A deferred handle to one key's eventual value or error.
///
/// Returned by [`Loader::load_thunk`](crate::Loader::load_thunk) before the
/// owning batch has dispatched. Awaiting a `Thunk` blocks the task until the
/// batch resolves; this is the only blocking point in the loader.
///
/// Thunks are cheap to clone. Any number of clones may be awaited, from any
/// number of tasks, and all of them resolve to the same value or error
/// without re-triggering the fetch.
pub struct Thunk<V> {
    inner: Shared<SlotFuture<V>>,
}

impl<V: Clone> Thunk<V> {
    /// Creates a pending thunk and the slot that will resolve it.
    pub(crate) fn pending() -> (Thunk<V>, Slot<V>) {
        let (tx, rx) = oneshot::channel();
        let thunk = Thunk {
            inner: SlotFuture { rx }.shared(),
        };
        (thunk, tx)
    }

    /// Creates a thunk that is already resolved to `value`.
    pub(crate) fn resolved(value: V) -> Thunk<V> {
        let (thunk, slot) = Thunk::pending();
        // Cannot fail: the receiver is alive inside `thunk`.
        let _ = slot.send(Ok(value));
        thunk
    }
}

impl<V> Clone for Thunk<V> {
    fn clone(&self) -> Thunk<V> {
        Thunk {
            inner: self.inner.clone(),
        }
    }
}

impl<V> fmt::Debug for Thunk<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk").finish_non_exhaustive()
    }
}

impl<V: Clone> Future for Thunk<V> {
    type Output = KeyResult<V>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

/// A deferred handle to the values of an ordered sequence of keys.
///
/// Returned by [`Loader::load_all_thunk`](crate::Loader::load_all_thunk).
/// Resolves to one result per requested key, in request order; per-key
/// failures stay at their position and never collapse the rest. Like
/// [`Thunk`], clones share one underlying computation and may be awaited
/// concurrently.
pub struct ThunkAll<V: Clone> {
    inner: Shared<JoinAll<Thunk<V>>>,
}

impl<V: Clone> ThunkAll<V> {
    pub(crate) fn new(thunks: Vec<Thunk<V>>) -> ThunkAll<V> {
        ThunkAll {
            inner: join_all(thunks).shared(),
        }
    }
}

impl<V: Clone> Clone for ThunkAll<V> {
    fn clone(&self) -> ThunkAll<V> {
        ThunkAll {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone> fmt::Debug for ThunkAll<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThunkAll").finish_non_exhaustive()
    }
}

impl<V: Clone> Future for ThunkAll<V> {
    type Output = Vec<KeyResult<V>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}
