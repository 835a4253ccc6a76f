//! Byte transport abstraction.
//!
//! [`ByteInterface`] is the minimal surface the endpoint needs from a
//! transport: open/close, a timeout-bounded write, and subscribable read
//! delivery. Concrete drivers (serial ports, sockets) live outside this
//! crate; [`Loopback`](crate::transport::Loopback) and
//! [`MemoryLink`](crate::transport::MemoryLink) cover in-process wiring and
//! tests.
//!
//! Read callbacks are held by weak reference: subscribing returns a
//! [`ReadSubscription`] guard and dropping it deregisters the callback.
//! Expired subscribers are pruned on the next delivery.

mod loopback;

pub use loopback::{Loopback, MemoryLink};

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Boxed future used for trait-object async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read-delivery callback: `(bytes, consumed counter)`.
///
/// The callback adds the number of bytes it consumed to the counter; the
/// transport may use it to skip delivered bytes for remaining subscribers.
pub type ReadCallback = dyn Fn(&[u8], &mut usize) + Send + Sync;

/// Subscription guard returned by [`ByteInterface::add_read_callback`].
///
/// The transport only holds a weak reference; dropping this guard
/// deregisters the callback.
pub struct ReadSubscription {
    _token: Arc<ReadCallback>,
}

/// Minimal bidirectional byte transport.
///
/// There is no read-side backpressure contract: implementations deliver
/// what they have, and `write` blocks at most for `timeout`.
pub trait ByteInterface: Send + Sync {
    /// Bring the transport up. Returns `false` when that is impossible.
    fn open(&self) -> bool;

    /// Tear the transport down.
    fn close(&self) -> bool;

    /// Whether the transport currently accepts writes.
    fn is_open(&self) -> bool;

    /// Write a byte span, blocking up to `timeout`. Returns `false` on
    /// failure (closed, peer gone, timed out).
    fn write<'a>(&'a self, bytes: &'a [u8], timeout: Duration) -> BoxFuture<'a, bool>;

    /// Register a read callback; it stays live while the returned guard is.
    fn add_read_callback(&self, callback: Arc<ReadCallback>) -> ReadSubscription;
}

/// Weak-reference fan-out list shared by transport implementations.
#[derive(Default)]
pub struct CallbackRegistry {
    subscribers: Mutex<Vec<Weak<ReadCallback>>>,
}

impl CallbackRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `callback` weakly; the returned guard keeps it alive.
    pub fn subscribe(&self, callback: Arc<ReadCallback>) -> ReadSubscription {
        self.subscribers
            .lock()
            .unwrap()
            .push(Arc::downgrade(&callback));
        ReadSubscription { _token: callback }
    }

    /// Deliver `bytes` to every live subscriber, pruning expired ones.
    ///
    /// Each subscriber sees the span past what earlier subscribers
    /// reported consumed.
    pub fn deliver(&self, bytes: &[u8]) {
        // Callbacks may subscribe or write back into the same transport,
        // so they must not run under the lock.
        let live: Vec<Arc<ReadCallback>> = {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        let mut read = 0usize;
        for callback in live {
            let rest = &bytes[read.min(bytes.len())..];
            let mut consumed = 0usize;
            callback(rest, &mut consumed);
            read += consumed;
        }
    }

    /// Number of live subscribers.
    pub fn live_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
