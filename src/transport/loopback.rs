//! In-process transports: echo loopback and cross-connected memory links.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use super::{BoxFuture, ByteInterface, CallbackRegistry, ReadCallback, ReadSubscription};

/// Echo transport: every write fans out synchronously to the writer's own
/// subscribers.
///
/// With a symmetric schema this lets a single endpoint answer itself, which
/// is all the round-trip tests need. Starts closed; call `open` first.
#[derive(Default)]
pub struct Loopback {
    open: AtomicBool,
    subscribers: CallbackRegistry,
}

impl Loopback {
    /// New, closed loopback.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl ByteInterface for Loopback {
    fn open(&self) -> bool {
        self.open.store(true, Ordering::Release);
        true
    }

    fn close(&self) -> bool {
        self.open.store(false, Ordering::Release);
        true
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn write<'a>(&'a self, bytes: &'a [u8], _timeout: Duration) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if !self.is_open() {
                tracing::warn!("write on a closed loopback");
                return false;
            }
            self.subscribers.deliver(bytes);
            true
        })
    }

    fn add_read_callback(&self, callback: Arc<ReadCallback>) -> ReadSubscription {
        self.subscribers.subscribe(callback)
    }
}

/// One end of a cross-connected in-memory duplex link.
///
/// Writes on one end are delivered synchronously to the subscribers of the
/// other, which is how two endpoints get wired back-to-back in tests:
///
/// ```ignore
/// let (a, b) = MemoryLink::pair();
/// client.bind(a);
/// server.bind(b);
/// ```
pub struct MemoryLink {
    open: AtomicBool,
    subscribers: CallbackRegistry,
    peer: Mutex<Weak<MemoryLink>>,
}

impl MemoryLink {
    /// Create two connected ends, both open.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let a = Arc::new(Self::new_end());
        let b = Arc::new(Self::new_end());
        *a.peer.lock().unwrap() = Arc::downgrade(&b);
        *b.peer.lock().unwrap() = Arc::downgrade(&a);
        (a, b)
    }

    fn new_end() -> Self {
        Self {
            open: AtomicBool::new(true),
            subscribers: CallbackRegistry::new(),
            peer: Mutex::new(Weak::new()),
        }
    }
}

impl ByteInterface for MemoryLink {
    fn open(&self) -> bool {
        self.open.store(true, Ordering::Release);
        true
    }

    fn close(&self) -> bool {
        self.open.store(false, Ordering::Release);
        true
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn write<'a>(&'a self, bytes: &'a [u8], _timeout: Duration) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if !self.is_open() {
                tracing::warn!("write on a closed memory link");
                return false;
            }
            let peer = self.peer.lock().unwrap().upgrade();
            match peer {
                Some(peer) if peer.is_open() => {
                    peer.subscribers.deliver(bytes);
                    true
                }
                _ => {
                    tracing::warn!("peer end of the memory link is gone or closed");
                    false
                }
            }
        })
    }

    fn add_read_callback(&self, callback: Arc<ReadCallback>) -> ReadSubscription {
        self.subscribers.subscribe(callback)
    }
}
