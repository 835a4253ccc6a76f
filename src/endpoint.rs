//! Protocol endpoint: RX + TX + transport + delivery machinery.
//!
//! An [`Endpoint`] couples one RX schema and one TX schema to a
//! [`ByteInterface`] and offers the two delivery paths of the codec:
//!
//! - **Inline request/response**: [`request`](Endpoint::request) arms a
//!   one-shot inflight slot *before* transmitting, waits up to the receive
//!   timeout, and returns the captured snapshot (or the empty default on
//!   timeout).
//! - **Queued callbacks**: completed frames that no request is waiting for
//!   go into a bounded FIFO; a worker task drains it into the callback
//!   installed with [`on_receive`](Endpoint::on_receive). On overflow the
//!   oldest snapshot is dropped and counted.
//!
//! Every completed frame lands in exactly one of the two paths. The RX
//! parser only ever runs on the transport's delivery context; the TX
//! builder only under the send lock; the FIFO and the inflight slot are
//! the only state shared between them.
//!
//! # Example
//!
//! ```ignore
//! let endpoint = Endpoint::builder().schema(schema).build()?;
//! let link = Loopback::new();
//! link.open();
//! endpoint.bind(link);
//!
//! let reply = endpoint.request(&[TxValue::payload(&ping)]).await;
//! if reply.is_empty() {
//!     // timed out
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use crate::crc::{Crc, SoftCrc32};
use crate::error::{FieldwireError, Result};
use crate::rx::RxParser;
use crate::schema::Schema;
use crate::snapshot::Snapshot;
use crate::transport::{ByteInterface, ReadCallback, ReadSubscription};
use crate::tx::{TxBuilder, TxValue};

/// Default wait for a response in [`Endpoint::request`].
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on transport writes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default capacity of the snapshot FIFO.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// User callback draining the snapshot FIFO.
pub type ReceiveCallback = Box<dyn FnMut(Snapshot) + Send>;

/// State shared between the transport delivery context, the worker task
/// and `request` callers.
struct Shared {
    inflight: Mutex<Option<oneshot::Sender<Snapshot>>>,
    queue: Mutex<VecDeque<Snapshot>>,
    callback: Mutex<Option<ReceiveCallback>>,
    notify: Notify,
    running: AtomicBool,
    dropped: AtomicU64,
    capacity: usize,
}

impl Shared {
    /// Route a completed frame: the armed inflight slot wins, everything
    /// else is queued (dropping the oldest on overflow).
    fn route(&self, snapshot: Snapshot) {
        let slot = self.inflight.lock().unwrap().take();
        if let Some(slot) = slot {
            // A lost send means the requester already timed out; its
            // response is discarded rather than misdelivered to the FIFO.
            let _ = slot.send(snapshot);
            return;
        }

        let mut queue = self.queue.lock().unwrap();
        queue.push_back(snapshot);
        if queue.len() > self.capacity {
            queue.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(dropped, "receive queue full, oldest frame dropped");
        }
        drop(queue);
        self.notify.notify_one();
    }
}

/// Builder for [`Endpoint`].
pub struct EndpointBuilder {
    rx_schema: Option<Schema>,
    tx_schema: Option<Schema>,
    crc: Box<dyn Fn() -> Box<dyn Crc> + Send>,
    receive_timeout: Duration,
    write_timeout: Duration,
    queue_capacity: usize,
}

impl EndpointBuilder {
    fn new() -> Self {
        Self {
            rx_schema: None,
            tx_schema: None,
            crc: Box::new(|| Box::new(SoftCrc32::new())),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Use `schema` for both directions (symmetric protocol).
    pub fn schema(self, schema: Schema) -> Self {
        self.rx_schema(schema.clone()).tx_schema(schema)
    }

    /// Schema for inbound frames.
    pub fn rx_schema(mut self, schema: Schema) -> Self {
        self.rx_schema = Some(schema);
        self
    }

    /// Schema for outbound frames.
    pub fn tx_schema(mut self, schema: Schema) -> Self {
        self.tx_schema = Some(schema);
        self
    }

    /// CRC factory; called once per direction. Defaults to [`SoftCrc32`].
    pub fn crc_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Crc> + Send + 'static,
    {
        self.crc = Box::new(factory);
        self
    }

    /// How long [`Endpoint::request`] waits for a response.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Bound on each transport write.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Capacity of the snapshot FIFO (default 100).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Build the endpoint and spawn its worker task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Endpoint> {
        let rx_schema = self
            .rx_schema
            .ok_or_else(|| FieldwireError::Schema("endpoint needs an RX schema".into()))?;
        let tx_schema = self
            .tx_schema
            .ok_or_else(|| FieldwireError::Schema("endpoint needs a TX schema".into()))?;

        let shared = Arc::new(Shared {
            inflight: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            callback: Mutex::new(None),
            notify: Notify::new(),
            running: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
            capacity: self.queue_capacity,
        });
        let worker = tokio::spawn(worker_loop(Arc::clone(&shared)));

        Ok(Endpoint {
            rx: Arc::new(Mutex::new(RxParser::new(rx_schema, (self.crc)()))),
            tx: Mutex::new(TxBuilder::new(tx_schema, (self.crc)())),
            shared,
            write_iface: Mutex::new(None),
            rx_subscription: Mutex::new(None),
            worker: Mutex::new(Some(worker)),
            receive_timeout: self.receive_timeout,
            write_timeout: self.write_timeout,
        })
    }
}

/// Drain the FIFO into the user callback; park between bursts.
async fn worker_loop(shared: Arc<Shared>) {
    loop {
        let notified = shared.notify.notified();
        loop {
            let mut callback = shared.callback.lock().unwrap();
            let Some(callback) = callback.as_mut() else {
                // No consumer yet: snapshots stay queued (and age out on
                // overflow) until one is installed.
                break;
            };
            let Some(snapshot) = shared.queue.lock().unwrap().pop_front() else {
                break;
            };
            callback(snapshot);
        }
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        notified.await;
    }
}

/// A running protocol endpoint.
pub struct Endpoint {
    rx: Arc<Mutex<RxParser>>,
    tx: Mutex<TxBuilder>,
    shared: Arc<Shared>,
    write_iface: Mutex<Option<Arc<dyn ByteInterface>>>,
    rx_subscription: Mutex<Option<ReadSubscription>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    receive_timeout: Duration,
    write_timeout: Duration,
}

impl Endpoint {
    /// Start configuring an endpoint.
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::new()
    }

    /// Wire the endpoint to separate read and write interfaces.
    ///
    /// Subscribes the RX parser to `read_iface` and uses `write_iface` as
    /// the TX sink. Replaces any previous binding.
    pub fn bind_transport(
        &self,
        read_iface: Arc<dyn ByteInterface>,
        write_iface: Arc<dyn ByteInterface>,
    ) {
        let parser = Arc::clone(&self.rx);
        let shared = Arc::clone(&self.shared);
        let callback: Arc<ReadCallback> = Arc::new(move |bytes: &[u8], consumed: &mut usize| {
            let snapshots = parser.lock().unwrap().feed(bytes);
            *consumed += bytes.len();
            for snapshot in snapshots {
                shared.route(snapshot);
            }
        });

        *self.rx_subscription.lock().unwrap() = Some(read_iface.add_read_callback(callback));
        *self.write_iface.lock().unwrap() = Some(write_iface);
    }

    /// Wire both directions to the same full-duplex interface.
    pub fn bind(&self, iface: Arc<dyn ByteInterface>) {
        self.bind_transport(Arc::clone(&iface), iface);
    }

    /// Build a frame from `values` and emit it field by field.
    ///
    /// Returns the number of bytes written. Fails without touching the
    /// transport when the frame cannot be built, and on the first refused
    /// write otherwise (TX state is not rewound; just send again).
    pub async fn send(&self, values: &[TxValue<'_>]) -> Result<usize> {
        let iface = self
            .write_iface
            .lock()
            .unwrap()
            .clone()
            .ok_or(FieldwireError::TransportUnset)?;

        // Copy the frame out so the builder lock is not held across writes.
        let (frame, spans, total) = {
            let mut tx = self.tx.lock().unwrap();
            let total = tx.build(values)?;
            (Bytes::copy_from_slice(tx.frame()), tx.field_spans(), total)
        };

        for span in spans {
            if !iface.write(&frame[span], self.write_timeout).await {
                return Err(FieldwireError::WriteFailed);
            }
        }
        Ok(total)
    }

    /// Send a frame and wait for the next completed inbound frame.
    ///
    /// The inflight slot is armed before the transmit, so a response
    /// arriving synchronously (loopback) is still captured. Returns the
    /// empty default snapshot on timeout or send failure; check
    /// [`Snapshot::is_empty`].
    pub async fn request(&self, values: &[TxValue<'_>]) -> Snapshot {
        let (slot, pending) = oneshot::channel();
        *self.shared.inflight.lock().unwrap() = Some(slot);

        if let Err(error) = self.send(values).await {
            tracing::debug!(%error, "request transmit failed");
            self.shared.inflight.lock().unwrap().take();
            return Snapshot::default();
        }

        match tokio::time::timeout(self.receive_timeout, pending).await {
            Ok(Ok(snapshot)) => snapshot,
            _ => {
                self.shared.inflight.lock().unwrap().take();
                Snapshot::default()
            }
        }
    }

    /// Install the callback that consumes queued snapshots.
    ///
    /// The callback runs on the worker task, never concurrently with
    /// itself. Frames queued before installation are delivered in order.
    pub fn on_receive<F>(&self, callback: F)
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        *self.shared.callback.lock().unwrap() = Some(Box::new(callback));
        self.shared.notify.notify_one();
    }

    /// Snapshots currently waiting in the FIFO.
    pub fn queued_frames(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Frames lost to FIFO overflow since construction.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Discard any partially received frame.
    pub fn reset_rx(&self) {
        self.rx.lock().unwrap().reset();
    }

    /// Stop the worker and wait for it to finish its current callback.
    pub async fn close(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.notify.notify_waiters();
        self.shared.notify.notify_one();
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.notify.notify_waiters();
        if let Some(worker) = self.worker.lock().unwrap().take() {
            worker.abort();
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("queued", &self.queued_frames())
            .field("dropped", &self.dropped_frames())
            .finish()
    }
}
