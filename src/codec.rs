//! Synchronous frame codec without transport or worker machinery.
//!
//! [`FrameCodec`] couples a [`TxBuilder`] and an [`RxParser`] behind a
//! buffer-level API: `encode` assembles a frame and hands back its wire
//! image, `decode` consumes received bytes and queues completed snapshots.
//! Nothing here spawns tasks or needs a runtime, which suits adapters that
//! serialize into caller-owned buffers and parse whatever a foreign I/O
//! layer hands them:
//!
//! ```ignore
//! let mut codec = FrameCodec::symmetric(schema);
//! let wire = codec.encode(&[TxValue::payload(&packet)])?;
//! peer_write(wire);
//!
//! codec.decode(&peer_read());
//! while let Some(frame) = codec.next_frame() {
//!     handle(frame);
//! }
//! ```
//!
//! When an immediate callback is preferred over polling, install one with
//! [`on_frame`](FrameCodec::on_frame); it then runs synchronously inside
//! `decode` instead of the queue. The queue is bounded like the endpoint's
//! FIFO: the oldest snapshot is dropped on overflow.

use std::collections::VecDeque;

use crate::crc::{Crc, SoftCrc32};
use crate::error::Result;
use crate::rx::RxParser;
use crate::schema::Schema;
use crate::snapshot::Snapshot;
use crate::tx::{TxBuilder, TxValue};

/// Default capacity of the decoded-frame queue.
pub const DEFAULT_PENDING_CAPACITY: usize = 100;

/// Runtime-free RX/TX pairing for buffer-level use.
pub struct FrameCodec {
    rx: RxParser,
    tx: TxBuilder,
    pending: VecDeque<Snapshot>,
    capacity: usize,
    dropped: u64,
    callback: Option<Box<dyn FnMut(Snapshot) + Send>>,
}

impl FrameCodec {
    /// Codec with separate RX and TX schemas, checksummed by `crc` (called
    /// once per direction).
    pub fn new<F>(rx_schema: Schema, tx_schema: Schema, crc: F) -> Self
    where
        F: Fn() -> Box<dyn Crc>,
    {
        Self {
            rx: RxParser::new(rx_schema, crc()),
            tx: TxBuilder::new(tx_schema, crc()),
            pending: VecDeque::new(),
            capacity: DEFAULT_PENDING_CAPACITY,
            dropped: 0,
            callback: None,
        }
    }

    /// Codec for a symmetric protocol with the default CRC-32.
    pub fn symmetric(schema: Schema) -> Self {
        Self::new(schema.clone(), schema, || Box::new(SoftCrc32::new()))
    }

    /// Cap the decoded-frame queue (default 100).
    pub fn pending_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Assemble a frame from `values` and return its wire image.
    ///
    /// The slice stays valid until the next `encode`.
    pub fn encode(&mut self, values: &[TxValue<'_>]) -> Result<&[u8]> {
        self.tx.build(values)?;
        Ok(self.tx.frame())
    }

    /// Consume received bytes; completed frames go to the installed
    /// callback or the pending queue.
    pub fn decode(&mut self, bytes: &[u8]) {
        for snapshot in self.rx.feed(bytes) {
            if let Some(callback) = self.callback.as_mut() {
                callback(snapshot);
                continue;
            }
            self.pending.push_back(snapshot);
            if self.pending.len() > self.capacity {
                self.pending.pop_front();
                self.dropped += 1;
                tracing::warn!(dropped = self.dropped, "pending frames full, oldest dropped");
            }
        }
    }

    /// Oldest decoded frame still queued, if any.
    pub fn next_frame(&mut self) -> Option<Snapshot> {
        self.pending.pop_front()
    }

    /// Deliver decoded frames synchronously from `decode` instead of
    /// queueing them.
    pub fn on_frame<F>(&mut self, callback: F)
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Frames waiting in the queue.
    pub fn queued_frames(&self) -> usize {
        self.pending.len()
    }

    /// Frames lost to queue overflow.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Discard any partially received frame.
    pub fn reset_rx(&mut self) {
        self.rx.reset();
    }

    /// The RX side, for custom matcher state or diagnostics.
    pub fn rx(&self) -> &RxParser {
        &self.rx
    }

    /// The TX side, for the last built frame's layout.
    pub fn tx(&self) -> &TxBuilder {
        &self.tx
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("queued", &self.pending.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}
