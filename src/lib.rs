//! # fieldwire
//!
//! Declaratively-configured binary frame codec for fixed-layout
//! request/response protocols over byte streams (UART, TCP, loopback).
//!
//! A protocol is described as an ordered list of typed fields (identifier
//! prefix, length, anti-length, type tag, payload, CRC, custom fields) and
//! the crate derives everything else:
//!
//! - **[`RxParser`]**: a stateful incremental parser that consumes
//!   arbitrary-sized chunks, locates frame boundaries, validates
//!   structural fields, resynchronizes byte-by-byte after corruption, and
//!   produces owned [`Snapshot`]s of completed frames.
//! - **[`TxBuilder`]**: a frame builder that computes derived fields
//!   (length, anti-length, CRC), selects the payload alternative by type
//!   id, and emits the frame field by field.
//! - **[`Endpoint`]**: RX + TX coupled to a [`ByteInterface`], with a
//!   synchronous `request → snapshot | timeout` primitive and an
//!   asynchronous callback delivery path behind a bounded FIFO.
//! - **[`FrameCodec`]**: the same RX/TX pairing without transport or
//!   worker machinery, for buffer-level serialize/parse adapters.
//!
//! ## Example
//!
//! ```ignore
//! use fieldwire::{flags, Endpoint, FieldName, FieldSpec, Schema, TxValue};
//!
//! let schema = Schema::builder()
//!     .field(FieldSpec::constant(FieldName::Id, &[0xAA, 0xBB, 0xCC]))
//!     .field(FieldSpec::uint(FieldName::Len, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
//!     .field(FieldSpec::uint(FieldName::Alen, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
//!     .field(FieldSpec::blob(FieldName::Data, 19).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
//!     .field(FieldSpec::uint(FieldName::Crc, 2).flags(flags::IS_IN_LEN))
//!     .build()?;
//!
//! let endpoint = Endpoint::builder().schema(schema).build()?;
//! endpoint.bind(uart);
//! let reply = endpoint.request(&[TxValue::payload(&packet)]).await;
//! ```
//!
//! Schemas are fixed per endpoint; there is no runtime negotiation, no
//! fragmentation above the frame layer, and no flow control. Those belong
//! to the layers around this crate.

pub mod codec;
pub mod container;
pub mod crc;
pub mod endpoint;
pub mod error;
pub mod rx;
pub mod schema;
pub mod snapshot;
pub mod transport;
pub mod tx;

pub use codec::FrameCodec;
pub use container::FieldContainer;
pub use crc::{Crc, SoftCrc32};
pub use endpoint::{Endpoint, EndpointBuilder};
pub use error::{FieldwireError, Result};
pub use rx::RxParser;
pub use schema::{
    flags, FieldKind, FieldName, FieldSize, FieldSpec, MatchStatus, PayloadMap, PayloadShape,
    Schema,
};
pub use snapshot::{FieldValue, PayloadValue, Snapshot};
pub use transport::{ByteInterface, Loopback, MemoryLink, ReadSubscription};
pub use tx::{TxBuilder, TxValue};
