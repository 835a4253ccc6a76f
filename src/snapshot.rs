//! Value-type records of completed frames.
//!
//! A [`Snapshot`] is produced when the RX parser finishes a frame and is
//! what `request` returns and `on_receive` callbacks consume. It owns its
//! data (payloads as [`Bytes`]) and carries no references into the parser,
//! so it can cross threads and outlive the frame buffer freely.

use bytes::Bytes;

use crate::schema::FieldName;

/// Value of a single field inside a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Scalar integer field (width per the schema).
    Uint(u64),
    /// Byte-region field in natural (value) byte order.
    Bytes(Bytes),
    /// Variadic payload field.
    Payload(PayloadValue),
}

/// Tagged union over a variadic payload's alternatives.
///
/// The tag is the protocol type-id, not a positional index, so duplicate
/// shapes in the payload map stay distinguishable to consumers.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PayloadValue {
    /// No alternative was selected (unset payload).
    #[default]
    None,
    /// Fixed-size struct alternative; bytes in natural order.
    Struct {
        /// Selected type-id.
        id: u64,
        /// The struct's packed bytes.
        bytes: Bytes,
    },
    /// Variable-length alternative.
    Bytes {
        /// Selected type-id.
        id: u64,
        /// The payload run.
        bytes: Bytes,
    },
    /// Empty-marker alternative: a type-id with no bytes.
    Empty {
        /// Selected type-id.
        id: u64,
    },
}

impl PayloadValue {
    /// Selected type-id, if any alternative is set.
    pub fn id(&self) -> Option<u64> {
        match self {
            PayloadValue::None => None,
            PayloadValue::Struct { id, .. }
            | PayloadValue::Bytes { id, .. }
            | PayloadValue::Empty { id } => Some(*id),
        }
    }

    /// Payload bytes; empty for `None` and `Empty`.
    pub fn bytes(&self) -> &[u8] {
        match self {
            PayloadValue::Struct { bytes, .. } | PayloadValue::Bytes { bytes, .. } => bytes,
            PayloadValue::None | PayloadValue::Empty { .. } => &[],
        }
    }
}

/// One named entry per schema field, in frame order.
///
/// `Snapshot::default()` is the sentinel a timed-out `request` returns;
/// it has no entries, so [`is_empty`](Self::is_empty) distinguishes it
/// from any real frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    entries: Vec<(FieldName, FieldValue)>,
}

impl Snapshot {
    pub(crate) fn from_entries(entries: Vec<(FieldName, FieldValue)>) -> Self {
        Self { entries }
    }

    /// True for the default (timeout) sentinel.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in frame order.
    pub fn entries(&self) -> &[(FieldName, FieldValue)] {
        &self.entries
    }

    /// Value of the field named `name`.
    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Integer value of the field named `name`.
    pub fn uint(&self, name: FieldName) -> Option<u64> {
        match self.get(name)? {
            FieldValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Byte value of the field named `name` (natural order).
    pub fn bytes(&self, name: FieldName) -> Option<&Bytes> {
        match self.get(name)? {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The variadic payload value, when the schema has one.
    pub fn payload(&self) -> Option<&PayloadValue> {
        match self.get(FieldName::Data)? {
            FieldValue::Payload(p) => Some(p),
            _ => None,
        }
    }
}
