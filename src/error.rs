//! Error types for fieldwire.

use thiserror::Error;

use crate::schema::FieldName;

/// Main error type for all fieldwire operations.
#[derive(Debug, Error)]
pub enum FieldwireError {
    /// Schema could not be assembled (invalid field combination).
    ///
    /// Raised at construction time only; a built [`Schema`](crate::Schema)
    /// is guaranteed internally consistent.
    #[error("schema error: {0}")]
    Schema(String),

    /// A value was supplied for a field the schema does not declare.
    #[error("unknown field: {0}")]
    UnknownField(FieldName),

    /// A payload type-id with no entry in the payload map.
    #[error("unknown payload type id: {0}")]
    UnknownTypeId(u64),

    /// A supplied or derived field size exceeds the field's cap.
    #[error("field {name} size {size} exceeds limit {max}")]
    Oversize {
        /// Field whose size overflowed.
        name: FieldName,
        /// Requested byte length.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A supplied value's byte length disagrees with the field's fixed size.
    #[error("field {name} expects {expected} bytes, got {got}")]
    SizeMismatch {
        /// Field being written.
        name: FieldName,
        /// Size the schema requires.
        expected: usize,
        /// Size the caller supplied.
        got: usize,
    },

    /// A supplied value's kind does not fit the field (e.g. an integer for
    /// a byte region, or any value for a constant field).
    #[error("field {0} cannot take a value of that kind")]
    ValueKind(FieldName),

    /// The payload alternative could not be determined: supply a TYPE
    /// value or a payload whose length matches a declared shape.
    #[error("payload alternative could not be determined")]
    PayloadUnselected,

    /// `send`/`request` called before a transport was bound.
    #[error("transport is not bound")]
    TransportUnset,

    /// The transport refused the write (closed or timed out).
    #[error("transport write failed")]
    WriteFailed,

    /// The endpoint worker has been shut down.
    #[error("endpoint is closed")]
    Closed,
}

/// Result type alias using FieldwireError.
pub type Result<T> = std::result::Result<T, FieldwireError>;
