//! Frame schema: the declarative field model that drives RX and TX.
//!
//! A [`Schema`] is an ordered list of [`FieldSpec`]s assembled through
//! [`SchemaBuilder`]. Assembly validates every structural rule up front, so
//! a built schema can drive a parser or builder without further checks:
//!
//! ```
//! use fieldwire::schema::{flags, FieldName, FieldSpec, Schema};
//!
//! const PREFIX: &[u8] = &[0xAA, 0xBB, 0xCC];
//!
//! let schema = Schema::builder()
//!     .field(FieldSpec::constant(FieldName::Id, PREFIX))
//!     .field(FieldSpec::uint(FieldName::Len, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
//!     .field(FieldSpec::uint(FieldName::Alen, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
//!     .field(FieldSpec::blob(FieldName::Data, 19).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
//!     .field(FieldSpec::uint(FieldName::Crc, 2).flags(flags::IS_IN_LEN))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.len(), 5);
//! ```
//!
//! The same schema value can describe both directions of a symmetric
//! protocol; asymmetric protocols build one schema per direction.

mod payload;

pub use payload::{PayloadEntry, PayloadMap, PayloadShape};

use std::fmt;
use std::sync::Arc;

use crate::container::FieldContainer;
use crate::error::{FieldwireError, Result};

/// Field identifiers recognized by the built-in matchers, plus opaque
/// user-named tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    /// Frame identifier / sync prefix.
    Id,
    /// Payload length.
    Len,
    /// Anti-length (bitwise complement of `Len`).
    Alen,
    /// Payload type discriminator.
    Type,
    /// Payload data (plain region or variadic).
    Data,
    /// Frame checksum.
    Crc,
    /// Any other field; opaque to the built-in matchers.
    User(&'static str),
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldName::Id => f.write_str("ID"),
            FieldName::Len => f.write_str("LEN"),
            FieldName::Alen => f.write_str("ALEN"),
            FieldName::Type => f.write_str("TYPE"),
            FieldName::Data => f.write_str("DATA"),
            FieldName::Crc => f.write_str("CRC"),
            FieldName::User(tag) => f.write_str(tag),
        }
    }
}

/// Field property flags.
pub mod flags {
    /// No flags set.
    pub const NONE: u8 = 0;
    /// Field contributes to the `Len` sum.
    pub const IS_IN_LEN: u8 = 0b0000_0001;
    /// Field contributes to the CRC.
    pub const IS_IN_CRC: u8 = 0b0000_0010;
    /// Field bytes are reversed on the wire (big-endian for scalars).
    pub const REVERSE: u8 = 0b0000_0100;
    /// Field carries a constant value (set automatically at assembly).
    pub const HAS_CONST: u8 = 0b0000_1000;
    /// Field size is fixed at declaration (set automatically at assembly).
    pub const CONST_SIZE: u8 = 0b0001_0000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Status returned by matcher hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Field does not satisfy the matcher; the frame is discarded.
    NotMatch,
    /// Matcher needs more bytes before it can decide.
    Processing,
    /// Field accepted.
    Match,
}

/// Custom matcher hook.
///
/// Invoked with the container and the index of the field that just
/// completed (RX) or is being derived (TX). Overrides the built-in matcher
/// for the field it is attached to.
pub type MatcherFn = fn(&mut FieldContainer, usize) -> MatchStatus;

/// Declared byte length of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSize {
    /// Exactly this many bytes.
    Fixed(usize),
    /// Deduced at runtime (length field or payload selection).
    Dynamic,
}

/// Storage category of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Scalar unsigned integer of 1, 2, 4 or 8 bytes.
    Uint {
        /// Width in bytes.
        width: usize,
    },
    /// Opaque byte region: a packed struct (fixed) or a byte run (dynamic).
    Blob {
        /// Declared size.
        size: FieldSize,
    },
    /// Variadic payload chosen by type-id at runtime.
    Payload(PayloadMap),
}

/// Default cap for dynamic field sizes, in bytes.
pub const DEFAULT_MAX_SIZE: usize = 4096;

/// One field of a frame: immutable declaration attributes.
///
/// Runtime state (offset, current size, bytes read) lives in the container,
/// not here, so a spec can be shared between directions and endpoints.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub(crate) name: FieldName,
    pub(crate) kind: FieldKind,
    pub(crate) flags: u8,
    pub(crate) max_size: usize,
    pub(crate) constant: Option<Vec<u8>>,
    pub(crate) matcher: Option<MatcherFn>,
}

impl FieldSpec {
    fn new(name: FieldName, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            flags: flags::NONE,
            max_size: DEFAULT_MAX_SIZE,
            constant: None,
            matcher: None,
        }
    }

    /// Scalar unsigned integer field of `width` bytes (1, 2, 4 or 8).
    pub fn uint(name: FieldName, width: usize) -> Self {
        Self::new(name, FieldKind::Uint { width })
    }

    /// Fixed-size byte region (packed struct).
    pub fn blob(name: FieldName, size: usize) -> Self {
        Self::new(name, FieldKind::Blob { size: FieldSize::Fixed(size) })
    }

    /// Variable-length byte region, sized at runtime by the length field.
    pub fn dynamic(name: FieldName) -> Self {
        Self::new(name, FieldKind::Blob { size: FieldSize::Dynamic })
    }

    /// Variadic payload field; always named [`FieldName::Data`].
    pub fn payload(map: PayloadMap) -> Self {
        Self::new(FieldName::Data, FieldKind::Payload(map))
    }

    /// Fixed field that must equal `value` on RX and is written with it on TX.
    pub fn constant(name: FieldName, value: &[u8]) -> Self {
        let mut spec = Self::blob(name, value.len());
        spec.constant = Some(value.to_vec());
        spec
    }

    /// Replace the flag set.
    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Cap the runtime size of a dynamic field (default 4096).
    pub fn max_size(mut self, max: usize) -> Self {
        self.max_size = max;
        self
    }

    /// Attach an explicit matcher, overriding the built-in one.
    pub fn matcher(mut self, matcher: MatcherFn) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Field name tag.
    pub fn name(&self) -> FieldName {
        self.name
    }

    /// Whether the given flag is set on this field.
    pub fn has_flag(&self, flag: u8) -> bool {
        flags::has_flag(self.flags, flag)
    }

    /// Width in bytes when the field is a scalar integer.
    pub fn uint_width(&self) -> Option<usize> {
        match &self.kind {
            FieldKind::Uint { width } => Some(*width),
            _ => None,
        }
    }

    /// Size in bytes when it is known from the declaration alone.
    pub(crate) fn declared_size(&self) -> Option<usize> {
        match &self.kind {
            FieldKind::Uint { width } => Some(*width),
            FieldKind::Blob { size: FieldSize::Fixed(n) } => Some(*n),
            FieldKind::Blob { size: FieldSize::Dynamic } => None,
            FieldKind::Payload(_) => None,
        }
    }

    /// Largest number of bytes the field can occupy in a frame.
    pub(crate) fn max_footprint(&self) -> usize {
        match &self.kind {
            FieldKind::Uint { width } => *width,
            FieldKind::Blob { size: FieldSize::Fixed(n) } => *n,
            FieldKind::Blob { size: FieldSize::Dynamic } => self.max_size,
            FieldKind::Payload(map) => map.max_footprint(self.max_size),
        }
    }
}

/// Validated, immutable frame layout.
///
/// Built once via [`Schema::builder`], then shared (cheaply, behind an
/// `Arc`) by every parser, builder and endpoint that speaks the protocol.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Arc<Vec<FieldSpec>>,
    data_index: Option<usize>,
    max_frame: usize,
}

impl Schema {
    /// Start assembling a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder { fields: Vec::new() }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the schema declares no fields (never for a built schema).
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in frame order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Field at `index`.
    pub fn field(&self, index: usize) -> &FieldSpec {
        &self.fields[index]
    }

    /// Index of the first field named `name`.
    pub fn index_of(&self, name: FieldName) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Index of the `Data` field, if declared.
    pub fn data_index(&self) -> Option<usize> {
        self.data_index
    }

    /// Upper bound on the byte length of any frame of this schema.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame
    }

    /// The payload map of a variadic `Data` field, if declared.
    pub fn payload_map(&self) -> Option<&PayloadMap> {
        let idx = self.data_index?;
        match &self.fields[idx].kind {
            FieldKind::Payload(map) => Some(map),
            _ => None,
        }
    }
}

/// Mask covering `width` bytes worth of value bits.
pub(crate) fn width_mask(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

/// Fluent schema assembly; `build` runs the structural validation.
pub struct SchemaBuilder {
    fields: Vec<FieldSpec>,
}

impl SchemaBuilder {
    /// Append a field; frame order is declaration order.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Validate and freeze the schema.
    pub fn build(self) -> Result<Schema> {
        let mut fields = self.fields;
        if fields.is_empty() {
            return Err(schema_err("schema declares no fields"));
        }

        for i in 0..fields.len() {
            for j in (i + 1)..fields.len() {
                if fields[i].name == fields[j].name {
                    return Err(schema_err(format!(
                        "duplicate field name {}",
                        fields[i].name
                    )));
                }
            }
        }

        for field in &mut fields {
            validate_field(field)?;
            if field.constant.is_some() {
                field.flags |= flags::HAS_CONST;
            }
            if field.declared_size().is_some() {
                field.flags |= flags::CONST_SIZE;
            }
        }

        let data_index = fields.iter().position(|f| f.name == FieldName::Data);
        validate_dynamic_rules(&fields, data_index)?;
        validate_len_field(&fields)?;
        validate_type_field(&fields, data_index)?;
        if let Some(f) = fields.iter().find(|f| f.name == FieldName::Crc) {
            validate_crc_field(f)?;
        }

        let max_frame: usize = fields.iter().map(FieldSpec::max_footprint).sum();
        if max_frame == 0 {
            return Err(schema_err("schema encodes zero-length frames"));
        }

        Ok(Schema {
            fields: Arc::new(fields),
            data_index,
            max_frame,
        })
    }
}

fn schema_err(msg: impl Into<String>) -> FieldwireError {
    FieldwireError::Schema(msg.into())
}

fn validate_field(field: &FieldSpec) -> Result<()> {
    match &field.kind {
        FieldKind::Uint { width } => {
            if !matches!(width, 1 | 2 | 4 | 8) {
                return Err(schema_err(format!(
                    "field {}: integer width must be 1, 2, 4 or 8, got {width}",
                    field.name
                )));
            }
        }
        FieldKind::Blob { size } => {
            if matches!(size, FieldSize::Dynamic) && field.max_size == 0 {
                return Err(schema_err(format!(
                    "field {}: dynamic field needs a non-zero size cap",
                    field.name
                )));
            }
        }
        FieldKind::Payload(map) => {
            if field.name != FieldName::Data {
                return Err(schema_err(format!(
                    "field {}: variadic payload must be the DATA field",
                    field.name
                )));
            }
            if map.entries().is_empty() {
                return Err(schema_err("payload map declares no alternatives"));
            }
            for (i, entry) in map.entries().iter().enumerate() {
                if map.entries()[..i].iter().any(|e| e.id == entry.id) {
                    return Err(schema_err(format!(
                        "payload map declares id {} twice",
                        entry.id
                    )));
                }
                if let PayloadShape::Fixed(n) = entry.shape {
                    if n > field.max_size {
                        return Err(schema_err(format!(
                            "payload alternative {} is {n} bytes, above the {} byte cap",
                            entry.id, field.max_size
                        )));
                    }
                }
            }
        }
    }

    if let Some(konst) = &field.constant {
        match field.declared_size() {
            Some(size) if size == konst.len() => {}
            Some(size) => {
                return Err(schema_err(format!(
                    "field {}: constant is {} bytes but the field holds {size}",
                    field.name,
                    konst.len()
                )));
            }
            None => {
                return Err(schema_err(format!(
                    "field {}: constant value on a runtime-sized field",
                    field.name
                )));
            }
        }
    }

    Ok(())
}

fn validate_dynamic_rules(fields: &[FieldSpec], data_index: Option<usize>) -> Result<()> {
    for (idx, field) in fields.iter().enumerate() {
        if field.declared_size().is_some() {
            continue;
        }
        if Some(idx) != data_index {
            return Err(schema_err(format!(
                "field {}: only the DATA field may have a runtime size",
                field.name
            )));
        }
        // DATA must be sizable before the parser reaches it.
        let len_before = fields[..idx].iter().any(|f| f.name == FieldName::Len);
        let self_sized = match &field.kind {
            FieldKind::Payload(map) => {
                map.all_self_sized() && fields[..idx].iter().any(|f| f.name == FieldName::Type)
            }
            _ => false,
        };
        if !len_before && !self_sized {
            return Err(schema_err(
                "runtime-sized DATA needs a LEN field (or a TYPE field with \
                 fixed-size alternatives only) earlier in the frame",
            ));
        }
    }
    Ok(())
}

fn validate_len_field(fields: &[FieldSpec]) -> Result<()> {
    let len_field = fields.iter().find(|f| f.name == FieldName::Len);
    let alen_field = fields.iter().find(|f| f.name == FieldName::Alen);

    let len_width = match len_field {
        Some(f) => match f.uint_width() {
            Some(width) => width,
            None => return Err(schema_err("LEN field must be an integer")),
        },
        None => {
            if alen_field.is_some() {
                return Err(schema_err("ALEN field without a LEN field"));
            }
            return Ok(());
        }
    };

    if let Some(f) = alen_field {
        match f.uint_width() {
            Some(width) if width == len_width => {}
            Some(_) => return Err(schema_err("ALEN width must match LEN width")),
            None => return Err(schema_err("ALEN field must be an integer")),
        }
    }

    let max_sum: u64 = fields
        .iter()
        .filter(|f| f.has_flag(flags::IS_IN_LEN))
        .map(|f| f.max_footprint() as u64)
        .sum();
    if max_sum > width_mask(len_width) {
        return Err(schema_err(format!(
            "length sum can reach {max_sum}, above what a {len_width} byte LEN can encode"
        )));
    }
    Ok(())
}

fn validate_type_field(fields: &[FieldSpec], data_index: Option<usize>) -> Result<()> {
    let Some(type_field) = fields.iter().find(|f| f.name == FieldName::Type) else {
        return Ok(());
    };
    let Some(width) = type_field.uint_width() else {
        return Err(schema_err("TYPE field must be an integer"));
    };

    let Some(data_index) = data_index else {
        return Ok(());
    };
    if let FieldKind::Payload(map) = &fields[data_index].kind {
        let mask = width_mask(width);
        for entry in map.entries() {
            if entry.id > mask {
                return Err(schema_err(format!(
                    "payload id {} does not fit a {width} byte TYPE field",
                    entry.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_crc_field(field: &FieldSpec) -> Result<()> {
    match field.uint_width() {
        Some(width) if width <= 4 => Ok(()),
        Some(_) => Err(schema_err("CRC field wider than 4 bytes")),
        None => Err(schema_err("CRC field must be an integer")),
    }
}
