//! TX frame builder.
//!
//! [`TxBuilder`] assembles a frame from a sparse set of user-supplied
//! values. Everything the caller does not provide is derived: `Len`, `Alen`
//! and `Crc` through the TX mirror matchers, constants from the schema, the
//! `Type` tag from the payload alternative, and any remaining span is
//! zero-filled.
//!
//! ```ignore
//! let mut tx = TxBuilder::new(schema, Box::new(SoftCrc32::new()));
//! let written = tx.build(&[TxValue::payload(&packet_bytes)])?;
//! socket.write_all(tx.frame())?;
//! ```
//!
//! The builder owns its container; one `build` call completely overwrites
//! the previous frame. Builds are all-or-nothing: any size or selection
//! error fails the whole call and nothing is considered emitted.

use crate::container::FieldContainer;
use crate::crc::Crc;
use crate::error::{FieldwireError, Result};
use crate::schema::{
    flags, width_mask, FieldKind, FieldName, FieldSize, MatchStatus, PayloadShape, Schema,
};

/// One user-supplied field value for a build.
#[derive(Debug, Clone, Copy)]
pub enum TxValue<'a> {
    /// Integer value for a scalar field.
    Uint {
        /// Target field.
        name: FieldName,
        /// Value; truncated to the field width on write.
        value: u64,
    },
    /// Byte value (natural order) for a blob or payload field.
    Bytes {
        /// Target field.
        name: FieldName,
        /// Value bytes.
        value: &'a [u8],
    },
}

impl<'a> TxValue<'a> {
    /// Integer value for `name`.
    pub fn uint(name: FieldName, value: u64) -> Self {
        TxValue::Uint { name, value }
    }

    /// Byte value for `name`.
    pub fn bytes(name: FieldName, value: &'a [u8]) -> Self {
        TxValue::Bytes { name, value }
    }

    /// Payload bytes for the `Data` field.
    ///
    /// With a variadic `Data` and no explicit `Type` value, the alternative
    /// is inferred from the byte length and the `Type` field is synthesized.
    pub fn payload(value: &'a [u8]) -> Self {
        TxValue::Bytes {
            name: FieldName::Data,
            value,
        }
    }

    fn name(&self) -> FieldName {
        match self {
            TxValue::Uint { name, .. } | TxValue::Bytes { name, .. } => *name,
        }
    }
}

/// Frame builder for one TX direction.
pub struct TxBuilder {
    container: FieldContainer,
}

impl TxBuilder {
    /// Create a builder over `schema`, checksumming with `crc`.
    pub fn new(schema: Schema, crc: Box<dyn Crc>) -> Self {
        Self {
            container: FieldContainer::new(schema, crc),
        }
    }

    /// The schema this builder speaks.
    pub fn schema(&self) -> &Schema {
        self.container.schema()
    }

    /// Container access, mainly for custom matchers and diagnostics.
    pub fn container(&self) -> &FieldContainer {
        &self.container
    }

    /// Wire image of the most recently built frame.
    pub fn frame(&self) -> &[u8] {
        self.container.built_bytes()
    }

    /// Byte ranges of each field inside [`frame`](Self::frame), in schema
    /// order, for field-by-field emission.
    pub fn field_spans(&self) -> Vec<std::ops::Range<usize>> {
        (0..self.container.schema().len())
            .map(|idx| {
                let offset = self.container.state(idx).offset;
                let size = self.container.resolved_size(idx).unwrap_or(0);
                offset..offset + size
            })
            .collect()
    }

    /// Assemble a frame from the supplied values.
    ///
    /// Returns the total frame size in bytes. On error the builder state is
    /// undefined until the next `build`; nothing was emitted either way.
    pub fn build(&mut self, values: &[TxValue<'_>]) -> Result<usize> {
        self.container.reset();
        let schema = self.container.schema().clone();

        self.check_value_kinds(&schema, values)?;
        let synthesized_type = self.resolve_payload(&schema, values)?;
        self.apply_sizes(&schema, values)?;

        let mut total = 0usize;
        for idx in 0..schema.len() {
            let running = self.container.running;
            self.container.state_mut(idx).offset = running;
            if self.container.resolved_size(idx).is_none() {
                // Dynamic field never sized by a value: emit it empty.
                self.container.set_runtime_size(idx, 0)?;
            }
            let size = self.container.resolved_size(idx).unwrap_or(0);

            let field = schema.field(idx);
            if let Some(value) = values.iter().find(|v| v.name() == field.name()) {
                match value {
                    TxValue::Uint { value, .. } => self.container.set_uint_at(idx, *value),
                    TxValue::Bytes { value, .. } => self.container.write_value_bytes(idx, value),
                }
            } else if field.name() == FieldName::Type && synthesized_type.is_some() {
                self.container.set_uint_at(idx, synthesized_type.unwrap_or(0));
            } else if let Some(matcher) = field.matcher {
                matcher(&mut self.container, idx);
            } else {
                match field.name() {
                    FieldName::Len => {
                        self.calc_len(idx);
                    }
                    FieldName::Alen => {
                        self.set_alen(idx);
                    }
                    FieldName::Crc => {
                        self.set_crc(idx);
                    }
                    _ if field.has_flag(flags::HAS_CONST) => self.container.apply_constant(idx),
                    _ => self.zero_fill(idx, size),
                }
            }

            self.container.running += size;
            total += size;
        }
        Ok(total)
    }

    /// Reject values whose kind cannot land in the target field.
    fn check_value_kinds(&self, schema: &Schema, values: &[TxValue<'_>]) -> Result<()> {
        for value in values {
            let name = value.name();
            let idx = schema
                .index_of(name)
                .ok_or(FieldwireError::UnknownField(name))?;
            let field = schema.field(idx);
            if field.has_flag(flags::HAS_CONST) {
                return Err(FieldwireError::ValueKind(name));
            }
            let ok = match (&field.kind, value) {
                (FieldKind::Uint { .. }, TxValue::Uint { .. }) => true,
                (FieldKind::Blob { .. }, TxValue::Bytes { .. }) => true,
                (FieldKind::Payload(_), TxValue::Bytes { .. }) => true,
                _ => false,
            };
            if !ok {
                return Err(FieldwireError::ValueKind(name));
            }
        }
        Ok(())
    }

    /// Select the payload alternative and decide whether `Type` must be
    /// synthesized. Returns the synthesized type value, if any.
    fn resolve_payload(&mut self, schema: &Schema, values: &[TxValue<'_>]) -> Result<Option<u64>> {
        let Some(data_idx) = schema.data_index() else {
            return Ok(None);
        };
        let FieldKind::Payload(map) = &schema.field(data_idx).kind else {
            return Ok(None);
        };

        let explicit_type = values.iter().find_map(|v| match v {
            TxValue::Uint {
                name: FieldName::Type,
                value,
            } => Some(*value),
            _ => None,
        });
        let payload_bytes = values.iter().find_map(|v| match v {
            TxValue::Bytes {
                name: FieldName::Data,
                value,
            } => Some(*value),
            _ => None,
        });

        let (id, synthesized) = match (explicit_type, payload_bytes) {
            (Some(id), _) => (id, None),
            (None, Some(bytes)) => {
                let id = map
                    .infer_id(bytes.len())
                    .ok_or(FieldwireError::PayloadUnselected)?;
                (id, Some(id))
            }
            (None, None) => return Err(FieldwireError::PayloadUnselected),
        };

        let shape = self
            .container
            .select_payload(data_idx, id)
            .ok_or(FieldwireError::UnknownTypeId(id))?;

        let supplied_len = payload_bytes.map(<[u8]>::len);
        match shape {
            PayloadShape::Fixed(n) => {
                if let Some(len) = supplied_len {
                    if len != n {
                        return Err(FieldwireError::SizeMismatch {
                            name: FieldName::Data,
                            expected: n,
                            got: len,
                        });
                    }
                }
                self.container.set_runtime_size(data_idx, n)?;
            }
            PayloadShape::Empty => {
                if let Some(len) = supplied_len {
                    if len != 0 {
                        return Err(FieldwireError::SizeMismatch {
                            name: FieldName::Data,
                            expected: 0,
                            got: len,
                        });
                    }
                }
                self.container.set_runtime_size(data_idx, 0)?;
            }
            PayloadShape::Var => {
                self.container
                    .set_runtime_size(data_idx, supplied_len.unwrap_or(0))?;
            }
        }
        Ok(synthesized)
    }

    /// Fix runtime sizes from supplied byte values and validate fixed ones.
    fn apply_sizes(&mut self, schema: &Schema, values: &[TxValue<'_>]) -> Result<()> {
        for value in values {
            let TxValue::Bytes { name, value } = value else {
                continue;
            };
            let idx = schema
                .index_of(*name)
                .ok_or(FieldwireError::UnknownField(*name))?;
            match &schema.field(idx).kind {
                FieldKind::Blob {
                    size: FieldSize::Fixed(n),
                } => {
                    if value.len() != *n {
                        return Err(FieldwireError::SizeMismatch {
                            name: *name,
                            expected: *n,
                            got: value.len(),
                        });
                    }
                }
                FieldKind::Blob {
                    size: FieldSize::Dynamic,
                } => {
                    self.container.set_runtime_size(idx, value.len())?;
                }
                // Payload sizing happened in resolve_payload; integers are
                // fixed by width.
                _ => {}
            }
        }
        Ok(())
    }

    /// TX mirror of `set-data-len`: write the `IS_IN_LEN` size sum.
    fn calc_len(&mut self, len_idx: usize) -> MatchStatus {
        let sum = self.container.len_sum(None).unwrap_or(0);
        self.container.set_uint_at(len_idx, sum);
        MatchStatus::Match
    }

    /// TX mirror of `check-alen`: write `!LEN`, width-matched.
    fn set_alen(&mut self, alen_idx: usize) -> MatchStatus {
        let Some(width) = self.container.schema().field(alen_idx).uint_width() else {
            return MatchStatus::NotMatch;
        };
        let len = self.container.uint(FieldName::Len).unwrap_or(0);
        self.container.set_uint_at(alen_idx, !len & width_mask(width));
        MatchStatus::Match
    }

    /// TX mirror of `check-crc`: compute and write the checksum.
    fn set_crc(&mut self, crc_idx: usize) -> MatchStatus {
        let crc = self.container.crc_over_fields();
        self.container.set_uint_at(crc_idx, u64::from(crc));
        MatchStatus::Match
    }

    fn zero_fill(&mut self, idx: usize, size: usize) {
        let offset = self.container.state(idx).offset;
        self.container.buf_mut()[offset..offset + size].fill(0);
    }
}

impl std::fmt::Debug for TxBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxBuilder")
            .field("container", &self.container)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::SoftCrc32;
    use crate::rx::RxParser;
    use crate::schema::{FieldSpec, PayloadMap};
    use crate::snapshot::PayloadValue;

    const PREFIX: &[u8] = &[0xAA, 0xBB, 0xCC];

    fn sample_payload() -> Vec<u8> {
        let mut bytes = Vec::with_capacity(19);
        bytes.push(1u8);
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&4.0f32.to_le_bytes());
        bytes.extend_from_slice(&2.718281828459045f64.to_le_bytes());
        bytes
    }

    fn simple_schema() -> Schema {
        Schema::builder()
            .field(FieldSpec::constant(FieldName::Id, PREFIX))
            .field(FieldSpec::uint(FieldName::Len, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
            .field(FieldSpec::uint(FieldName::Alen, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
            .field(FieldSpec::blob(FieldName::Data, 19).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
            .field(FieldSpec::uint(FieldName::Crc, 2).flags(flags::IS_IN_LEN))
            .build()
            .unwrap()
    }

    fn complex_schema() -> Schema {
        let map = PayloadMap::new()
            .entry(1, PayloadShape::Fixed(19))
            .entry(2, PayloadShape::Fixed(1))
            .entry(3, PayloadShape::Fixed(18))
            .entry(4, PayloadShape::Empty)
            .entry(5, PayloadShape::Var);
        Schema::builder()
            .field(FieldSpec::constant(FieldName::Id, PREFIX))
            .field(FieldSpec::uint(FieldName::Len, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
            .field(FieldSpec::uint(FieldName::Alen, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
            .field(FieldSpec::uint(FieldName::Type, 1).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
            .field(FieldSpec::payload(map).max_size(200).flags(flags::IS_IN_LEN))
            .field(FieldSpec::uint(FieldName::Crc, 2).flags(flags::IS_IN_LEN | flags::REVERSE))
            .build()
            .unwrap()
    }

    fn builder(schema: Schema) -> TxBuilder {
        TxBuilder::new(schema, Box::new(SoftCrc32::new()))
    }

    #[test]
    fn test_simple_build_derives_everything() {
        let mut tx = builder(simple_schema());
        let data = sample_payload();
        let total = tx.build(&[TxValue::bytes(FieldName::Data, &data)]).unwrap();

        assert_eq!(total, 3 + 1 + 1 + 19 + 2);
        let frame = tx.frame();
        assert_eq!(&frame[..3], PREFIX);
        assert_eq!(frame[3], 23); // LEN = 1 + 1 + 19 + 2
        assert_eq!(frame[4], 0xE8); // ALEN = !23
        assert_eq!(&frame[5..24], &data[..]);

        let expected_crc = {
            let mut crc = SoftCrc32::new();
            let mut input = vec![23u8, 0xE8];
            input.extend_from_slice(&data);
            crc.calc(&input) as u16
        };
        assert_eq!(&frame[24..26], &expected_crc.to_le_bytes());
    }

    #[test]
    fn test_roundtrip_simple() {
        let mut tx = builder(simple_schema());
        let data = sample_payload();
        tx.build(&[TxValue::bytes(FieldName::Data, &data)]).unwrap();

        let mut rx = RxParser::new(simple_schema(), Box::new(SoftCrc32::new()));
        let snaps = rx.feed(tx.frame());
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].bytes(FieldName::Data).unwrap().as_ref(), &data[..]);
        assert_eq!(snaps[0].uint(FieldName::Len), Some(23));
    }

    #[test]
    fn test_field_spans_cover_frame() {
        let mut tx = builder(simple_schema());
        let data = sample_payload();
        let total = tx.build(&[TxValue::bytes(FieldName::Data, &data)]).unwrap();

        let spans = tx.field_spans();
        assert_eq!(spans.len(), 5);
        assert_eq!(spans[0], 0..3);
        assert_eq!(spans[4], 24..26);
        assert_eq!(spans.last().unwrap().end, total);
    }

    #[test]
    fn test_type_inferred_from_payload_size() {
        let mut tx = builder(complex_schema());
        tx.build(&[TxValue::payload(&[0x5A])]).unwrap();

        // Fixed(1) is id 2; TYPE sits after ID/LEN/ALEN.
        assert_eq!(tx.frame()[5], 2);
        assert_eq!(tx.frame().len(), 3 + 1 + 1 + 1 + 1 + 2);
    }

    #[test]
    fn test_explicit_type_selects_alternative() {
        let mut tx = builder(complex_schema());
        let packet = [9u8; 18];
        tx.build(&[
            TxValue::uint(FieldName::Type, 3),
            TxValue::bytes(FieldName::Data, &packet),
        ])
        .unwrap();
        assert_eq!(tx.frame()[5], 3);
        assert_eq!(&tx.frame()[6..24], &packet[..]);
    }

    #[test]
    fn test_empty_alternative_by_type_only() {
        let mut tx = builder(complex_schema());
        let total = tx.build(&[TxValue::uint(FieldName::Type, 4)]).unwrap();
        assert_eq!(total, 3 + 1 + 1 + 1 + 0 + 2);
        assert_eq!(tx.frame()[3], 5); // LEN = 1 + 1 + 1 + 0 + 2
    }

    #[test]
    fn test_var_alternative_length() {
        let mut tx = builder(complex_schema());
        let run = [0x11u8; 42];
        tx.build(&[
            TxValue::uint(FieldName::Type, 5),
            TxValue::bytes(FieldName::Data, &run),
        ])
        .unwrap();
        assert_eq!(tx.frame()[3], (1 + 1 + 1 + 42 + 2) as u8);
        assert_eq!(&tx.frame()[6..48], &run[..]);
    }

    #[test]
    fn test_roundtrip_complex_inferred() {
        let mut tx = builder(complex_schema());
        tx.build(&[TxValue::payload(&[0x5A])]).unwrap();

        let mut rx = RxParser::new(complex_schema(), Box::new(SoftCrc32::new()));
        let snaps = rx.feed(tx.frame());
        assert_eq!(snaps.len(), 1);
        assert_eq!(
            snaps[0].payload(),
            Some(&PayloadValue::Struct {
                id: 2,
                bytes: bytes::Bytes::from_static(&[0x5A]),
            })
        );
        assert_eq!(snaps[0].uint(FieldName::Type), Some(2));
    }

    #[test]
    fn test_reversed_crc_written_big_endian() {
        let mut tx = builder(complex_schema());
        tx.build(&[TxValue::payload(&[0x5A])]).unwrap();

        let frame = tx.frame().to_vec();
        let n = frame.len();
        let expected = SoftCrc32::new().calc(&[frame[3], frame[4], frame[5]]) as u16;
        assert_eq!(frame[n - 2], (expected >> 8) as u8);
        assert_eq!(frame[n - 1], (expected & 0xFF) as u8);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut tx = builder(simple_schema());
        let err = tx
            .build(&[TxValue::uint(FieldName::User("NOPE"), 1)])
            .unwrap_err();
        assert!(matches!(err, FieldwireError::UnknownField(_)));
    }

    #[test]
    fn test_value_for_constant_field_rejected() {
        let mut tx = builder(simple_schema());
        let err = tx
            .build(&[TxValue::bytes(FieldName::Id, &[1, 2, 3])])
            .unwrap_err();
        assert!(matches!(err, FieldwireError::ValueKind(_)));
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let mut tx = builder(simple_schema());
        let err = tx.build(&[TxValue::uint(FieldName::Data, 7)]).unwrap_err();
        assert!(matches!(err, FieldwireError::ValueKind(_)));
    }

    #[test]
    fn test_fixed_blob_size_mismatch_rejected() {
        let mut tx = builder(simple_schema());
        let err = tx
            .build(&[TxValue::bytes(FieldName::Data, &[1, 2, 3])])
            .unwrap_err();
        assert!(matches!(err, FieldwireError::SizeMismatch { .. }));
    }

    #[test]
    fn test_unknown_type_id_rejected() {
        let mut tx = builder(complex_schema());
        let err = tx.build(&[TxValue::uint(FieldName::Type, 9)]).unwrap_err();
        assert!(matches!(err, FieldwireError::UnknownTypeId(9)));
    }

    #[test]
    fn test_payload_without_type_or_value_rejected() {
        let mut tx = builder(complex_schema());
        let err = tx.build(&[]).unwrap_err();
        assert!(matches!(err, FieldwireError::PayloadUnselected));
    }

    #[test]
    fn test_fixed_alternative_wrong_len_rejected() {
        let mut tx = builder(complex_schema());
        let err = tx
            .build(&[
                TxValue::uint(FieldName::Type, 1),
                TxValue::bytes(FieldName::Data, &[1, 2]),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            FieldwireError::SizeMismatch { expected: 19, got: 2, .. }
        ));
    }

    #[test]
    fn test_var_payload_over_cap_fails_whole_build() {
        let mut tx = builder(complex_schema());
        let run = [0u8; 201];
        let err = tx
            .build(&[
                TxValue::uint(FieldName::Type, 5),
                TxValue::bytes(FieldName::Data, &run),
            ])
            .unwrap_err();
        assert!(matches!(err, FieldwireError::Oversize { .. }));
    }

    #[test]
    fn test_unset_user_field_zero_filled() {
        let schema = Schema::builder()
            .field(FieldSpec::constant(FieldName::Id, PREFIX))
            .field(FieldSpec::uint(FieldName::User("SEQ"), 2))
            .field(FieldSpec::blob(FieldName::Data, 4).flags(flags::IS_IN_LEN))
            .build()
            .unwrap();
        let mut tx = builder(schema);
        tx.build(&[TxValue::bytes(FieldName::Data, &[1, 2, 3, 4])])
            .unwrap();
        assert_eq!(&tx.frame()[3..5], &[0, 0]);

        // A second build with the field set leaves no residue when unset again.
        tx.build(&[
            TxValue::uint(FieldName::User("SEQ"), 0xFFFF),
            TxValue::bytes(FieldName::Data, &[1, 2, 3, 4]),
        ])
        .unwrap();
        assert_eq!(&tx.frame()[3..5], &[0xFF, 0xFF]);
        tx.build(&[TxValue::bytes(FieldName::Data, &[1, 2, 3, 4])])
            .unwrap();
        assert_eq!(&tx.frame()[3..5], &[0, 0]);
    }
}
