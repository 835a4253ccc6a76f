//! Field container: the shared frame buffer plus per-field runtime state.
//!
//! One container backs one direction of one endpoint. The buffer holds the
//! **wire image** of the frame being parsed or built; byte reversal for
//! `REVERSE` fields happens at the typed-access boundary (`uint` /
//! `value_bytes` and their setters), so CRC spans and emitted spans are
//! always plain buffer slices.

use bytes::Bytes;

use crate::crc::Crc;
use crate::error::{FieldwireError, Result};
use crate::schema::{
    flags, width_mask, FieldKind, FieldName, FieldSize, PayloadShape, Schema,
};
use crate::snapshot::{FieldValue, PayloadValue, Snapshot};

/// Per-field runtime state, recreated on every reset.
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldState {
    /// Byte offset of the field inside the frame buffer.
    pub(crate) offset: usize,
    /// Runtime size override for dynamic and payload fields.
    pub(crate) size: Option<usize>,
    /// Bytes committed so far while the field is being received.
    pub(crate) read: usize,
    /// Selected payload alternative (payload fields only).
    pub(crate) selected: Option<u64>,
}

/// Ordered field set with a shared buffer and a CRC accumulator.
///
/// Created once per direction at endpoint construction; per-frame state is
/// wiped by [`reset`](Self::reset) after every completion or mismatch.
pub struct FieldContainer {
    schema: Schema,
    buf: Box<[u8]>,
    states: Vec<FieldState>,
    crc: Box<dyn Crc>,
    /// Index of the field the RX cursor is currently filling.
    pub(crate) cursor: usize,
    /// Running offset: bytes assigned to completed fields so far.
    pub(crate) running: usize,
}

impl FieldContainer {
    /// Allocate a container for `schema`, checksummed by `crc`.
    pub fn new(schema: Schema, crc: Box<dyn Crc>) -> Self {
        let buf = vec![0u8; schema.max_frame_size()].into_boxed_slice();
        let states = vec![FieldState::default(); schema.len()];
        Self {
            schema,
            buf,
            states,
            crc,
            cursor: 0,
            running: 0,
        }
    }

    /// The schema driving this container.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Clear all per-frame state: offsets, read counters, runtime sizes,
    /// payload selection and the CRC accumulator.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            *state = FieldState::default();
        }
        self.cursor = 0;
        self.running = 0;
        self.crc.reset();
    }

    pub(crate) fn state(&self, index: usize) -> &FieldState {
        &self.states[index]
    }

    pub(crate) fn state_mut(&mut self, index: usize) -> &mut FieldState {
        &mut self.states[index]
    }

    /// Current byte size of the field, or `None` while a runtime size is
    /// still undetermined.
    pub fn resolved_size(&self, index: usize) -> Option<usize> {
        match &self.schema.field(index).kind {
            FieldKind::Uint { width } => Some(*width),
            FieldKind::Blob { size: FieldSize::Fixed(n) } => Some(*n),
            FieldKind::Blob { size: FieldSize::Dynamic } => self.states[index].size,
            FieldKind::Payload(_) => self.states[index].size,
        }
    }

    /// Set the runtime size of a dynamic or payload field.
    pub fn set_runtime_size(&mut self, index: usize, size: usize) -> Result<()> {
        let field = self.schema.field(index);
        if size > field.max_size {
            return Err(FieldwireError::Oversize {
                name: field.name(),
                size,
                max: field.max_size,
            });
        }
        self.states[index].size = Some(size);
        Ok(())
    }

    /// Record a payload alternative selection, returning its shape.
    ///
    /// Returns `None` (selection unchanged) when the id is not declared.
    pub fn select_payload(&mut self, index: usize, id: u64) -> Option<PayloadShape> {
        let FieldKind::Payload(map) = &self.schema.field(index).kind else {
            return None;
        };
        let shape = map.shape(id)?;
        self.states[index].selected = Some(id);
        Some(shape)
    }

    /// Currently selected payload id, if any.
    pub fn payload_selected(&self, index: usize) -> Option<u64> {
        self.states[index].selected
    }

    /// Wire bytes of the field as currently held in the buffer.
    pub fn field_bytes(&self, index: usize) -> &[u8] {
        let state = &self.states[index];
        let size = self.resolved_size(index).unwrap_or(0);
        &self.buf[state.offset..state.offset + size]
    }

    pub(crate) fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Wire image of the frame assembled so far (all completed fields).
    pub fn built_bytes(&self) -> &[u8] {
        &self.buf[..self.running]
    }

    /// Read an integer field, honoring `REVERSE` (little-endian wire order
    /// by default, big-endian when reversed).
    pub fn uint_at(&self, index: usize) -> Option<u64> {
        let field = self.schema.field(index);
        field.uint_width()?;
        let bytes = self.field_bytes(index);
        let mut value = 0u64;
        if field.has_flag(flags::REVERSE) {
            for &b in bytes {
                value = (value << 8) | u64::from(b);
            }
        } else {
            for &b in bytes.iter().rev() {
                value = (value << 8) | u64::from(b);
            }
        }
        Some(value)
    }

    /// Read an integer field by name.
    pub fn uint(&self, name: FieldName) -> Option<u64> {
        self.uint_at(self.schema.index_of(name)?)
    }

    /// Write an integer field, honoring `REVERSE`. The value is truncated
    /// to the field width.
    pub fn set_uint_at(&mut self, index: usize, value: u64) {
        let field = self.schema.field(index);
        let Some(width) = field.uint_width() else {
            return;
        };
        let value = value & width_mask(width);
        let reverse = field.has_flag(flags::REVERSE);
        let offset = self.states[index].offset;
        for i in 0..width {
            let byte = ((value >> (8 * i)) & 0xFF) as u8;
            let pos = if reverse { width - 1 - i } else { i };
            self.buf[offset + pos] = byte;
        }
    }

    /// Copy a value (natural byte order) into the field's buffer span,
    /// reversing when the field is `REVERSE`.
    pub(crate) fn write_value_bytes(&mut self, index: usize, value: &[u8]) {
        let reverse = self.schema.field(index).has_flag(flags::REVERSE);
        let offset = self.states[index].offset;
        if reverse {
            for (i, &b) in value.iter().enumerate() {
                self.buf[offset + value.len() - 1 - i] = b;
            }
        } else {
            self.buf[offset..offset + value.len()].copy_from_slice(value);
        }
    }

    /// Owned copy of the field value in natural byte order.
    pub fn value_bytes(&self, index: usize) -> Bytes {
        let bytes = self.field_bytes(index);
        if self.schema.field(index).has_flag(flags::REVERSE) {
            bytes.iter().rev().copied().collect::<Vec<u8>>().into()
        } else {
            Bytes::copy_from_slice(bytes)
        }
    }

    /// Copy the constant pattern into the buffer (no-op without one).
    pub(crate) fn apply_constant(&mut self, index: usize) {
        let Some(konst) = self.schema.field(index).constant.clone() else {
            return;
        };
        self.write_value_bytes(index, &konst);
    }

    /// Sum of resolved sizes of `IS_IN_LEN` fields, optionally excluding
    /// one field. `None` when a participating size is still undetermined.
    pub fn len_sum(&self, excluding: Option<usize>) -> Option<u64> {
        let mut sum = 0u64;
        for index in 0..self.schema.len() {
            if Some(index) == excluding {
                continue;
            }
            if !self.schema.field(index).has_flag(flags::IS_IN_LEN) {
                continue;
            }
            sum += self.resolved_size(index)? as u64;
        }
        Some(sum)
    }

    /// CRC over the wire bytes of `IS_IN_CRC` fields in schema order.
    pub fn crc_over_fields(&mut self) -> u32 {
        self.crc.reset();
        let mut crc = 0u32;
        for index in 0..self.schema.len() {
            if !self.schema.field(index).has_flag(flags::IS_IN_CRC) {
                continue;
            }
            let state = &self.states[index];
            let size = self.resolved_size(index).unwrap_or(0);
            let span = &self.buf[state.offset..state.offset + size];
            crc = self.crc.append(crc, span);
        }
        crc
    }

    /// Snapshot of every field's current value.
    pub fn snapshot(&self) -> Snapshot {
        let mut entries = Vec::with_capacity(self.schema.len());
        for index in 0..self.schema.len() {
            let field = self.schema.field(index);
            let value = match &field.kind {
                FieldKind::Uint { .. } => FieldValue::Uint(self.uint_at(index).unwrap_or(0)),
                FieldKind::Blob { .. } => FieldValue::Bytes(self.value_bytes(index)),
                FieldKind::Payload(map) => {
                    let payload = match self.states[index].selected {
                        None => PayloadValue::None,
                        Some(id) => match map.shape(id) {
                            Some(PayloadShape::Fixed(_)) => PayloadValue::Struct {
                                id,
                                bytes: self.value_bytes(index),
                            },
                            Some(PayloadShape::Var) => PayloadValue::Bytes {
                                id,
                                bytes: self.value_bytes(index),
                            },
                            Some(PayloadShape::Empty) => PayloadValue::Empty { id },
                            None => PayloadValue::None,
                        },
                    };
                    FieldValue::Payload(payload)
                }
            };
            entries.push((field.name(), value));
        }
        Snapshot::from_entries(entries)
    }
}

impl std::fmt::Debug for FieldContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldContainer")
            .field("fields", &self.schema.len())
            .field("cursor", &self.cursor)
            .field("running", &self.running)
            .finish()
    }
}
