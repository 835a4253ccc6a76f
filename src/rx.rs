//! Incremental RX parser.
//!
//! [`RxParser`] walks the schema's field list in order, filling each field
//! from whatever chunks the transport delivers. Fields validate as soon as
//! they complete: constants byte-by-byte while streaming in, semantic
//! checks (`set-data-len`, `check-alen`, `check-crc`, `check-type`) through
//! matchers the moment the last byte lands. Completed frames come back as
//! owned [`Snapshot`]s:
//!
//! ```ignore
//! let mut parser = RxParser::new(schema, Box::new(SoftCrc32::new()));
//! for chunk in socket_chunks {
//!     for snapshot in parser.feed(&chunk) {
//!         handle(snapshot);
//!     }
//! }
//! ```
//!
//! # Resynchronization
//!
//! Garbage in front of a frame is shed one byte at a time: a constant
//! mismatch on a fresh field consumes a single byte and restarts the frame.
//! When the mismatch follows a partial match from an earlier chunk, or a
//! matcher rejects a completed field, nothing further is consumed and the
//! unread tail is rescanned from field 0. Bytes already committed to the
//! broken frame are gone, which is the price of not buffering the input.
//!
//! Structural and semantic errors never surface as `Err`; they cost
//! throughput, emit `tracing` diagnostics, and leave the parser ready for
//! the next frame. A stuck partial frame is kept indefinitely until more
//! bytes arrive or [`reset`](RxParser::reset) is called.

use crate::container::FieldContainer;
use crate::crc::Crc;
use crate::schema::{flags, FieldKind, FieldName, MatchStatus, Schema};
use crate::snapshot::Snapshot;

/// Stateful incremental frame parser for one RX direction.
pub struct RxParser {
    container: FieldContainer,
}

impl RxParser {
    /// Create a parser over `schema`, validating CRCs with `crc`.
    pub fn new(schema: Schema, crc: Box<dyn Crc>) -> Self {
        Self {
            container: FieldContainer::new(schema, crc),
        }
    }

    /// The schema this parser speaks.
    pub fn schema(&self) -> &Schema {
        self.container.schema()
    }

    /// Container access, mainly for custom matchers and diagnostics.
    pub fn container(&self) -> &FieldContainer {
        &self.container
    }

    /// Discard any partial frame and return to searching for field 0.
    pub fn reset(&mut self) {
        self.container.reset();
    }

    /// Consume a chunk of input, advancing the parse state.
    ///
    /// Returns one snapshot per frame completed within this chunk (usually
    /// zero or one; more when frames are smaller than the chunk).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Snapshot> {
        let mut out = Vec::new();
        let mut rest = chunk;
        let mut stalled = 0usize;
        while !rest.is_empty() {
            let consumed = self.step(rest, &mut out);
            rest = &rest[consumed..];
            if consumed == 0 {
                // Zero-consumption transitions (zero-size fields, rescans
                // after a mismatch) are bounded by the field count; anything
                // longer is a pathological matcher, so force progress.
                stalled += 1;
                if stalled > self.container.schema().len() + 1 {
                    tracing::debug!("parser made no progress, skipping one byte");
                    self.container.reset();
                    rest = &rest[1..];
                    stalled = 0;
                }
            } else {
                stalled = 0;
            }
        }
        out
    }

    /// Advance the current field with the head of `chunk`.
    ///
    /// Returns the number of bytes consumed from `chunk`.
    fn step(&mut self, chunk: &[u8], out: &mut Vec<Snapshot>) -> usize {
        let idx = self.container.cursor;
        let running = self.container.running;
        self.container.state_mut(idx).offset = running;

        let Some(size) = self.container.resolved_size(idx) else {
            // The cursor reached a runtime-sized field whose size never got
            // set (no LEN/TYPE ran). The frame cannot complete.
            tracing::debug!(
                field = %self.container.schema().field(idx).name(),
                "field size unresolved, dropping frame"
            );
            self.container.reset();
            return 1;
        };

        if size == 0 {
            return self.finish_field(idx, 0, out);
        }

        let read = self.container.state(idx).read;
        let take = chunk.len().min(size - read);

        if let Some(i) = self.constant_mismatch(idx, size, read, &chunk[..take]) {
            let consumed = usize::from(read == 0);
            tracing::debug!(
                field = %self.container.schema().field(idx).name(),
                position = read + i,
                received = chunk[i],
                "constant mismatch, resynchronizing"
            );
            self.container.reset();
            return consumed;
        }

        let offset = self.container.state(idx).offset;
        self.container.buf_mut()[offset + read..offset + read + take]
            .copy_from_slice(&chunk[..take]);
        self.container.state_mut(idx).read += take;

        if read + take < size {
            return take;
        }
        self.finish_field(idx, take, out)
    }

    /// Compare incoming wire bytes against the field's constant.
    ///
    /// Returns the chunk-relative index of the first disagreeing byte.
    fn constant_mismatch(
        &self,
        idx: usize,
        size: usize,
        read: usize,
        incoming: &[u8],
    ) -> Option<usize> {
        let field = self.container.schema().field(idx);
        let konst = field.constant.as_ref()?;
        let reverse = field.has_flag(flags::REVERSE);
        for (i, &byte) in incoming.iter().enumerate() {
            let expected = if reverse {
                konst[size - 1 - read - i]
            } else {
                konst[read + i]
            };
            if byte != expected {
                return Some(i);
            }
        }
        None
    }

    /// Run the completed field's matcher and advance or reset.
    fn finish_field(&mut self, idx: usize, consumed: usize, out: &mut Vec<Snapshot>) -> usize {
        match self.run_matcher(idx) {
            MatchStatus::Match => {
                let size = self.container.resolved_size(idx).unwrap_or(0);
                self.container.running += size;
                self.container.state_mut(idx).read = 0;
                self.container.cursor += 1;
                if self.container.cursor >= self.container.schema().len() {
                    out.push(self.container.snapshot());
                    self.container.reset();
                }
                consumed
            }
            MatchStatus::NotMatch => {
                tracing::trace!(
                    field = %self.container.schema().field(idx).name(),
                    frame_bytes = self.container.running,
                    "frame dropped"
                );
                self.container.reset();
                0
            }
            MatchStatus::Processing => {
                // Only meaningful when the matcher grew the field; guard
                // against a livelock otherwise.
                let grown = self
                    .container
                    .resolved_size(idx)
                    .is_some_and(|s| s > self.container.state(idx).read);
                if !grown {
                    tracing::debug!(
                        field = %self.container.schema().field(idx).name(),
                        "matcher kept processing without extending the field, dropping frame"
                    );
                    self.container.reset();
                }
                consumed
            }
        }
    }

    /// Dispatch to the explicit matcher or the built-in for the field name.
    fn run_matcher(&mut self, idx: usize) -> MatchStatus {
        let (custom, name) = {
            let field = self.container.schema().field(idx);
            (field.matcher, field.name())
        };
        if let Some(matcher) = custom {
            return matcher(&mut self.container, idx);
        }
        match name {
            FieldName::Len => self.set_data_len(idx),
            FieldName::Alen => self.check_alen(idx),
            FieldName::Crc => self.check_crc(idx),
            FieldName::Type => self.check_type(idx),
            _ => MatchStatus::Match,
        }
    }

    /// Built-in LEN matcher: derive the DATA size from the received length.
    ///
    /// Expected payload size is `LEN - Σ size(IS_IN_LEN fields except
    /// DATA)`. A fixed-size DATA must agree exactly; a runtime-sized DATA
    /// adopts the expectation, bounded by its cap.
    fn set_data_len(&mut self, len_idx: usize) -> MatchStatus {
        let len_value = self.container.uint_at(len_idx).unwrap_or(0);
        let data_index = self.container.schema().data_index();
        let Some(sum) = self.container.len_sum(data_index) else {
            return MatchStatus::NotMatch;
        };
        let Some(expected) = len_value.checked_sub(sum) else {
            tracing::debug!(received = len_value, fixed_sum = sum, "length below fixed field sum");
            return MatchStatus::NotMatch;
        };
        let expected = expected as usize;

        let Some(data_index) = data_index else {
            return if expected == 0 {
                MatchStatus::Match
            } else {
                tracing::debug!(received = len_value, "length disagrees with schema without DATA");
                MatchStatus::NotMatch
            };
        };

        match self.container.resolved_size(data_index) {
            Some(current) if current != expected => {
                tracing::debug!(expected, declared = current, "length disagrees with DATA size");
                MatchStatus::NotMatch
            }
            Some(_) => MatchStatus::Match,
            None => {
                if self.container.set_runtime_size(data_index, expected).is_err() {
                    tracing::debug!(expected, "length exceeds the DATA size cap");
                    MatchStatus::NotMatch
                } else {
                    MatchStatus::Match
                }
            }
        }
    }

    /// Built-in ALEN matcher: the anti-length must be `!LEN`, width-matched.
    fn check_alen(&mut self, alen_idx: usize) -> MatchStatus {
        let Some(width) = self.container.schema().field(alen_idx).uint_width() else {
            return MatchStatus::NotMatch;
        };
        let Some(len) = self.container.uint(FieldName::Len) else {
            return MatchStatus::NotMatch;
        };
        let received = self.container.uint_at(alen_idx).unwrap_or(0);
        let expected = !len & crate::schema::width_mask(width);
        if received == expected {
            MatchStatus::Match
        } else {
            tracing::debug!(expected, received, "anti-length mismatch");
            MatchStatus::NotMatch
        }
    }

    /// Built-in CRC matcher: recompute over `IS_IN_CRC` wire bytes.
    fn check_crc(&mut self, crc_idx: usize) -> MatchStatus {
        let Some(width) = self.container.schema().field(crc_idx).uint_width() else {
            return MatchStatus::NotMatch;
        };
        let received = self.container.uint_at(crc_idx).unwrap_or(0);
        let computed = u64::from(self.container.crc_over_fields()) & crate::schema::width_mask(width);
        if computed == received {
            MatchStatus::Match
        } else {
            tracing::debug!(expected = computed, received, "crc mismatch");
            MatchStatus::NotMatch
        }
    }

    /// Built-in TYPE matcher: select the payload alternative by id.
    ///
    /// Rejects unknown ids, and fixed/empty alternatives whose natural size
    /// disagrees with a DATA size already derived from LEN.
    fn check_type(&mut self, type_idx: usize) -> MatchStatus {
        let Some(data_index) = self.container.schema().data_index() else {
            return MatchStatus::Match;
        };
        if !matches!(
            &self.container.schema().field(data_index).kind,
            FieldKind::Payload(_)
        ) {
            return MatchStatus::Match;
        }

        let type_value = self.container.uint_at(type_idx).unwrap_or(0);
        let Some(shape) = self.container.select_payload(data_index, type_value) else {
            tracing::debug!(received = type_value, "unknown payload type id");
            return MatchStatus::NotMatch;
        };

        let natural = match shape {
            crate::schema::PayloadShape::Fixed(n) => n,
            crate::schema::PayloadShape::Empty => 0,
            crate::schema::PayloadShape::Var => return MatchStatus::Match,
        };
        match self.container.resolved_size(data_index) {
            Some(current) if current != natural => {
                tracing::debug!(
                    id = type_value,
                    expected = natural,
                    derived = current,
                    "payload size disagrees with selected alternative"
                );
                MatchStatus::NotMatch
            }
            _ => {
                // Cap was validated at assembly, the set cannot fail.
                let _ = self.container.set_runtime_size(data_index, natural);
                MatchStatus::Match
            }
        }
    }
}

impl std::fmt::Debug for RxParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxParser")
            .field("container", &self.container)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::SoftCrc32;
    use crate::schema::{FieldSpec, PayloadMap, PayloadShape, Schema};
    use crate::snapshot::PayloadValue;

    const PREFIX: &[u8] = &[0xAA, 0xBB, 0xCC];

    /// Packed test payload: u8=1, u16=2, u32=3, f32=4.0, f64=e (19 bytes).
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

    fn simple_frame(data: &[u8]) -> Vec<u8> {
        let len = (1 + 1 + data.len() + 2) as u8;
        let alen = !len;
        let mut crc_input = vec![len, alen];
        crc_input.extend_from_slice(data);
        let crc = SoftCrc32::new().calc(&crc_input) as u16;

        let mut frame = PREFIX.to_vec();
        frame.push(len);
        frame.push(alen);
        frame.extend_from_slice(data);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    fn parser(schema: Schema) -> RxParser {
        RxParser::new(schema, Box::new(SoftCrc32::new()))
    }

    #[test]
    fn test_single_complete_frame() {
        let mut rx = parser(simple_schema());
        let data = sample_payload();
        let frame = simple_frame(&data);

        let snaps = rx.feed(&frame);
        assert_eq!(snaps.len(), 1);
        let snap = &snaps[0];
        assert_eq!(snap.uint(FieldName::Len), Some(23));
        assert_eq!(snap.uint(FieldName::Alen), Some(0xE8));
        assert_eq!(snap.bytes(FieldName::Data).unwrap().as_ref(), &data[..]);
    }

    #[test]
    fn test_chunked_delivery_per_field() {
        let mut rx = parser(simple_schema());
        let data = sample_payload();
        let frame = simple_frame(&data);

        let mut snaps = Vec::new();
        let mut pos = 0;
        for chunk_len in [3, 1, 1, 19, 2] {
            snaps.extend(rx.feed(&frame[pos..pos + chunk_len]));
            pos += chunk_len;
        }
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].bytes(FieldName::Data).unwrap().as_ref(), &data[..]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut rx = parser(simple_schema());
        let frame = simple_frame(&sample_payload());

        let mut snaps = Vec::new();
        for &byte in &frame {
            snaps.extend(rx.feed(&[byte]));
        }
        assert_eq!(snaps.len(), 1);
    }

    #[test]
    fn test_chunking_invariance() {
        let data = sample_payload();
        let frame = simple_frame(&data);

        let mut whole = parser(simple_schema());
        let expected = whole.feed(&frame).remove(0);

        for split in 1..frame.len() {
            let mut rx = parser(simple_schema());
            let mut snaps = rx.feed(&frame[..split]);
            snaps.extend(rx.feed(&frame[split..]));
            assert_eq!(snaps.len(), 1, "split at {split}");
            assert_eq!(snaps[0], expected, "split at {split}");
        }
    }

    #[test]
    fn test_noise_before_frame_resyncs() {
        let mut rx = parser(simple_schema());
        let noise = [0x04, 0x02, 0x06, 0x07, 0x22, 0x43, 0x2C, 0xFF, 0xFF, 0xFF, 0xAA, 0xBB];

        assert!(rx.feed(&noise).is_empty());

        let data = sample_payload();
        let snaps = rx.feed(&simple_frame(&data));
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].bytes(FieldName::Data).unwrap().as_ref(), &data[..]);
    }

    #[test]
    fn test_garbage_alone_produces_nothing() {
        let mut rx = parser(simple_schema());
        let garbage: Vec<u8> = (0u16..512).map(|i| (i % 251) as u8).collect();
        assert!(rx.feed(&garbage).is_empty());
    }

    #[test]
    fn test_crc_mismatch_rejected_then_recovers() {
        let mut rx = parser(simple_schema());
        let mut frame = simple_frame(&sample_payload());
        *frame.last_mut().unwrap() ^= 0xFF;

        assert!(rx.feed(&frame).is_empty());

        // Parser is clean: the next valid frame parses.
        let snaps = rx.feed(&simple_frame(&sample_payload()));
        assert_eq!(snaps.len(), 1);
    }

    #[test]
    fn test_alen_mismatch_rejected() {
        let mut rx = parser(simple_schema());
        let mut frame = simple_frame(&sample_payload());
        frame[4] ^= 0x01; // corrupt ALEN
        assert!(rx.feed(&frame).is_empty());
    }

    #[test]
    fn test_len_disagreeing_with_fixed_data_rejected() {
        let mut rx = parser(simple_schema());
        let mut frame = simple_frame(&sample_payload());
        frame[3] += 1; // LEN now implies a 20-byte DATA, schema says 19
        frame[4] = !frame[3];
        assert!(rx.feed(&frame).is_empty());
    }

    #[test]
    fn test_idempotent_refeed() {
        let mut rx = parser(simple_schema());
        let frame = simple_frame(&sample_payload());

        let first = rx.feed(&frame);
        let second = rx.feed(&frame);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0], second[0]);
    }

    #[test]
    fn test_back_to_back_frames_one_chunk() {
        let mut rx = parser(simple_schema());
        let frame = simple_frame(&sample_payload());
        let mut stream = frame.clone();
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(&frame);

        let snaps = rx.feed(&stream);
        assert_eq!(snaps.len(), 3);
    }

    // ---- variadic payload schema ------------------------------------------

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
            .field(
                FieldSpec::uint(FieldName::Crc, 2).flags(flags::IS_IN_LEN | flags::REVERSE),
            )
            .build()
            .unwrap()
    }

    fn complex_frame(type_id: u8, data: &[u8]) -> Vec<u8> {
        let len = (1 + 1 + 1 + data.len() + 2) as u8;
        let alen = !len;
        let crc = SoftCrc32::new().calc(&[len, alen, type_id]) as u16;

        let mut frame = PREFIX.to_vec();
        frame.push(len);
        frame.push(alen);
        frame.push(type_id);
        frame.extend_from_slice(data);
        frame.extend_from_slice(&crc.to_be_bytes()); // REVERSE field
        frame
    }

    #[test]
    fn test_variadic_dispatch_fixed_struct() {
        let mut rx = parser(complex_schema());
        let snaps = rx.feed(&complex_frame(2, &[0x5A]));
        assert_eq!(snaps.len(), 1);
        assert_eq!(
            snaps[0].payload(),
            Some(&PayloadValue::Struct {
                id: 2,
                bytes: bytes::Bytes::from_static(&[0x5A]),
            })
        );
    }

    #[test]
    fn test_variadic_empty_alternative() {
        let mut rx = parser(complex_schema());
        let snaps = rx.feed(&complex_frame(4, &[]));
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].payload(), Some(&PayloadValue::Empty { id: 4 }));
    }

    #[test]
    fn test_variadic_var_alternative_sized_by_len() {
        let mut rx = parser(complex_schema());
        let run = [7u8; 42];
        let snaps = rx.feed(&complex_frame(5, &run));
        assert_eq!(snaps.len(), 1);
        match snaps[0].payload().unwrap() {
            PayloadValue::Bytes { id, bytes } => {
                assert_eq!(*id, 5);
                assert_eq!(bytes.as_ref(), &run[..]);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_id_rejected() {
        let mut rx = parser(complex_schema());
        let snaps = rx.feed(&complex_frame(0, &[0x5A]));
        assert!(snaps.is_empty());

        // Recovers for the next valid frame.
        assert_eq!(rx.feed(&complex_frame(2, &[0x5A])).len(), 1);
    }

    #[test]
    fn test_type_size_disagreement_rejected() {
        // LEN says one payload byte, TYPE selects the 19-byte alternative.
        let mut rx = parser(complex_schema());
        let mut frame = complex_frame(2, &[0x5A]);
        frame[5] = 1; // overwrite TYPE
        assert!(rx.feed(&frame).is_empty());
    }

    #[test]
    fn test_reversed_crc_byte_swap_rejected() {
        let mut rx = parser(complex_schema());
        let mut frame = complex_frame(2, &[0x5A]);
        let n = frame.len();
        frame.swap(n - 2, n - 1);
        // Only a palindromic CRC would survive the swap; rule that out.
        assert_ne!(frame[n - 2], frame[n - 1]);
        assert!(rx.feed(&frame).is_empty());
    }

    #[test]
    fn test_partial_frame_retained_until_more_bytes() {
        let mut rx = parser(simple_schema());
        let frame = simple_frame(&sample_payload());

        assert!(rx.feed(&frame[..7]).is_empty());
        // No timeout: state persists across an arbitrary gap.
        let snaps = rx.feed(&frame[7..]);
        assert_eq!(snaps.len(), 1);
    }

    #[test]
    fn test_explicit_reset_discards_partial_frame() {
        let mut rx = parser(simple_schema());
        let frame = simple_frame(&sample_payload());

        assert!(rx.feed(&frame[..7]).is_empty());
        rx.reset();
        assert!(rx.feed(&frame[7..]).is_empty());
        assert_eq!(rx.feed(&frame).len(), 1);
    }

    // ---- dynamic DATA sized purely by LEN ---------------------------------

    fn dynamic_schema(cap: usize) -> Schema {
        Schema::builder()
            .field(FieldSpec::constant(FieldName::Id, PREFIX))
            .field(FieldSpec::uint(FieldName::Len, 2).flags(flags::IS_IN_LEN | flags::IS_IN_CRC))
            .field(
                FieldSpec::dynamic(FieldName::Data)
                    .max_size(cap)
                    .flags(flags::IS_IN_LEN | flags::IS_IN_CRC),
            )
            .field(FieldSpec::uint(FieldName::Crc, 2).flags(flags::IS_IN_LEN))
            .build()
            .unwrap()
    }

    fn dynamic_frame(data: &[u8]) -> Vec<u8> {
        let len = (2 + data.len() + 2) as u16;
        let mut crc_input = len.to_le_bytes().to_vec();
        crc_input.extend_from_slice(data);
        let crc = SoftCrc32::new().calc(&crc_input) as u16;

        let mut frame = PREFIX.to_vec();
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(data);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    #[test]
    fn test_data_at_cap_parses() {
        let mut rx = parser(dynamic_schema(64));
        let data = [0xA5u8; 64];
        let snaps = rx.feed(&dynamic_frame(&data));
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].bytes(FieldName::Data).unwrap().len(), 64);
    }

    #[test]
    fn test_data_one_byte_over_cap_refused() {
        let mut rx = parser(dynamic_schema(64));
        let data = [0xA5u8; 65];
        assert!(rx.feed(&dynamic_frame(&data)).is_empty());
    }

    #[test]
    fn test_zero_size_data_parses() {
        let mut rx = parser(dynamic_schema(64));
        let snaps = rx.feed(&dynamic_frame(&[]));
        assert_eq!(snaps.len(), 1);
        assert!(snaps[0].bytes(FieldName::Data).unwrap().is_empty());
    }

    #[test]
    fn test_custom_matcher_overrides_builtin() {
        fn always_reject(_: &mut FieldContainer, _: usize) -> MatchStatus {
            MatchStatus::NotMatch
        }
        let schema = Schema::builder()
            .field(FieldSpec::constant(FieldName::Id, PREFIX))
            .field(
                FieldSpec::uint(FieldName::Len, 1)
                    .flags(flags::IS_IN_LEN)
                    .matcher(always_reject),
            )
            .field(FieldSpec::blob(FieldName::Data, 4).flags(flags::IS_IN_LEN))
            .build()
            .unwrap();
        let mut rx = parser(schema);
        let frame = [0xAA, 0xBB, 0xCC, 7, 1, 2, 3, 4];
        assert!(rx.feed(&frame).is_empty());
    }
}
