//! The decoding engine: [`CodedReader`] and its limit machinery.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::min;
use core::mem;

use bytes::Buf;

use crate::encoding::{
    decode_varint_slice, encode_varint, u32_to_signed, u64_to_signed, FieldNumber, Tag, WireType,
};
use crate::source::{BufSource, SliceSource, Source};
use crate::unknown::UnknownFieldSet;
use crate::DecodeError;
use crate::DecodeErrorKind::{
    InvalidTag, InvalidUtf8, MismatchedEndGroup, NegativeSize, Other, SizeLimitExceeded, Truncated,
};

#[cfg(feature = "std")]
use crate::source::ReadSource;

/// Sentinel for "no length-delimited region is open".
const UNBOUNDED: u64 = u64::MAX;

/// An opaque token carrying the limit that was in force before a
/// [`CodedReader::push_limit`] call. Handing it back to
/// [`CodedReader::pop_limit`] restores that limit; push/pop pairs must nest
/// in strict LIFO order.
#[derive(Clone, Copy, Debug)]
#[must_use = "the old limit must be restored with pop_limit"]
pub struct Limit(u64);

/// A streaming wire-format parser.
///
/// A reader owns all the state of one parse: the byte source, the current
/// window position, the innermost length-delimited region's limit, the
/// recursion depth, and the most recently read tag. Create one reader per
/// top-level parse and discard it afterwards; a reader that has reported an
/// error is left in an unspecified (but memory-safe) position.
///
/// All reads respect the current limit: bytes beyond it are invisible even
/// when they are physically buffered, and a value that would cross it fails
/// with a truncation error after consuming exactly up to the boundary.
pub struct CodedReader<S> {
    source: S,
    /// Absolute offset bounding the innermost open region.
    current_limit: u64,
    size_limit: u64,
    recursion_depth: u32,
    recursion_limit: u32,
    last_tag: Option<Tag>,
    peeked: Option<Tag>,
    discard_unknown_fields: bool,
}

impl<'a> CodedReader<SliceSource<'a>> {
    /// Creates a reader over a contiguous byte slice.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::new(SliceSource::new(data))
    }
}

impl<B: Buf> CodedReader<BufSource<B>> {
    /// Creates a reader over any [`Buf`], contiguous or segmented.
    pub fn from_buf(buf: B) -> Self {
        Self::new(BufSource::new(buf))
    }
}

#[cfg(feature = "std")]
impl<R: std::io::Read> CodedReader<ReadSource<R>> {
    /// Creates a reader over a byte stream, buffering refills internally
    /// (4096 bytes by default).
    pub fn from_read(read: R) -> Self {
        Self::new(ReadSource::new(read))
    }

    /// Creates a reader over a byte stream with the given refill buffer
    /// capacity.
    pub fn from_read_with_capacity(capacity: usize, read: R) -> Self {
        Self::new(ReadSource::with_capacity(capacity, read))
    }
}

impl<S: Source> CodedReader<S> {
    /// Creates a reader over the given source.
    pub fn new(source: S) -> Self {
        CodedReader {
            source,
            current_limit: UNBOUNDED,
            size_limit: crate::DEFAULT_SIZE_LIMIT,
            recursion_depth: 0,
            recursion_limit: crate::RECURSION_LIMIT,
            last_tag: None,
            peeked: None,
            discard_unknown_fields: false,
        }
    }

    /// Sets the maximum nesting depth of embedded messages and groups.
    /// Has no effect when the crate is built with `no-recursion-limit`.
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Sets the maximum total number of bytes this reader will pull from its
    /// source, bounding memory consumption against inputs whose declared
    /// sizes are hostile. The default is `i32::MAX`.
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit;
        self
    }

    /// Sets whether unrecognized fields handled through
    /// [`handle_unknown_field`](Self::handle_unknown_field) are dropped
    /// rather than preserved.
    pub fn with_discard_unknown_fields(mut self, discard: bool) -> Self {
        self.discard_unknown_fields = discard;
        self
    }

    /// Returns whether unrecognized fields should be dropped.
    pub fn discard_unknown_fields(&self) -> bool {
        self.discard_unknown_fields
    }

    /// Returns the absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// Returns the most recently read tag, if any.
    pub fn last_tag(&self) -> Option<Tag> {
        self.last_tag
    }

    /// Consumes the reader, returning its source.
    pub fn into_inner(self) -> S {
        self.source
    }

    // === Window and limit bookkeeping ===

    /// Number of bytes of the current window that lie before the current
    /// limit.
    #[inline]
    fn available_in_chunk(&self) -> usize {
        let chunk_len = self.source.chunk().len() as u64;
        let before_limit = self.current_limit.saturating_sub(self.source.position());
        min(chunk_len, before_limit) as usize
    }

    /// The readable prefix of the current window; never extends past the
    /// current limit.
    #[inline]
    fn chunk_within_limit(&self) -> &[u8] {
        &self.source.chunk()[..self.available_in_chunk()]
    }

    /// Refills the window, failing with `Truncated` if the logical or
    /// physical input is exhausted.
    fn refill(&mut self) -> Result<(), DecodeError> {
        if self.reached_limit() {
            return Err(DecodeError::new(Truncated));
        }
        if !self.source.refill()? {
            return Err(DecodeError::new(Truncated));
        }
        self.check_size_limit()
    }

    /// Refills the window for end-of-input detection; a `false` result means
    /// the logical input is exhausted.
    fn try_refill(&mut self) -> Result<bool, DecodeError> {
        if self.reached_limit() {
            return Ok(false);
        }
        if !self.source.refill()? {
            return Ok(false);
        }
        self.check_size_limit()?;
        Ok(true)
    }

    fn check_size_limit(&self) -> Result<(), DecodeError> {
        let buffered_end = self.source.position() + self.source.chunk().len() as u64;
        if buffered_end > self.size_limit {
            return Err(DecodeError::new(SizeLimitExceeded));
        }
        Ok(())
    }

    /// Opens a length-delimited region of `byte_limit` bytes starting at the
    /// current position, returning a token for the enclosing region's limit.
    ///
    /// An inner region may never claim to extend past its enclosing region;
    /// that is reported as truncation of the inner region.
    pub fn push_limit(&mut self, byte_limit: i32) -> Result<Limit, DecodeError> {
        if byte_limit < 0 {
            return Err(DecodeError::new(NegativeSize));
        }
        let new_limit = self.source.position() + byte_limit as u64;
        if new_limit > self.current_limit {
            return Err(DecodeError::new(Truncated));
        }
        Ok(Limit(mem::replace(&mut self.current_limit, new_limit)))
    }

    /// Restores the limit that was in force before the matching
    /// [`push_limit`](Self::push_limit).
    pub fn pop_limit(&mut self, old_limit: Limit) {
        self.current_limit = old_limit.0;
    }

    /// Returns whether the current region's limit has been reached.
    pub fn reached_limit(&self) -> bool {
        self.current_limit != UNBOUNDED && self.source.position() >= self.current_limit
    }

    /// Returns whether the logical input is exhausted: the current limit has
    /// been reached, or the window is empty and a refill yields nothing.
    pub fn is_at_end(&mut self) -> Result<bool, DecodeError> {
        if self.reached_limit() {
            return Ok(true);
        }
        if !self.source.chunk().is_empty() {
            return Ok(false);
        }
        Ok(!self.try_refill()?)
    }

    #[allow(clippy::unnecessary_wraps)] // non-trivial only without no-recursion-limit
    fn check_recursion(&self) -> Result<(), DecodeError> {
        #[cfg(not(feature = "no-recursion-limit"))]
        if self.recursion_depth >= self.recursion_limit {
            return Err(DecodeError::new(
                crate::DecodeErrorKind::RecursionLimitExceeded,
            ));
        }
        Ok(())
    }

    // === Raw reads ===

    fn read_raw_byte(&mut self) -> Result<u8, DecodeError> {
        if self.available_in_chunk() == 0 {
            self.refill()?;
        }
        let byte = self.source.chunk()[0];
        self.source.advance(1);
        Ok(byte)
    }

    /// Reads one varint of up to ten bytes.
    ///
    /// When the whole varint is visible in the current window this decodes
    /// without per-byte bounds checks; otherwise it falls back to a
    /// byte-at-a-time loop that may refill between bytes. No refill ever
    /// happens once the fast path is entered.
    pub fn read_raw_varint64(&mut self) -> Result<u64, DecodeError> {
        let chunk = self.chunk_within_limit();
        if let Some(&first) = chunk.first() {
            if first < 0x80 {
                self.source.advance(1);
                return Ok(u64::from(first));
            }
            if chunk.len() >= 10 || chunk[chunk.len() - 1] < 0x80 {
                let (value, advance) = decode_varint_slice(chunk)?;
                self.source.advance(advance);
                return Ok(value);
            }
        }
        self.read_raw_varint64_slow()
    }

    #[inline(never)]
    #[cold]
    fn read_raw_varint64_slow(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for count in 0..10 {
            let byte = self.read_raw_byte()?;
            value |= u64::from(byte & 0x7F) << (count * 7);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        Err(DecodeError::new(
            crate::DecodeErrorKind::MalformedVarint,
        ))
    }

    /// Reads a varint, keeping the low 32 bits.
    ///
    /// Over-long encodings (a sign-extended 64-bit value truncated to 32
    /// bits) are tolerated as long as every continuation byte is well formed;
    /// this keeps `int32` fields forward-compatible with writers that widen
    /// them.
    pub fn read_raw_varint32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read_raw_varint64()? as u32)
    }

    fn read_raw_byte_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut array = [0u8; N];
        let chunk = self.chunk_within_limit();
        if chunk.len() >= N {
            array.copy_from_slice(&chunk[..N]);
            self.source.advance(N);
            return Ok(array);
        }
        // crosses a refill or limit boundary
        for slot in array.iter_mut() {
            *slot = self.read_raw_byte()?;
        }
        Ok(array)
    }

    /// Consumes exactly `n` logical bytes, refilling as needed.
    fn consume(&mut self, mut n: u64) -> Result<(), DecodeError> {
        while n > 0 {
            let mut available = self.available_in_chunk();
            if available == 0 {
                self.refill()?;
                available = self.available_in_chunk();
            }
            let step = min(available as u64, n) as usize;
            self.source.advance(step);
            n -= step as u64;
        }
        Ok(())
    }

    /// Skips `len` bytes. When `len` overruns the current limit, the bytes up
    /// to the limit are still consumed before the truncation error, so the
    /// cursor ends at a deterministic position.
    fn skip_raw_bytes(&mut self, len: u64) -> Result<(), DecodeError> {
        if self.current_limit != UNBOUNDED {
            let before_limit = self.current_limit.saturating_sub(self.source.position());
            if len > before_limit {
                self.consume(before_limit)?;
                return Err(DecodeError::new(Truncated));
            }
        }
        self.consume(len)
    }

    // === Tags ===

    /// Reads the next field tag, or `None` exactly when the logical input is
    /// exhausted (the current limit or the end of input was reached).
    ///
    /// A tag whose field number is zero — including a literal zero byte — is
    /// never valid and fails with `InvalidTag`.
    pub fn read_tag(&mut self) -> Result<Option<Tag>, DecodeError> {
        if let Some(tag) = self.peeked.take() {
            self.last_tag = Some(tag);
            return Ok(Some(tag));
        }
        if self.is_at_end()? {
            self.last_tag = None;
            return Ok(None);
        }
        let raw = self.read_raw_varint32()?;
        match Tag::try_from_raw(raw) {
            Some(tag) => {
                self.last_tag = Some(tag);
                Ok(Some(tag))
            }
            None => Err(DecodeError::new(InvalidTag)),
        }
    }

    /// Returns the next tag without consuming it. `last_tag` is unaffected.
    ///
    /// A peeked tag is buffered until the next `read_tag` or
    /// `maybe_consume_tag` call; no other read may run in between, since the
    /// tag's bytes have already been taken from the source.
    pub fn peek_tag(&mut self) -> Result<Option<Tag>, DecodeError> {
        if let Some(tag) = self.peeked {
            return Ok(Some(tag));
        }
        let saved_last = self.last_tag;
        let tag = self.read_tag()?;
        self.peeked = tag;
        self.last_tag = saved_last;
        Ok(tag)
    }

    /// Consumes the next tag if it equals `tag`, returning whether it did.
    pub fn maybe_consume_tag(&mut self, tag: Tag) -> Result<bool, DecodeError> {
        if self.peek_tag()? == Some(tag) {
            self.read_tag()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes the value of the most recently read field, whatever its wire
    /// type.
    ///
    /// Fails when no tag has been read, or when the last tag was an
    /// end-group tag: that token belongs to the group reader and cannot be
    /// skipped past.
    pub fn skip_last_field(&mut self) -> Result<(), DecodeError> {
        let tag = self.last_tag.ok_or_else(|| DecodeError::new(Other))?;
        match tag.wire_type() {
            WireType::Varint => {
                self.read_raw_varint64()?;
            }
            WireType::SixtyFourBit => self.skip_raw_bytes(8)?,
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.skip_raw_bytes(len as u64)?;
            }
            WireType::StartGroup => self.skip_group(tag.field_number())?,
            WireType::EndGroup => return Err(DecodeError::new(Other)),
            WireType::ThirtyTwoBit => self.skip_raw_bytes(4)?,
        }
        Ok(())
    }

    fn skip_group(&mut self, field: FieldNumber) -> Result<(), DecodeError> {
        self.read_group(field, |reader| {
            while let Some(tag) = reader.read_tag()? {
                if tag.wire_type() == WireType::EndGroup {
                    break;
                }
                reader.skip_last_field()?;
            }
            Ok(())
        })
    }

    // === Scalar values ===

    /// Reads an `int32` field value.
    pub fn read_int32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_raw_varint64()? as i32)
    }

    /// Reads an `int64` field value.
    pub fn read_int64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_raw_varint64()? as i64)
    }

    /// Reads a `uint32` field value.
    pub fn read_uint32(&mut self) -> Result<u32, DecodeError> {
        self.read_raw_varint32()
    }

    /// Reads a `uint64` field value.
    pub fn read_uint64(&mut self) -> Result<u64, DecodeError> {
        self.read_raw_varint64()
    }

    /// Reads an `sint32` (zigzag) field value.
    pub fn read_sint32(&mut self) -> Result<i32, DecodeError> {
        Ok(u32_to_signed(self.read_raw_varint32()?))
    }

    /// Reads an `sint64` (zigzag) field value.
    pub fn read_sint64(&mut self) -> Result<i64, DecodeError> {
        Ok(u64_to_signed(self.read_raw_varint64()?))
    }

    /// Reads a `bool` field value. Any nonzero varint is true.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_raw_varint64()? != 0)
    }

    /// Reads an enum field's raw value.
    pub fn read_enum_value(&mut self) -> Result<i32, DecodeError> {
        self.read_int32()
    }

    /// Reads a `fixed32` field value.
    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_raw_byte_array()?))
    }

    /// Reads a `fixed64` field value.
    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.read_raw_byte_array()?))
    }

    /// Reads an `sfixed32` field value.
    pub fn read_sfixed32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_fixed32()? as i32)
    }

    /// Reads an `sfixed64` field value.
    pub fn read_sfixed64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_fixed64()? as i64)
    }

    /// Reads a `float` field value, bit-exactly.
    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    /// Reads a `double` field value, bit-exactly.
    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    // === Length-delimited values ===

    /// Reads the length prefix of a length-delimited value, failing with
    /// `NegativeSize` when the 32-bit value is negative.
    pub fn read_length(&mut self) -> Result<i32, DecodeError> {
        let value = self.read_raw_varint32()? as i32;
        if value < 0 {
            return Err(DecodeError::new(NegativeSize));
        }
        Ok(value)
    }

    /// Reads a `bytes` field value: a length prefix followed by exactly that
    /// many bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_length()?;
        self.read_raw_bytes(len as usize)
    }

    /// Reads a `string` field value, validating UTF-8. Invalid data fails
    /// with `InvalidUtf8`; no replacement characters are ever substituted.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| DecodeError::new(InvalidUtf8))
    }

    fn read_raw_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        if self.current_limit != UNBOUNDED {
            let before_limit = self.current_limit.saturating_sub(self.source.position());
            if len as u64 > before_limit {
                // consume up to the limit so the cursor position stays
                // deterministic for error reporting
                self.consume(before_limit)?;
                return Err(DecodeError::new(Truncated));
            }
        }
        let chunk = self.chunk_within_limit();
        if chunk.len() >= len {
            let value = chunk[..len].to_vec();
            self.source.advance(len);
            return Ok(value);
        }
        self.read_raw_bytes_multi_chunk(len)
    }

    fn read_raw_bytes_multi_chunk(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        if len <= crate::DEFAULT_BUFFER_CAPACITY {
            let mut value = Vec::with_capacity(len);
            self.read_into(&mut value, len)?;
            return Ok(value);
        }
        // A declared length is attacker-controlled until the bytes actually
        // arrive, so large values are read in bounded segments and assembled
        // only afterwards.
        let mut segments: Vec<Vec<u8>> = Vec::new();
        let mut remaining = len;
        while remaining > 0 {
            let step = min(remaining, crate::DEFAULT_BUFFER_CAPACITY);
            let mut segment = Vec::with_capacity(step);
            self.read_into(&mut segment, step)?;
            remaining -= step;
            segments.push(segment);
        }
        let mut value = Vec::with_capacity(len);
        for segment in &segments {
            value.extend_from_slice(segment);
        }
        Ok(value)
    }

    fn read_into(&mut self, out: &mut Vec<u8>, mut n: usize) -> Result<(), DecodeError> {
        while n > 0 {
            let mut available = self.available_in_chunk();
            if available == 0 {
                self.refill()?;
                available = self.available_in_chunk();
            }
            let step = min(available, n);
            out.extend_from_slice(&self.source.chunk()[..step]);
            self.source.advance(step);
            n -= step;
        }
        Ok(())
    }

    /// Reads a packed repeated field: a length prefix bounding a run of
    /// values decoded back-to-back with `f` (for example
    /// [`read_int32`](Self::read_int32) or [`read_fixed64`](Self::read_fixed64)).
    ///
    /// The run must fill the declared length exactly; a fixed-width run whose
    /// length is not a multiple of the element size, or a trailing partial
    /// varint, is reported as truncation of the field.
    pub fn read_packed<T, F>(&mut self, mut f: F) -> Result<Vec<T>, DecodeError>
    where
        F: FnMut(&mut Self) -> Result<T, DecodeError>,
    {
        let len = self.read_length()?;
        let old_limit = self.push_limit(len)?;
        let mut values = Vec::new();
        let mut failure = None;
        while !self.reached_limit() {
            match f(self) {
                Ok(value) => values.push(value),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        self.pop_limit(old_limit);
        match failure {
            None => Ok(values),
            Some(err) => Err(err),
        }
    }

    // === Messages and groups ===

    /// Reads an embedded, length-prefixed message: the region is bounded to
    /// its declared length, `f` decodes the fields within it, and the region
    /// must be consumed exactly — stopping short is reported as truncation.
    ///
    /// The enclosing limit and the recursion depth are restored on every exit
    /// path, including errors.
    pub fn read_message<T, F>(&mut self, f: F) -> Result<T, DecodeError>
    where
        F: FnOnce(&mut Self) -> Result<T, DecodeError>,
    {
        let len = self.read_length()?;
        self.check_recursion()?;
        let old_limit = self.push_limit(len)?;
        self.recursion_depth += 1;
        let result = f(self);
        self.recursion_depth -= 1;
        let result = result.and_then(|value| {
            if self.reached_limit() {
                Ok(value)
            } else {
                Err(DecodeError::new(Truncated))
            }
        });
        self.pop_limit(old_limit);
        result
    }

    /// Reads a group whose start tag carried `field`. `f` decodes the
    /// group's fields and returns once it has read the end-group tag;
    /// `read_group` then verifies that tag's field number.
    ///
    /// An end-group tag for a different field number is a mismatched
    /// terminator; exhausting the input first is truncation.
    pub fn read_group<T, F>(&mut self, field: FieldNumber, f: F) -> Result<T, DecodeError>
    where
        F: FnOnce(&mut Self) -> Result<T, DecodeError>,
    {
        self.check_recursion()?;
        self.recursion_depth += 1;
        let result = f(self);
        self.recursion_depth -= 1;
        let value = result?;
        match self.last_tag {
            Some(tag) if tag.wire_type() == WireType::EndGroup => {
                if tag.field_number() == field {
                    Ok(value)
                } else {
                    Err(DecodeError::new(MismatchedEndGroup))
                }
            }
            _ => Err(DecodeError::new(Truncated)),
        }
    }

    // === Unknown fields ===

    /// Handles the most recently read field as unrecognized: skips it when
    /// the reader is configured to discard unknown fields, and otherwise
    /// preserves its wire bytes in `unknown`.
    pub fn handle_unknown_field(
        &mut self,
        unknown: &mut UnknownFieldSet,
    ) -> Result<(), DecodeError> {
        if self.discard_unknown_fields {
            self.skip_last_field()
        } else {
            self.preserve_last_field(unknown)
        }
    }

    /// Preserves the most recently read field — tag and value, nested groups
    /// included — into `unknown`, byte-for-byte re-encodable.
    pub fn preserve_last_field(
        &mut self,
        unknown: &mut UnknownFieldSet,
    ) -> Result<(), DecodeError> {
        let tag = self.last_tag.ok_or_else(|| DecodeError::new(Other))?;
        if tag.wire_type() == WireType::EndGroup {
            return Err(DecodeError::new(Other));
        }
        self.copy_field(tag, unknown.bytes_mut())
    }

    fn copy_field(&mut self, tag: Tag, out: &mut Vec<u8>) -> Result<(), DecodeError> {
        encode_varint(u64::from(tag.get()), out);
        match tag.wire_type() {
            WireType::Varint => {
                let value = self.read_raw_varint64()?;
                encode_varint(value, out);
            }
            WireType::SixtyFourBit => {
                let raw: [u8; 8] = self.read_raw_byte_array()?;
                out.extend_from_slice(&raw);
            }
            WireType::ThirtyTwoBit => {
                let raw: [u8; 4] = self.read_raw_byte_array()?;
                out.extend_from_slice(&raw);
            }
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                encode_varint(len as u64, out);
                let bytes = self.read_raw_bytes(len as usize)?;
                out.extend_from_slice(&bytes);
            }
            WireType::StartGroup => {
                self.read_group(tag.field_number(), |reader| loop {
                    match reader.read_tag()? {
                        None => return Ok(()), // read_group reports the truncation
                        Some(inner) if inner.wire_type() == WireType::EndGroup => {
                            encode_varint(u64::from(inner.get()), out);
                            return Ok(());
                        }
                        Some(inner) => reader.copy_field(inner, out)?,
                    }
                })?;
            }
            WireType::EndGroup => return Err(DecodeError::new(Other)),
        }
        Ok(())
    }

    // === Well-known wrapper fast paths ===

    /// Decodes a varint-valued wrapper message (`Int64Value`, `UInt64Value`,
    /// and friends), bypassing the general nested-message machinery when the
    /// whole wrapper is visible in the current window and minimally encoded.
    fn read_varint_wrapper(&mut self) -> Result<u64, DecodeError> {
        let chunk = self.chunk_within_limit();
        if let Some(&len_byte) = chunk.first() {
            if len_byte == 0 {
                // empty wrapper body: the default value
                self.source.advance(1);
                return Ok(0);
            }
            let len = len_byte as usize;
            // fast path: one length byte, the field-one varint tag, and a
            // terminated value varint, all in view
            if (2..=11).contains(&len) && chunk.len() > len && chunk[1] == 0x08 {
                let body = &chunk[2..=len];
                if let Some((&last, init)) = body.split_last() {
                    if last < 0x80 && init.iter().all(|&b| b >= 0x80) {
                        let mut value = 0u64;
                        for (i, &b) in body.iter().enumerate() {
                            value |= u64::from(b & 0x7F) << (7 * i);
                        }
                        self.source.advance(len + 1);
                        return Ok(value);
                    }
                }
            }
        }
        self.read_message(|reader| {
            let mut value = 0;
            while let Some(tag) = reader.read_tag()? {
                if tag.field_number().get() == 1 && tag.wire_type() == WireType::Varint {
                    value = reader.read_raw_varint64()?;
                } else {
                    reader.skip_last_field()?;
                }
            }
            Ok(value)
        })
    }

    fn read_fixed64_wrapper(&mut self) -> Result<u64, DecodeError> {
        let chunk = self.chunk_within_limit();
        if let Some(&len_byte) = chunk.first() {
            if len_byte == 0 {
                self.source.advance(1);
                return Ok(0);
            }
            if len_byte == 9 && chunk.len() >= 10 && chunk[1] == 0x09 {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&chunk[2..10]);
                self.source.advance(10);
                return Ok(u64::from_le_bytes(raw));
            }
        }
        self.read_message(|reader| {
            let mut value = 0;
            while let Some(tag) = reader.read_tag()? {
                if tag.field_number().get() == 1 && tag.wire_type() == WireType::SixtyFourBit {
                    value = reader.read_fixed64()?;
                } else {
                    reader.skip_last_field()?;
                }
            }
            Ok(value)
        })
    }

    fn read_fixed32_wrapper(&mut self) -> Result<u32, DecodeError> {
        let chunk = self.chunk_within_limit();
        if let Some(&len_byte) = chunk.first() {
            if len_byte == 0 {
                self.source.advance(1);
                return Ok(0);
            }
            if len_byte == 5 && chunk.len() >= 6 && chunk[1] == 0x0D {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&chunk[2..6]);
                self.source.advance(6);
                return Ok(u32::from_le_bytes(raw));
            }
        }
        self.read_message(|reader| {
            let mut value = 0;
            while let Some(tag) = reader.read_tag()? {
                if tag.field_number().get() == 1 && tag.wire_type() == WireType::ThirtyTwoBit {
                    value = reader.read_fixed32()?;
                } else {
                    reader.skip_last_field()?;
                }
            }
            Ok(value)
        })
    }

    /// Reads a `google.protobuf.Int32Value` message body.
    pub fn read_int32_wrapper(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_varint_wrapper()? as i32)
    }

    /// Reads a `google.protobuf.Int64Value` message body.
    pub fn read_int64_wrapper(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_varint_wrapper()? as i64)
    }

    /// Reads a `google.protobuf.UInt32Value` message body.
    pub fn read_uint32_wrapper(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read_varint_wrapper()? as u32)
    }

    /// Reads a `google.protobuf.UInt64Value` message body.
    pub fn read_uint64_wrapper(&mut self) -> Result<u64, DecodeError> {
        self.read_varint_wrapper()
    }

    /// Reads a `google.protobuf.BoolValue` message body.
    pub fn read_bool_wrapper(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_varint_wrapper()? != 0)
    }

    /// Reads a `google.protobuf.FloatValue` message body.
    pub fn read_float_wrapper(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_fixed32_wrapper()?))
    }

    /// Reads a `google.protobuf.DoubleValue` message body.
    pub fn read_double_wrapper(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_fixed64_wrapper()?))
    }

    /// Reads a `google.protobuf.StringValue` message body.
    pub fn read_string_wrapper(&mut self) -> Result<String, DecodeError> {
        self.read_message(|reader| {
            let mut value = String::new();
            while let Some(tag) = reader.read_tag()? {
                if tag.field_number().get() == 1 && tag.wire_type() == WireType::LengthDelimited {
                    value = reader.read_string()?;
                } else {
                    reader.skip_last_field()?;
                }
            }
            Ok(value)
        })
    }

    /// Reads a `google.protobuf.BytesValue` message body.
    pub fn read_bytes_wrapper(&mut self) -> Result<Vec<u8>, DecodeError> {
        self.read_message(|reader| {
            let mut value = Vec::new();
            while let Some(tag) = reader.read_tag()? {
                if tag.field_number().get() == 1 && tag.wire_type() == WireType::LengthDelimited {
                    value = reader.read_bytes()?;
                } else {
                    reader.skip_last_field()?;
                }
            }
            Ok(value)
        })
    }
}
