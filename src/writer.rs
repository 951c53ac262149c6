//! The encoding engine: [`CodedWriter`] and its output sinks.

use bytes::BufMut;

use crate::encoding::{
    encode_fixed32, encode_fixed64, encode_varint, encoded_len_varint, i32_to_unsigned,
    i64_to_unsigned, FieldNumber, Tag, WireType,
};
use crate::unknown::UnknownFieldSet;
use crate::EncodeError;

/// A push-based consumer of output bytes.
///
/// The two in-tree sinks differ only in their failure mode: a [`BufSink`]
/// fails with [`EncodeError`] when a fixed-capacity buffer runs out of space,
/// while an [`IoSink`] surfaces the underlying `std::io::Error`.
pub trait Sink {
    /// The error produced when bytes cannot be accepted.
    type Error;

    /// Appends `bytes` to the output.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Pushes any internally buffered bytes through to the final destination.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A sink writing into any [`BufMut`].
///
/// Every write is checked against the buffer's remaining capacity, so a full
/// fixed-capacity buffer (such as `&mut [u8]`) reports an error rather than
/// panicking; growable buffers never fail.
pub struct BufSink<B> {
    buf: B,
}

impl<B: BufMut> BufSink<B> {
    /// Creates a sink writing into `buf`.
    pub fn new(buf: B) -> Self {
        BufSink { buf }
    }

    /// Consumes the sink, returning the underlying buffer.
    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: BufMut> Sink for BufSink<B> {
    type Error = EncodeError;

    #[inline]
    fn write(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let remaining = self.buf.remaining_mut();
        if bytes.len() > remaining {
            return Err(EncodeError::new(bytes.len(), remaining));
        }
        self.buf.put_slice(bytes);
        Ok(())
    }
}

/// A sink writing into a [`std::io::Write`] stream through an internal
/// buffer (4096 bytes).
///
/// The buffer must be flushed — via [`CodedWriter::flush`] or
/// [`IoSink::into_inner`] — before the output is complete.
#[cfg(feature = "std")]
pub struct IoSink<W> {
    writer: W,
    buffer: alloc::vec::Vec<u8>,
}

#[cfg(feature = "std")]
impl<W: std::io::Write> IoSink<W> {
    /// Creates a sink writing into `writer`.
    pub fn new(writer: W) -> Self {
        IoSink {
            writer,
            buffer: alloc::vec::Vec::with_capacity(crate::DEFAULT_BUFFER_CAPACITY),
        }
    }

    fn flush_buffered(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flushes buffered bytes and returns the underlying writer.
    pub fn into_inner(mut self) -> std::io::Result<W> {
        self.flush_buffered()?;
        Ok(self.writer)
    }
}

#[cfg(feature = "std")]
impl<W: std::io::Write> Sink for IoSink<W> {
    type Error = std::io::Error;

    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if self.buffer.len() + bytes.len() > self.buffer.capacity() {
            self.flush_buffered()?;
        }
        if bytes.len() >= self.buffer.capacity() {
            self.writer.write_all(bytes)
        } else {
            self.buffer.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_buffered()?;
        self.writer.flush()
    }
}

/// A streaming wire-format serializer, the mirror image of
/// [`CodedReader`](crate::CodedReader).
///
/// A writer owns the state of one serialize call. It tracks the total bytes
/// written; capacity and I/O failures surface through the sink's error type.
pub struct CodedWriter<S> {
    sink: S,
    written: u64,
}

impl<B: BufMut> CodedWriter<BufSink<B>> {
    /// Creates a writer over any [`BufMut`], including `Vec<u8>`,
    /// `bytes::BytesMut`, and fixed-capacity `&mut [u8]` slices.
    pub fn from_buf(buf: B) -> Self {
        Self::new(BufSink::new(buf))
    }
}

#[cfg(feature = "std")]
impl<W: std::io::Write> CodedWriter<IoSink<W>> {
    /// Creates a writer over a byte stream, buffering writes internally.
    pub fn from_write(writer: W) -> Self {
        Self::new(IoSink::new(writer))
    }
}

impl<S: Sink> CodedWriter<S> {
    /// Creates a writer over the given sink.
    pub fn new(sink: S) -> Self {
        CodedWriter { sink, written: 0 }
    }

    /// Returns the total number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Pushes any internally buffered bytes through to the sink's final
    /// destination.
    pub fn flush(&mut self) -> Result<(), S::Error> {
        self.sink.flush()
    }

    /// Consumes the writer, returning its sink. Stream-backed sinks still
    /// need their own `into_inner` (or a prior [`flush`](Self::flush)) to
    /// drain the internal buffer.
    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_raw_bytes(&mut self, bytes: &[u8]) -> Result<(), S::Error> {
        self.sink.write(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Writes one varint of up to ten bytes.
    pub fn write_raw_varint64(&mut self, value: u64) -> Result<(), S::Error> {
        let mut scratch = [0u8; 10];
        let mut rest = &mut scratch[..];
        encode_varint(value, &mut rest);
        let len = 10 - rest.len();
        self.write_raw_bytes(&scratch[..len])
    }

    /// Writes one varint of up to five bytes.
    pub fn write_raw_varint32(&mut self, value: u32) -> Result<(), S::Error> {
        self.write_raw_varint64(u64::from(value))
    }

    /// Writes a field key for `field` with the given wire type.
    pub fn write_tag(&mut self, field: FieldNumber, wire_type: WireType) -> Result<(), S::Error> {
        self.write_raw_varint32(Tag::new(field, wire_type).get())
    }

    /// Writes a start-group tag.
    pub fn start_group(&mut self, field: FieldNumber) -> Result<(), S::Error> {
        self.write_tag(field, WireType::StartGroup)
    }

    /// Writes an end-group tag.
    pub fn end_group(&mut self, field: FieldNumber) -> Result<(), S::Error> {
        self.write_tag(field, WireType::EndGroup)
    }

    /// Writes an `int32` field value. Negative values sign-extend to ten
    /// bytes, as the format requires.
    pub fn write_int32(&mut self, value: i32) -> Result<(), S::Error> {
        self.write_raw_varint64(i64::from(value) as u64)
    }

    /// Writes an `int64` field value.
    pub fn write_int64(&mut self, value: i64) -> Result<(), S::Error> {
        self.write_raw_varint64(value as u64)
    }

    /// Writes a `uint32` field value.
    pub fn write_uint32(&mut self, value: u32) -> Result<(), S::Error> {
        self.write_raw_varint32(value)
    }

    /// Writes a `uint64` field value.
    pub fn write_uint64(&mut self, value: u64) -> Result<(), S::Error> {
        self.write_raw_varint64(value)
    }

    /// Writes an `sint32` (zigzag) field value.
    pub fn write_sint32(&mut self, value: i32) -> Result<(), S::Error> {
        self.write_raw_varint32(i32_to_unsigned(value))
    }

    /// Writes an `sint64` (zigzag) field value.
    pub fn write_sint64(&mut self, value: i64) -> Result<(), S::Error> {
        self.write_raw_varint64(i64_to_unsigned(value))
    }

    /// Writes a `bool` field value.
    pub fn write_bool(&mut self, value: bool) -> Result<(), S::Error> {
        self.write_raw_bytes(&[u8::from(value)])
    }

    /// Writes an enum field's raw value.
    pub fn write_enum_value(&mut self, value: i32) -> Result<(), S::Error> {
        self.write_int32(value)
    }

    /// Writes a `fixed32` field value.
    pub fn write_fixed32(&mut self, value: u32) -> Result<(), S::Error> {
        let mut scratch = [0u8; 4];
        let mut rest = &mut scratch[..];
        encode_fixed32(value, &mut rest);
        self.write_raw_bytes(&scratch)
    }

    /// Writes a `fixed64` field value.
    pub fn write_fixed64(&mut self, value: u64) -> Result<(), S::Error> {
        let mut scratch = [0u8; 8];
        let mut rest = &mut scratch[..];
        encode_fixed64(value, &mut rest);
        self.write_raw_bytes(&scratch)
    }

    /// Writes an `sfixed32` field value.
    pub fn write_sfixed32(&mut self, value: i32) -> Result<(), S::Error> {
        self.write_fixed32(value as u32)
    }

    /// Writes an `sfixed64` field value.
    pub fn write_sfixed64(&mut self, value: i64) -> Result<(), S::Error> {
        self.write_fixed64(value as u64)
    }

    /// Writes a `float` field value, bit-exactly.
    pub fn write_float(&mut self, value: f32) -> Result<(), S::Error> {
        self.write_fixed32(value.to_bits())
    }

    /// Writes a `double` field value, bit-exactly.
    pub fn write_double(&mut self, value: f64) -> Result<(), S::Error> {
        self.write_fixed64(value.to_bits())
    }

    /// Writes a length prefix. Lengths above `i32::MAX` are not encodable.
    pub fn write_length(&mut self, length: usize) -> Result<(), S::Error> {
        debug_assert!(length <= i32::MAX as usize);
        self.write_raw_varint64(length as u64)
    }

    /// Writes a `bytes` field value: a length prefix followed by the bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), S::Error> {
        self.write_length(value.len())?;
        self.write_raw_bytes(value)
    }

    /// Writes a `string` field value.
    pub fn write_string(&mut self, value: &str) -> Result<(), S::Error> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a packed run of varints: a length prefix followed by the
    /// values back-to-back, with no per-element tags.
    pub fn write_packed_varint64(&mut self, values: &[u64]) -> Result<(), S::Error> {
        let len: usize = values.iter().map(|&value| encoded_len_varint(value)).sum();
        self.write_length(len)?;
        for &value in values {
            self.write_raw_varint64(value)?;
        }
        Ok(())
    }

    /// Writes a packed run of `fixed32` values.
    pub fn write_packed_fixed32(&mut self, values: &[u32]) -> Result<(), S::Error> {
        self.write_length(values.len() * 4)?;
        for &value in values {
            self.write_fixed32(value)?;
        }
        Ok(())
    }

    /// Writes a packed run of `fixed64` values.
    pub fn write_packed_fixed64(&mut self, values: &[u64]) -> Result<(), S::Error> {
        self.write_length(values.len() * 8)?;
        for &value in values {
            self.write_fixed64(value)?;
        }
        Ok(())
    }

    /// Re-emits a preserved set of unknown fields.
    pub fn write_unknown_fields(&mut self, unknown: &UnknownFieldSet) -> Result<(), S::Error> {
        self.write_raw_bytes(unknown.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use alloc::string::String;
    use alloc::vec::Vec;

    use bytes::Buf;
    use proptest::prelude::*;

    use crate::encoding::encoded_len_varint;
    use crate::reader::CodedReader;
    use crate::source::Source;
    use crate::DecodeError;

    fn field(n: u32) -> FieldNumber {
        FieldNumber::new(n).unwrap()
    }

    #[test]
    fn writes_single_varint_field() {
        let mut buf = Vec::new();
        let mut writer = CodedWriter::from_buf(&mut buf);
        writer.write_tag(field(1), WireType::Varint).unwrap();
        writer.write_int32(300).unwrap();
        assert_eq!(writer.bytes_written(), 3);
        assert_eq!(buf, [0x08, 0xAC, 0x02]);
    }

    #[test]
    fn empty_string_is_tag_and_zero_length() {
        let mut buf = Vec::new();
        let mut writer = CodedWriter::from_buf(&mut buf);
        writer.write_tag(field(1), WireType::LengthDelimited).unwrap();
        writer.write_string("").unwrap();
        assert_eq!(buf, [0x0A, 0x00]);
    }

    #[test]
    fn fixed_capacity_buffer_reports_out_of_space() {
        let mut storage = [0u8; 1];
        let mut writer = CodedWriter::from_buf(&mut storage[..]);
        let err = writer.write_int32(300).unwrap_err();
        assert_eq!(err.required_capacity(), 2);
        assert_eq!(err.remaining(), 1);

        let mut storage = [0u8; 4];
        let mut writer = CodedWriter::from_buf(&mut storage[..]);
        writer.write_tag(field(1), WireType::Varint).unwrap();
        writer.write_int32(300).unwrap();
        let err = writer.write_int32(300).unwrap_err();
        assert_eq!(err.required_capacity(), 2);
        assert_eq!(err.remaining(), 1);
        assert_eq!(writer.bytes_written(), 3);
    }

    #[test]
    fn negative_int32_sign_extends_to_ten_bytes() {
        let mut buf = Vec::new();
        let mut writer = CodedWriter::from_buf(&mut buf);
        writer.write_int32(-1).unwrap();
        assert_eq!(
            buf,
            [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01],
        );
    }

    #[test]
    fn groups_round_trip() {
        let mut buf = Vec::new();
        let mut writer = CodedWriter::from_buf(&mut buf);
        writer.start_group(field(3)).unwrap();
        writer.write_tag(field(1), WireType::Varint).unwrap();
        writer.write_uint64(7).unwrap();
        writer.end_group(field(3)).unwrap();

        let mut reader = CodedReader::from_slice(&buf);
        let start = reader.read_tag().unwrap().unwrap();
        assert_eq!(start.wire_type(), WireType::StartGroup);
        let value = reader
            .read_group(start.field_number(), |reader| {
                let mut value = 0;
                while let Some(tag) = reader.read_tag()? {
                    if tag.wire_type() == WireType::EndGroup {
                        break;
                    }
                    value = reader.read_uint64()?;
                }
                Ok(value)
            })
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn length_prefixed_message_round_trips() {
        // encode the payload first so its length prefix can be exact
        let mut payload = Vec::new();
        let mut writer = CodedWriter::from_buf(&mut payload);
        writer.write_tag(field(1), WireType::Varint).unwrap();
        writer.write_int32(150).unwrap();

        let mut buf = Vec::new();
        let mut writer = CodedWriter::from_buf(&mut buf);
        writer.write_tag(field(2), WireType::LengthDelimited).unwrap();
        writer.write_length(payload.len()).unwrap();
        writer.write_raw_bytes(&payload).unwrap();

        let mut reader = CodedReader::from_slice(&buf);
        reader.read_tag().unwrap().unwrap();
        let value = reader
            .read_message(|reader| {
                let mut value = 0;
                while let Some(tag) = reader.read_tag()? {
                    if tag.field_number().get() == 1 && tag.wire_type() == WireType::Varint {
                        value = reader.read_int32()?;
                    } else {
                        reader.skip_last_field()?;
                    }
                }
                Ok(value)
            })
            .unwrap();
        assert_eq!(value, 150);
    }

    #[test]
    fn packed_fields_round_trip() {
        let mut buf = Vec::new();
        let mut writer = CodedWriter::from_buf(&mut buf);
        writer.write_packed_varint64(&[3, 270, 86942]).unwrap();
        assert_eq!(buf, [0x06, 0x03, 0x8E, 0x02, 0x9E, 0xA7, 0x05]);

        let mut reader = CodedReader::from_slice(&buf);
        let values = reader.read_packed(|reader| reader.read_uint64()).unwrap();
        assert_eq!(values, [3, 270, 86942]);

        let mut buf = Vec::new();
        let mut writer = CodedWriter::from_buf(&mut buf);
        writer.write_packed_fixed32(&[1, u32::MAX]).unwrap();
        writer.write_packed_fixed64(&[2, u64::MAX]).unwrap();

        let mut reader = CodedReader::from_slice(&buf);
        let fixed32s = reader.read_packed(|reader| reader.read_fixed32()).unwrap();
        assert_eq!(fixed32s, [1, u32::MAX]);
        let fixed64s = reader.read_packed(|reader| reader.read_fixed64()).unwrap();
        assert_eq!(fixed64s, [2, u64::MAX]);
        assert!(reader.is_at_end().unwrap());
    }

    #[cfg(feature = "std")]
    #[test]
    fn stream_sink_buffers_and_flushes() {
        let mut writer = CodedWriter::from_write(Vec::new());
        writer.write_tag(field(1), WireType::Varint).unwrap();
        writer.write_uint64(u64::MAX).unwrap();
        let out = writer.into_inner().into_inner().unwrap();
        assert_eq!(out.len(), 11);
        assert_eq!(out[0], 0x08);
    }

    /// One field of every scalar kind; floats are compared by bit pattern.
    #[derive(Clone, Debug, Default, PartialEq)]
    struct ScalarValues {
        int32: i32,
        int64: i64,
        uint32: u32,
        uint64: u64,
        sint32: i32,
        sint64: i64,
        boolean: bool,
        fixed32: u32,
        fixed64: u64,
        sfixed32: i32,
        sfixed64: i64,
        float_bits: u32,
        double_bits: u64,
        string: String,
        bytes_value: Vec<u8>,
    }

    fn decode_all<S: Source>(reader: &mut CodedReader<S>) -> Result<ScalarValues, DecodeError> {
        let mut out = ScalarValues::default();
        while let Some(tag) = reader.read_tag()? {
            match tag.field_number().get() {
                1 => out.int32 = reader.read_int32()?,
                2 => out.int64 = reader.read_int64()?,
                3 => out.uint32 = reader.read_uint32()?,
                4 => out.uint64 = reader.read_uint64()?,
                5 => out.sint32 = reader.read_sint32()?,
                6 => out.sint64 = reader.read_sint64()?,
                7 => out.boolean = reader.read_bool()?,
                8 => out.fixed32 = reader.read_fixed32()?,
                9 => out.fixed64 = reader.read_fixed64()?,
                10 => out.sfixed32 = reader.read_sfixed32()?,
                11 => out.sfixed64 = reader.read_sfixed64()?,
                12 => out.float_bits = reader.read_float()?.to_bits(),
                13 => out.double_bits = reader.read_double()?.to_bits(),
                14 => out.string = reader.read_string()?,
                15 => out.bytes_value = reader.read_bytes()?,
                _ => reader.skip_last_field()?,
            }
        }
        Ok(out)
    }

    /// Decodes `buf` over every source kind and checks the result.
    fn check_round_trip(buf: &[u8], expected: &ScalarValues) {
        // contiguous
        let mut reader = CodedReader::from_slice(buf);
        assert_eq!(&decode_all(&mut reader).unwrap(), expected);

        // segmented in two
        let (front, back) = buf.split_at(buf.len() / 2);
        let mut reader = CodedReader::from_buf(front.chain(back));
        assert_eq!(&decode_all(&mut reader).unwrap(), expected);

        // streamed with a tiny refill buffer
        #[cfg(feature = "std")]
        {
            let mut reader =
                CodedReader::from_read_with_capacity(3, std::io::Cursor::new(buf.to_vec()));
            assert_eq!(&decode_all(&mut reader).unwrap(), expected);
        }
    }

    proptest! {
        #[test]
        fn varint_scalars_round_trip(
            int32: i32,
            int64: i64,
            uint32: u32,
            uint64: u64,
            sint32: i32,
            sint64: i64,
            boolean: bool,
        ) {
            let mut buf = Vec::new();
            let mut writer = CodedWriter::from_buf(&mut buf);
            writer.write_tag(field(1), WireType::Varint).unwrap();
            writer.write_int32(int32).unwrap();
            writer.write_tag(field(2), WireType::Varint).unwrap();
            writer.write_int64(int64).unwrap();
            writer.write_tag(field(3), WireType::Varint).unwrap();
            writer.write_uint32(uint32).unwrap();
            writer.write_tag(field(4), WireType::Varint).unwrap();
            writer.write_uint64(uint64).unwrap();
            writer.write_tag(field(5), WireType::Varint).unwrap();
            writer.write_sint32(sint32).unwrap();
            writer.write_tag(field(6), WireType::Varint).unwrap();
            writer.write_sint64(sint64).unwrap();
            writer.write_tag(field(7), WireType::Varint).unwrap();
            writer.write_bool(boolean).unwrap();
            prop_assert_eq!(writer.bytes_written() as usize, buf.len());

            let expected = ScalarValues {
                int32,
                int64,
                uint32,
                uint64,
                sint32,
                sint64,
                boolean,
                ..Default::default()
            };
            check_round_trip(&buf, &expected);
        }

        #[test]
        fn fixed_and_length_delimited_round_trip(
            fixed32: u32,
            fixed64: u64,
            sfixed32: i32,
            sfixed64: i64,
            float: f32,
            double: f64,
            string in "\\PC*",
            bytes_value: Vec<u8>,
        ) {
            let mut buf = Vec::new();
            let mut writer = CodedWriter::from_buf(&mut buf);
            writer.write_tag(field(8), WireType::ThirtyTwoBit).unwrap();
            writer.write_fixed32(fixed32).unwrap();
            writer.write_tag(field(9), WireType::SixtyFourBit).unwrap();
            writer.write_fixed64(fixed64).unwrap();
            writer.write_tag(field(10), WireType::ThirtyTwoBit).unwrap();
            writer.write_sfixed32(sfixed32).unwrap();
            writer.write_tag(field(11), WireType::SixtyFourBit).unwrap();
            writer.write_sfixed64(sfixed64).unwrap();
            writer.write_tag(field(12), WireType::ThirtyTwoBit).unwrap();
            writer.write_float(float).unwrap();
            writer.write_tag(field(13), WireType::SixtyFourBit).unwrap();
            writer.write_double(double).unwrap();
            writer.write_tag(field(14), WireType::LengthDelimited).unwrap();
            writer.write_string(&string).unwrap();
            writer.write_tag(field(15), WireType::LengthDelimited).unwrap();
            writer.write_bytes(&bytes_value).unwrap();
            prop_assert_eq!(writer.bytes_written() as usize, buf.len());

            let expected = ScalarValues {
                fixed32,
                fixed64,
                sfixed32,
                sfixed64,
                float_bits: float.to_bits(),
                double_bits: double.to_bits(),
                string,
                bytes_value,
                ..Default::default()
            };
            check_round_trip(&buf, &expected);
        }

        #[test]
        fn varint_lengths_match(value: u64) {
            let mut buf = Vec::new();
            let mut writer = CodedWriter::from_buf(&mut buf);
            writer.write_raw_varint64(value).unwrap();
            prop_assert_eq!(buf.len(), encoded_len_varint(value));
        }
    }
}
