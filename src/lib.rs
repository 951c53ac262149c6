#![no_std]
#![doc = include_str!("../README.md")]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

/// Re-export of the bytes crate for use with buffer-backed readers and
/// writers.
pub use bytes;

mod error;
mod unknown;

pub mod encoding;
pub mod reader;
pub mod source;
pub mod writer;

pub use crate::encoding::{FieldNumber, Tag, WireType};
pub use crate::error::{DecodeError, DecodeErrorKind, EncodeError};
pub use crate::reader::{CodedReader, Limit};
pub use crate::unknown::UnknownFieldSet;
pub use crate::writer::CodedWriter;

use bytes::{Buf, BufMut};

use crate::encoding::{decode_varint, encode_varint, encoded_len_varint};

/// Maximum nesting depth of embedded messages and groups during one parse.
/// 100 is the default recursion limit in the C++ implementation.
pub(crate) const RECURSION_LIMIT: u32 = 100;

/// Maximum total bytes one parse will consume from its source by default.
pub(crate) const DEFAULT_SIZE_LIMIT: u64 = i32::MAX as u64;

/// Default capacity of the refill buffer for stream-backed sources and the
/// staging buffer for stream-backed sinks, and the segment size used when
/// assembling large length-delimited values.
pub(crate) const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Encodes a length delimiter to the buffer.
///
/// An error will be returned if the buffer does not have sufficient capacity
/// to encode the delimiter.
#[inline]
pub fn encode_length_delimiter<B>(length: usize, buf: &mut B) -> Result<(), EncodeError>
where
    B: BufMut,
{
    let length = length as u64;
    let required = encoded_len_varint(length);
    let remaining = buf.remaining_mut();
    if required > remaining {
        return Err(EncodeError::new(required, remaining));
    }
    encode_varint(length, buf);
    Ok(())
}

/// Returns the encoded length of a length delimiter.
///
/// Applications may use this method to ensure sufficient buffer capacity
/// before calling `encode_length_delimiter`. The returned size will be
/// between 1 and 5, inclusive.
#[inline(always)]
pub fn length_delimiter_len(length: usize) -> usize {
    encoded_len_varint(length as u64)
}

/// Decodes a length delimiter from the buffer.
///
/// This method allows the length delimiter to be decoded independently of
/// the message, when the message is prefixed by its encoded length.
///
/// An error may be returned in two cases:
///
///  * If the supplied buffer ends mid-delimiter, then an error indicates
///    that more input is required to decode the full delimiter.
///  * If the decoded value does not fit a 32-bit signed length, then the
///    buffer contains an invalid delimiter and should be considered corrupt.
#[inline(always)]
pub fn decode_length_delimiter<B: Buf>(mut buf: B) -> Result<usize, DecodeError> {
    let length = decode_varint(&mut buf)?;
    if length > DEFAULT_SIZE_LIMIT {
        return Err(DecodeError::new(DecodeErrorKind::NegativeSize));
    }
    Ok(length as usize)
}
