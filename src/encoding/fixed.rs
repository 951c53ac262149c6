use bytes::{Buf, BufMut};

use crate::DecodeError;
use crate::DecodeErrorKind::Truncated;

/// Writes a 32-bit value as four little-endian bytes. The buffer must have at
/// least four bytes of remaining space.
#[inline]
pub fn encode_fixed32<B: BufMut + ?Sized>(value: u32, buf: &mut B) {
    buf.put_u32_le(value);
}

/// Writes a 64-bit value as eight little-endian bytes. The buffer must have
/// at least eight bytes of remaining space.
#[inline]
pub fn encode_fixed64<B: BufMut + ?Sized>(value: u64, buf: &mut B) {
    buf.put_u64_le(value);
}

/// Reads four little-endian bytes as a 32-bit value.
#[inline]
pub fn decode_fixed32<B: Buf + ?Sized>(buf: &mut B) -> Result<u32, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::new(Truncated));
    }
    Ok(buf.get_u32_le())
}

/// Reads eight little-endian bytes as a 64-bit value.
#[inline]
pub fn decode_fixed64<B: Buf + ?Sized>(buf: &mut B) -> Result<u64, DecodeError> {
    if buf.remaining() < 8 {
        return Err(DecodeError::new(Truncated));
    }
    Ok(buf.get_u64_le())
}
