use bytes::{Buf, BufMut};

use crate::DecodeError;
use crate::DecodeErrorKind::{MalformedVarint, Truncated};

/// Encodes an integer value into LEB128 variable length format, and writes it
/// to the buffer. The buffer must have enough remaining space (maximum 10
/// bytes).
#[inline]
pub fn encode_varint<B: BufMut + ?Sized>(mut value: u64, buf: &mut B) {
    loop {
        if value < 0x80 {
            buf.put_u8(value as u8);
            break;
        } else {
            buf.put_u8(((value & 0x7F) | 0x80) as u8);
            value >>= 7;
        }
    }
}

/// Returns the encoded length of the value in LEB128 variable length format.
/// The returned value will be between 1 and 10, inclusive.
#[inline]
pub fn encoded_len_varint(value: u64) -> usize {
    // Each byte carries 7 bits, so the width is the bit length divided by 7,
    // rounded up; computed branch-free from the base-2 log.
    ((((value | 1).leading_zeros() ^ 63) * 9 + 73) / 64) as usize
}

/// Decodes a LEB128-encoded variable length integer from the buffer.
#[inline]
pub fn decode_varint<B: Buf + ?Sized>(buf: &mut B) -> Result<u64, DecodeError> {
    let bytes = buf.chunk();
    let len = bytes.len();
    if len == 0 {
        return Err(DecodeError::new(Truncated));
    }

    let byte = bytes[0];
    if byte < 0x80 {
        buf.advance(1);
        Ok(u64::from(byte))
    } else if len >= 10 || bytes[len - 1] < 0x80 {
        let (value, advance) = decode_varint_slice(bytes)?;
        buf.advance(advance);
        Ok(value)
    } else {
        decode_varint_slow(buf)
    }
}

/// Decodes a LEB128-encoded variable length integer from the slice, returning
/// the value and the number of bytes read.
///
/// Based loosely on [`ReadVarint64FromArray`][1] with a varint termination
/// check from [`ConsumeVarint`][2].
///
/// ## Safety
///
/// The caller must ensure that `bytes` is non-empty and either
/// `bytes.len() >= 10` or the last element in bytes is < `0x80`.
///
/// [1]: https://github.com/google/protobuf/blob/3.3.x/src/google/protobuf/io/coded_stream.cc#L365-L406
/// [2]: https://github.com/protocolbuffers/protobuf-go/blob/v1.27.1/encoding/protowire/wire.go#L358
#[inline]
pub(crate) fn decode_varint_slice(bytes: &[u8]) -> Result<(u64, usize), DecodeError> {
    // Fully unrolled varint decoding loop. Splitting into 32-bit pieces gives
    // better performance.

    // Use assertions to ensure memory safety, but it should always be
    // optimized after inline.
    assert!(!bytes.is_empty());
    // If the varint is 10 bytes long, the tenth byte may have its MSB set and
    // is rejected below instead.
    assert!(bytes.len() >= 10 || bytes[bytes.len() - 1] < 0x80);

    let mut b: u8 = unsafe { *bytes.get_unchecked(0) };
    let mut part0: u32 = u32::from(b & 0x7F);
    if b < 0x80 {
        return Ok((u64::from(part0), 1));
    };
    b = unsafe { *bytes.get_unchecked(1) };
    part0 |= u32::from(b & 0x7F) << 7;
    if b < 0x80 {
        return Ok((u64::from(part0), 2));
    };
    b = unsafe { *bytes.get_unchecked(2) };
    part0 |= u32::from(b & 0x7F) << 14;
    if b < 0x80 {
        return Ok((u64::from(part0), 3));
    };
    b = unsafe { *bytes.get_unchecked(3) };
    part0 |= u32::from(b & 0x7F) << 21;
    if b < 0x80 {
        return Ok((u64::from(part0), 4));
    };
    let value = u64::from(part0);

    b = unsafe { *bytes.get_unchecked(4) };
    let mut part1: u32 = u32::from(b & 0x7F);
    if b < 0x80 {
        return Ok((value | (u64::from(part1) << 28), 5));
    };
    b = unsafe { *bytes.get_unchecked(5) };
    part1 |= u32::from(b & 0x7F) << 7;
    if b < 0x80 {
        return Ok((value | (u64::from(part1) << 28), 6));
    };
    b = unsafe { *bytes.get_unchecked(6) };
    part1 |= u32::from(b & 0x7F) << 14;
    if b < 0x80 {
        return Ok((value | (u64::from(part1) << 28), 7));
    };
    b = unsafe { *bytes.get_unchecked(7) };
    part1 |= u32::from(b & 0x7F) << 21;
    if b < 0x80 {
        return Ok((value | (u64::from(part1) << 28), 8));
    };
    let value = value | (u64::from(part1) << 28);

    b = unsafe { *bytes.get_unchecked(8) };
    if b < 0x80 {
        return Ok((value | (u64::from(b) << 56), 9));
    }
    let value = value | (u64::from(b & 0x7F) << 56);

    b = unsafe { *bytes.get_unchecked(9) };
    if b >= 0x80 {
        // Ten continuation bytes never terminate a valid encoding.
        return Err(DecodeError::new(MalformedVarint));
    }
    // Bits of the tenth byte above bit 63 are discarded; over-long encodings
    // of small values are tolerated, matching the reference implementations.
    Ok((value | (u64::from(b) << 63), 10))
}

/// Decodes a LEB128-encoded variable length integer from the buffer,
/// advancing the buffer as necessary.
#[inline(never)]
#[cold]
pub(super) fn decode_varint_slow<B: Buf + ?Sized>(buf: &mut B) -> Result<u64, DecodeError> {
    let mut value = 0;
    for count in 0..core::cmp::min(10, buf.remaining()) {
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << (count * 7);
        if byte < 0x80 {
            return Ok(value);
        }
    }
    // We only reach here if every byte so far had its high bit set. We've
    // either reached the end of the buffer or the tenth byte; the former is a
    // truncated varint, the latter a malformed one.
    if buf.has_remaining() {
        Err(DecodeError::new(MalformedVarint))
    } else {
        Err(DecodeError::new(Truncated))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use alloc::vec::Vec;

    use proptest::prelude::*;

    use crate::DecodeErrorKind;

    fn check(value: u64, mut encoded: &[u8]) {
        // Small buffer.
        let mut buf = Vec::with_capacity(1);
        encode_varint(value, &mut buf);
        assert_eq!(buf, encoded);

        // Large buffer.
        let mut buf = Vec::with_capacity(100);
        encode_varint(value, &mut buf);
        assert_eq!(buf, encoded);

        assert_eq!(encoded_len_varint(value), encoded.len());

        let roundtrip_value = decode_varint(&mut <&[u8]>::clone(&encoded)).expect("decoding failed");
        assert_eq!(value, roundtrip_value);

        let roundtrip_value = decode_varint_slow(&mut encoded).expect("slow decoding failed");
        assert_eq!(value, roundtrip_value);
    }

    #[test]
    fn varint() {
        check(0, &[0x00]);
        check(1, &[0x01]);
        check(127, &[0x7F]);
        check(128, &[0x80, 0x01]);
        check(300, &[0xAC, 0x02]);
        check(2u64.pow(14) - 1, &[0xFF, 0x7F]);
        check(2u64.pow(14), &[0x80, 0x80, 0x01]);
        check(2u64.pow(21) - 1, &[0xFF, 0xFF, 0x7F]);
        check(2u64.pow(21), &[0x80, 0x80, 0x80, 0x01]);
        check(2u64.pow(28) - 1, &[0xFF, 0xFF, 0xFF, 0x7F]);
        check(2u64.pow(28), &[0x80, 0x80, 0x80, 0x80, 0x01]);
        check(
            u64::from(u32::MAX >> 1), // i32::MAX: five bytes
            &[0xFF, 0xFF, 0xFF, 0xFF, 0x07],
        );
        check(u64::from(u32::MAX), &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        check(2u64.pow(35) - 1, &[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        check(2u64.pow(35), &[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        check(2u64.pow(42) - 1, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        check(2u64.pow(49) - 1, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        check(
            2u64.pow(56) - 1,
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F],
        );
        check(
            2u64.pow(63) - 1, // nine bytes: 63 significant bits
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F],
        );
        check(
            2u64.pow(63),
            &[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01],
        );
        check(
            u64::MAX, // also -1 as a sign-extended 64-bit value: ten bytes
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01],
        );
    }

    #[test]
    fn varint_over_long_encodings_are_tolerated() {
        // Zero, encoded with redundant continuation bytes.
        let mut over_long: &[u8] = &[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00];
        assert_eq!(decode_varint(&mut over_long).unwrap(), 0);

        // One, with bits of the tenth byte beyond bit 63 set; they fall off.
        let mut over_bits: &[u8] = &[0x81, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7E];
        assert_eq!(decode_varint(&mut over_bits).unwrap(), 1);
        let mut over_bits: &[u8] = &[0x81, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7E];
        assert_eq!(decode_varint_slow(&mut over_bits).unwrap(), 1);
    }

    #[test]
    fn varint_malformed() {
        // Eleven bytes of continuation: rejected at the tenth.
        let malformed: &[u8] = &[0xFF; 11];
        assert_eq!(
            decode_varint(&mut <&[u8]>::clone(&malformed)).unwrap_err().kind(),
            DecodeErrorKind::MalformedVarint,
        );
        assert_eq!(
            decode_varint_slow(&mut <&[u8]>::clone(&malformed)).unwrap_err().kind(),
            DecodeErrorKind::MalformedVarint,
        );
    }

    #[test]
    fn varint_truncated() {
        for len in 1..10 {
            let truncated = &[0xFFu8; 10][..len];
            assert_eq!(
                decode_varint(&mut <&[u8]>::clone(&truncated)).unwrap_err().kind(),
                DecodeErrorKind::Truncated,
            );
            assert_eq!(
                decode_varint_slow(&mut <&[u8]>::clone(&truncated)).unwrap_err().kind(),
                DecodeErrorKind::Truncated,
            );
        }

        let mut empty: &[u8] = &[];
        assert_eq!(
            decode_varint(&mut empty).unwrap_err().kind(),
            DecodeErrorKind::Truncated,
        );
    }

    proptest! {
        #[test]
        fn round_trip(value: u64) {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            prop_assert_eq!(buf.len(), encoded_len_varint(value));
            prop_assert_eq!(decode_varint(&mut buf.as_slice()).unwrap(), value);
            prop_assert_eq!(decode_varint_slow(&mut buf.as_slice()).unwrap(), value);
        }

        #[test]
        fn round_trip_32(value: u32) {
            let mut buf = Vec::new();
            encode_varint(u64::from(value), &mut buf);
            prop_assert!(buf.len() <= 5);
            prop_assert_eq!(decode_varint(&mut buf.as_slice()).unwrap(), u64::from(value));
        }
    }
}
