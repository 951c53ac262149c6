//! Leaf primitives of the wire format: tags, varints, zigzag, and
//! fixed-width values.
//!
//! Everything in this module operates on plain [`Buf`]/[`BufMut`]
//! implementations and carries no parser state; the stateful, limit-aware
//! versions of these reads live on [`CodedReader`](crate::CodedReader).

use core::convert::TryFrom;
use core::fmt;
use core::num::NonZeroU32;

use crate::{DecodeError, DecodeErrorKind};

mod fixed;
mod varint;

pub use fixed::{decode_fixed32, decode_fixed64, encode_fixed32, encode_fixed64};
pub use varint::{decode_varint, encode_varint, encoded_len_varint};

pub(crate) use varint::decode_varint_slice;

/// The wire type of an encoded field value.
///
/// A wire type occupies the low three bits of a field key and selects how the
/// value's bytes are physically laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// A base-128 variable-length integer.
    Varint = 0,
    /// Eight little-endian bytes.
    SixtyFourBit = 1,
    /// A varint byte length followed by exactly that many bytes.
    LengthDelimited = 2,
    /// Start of a group; terminated by a matching `EndGroup` tag.
    StartGroup = 3,
    /// End of a group.
    EndGroup = 4,
    /// Four little-endian bytes.
    ThirtyTwoBit = 5,
}

impl TryFrom<u32> for WireType {
    type Error = DecodeError;

    #[inline]
    fn try_from(value: u32) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::SixtyFourBit),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::ThirtyTwoBit),
            _ => Err(DecodeError::new(DecodeErrorKind::InvalidTag)),
        }
    }
}

impl WireType {
    /// Returns the encoded byte width of values with this wire type, when
    /// that width does not depend on the value.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            WireType::SixtyFourBit => Some(8),
            WireType::ThirtyTwoBit => Some(4),
            WireType::Varint
            | WireType::LengthDelimited
            | WireType::StartGroup
            | WireType::EndGroup => None,
        }
    }
}

/// A field number. Known to be in `1..=536_870_911`.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldNumber(NonZeroU32);

impl FieldNumber {
    /// The largest permitted field number, `2^29 - 1`.
    pub const MAX_VALUE: u32 = 536_870_911;

    /// Creates a field number if the given value is in range.
    #[inline]
    pub fn new(n: u32) -> Option<FieldNumber> {
        if n != 0 && n <= Self::MAX_VALUE {
            // Safety: `n` was just checked to be nonzero.
            Some(FieldNumber(unsafe { NonZeroU32::new_unchecked(n) }))
        } else {
            None
        }
    }

    /// Returns the value as a `u32`.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for FieldNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A field key: a field number and a wire type, packed as
/// `(field_number << 3) | wire_type`.
///
/// `Tag` is known never to be zero, so `Option<Tag>` is the same size as a
/// bare `u32` and the wire's "zero means end of input" convention costs
/// nothing to represent.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(NonZeroU32);

impl Tag {
    /// Creates a tag from a field number and wire type.
    #[inline]
    pub const fn new(field: FieldNumber, wire_type: WireType) -> Tag {
        // Safety: `field.get()` is nonzero, so the packed value is >= 8.
        Tag(unsafe { NonZeroU32::new_unchecked((field.get() << 3) | wire_type as u32) })
    }

    /// Creates a tag from its raw wire encoding, rejecting field number zero
    /// and the two unassigned wire types.
    #[inline]
    pub fn try_from_raw(raw: u32) -> Option<Tag> {
        match (raw & 0b111, raw >> 3) {
            (6, _) | (7, _) | (_, 0) => None,
            // Safety: the field number portion was just checked to be
            // nonzero, so `raw` is too.
            _ => Some(Tag(unsafe { NonZeroU32::new_unchecked(raw) })),
        }
    }

    /// Returns this tag's wire type.
    #[inline]
    pub fn wire_type(self) -> WireType {
        match self.get() & 0b111 {
            0 => WireType::Varint,
            1 => WireType::SixtyFourBit,
            2 => WireType::LengthDelimited,
            3 => WireType::StartGroup,
            4 => WireType::EndGroup,
            _ => WireType::ThirtyTwoBit,
        }
    }

    /// Returns this tag's field number.
    #[inline]
    pub fn field_number(self) -> FieldNumber {
        // Safety: constructors guarantee a nonzero field number portion.
        FieldNumber(unsafe { NonZeroU32::new_unchecked(self.get() >> 3) })
    }

    /// Returns the raw packed value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Returns the number of bytes this tag occupies on the wire.
    #[inline]
    pub fn encoded_len(self) -> usize {
        encoded_len_varint(u64::from(self.get()))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Zig-zag encoding: These functions implement storing signed in unsigned
/// integers by encoding the sign bit in the least significant bit. Only the
/// `sint32`/`sint64` field types use them.

#[inline]
pub fn i32_to_unsigned(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

#[inline]
pub fn u32_to_signed(value: u32) -> i32 {
    ((value >> 1) as i32) ^ (-((value & 1) as i32))
}

#[inline]
pub fn i64_to_unsigned(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn u64_to_signed(value: u64) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

#[cfg(test)]
mod test {
    use super::*;

    use core::mem;

    use itertools::iproduct;
    use static_assertions::const_assert_eq;

    const_assert_eq!(mem::size_of::<Option<Tag>>(), 4);
    const_assert_eq!(mem::size_of::<Option<FieldNumber>>(), 4);

    const WIRE_TYPES: [WireType; 6] = [
        WireType::Varint,
        WireType::SixtyFourBit,
        WireType::LengthDelimited,
        WireType::StartGroup,
        WireType::EndGroup,
        WireType::ThirtyTwoBit,
    ];

    #[test]
    fn tag_round_trips_through_raw() {
        let field_numbers = [1, 2, 15, 16, 2047, 2048, 262_143, FieldNumber::MAX_VALUE];
        for (&number, &wire_type) in iproduct!(field_numbers.iter(), WIRE_TYPES.iter()) {
            let field = FieldNumber::new(number).unwrap();
            let tag = Tag::new(field, wire_type);
            assert_eq!(tag.get(), (number << 3) | wire_type as u32);
            assert_eq!(tag.field_number(), field);
            assert_eq!(tag.wire_type(), wire_type);
            assert_eq!(Tag::try_from_raw(tag.get()), Some(tag));
        }
    }

    #[test]
    fn invalid_raw_tags_are_rejected() {
        // field number zero, any wire type
        for wire_type in 0..8u32 {
            assert_eq!(Tag::try_from_raw(wire_type), None);
        }
        // unassigned wire types 6 and 7
        assert_eq!(Tag::try_from_raw((1 << 3) | 6), None);
        assert_eq!(Tag::try_from_raw((1 << 3) | 7), None);
        assert_eq!(WireType::try_from(6).unwrap_err().kind(), DecodeErrorKind::InvalidTag);
    }

    #[test]
    fn field_number_bounds() {
        assert!(FieldNumber::new(0).is_none());
        assert!(FieldNumber::new(1).is_some());
        assert!(FieldNumber::new(FieldNumber::MAX_VALUE).is_some());
        assert!(FieldNumber::new(FieldNumber::MAX_VALUE + 1).is_none());
    }

    #[test]
    fn zigzag_known_values() {
        assert_eq!(i32_to_unsigned(0), 0);
        assert_eq!(i32_to_unsigned(-1), 1);
        assert_eq!(i32_to_unsigned(1), 2);
        assert_eq!(i32_to_unsigned(-2), 3);
        assert_eq!(i32_to_unsigned(i32::MAX), u32::MAX - 1);
        assert_eq!(i32_to_unsigned(i32::MIN), u32::MAX);
        assert_eq!(i64_to_unsigned(i64::MAX), u64::MAX - 1);
        assert_eq!(i64_to_unsigned(i64::MIN), u64::MAX);
    }

    #[test]
    fn zigzag_round_trips() {
        for value in [0, 1, -1, 63, -64, i32::MIN, i32::MAX] {
            assert_eq!(u32_to_signed(i32_to_unsigned(value)), value);
        }
        for value in [0, 1, -1, i64::MIN, i64::MAX] {
            assert_eq!(u64_to_signed(i64_to_unsigned(value)), value);
        }
    }
}
