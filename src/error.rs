//! Wire-format encoding and decoding errors.

use core::fmt;

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// The input ended before a required value, region, or group terminator.
    Truncated,
    /// A varint ran past its maximum encoded length without terminating.
    MalformedVarint,
    /// A tag decoded to field number zero or an unusable wire type.
    InvalidTag,
    /// A length-delimited field declared a negative length.
    NegativeSize,
    /// Cumulative bytes read exceeded the configured size limit.
    SizeLimitExceeded,
    /// Message/group nesting exceeded the configured recursion limit.
    RecursionLimitExceeded,
    /// A string field's bytes are not valid UTF-8.
    InvalidUtf8,
    /// A group's end tag did not carry the field number of its start tag.
    MismatchedEndGroup,
    /// The underlying byte source failed.
    Io,
    /// Something else, such as skipping a field before any tag was read.
    Other,
}

use DecodeErrorKind::*;

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Truncated => "message or region truncated",
            MalformedVarint => "malformed varint",
            InvalidTag => "invalid tag",
            NegativeSize => "negative length",
            SizeLimitExceeded => "size limit exceeded",
            RecursionLimitExceeded => "recursion limit exceeded",
            InvalidUtf8 => "string is not valid UTF-8",
            MismatchedEndGroup => "mismatched end-group tag",
            Io => "underlying source failed",
            Other => "other error",
        })
    }
}

/// A wire-format decoding error.
///
/// `DecodeError` indicates that the input does not contain a valid message.
/// The error details should be considered 'best effort': in general it is not
/// possible to exactly pinpoint why data is malformed.
///
/// `DecodeError` is 1 word plus 1 byte in size with the "detailed-errors"
/// feature enabled; without that feature, it is only 1 byte, and the error
/// will not include any information about the path to the fields that
/// encountered the error while decoding.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// A 'best effort' root cause description.
    kind: DecodeErrorKind,
    #[cfg(feature = "detailed-errors")]
    /// A stack of (message, field) name pairs, which identify the specific
    /// message type and field where decoding failed. The stack contains an
    /// entry per level of nesting.
    stack: thin_vec::ThinVec<(&'static str, &'static str)>,
}

impl DecodeError {
    /// Creates a new `DecodeError` with a 'best effort' root cause description.
    #[cold]
    pub fn new(kind: DecodeErrorKind) -> DecodeError {
        DecodeError {
            kind,
            #[cfg(feature = "detailed-errors")]
            stack: Default::default(),
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// Pushes a (message, field) name location pair on to the location stack.
    ///
    /// Meant to be used by message-dispatch layers built on the reader.
    pub fn push(&mut self, message: &'static str, field: &'static str) {
        #[cfg(feature = "detailed-errors")]
        self.stack.push((message, field));
        _ = (message, field);
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DecodeError");
        s.field("description", &self.kind);
        #[cfg(feature = "detailed-errors")]
        s.field("stack", &self.stack);
        s.finish()
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode protobuf message: ")?;
        #[cfg(feature = "detailed-errors")]
        for (message, field) in self.stack.iter() {
            write!(f, "{}.{}: ", message, field)?;
        }
        self.kind.fmt(f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg(feature = "std")]
impl From<DecodeError> for std::io::Error {
    fn from(error: DecodeError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidData, error)
    }
}

/// A wire-format encoding error.
///
/// `EncodeError` always indicates that a value failed to encode because the
/// provided buffer had insufficient capacity. Encoding into a growable buffer
/// is otherwise infallible.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EncodeError {
    required: usize,
    remaining: usize,
}

impl EncodeError {
    /// Creates a new `EncodeError`.
    pub(crate) fn new(required: usize, remaining: usize) -> EncodeError {
        EncodeError {
            required,
            remaining,
        }
    }

    /// Returns the required buffer capacity for the write that failed.
    pub fn required_capacity(&self) -> usize {
        self.required
    }

    /// Returns the remaining length in the provided buffer at the time of encoding.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to encode protobuf data; insufficient buffer capacity \
            (required: {}, remaining: {})",
            self.required, self.remaining
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

#[cfg(feature = "std")]
impl From<EncodeError> for std::io::Error {
    fn from(error: EncodeError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, error)
    }
}
