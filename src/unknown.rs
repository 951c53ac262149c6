//! Opaque preservation of unrecognized fields.

use alloc::vec::Vec;

use bytes::BufMut;

/// A byte-faithful container for fields a message dispatcher did not
/// recognize.
///
/// Fields are stored exactly as they appeared on the wire — tag and value,
/// nested groups included — so re-emitting the set reproduces the original
/// bytes and round-trips data written by newer schema revisions. Populate it
/// with [`CodedReader::preserve_last_field`](crate::CodedReader::preserve_last_field)
/// or [`handle_unknown_field`](crate::CodedReader::handle_unknown_field).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnknownFieldSet {
    data: Vec<u8>,
}

impl UnknownFieldSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns whether any fields have been preserved.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discards all preserved fields.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The preserved fields, encoded back-to-back in wire format.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bytes the set re-encodes to.
    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }

    /// Appends the preserved fields to a buffer. Callers emit this after a
    /// message's known fields; the buffer must have sufficient capacity.
    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_slice(&self.data);
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}
