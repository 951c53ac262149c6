//! Byte sources feeding a [`CodedReader`](crate::CodedReader).
//!
//! A source exposes the input one contiguous window at a time. The reader
//! performs its hot-path decoding directly against the current window and
//! asks the source to refill only when the window is exhausted, so a single
//! generic core serves contiguous slices, segmented buffers, and buffered
//! streams alike.

use bytes::Buf;

use crate::DecodeError;
#[cfg(feature = "std")]
use crate::DecodeErrorKind::Io;

/// A pull-based supplier of input bytes.
///
/// Implementations must uphold the window protocol: `chunk` returns the
/// unread remainder of the current window, `advance` consumes within it, and
/// `refill` replaces an exhausted window. The bytes of a window are never
/// mutated while it is current.
pub trait Source {
    /// Returns the unread bytes of the current window. An empty slice means
    /// the window is exhausted, not necessarily that the input is.
    fn chunk(&self) -> &[u8];

    /// Consumes `n` bytes of the current window. `n` must not exceed
    /// `chunk().len()`.
    fn advance(&mut self, n: usize);

    /// Returns the total number of bytes consumed from the input so far.
    fn position(&self) -> u64;

    /// Attempts to make at least one more byte visible, replacing the current
    /// window. Returns `Ok(false)` at end of input. Must only be called when
    /// the current window is exhausted.
    fn refill(&mut self) -> Result<bool, DecodeError>;
}

/// A source over a single contiguous byte slice.
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Creates a source reading from `data`.
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource { data, pos: 0 }
    }
}

impl Source for SliceSource<'_> {
    #[inline]
    fn chunk(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.data.len() - self.pos);
        self.pos += n;
    }

    #[inline]
    fn position(&self) -> u64 {
        self.pos as u64
    }

    #[inline]
    fn refill(&mut self) -> Result<bool, DecodeError> {
        Ok(false)
    }
}

/// A source over any [`Buf`], including non-contiguous ones such as
/// [`bytes::Bytes`] chains or rope-like buffers. Each segment of the buffer
/// becomes one window.
pub struct BufSource<B> {
    buf: B,
    consumed: u64,
}

impl<B: Buf> BufSource<B> {
    /// Creates a source reading from `buf`.
    pub fn new(buf: B) -> Self {
        BufSource { buf, consumed: 0 }
    }

    /// Consumes the source, returning the underlying buffer with any unread
    /// bytes still in place.
    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: Buf> Source for BufSource<B> {
    #[inline]
    fn chunk(&self) -> &[u8] {
        self.buf.chunk()
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.buf.advance(n);
        self.consumed += n as u64;
    }

    #[inline]
    fn position(&self) -> u64 {
        self.consumed
    }

    #[inline]
    fn refill(&mut self) -> Result<bool, DecodeError> {
        // `Buf` exposes the next segment through `chunk` as soon as the
        // previous one is consumed, so there is nothing to pull here.
        Ok(self.buf.has_remaining())
    }
}

/// A source over a [`std::io::Read`] stream, refilling an owned buffer.
#[cfg(feature = "std")]
pub struct ReadSource<R> {
    read: R,
    buf: alloc::boxed::Box<[u8]>,
    pos: usize,
    filled: usize,
    retired: u64,
}

#[cfg(feature = "std")]
impl<R: std::io::Read> ReadSource<R> {
    /// Creates a source reading from `read` with the default buffer capacity
    /// (4096 bytes).
    pub fn new(read: R) -> Self {
        Self::with_capacity(crate::DEFAULT_BUFFER_CAPACITY, read)
    }

    /// Creates a source reading from `read` with the given buffer capacity.
    pub fn with_capacity(capacity: usize, read: R) -> Self {
        ReadSource {
            read,
            buf: alloc::vec![0; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            filled: 0,
            retired: 0,
        }
    }

    /// Consumes the source, returning the underlying reader. Bytes already
    /// pulled into the refill buffer are lost.
    pub fn into_inner(self) -> R {
        self.read
    }
}

#[cfg(feature = "std")]
impl<R: std::io::Read> Source for ReadSource<R> {
    #[inline]
    fn chunk(&self) -> &[u8] {
        &self.buf[self.pos..self.filled]
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.filled - self.pos);
        self.pos += n;
    }

    #[inline]
    fn position(&self) -> u64 {
        self.retired + self.pos as u64
    }

    fn refill(&mut self) -> Result<bool, DecodeError> {
        debug_assert!(self.pos == self.filled);
        self.retired += self.filled as u64;
        self.pos = 0;
        self.filled = 0;
        loop {
            match self.read.read(&mut self.buf) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.filled = n;
                    return Ok(true);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(DecodeError::new(Io)),
            }
        }
    }
}
