//! Growable byte buffers and the payload union (§4.A).
//!
//! `GrowBuf` wraps [`bytes::BytesMut`] but exposes the exponential-growth and
//! erase-front vocabulary the rest of the core is written against, so callers
//! reason about amortized append cost instead of `bytes`' general-purpose API.

use std::fs::File;
use std::io;
use std::os::unix::io::RawFd;

use bytes::{Buf, BufMut, BytesMut};

/// A contiguous, growable byte buffer with amortized O(1) append.
#[derive(Debug, Default, Clone)]
pub struct GrowBuf {
    inner: BytesMut,
}

impl GrowBuf {
    pub fn new() -> Self {
        GrowBuf { inner: BytesMut::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        GrowBuf { inner: BytesMut::with_capacity(cap) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Appends `bytes`, growing (never shrinking) as needed.
    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure_extra_exp(bytes.len());
        self.inner.put_slice(bytes);
    }

    /// Reserves room for at least `n` more bytes without amortized growth.
    pub fn reserve_extra(&mut self, n: usize) {
        self.inner.reserve(n);
    }

    /// Grows capacity to at least `size() + n`, doubling capacity at minimum.
    /// Reallocation invalidates interior pointers derived from `as_slice()`.
    pub fn ensure_extra_exp(&mut self, n: usize) {
        let needed = self.inner.len() + n;
        if self.inner.capacity() < needed {
            let doubled = self.inner.capacity().saturating_mul(2);
            let target = doubled.max(needed).max(64);
            let extra = target - self.inner.len();
            self.inner.reserve(extra);
        }
    }

    /// Commits `n` bytes of a previously reserved, already-written region.
    ///
    /// # Safety contract
    /// The caller must have written `n` valid bytes into the uninitialized
    /// tail made available by a prior `reserve_extra`/`ensure_extra_exp`
    /// call (e.g. via a direct `read()` into `spare_capacity_mut()`).
    pub unsafe fn add_size(&mut self, n: usize) {
        self.inner.set_len(self.inner.len() + n);
    }

    /// Mutable spare-capacity slice, for callers that fill it then call
    /// [`GrowBuf::add_size`].
    pub fn spare_capacity_mut(&mut self) -> &mut [std::mem::MaybeUninit<u8>] {
        self.inner.spare_capacity_mut()
    }

    /// Removes the first `n` bytes, shifting the remainder to the front.
    pub fn erase_front(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        debug_assert!(n <= self.inner.len());
        self.inner.advance(n);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn into_bytesmut(self) -> BytesMut {
        self.inner
    }
}

impl From<BytesMut> for GrowBuf {
    fn from(inner: BytesMut) -> Self {
        GrowBuf { inner }
    }
}

impl std::ops::Deref for GrowBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.inner
    }
}

/// A file-backed byte range, used by the `File` payload variant.
#[derive(Debug, Clone)]
pub struct FileRange {
    pub fd: RawFd,
    pub offset: u64,
    pub length: u64,
}

/// Tagged union over the ways a request/response body can be carried.
///
/// Once a payload becomes `File`, appending further in-memory bytes (e.g. a
/// trailer) is rejected: the wire length is already pinned to the file
/// range.
#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    Empty,
    Inline(GrowBuf),
    Owned(bytes::Bytes),
    File {
        file: std::sync::Arc<File>,
        range: FileRange,
    },
}

impl Payload {
    pub fn len(&self) -> u64 {
        match self {
            Payload::Empty => 0,
            Payload::Inline(b) => b.len() as u64,
            Payload::Owned(b) => b.len() as u64,
            Payload::File { range, .. } => range.length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Payload::File { .. })
    }

    /// Contiguous view for all non-file variants; empty for `File`.
    pub fn view(&self) -> &[u8] {
        match self {
            Payload::Empty => &[],
            Payload::Inline(b) => b.as_slice(),
            Payload::Owned(b) => b.as_ref(),
            Payload::File { .. } => &[],
        }
    }

    pub fn file_range(&self) -> Option<(RawFd, u64, u64)> {
        match self {
            Payload::File { range, .. } => Some((range.fd, range.offset, range.length)),
            _ => None,
        }
    }

    /// Appends more in-memory bytes. Switches representation to `Inline` if
    /// the payload is currently `Empty` or `Owned`.
    ///
    /// # Errors
    /// Returns `Err` if the payload is a `File` variant.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), &'static str> {
        match self {
            Payload::Empty => {
                let mut b = GrowBuf::new();
                b.append(bytes);
                *self = Payload::Inline(b);
                Ok(())
            }
            Payload::Inline(b) => {
                b.append(bytes);
                Ok(())
            }
            Payload::Owned(existing) => {
                let mut b = GrowBuf::with_capacity(existing.len() + bytes.len());
                b.append(existing);
                b.append(bytes);
                *self = Payload::Inline(b);
                Ok(())
            }
            Payload::File { .. } => Err("cannot append in-memory bytes to a file payload"),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        if v.is_empty() {
            Payload::Empty
        } else {
            Payload::Owned(bytes::Bytes::from(v))
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::from(s.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::from(s.into_bytes())
    }
}

pub(crate) fn io_write_all_would_block(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}
