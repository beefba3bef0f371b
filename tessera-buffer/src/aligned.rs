use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};

use bytes::Bytes;

use crate::Alignment;

/// A fixed-length, zero-initialized heap allocation whose first byte sits at a multiple of the
/// requested alignment.
///
/// Internally it over-allocates by up to `alignment - 1` bytes and skips the padding at the front.
/// The allocation is never resized, so the content pointer stays stable for the lifetime of the
/// buffer, including across moves.
pub struct AlignedBuffer {
    buf: Vec<u8>,
    padding: usize,
    len: usize,
    alignment: Alignment,
}

impl AlignedBuffer {
    /// Allocate `len` zeroed bytes aligned to `alignment`.
    pub fn zeroed(len: usize, alignment: Alignment) -> Self {
        let buf = vec![0u8; len + *alignment - 1];
        let padding = buf.as_ptr().align_offset(*alignment);
        assert!(
            padding + len <= buf.len(),
            "padding {padding} leaves no room for {len} bytes"
        );
        Self {
            buf,
            padding,
            len,
            alignment,
        }
    }

    /// Copy `bytes` into a new allocation aligned to `alignment`.
    pub fn copy_from(bytes: impl AsRef<[u8]>, alignment: Alignment) -> Self {
        let bytes = bytes.as_ref();
        let mut buffer = Self::zeroed(bytes.len(), alignment);
        buffer.as_mut_slice().copy_from_slice(bytes);
        buffer
    }

    /// The number of usable bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The alignment of the first byte.
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// The usable bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.padding..self.padding + self.len]
    }

    /// The usable bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[self.padding..self.padding + self.len]
    }

    /// Copy the usable bytes out into an unaligned [`Bytes`].
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_slice())
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl AsRef<[u8]> for AlignedBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Clone for AlignedBuffer {
    fn clone(&self) -> Self {
        Self::copy_from(self.as_slice(), self.alignment)
    }
}

impl Debug for AlignedBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}

impl From<Bytes> for AlignedBuffer {
    fn from(value: Bytes) -> Self {
        Self::copy_from(value, Alignment::default())
    }
}
