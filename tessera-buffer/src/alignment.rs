use std::fmt::{Display, Formatter};
use std::ops::Deref;

use tessera_error::tessera_panic;

/// A power-of-two byte alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alignment(usize);

impl Alignment {
    /// Create a new alignment.
    ///
    /// ## Panics
    ///
    /// Panics if `align` is not a power of two.
    #[inline]
    pub const fn new(align: usize) -> Self {
        if !align.is_power_of_two() {
            panic!("Alignment must be a power of two");
        }
        Self(align)
    }

    /// The alignment required by values of type `T`.
    #[inline]
    pub const fn of<T>() -> Self {
        Self::new(align_of::<T>())
    }

    /// Create an alignment from a value read from an untrusted source.
    ///
    /// ## Panics
    ///
    /// Panics if `align` is zero or not a power of two.
    pub fn from_untrusted(align: usize) -> Self {
        if !align.is_power_of_two() {
            tessera_panic!("invalid alignment {}", align);
        }
        Self(align)
    }

    /// Whether this alignment is a multiple of `other`.
    #[inline]
    pub fn is_aligned_to(&self, other: Alignment) -> bool {
        self.0 % other.0 == 0
    }

    /// Round `offset` up to the next multiple of this alignment.
    #[inline]
    pub fn align_up(&self, offset: usize) -> usize {
        offset.next_multiple_of(self.0)
    }

    /// Whether `offset` is a multiple of this alignment.
    #[inline]
    pub fn is_offset_aligned(&self, offset: usize) -> bool {
        offset % self.0 == 0
    }

    /// Whether the pointer is aligned to this alignment.
    #[inline]
    pub fn is_ptr_aligned<T>(&self, ptr: *const T) -> bool {
        ptr.cast::<u8>().align_offset(self.0) == 0
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Deref for Alignment {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Alignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Alignment> for usize {
    fn from(value: Alignment) -> Self {
        value.0
    }
}
