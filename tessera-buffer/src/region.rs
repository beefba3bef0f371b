use std::fmt::{Debug, Formatter};

use memmap2::MmapMut;

use crate::{AlignedBuffer, Alignment};

/// The contiguous bytes backing a fixed store.
pub enum Region {
    /// Bytes owned by this process.
    Heap(AlignedBuffer),
    /// A writable mapping, typically of a shared memory segment.
    Mapped(MmapMut),
}

impl Region {
    /// The bytes of the region.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Region::Heap(buffer) => buffer.as_slice(),
            Region::Mapped(map) => map.as_ref(),
        }
    }

    /// The bytes of the region, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Region::Heap(buffer) => buffer.as_mut_slice(),
            Region::Mapped(map) => map.as_mut(),
        }
    }

    /// The length of the region in bytes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the region is a memory mapping rather than a heap allocation.
    pub fn is_mapped(&self) -> bool {
        matches!(self, Region::Mapped(_))
    }

    /// Whether the first byte of the region is aligned to `alignment`.
    ///
    /// Mappings are page aligned.
    pub fn is_aligned_to(&self, alignment: Alignment) -> bool {
        alignment.is_ptr_aligned(self.as_slice().as_ptr())
    }

    /// Copy the region onto the heap.
    pub fn to_heap(&self, alignment: Alignment) -> AlignedBuffer {
        AlignedBuffer::copy_from(self.as_slice(), alignment)
    }
}

impl From<AlignedBuffer> for Region {
    fn from(value: AlignedBuffer) -> Self {
        Region::Heap(value)
    }
}

impl From<MmapMut> for Region {
    fn from(value: MmapMut) -> Self {
        Region::Mapped(value)
    }
}

impl Debug for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Heap(buffer) => f.debug_tuple("Heap").field(buffer).finish(),
            Region::Mapped(map) => f.debug_tuple("Mapped").field(&map.len()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_mapping() {
        let mut map = MmapMut::map_anon(64).unwrap();
        map[..4].copy_from_slice(b"TSRA");
        let region = Region::from(map);
        assert!(region.is_mapped());
        assert!(region.is_aligned_to(Alignment::new(64)));
        assert_eq!(&region.as_slice()[..4], b"TSRA");
        assert_eq!(region.to_heap(Alignment::default()).len(), 64);
    }

    #[test]
    fn heap_region_is_writable() {
        let mut region = Region::from(AlignedBuffer::zeroed(4, Alignment::default()));
        region.as_mut_slice()[2] = 7;
        assert_eq!(region.as_slice(), &[0, 0, 7, 0]);
        assert!(!region.is_mapped());
    }
}
