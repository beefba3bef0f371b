#![cfg(target_endian = "little")]
#![deny(missing_docs)]

//! Byte storage for Tessera.
//!
//! A store's entire layout lives in one contiguous [`Region`], either an [`AlignedBuffer`] on the
//! heap or a shared memory mapping. Columns are exposed as typed slices cast in place from that
//! region with [`cast_slice`] and [`cast_slice_mut`], so reads and writes never copy.

pub use aligned::*;
pub use alignment::*;
pub use region::*;
pub use view::*;

mod aligned;
mod alignment;
mod region;
mod view;
