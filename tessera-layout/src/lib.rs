#![allow(clippy::cast_possible_truncation)]
//! The storage engine behind Tessera stores.
//!
//! A store is a list of named layers, each a table of equally long columns. While a store is
//! being built its layers live in growable vectors ([`BuildStore`]); once written, the whole
//! store is one contiguous buffer that is read and updated in place ([`FixedStore`]).
//!
//! # Format
//!
//! ```text
//! ┌────────────────────────────┐
//! │     4-byte Magic Bytes     │
//! ├────────────────────────────┤
//! │                            │
//! │      Column Segments       │
//! │  (values, offsets, data)   │
//! │                            │
//! ├────────────────────────────┤
//! │                            │
//! │     Flexbuffer Footer      │
//! │  (layers, columns, ranges) │
//! │                            │
//! ├────────────────────────────┤
//! │    12-byte End of File     │
//! │ (Version, Reserved, Footer │
//! │    Length, Magic Bytes)    │
//! └────────────────────────────┘
//! ```
//!
//! Every segment starts at a multiple of the write alignment, at least 8 bytes, so each column
//! can be viewed as a typed slice without copying. Fixed-width columns hold one value per row.
//! Variable-width columns hold `rows + 1` `u32` offsets followed by a separate data segment.
//! References are stored as a packed [`RowRef`].

mod build;
mod column;
mod fixed;
mod footer;
mod read;
#[cfg(test)]
mod tests;
mod writer;

pub use build::*;
pub use column::*;
pub use fixed::*;
pub use footer::*;
pub use forever_constant::*;
pub use read::*;
pub use writer::*;

/// The current version of the store format.
pub const VERSION: u16 = 1;

/// Constants that will never change (i.e., doing so would break backwards compatibility)
mod forever_constant {
    /// The extension for store files
    pub const TESSERA_FILE_EXTENSION: &str = "tsr";

    /// The magic bytes opening and closing every serialized store
    pub const MAGIC_BYTES: [u8; 4] = *b"TSRA";
    /// The size of the EOF marker in bytes
    pub const EOF_SIZE: usize = 12;
    /// The minimum alignment of every segment
    pub const MIN_ALIGNMENT: usize = 8;

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn never_change_these_constants() {
            assert_eq!(MAGIC_BYTES, *b"TSRA");
            assert_eq!(EOF_SIZE, 12);
            assert_eq!(MIN_ALIGNMENT, 8);
        }
    }
}
