//! Blocking IO for Tessera stores.
//!
//! Stores are read and written whole: a file is read into one aligned heap buffer, and a shared
//! memory segment is mapped in its entirety. Shared memory uses POSIX `shm_open`, so segments are
//! only available on Unix.

pub use file::*;
#[cfg(unix)]
pub use shm::*;

mod file;
#[cfg(unix)]
mod shm;

/// Alignment of every buffer a store is read into.
pub const ALIGNMENT: usize = 64;
