//! Publishing fixed stores as POSIX shared memory segments.
//!
//! A published segment holds exactly the serialized bytes of a fixed store, so any process can
//! [`attach`] to it and parse it in place. Segments outlive the processes that created them until
//! they are [`unlink`]ed. There is no locking across processes.

pub use tessera_io::SharedSegment;
use tessera_error::TesseraResult;

use crate::Store;

/// Copy `store` into a new segment called `name`, sized to fit it exactly.
///
/// A store that is still being built is combined first. Fails if the segment already exists.
pub fn publish(store: &Store, name: &str) -> TesseraResult<SharedSegment> {
    if !store.is_fixed() {
        store.combine()?;
    }
    let state = store.read();
    let bytes = state.fixed()?.as_bytes();
    let mut segment = SharedSegment::create(name, bytes.len())?;
    segment.as_mut_slice().copy_from_slice(bytes);
    log::debug!(
        "published store {} as {} ({} bytes)",
        store.id(),
        segment.name(),
        bytes.len()
    );
    Ok(segment)
}

/// Map the existing segment called `name`.
pub fn attach(name: &str) -> TesseraResult<SharedSegment> {
    SharedSegment::open(name)
}

/// Remove the segment called `name`.
pub fn unlink(name: &str) -> TesseraResult<()> {
    SharedSegment::unlink(name)
}
