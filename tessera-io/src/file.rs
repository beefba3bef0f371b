use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tessera_buffer::{AlignedBuffer, Alignment};
use tessera_error::{ResultExt, TesseraResult, tessera_err};

use crate::ALIGNMENT;

/// Read the whole file at `path` into an aligned heap buffer.
///
/// A missing file is reported as a not-found error.
pub fn read_file(path: impl AsRef<Path>) -> TesseraResult<AlignedBuffer> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            tessera_err!(NotFound: "store file {} does not exist", path.display())
        } else {
            e.into()
        }
    })?;
    let len = usize::try_from(file.metadata()?.len())
        .map_err(|_| tessera_err!("file {} does not fit in memory", path.display()))?;

    let mut buffer = AlignedBuffer::zeroed(len, Alignment::new(ALIGNMENT));
    file.read_exact(buffer.as_mut_slice())
        .with_context(|| format!("reading {}", path.display()))?;
    log::debug!("read {len} bytes from {}", path.display());
    Ok(buffer)
}

/// Write `bytes` to `path`, replacing any existing file.
pub fn write_file(path: impl AsRef<Path>, bytes: &[u8]) -> TesseraResult<()> {
    let path = path.as_ref();
    let mut file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("writing {}", path.display()))?;
    file.flush()?;
    log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
