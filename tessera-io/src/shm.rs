use std::ffi::CString;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io;
use std::os::fd::FromRawFd;

use memmap2::MmapMut;
use tessera_buffer::Region;
use tessera_error::{ResultExt, TesseraError, TesseraResult, tessera_bail, tessera_err};

/// The name of a POSIX shared memory segment.
///
/// Names are normalized to carry exactly one leading `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentName(String);

impl SegmentName {
    pub fn new(name: &str) -> TesseraResult<Self> {
        let trimmed = name.trim_start_matches('/');
        if trimmed.is_empty() || trimmed.contains('/') {
            tessera_bail!("invalid shared memory name \"{}\"", name);
        }
        Ok(Self(format!("/{trimmed}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn to_cstring(&self) -> TesseraResult<CString> {
        CString::new(self.0.as_bytes())
            .map_err(|_| tessera_err!("shared memory name {} contains a nul byte", self.0))
    }
}

impl Display for SegmentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn os_error(name: &SegmentName, action: &str) -> TesseraError {
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::NotFound {
        tessera_err!(NotFound: "shared memory segment {} does not exist", name)
    } else {
        TesseraError::from(err).with_context(format!("{action} shared memory segment {name}"))
    }
}

fn shm_open(name: &SegmentName, flags: libc::c_int) -> TesseraResult<File> {
    let c_name = name.to_cstring()?;
    // SAFETY: `c_name` is a valid nul-terminated string for the duration of the call.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, 0o600 as libc::c_uint) };
    if fd < 0 {
        return Err(os_error(name, "opening"));
    }
    // SAFETY: `fd` was just returned by a successful `shm_open` and is owned by nobody else.
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// A mapped POSIX shared memory segment.
///
/// Dropping the segment unmaps it but leaves the segment in place for other processes; call
/// [`SharedSegment::unlink`] to remove it.
#[derive(Debug)]
pub struct SharedSegment {
    name: SegmentName,
    map: MmapMut,
}

impl SharedSegment {
    /// Create a new segment of exactly `len` bytes. Fails if a segment of that name exists.
    pub fn create(name: &str, len: usize) -> TesseraResult<Self> {
        let name = SegmentName::new(name)?;
        if len == 0 {
            tessera_bail!("cannot create empty shared memory segment {}", name);
        }
        let file = shm_open(&name, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR)?;
        let map = file
            .set_len(len as u64)
            .map_err(TesseraError::from)
            .and_then(|_| Self::map(&file))
            .or_else(|e| {
                Self::unlink_name(&name).ok();
                Err(e)
            })
            .with_context(|| format!("sizing shared memory segment {name}"))?;
        log::debug!("created shared memory segment {name} of {len} bytes");
        Ok(Self { name, map })
    }

    /// Map an existing segment.
    pub fn open(name: &str) -> TesseraResult<Self> {
        let name = SegmentName::new(name)?;
        let file = shm_open(&name, libc::O_RDWR)?;
        if file.metadata()?.len() == 0 {
            tessera_bail!(InvalidSerde: "shared memory segment {} is empty", name);
        }
        let map = Self::map(&file)?;
        log::debug!("attached shared memory segment {name} of {} bytes", map.len());
        Ok(Self { name, map })
    }

    /// Remove the segment called `name`. The mapping of any process attached to it stays valid.
    pub fn unlink(name: &str) -> TesseraResult<()> {
        Self::unlink_name(&SegmentName::new(name)?)
    }

    fn unlink_name(name: &SegmentName) -> TesseraResult<()> {
        let c_name = name.to_cstring()?;
        // SAFETY: `c_name` is a valid nul-terminated string for the duration of the call.
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } < 0 {
            return Err(os_error(name, "unlinking"));
        }
        log::debug!("unlinked shared memory segment {name}");
        Ok(())
    }

    fn map(file: &File) -> TesseraResult<MmapMut> {
        // SAFETY: the segment may be modified by other processes. Tessera only exposes its bytes
        // as plain numeric values, which are valid for any bit pattern.
        Ok(unsafe { MmapMut::map_mut(file)? })
    }

    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Split into the segment name and the mapping as a [`Region`].
    pub fn into_parts(self) -> (SegmentName, Region) {
        (self.name, Region::Mapped(self.map))
    }
}

#[cfg(test)]
mod tests {
    use std::process;

    use super::*;

    fn unique(tag: &str) -> String {
        format!("tessera-io-{}-{tag}", process::id())
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(SegmentName::new("points").unwrap().as_str(), "/points");
        assert_eq!(SegmentName::new("//points").unwrap().as_str(), "/points");
        assert!(SegmentName::new("/").is_err());
        assert!(SegmentName::new("a/b").is_err());
    }

    #[test]
    fn create_open_unlink() {
        let name = unique("roundtrip");
        let mut created = SharedSegment::create(&name, 32).unwrap();
        created.as_mut_slice()[..5].copy_from_slice(b"hello");

        let opened = SharedSegment::open(&name).unwrap();
        assert_eq!(opened.len(), 32);
        assert_eq!(&opened.as_slice()[..5], b"hello");

        SharedSegment::unlink(&name).unwrap();
        assert!(SharedSegment::open(&name).unwrap_err().is_not_found());
        assert!(SharedSegment::unlink(&name).unwrap_err().is_not_found());
        // existing mappings survive the unlink
        assert_eq!(&created.as_slice()[..5], b"hello");
    }

    #[test]
    fn create_is_exclusive() {
        let name = unique("exclusive");
        let _first = SharedSegment::create(&name, 8).unwrap();
        assert!(SharedSegment::create(&name, 8).is_err());
        SharedSegment::unlink(&name).unwrap();
    }
}
