use std::ops::Range;

use flexbuffers::FlexbufferSerializer;
use serde::{Deserialize, Serialize};
use tessera_error::{TesseraResult, tessera_bail};

use crate::{EOF_SIZE, MAGIC_BYTES, VERSION};

/// The location of a segment within a serialized store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub offset: u64,
    pub length: u64,
}

impl SegmentSpec {
    /// The bytes the segment covers, `None` if its end does not fit in a `u64`.
    pub fn byte_range(&self) -> Option<Range<u64>> {
        Some(self.offset..self.offset.checked_add(self.length)?)
    }
}

/// Where the cells of one column live.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnFooter {
    pub name: String,
    pub kind: u8,
    pub vmin: f64,
    pub vmax: f64,
    pub target: Option<String>,
    /// Fixed-width values, or the data of a variable-width column.
    pub data: SegmentSpec,
    /// The `rows + 1` offsets of a variable-width column.
    pub offsets: Option<SegmentSpec>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerFooter {
    pub name: String,
    pub rows: u32,
    pub columns: Vec<ColumnFooter>,
}

/// The description of every layer of a serialized store, written after the column segments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Footer {
    pub layers: Vec<LayerFooter>,
}

impl Footer {
    pub fn to_flexbuffer(&self) -> TesseraResult<Vec<u8>> {
        let mut serializer = FlexbufferSerializer::new();
        self.serialize(&mut serializer)?;
        Ok(serializer.take_buffer())
    }

    pub fn from_flexbuffer(bytes: &[u8]) -> TesseraResult<Self> {
        Ok(flexbuffers::from_slice(bytes)?)
    }
}

/// The fixed-size record closing every serialized store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndOfFile {
    pub version: u16,
    pub footer_length: u32,
}

impl EndOfFile {
    pub fn to_bytes(self) -> [u8; EOF_SIZE] {
        let mut eof = [0u8; EOF_SIZE];
        eof[0..2].copy_from_slice(&self.version.to_le_bytes());
        // bytes 2..4 are reserved
        eof[4..8].copy_from_slice(&self.footer_length.to_le_bytes());
        eof[8..12].copy_from_slice(&MAGIC_BYTES);
        eof
    }

    /// Parse the last [`EOF_SIZE`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> TesseraResult<Self> {
        if bytes.len() < MAGIC_BYTES.len() + EOF_SIZE {
            tessera_bail!(
                InvalidSerde: "buffer of {} bytes is too small to hold a store",
                bytes.len()
            );
        }
        if bytes[..MAGIC_BYTES.len()] != MAGIC_BYTES {
            tessera_bail!(InvalidSerde: "missing magic bytes at start of store");
        }
        let eof = &bytes[bytes.len() - EOF_SIZE..];
        if eof[8..12] != MAGIC_BYTES {
            tessera_bail!(InvalidSerde: "missing magic bytes at end of store");
        }
        let version = u16::from_le_bytes([eof[0], eof[1]]);
        if version != VERSION {
            tessera_bail!(
                InvalidSerde: "unsupported store version {}, expected {}",
                version,
                VERSION
            );
        }
        let footer_length = u32::from_le_bytes([eof[4], eof[5], eof[6], eof[7]]);
        Ok(Self {
            version,
            footer_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_flexbuffer() {
        let footer = Footer {
            layers: vec![LayerFooter {
                name: "Point".to_string(),
                rows: 5,
                columns: vec![ColumnFooter {
                    name: "x".to_string(),
                    kind: 8,
                    vmin: 0.0,
                    vmax: 1.0,
                    target: None,
                    data: SegmentSpec {
                        offset: 8,
                        length: 40,
                    },
                    offsets: None,
                }],
            }],
        };
        let bytes = footer.to_flexbuffer().unwrap();
        assert_eq!(Footer::from_flexbuffer(&bytes).unwrap(), footer);
    }

    #[test]
    fn eof_layout() {
        let eof = EndOfFile {
            version: VERSION,
            footer_length: 0x0102_0304,
        }
        .to_bytes();
        assert_eq!(eof[..2], VERSION.to_le_bytes());
        assert_eq!(eof[4..8], [4, 3, 2, 1]);
        assert_eq!(&eof[8..], b"TSRA");
    }

    #[test]
    fn segment_end_overflow() {
        let spec = SegmentSpec {
            offset: u64::MAX - 4,
            length: 8,
        };
        assert_eq!(spec.byte_range(), None);
        let spec = SegmentSpec {
            offset: 8,
            length: 16,
        };
        assert_eq!(spec.byte_range(), Some(8..24));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![0u8; 32];
        bytes[..4].copy_from_slice(b"NOPE");
        assert!(matches!(
            EndOfFile::parse(&bytes),
            Err(tessera_error::TesseraError::InvalidSerde(..))
        ));
    }
}
