use bytes::{BufMut, Bytes, BytesMut};
use tessera_buffer::{Alignment, as_bytes};
use tessera_error::{TesseraResult, tessera_err};

use crate::{
    ColumnFooter, ColumnSlice, EndOfFile, Footer, LayerFooter, LayerRead, MAGIC_BYTES,
    MIN_ALIGNMENT, SegmentSpec, VERSION,
};

/// Options for serializing a store.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    alignment: Alignment,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            alignment: Alignment::new(MIN_ALIGNMENT),
        }
    }
}

impl WriteOptions {
    /// Align every segment to `alignment`. Values below 8 bytes are raised to 8.
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment.max(Alignment::new(MIN_ALIGNMENT));
        self
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Serialize the committed rows of `layers`, in order, into one buffer.
    pub fn write<L: LayerRead>(&self, layers: &[L]) -> TesseraResult<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC_BYTES);

        let mut footer = Footer::default();
        for layer in layers {
            let mut columns = Vec::with_capacity(layer.columns().len());
            for (index, column) in layer.columns().iter().enumerate() {
                let (data, offsets) = match layer.committed_slice(index)? {
                    ColumnSlice::U8(v) => (self.write_segment(&mut buf, v), None),
                    ColumnSlice::U16(v) => (self.write_segment(&mut buf, v), None),
                    ColumnSlice::U32(v) => (self.write_segment(&mut buf, v), None),
                    ColumnSlice::I32(v) => (self.write_segment(&mut buf, v), None),
                    ColumnSlice::F32(v) => (self.write_segment(&mut buf, v), None),
                    ColumnSlice::F64(v) => (self.write_segment(&mut buf, v), None),
                    ColumnSlice::Ref(v) => (self.write_segment(&mut buf, v), None),
                    ColumnSlice::Str { offsets, data } | ColumnSlice::Bytes { offsets, data } => {
                        let offsets = self.write_segment(&mut buf, offsets);
                        (self.write_segment(&mut buf, data), Some(offsets))
                    }
                    ColumnSlice::WStr { offsets, data } => {
                        let offsets = self.write_segment(&mut buf, offsets);
                        (self.write_segment(&mut buf, data), Some(offsets))
                    }
                };
                columns.push(ColumnFooter {
                    name: column.name().to_string(),
                    kind: column.kind().into(),
                    vmin: column.range().vmin,
                    vmax: column.range().vmax,
                    target: column.target().map(|t| t.to_string()),
                    data,
                    offsets,
                });
            }
            footer.layers.push(LayerFooter {
                name: layer.name().to_string(),
                rows: layer.row_count(),
                columns,
            });
        }

        let footer_bytes = footer.to_flexbuffer()?;
        let footer_length = u32::try_from(footer_bytes.len()).map_err(|_| {
            tessera_err!(Capacity: "footer of {} bytes is too large", footer_bytes.len())
        })?;
        buf.put_slice(&footer_bytes);
        buf.put_slice(
            &EndOfFile {
                version: VERSION,
                footer_length,
            }
            .to_bytes(),
        );

        log::debug!(
            "serialized {} layers into {} bytes",
            footer.layers.len(),
            buf.len()
        );
        Ok(buf.freeze())
    }

    fn write_segment<T: tessera_buffer::Pod>(&self, buf: &mut BytesMut, values: &[T]) -> SegmentSpec {
        let padding = self.alignment.align_up(buf.len()) - buf.len();
        buf.put_bytes(0, padding);
        let offset = buf.len() as u64;
        let bytes = as_bytes(values);
        buf.put_slice(bytes);
        SegmentSpec {
            offset,
            length: bytes.len() as u64,
        }
    }
}
