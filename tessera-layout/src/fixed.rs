use std::ops::Range;
use std::sync::Arc;

use itertools::Itertools;
use tessera_buffer::{Alignment, Pod, Region, cast_slice, cast_slice_mut};
use tessera_dtype::{FieldKind, NativeValue, NormRange, PValue, match_each_native_kind};
use tessera_error::{ResultExt, TesseraResult, tessera_bail, tessera_err};

use crate::{
    ColumnDef, ColumnFooter, ColumnSlice, EOF_SIZE, EndOfFile, Footer, LayerFooter, LayerRead,
    MAGIC_BYTES, MIN_ALIGNMENT, RowRef, SegmentSpec,
};

#[derive(Debug, Clone)]
struct ColumnSegments {
    data: Range<usize>,
    offsets: Option<Range<usize>>,
}

/// The metadata of one layer of a [`FixedStore`].
#[derive(Debug, Clone)]
pub struct FixedLayer {
    name: Arc<str>,
    columns: Vec<ColumnDef>,
    rows: u32,
    segments: Vec<ColumnSegments>,
}

/// A parsed store whose layers all live in one [`Region`].
///
/// Row counts and columns are frozen. Numeric and reference cells can be updated in place.
#[derive(Debug)]
pub struct FixedStore {
    region: Region,
    layers: Vec<FixedLayer>,
}

fn segment_range(
    spec: &SegmentSpec,
    limit: usize,
    element: usize,
    what: &str,
) -> TesseraResult<Range<usize>> {
    let Some(range) = spec.byte_range() else {
        tessera_bail!(
            InvalidSerde: "{} segment at {} with {} bytes overflows",
            what,
            spec.offset,
            spec.length
        );
    };
    let (Ok(start), Ok(end)) = (usize::try_from(range.start), usize::try_from(range.end)) else {
        tessera_bail!(
            InvalidSerde: "{} segment {}..{} is out of range",
            what,
            range.start,
            range.end
        );
    };
    if start > end || end > limit {
        tessera_bail!(
            InvalidSerde: "{} segment {}..{} exceeds the {} data bytes",
            what,
            start,
            end,
            limit
        );
    }
    if start % MIN_ALIGNMENT != 0 {
        tessera_bail!(InvalidSerde: "{} segment at {} is misaligned", what, start);
    }
    if (end - start) % element != 0 {
        tessera_bail!(
            InvalidSerde: "{} segment of {} bytes is not a multiple of {}",
            what,
            end - start,
            element
        );
    }
    Ok(start..end)
}

fn element_width(kind: FieldKind) -> usize {
    match kind {
        FieldKind::Str | FieldKind::Bytes => 1,
        FieldKind::WStr => 2,
        other => other.byte_width().unwrap_or(1),
    }
}

impl FixedLayer {
    fn parse(footer: LayerFooter, bytes: &[u8], limit: usize) -> TesseraResult<Self> {
        let rows = footer.rows as usize;
        let mut columns = Vec::with_capacity(footer.columns.len());
        let mut segments = Vec::with_capacity(footer.columns.len());
        for column in footer.columns {
            let what = format!("{}.{}", footer.name, column.name);
            let (def, segment) = Self::parse_column(column, bytes, limit, rows)
                .with_context(|| format!("invalid column {what}"))?;
            columns.push(def);
            segments.push(segment);
        }
        if let Some(duplicate) = columns.iter().map(|c| c.name()).duplicates().next() {
            tessera_bail!(InvalidSerde: "layer {} has two columns named {}", footer.name, duplicate);
        }
        Ok(Self {
            name: footer.name.into(),
            columns,
            rows: footer.rows,
            segments,
        })
    }

    fn parse_column(
        column: ColumnFooter,
        bytes: &[u8],
        limit: usize,
        rows: usize,
    ) -> TesseraResult<(ColumnDef, ColumnSegments)> {
        let kind = FieldKind::try_from(column.kind)
            .map_err(|_| tessera_err!(InvalidSerde: "unknown field kind code {}", column.kind))?;
        if kind == FieldKind::Unknown {
            tessera_bail!(InvalidSerde: "column has unknown kind");
        }
        let width = element_width(kind);
        let data = segment_range(&column.data, limit, width, "data")?;

        let offsets = match (kind.is_variable_width(), &column.offsets) {
            (false, None) => {
                if data.len() != rows * width {
                    tessera_bail!(
                        InvalidSerde: "{} bytes cannot hold {} cells of {}",
                        data.len(),
                        rows,
                        kind
                    );
                }
                None
            }
            (true, Some(spec)) => {
                let offsets = segment_range(spec, limit, size_of::<u32>(), "offsets")?;
                let values = cast_slice::<u32>(&bytes[offsets.clone()])?;
                if values.len() != rows + 1 || values[0] != 0 {
                    tessera_bail!(InvalidSerde: "offsets do not describe {} cells", rows);
                }
                if values.iter().tuple_windows().any(|(a, b)| a > b) {
                    tessera_bail!(InvalidSerde: "offsets are not monotonic");
                }
                if values[rows] as usize != data.len() / width {
                    tessera_bail!(InvalidSerde: "offsets do not cover the data segment");
                }
                Some(offsets)
            }
            (variable, _) => {
                tessera_bail!(
                    InvalidSerde: "column of kind {} {} an offsets segment",
                    kind,
                    if variable { "requires" } else { "must not have" }
                );
            }
        };

        let mut def = ColumnDef::new(column.name, kind)?
            .with_range(NormRange::new(column.vmin, column.vmax));
        if let Some(target) = column.target {
            def = def.with_target(target);
        }
        Ok((def, ColumnSegments { data, offsets }))
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn column(&self, column: usize) -> TesseraResult<&ColumnDef> {
        self.columns
            .get(column)
            .ok_or_else(|| tessera_err!(OutOfBounds: column, 0, self.columns.len()))
    }
}

impl FixedStore {
    /// Parse a serialized store in place. Nothing is copied out of `region`.
    pub fn parse(region: Region) -> TesseraResult<Self> {
        if !region.is_aligned_to(Alignment::new(MIN_ALIGNMENT)) {
            tessera_bail!(InvalidSerde: "store buffer is not {}-byte aligned", MIN_ALIGNMENT);
        }
        let bytes = region.as_slice();
        let eof = EndOfFile::parse(bytes)?;
        let footer_end = bytes.len() - EOF_SIZE;
        let footer_start = footer_end
            .checked_sub(eof.footer_length as usize)
            .filter(|start| *start >= MAGIC_BYTES.len())
            .ok_or_else(|| {
                tessera_err!(InvalidSerde: "footer length {} exceeds the store", eof.footer_length)
            })?;
        let footer = Footer::from_flexbuffer(&bytes[footer_start..footer_end])?;

        let layers = footer
            .layers
            .into_iter()
            .map(|layer| FixedLayer::parse(layer, bytes, footer_start))
            .collect::<TesseraResult<Vec<_>>>()?;
        if let Some(duplicate) = layers.iter().map(|l| l.name()).duplicates().next() {
            tessera_bail!(InvalidSerde: "two layers are named {}", duplicate);
        }
        log::debug!(
            "parsed store of {} bytes with {} layers",
            bytes.len(),
            layers.len()
        );
        Ok(Self { region, layers })
    }

    /// The serialized bytes, including every in-place update.
    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn into_region(self) -> Region {
        self.region
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn find_layer(&self, name: &str) -> Option<u32> {
        self.layers
            .iter()
            .position(|l| l.name.as_ref() == name)
            .map(|i| i as u32)
    }

    fn layer_meta(&self, index: u32) -> TesseraResult<&FixedLayer> {
        self.layers
            .get(index as usize)
            .ok_or_else(|| tessera_err!(OutOfBounds: index as usize, 0, self.layers.len()))
    }

    pub fn layer(&self, index: u32) -> TesseraResult<FixedLayerView<'_>> {
        Ok(FixedLayerView {
            layer: self.layer_meta(index)?,
            bytes: self.region.as_slice(),
        })
    }

    pub fn layers(&self) -> impl Iterator<Item = FixedLayerView<'_>> + '_ {
        self.layers.iter().map(|layer| FixedLayerView {
            layer,
            bytes: self.region.as_slice(),
        })
    }

    fn numeric_segment<T: NativeValue>(
        &self,
        layer: u32,
        column: usize,
    ) -> TesseraResult<Range<usize>> {
        let meta = self.layer_meta(layer)?;
        let def = meta.column(column)?;
        if !def.kind().is_numeric() {
            tessera_bail!(
                State: "field {} of layer {} is a {} column, not a numeric one",
                def.name(),
                meta.name,
                def.kind()
            );
        }
        if def.kind().storage_kind() != T::KIND {
            tessera_bail!(MismatchedTypes: def.kind().storage_kind(), T::KIND);
        }
        Ok(meta.segments[column].data.clone())
    }

    /// A numeric column as a typed slice. `T` must be the storage type of the column.
    pub fn column<T: NativeValue + Pod>(&self, layer: u32, column: usize) -> TesseraResult<&[T]> {
        let range = self.numeric_segment::<T>(layer, column)?;
        cast_slice(&self.region.as_slice()[range])
    }

    /// A numeric column as a mutable typed slice. `T` must be the storage type of the column.
    pub fn column_mut<T: NativeValue + Pod>(
        &mut self,
        layer: u32,
        column: usize,
    ) -> TesseraResult<&mut [T]> {
        let range = self.numeric_segment::<T>(layer, column)?;
        cast_slice_mut(&mut self.region.as_mut_slice()[range])
    }

    /// Overwrite a numeric cell. `value` is converted to the storage type of the column.
    pub fn set_scalar(
        &mut self,
        layer: u32,
        column: usize,
        row: u32,
        value: PValue,
    ) -> TesseraResult<()> {
        let row = self.layer(layer)?.check_row(row)?;
        let kind = self.layer_meta(layer)?.column(column)?.kind();
        if !kind.is_numeric() {
            tessera_bail!(State: "cannot write a {} cell in place", kind);
        }
        match_each_native_kind!(kind, |$T| {
            let cell = <$T>::try_from(value)?;
            self.column_mut::<$T>(layer, column)?[row] = cell;
        });
        Ok(())
    }

    /// Overwrite a reference cell.
    pub fn set_reference(
        &mut self,
        layer: u32,
        column: usize,
        row: u32,
        value: RowRef,
    ) -> TesseraResult<()> {
        let meta = self.layer_meta(layer)?;
        let row = self.layer(layer)?.check_row(row)?;
        let def = meta.column(column)?;
        if def.kind() != FieldKind::Ref {
            tessera_bail!(MismatchedTypes: "ref", def.kind());
        }
        let range = meta.segments[column].data.clone();
        cast_slice_mut::<u64>(&mut self.region.as_mut_slice()[range])?[row] = value.pack();
        Ok(())
    }
}

/// Read access to one layer of a [`FixedStore`].
#[derive(Debug, Clone, Copy)]
pub struct FixedLayerView<'a> {
    layer: &'a FixedLayer,
    bytes: &'a [u8],
}

impl<'a> FixedLayerView<'a> {
    pub fn meta(&self) -> &'a FixedLayer {
        self.layer
    }

    fn offsets(&self, column: usize) -> TesseraResult<&'a [u32]> {
        let bytes: &'a [u8] = self.bytes;
        let range = self.layer.segments[column].offsets.clone().ok_or_else(|| {
            tessera_err!(InvalidSerde: "column {} has no offsets", self.layer.columns[column].name())
        })?;
        cast_slice(&bytes[range])
    }
}

impl<'a> LayerRead for FixedLayerView<'a> {
    fn name(&self) -> &str {
        &self.layer.name
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.layer.columns
    }

    fn row_count(&self) -> u32 {
        self.layer.rows
    }

    fn column_slice(&self, column: usize) -> TesseraResult<ColumnSlice<'_>> {
        let kind = self.column(column)?.kind();
        let bytes: &'a [u8] = self.bytes;
        let data = &bytes[self.layer.segments[column].data.clone()];
        Ok(match kind.storage_kind() {
            FieldKind::U8 => ColumnSlice::U8(cast_slice(data)?),
            FieldKind::U16 => ColumnSlice::U16(cast_slice(data)?),
            FieldKind::U32 => ColumnSlice::U32(cast_slice(data)?),
            FieldKind::I32 => ColumnSlice::I32(cast_slice(data)?),
            FieldKind::F32 => ColumnSlice::F32(cast_slice(data)?),
            FieldKind::F64 => ColumnSlice::F64(cast_slice(data)?),
            FieldKind::Ref => ColumnSlice::Ref(cast_slice(data)?),
            FieldKind::Str => ColumnSlice::Str {
                offsets: self.offsets(column)?,
                data,
            },
            FieldKind::WStr => ColumnSlice::WStr {
                offsets: self.offsets(column)?,
                data: cast_slice(data)?,
            },
            FieldKind::Bytes => ColumnSlice::Bytes {
                offsets: self.offsets(column)?,
                data,
            },
            other => tessera_bail!(InvalidSerde: "column of kind {} cannot be read", other),
        })
    }
}
