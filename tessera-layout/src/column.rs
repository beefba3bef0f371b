use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::sync::Arc;

use tessera_dtype::{FieldDefinition, FieldKind, NormRange, PValue};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

/// The definition of one column of a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    name: Arc<str>,
    kind: FieldKind,
    range: NormRange,
    target: Option<Arc<str>>,
}

impl ColumnDef {
    pub fn new(name: impl Into<Arc<str>>, kind: FieldKind) -> TesseraResult<Self> {
        let name = name.into();
        kind.check_declarable(&name)?;
        Ok(Self {
            name,
            kind,
            range: NormRange::default(),
            target: None,
        })
    }

    /// The value range of a normalized column.
    pub fn with_range(mut self, range: NormRange) -> Self {
        self.range = range;
        self
    }

    /// The name of the layer a reference column points into, when known.
    pub fn with_target(mut self, target: impl Into<Arc<str>>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn range(&self) -> NormRange {
        self.range
    }

    pub fn target(&self) -> Option<&Arc<str>> {
        self.target.as_ref()
    }
}

impl TryFrom<&FieldDefinition> for ColumnDef {
    type Error = tessera_error::TesseraError;

    fn try_from(field: &FieldDefinition) -> Result<Self, Self::Error> {
        let column = ColumnDef::new(field.name().clone(), field.kind())?.with_range(field.range());
        Ok(match field.target() {
            Some(target) => column.with_target(target.name()),
            None => column,
        })
    }
}

impl Display for ColumnDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.kind)?;
        if let Some(target) = &self.target {
            write!(f, "<{target}>")?;
        }
        if self.kind.is_normalized() {
            write!(f, "[{}, {}]", self.range.vmin, self.range.vmax)?;
        }
        Ok(())
    }
}

/// The stored form of a reference: a row of a layer in the same store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRef {
    pub layer: u32,
    pub row: u32,
}

impl RowRef {
    /// The value of a reference that has never been assigned.
    pub const UNSET: RowRef = RowRef {
        layer: u32::MAX,
        row: 0,
    };

    pub const fn new(layer: u32, row: u32) -> Self {
        Self { layer, row }
    }

    pub const fn is_unset(&self) -> bool {
        self.layer == u32::MAX
    }

    /// Pack into a single cell, layer in the low half.
    pub const fn pack(self) -> u64 {
        (self.row as u64) << 32 | self.layer as u64
    }

    pub const fn unpack(cell: u64) -> Self {
        Self {
            layer: cell as u32,
            row: (cell >> 32) as u32,
        }
    }
}

impl Display for RowRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_unset() {
            f.write_str("unset")
        } else {
            write!(f, "{}:{}", self.layer, self.row)
        }
    }
}

/// A borrowed view over every cell of one column.
#[derive(Debug, Clone, Copy)]
pub enum ColumnSlice<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
    I32(&'a [i32]),
    F32(&'a [f32]),
    F64(&'a [f64]),
    Ref(&'a [u64]),
    Str { offsets: &'a [u32], data: &'a [u8] },
    WStr { offsets: &'a [u32], data: &'a [u16] },
    Bytes { offsets: &'a [u32], data: &'a [u8] },
}

fn cell<T: Copy>(values: &[T], row: usize) -> TesseraResult<T> {
    values
        .get(row)
        .copied()
        .ok_or_else(|| tessera_err!(OutOfBounds: row, 0, values.len()))
}

fn span(offsets: &[u32], row: usize, data_len: usize) -> TesseraResult<Range<usize>> {
    let (Some(&start), Some(&end)) = (offsets.get(row), offsets.get(row + 1)) else {
        tessera_bail!(OutOfBounds: row, 0, offsets.len().saturating_sub(1));
    };
    let (start, end) = (start as usize, end as usize);
    if start > end || end > data_len {
        tessera_bail!(
            InvalidSerde: "cell {} spans {}..{} outside of {} data elements",
            row,
            start,
            end,
            data_len
        );
    }
    Ok(start..end)
}

impl<'a> ColumnSlice<'a> {
    /// The number of cells, including a row still being appended.
    pub fn len(&self) -> usize {
        match self {
            ColumnSlice::U8(v) => v.len(),
            ColumnSlice::U16(v) => v.len(),
            ColumnSlice::U32(v) => v.len(),
            ColumnSlice::I32(v) => v.len(),
            ColumnSlice::F32(v) => v.len(),
            ColumnSlice::F64(v) => v.len(),
            ColumnSlice::Ref(v) => v.len(),
            ColumnSlice::Str { offsets, .. }
            | ColumnSlice::WStr { offsets, .. }
            | ColumnSlice::Bytes { offsets, .. } => offsets.len().saturating_sub(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnSlice::U8(_) => "u8",
            ColumnSlice::U16(_) => "u16",
            ColumnSlice::U32(_) => "u32",
            ColumnSlice::I32(_) => "i32",
            ColumnSlice::F32(_) => "f32",
            ColumnSlice::F64(_) => "f64",
            ColumnSlice::Ref(_) => "ref",
            ColumnSlice::Str { .. } => "str",
            ColumnSlice::WStr { .. } => "wstr",
            ColumnSlice::Bytes { .. } => "bytes",
        }
    }

    /// The first `rows` cells.
    pub fn head(self, rows: usize) -> TesseraResult<ColumnSlice<'a>> {
        if rows > self.len() {
            tessera_bail!(OutOfBounds: rows, 0, self.len());
        }
        fn var<'b, T>(offsets: &'b [u32], data: &'b [T], rows: usize) -> (&'b [u32], &'b [T]) {
            let end = offsets[rows] as usize;
            (&offsets[..=rows], &data[..end.min(data.len())])
        }
        Ok(match self {
            ColumnSlice::U8(v) => ColumnSlice::U8(&v[..rows]),
            ColumnSlice::U16(v) => ColumnSlice::U16(&v[..rows]),
            ColumnSlice::U32(v) => ColumnSlice::U32(&v[..rows]),
            ColumnSlice::I32(v) => ColumnSlice::I32(&v[..rows]),
            ColumnSlice::F32(v) => ColumnSlice::F32(&v[..rows]),
            ColumnSlice::F64(v) => ColumnSlice::F64(&v[..rows]),
            ColumnSlice::Ref(v) => ColumnSlice::Ref(&v[..rows]),
            ColumnSlice::Str { offsets, data } => {
                let (offsets, data) = var(offsets, data, rows);
                ColumnSlice::Str { offsets, data }
            }
            ColumnSlice::WStr { offsets, data } => {
                let (offsets, data) = var(offsets, data, rows);
                ColumnSlice::WStr { offsets, data }
            }
            ColumnSlice::Bytes { offsets, data } => {
                let (offsets, data) = var(offsets, data, rows);
                ColumnSlice::Bytes { offsets, data }
            }
        })
    }

    /// The stored value of a numeric cell. Normalized cells are returned quantized.
    pub fn scalar(&self, row: usize) -> TesseraResult<PValue> {
        Ok(match self {
            ColumnSlice::U8(v) => PValue::U8(cell(v, row)?),
            ColumnSlice::U16(v) => PValue::U16(cell(v, row)?),
            ColumnSlice::U32(v) => PValue::U32(cell(v, row)?),
            ColumnSlice::I32(v) => PValue::I32(cell(v, row)?),
            ColumnSlice::F32(v) => PValue::F32(cell(v, row)?),
            ColumnSlice::F64(v) => PValue::F64(cell(v, row)?),
            other => tessera_bail!(MismatchedTypes: "numeric column", other.kind_name()),
        })
    }

    pub fn text(&self, row: usize) -> TesseraResult<&'a str> {
        let ColumnSlice::Str { offsets, data } = *self else {
            tessera_bail!(MismatchedTypes: "str", self.kind_name());
        };
        let bytes = &data[span(offsets, row, data.len())?];
        std::str::from_utf8(bytes)
            .map_err(|e| tessera_err!(InvalidSerde: "cell {} is not valid UTF-8: {}", row, e))
    }

    pub fn wide_text(&self, row: usize) -> TesseraResult<String> {
        let ColumnSlice::WStr { offsets, data } = *self else {
            tessera_bail!(MismatchedTypes: "wstr", self.kind_name());
        };
        let units = &data[span(offsets, row, data.len())?];
        String::from_utf16(units)
            .map_err(|e| tessera_err!(InvalidSerde: "cell {} is not valid UTF-16: {}", row, e))
    }

    pub fn blob(&self, row: usize) -> TesseraResult<&'a [u8]> {
        let ColumnSlice::Bytes { offsets, data } = *self else {
            tessera_bail!(MismatchedTypes: "bytes", self.kind_name());
        };
        Ok(&data[span(offsets, row, data.len())?])
    }

    pub fn reference(&self, row: usize) -> TesseraResult<RowRef> {
        let ColumnSlice::Ref(cells) = *self else {
            tessera_bail!(MismatchedTypes: "ref", self.kind_name());
        };
        Ok(RowRef::unpack(cell(cells, row)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_ref_packing() {
        let reference = RowRef::new(3, 70_000);
        assert_eq!(RowRef::unpack(reference.pack()), reference);
        assert!(RowRef::unpack(RowRef::UNSET.pack()).is_unset());
        assert_eq!(RowRef::UNSET.to_string(), "unset");
    }

    #[test]
    fn variable_cells() {
        let slice = ColumnSlice::Str {
            offsets: &[0, 3, 3, 8],
            data: b"abcdefgh",
        };
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.text(0).unwrap(), "abc");
        assert_eq!(slice.text(1).unwrap(), "");
        assert_eq!(slice.text(2).unwrap(), "defgh");
        assert!(slice.text(3).unwrap_err().is_out_of_bounds());
        assert!(slice.blob(0).unwrap_err().is_mismatched_types());
    }

    #[test]
    fn head_drops_pending_cells() {
        let slice = ColumnSlice::Bytes {
            offsets: &[0, 2, 5],
            data: &[1, 2, 3, 4, 5],
        };
        let ColumnSlice::Bytes { offsets, data } = slice.head(1).unwrap() else {
            unreachable!()
        };
        assert_eq!(offsets, &[0, 2]);
        assert_eq!(data, &[1, 2]);
    }

    #[test]
    fn corrupt_offsets() {
        let slice = ColumnSlice::Bytes {
            offsets: &[0, 9],
            data: &[1, 2],
        };
        assert!(slice.blob(0).is_err());
    }

    #[test]
    fn scalar_kinds() {
        assert_eq!(ColumnSlice::I32(&[-4]).scalar(0).unwrap(), PValue::I32(-4));
        assert!(ColumnSlice::Ref(&[0]).scalar(0).unwrap_err().is_mismatched_types());
    }

    #[test]
    fn column_from_field() {
        let column = ColumnDef::new("weight", FieldKind::U16n)
            .unwrap()
            .with_range(NormRange::new(0.0, 10.0));
        assert_eq!(column.to_string(), "weight: u16n[0, 10]");
        assert!(ColumnDef::new("x", FieldKind::Unknown).unwrap_err().is_schema());
    }
}
