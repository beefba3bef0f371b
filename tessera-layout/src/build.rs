use std::sync::Arc;

use tessera_dtype::{FieldKind, PValue};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::{ColumnDef, ColumnSlice, LayerRead, RowRef};

/// Variable-width cells: `rows + 1` offsets into a flat data vector.
#[derive(Debug, Clone)]
struct VarColumn<T> {
    offsets: Vec<u32>,
    data: Vec<T>,
}

impl<T: Copy> VarColumn<T> {
    fn new() -> Self {
        Self {
            offsets: vec![0],
            data: Vec::new(),
        }
    }

    fn rows(&self) -> usize {
        self.offsets.len() - 1
    }

    fn push_blank(&mut self, count: usize) {
        let end = self.offsets[self.rows()];
        self.offsets.resize(self.offsets.len() + count, end);
    }

    /// Replace the contents of the last cell.
    fn set_last(&mut self, values: &[T]) -> TesseraResult<()> {
        let row = self.rows() - 1;
        let start = self.offsets[row];
        self.data.truncate(start as usize);
        self.data.extend_from_slice(values);
        self.offsets[row + 1] = u32::try_from(self.data.len()).map_err(|_| {
            tessera_err!(Capacity: "variable-width column exceeds {} elements", u32::MAX)
        })?;
        Ok(())
    }

    fn truncate(&mut self, rows: usize) {
        self.offsets.truncate(rows + 1);
        self.data.truncate(self.offsets[rows] as usize);
    }
}

#[derive(Debug, Clone)]
enum ColumnData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Ref(Vec<u64>),
    Str(VarColumn<u8>),
    WStr(VarColumn<u16>),
    Bytes(VarColumn<u8>),
}

macro_rules! each_fixed {
    ($self:expr, | $v:ident | $body:expr, | $var:ident | $var_body:expr) => {
        match $self {
            ColumnData::U8($v) => $body,
            ColumnData::U16($v) => $body,
            ColumnData::U32($v) => $body,
            ColumnData::I32($v) => $body,
            ColumnData::F32($v) => $body,
            ColumnData::F64($v) => $body,
            ColumnData::Ref($v) => $body,
            ColumnData::Str($var) => $var_body,
            ColumnData::WStr($var) => $var_body,
            ColumnData::Bytes($var) => $var_body,
        }
    };
}

impl ColumnData {
    fn new(kind: FieldKind) -> TesseraResult<Self> {
        Ok(match kind.storage_kind() {
            FieldKind::U8 => Self::U8(Vec::new()),
            FieldKind::U16 => Self::U16(Vec::new()),
            FieldKind::U32 => Self::U32(Vec::new()),
            FieldKind::I32 => Self::I32(Vec::new()),
            FieldKind::F32 => Self::F32(Vec::new()),
            FieldKind::F64 => Self::F64(Vec::new()),
            FieldKind::Ref => Self::Ref(Vec::new()),
            FieldKind::Str => Self::Str(VarColumn::new()),
            FieldKind::WStr => Self::WStr(VarColumn::new()),
            FieldKind::Bytes => Self::Bytes(VarColumn::new()),
            other => tessera_bail!(Schema: "cannot store a column of kind {}", other),
        })
    }

    fn push_blank(&mut self, count: usize) {
        match self {
            Self::Ref(cells) => cells.resize(cells.len() + count, RowRef::UNSET.pack()),
            other => each_fixed!(
                other,
                |v| v.resize(v.len() + count, Default::default()),
                |var| var.push_blank(count)
            ),
        }
    }

    fn truncate(&mut self, rows: usize) {
        each_fixed!(self, |v| v.truncate(rows), |var| var.truncate(rows))
    }

    fn set_scalar(&mut self, row: usize, value: PValue) -> TesseraResult<()> {
        fn put<T>(values: &mut [T], row: usize, value: T) {
            values[row] = value;
        }
        match (self, value) {
            (Self::U8(v), PValue::U8(x)) => put(v, row, x),
            (Self::U16(v), PValue::U16(x)) => put(v, row, x),
            (Self::U32(v), PValue::U32(x)) => put(v, row, x),
            (Self::I32(v), PValue::I32(x)) => put(v, row, x),
            (Self::F32(v), PValue::F32(x)) => put(v, row, x),
            (Self::F64(v), PValue::F64(x)) => put(v, row, x),
            (column, value) => {
                tessera_bail!(MismatchedTypes: column.as_slice().kind_name(), value.kind())
            }
        }
        Ok(())
    }

    fn as_slice(&self) -> ColumnSlice<'_> {
        match self {
            Self::U8(v) => ColumnSlice::U8(v),
            Self::U16(v) => ColumnSlice::U16(v),
            Self::U32(v) => ColumnSlice::U32(v),
            Self::I32(v) => ColumnSlice::I32(v),
            Self::F32(v) => ColumnSlice::F32(v),
            Self::F64(v) => ColumnSlice::F64(v),
            Self::Ref(v) => ColumnSlice::Ref(v),
            Self::Str(var) => ColumnSlice::Str {
                offsets: &var.offsets,
                data: &var.data,
            },
            Self::WStr(var) => ColumnSlice::WStr {
                offsets: &var.offsets,
                data: &var.data,
            },
            Self::Bytes(var) => ColumnSlice::Bytes {
                offsets: &var.offsets,
                data: &var.data,
            },
        }
    }
}

/// A growable layer.
///
/// Rows are appended in three steps: [`BuildLayer::begin_row`] appends a blank row that is not yet
/// visible, the `set_*` methods fill its cells, and [`BuildLayer::end_row`] commits it.
/// [`BuildLayer::abort_row`] drops the pending row instead.
#[derive(Debug, Clone)]
pub struct BuildLayer {
    name: Arc<str>,
    columns: Vec<ColumnDef>,
    data: Vec<ColumnData>,
    rows: u32,
    pending: bool,
}

impl BuildLayer {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            columns: Vec::new(),
            data: Vec::new(),
            rows: 0,
            pending: false,
        }
    }

    /// Add a column. Columns can only be added while the layer has no rows.
    pub fn add_field(&mut self, column: ColumnDef) -> TesseraResult<usize> {
        if self.rows > 0 || self.pending {
            tessera_bail!(
                State: "cannot add field {} to layer {} after rows were appended",
                column.name(),
                self.name
            );
        }
        if self.column_index(column.name()).is_some() {
            tessera_bail!(Schema: "layer {} already has a field {}", self.name, column.name());
        }
        self.data.push(ColumnData::new(column.kind())?);
        self.columns.push(column);
        Ok(self.columns.len() - 1)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Append a blank row and return its index. It stays invisible until [`Self::end_row`].
    pub fn begin_row(&mut self) -> TesseraResult<u32> {
        if self.pending {
            tessera_bail!(State: "layer {} already has a row in progress", self.name);
        }
        if self.rows == u32::MAX {
            tessera_bail!(Capacity: "layer {} is full", self.name);
        }
        self.data.iter_mut().for_each(|c| c.push_blank(1));
        self.pending = true;
        Ok(self.rows)
    }

    /// Commit the pending row and return its index.
    pub fn end_row(&mut self) -> TesseraResult<u32> {
        if !self.pending {
            tessera_bail!(State: "layer {} has no row in progress", self.name);
        }
        self.pending = false;
        self.rows += 1;
        Ok(self.rows - 1)
    }

    /// Discard the pending row, if any.
    pub fn abort_row(&mut self) {
        if self.pending {
            let rows = self.rows as usize;
            self.data.iter_mut().for_each(|c| c.truncate(rows));
            self.pending = false;
            log::trace!("aborted pending row {} of layer {}", rows, self.name);
        }
    }

    /// Append `count` committed blank rows.
    pub fn append_blank(&mut self, count: u32) -> TesseraResult<()> {
        if self.pending {
            tessera_bail!(State: "layer {} has a row in progress", self.name);
        }
        let rows = self.rows.checked_add(count).ok_or_else(|| {
            tessera_err!(Capacity: "layer {} cannot hold {} more rows", self.name, count)
        })?;
        self.data
            .iter_mut()
            .for_each(|c| c.push_blank(count as usize));
        self.rows = rows;
        Ok(())
    }

    fn pending_column(&mut self, column: usize) -> TesseraResult<&mut ColumnData> {
        if !self.pending {
            tessera_bail!(State: "layer {} has no row in progress", self.name);
        }
        let len = self.data.len();
        self.data
            .get_mut(column)
            .ok_or_else(|| tessera_err!(OutOfBounds: column, 0, len))
    }

    /// Set a numeric cell of the pending row. `value` must already be in storage representation.
    pub fn set_scalar(&mut self, column: usize, value: PValue) -> TesseraResult<()> {
        let row = self.rows as usize;
        self.pending_column(column)?.set_scalar(row, value)
    }

    pub fn set_text(&mut self, column: usize, value: &str) -> TesseraResult<()> {
        match self.pending_column(column)? {
            ColumnData::Str(var) => var.set_last(value.as_bytes()),
            other => tessera_bail!(MismatchedTypes: other.as_slice().kind_name(), "str"),
        }
    }

    pub fn set_wtext(&mut self, column: usize, value: &str) -> TesseraResult<()> {
        match self.pending_column(column)? {
            ColumnData::WStr(var) => {
                let units: Vec<u16> = value.encode_utf16().collect();
                var.set_last(&units)
            }
            other => tessera_bail!(MismatchedTypes: other.as_slice().kind_name(), "wstr"),
        }
    }

    pub fn set_blob(&mut self, column: usize, value: &[u8]) -> TesseraResult<()> {
        match self.pending_column(column)? {
            ColumnData::Bytes(var) => var.set_last(value),
            other => tessera_bail!(MismatchedTypes: other.as_slice().kind_name(), "bytes"),
        }
    }

    pub fn set_reference(&mut self, column: usize, value: RowRef) -> TesseraResult<()> {
        let row = self.rows as usize;
        match self.pending_column(column)? {
            ColumnData::Ref(cells) => {
                cells[row] = value.pack();
                Ok(())
            }
            other => tessera_bail!(MismatchedTypes: other.as_slice().kind_name(), "ref"),
        }
    }
}

impl LayerRead for BuildLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn row_count(&self) -> u32 {
        self.rows
    }

    fn column_slice(&self, column: usize) -> TesseraResult<ColumnSlice<'_>> {
        self.data
            .get(column)
            .map(ColumnData::as_slice)
            .ok_or_else(|| tessera_err!(OutOfBounds: column, 0, self.data.len()))
    }
}

/// A store under construction: an ordered list of growable layers.
#[derive(Debug, Clone, Default)]
pub struct BuildStore {
    layers: Vec<BuildLayer>,
}

impl BuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty layer and return its index.
    pub fn add_layer(&mut self, name: impl Into<Arc<str>>) -> TesseraResult<u32> {
        let name = name.into();
        if self.find_layer(&name).is_some() {
            tessera_bail!(State: "layer {} already exists", name);
        }
        let index = u32::try_from(self.layers.len())
            .map_err(|_| tessera_err!(Capacity: "too many layers"))?;
        if index == RowRef::UNSET.layer {
            tessera_bail!(Capacity: "too many layers");
        }
        log::debug!("adding layer {name} at index {index}");
        self.layers.push(BuildLayer::new(name));
        Ok(index)
    }

    pub fn find_layer(&self, name: &str) -> Option<u32> {
        self.layers
            .iter()
            .position(|l| l.name.as_ref() == name)
            .map(|i| i as u32)
    }

    pub fn layer(&self, index: u32) -> TesseraResult<&BuildLayer> {
        self.layers
            .get(index as usize)
            .ok_or_else(|| tessera_err!(OutOfBounds: index as usize, 0, self.layers.len()))
    }

    pub fn layer_mut(&mut self, index: u32) -> TesseraResult<&mut BuildLayer> {
        let len = self.layers.len();
        self.layers
            .get_mut(index as usize)
            .ok_or_else(|| tessera_err!(OutOfBounds: index as usize, 0, len))
    }

    pub fn layers(&self) -> &[BuildLayer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Discard every pending row.
    pub fn abort_pending(&mut self) {
        self.layers.iter_mut().for_each(BuildLayer::abort_row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> BuildLayer {
        let mut layer = BuildLayer::new("Point".into());
        layer
            .add_field(ColumnDef::new("x", FieldKind::F64).unwrap())
            .unwrap();
        layer
            .add_field(ColumnDef::new("label", FieldKind::Str).unwrap())
            .unwrap();
        layer
    }

    #[test]
    fn append_commits_rows() {
        let mut layer = points();
        let row = layer.begin_row().unwrap();
        layer.set_scalar(0, PValue::F64(1.5)).unwrap();
        layer.set_text(1, "first").unwrap();
        assert_eq!(layer.row_count(), 0);
        assert!(layer.get_scalar(0, row).unwrap_err().is_out_of_bounds());
        assert_eq!(layer.end_row().unwrap(), 0);

        assert_eq!(layer.get_scalar(0, 0).unwrap(), PValue::F64(1.5));
        assert_eq!(layer.get_text(1, 0).unwrap(), "first");
    }

    #[test]
    fn abort_discards_row() {
        let mut layer = points();
        layer.begin_row().unwrap();
        layer.set_text(1, "kept").unwrap();
        layer.end_row().unwrap();

        layer.begin_row().unwrap();
        layer.set_text(1, "dropped").unwrap();
        layer.abort_row();
        assert_eq!(layer.row_count(), 1);

        layer.begin_row().unwrap();
        layer.end_row().unwrap();
        assert_eq!(layer.get_text(1, 1).unwrap(), "");
        assert_eq!(layer.get_text(1, 0).unwrap(), "kept");
    }

    #[test]
    fn fields_are_fixed_after_rows() {
        let mut layer = points();
        layer.append_blank(2).unwrap();
        let err = layer
            .add_field(ColumnDef::new("y", FieldKind::F64).unwrap())
            .unwrap_err();
        assert!(err.is_state());
    }

    #[test]
    fn set_requires_pending_row() {
        let mut layer = points();
        assert!(layer.set_scalar(0, PValue::F64(0.0)).unwrap_err().is_state());
        layer.begin_row().unwrap();
        assert!(layer.begin_row().unwrap_err().is_state());
        assert!(
            layer
                .set_scalar(0, PValue::U8(1))
                .unwrap_err()
                .is_mismatched_types()
        );
        assert!(layer.set_blob(1, b"x").unwrap_err().is_mismatched_types());
    }

    #[test]
    fn blank_references_are_unset() {
        let mut layer = BuildLayer::new("Edge".into());
        layer
            .add_field(ColumnDef::new("to", FieldKind::Ref).unwrap())
            .unwrap();
        layer.append_blank(3).unwrap();
        assert!(layer.get_reference(0, 2).unwrap().is_unset());
    }

    #[test]
    fn duplicate_layers() {
        let mut store = BuildStore::new();
        assert_eq!(store.add_layer("a").unwrap(), 0);
        assert_eq!(store.add_layer("b").unwrap(), 1);
        assert!(store.add_layer("a").unwrap_err().is_state());
        assert_eq!(store.find_layer("b"), Some(1));
    }
}
