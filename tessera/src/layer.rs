use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock};

use itertools::Itertools;
use tessera_dtype::{FieldKind, SchemaDescriptor};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};
use tessera_layout::{ColumnDef, LayerRead, RowRef};

use crate::push::{Cell, PushPlan};
use crate::{ColumnView, Record, Reference, Store, Value};

/// The rows of one record type within a [`Store`].
///
/// A layer is a handle: it reads the row count from the store on every call, so rows pushed
/// after the handle was obtained are visible through it.
#[derive(Debug)]
pub struct Layer {
    store: Store,
    index: u32,
    name: Arc<str>,
    schema: Arc<SchemaDescriptor>,
    cursor: Option<u32>,
    columns: OnceLock<ColumnView>,
}

impl Layer {
    pub(crate) fn new(store: Store, index: u32, name: Arc<str>, schema: Arc<SchemaDescriptor>) -> Self {
        Self {
            store,
            index,
            name,
            schema,
            cursor: None,
            columns: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// The position of the layer within its store.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    pub fn is_fixed(&self) -> bool {
        self.store.is_fixed()
    }

    /// The number of committed rows. Zero once the store is detached.
    pub fn len(&self) -> usize {
        self.rows().map_or(0, |rows| rows as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> TesseraResult<u32> {
        self.store
            .read()
            .engine()?
            .with_layer(self.index, |layer| Ok(layer.row_count()))
    }

    fn record(&self, row: u32) -> Record {
        Record::attached(
            Arc::clone(&self.schema),
            self.store.clone(),
            RowRef::new(self.index, row),
        )
    }

    /// The record at row `index`.
    pub fn get(&self, index: usize) -> TesseraResult<Record> {
        let rows = self.rows()?;
        let row = u32::try_from(index)
            .ok()
            .filter(|row| *row < rows)
            .ok_or_else(|| tessera_err!(OutOfBounds: index, 0, rows as usize))?;
        Ok(self.record(row))
    }

    /// Every committed row, in order.
    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        let rows = self.rows().unwrap_or(0);
        (0..rows).map(|row| self.record(row))
    }

    /// Move the cursor back before the first row.
    pub fn rewind(&mut self) {
        self.cursor = None;
    }

    /// Advance the cursor. Returns `false` once it has moved past the last row.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let rows = self.rows().unwrap_or(0);
        let next = self.cursor.map_or(0, |row| row.saturating_add(1)).min(rows);
        self.cursor = Some(next);
        next < rows
    }

    /// The row under the cursor, `None` before the first [`Layer::next`] and past the end.
    pub fn position(&self) -> Option<u32> {
        let rows = self.rows().ok()?;
        self.cursor.filter(|row| *row < rows)
    }

    /// The record under the cursor.
    pub fn row(&self) -> TesseraResult<Record> {
        match self.cursor {
            Some(row) if row < self.rows()? => Ok(self.record(row)),
            _ => Err(tessera_err!(State: "the cursor of layer {} is not on a row", self.name)),
        }
    }

    /// Whole-column access to a fixed layer. The view is created once per handle.
    pub fn column(&self) -> TesseraResult<&ColumnView> {
        if !self.is_fixed() {
            tessera_bail!(State: "layer {} is not fixed, columns are unavailable", self.name);
        }
        Ok(self.columns.get_or_init(|| {
            ColumnView::new(self.store.clone(), self.index, Arc::clone(&self.schema))
        }))
    }

    /// Start appending a row to a layer of a store that is being built.
    ///
    /// Values are staged in the guard and the row is appended when [`RowGuard::commit`] is
    /// called. Dropping the guard without committing discards the row.
    pub fn begin_row(&self) -> TesseraResult<RowGuard> {
        self.store.write().build_mut()?.layer_mut(self.index)?;
        Ok(RowGuard {
            store: self.store.clone(),
            schema: Arc::clone(&self.schema),
            layer: self.index,
            cells: vec![None; self.schema.len()],
            committed: false,
        })
    }
}

/// A row being appended to a build layer. See [`Layer::begin_row`].
#[derive(Debug)]
#[must_use = "a row is discarded unless it is committed"]
pub struct RowGuard {
    store: Store,
    schema: Arc<SchemaDescriptor>,
    layer: u32,
    /// Staged values by field ordinal. Fields left unset are written blank.
    cells: Vec<Option<Cell>>,
    committed: bool,
}

impl RowGuard {
    /// Set a field of the pending row.
    ///
    /// A record assigned to a reference field is pushed right away unless it is already
    /// attached to this store. It stays in the store even if the row is never committed.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> TesseraResult<()> {
        let field = self.schema.field(name)?;
        let cell = match (field.kind(), value.into()) {
            (FieldKind::Ref, Value::Record(record)) => {
                let target = field.target().ok_or_else(|| {
                    tessera_err!(Schema: "reference field \"{}\" has no target", name)
                })?;
                if target.type_id() != record.schema().type_id() {
                    tessera_bail!(MismatchedTypes: target.name(), record.schema().name());
                }
                match record.location() {
                    Some((store, target)) if store.id() == self.store.id() => {
                        Cell::Reference(target)
                    }
                    _ => {
                        let plan = PushPlan::new(&record, self.store.id())?;
                        Cell::Reference(plan.apply(self.store.write().build_mut()?)?)
                    }
                }
            }
            (FieldKind::Ref, other) => {
                tessera_bail!(MismatchedTypes: "record", other.kind_name())
            }
            (_, value) => Cell::from_value(field, value)?,
        };
        self.cells[field.ordinal() as usize] = Some(cell);
        Ok(())
    }

    /// Append the row and return a reference to it.
    pub fn commit(mut self) -> TesseraResult<Reference> {
        self.committed = true;
        let mut state = self.store.write();
        let layer = state.build_mut()?.layer_mut(self.layer)?;
        layer.begin_row()?;
        let written = self
            .cells
            .iter()
            .enumerate()
            .filter_map(|(column, cell)| cell.as_ref().map(|cell| (column, cell)))
            .try_for_each(|(column, cell)| cell.write(layer, column));
        if let Err(e) = written {
            layer.abort_row();
            return Err(e);
        }
        let row = layer.end_row()?;
        Ok(Reference::new(self.store.id(), RowRef::new(self.layer, row)))
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        if !self.committed {
            log::trace!("discarded an uncommitted row of {}", self.schema.name());
        }
    }
}

/// A summary of one layer of a store.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    name: Arc<str>,
    rows: u32,
    columns: Vec<ColumnDef>,
}

impl LayerInfo {
    pub(crate) fn of(layer: &dyn LayerRead) -> Self {
        Self {
            name: layer.name().into(),
            rows: layer.row_count(),
            columns: layer.columns().to_vec(),
        }
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
}

impl Display for LayerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} rows) {{{}}}",
            self.name,
            self.rows,
            self.columns.iter().format(", ")
        )
    }
}
