use std::any::TypeId;
use std::sync::Arc;

use tessera_dtype::{FieldDefinition, FieldKind, PValue, SchemaDescriptor};
use tessera_error::{TesseraResult, tessera_bail};
use tessera_layout::{BuildLayer, BuildStore, ColumnDef, LayerRead, RowRef};

use crate::{MAX_NESTING, Record, Value};

/// A single cell ready to be written into a build layer.
#[derive(Debug, Clone)]
pub(crate) enum Cell {
    Scalar(PValue),
    Text(String),
    WideText(String),
    Blob(Vec<u8>),
    Reference(RowRef),
}

impl Cell {
    /// Convert a non-reference value into the cell stored for `field`.
    pub(crate) fn from_value(field: &FieldDefinition, value: Value) -> TesseraResult<Self> {
        let kind = field.kind();
        if kind.is_numeric() {
            return value.to_stored(field).map(Cell::Scalar);
        }
        Ok(match value.conform(field)? {
            Value::Str(s) => Cell::Text(s),
            Value::WStr(s) => Cell::WideText(s),
            Value::Bytes(b) => Cell::Blob(b),
            other => tessera_bail!(MismatchedTypes: kind, other.kind_name()),
        })
    }

    pub(crate) fn write(&self, layer: &mut BuildLayer, column: usize) -> TesseraResult<()> {
        match self {
            Cell::Scalar(value) => layer.set_scalar(column, *value),
            Cell::Text(value) => layer.set_text(column, value),
            Cell::WideText(value) => layer.set_wtext(column, value),
            Cell::Blob(value) => layer.set_blob(column, value),
            Cell::Reference(value) => layer.set_reference(column, *value),
        }
    }
}

#[derive(Debug)]
enum Planned {
    Cell(Cell),
    Nested(PushPlan),
}

/// The cells of a record and of every nested record that has to be pushed along with it.
///
/// Plans are collected before the store is locked for writing, since reading an attached source
/// record takes the lock itself.
#[derive(Debug)]
pub(crate) struct PushPlan {
    schema: Arc<SchemaDescriptor>,
    cells: Vec<Planned>,
}

impl PushPlan {
    /// Plan pushing `record` into the store `store_id`. Records already attached to that store
    /// are referenced in place instead of copied.
    ///
    /// A reference field a detached record never set is pushed as a default record of its
    /// target type, unless that type is already being planned further up. Such fields, and
    /// unset references of attached records, stay unset.
    pub(crate) fn new(record: &Record, store_id: u64) -> TesseraResult<Self> {
        Self::collect(record, store_id, &mut Vec::new())
    }

    fn collect(record: &Record, store_id: u64, planning: &mut Vec<TypeId>) -> TesseraResult<Self> {
        if planning.len() >= MAX_NESTING {
            tessera_bail!(
                Schema: "records nest deeper than {} levels",
                MAX_NESTING
            );
        }
        let schema = Arc::clone(record.schema());
        schema.check_declarable()?;

        planning.push(schema.type_id());
        let cells = schema
            .fields()
            .iter()
            .map(|field| Self::plan_field(record, field, store_id, planning))
            .collect::<TesseraResult<Vec<_>>>();
        planning.pop();
        Ok(Self {
            schema,
            cells: cells?,
        })
    }

    fn plan_field(
        record: &Record,
        field: &FieldDefinition,
        store_id: u64,
        planning: &mut Vec<TypeId>,
    ) -> TesseraResult<Planned> {
        if field.kind() != FieldKind::Ref {
            return Ok(Planned::Cell(Cell::from_value(
                field,
                record.get(field.name())?,
            )?));
        }

        let nested = match record.present_reference(field)? {
            Some(nested) => nested,
            None => {
                let cyclic = field
                    .target()
                    .is_some_and(|target| planning.contains(&target.type_id()));
                if record.is_attached() || cyclic {
                    return Ok(Planned::Cell(Cell::Reference(RowRef::UNSET)));
                }
                Record::try_from(Value::default_for(field)?)?
            }
        };
        Ok(match nested.location() {
            Some((store, target)) if store.id() == store_id => {
                Planned::Cell(Cell::Reference(target))
            }
            _ => Planned::Nested(Self::collect(&nested, store_id, planning)?),
        })
    }

    /// Append the planned rows, nested records first, and return the row of the outer record.
    pub(crate) fn apply(self, build: &mut BuildStore) -> TesseraResult<RowRef> {
        let cells = self
            .cells
            .into_iter()
            .map(|planned| match planned {
                Planned::Cell(cell) => Ok(cell),
                Planned::Nested(plan) => plan.apply(build).map(Cell::Reference),
            })
            .collect::<TesseraResult<Vec<_>>>()?;

        let index = ensure_layer(build, &self.schema)?;
        let layer = build.layer_mut(index)?;
        layer.begin_row()?;
        let written = cells
            .iter()
            .enumerate()
            .try_for_each(|(column, cell)| cell.write(layer, column));
        if let Err(e) = written {
            layer.abort_row();
            return Err(e);
        }
        let row = layer.end_row()?;
        Ok(RowRef::new(index, row))
    }
}

/// The index of the layer holding rows of `schema`, declaring it on first use.
pub(crate) fn ensure_layer(build: &mut BuildStore, schema: &SchemaDescriptor) -> TesseraResult<u32> {
    if let Some(index) = build.find_layer(schema.name()) {
        let layer = build.layer(index)?;
        let columns = layer.columns().iter().map(|c| (c.name().as_ref(), c.kind()));
        if !schema.matches_columns(columns) {
            tessera_bail!(
                Schema: "layer {} already holds rows of a different schema than {}",
                schema.name(),
                schema
            );
        }
        return Ok(index);
    }

    declare_layer(build, schema.name().clone(), schema)
}

/// Add a layer called `name` with one column per field of `schema`.
pub(crate) fn declare_layer(
    build: &mut BuildStore,
    name: Arc<str>,
    schema: &SchemaDescriptor,
) -> TesseraResult<u32> {
    let columns = schema
        .fields()
        .iter()
        .map(ColumnDef::try_from)
        .collect::<TesseraResult<Vec<_>>>()?;
    let index = build.add_layer(name)?;
    let layer = build.layer_mut(index)?;
    for column in columns {
        layer.add_field(column)?;
    }
    log::debug!("declared layer {} for {}", index, schema);
    Ok(index)
}
