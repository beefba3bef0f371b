use std::collections::HashMap;
use std::sync::Arc;

use tessera_dtype::{FieldDefinition, FieldKind, FieldName, Schema, SchemaDescriptor, describe};
use tessera_error::{TesseraError, TesseraResult, tessera_bail, tessera_err};
use tessera_layout::{LayerRead, RowRef};

use crate::{MAX_NESTING, Reference, Store, Value, resolve};

#[derive(Debug, Clone)]
enum Repr {
    /// Values not yet written to any store. Fields that were never set read as their default.
    Detached(HashMap<FieldName, Value>),
    /// A row of a layer.
    Attached { store: Store, target: RowRef },
}

/// One row of a record type.
///
/// A detached record caches its values in memory until it is [pushed](Store::push). An attached
/// record reads and writes straight through to a row of a store, so two attached records of the
/// same row always agree.
///
/// Writes to attached records are limited to what a fixed store can update in place: numeric
/// fields are overwritten, and assigning a record to a reference field copies its fields into
/// the record currently referenced. Use [`Record::link`] to point the reference elsewhere.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<SchemaDescriptor>,
    repr: Repr,
}

/// Fails unless the layer column at `column` is the one `field` describes.
pub(crate) fn check_column(
    layer: &dyn LayerRead,
    column: usize,
    field: &FieldDefinition,
) -> TesseraResult<()> {
    let def = layer.column(column)?;
    if def.name() != field.name() || def.kind() != field.kind() {
        tessera_bail!(
            Schema: "column {} of layer {} is {}, expected field {}",
            column,
            layer.name(),
            def,
            field
        );
    }
    Ok(())
}

impl Record {
    /// A detached record of type `S` with every field at its default.
    pub fn new<S: Schema>() -> Self {
        Self::detached(describe::<S>())
    }

    pub fn detached(schema: Arc<SchemaDescriptor>) -> Self {
        Self {
            schema,
            repr: Repr::Detached(HashMap::new()),
        }
    }

    pub(crate) fn attached(schema: Arc<SchemaDescriptor>, store: Store, target: RowRef) -> Self {
        Self {
            schema,
            repr: Repr::Attached { store, target },
        }
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.repr, Repr::Attached { .. })
    }

    /// The row an attached record is bound to.
    pub fn reference(&self) -> Option<Reference> {
        self.location()
            .map(|(store, target)| Reference::new(store.id(), target))
    }

    pub(crate) fn location(&self) -> Option<(&Store, RowRef)> {
        match &self.repr {
            Repr::Attached { store, target } => Some((store, *target)),
            Repr::Detached(_) => None,
        }
    }

    pub fn get(&self, name: &str) -> TesseraResult<Value> {
        let field = self.schema.field(name)?;
        match &self.repr {
            Repr::Detached(values) => match values.get(name) {
                Some(value) => Ok(value.clone()),
                None => Value::default_for(field),
            },
            Repr::Attached { store, target } => {
                if field.kind() == FieldKind::Ref {
                    let nested = read_reference(store, *target, field)?;
                    if nested.is_unset() {
                        tessera_bail!(
                            State: "reference field {} of {} row {} is unset",
                            name,
                            self.schema.name(),
                            target.row
                        );
                    }
                    Ok(Value::from(self.resolve_target(field, store, nested)?))
                } else {
                    read_field(store, *target, field)
                }
            }
        }
    }

    /// Read a field and convert it, e.g. `record.get_as::<f64>("x")`.
    pub fn get_as<T>(&self, name: &str) -> TesseraResult<T>
    where
        T: TryFrom<Value, Error = TesseraError>,
    {
        T::try_from(self.get(name)?)
    }

    /// Every field in declaration order.
    pub fn values(&self) -> TesseraResult<Vec<(FieldName, Value)>> {
        self.schema
            .fields()
            .iter()
            .map(|field| Ok((field.name().clone(), self.get(field.name())?)))
            .collect()
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> TesseraResult<()> {
        let schema = Arc::clone(&self.schema);
        self.assign(schema.field(name)?, value.into(), 0)
    }

    /// Builder form of [`Record::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> TesseraResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Point the reference field `name` of this attached record at `target`, another attached
    /// record of the same fixed store.
    pub fn link(&mut self, name: &str, target: &Record) -> TesseraResult<()> {
        let field = self.schema.field(name)?;
        check_reference(field, target)?;
        let Repr::Attached { store, target: row } = &self.repr else {
            tessera_bail!(State: "only attached records can be linked");
        };
        let Some((other, destination)) = target.location() else {
            tessera_bail!(State: "cannot link {} to a detached record", name);
        };
        if other.id() != store.id() {
            tessera_bail!(State: "cannot link records of different stores");
        }
        store.write().fixed_mut()?.set_reference(
            row.layer,
            field.ordinal() as usize,
            row.row,
            destination,
        )
    }

    /// The record a reference field holds, `None` if it was never set or is unset.
    pub(crate) fn present_reference(&self, field: &FieldDefinition) -> TesseraResult<Option<Record>> {
        match &self.repr {
            Repr::Detached(values) => Ok(values
                .get(field.name())
                .and_then(Value::as_record)
                .cloned()),
            Repr::Attached { store, target } => {
                let nested = read_reference(store, *target, field)?;
                if nested.is_unset() {
                    return Ok(None);
                }
                self.resolve_target(field, store, nested).map(Some)
            }
        }
    }

    fn resolve_target(
        &self,
        field: &FieldDefinition,
        store: &Store,
        nested: RowRef,
    ) -> TesseraResult<Record> {
        let target = field.target().ok_or_else(|| {
            tessera_err!(Schema: "reference field \"{}\" has no target", field.name())
        })?;
        resolve::resolve(store, target.descriptor(), nested)
    }

    fn assign(&mut self, field: &FieldDefinition, value: Value, depth: usize) -> TesseraResult<()> {
        if field.kind() == FieldKind::Ref {
            let source = match value {
                Value::Record(source) => source,
                other => tessera_bail!(MismatchedTypes: "record", other.kind_name()),
            };
            check_reference(field, &source)?;
            return match &mut self.repr {
                Repr::Detached(values) => {
                    values.insert(field.name().clone(), Value::Record(source));
                    Ok(())
                }
                Repr::Attached { .. } => self.copy_in(field, &source, depth),
            };
        }

        match &mut self.repr {
            Repr::Detached(values) => {
                values.insert(field.name().clone(), value.conform(field)?);
                Ok(())
            }
            Repr::Attached { store, target } => write_field(store, *target, field, &value),
        }
    }

    /// Copy every field of `source` into the record referenced by `field`.
    fn copy_in(&self, field: &FieldDefinition, source: &Record, depth: usize) -> TesseraResult<()> {
        if depth >= MAX_NESTING {
            tessera_bail!(
                Schema: "records nest deeper than {} levels",
                MAX_NESTING
            );
        }
        let mut nested = Record::try_from(self.get(field.name())?)?;
        if let Some(field) = nested
            .schema
            .fields()
            .iter()
            .find(|f| f.kind().is_variable_width())
        {
            tessera_bail!(
                State: "cannot copy into {}: {} fields cannot be written in place",
                nested.schema.name(),
                field.kind()
            );
        }

        let schema = Arc::clone(&nested.schema);
        for field in schema.fields() {
            let value = if field.kind() == FieldKind::Ref {
                match source.present_reference(field)? {
                    Some(record) => Value::from(record),
                    None => continue,
                }
            } else {
                source.get(field.name())?
            };
            nested.assign(field, value, depth + 1)?;
        }
        Ok(())
    }
}

fn check_reference(field: &FieldDefinition, record: &Record) -> TesseraResult<()> {
    let Some(target) = field.target() else {
        tessera_bail!(Schema: "field \"{}\" is not a reference", field.name());
    };
    if target.type_id() != record.schema.type_id() {
        tessera_bail!(MismatchedTypes: target.name(), record.schema.name());
    }
    Ok(())
}

fn read_field(store: &Store, target: RowRef, field: &FieldDefinition) -> TesseraResult<Value> {
    let column = field.ordinal() as usize;
    let kind = field.kind();
    store.read().engine()?.with_layer(target.layer, |layer| {
        check_column(layer, column, field)?;
        Ok(match kind {
            kind if kind.is_numeric() => {
                Value::from(layer.get_scalar(column, target.row)?.decode(kind, field.range()))
            }
            FieldKind::Str => Value::Str(layer.get_text(column, target.row)?.to_string()),
            FieldKind::WStr => Value::WStr(layer.get_wtext(column, target.row)?),
            FieldKind::Bytes => Value::Bytes(layer.get_blob(column, target.row)?.to_vec()),
            other => tessera_bail!(Schema: "field {} of kind {} cannot be read", field.name(), other),
        })
    })
}

fn read_reference(store: &Store, target: RowRef, field: &FieldDefinition) -> TesseraResult<RowRef> {
    let column = field.ordinal() as usize;
    store.read().engine()?.with_layer(target.layer, |layer| {
        check_column(layer, column, field)?;
        layer.get_reference(column, target.row)
    })
}

fn write_field(
    store: &Store,
    target: RowRef,
    field: &FieldDefinition,
    value: &Value,
) -> TesseraResult<()> {
    if !field.kind().is_numeric() {
        tessera_bail!(
            State: "field {} of kind {} cannot be written in place",
            field.name(),
            field.kind()
        );
    }
    let column = field.ordinal() as usize;
    let stored = value.to_stored(field)?;
    let mut state = store.write();
    let fixed = state.fixed_mut()?;
    check_column(&fixed.layer(target.layer)?, column, field)?;
    fixed.set_scalar(target.layer, column, target.row, stored)
}

impl PartialEq for Record {
    /// Attached records are equal if they are bound to the same row. Otherwise records of the
    /// same type are compared field by field.
    fn eq(&self, other: &Self) -> bool {
        if !self.schema.is_same_type(&other.schema) {
            return false;
        }
        if let (Some((a, ra)), Some((b, rb))) = (self.location(), other.location()) {
            return a.id() == b.id() && ra == rb;
        }
        match (self.values(), other.values()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}
