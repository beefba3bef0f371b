use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tessera_dtype::SchemaDescriptor;
use tessera_error::{TesseraResult, tessera_bail};
use tessera_layout::{LayerRead, RowRef};

use crate::{Record, Store};

/// A handle to one row of a store, returned by [`Store::push`].
///
/// References are only meaningful to the store that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference {
    store: u64,
    target: RowRef,
}

impl Reference {
    pub(crate) fn new(store: u64, target: RowRef) -> Self {
        Self { store, target }
    }

    pub fn store_id(&self) -> u64 {
        self.store
    }

    pub fn layer(&self) -> u32 {
        self.target.layer
    }

    pub fn row(&self) -> u32 {
        self.target.row
    }

    pub(crate) fn target(&self) -> RowRef {
        self.target
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.target, self.store)
    }
}

/// Bind a stored reference to an attached record of type `schema`.
///
/// Fails if the reference is unset, points past the end of its layer, or lands in a layer whose
/// columns do not hold `schema`.
pub(crate) fn resolve(
    store: &Store,
    schema: Arc<SchemaDescriptor>,
    target: RowRef,
) -> TesseraResult<Record> {
    if target.is_unset() {
        tessera_bail!(State: "cannot resolve an unset reference to {}", schema.name());
    }
    store.read().engine()?.with_layer(target.layer, |layer| {
        layer.check_row(target.row)?;
        let columns = layer.columns().iter().map(|c| (c.name().as_ref(), c.kind()));
        if !schema.matches_columns(columns) {
            tessera_bail!(MismatchedTypes: schema.name(), layer.name());
        }
        Ok(())
    })?;
    Ok(Record::attached(schema, store.clone(), target))
}
