use std::sync::Arc;

use tessera_dtype::{Schema, SchemaDescriptor, describe};
use tessera_error::{TesseraResult, tessera_bail};

/// The layout of one layer of a fixed-scale store, see [`Store::truncate`](crate::Store::truncate).
#[derive(Debug, Clone)]
pub struct Scale {
    schema: Arc<SchemaDescriptor>,
    capacity: usize,
    alias: Option<Arc<str>>,
}

impl Scale {
    /// `capacity` rows of `S`, in a layer named after `S`.
    pub fn new<S: Schema>(capacity: usize) -> Self {
        Self::of(describe::<S>(), capacity)
    }

    pub fn of(schema: Arc<SchemaDescriptor>, capacity: usize) -> Self {
        Self {
            schema,
            capacity,
            alias: None,
        }
    }

    /// Name the layer `alias` instead of after the schema.
    pub fn with_alias(mut self, alias: impl Into<Arc<str>>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The name of the layer this scale declares.
    pub fn layer_name(&self) -> &Arc<str> {
        match &self.alias {
            Some(alias) => alias,
            None => self.schema.name(),
        }
    }

    /// The capacity as a row count, failing unless it is positive and fits a layer.
    pub(crate) fn rows(&self) -> TesseraResult<u32> {
        match u32::try_from(self.capacity) {
            Ok(rows) if rows > 0 => Ok(rows),
            _ => tessera_bail!(
                Capacity: "layer {} needs between 1 and {} rows, got {}",
                self.layer_name(),
                u32::MAX,
                self.capacity
            ),
        }
    }
}
