use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard};
use tessera_buffer::Pod;
use tessera_dtype::{NativeValue, SchemaDescriptor};
use tessera_error::{TesseraResult, tessera_err};
use tessera_layout::FixedStore;

use crate::Store;
use crate::record::check_column;
use crate::state::StoreState;

/// Every field of a fixed layer as a full-length slice.
///
/// Slices borrow the bytes of the store directly: a value written through [`ColumnView::write`]
/// is what the rows of the layer read once the guard is dropped, and vice versa. Normalized
/// fields are exposed in their quantized storage type.
///
/// Read guards hold a shared lock on the store and may coexist with row reads on the same
/// thread. A write guard holds the store exclusively; reading rows while it is alive deadlocks.
#[derive(Debug, Clone)]
pub struct ColumnView {
    store: Store,
    layer: u32,
    schema: Arc<SchemaDescriptor>,
}

impl ColumnView {
    pub(crate) fn new(store: Store, layer: u32, schema: Arc<SchemaDescriptor>) -> Self {
        Self {
            store,
            layer,
            schema,
        }
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    /// The number of rows, i.e. the length of every slice.
    pub fn len(&self) -> usize {
        self.store
            .read()
            .fixed()
            .and_then(|fixed| fixed.layer(self.layer))
            .map_or(0, |layer| layer.meta().rows() as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn column<T: NativeValue + Pod>(&self, state: &StoreState, field: &str) -> TesseraResult<usize> {
        let field = self.schema.field(field)?;
        let column = field.ordinal() as usize;
        let fixed = state.fixed()?;
        check_column(&fixed.layer(self.layer)?, column, field)?;
        fixed.column::<T>(self.layer, column)?;
        Ok(column)
    }

    /// The values of the numeric field `field`. `T` must be its storage type.
    pub fn read<T: NativeValue + Pod>(
        &self,
        field: &str,
    ) -> TesseraResult<MappedRwLockReadGuard<'_, [T]>> {
        let state = self.store.read();
        let column = self.column::<T>(&state, field)?;
        let layer = self.layer;
        RwLockReadGuard::try_map(state, |state| {
            fixed_of(state).and_then(|fixed| fixed.column::<T>(layer, column).ok())
        })
        .map_err(|_| tessera_err!(State: "column {} is no longer readable", field))
    }

    /// The values of the numeric field `field`, writable in place. `T` must be its storage type.
    pub fn write<T: NativeValue + Pod>(
        &self,
        field: &str,
    ) -> TesseraResult<MappedRwLockWriteGuard<'_, [T]>> {
        let state = self.store.write();
        let column = self.column::<T>(&state, field)?;
        let layer = self.layer;
        RwLockWriteGuard::try_map(state, |state| {
            fixed_of_mut(state).and_then(|fixed| fixed.column_mut::<T>(layer, column).ok())
        })
        .map_err(|_| tessera_err!(State: "column {} is no longer writable", field))
    }
}

fn fixed_of(state: &StoreState) -> Option<&FixedStore> {
    state.fixed().ok()
}

fn fixed_of_mut(state: &mut StoreState) -> Option<&mut FixedStore> {
    state.fixed_mut().ok()
}
