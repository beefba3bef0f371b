use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_buffer::Region;
use tessera_dtype::{Schema, SchemaDescriptor, describe};
use tessera_error::{TesseraExpect, TesseraResult, tessera_bail, tessera_err};
use tessera_io::{read_file, write_file};
use tessera_layout::{BuildStore, FixedStore, WriteOptions};

use crate::push::{PushPlan, declare_layer};
use crate::state::{Engine, StoreState, freeze};
use crate::{Layer, LayerInfo, Record, Reference, Scale, name_index, resolve};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

struct StoreInner {
    id: u64,
    state: RwLock<StoreState>,
    /// Layer indices by name and schema type, filled by [`Store::layer_of`].
    layers: Mutex<HashMap<(Arc<str>, TypeId), u32>>,
}

/// A set of named layers, each holding the rows of one record type.
///
/// A store is either being built, with layers that grow as records are pushed, or fixed, with
/// every layer frozen into one buffer that is updated in place. `Store` is a cheap handle: clones
/// share the same layers, and the layers are released when the last handle is dropped.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    fn with_state(state: StoreState) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                state: RwLock::new(state),
                layers: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn with_fixed(fixed: FixedStore) -> Self {
        Self::with_state(StoreState::new(Engine::Fixed(fixed)))
    }

    /// An empty store in build mode, holding only the `_name_` layer.
    pub fn create() -> Self {
        let mut build = BuildStore::new();
        name_index::declare(&mut build).tessera_expect("declaring the name index of an empty store");
        Self::with_state(StoreState::new(Engine::Build(build)))
    }

    /// A fixed store with one layer of `capacity` blank rows per scale.
    ///
    /// Every scale is checked before anything is built. The result cannot grow, but its numeric
    /// fields can be written and its references linked.
    pub fn truncate(scales: impl IntoIterator<Item = Scale>) -> TesseraResult<Self> {
        let scales = scales.into_iter().collect_vec();
        for scale in &scales {
            scale.rows()?;
            scale.schema().check_declarable()?;
        }
        if let Some(name) = scales.iter().map(Scale::layer_name).duplicates().next() {
            tessera_bail!("more than one scale declares layer {}", name);
        }

        let mut build = BuildStore::new();
        for scale in &scales {
            let index = declare_layer(&mut build, scale.layer_name().clone(), scale.schema())?;
            build.layer_mut(index)?.append_blank(scale.rows()?)?;
        }
        let fixed = freeze(&build)?;
        log::debug!(
            "truncated store of {} layers into {} bytes",
            fixed.len(),
            fixed.as_bytes().len()
        );

        let mut state = StoreState::new(Engine::Fixed(fixed));
        state.fixed_scale = true;
        Ok(Self::with_state(state))
    }

    /// Load a fixed store from the file at `locator`, or from the shared memory segment called
    /// `locator`.
    pub fn load(locator: &str, from_file: bool) -> TesseraResult<Self> {
        if from_file {
            Self::open(locator)
        } else {
            Self::load_shared(locator)
        }
    }

    #[cfg(unix)]
    fn load_shared(name: &str) -> TesseraResult<Self> {
        Self::attach(name)
    }

    #[cfg(not(unix))]
    fn load_shared(name: &str) -> TesseraResult<Self> {
        tessera_bail!(State: "cannot attach to {}: shared memory requires unix", name)
    }

    /// Read a fixed store from a file.
    pub fn open(path: impl AsRef<Path>) -> TesseraResult<Self> {
        let buffer = read_file(path)?;
        Ok(Self::with_fixed(FixedStore::parse(Region::from(buffer))?))
    }

    /// Map the fixed store published as the shared memory segment `name`.
    ///
    /// The store reads and writes the segment in place, so updates are visible to every process
    /// attached to it.
    #[cfg(unix)]
    pub fn attach(name: &str) -> TesseraResult<Self> {
        let (segment, region) = crate::attach(name)?.into_parts();
        let store = Self::with_fixed(FixedStore::parse(region)?);
        store.write().segment = Some(segment);
        Ok(store)
    }

    /// An identifier unique to this store within the process.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.inner.state.read_recursive()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.inner.state.write()
    }

    pub fn is_fixed(&self) -> bool {
        self.read().is_fixed()
    }

    /// Whether the store was created by [`Store::truncate`].
    pub fn is_fixed_scale(&self) -> bool {
        self.read().fixed_scale
    }

    /// Whether the store is mapped from a shared memory segment.
    pub fn is_shared(&self) -> bool {
        self.read().is_shared()
    }

    /// Whether the store has been closed or unlinked.
    pub fn is_detached(&self) -> bool {
        self.read().engine.is_none()
    }

    /// The number of layers, including `_name_`.
    pub fn len(&self) -> usize {
        self.read().engine.as_ref().map_or(0, Engine::layer_count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A summary of every layer, in order.
    pub fn layers(&self) -> TesseraResult<Vec<LayerInfo>> {
        let state = self.read();
        let engine = state.engine()?;
        (0u32..)
            .take(engine.layer_count())
            .map(|index| engine.with_layer(index, |layer| Ok(LayerInfo::of(layer))))
            .collect()
    }

    /// Freeze a store that is being built. Rows that were begun but not committed are dropped.
    ///
    /// Does nothing, with a warning, if the store is already fixed or detached.
    pub fn combine(&self) -> TesseraResult<()> {
        let mut state = self.write();
        let fixed = match &mut state.engine {
            None => {
                log::warn!("store {} is detached, there is nothing to combine", self.id());
                return Ok(());
            }
            Some(Engine::Fixed(_)) => {
                log::warn!("store {} is already combined", self.id());
                return Ok(());
            }
            Some(Engine::Build(build)) => {
                build.abort_pending();
                freeze(build)?
            }
        };
        log::debug!(
            "combined store {} into {} bytes",
            self.id(),
            fixed.as_bytes().len()
        );
        state.engine = Some(Engine::Fixed(fixed));
        Ok(())
    }

    /// Write the store to `path`. A fixed store is written byte for byte, including every update
    /// made in place.
    pub fn save(&self, path: impl AsRef<Path>) -> TesseraResult<()> {
        let state = self.read();
        match state.engine()? {
            Engine::Build(build) => write_file(path, &WriteOptions::default().write(build.layers())?),
            Engine::Fixed(fixed) => write_file(path, fixed.as_bytes()),
        }
    }

    /// Publish the store as the shared memory segment `name` and continue working on the
    /// segment. A store that is being built is combined first.
    ///
    /// With `close_after` the store detaches from the segment right away, leaving it to other
    /// processes.
    #[cfg(unix)]
    pub fn share(&self, name: &str, close_after: bool) -> TesseraResult<()> {
        let (segment, region) = crate::publish(self, name)?.into_parts();
        let fixed = FixedStore::parse(region)?;
        {
            let mut state = self.write();
            state.engine = Some(Engine::Fixed(fixed));
            state.segment = Some(segment);
        }
        if close_after {
            self.close();
        }
        Ok(())
    }

    /// Unmap the shared memory segment backing the store, leaving the segment itself in place.
    /// The store is detached afterwards.
    ///
    /// Does nothing for stores that are not shared.
    pub fn close(&self) {
        let mut state = self.write();
        if !state.is_shared() {
            log::debug!("store {} is not shared, nothing to close", self.id());
            return;
        }
        state.detach();
        self.inner.layers.lock().clear();
    }

    /// Remove the shared memory segment backing the store and detach from it.
    #[cfg(unix)]
    pub fn unlink(&self) -> TesseraResult<()> {
        let segment = {
            let mut state = self.write();
            let Some(segment) = state.segment.take() else {
                tessera_bail!(State: "store {} is not backed by shared memory", self.id());
            };
            state.detach();
            segment
        };
        self.inner.layers.lock().clear();
        crate::unlink(segment.as_str())
    }

    /// The layer holding rows of `T`.
    pub fn layer<T: Schema>(&self) -> TesseraResult<Layer> {
        self.layer_as::<T>(T::NAME)
    }

    /// The layer called `name`, holding rows of `T`.
    pub fn layer_as<T: Schema>(&self, name: &str) -> TesseraResult<Layer> {
        self.layer_of(describe::<T>(), name)
    }

    /// The layer called `name`, holding rows of `schema`.
    pub fn layer_of(&self, schema: Arc<SchemaDescriptor>, name: &str) -> TesseraResult<Layer> {
        let key: (Arc<str>, TypeId) = (name.into(), schema.type_id());
        let cached = self.inner.layers.lock().get(&key).copied();
        let index = match cached {
            Some(index) => index,
            None => {
                let index = self.find_layer(&schema, name)?;
                self.inner.layers.lock().insert(key.clone(), index);
                index
            }
        };
        Ok(Layer::new(self.clone(), index, key.0, schema))
    }

    fn find_layer(&self, schema: &SchemaDescriptor, name: &str) -> TesseraResult<u32> {
        let state = self.read();
        let engine = state.engine()?;
        let index = engine
            .find_layer(name)
            .ok_or_else(|| tessera_err!(NotFound: "store {} has no layer {}", self.id(), name))?;
        engine.with_layer(index, |layer| {
            let columns = layer.columns().iter().map(|c| (c.name().as_ref(), c.kind()));
            if !schema.matches_columns(columns) {
                tessera_bail!(MismatchedTypes: schema, LayerInfo::of(layer));
            }
            Ok(())
        })?;
        Ok(index)
    }

    /// The record of type `T` stored under `name`, the first one if the name was used more
    /// than once.
    pub fn get<T: Schema>(&self, name: &str) -> TesseraResult<Option<Record>> {
        let target = {
            let state = self.read();
            let engine = state.engine()?;
            let names = state
                .names
                .ok_or_else(|| tessera_err!(NotFound: "store {} has no name index", self.id()))?;
            engine.with_layer(names, |layer| name_index::lookup(layer, name))?
        };
        target
            .map(|target| resolve::resolve(self, describe::<T>(), target))
            .transpose()
    }

    /// The record of type `T` that `reference` points to.
    pub fn resolve<T: Schema>(&self, reference: Reference) -> TesseraResult<Record> {
        if reference.store_id() != self.id() {
            tessera_bail!(
                State: "reference {} does not belong to store {}",
                reference,
                self.id()
            );
        }
        resolve::resolve(self, describe::<T>(), reference.target())
    }

    /// Append `record` to the layer of its type, declaring the layer on first use, and return a
    /// reference to the new row.
    ///
    /// Nested records are pushed before the record referencing them, unless they are already
    /// attached to this store. With a `name`, the row can later be found with [`Store::get`].
    pub fn push(&self, record: &Record, name: Option<&str>) -> TesseraResult<Reference> {
        self.read().build()?;
        let plan = PushPlan::new(record, self.id())?;

        let mut state = self.write();
        let names = state.names;
        let build = state.build_mut()?;
        let target = plan.apply(build)?;
        if let Some(name) = name {
            let index = names
                .ok_or_else(|| tessera_err!(NotFound: "store {} has no name index", self.id()))?;
            name_index::append(build.layer_mut(index)?, name, target)?;
        }
        Ok(Reference::new(self.id(), target))
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mode = match self.inner.state.try_read_recursive() {
            Some(state) => match &state.engine {
                Some(Engine::Build(_)) => "build",
                Some(Engine::Fixed(_)) => "fixed",
                None => "detached",
            },
            None => "locked",
        };
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("mode", &mode)
            .finish()
    }
}
