use tessera_buffer::{AlignedBuffer, Alignment, Region};
use tessera_error::{TesseraResult, tessera_err};
use tessera_io::ALIGNMENT;
#[cfg(unix)]
use tessera_io::SegmentName;
use tessera_layout::{BuildStore, FixedStore, LayerRead, WriteOptions};

use crate::name_index::NAME_LAYER;

/// The storage engine a store is attached to.
#[derive(Debug)]
pub(crate) enum Engine {
    Build(BuildStore),
    Fixed(FixedStore),
}

impl Engine {
    pub(crate) fn layer_count(&self) -> usize {
        match self {
            Engine::Build(build) => build.len(),
            Engine::Fixed(fixed) => fixed.len(),
        }
    }

    pub(crate) fn find_layer(&self, name: &str) -> Option<u32> {
        match self {
            Engine::Build(build) => build.find_layer(name),
            Engine::Fixed(fixed) => fixed.find_layer(name),
        }
    }

    /// Run `f` over the layer at `index`, whichever mode the engine is in.
    pub(crate) fn with_layer<R>(
        &self,
        index: u32,
        f: impl FnOnce(&dyn LayerRead) -> TesseraResult<R>,
    ) -> TesseraResult<R> {
        match self {
            Engine::Build(build) => f(build.layer(index)?),
            Engine::Fixed(fixed) => f(&fixed.layer(index)?),
        }
    }
}

/// Serialize the committed rows of `build` and parse them back as a fixed store on the heap.
pub(crate) fn freeze(build: &BuildStore) -> TesseraResult<FixedStore> {
    let bytes = WriteOptions::default().write(build.layers())?;
    FixedStore::parse(Region::from(AlignedBuffer::copy_from(
        bytes,
        Alignment::new(ALIGNMENT),
    )))
}

/// Everything behind the lock of a [`Store`](crate::Store).
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) engine: Option<Engine>,
    /// The shared memory segment the fixed engine is mapped from.
    #[cfg(unix)]
    pub(crate) segment: Option<SegmentName>,
    /// Created by `truncate` with a fixed number of rows per layer.
    pub(crate) fixed_scale: bool,
    /// The index of the `_name_` layer, if the store has one.
    pub(crate) names: Option<u32>,
}

impl StoreState {
    pub(crate) fn new(engine: Engine) -> Self {
        let names = engine.find_layer(NAME_LAYER);
        Self {
            engine: Some(engine),
            names,
            ..Self::default()
        }
    }

    pub(crate) fn engine(&self) -> TesseraResult<&Engine> {
        self.engine
            .as_ref()
            .ok_or_else(|| tessera_err!(State: "store is not attached to an engine"))
    }

    pub(crate) fn build(&self) -> TesseraResult<&BuildStore> {
        match &self.engine {
            Some(Engine::Build(build)) => Ok(build),
            Some(Engine::Fixed(_)) => Err(tessera_err!(State: "store is fixed and cannot grow")),
            None => Err(tessera_err!(State: "store is not attached to an engine")),
        }
    }

    pub(crate) fn build_mut(&mut self) -> TesseraResult<&mut BuildStore> {
        match &mut self.engine {
            Some(Engine::Build(build)) => Ok(build),
            Some(Engine::Fixed(_)) => Err(tessera_err!(State: "store is fixed and cannot grow")),
            None => Err(tessera_err!(State: "store is not attached to an engine")),
        }
    }

    pub(crate) fn fixed(&self) -> TesseraResult<&FixedStore> {
        match &self.engine {
            Some(Engine::Fixed(fixed)) => Ok(fixed),
            Some(Engine::Build(_)) => Err(tessera_err!(State: "store is still being built")),
            None => Err(tessera_err!(State: "store is not attached to an engine")),
        }
    }

    pub(crate) fn fixed_mut(&mut self) -> TesseraResult<&mut FixedStore> {
        match &mut self.engine {
            Some(Engine::Fixed(fixed)) => Ok(fixed),
            Some(Engine::Build(_)) => Err(tessera_err!(State: "store is still being built")),
            None => Err(tessera_err!(State: "store is not attached to an engine")),
        }
    }

    pub(crate) fn is_fixed(&self) -> bool {
        matches!(self.engine, Some(Engine::Fixed(_)))
    }

    #[cfg(unix)]
    pub(crate) fn is_shared(&self) -> bool {
        self.segment.is_some()
    }

    #[cfg(not(unix))]
    pub(crate) fn is_shared(&self) -> bool {
        false
    }

    /// Drop the engine, leaving the store detached.
    pub(crate) fn detach(&mut self) {
        self.engine = None;
        self.names = None;
        #[cfg(unix)]
        {
            self.segment = None;
        }
    }
}
