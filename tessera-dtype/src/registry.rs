use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};

use crate::{Schema, SchemaDescriptor};

/// Caches one [`SchemaDescriptor`] per record type.
///
/// Lookups take a read lock. A miss serializes on a population mutex and re-checks before
/// reflecting the type, so concurrent first accesses compute the descriptor once and all observe
/// the same `Arc`.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    descriptors: RwLock<HashMap<TypeId, Arc<SchemaDescriptor>>>,
    populate: Mutex<()>,
    computed: AtomicUsize,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe<S: Schema>(&self) -> Arc<SchemaDescriptor> {
        let type_id = TypeId::of::<S>();
        if let Some(descriptor) = self.descriptors.read().get(&type_id) {
            return descriptor.clone();
        }

        let _populating = self.populate.lock();
        if let Some(descriptor) = self.descriptors.read().get(&type_id) {
            return descriptor.clone();
        }

        let descriptor = Arc::new(SchemaDescriptor::reflect::<S>());
        self.computed.fetch_add(1, Ordering::Relaxed);
        log::trace!("reflected schema {descriptor}");
        self.descriptors.write().insert(type_id, descriptor.clone());
        descriptor
    }

    /// Whether the descriptor of `S` has already been computed.
    pub fn contains<S: Schema>(&self) -> bool {
        self.descriptors.read().contains_key(&TypeId::of::<S>())
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    /// The number of times a descriptor was reflected, as opposed to served from the cache.
    pub fn computed(&self) -> usize {
        self.computed.load(Ordering::Relaxed)
    }
}

static REGISTRY: LazyLock<SchemaRegistry> = LazyLock::new(SchemaRegistry::new);

/// The process-wide registry.
pub fn registry() -> &'static SchemaRegistry {
    &REGISTRY
}

/// Describe `S` through the process-wide registry.
pub fn describe<S: Schema>() -> Arc<SchemaDescriptor> {
    REGISTRY.describe::<S>()
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::kinds::*;

    crate::schema! {
        struct Sample { a: U8, b: F32, label: WStr }
        struct Other { value: I32 }
    }

    #[test]
    fn caches_per_type() {
        let registry = SchemaRegistry::new();
        assert!(!registry.contains::<Sample>());
        let first = registry.describe::<Sample>();
        let second = registry.describe::<Sample>();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.computed(), 1);

        registry.describe::<Other>();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.computed(), 2);
    }

    #[test]
    fn concurrent_first_access_converges() {
        const THREADS: usize = 8;
        let registry = SchemaRegistry::new();
        let barrier = Barrier::new(THREADS);

        let descriptors: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.describe::<Sample>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(registry.computed(), 1);
        assert!(descriptors.iter().all(|d| Arc::ptr_eq(d, &descriptors[0])));
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(Arc::ptr_eq(&describe::<Other>(), &registry().describe::<Other>()));
    }
}
