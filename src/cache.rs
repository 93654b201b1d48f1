use crate::{
    sync::recover,
    types::{HashMap, HashSet},
    value::{ComputedValue, ValueSpecification},
};
use std::sync::{Arc, Mutex, RwLock};

/// Selects the cache partition a value is written to or read from.
///
/// Shared values are visible to every consumer of a configuration's cache
/// (live data, copied-forward results, published outputs); private values are
/// scratch results of a single unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheSelectHint {
    #[default]
    AllShared,
    AllPrivate,
    /// Only the listed values are shared.
    SharedValues(HashSet<ValueSpecification>),
    /// Only the listed values are private.
    PrivateValues(HashSet<ValueSpecification>),
}

impl CacheSelectHint {
    pub fn is_private_value(&self, specification: &ValueSpecification) -> bool {
        match self {
            Self::AllShared => false,
            Self::AllPrivate => true,
            Self::SharedValues(shared) => !shared.contains(specification),
            Self::PrivateValues(private) => private.contains(specification),
        }
    }
}

/// Key-value store of one calculation configuration for one cycle.
///
/// Implementations must accept concurrent writes from node-execution workers.
pub trait ComputationCache<V>: Send + Sync {
    fn put_shared_value(&self, value: ComputedValue<V>);

    fn put_private_value(&self, value: ComputedValue<V>);

    fn put_value(&self, value: ComputedValue<V>, hint: &CacheSelectHint) {
        if hint.is_private_value(value.specification()) {
            self.put_private_value(value);
        } else {
            self.put_shared_value(value);
        }
    }

    /// Looks `specification` up in the shared partition, then the private one.
    fn get_value(&self, specification: &ValueSpecification) -> Option<V>;

    /// Reads every specification from the partition `hint` selects for it.
    /// Absent values are returned as `None` in request order.
    fn get_values<'a>(
        &self,
        specifications: &mut dyn Iterator<Item = &'a ValueSpecification>,
        hint: &CacheSelectHint,
    ) -> Vec<(ValueSpecification, Option<V>)>;
}

/// Lock-guarded in-memory [`ComputationCache`].
#[derive(Debug)]
pub struct InMemoryComputationCache<V> {
    shared: RwLock<HashMap<ValueSpecification, V>>,
    private: RwLock<HashMap<ValueSpecification, V>>,
}

impl<V> Default for InMemoryComputationCache<V> {
    fn default() -> Self {
        Self {
            shared: RwLock::default(),
            private: RwLock::default(),
        }
    }
}

impl<V> InMemoryComputationCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values held across both partitions.
    pub fn len(&self) -> usize {
        recover(self.shared.read()).len() + recover(self.private.read()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + Send + Sync> ComputationCache<V> for InMemoryComputationCache<V> {
    fn put_shared_value(&self, value: ComputedValue<V>) {
        let (specification, value) = value.into_parts();
        recover(self.shared.write()).insert(specification, value);
    }

    fn put_private_value(&self, value: ComputedValue<V>) {
        let (specification, value) = value.into_parts();
        recover(self.private.write()).insert(specification, value);
    }

    fn get_value(&self, specification: &ValueSpecification) -> Option<V> {
        if let Some(value) = recover(self.shared.read()).get(specification) {
            return Some(value.clone());
        }
        recover(self.private.read()).get(specification).cloned()
    }

    fn get_values<'a>(
        &self,
        specifications: &mut dyn Iterator<Item = &'a ValueSpecification>,
        hint: &CacheSelectHint,
    ) -> Vec<(ValueSpecification, Option<V>)> {
        let shared = recover(self.shared.read());
        let private = recover(self.private.read());
        specifications
            .map(|specification| {
                let partition = if hint.is_private_value(specification) {
                    &private
                } else {
                    &shared
                };
                (specification.clone(), partition.get(specification).cloned())
            })
            .collect()
    }
}

/// Factory of the computation caches used by cycles.
pub trait ComputationCacheSource<V>: Send + Sync {
    /// Returns the cache for `(view, configuration, timestamp)`, creating it on
    /// first use.
    fn get_cache(
        &self,
        view_name: &str,
        configuration_name: &str,
        timestamp_millis: i64,
    ) -> Arc<dyn ComputationCache<V>>;

    /// Drops every cache of `view_name` at `timestamp_millis`.
    fn release_caches(&self, view_name: &str, timestamp_millis: i64);
}

type CacheKey = (String, String, i64);

/// [`ComputationCacheSource`] handing out [`InMemoryComputationCache`]s.
///
/// Asking twice for the same key before it is released yields the same cache.
#[derive(Debug)]
pub struct InMemoryComputationCacheSource<V> {
    caches: Mutex<HashMap<CacheKey, Arc<InMemoryComputationCache<V>>>>,
}

impl<V> Default for InMemoryComputationCacheSource<V> {
    fn default() -> Self {
        Self {
            caches: Mutex::default(),
        }
    }
}

impl<V> InMemoryComputationCacheSource<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live caches.
    pub fn cache_count(&self) -> usize {
        recover(self.caches.lock()).len()
    }
}

impl<V: Clone + Send + Sync + 'static> ComputationCacheSource<V>
    for InMemoryComputationCacheSource<V>
{
    fn get_cache(
        &self,
        view_name: &str,
        configuration_name: &str,
        timestamp_millis: i64,
    ) -> Arc<dyn ComputationCache<V>> {
        let key = (
            view_name.to_owned(),
            configuration_name.to_owned(),
            timestamp_millis,
        );
        let cache = recover(self.caches.lock()).entry(key).or_default().clone();
        cache
    }

    fn release_caches(&self, view_name: &str, timestamp_millis: i64) {
        recover(self.caches.lock())
            .retain(|(view, _, timestamp), _| view != view_name || *timestamp != timestamp_millis);
    }
}
