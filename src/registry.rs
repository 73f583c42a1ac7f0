//! Name-keyed storage for service registrations
//!
//! Uses DashMap so registration and lookup work through shared references.

use ahash::RandomState;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

use crate::lifecycle::Lifecycle;
use crate::provider::{BuildFn, DepSpec};

/// A resolved service instance, type-erased for storage and zero-copy sharing.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Reserved service name that always resolves to the container a call began in.
pub(crate) const CONTAINER_SERVICE: &str = "container";

/// Erase a plain value into an [`Instance`].
///
/// Mainly useful for the extra constructor arguments accepted by
/// [`Container::get_with`](crate::Container::get_with) and
/// [`Factory::get_with`](crate::Factory::get_with).
///
/// # Examples
///
/// ```rust
/// use trellis_di::arg;
///
/// let extra = arg(42u32);
/// assert_eq!(*extra.downcast::<u32>().unwrap(), 42);
/// ```
#[inline]
pub fn arg<T: Send + Sync + 'static>(value: T) -> Instance {
    Arc::new(value)
}

/// Constructor descriptor: an ordered dependency list plus the build closure
/// applied to the resolved arguments.
pub(crate) struct Ctor {
    pub deps: Vec<DepSpec>,
    pub build: BuildFn,
}

/// How a registration produces its instance.
///
/// The value-vs-constructor decision is made once, at registration time, and
/// stored on the record.
#[derive(Clone)]
pub(crate) enum Source {
    /// Eager value, used as-is on resolve
    Value(Instance),
    /// Constructor-like, applied to the resolved dependency list
    Ctor(Arc<Ctor>),
}

/// A single registry record
#[derive(Clone)]
pub(crate) struct Registration {
    pub source: Source,
    pub lifecycle: Lifecycle,
}

/// Name-keyed registration storage.
///
/// Uses 8 shards: containers rarely hold more than a few dozen registrations,
/// and fewer shards keep container creation cheap.
pub(crate) struct Registry {
    entries: DashMap<String, Registration, RandomState>,
}

impl Registry {
    #[inline]
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Insert a record. An existing record under the same name is replaced
    /// (last registration wins).
    #[inline]
    pub fn insert(&self, name: String, registration: Registration) {
        self.entries.insert(name, registration);
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<Registration> {
        self.entries.get(name).map(|entry| entry.clone())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn clear(&self) {
        self.entries.clear()
    }

    /// All registered names in this registry (not including parents).
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_record(value: u32, lifecycle: Lifecycle) -> Registration {
        Registration {
            source: Source::Value(Arc::new(value)),
            lifecycle,
        }
    }

    #[test]
    fn insert_and_get() {
        let registry = Registry::new();
        registry.insert("port".into(), value_record(8080, Lifecycle::PerRequest));

        let record = registry.get("port").unwrap();
        assert_eq!(record.lifecycle, Lifecycle::PerRequest);
        match record.source {
            Source::Value(value) => assert_eq!(*value.downcast::<u32>().unwrap(), 8080),
            Source::Ctor(_) => panic!("expected a value record"),
        }
    }

    #[test]
    fn reregistration_overwrites() {
        let registry = Registry::new();
        registry.insert("port".into(), value_record(8080, Lifecycle::PerRequest));
        registry.insert("port".into(), value_record(9090, Lifecycle::Singleton));

        assert_eq!(registry.len(), 1);
        let record = registry.get("port").unwrap();
        assert_eq!(record.lifecycle, Lifecycle::Singleton);
    }

    #[test]
    fn contains_and_clear() {
        let registry = Registry::new();
        assert!(!registry.contains("svc"));

        registry.insert("svc".into(), value_record(1, Lifecycle::PerRequest));
        assert!(registry.contains("svc"));

        registry.clear();
        assert!(registry.is_empty());
    }
}
