//! Factory proxies for on-demand service manufacture
//!
//! A [`Factory`] is the synthetic service injected for factory-suffixed
//! dependencies (`"widget!"`, `"widgetFactory"`). Each `get` re-enters the
//! resolver with a fresh context, applying any overrides queued since the
//! last call. The consumer that received the proxy owns every instance it
//! manufactures: products are tracked under the consumer's node, so
//! disposing the consumer disposes them too.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::error::{DiError, Result};
use crate::lifecycle::Lifecycle;
use crate::provider::Provider;
use crate::registry::{Ctor, Instance, Source};
use crate::resolver::{self, OverrideMap};
use crate::tracking::{Tracked, TrackedRef};

#[cfg(feature = "logging")]
use tracing::trace;

/// On-demand manufacturer for one named service.
///
/// # Examples
///
/// ```rust
/// use trellis_di::{Container, Factory, Lifecycle, Provider};
/// use std::sync::Arc;
///
/// struct Widget { size: u32 }
/// struct Workshop { widgets: Arc<Factory> }
///
/// let container = Container::new();
/// container.register_with(
///     "widget",
///     Provider::new(|_| Ok(Widget { size: 1 })),
///     Lifecycle::Unique,
/// ).unwrap();
/// container.register(
///     "workshop",
///     Provider::new(|args| Ok(Workshop { widgets: args.factory()? }))
///         .with_deps(["widget!"]),
/// ).unwrap();
///
/// let workshop = container.get_as::<Workshop>("workshop").unwrap();
/// let small = workshop.widgets.get_as::<Widget>().unwrap();
/// let big = workshop.widgets
///     .with_value("widget", Widget { size: 99 })
///     .get_as::<Widget>()
///     .unwrap();
/// assert_eq!(small.size, 1);
/// assert_eq!(big.size, 99);
/// ```
pub struct Factory {
    service: String,
    container: Container,
    parent: TrackedRef,
    frame: Mutex<OverrideMap>,
}

impl Factory {
    pub(crate) fn new(service: &str, container: Container, parent: TrackedRef) -> Self {
        Self {
            service: service.to_string(),
            container,
            parent,
            frame: Mutex::new(OverrideMap::default()),
        }
    }

    /// Name of the service this proxy manufactures.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Queue an eager value override for the next [`Factory::get`].
    ///
    /// Chainable; a later call for the same name wins. The accumulated frame
    /// is consumed (and cleared) by the next `get`.
    pub fn with_value<T: Send + Sync + 'static>(&self, name: impl Into<String>, value: T) -> &Self {
        self.frame
            .lock()
            .insert(name.into(), Source::Value(Arc::new(value)));
        self
    }

    /// Queue a constructor-like override for the next [`Factory::get`].
    ///
    /// Overridden constructors resolve with `unique` semantics and are never
    /// cached.
    pub fn with_provider(&self, name: impl Into<String>, provider: Provider) -> &Self {
        self.frame.lock().insert(
            name.into(),
            Source::Ctor(Arc::new(Ctor {
                deps: provider.deps,
                build: provider.build,
            })),
        );
        self
    }

    /// Manufacture a new instance of the bound service.
    pub fn get(&self) -> Result<Instance> {
        self.get_with(Vec::new())
    }

    /// Manufacture with extra constructor arguments appended.
    pub fn get_with(&self, extras: Vec<Instance>) -> Result<Instance> {
        self.container.ensure_live()?;
        let overrides = std::mem::take(&mut *self.frame.lock());

        #[cfg(feature = "logging")]
        trace!(
            target: "trellis_di",
            service = self.service.as_str(),
            overrides = overrides.len(),
            "Factory manufacturing instance"
        );

        let resolution = resolver::resolve_root(&self.container, &self.service, extras, overrides);

        // Everything the call created belongs to the factory's consumer, not
        // to the proxy itself.
        self.parent.adopt_all(resolution.roots);

        let instance = resolution.outcome?;

        // Eager-value products have no construction node of their own; give
        // them one so `dispose` can find them. Singletons stay owned by their
        // registering container.
        if self.parent.find(&instance).is_none() && !self.is_singleton() {
            let node = Tracked::new(&self.service);
            node.fill(instance.clone());
            self.parent.adopt(node);
        }

        Ok(instance)
    }

    /// Typed variant of [`Factory::get`].
    pub fn get_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get()?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(self.service.as_str()))
    }

    /// Release one previously manufactured instance and its transitive
    /// transients, child-first.
    ///
    /// Fails with [`DiError::NotTracked`] when the instance is not in the
    /// consumer's tracking subtree (already disposed, produced elsewhere, or
    /// a singleton).
    pub fn dispose(&self, instance: &Instance) -> Result<()> {
        let Some(node) = self.parent.detach(instance) else {
            return Err(DiError::not_tracked(self.service.as_str()));
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "trellis_di",
            service = node.service(),
            "Factory disposing instance"
        );

        let mut errors = Vec::new();
        let hook = self.container.hook();
        node.dispose(hook.as_deref(), &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DiError::disposal(errors))
        }
    }

    fn is_singleton(&self) -> bool {
        matches!(
            self.container.lookup(&self.service),
            Some((registration, _)) if registration.lifecycle == Lifecycle::Singleton
        )
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("service", &self.service)
            .field("pending_overrides", &self.frame.lock().len())
            .finish()
    }
}
