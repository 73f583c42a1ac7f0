//! The user-facing container facade
//!
//! A `Container` owns a name-keyed registry, a singleton cache, and the
//! tracking roots for everything its resolves create. Child containers
//! shadow their parent's registrations and are disposed with it.

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{DiError, Result};
use crate::lifecycle::Lifecycle;
use crate::provider::Provider;
use crate::registry::{CONTAINER_SERVICE, Ctor, Instance, Registration, Registry, Source};
use crate::resolver;
use crate::tracking::TrackedRef;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Outcome of one disposal hook invocation
pub type DisposeOutcome = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Disposal callback: invoked once per tracked instance with the instance
/// and the name it was registered under. Failures are collected and
/// re-raised as a [`DiError::Disposal`] aggregate after the traversal
/// completes.
pub type DisposeHook = dyn Fn(&Instance, &str) -> DisposeOutcome + Send + Sync;

/// Configuration accepted by [`create_with`](crate::create_with).
///
/// # Examples
///
/// ```rust
/// use trellis_di::{create_with, Options, Provider};
///
/// struct Conn;
///
/// let container = create_with(Options::new().on_dispose(|_instance, name| {
///     println!("releasing {name}");
///     Ok(())
/// }));
///
/// container.register("conn", Provider::new(|_| Ok(Conn))).unwrap();
/// let _conn = container.get("conn").unwrap();
/// container.dispose().unwrap();
/// assert!(container.is_disposed());
/// ```
#[derive(Clone, Default)]
pub struct Options {
    pub(crate) on_dispose: Option<Arc<DisposeHook>>,
}

impl Options {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the disposal hook. Child containers inherit it.
    pub fn on_dispose<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Instance, &str) -> DisposeOutcome + Send + Sync + 'static,
    {
        self.on_dispose = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("on_dispose", &self.on_dispose.is_some())
            .finish()
    }
}

pub(crate) struct ContainerInner {
    registry: Registry,
    singletons: DashMap<String, Instance, RandomState>,
    tracking_root: Mutex<Vec<TrackedRef>>,
    parent: Option<Container>,
    children: Mutex<Vec<Weak<ContainerInner>>>,
    on_dispose: Option<Arc<DisposeHook>>,
    disposed: AtomicBool,
    depth: u32,
}

/// Name-based IoC container.
///
/// Cloning a `Container` clones a handle to the same scope.
///
/// # Examples
///
/// ```rust
/// use trellis_di::{Container, Provider};
/// use std::sync::Arc;
///
/// struct Greeter { greeting: Arc<&'static str> }
///
/// let container = Container::new();
/// container.register_value("greeting", "hello").unwrap();
/// container.register(
///     "greeter",
///     Provider::new(|args| Ok(Greeter { greeting: args.required::<&str>()? }))
///         .with_deps(["greeting"]),
/// ).unwrap();
///
/// let greeter = container.get_as::<Greeter>("greeter").unwrap();
/// assert_eq!(*greeter.greeting, "hello");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Create a root container with default options.
    #[inline]
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// Create a root container configured with [`Options`].
    pub fn with_options(options: Options) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "trellis_di",
            depth = 0,
            "Creating root container"
        );

        Self {
            inner: Arc::new(ContainerInner {
                registry: Registry::new(),
                singletons: singleton_cache(),
                tracking_root: Mutex::new(Vec::new()),
                parent: None,
                children: Mutex::new(Vec::new()),
                on_dispose: options.on_dispose,
                disposed: AtomicBool::new(false),
                depth: 0,
            }),
        }
    }

    /// Create a child container.
    ///
    /// The child starts with an empty registry; its registrations shadow the
    /// parent's for resolves that begin in the child. Singletons for names
    /// the child does not re-register live in the parent's cache. Disposing
    /// the parent disposes any children not already disposed.
    pub fn create(&self) -> Result<Container> {
        self.ensure_live()?;

        let child = Container {
            inner: Arc::new(ContainerInner {
                registry: Registry::new(),
                singletons: singleton_cache(),
                tracking_root: Mutex::new(Vec::new()),
                parent: Some(self.clone()),
                children: Mutex::new(Vec::new()),
                on_dispose: self.inner.on_dispose.clone(),
                disposed: AtomicBool::new(false),
                depth: self.inner.depth + 1,
            }),
        };
        self.inner.children.lock().push(Arc::downgrade(&child.inner));

        #[cfg(feature = "logging")]
        debug!(
            target: "trellis_di",
            parent_depth = self.inner.depth,
            child_depth = child.inner.depth,
            "Creating child container"
        );

        Ok(child)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a constructor-like service with the default `perRequest`
    /// lifecycle.
    #[inline]
    pub fn register(&self, name: impl Into<String>, provider: Provider) -> Result<()> {
        self.register_with(name, provider, Lifecycle::default())
    }

    /// Register a constructor-like service with an explicit lifecycle.
    pub fn register_with(
        &self,
        name: impl Into<String>,
        provider: Provider,
        lifecycle: Lifecycle,
    ) -> Result<()> {
        self.insert(
            name.into(),
            Registration {
                source: Source::Ctor(Arc::new(Ctor {
                    deps: provider.deps,
                    build: provider.build,
                })),
                lifecycle,
            },
        )
    }

    /// Register with a lifecycle token parsed at runtime.
    ///
    /// Unknown tokens fail with [`DiError::BadLifecycle`].
    pub fn register_dynamic(
        &self,
        name: impl Into<String>,
        provider: Provider,
        lifecycle: &str,
    ) -> Result<()> {
        let lifecycle = Lifecycle::parse(lifecycle)?;
        self.register_with(name, provider, lifecycle)
    }

    /// Register an eager value, used as-is on every resolve.
    #[inline]
    pub fn register_value<T: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> Result<()> {
        self.register_instance(name, Arc::new(value))
    }

    /// Register a pre-erased eager value.
    pub fn register_instance(&self, name: impl Into<String>, instance: Instance) -> Result<()> {
        self.insert(
            name.into(),
            Registration {
                source: Source::Value(instance),
                lifecycle: Lifecycle::default(),
            },
        )
    }

    fn insert(&self, name: String, registration: Registration) -> Result<()> {
        self.ensure_live()?;

        #[cfg(feature = "logging")]
        debug!(
            target: "trellis_di",
            service = name.as_str(),
            lifecycle = registration.lifecycle.as_str(),
            depth = self.inner.depth,
            "Registering service"
        );

        self.inner.registry.insert(name, registration);
        Ok(())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a service by name.
    ///
    /// Starts a fresh resolution context; walks the parent chain when the
    /// name is not registered locally.
    #[inline]
    pub fn get(&self, name: &str) -> Result<Instance> {
        self.get_with(name, Vec::new())
    }

    /// Resolve with extra constructor arguments.
    ///
    /// Extras are appended to the top-level constructor's arguments only;
    /// they never propagate to dependencies.
    pub fn get_with(&self, name: &str, extras: Vec<Instance>) -> Result<Instance> {
        self.ensure_live()?;

        #[cfg(feature = "logging")]
        trace!(
            target: "trellis_di",
            service = name,
            depth = self.inner.depth,
            "Resolving service"
        );

        let resolution = resolver::resolve_root(self, name, extras, resolver::OverrideMap::default());
        // Adopt even on failure: partially constructed sub-graphs stay
        // reachable for disposal.
        self.adopt_roots(resolution.roots);
        resolution.outcome
    }

    /// Typed variant of [`Container::get`].
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.get(name)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(name))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Check whether a name resolves here, in a parent, or as the reserved
    /// `container` service.
    pub fn contains(&self, name: &str) -> bool {
        name == CONTAINER_SERVICE || self.lookup(name).is_some()
    }

    /// Check whether a name is registered in this container only.
    #[inline]
    pub fn contains_local(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    /// Number of registrations in this container (not including parents).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    /// Check whether this container has no registrations of its own.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Nesting depth (0 = root).
    #[inline]
    pub fn depth(&self) -> u32 {
        self.inner.depth
    }

    /// Names registered in this container (not including parents).
    pub fn registered_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Check whether this container has been disposed.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Dispose this container: undisposed children first, then the tracking
    /// roots in reverse insertion order (children before parents within each
    /// node), including this container's singletons.
    ///
    /// Idempotent. After disposal the registry, singleton cache, and tracking
    /// roots are cleared, and `get`/`create`/`register` fail with
    /// [`DiError::Disposed`]. Hook failures do not stop the traversal; they
    /// are re-raised as one [`DiError::Disposal`] aggregate.
    pub fn dispose(&self) -> Result<()> {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "trellis_di",
            depth = self.inner.depth,
            services = self.inner.registry.len(),
            "Disposing container"
        );

        let mut errors = Vec::new();

        // Children that were never explicitly disposed go down with the
        // parent.
        let children: Vec<Weak<ContainerInner>> = {
            let mut guard = self.inner.children.lock();
            guard.drain(..).collect()
        };
        for weak in children.into_iter().rev() {
            if let Some(inner) = weak.upgrade() {
                match (Container { inner }).dispose() {
                    Ok(()) => {}
                    Err(DiError::Disposal { errors: nested }) => errors.extend(nested),
                    Err(other) => errors.push(other.to_string()),
                }
            }
        }

        let roots: Vec<TrackedRef> = {
            let mut guard = self.inner.tracking_root.lock();
            guard.drain(..).collect()
        };
        let hook = self.inner.on_dispose.clone();
        for node in roots.iter().rev() {
            node.dispose(hook.as_deref(), &mut errors);
        }

        self.inner.singletons.clear();
        self.inner.registry.clear();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DiError::disposal(errors))
        }
    }

    // =========================================================================
    // Crate internals
    // =========================================================================

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(DiError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Find a registration for `name`, searching this container first and
    /// then the parent chain. Returns the record together with the container
    /// that owns it.
    pub(crate) fn lookup(&self, name: &str) -> Option<(Registration, Container)> {
        let mut current = Some(self.clone());
        while let Some(container) = current {
            if let Some(registration) = container.inner.registry.get(name) {
                return Some((registration, container));
            }
            current = container.inner.parent.clone();
        }
        None
    }

    pub(crate) fn singleton_cached(&self, name: &str) -> Option<Instance> {
        self.inner.singletons.get(name).map(|entry| entry.clone())
    }

    pub(crate) fn cache_singleton(&self, name: &str, instance: Instance) {
        self.inner.singletons.insert(name.to_string(), instance);
    }

    pub(crate) fn adopt_root(&self, node: TrackedRef) {
        self.inner.tracking_root.lock().push(node);
    }

    pub(crate) fn adopt_roots(&self, nodes: Vec<TrackedRef>) {
        if !nodes.is_empty() {
            self.inner.tracking_root.lock().extend(nodes);
        }
    }

    pub(crate) fn hook(&self) -> Option<Arc<DisposeHook>> {
        self.inner.on_dispose.clone()
    }
}

#[inline]
fn singleton_cache() -> DashMap<String, Instance, RandomState> {
    DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8)
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Container {
    /// Two handles are equal when they refer to the same container.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Container {}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.len())
            .field("depth", &self.inner.depth)
            .field("has_parent", &self.inner.parent.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
