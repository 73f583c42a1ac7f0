//! # trellis-di - Name-Based IoC Container for Rust
//!
//! A hierarchical inversion-of-control container that resolves object graphs
//! from named registrations, with scoped lifetimes, dynamic factories, and
//! deterministic cascade disposal.
//!
//! ## Features
//!
//! - 🏷️ **Named services** - registrations and dependencies are plain strings
//! - ♻️ **Three lifecycles** - `perRequest`, `unique`, and `singleton`
//! - 🌳 **Child containers** - nested scopes whose registrations shadow parents'
//! - 🏭 **Factories** - on-demand manufacture with chainable per-call overrides
//! - 🧹 **Tracked disposal** - transients are owned by their consumer and
//!   released child-first when the consumer (or the container) is disposed
//! - 📊 **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis_di::{Container, Provider};
//! use std::sync::Arc;
//!
//! struct Logger { tag: &'static str }
//! struct App { logger: Arc<Logger> }
//!
//! let container = Container::new();
//!
//! // Eager values are used as-is.
//! container.register_value("logger", Logger { tag: "app" }).unwrap();
//!
//! // Constructor-likes declare their dependencies by name and consume the
//! // resolved arguments in order.
//! container.register(
//!     "app",
//!     Provider::new(|args| Ok(App { logger: args.required::<Logger>()? }))
//!         .with_deps(["logger"]),
//! ).unwrap();
//!
//! let app = container.get_as::<App>("app").unwrap();
//! assert_eq!(app.logger.tag, "app");
//! ```
//!
//! ## Service Lifecycles
//!
//! ```rust
//! use trellis_di::{Container, Lifecycle, Provider};
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! static BUILDS: AtomicU32 = AtomicU32::new(0);
//!
//! struct Config;
//! struct RequestId(u32);
//!
//! let container = Container::new();
//!
//! // Singleton: one instance per registering container.
//! container.register_with(
//!     "config",
//!     Provider::new(|_| Ok(Config)),
//!     Lifecycle::Singleton,
//! ).unwrap();
//!
//! // Unique: a fresh instance on every resolution.
//! container.register_with(
//!     "request_id",
//!     Provider::new(|_| Ok(RequestId(BUILDS.fetch_add(1, Ordering::SeqCst)))),
//!     Lifecycle::Unique,
//! ).unwrap();
//!
//! let a = container.get_as::<RequestId>("request_id").unwrap();
//! let b = container.get_as::<RequestId>("request_id").unwrap();
//! assert_ne!(a.0, b.0);
//! ```
//!
//! ## Child Containers
//!
//! ```rust
//! let root = trellis_di::create();
//! root.register_value("dsn", "postgres://prod").unwrap();
//!
//! let test = root.create().unwrap();
//! test.register_value("dsn", "postgres://test").unwrap();
//!
//! // Child registrations shadow the parent's; the parent is untouched.
//! assert_eq!(*test.get_as::<&str>("dsn").unwrap(), "postgres://test");
//! assert_eq!(*root.get_as::<&str>("dsn").unwrap(), "postgres://prod");
//! ```
//!
//! ## Dependency Suffixes
//!
//! Dependency lists understand three sigils, parsed only there (never on
//! names passed to `register` or `get`):
//!
//! | Entry | Meaning |
//! |---|---|
//! | `"db"` | required dependency |
//! | `"db?"` | optional: absent resolves to a null slot |
//! | `"db!"` / `"dbFactory"` | a [`Factory`] proxy bound to `db` |
//! | `"container"` | the owning [`Container`] itself |

mod container;
mod error;
mod factory;
mod lifecycle;
#[cfg(feature = "logging")]
pub mod logging;
mod provider;
mod registry;
mod resolver;
mod tracking;

pub use container::{Container, DisposeHook, DisposeOutcome, Options};
pub use error::{DiError, Result};
pub use factory::Factory;
pub use lifecycle::Lifecycle;
pub use provider::{Args, DepSpec, Provider};
pub use registry::{Instance, arg};

// Re-export tracing macros for convenience when logging is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Create a root container with default options.
#[inline]
pub fn create() -> Container {
    Container::new()
}

/// Create a root container configured with [`Options`].
#[inline]
pub fn create_with(options: Options) -> Container {
    Container::with_options(options)
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Args, Container, DiError, Factory, Instance, Lifecycle, Options, Provider, Result, arg,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Config {
        dsn: &'static str,
    }
    struct Pool {
        config: Arc<Config>,
    }
    struct Repo {
        pool: Arc<Pool>,
    }
    struct App {
        repo: Arc<Repo>,
        pool: Arc<Pool>,
    }

    fn app_container() -> Container {
        let container = create();
        container
            .register_value("config", Config { dsn: "postgres://localhost" })
            .unwrap();
        container
            .register_with(
                "pool",
                Provider::new(|args| {
                    Ok(Pool {
                        config: args.required::<Config>()?,
                    })
                })
                .with_deps(["config"]),
                Lifecycle::Singleton,
            )
            .unwrap();
        container
            .register(
                "repo",
                Provider::new(|args| {
                    Ok(Repo {
                        pool: args.required::<Pool>()?,
                    })
                })
                .with_deps(["pool"]),
            )
            .unwrap();
        container
            .register(
                "app",
                Provider::new(|args| {
                    Ok(App {
                        repo: args.required::<Repo>()?,
                        pool: args.required::<Pool>()?,
                    })
                })
                .with_deps(["repo", "pool"]),
            )
            .unwrap();
        container
    }

    #[test]
    fn resolves_a_layered_graph() {
        let container = app_container();
        let app = container.get_as::<App>("app").unwrap();

        assert_eq!(app.pool.config.dsn, "postgres://localhost");
        // The singleton pool is one instance wherever it appears.
        assert!(Arc::ptr_eq(&app.repo.pool, &app.pool));
    }

    #[test]
    fn per_request_instances_differ_across_calls() {
        let container = app_container();

        let first = container.get_as::<App>("app").unwrap();
        let second = container.get_as::<App>("app").unwrap();

        assert!(!Arc::ptr_eq(&first.repo, &second.repo));
        // But the singleton pool persists across calls.
        assert!(Arc::ptr_eq(&first.pool, &second.pool));
    }

    #[test]
    fn whole_application_shutdown_releases_everything() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let container = create_with(Options::new().on_dispose(move |_instance, name| {
            seen.lock().push(name.to_string());
            Ok(())
        }));

        struct Session(u32);
        container
            .register_with(
                "session",
                Provider::new(|_| Ok(Session(0))),
                Lifecycle::Unique,
            )
            .unwrap();

        let _a = container.get("session").unwrap();
        let _b = container.get("session").unwrap();
        container.dispose().unwrap();

        assert_eq!(*log.lock(), vec!["session", "session"]);
    }
}
