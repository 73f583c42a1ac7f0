//! The resolution engine
//!
//! One [`Context`] lives for exactly one top-level `get` (or factory `get`)
//! call. It owns the perRequest cache, the resolution stack used for cycle
//! detection and transient parenting, the per-call override frame, and the
//! list of call-root tracking nodes handed back to the caller.

use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

use crate::container::Container;
use crate::error::{DiError, Result};
use crate::factory::Factory;
use crate::lifecycle::Lifecycle;
use crate::provider::{ArgSlot, Args, DepSpec};
use crate::registry::{CONTAINER_SERVICE, Ctor, Instance, Source};
use crate::tracking::{Tracked, TrackedRef};

#[cfg(feature = "logging")]
use tracing::trace;

/// Per-call override frame: service name to replacement source.
pub(crate) type OverrideMap = HashMap<String, Source, RandomState>;

/// Outcome of a top-level resolve, plus every call-root tracking node the
/// call created. Roots are returned even on failure so partially constructed
/// graphs stay reachable for container disposal.
pub(crate) struct Resolution {
    pub outcome: Result<Instance>,
    pub roots: Vec<TrackedRef>,
}

/// Run one top-level resolve against `origin` with a fresh context.
pub(crate) fn resolve_root(
    origin: &Container,
    name: &str,
    extras: Vec<Instance>,
    overrides: OverrideMap,
) -> Resolution {
    let mut ctx = Context {
        origin: origin.clone(),
        per_request: HashMap::default(),
        overrides,
        stack: Vec::new(),
        frames: Vec::new(),
        roots: Vec::new(),
    };

    let outcome = match ctx.resolve(&DepSpec::required(name), Some(extras)) {
        Ok(Some(instance)) => Ok(instance),
        Ok(None) => Err(DiError::internal("top-level resolve produced no instance")),
        Err(err) => Err(err),
    };

    Resolution {
        outcome,
        roots: ctx.roots,
    }
}

/// An in-flight construction: which lifecycle is being built and the tracking
/// node its transient dependencies should attach to.
struct Frame {
    lifecycle: Lifecycle,
    node: TrackedRef,
}

struct Context {
    origin: Container,
    per_request: HashMap<String, Instance, RandomState>,
    overrides: OverrideMap,
    stack: Vec<String>,
    frames: Vec<Frame>,
    roots: Vec<TrackedRef>,
}

impl Context {
    /// Resolve one dependency descriptor.
    ///
    /// `extras` is `Some` only for the top-level service of the call; extra
    /// arguments never propagate to dependencies.
    fn resolve(&mut self, spec: &DepSpec, extras: Option<Vec<Instance>>) -> Result<Option<Instance>> {
        let name = spec.name.as_str();

        // The reserved name short-circuits everything else: it always means
        // the container the call began in.
        if name == CONTAINER_SERVICE {
            return Ok(Some(self.container_handle()));
        }

        let looked_up = self.origin.lookup(name);
        let overridden = self.overrides.get(name).cloned();

        if looked_up.is_none() && overridden.is_none() {
            if spec.optional {
                #[cfg(feature = "logging")]
                trace!(
                    target: "trellis_di",
                    service = name,
                    "Optional dependency absent, passing null"
                );
                return Ok(None);
            }
            return Err(DiError::not_registered(name, self.path_through(name)));
        }

        if spec.factory {
            return Ok(Some(self.manufacture_factory(name)));
        }

        // Optionality never rescues a registered-but-cyclic dependency: the
        // cycle check runs before any construction.
        if self.stack.iter().any(|entry| entry == name) {
            return Err(DiError::cyclic(self.path_through(name)));
        }

        let (source, lifecycle, owner) = match (overridden, looked_up) {
            // Overrides beat registrations and never cache.
            (Some(source), _) => (source, Lifecycle::Unique, self.origin.clone()),
            (None, Some((registration, owner))) => {
                (registration.source, registration.lifecycle, owner)
            }
            (None, None) => return Err(DiError::internal("registration vanished mid-resolve")),
        };

        match lifecycle {
            Lifecycle::Singleton => {
                if let Some(cached) = owner.singleton_cached(name) {
                    #[cfg(feature = "logging")]
                    trace!(
                        target: "trellis_di",
                        service = name,
                        location = "singleton_cache",
                        "Service resolved from cache"
                    );
                    return Ok(Some(cached));
                }
            }
            Lifecycle::PerRequest => {
                if let Some(cached) = self.per_request.get(name) {
                    #[cfg(feature = "logging")]
                    trace!(
                        target: "trellis_di",
                        service = name,
                        location = "per_request_cache",
                        "Service resolved from cache"
                    );
                    return Ok(Some(cached.clone()));
                }
            }
            Lifecycle::Unique => {}
        }

        match source {
            // An eager value is the instance. No construction, no tracking.
            Source::Value(value) => Ok(Some(value)),
            Source::Ctor(ctor) => self
                .construct(name, &ctor, lifecycle, &owner, extras)
                .map(Some),
        }
    }

    fn construct(
        &mut self,
        name: &str,
        ctor: &Ctor,
        lifecycle: Lifecycle,
        owner: &Container,
        extras: Option<Vec<Instance>>,
    ) -> Result<Instance> {
        let node = Tracked::new(name);

        // Attach before building: when the constructor fails, completed
        // sub-instances stay reachable for container disposal.
        if lifecycle == Lifecycle::Singleton {
            owner.adopt_root(node.clone());
        } else {
            self.attach(node.clone());
        }

        self.stack.push(name.to_string());
        self.frames.push(Frame {
            lifecycle,
            node: node.clone(),
        });

        let built = self
            .build_args(name, &ctor.deps, extras)
            .and_then(|mut args| (ctor.build)(&mut args));

        self.frames.pop();
        self.stack.pop();

        let instance = built?;
        node.fill(instance.clone());

        match lifecycle {
            Lifecycle::Singleton => owner.cache_singleton(name, instance.clone()),
            Lifecycle::PerRequest => {
                self.per_request.insert(name.to_string(), instance.clone());
            }
            Lifecycle::Unique => {}
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "trellis_di",
            service = name,
            lifecycle = lifecycle.as_str(),
            "Constructed service instance"
        );

        Ok(instance)
    }

    /// Resolve the dependency list in declaration order, then append any
    /// top-level extras.
    fn build_args(
        &mut self,
        service: &str,
        deps: &[DepSpec],
        extras: Option<Vec<Instance>>,
    ) -> Result<Args> {
        let mut slots = Vec::with_capacity(deps.len());
        for dep in deps {
            let value = self.resolve(dep, None)?;
            slots.push(ArgSlot {
                name: Some(dep.name.clone()),
                value,
            });
        }
        if let Some(extras) = extras {
            slots.extend(extras.into_iter().map(|value| ArgSlot {
                name: None,
                value: Some(value),
            }));
        }
        Ok(Args::new(service, slots))
    }

    /// Attach a node under the nearest in-flight non-singleton construction,
    /// or at the call root when there is none.
    fn attach(&mut self, node: TrackedRef) {
        match self
            .frames
            .iter()
            .rev()
            .find(|frame| frame.lifecycle != Lifecycle::Singleton)
        {
            Some(frame) => frame.node.adopt(node),
            None => self.roots.push(node),
        }
    }

    /// Build a factory proxy bound to `name`, parented at the consumer's
    /// tracking node so the consumer owns everything the proxy manufactures.
    fn manufacture_factory(&mut self, name: &str) -> Instance {
        let parent = match self
            .frames
            .iter()
            .rev()
            .find(|frame| frame.lifecycle != Lifecycle::Singleton)
        {
            Some(frame) => frame.node.clone(),
            None => {
                // Factory requested outside any construction: anchor its
                // products directly at the call root.
                let anchor = Tracked::new(name);
                self.roots.push(anchor.clone());
                anchor
            }
        };

        #[cfg(feature = "logging")]
        trace!(target: "trellis_di", service = name, "Manufacturing factory proxy");

        Arc::new(Factory::new(name, self.origin.clone(), parent))
    }

    /// perRequest identity for the reserved `container` name.
    fn container_handle(&mut self) -> Instance {
        if let Some(existing) = self.per_request.get(CONTAINER_SERVICE) {
            return existing.clone();
        }
        let handle: Instance = Arc::new(self.origin.clone());
        self.per_request
            .insert(CONTAINER_SERVICE.to_string(), handle.clone());
        handle
    }

    fn path_through(&self, name: &str) -> Vec<String> {
        let mut path = self.stack.clone();
        path.push(name.to_string());
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::provider::Provider;
    use crate::registry::arg;

    struct Leaf;
    struct Branch {
        leaf: Arc<Leaf>,
    }
    struct Crown {
        left: Arc<Branch>,
        right: Arc<Branch>,
    }

    fn graph_container() -> Container {
        let container = Container::new();
        container
            .register("leaf", Provider::new(|_| Ok(Leaf)))
            .unwrap();
        container
            .register(
                "left",
                Provider::new(|args| {
                    Ok(Branch {
                        leaf: args.required::<Leaf>()?,
                    })
                })
                .with_deps(["leaf"]),
            )
            .unwrap();
        container
            .register(
                "right",
                Provider::new(|args| {
                    Ok(Branch {
                        leaf: args.required::<Leaf>()?,
                    })
                })
                .with_deps(["leaf"]),
            )
            .unwrap();
        container
            .register(
                "crown",
                Provider::new(|args| {
                    Ok(Crown {
                        left: args.required::<Branch>()?,
                        right: args.required::<Branch>()?,
                    })
                })
                .with_deps(["left", "right"]),
            )
            .unwrap();
        container
    }

    #[test]
    fn resolves_value_dependency_into_constructor() {
        struct Tag(&'static str);
        struct App {
            tag: Arc<Tag>,
        }

        let container = Container::new();
        container.register_value("tag", Tag("L")).unwrap();
        container
            .register(
                "app",
                Provider::new(|args| {
                    Ok(App {
                        tag: args.required::<Tag>()?,
                    })
                })
                .with_deps(["tag"]),
            )
            .unwrap();

        let app = container.get_as::<App>("app").unwrap();
        assert_eq!(app.tag.0, "L");
    }

    #[test]
    fn per_request_instances_are_shared_within_one_call() {
        let container = graph_container();

        let crown = container.get_as::<Crown>("crown").unwrap();
        assert!(Arc::ptr_eq(&crown.left.leaf, &crown.right.leaf));

        let again = container.get_as::<Crown>("crown").unwrap();
        assert!(!Arc::ptr_eq(&crown.left.leaf, &again.left.leaf));
    }

    #[test]
    fn unique_instances_are_fresh_within_one_call() {
        struct Id;
        struct Pair {
            first: Arc<Id>,
            second: Arc<Id>,
        }

        let container = Container::new();
        container
            .register_with("id", Provider::new(|_| Ok(Id)), Lifecycle::Unique)
            .unwrap();
        container
            .register(
                "pair",
                Provider::new(|args| {
                    Ok(Pair {
                        first: args.required::<Id>()?,
                        second: args.required::<Id>()?,
                    })
                })
                .with_deps(["id", "id"]),
            )
            .unwrap();

        let pair = container.get_as::<Pair>("pair").unwrap();
        assert!(!Arc::ptr_eq(&pair.first, &pair.second));
    }

    #[test]
    fn absent_optional_dependency_passes_null() {
        struct App {
            cache: Option<Arc<Leaf>>,
        }

        let container = Container::new();
        container
            .register(
                "app",
                Provider::new(|args| {
                    Ok(App {
                        cache: args.optional::<Leaf>()?,
                    })
                })
                .with_deps(["cache?"]),
            )
            .unwrap();

        let app = container.get_as::<App>("app").unwrap();
        assert!(app.cache.is_none());
    }

    #[test]
    fn missing_required_dependency_reports_path() {
        struct App;

        let container = Container::new();
        container
            .register("app", Provider::new(|_| Ok(App)).with_deps(["missing"]))
            .unwrap();

        let err = container.get("app").unwrap_err();
        assert!(matches!(
            err,
            DiError::NotRegistered { ref name, ref path }
                if name == "missing" && *path == vec!["app".to_string(), "missing".to_string()]
        ));
    }

    #[test]
    fn cycle_is_detected_with_full_path() {
        struct A;
        struct B;

        let container = Container::new();
        container
            .register("a", Provider::new(|_| Ok(A)).with_deps(["b"]))
            .unwrap();
        container
            .register("b", Provider::new(|_| Ok(B)).with_deps(["a"]))
            .unwrap();

        let err = container.get("a").unwrap_err();
        assert!(matches!(
            err,
            DiError::Cyclic { ref path }
                if *path == vec!["a".to_string(), "b".to_string(), "a".to_string()]
        ));
    }

    #[test]
    fn optional_marker_does_not_defeat_cycle_detection() {
        struct A;
        struct B;

        let container = Container::new();
        container
            .register("a", Provider::new(|_| Ok(A)).with_deps(["b"]))
            .unwrap();
        container
            .register("b", Provider::new(|_| Ok(B)).with_deps(["a?"]))
            .unwrap();

        let err = container.get("a").unwrap_err();
        assert!(matches!(err, DiError::Cyclic { .. }));
    }

    #[test]
    fn extras_reach_only_the_top_level_constructor() {
        struct Echo {
            extras: Vec<Instance>,
        }
        struct Outer {
            echo: Arc<Echo>,
        }

        let container = Container::new();
        container
            .register("echo", Provider::new(|args| Ok(Echo { extras: args.rest() })))
            .unwrap();
        container
            .register(
                "outer",
                Provider::new(|args| {
                    Ok(Outer {
                        echo: args.required::<Echo>()?,
                    })
                })
                .with_deps(["echo"]),
            )
            .unwrap();

        let echo = container
            .get_with("echo", vec![arg(1u8), arg(2u8)])
            .unwrap()
            .downcast::<Echo>()
            .unwrap();
        assert_eq!(echo.extras.len(), 2);

        let outer = container
            .get_with("outer", vec![arg(9u8)])
            .unwrap()
            .downcast::<Outer>()
            .unwrap();
        assert!(outer.echo.extras.is_empty());
    }

    #[test]
    fn reserved_container_name_resolves_to_origin() {
        struct Needy {
            owner: Container,
        }

        let container = Container::new();
        container
            .register(
                "needy",
                Provider::new(|args| {
                    Ok(Needy {
                        owner: args.container()?,
                    })
                })
                .with_deps(["container"]),
            )
            .unwrap();

        let needy = container.get_as::<Needy>("needy").unwrap();
        assert_eq!(needy.owner, container);
    }

    #[test]
    fn reserved_container_name_wins_over_registration() {
        struct Impostor;

        let container = Container::new();
        container.register_value("container", Impostor).unwrap();

        let resolved = container.get("container").unwrap();
        assert!(resolved.downcast::<Container>().is_ok());
    }

    #[test]
    fn failed_constructor_leaves_subgraph_tracked() {
        use parking_lot::Mutex;

        struct Broken;

        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        let container = Container::with_options(crate::Options::new().on_dispose(
            move |_instance, name| {
                seen.lock().push(name.to_string());
                Ok(())
            },
        ));

        container
            .register("leaf", Provider::new(|_| Ok(Leaf)))
            .unwrap();
        container
            .register(
                "broken",
                Provider::new(|args| -> Result<Broken> {
                    let _ = args.required::<Leaf>()?;
                    Err(DiError::construction("broken", "boom"))
                })
                .with_deps(["leaf"]),
            )
            .unwrap();

        assert!(container.get("broken").is_err());

        container.dispose().unwrap();
        // The leaf that was built before the failure is reclaimed; the
        // never-completed "broken" instance is not reported.
        assert_eq!(*log.lock(), vec!["leaf"]);
    }
}
