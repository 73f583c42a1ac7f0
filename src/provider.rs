//! Constructor descriptors and typed argument access
//!
//! A [`Provider`] is the explicit registration descriptor for a
//! constructor-like service: an ordered dependency list plus a build closure.
//! The resolver turns the dependency list into an [`Args`] cursor that the
//! closure consumes in declaration order.

use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::error::{DiError, Result};
use crate::factory::Factory;
use crate::registry::Instance;

/// Boxed build closure stored on a registration record
pub(crate) type BuildFn = Box<dyn Fn(&mut Args) -> Result<Instance> + Send + Sync>;

/// A parsed dependency descriptor.
///
/// Suffix sigils are recognized only here, when a dependency list is parsed,
/// never on names passed to `register` or `get`:
///
/// - `?` marks the dependency optional: absence resolves to a null slot,
/// - `!` or a trailing `Factory` requests a factory proxy for the base name,
/// - suffixes compose in any order (`"conn!?"`, `"connFactory?"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepSpec {
    /// Base service name with all suffixes stripped
    pub name: String,
    /// Absence yields a null argument slot instead of an error
    pub optional: bool,
    /// Resolve to a factory proxy bound to the base name
    pub factory: bool,
}

impl DepSpec {
    /// Parse one dependency string, stripping suffixes in any order.
    pub fn parse(raw: &str) -> Self {
        let mut name = raw;
        let mut optional = false;
        let mut factory = false;
        loop {
            if let Some(rest) = name.strip_suffix('?') {
                optional = true;
                name = rest;
            } else if let Some(rest) = name.strip_suffix('!') {
                factory = true;
                name = rest;
            } else {
                match name.strip_suffix("Factory") {
                    // A bare "Factory" is an ordinary service name, not a
                    // factory request for the empty string.
                    Some(rest) if !factory && !rest.is_empty() => {
                        factory = true;
                        name = rest;
                    }
                    _ => break,
                }
            }
        }
        Self {
            name: name.to_string(),
            optional,
            factory,
        }
    }

    /// A plain required descriptor, used for top-level `get` calls.
    pub(crate) fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: false,
            factory: false,
        }
    }
}

/// Explicit registration descriptor for a constructor-like service.
///
/// # Examples
///
/// ```rust
/// use trellis_di::{Container, Provider};
/// use std::sync::Arc;
///
/// struct Logger;
/// struct App { logger: Arc<Logger> }
///
/// let container = Container::new();
/// container.register("logger", Provider::new(|_| Ok(Logger))).unwrap();
/// container.register(
///     "app",
///     Provider::new(|args| Ok(App { logger: args.required::<Logger>()? }))
///         .with_deps(["logger"]),
/// ).unwrap();
///
/// let app = container.get_as::<App>("app").unwrap();
/// ```
pub struct Provider {
    pub(crate) deps: Vec<DepSpec>,
    pub(crate) build: BuildFn,
}

impl Provider {
    /// Wrap a build closure producing `T` into a provider with no dependencies.
    pub fn new<T, F>(build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Args) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            deps: Vec::new(),
            build: Box::new(move |args| build(args).map(|value| Arc::new(value) as Instance)),
        }
    }

    /// Attach the ordered dependency list consumed by the build closure.
    ///
    /// Each entry is parsed per [`DepSpec::parse`].
    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.deps = deps
            .into_iter()
            .map(|raw| DepSpec::parse(raw.as_ref()))
            .collect();
        self
    }

    /// Dependency descriptors attached to this provider.
    pub fn deps(&self) -> &[DepSpec] {
        &self.deps
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider").field("deps", &self.deps).finish()
    }
}

/// One constructor argument slot
pub(crate) struct ArgSlot {
    /// Dependency name, or `None` for an extra call argument
    pub name: Option<String>,
    /// `None` marks an absent optional dependency
    pub value: Option<Instance>,
}

/// Typed cursor over the argument list built for one constructor invocation.
///
/// Slots are consumed in the order the dependency list declared them; extra
/// call arguments follow.
pub struct Args {
    service: String,
    slots: std::vec::IntoIter<ArgSlot>,
}

impl Args {
    pub(crate) fn new(service: &str, slots: Vec<ArgSlot>) -> Self {
        Self {
            service: service.to_string(),
            slots: slots.into_iter(),
        }
    }

    fn next_slot(&mut self) -> Result<ArgSlot> {
        self.slots
            .next()
            .ok_or_else(|| DiError::arguments_exhausted(self.service.as_str()))
    }

    fn label(slot: &ArgSlot) -> String {
        slot.name.clone().unwrap_or_else(|| "extra".to_string())
    }

    /// Consume the next slot as a required dependency of type `T`.
    pub fn required<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let slot = self.next_slot()?;
        let value = match slot.value.clone() {
            Some(value) => value,
            None => {
                return Err(DiError::argument_mismatch::<T>(
                    self.service.as_str(),
                    Self::label(&slot),
                ));
            }
        };
        value
            .downcast::<T>()
            .map_err(|_| DiError::argument_mismatch::<T>(self.service.as_str(), Self::label(&slot)))
    }

    /// Consume the next slot as an optional dependency.
    ///
    /// An absent optional dependency yields `Ok(None)`.
    pub fn optional<T: Send + Sync + 'static>(&mut self) -> Result<Option<Arc<T>>> {
        let slot = self.next_slot()?;
        match slot.value.clone() {
            Some(value) => value
                .downcast::<T>()
                .map(Some)
                .map_err(|_| DiError::argument_mismatch::<T>(self.service.as_str(), Self::label(&slot))),
            None => Ok(None),
        }
    }

    /// Consume the next slot as a factory proxy.
    pub fn factory(&mut self) -> Result<Arc<Factory>> {
        self.required::<Factory>()
    }

    /// Consume the next slot as the owning container.
    pub fn container(&mut self) -> Result<Container> {
        Ok((*self.required::<Container>()?).clone())
    }

    /// Consume the next slot without downcasting.
    pub fn raw(&mut self) -> Result<Option<Instance>> {
        Ok(self.next_slot()?.value)
    }

    /// Drain the remaining slots, skipping null ones.
    ///
    /// Useful for constructors accepting a variable number of extra call
    /// arguments.
    pub fn rest(&mut self) -> Vec<Instance> {
        self.slots.by_ref().filter_map(|slot| slot.value).collect()
    }

    /// Number of argument slots not yet consumed.
    pub fn remaining(&self) -> usize {
        self.slots.len()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("service", &self.service)
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_name() {
        assert_eq!(
            DepSpec::parse("logger"),
            DepSpec {
                name: "logger".into(),
                optional: false,
                factory: false
            }
        );
    }

    #[test]
    fn parses_optional_suffix() {
        let spec = DepSpec::parse("cache?");
        assert_eq!(spec.name, "cache");
        assert!(spec.optional);
        assert!(!spec.factory);
    }

    #[test]
    fn parses_factory_suffixes() {
        for raw in ["widget!", "widgetFactory"] {
            let spec = DepSpec::parse(raw);
            assert_eq!(spec.name, "widget");
            assert!(spec.factory, "{raw} should parse as a factory");
            assert!(!spec.optional);
        }
    }

    #[test]
    fn suffixes_compose_in_any_order() {
        for raw in ["conn!?", "conn?!", "connFactory?"] {
            let spec = DepSpec::parse(raw);
            assert_eq!(spec.name, "conn", "{raw}");
            assert!(spec.optional, "{raw}");
            assert!(spec.factory, "{raw}");
        }
    }

    #[test]
    fn bare_factory_is_a_service_name() {
        let spec = DepSpec::parse("Factory");
        assert_eq!(spec.name, "Factory");
        assert!(!spec.factory);
    }

    #[test]
    fn factory_suffix_strips_once() {
        let spec = DepSpec::parse("widgetFactoryFactory");
        assert_eq!(spec.name, "widgetFactory");
        assert!(spec.factory);
    }

    #[test]
    fn args_consume_in_order() {
        let mut args = Args::new(
            "svc",
            vec![
                ArgSlot {
                    name: Some("first".into()),
                    value: Some(Arc::new(1u32)),
                },
                ArgSlot {
                    name: Some("second".into()),
                    value: Some(Arc::new("two")),
                },
            ],
        );

        assert_eq!(*args.required::<u32>().unwrap(), 1);
        assert_eq!(*args.required::<&str>().unwrap(), "two");
        assert_eq!(args.remaining(), 0);
    }

    #[test]
    fn absent_optional_yields_none() {
        let mut args = Args::new(
            "svc",
            vec![ArgSlot {
                name: Some("cache".into()),
                value: None,
            }],
        );
        assert!(args.optional::<u32>().unwrap().is_none());
    }

    #[test]
    fn wrong_type_reports_argument_name() {
        let mut args = Args::new(
            "svc",
            vec![ArgSlot {
                name: Some("port".into()),
                value: Some(Arc::new("not a number")),
            }],
        );
        let err = args.required::<u32>().unwrap_err();
        assert!(matches!(
            err,
            DiError::ArgumentMismatch { service, argument, .. }
                if service == "svc" && argument == "port"
        ));
    }

    #[test]
    fn exhausted_args_error() {
        let mut args = Args::new("svc", Vec::new());
        let err = args.required::<u32>().unwrap_err();
        assert!(matches!(err, DiError::ArgumentsExhausted { service } if service == "svc"));
    }

    #[test]
    fn rest_drains_extras() {
        let mut args = Args::new(
            "svc",
            vec![
                ArgSlot {
                    name: None,
                    value: Some(Arc::new(1u8)),
                },
                ArgSlot {
                    name: None,
                    value: Some(Arc::new(2u8)),
                },
            ],
        );
        assert_eq!(args.rest().len(), 2);
        assert_eq!(args.remaining(), 0);
    }
}
