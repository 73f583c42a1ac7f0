//! Error types for container operations

use thiserror::Error;

/// Errors surfaced by registration, resolution, and disposal
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// Required service absent from the container chain
    #[error("Service not registered: {name} (resolution path: {})", .path.join(" -> "))]
    NotRegistered { name: String, path: Vec<String> },

    /// A service name reappeared on the resolution stack
    #[error("Cyclic dependency: {}", .path.join(" -> "))]
    Cyclic { path: Vec<String> },

    /// Unknown lifecycle token at registration
    #[error("Unknown lifecycle {token:?} (expected \"perRequest\", \"unique\" or \"singleton\")")]
    BadLifecycle { token: String },

    /// Operation on a disposed container
    #[error("Container has been disposed")]
    Disposed,

    /// `Factory::dispose` was handed an instance outside its owner's subtree
    #[error("Instance is not tracked by the consumer of the {service:?} factory")]
    NotTracked { service: String },

    /// Resolved instance could not be downcast to the requested type
    #[error("Type mismatch for {name}: expected {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// A constructor argument slot had the wrong shape
    #[error("Bad argument {argument:?} for {service}: expected {expected}")]
    ArgumentMismatch {
        service: String,
        argument: String,
        expected: &'static str,
    },

    /// A constructor consumed more argument slots than its dependency list provides
    #[error("Constructor for {service} ran out of argument slots")]
    ArgumentsExhausted { service: String },

    /// A constructor reported a failure
    #[error("Failed to construct {service}: {reason}")]
    Construction { service: String, reason: String },

    /// Disposal traversal finished, but one or more hook invocations failed
    #[error("Disposal completed with {} error(s): {}", .errors.len(), .errors.join("; "))]
    Disposal { errors: Vec<String> },

    /// Internal container error
    #[error("Internal container error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create a NotRegistered error carrying the full resolution path
    #[inline]
    pub fn not_registered(name: impl Into<String>, path: Vec<String>) -> Self {
        Self::NotRegistered {
            name: name.into(),
            path,
        }
    }

    /// Create a Cyclic error from the resolution stack
    #[inline]
    pub fn cyclic(path: Vec<String>) -> Self {
        Self::Cyclic { path }
    }

    /// Create a BadLifecycle error for an unknown token
    #[inline]
    pub fn bad_lifecycle(token: impl Into<String>) -> Self {
        Self::BadLifecycle {
            token: token.into(),
        }
    }

    /// Create a NotTracked error for a factory's bound service
    #[inline]
    pub fn not_tracked(service: impl Into<String>) -> Self {
        Self::NotTracked {
            service: service.into(),
        }
    }

    /// Create a TypeMismatch error for the requested type
    #[inline]
    pub fn type_mismatch<T>(name: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Create an ArgumentMismatch error for a constructor argument
    #[inline]
    pub fn argument_mismatch<T>(service: impl Into<String>, argument: impl Into<String>) -> Self {
        Self::ArgumentMismatch {
            service: service.into(),
            argument: argument.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Create an ArgumentsExhausted error
    #[inline]
    pub fn arguments_exhausted(service: impl Into<String>) -> Self {
        Self::ArgumentsExhausted {
            service: service.into(),
        }
    }

    /// Create a Construction error
    #[inline]
    pub fn construction(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Construction {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create a Disposal aggregate from collected hook failures
    #[inline]
    pub fn disposal(errors: Vec<String>) -> Self {
        Self::Disposal { errors }
    }

    /// Create an Internal error
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_registered_message_includes_path() {
        let err = DiError::not_registered("db", vec!["app".into(), "repo".into(), "db".into()]);
        assert_eq!(
            err.to_string(),
            "Service not registered: db (resolution path: app -> repo -> db)"
        );
    }

    #[test]
    fn cyclic_message_joins_stack() {
        let err = DiError::cyclic(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Cyclic dependency: a -> b -> a");
    }
}
