//! Service lifecycle tags
//!
//! A lifecycle controls how instances produced for a registration are cached
//! and who owns them for disposal.

use std::fmt;
use std::str::FromStr;

use crate::error::{DiError, Result};

/// How instances of a registered service are cached and shared.
///
/// - `PerRequest`: one instance per top-level `get` call. Every occurrence of
///   the name inside the call's dependency graph resolves to the same
///   instance; a new call gets a new instance.
/// - `Unique`: a fresh instance on every resolution, never cached, even
///   within a single call.
/// - `Singleton`: one instance per *registering* container, shared across
///   calls and with child containers that do not re-register the name.
///
/// # Examples
///
/// ```rust
/// use trellis_di::Lifecycle;
///
/// assert_eq!(Lifecycle::default(), Lifecycle::PerRequest);
/// assert_eq!("singleton".parse::<Lifecycle>().unwrap(), Lifecycle::Singleton);
/// assert!("pooled".parse::<Lifecycle>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    /// One instance per top-level resolve
    #[default]
    PerRequest,

    /// New instance on every resolution
    Unique,

    /// One instance per registering container
    Singleton,
}

impl Lifecycle {
    /// Parse a lifecycle token.
    ///
    /// Unknown tokens fail with [`DiError::BadLifecycle`].
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "perRequest" => Ok(Self::PerRequest),
            "unique" => Ok(Self::Unique),
            "singleton" => Ok(Self::Singleton),
            _ => Err(DiError::bad_lifecycle(token)),
        }
    }

    /// Canonical token for this lifecycle.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerRequest => "perRequest",
            Self::Unique => "unique",
            Self::Singleton => "singleton",
        }
    }
}

impl FromStr for Lifecycle {
    type Err = DiError;

    fn from_str(token: &str) -> Result<Self> {
        Self::parse(token)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
