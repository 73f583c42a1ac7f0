//! Logging configuration for trellis-di
//!
//! All container events are emitted under the `trellis_di` target:
//! registrations, container creation and disposal at DEBUG, individual
//! resolve steps at TRACE.
//!
//! # Features
//!
//! - `logging` - emit tracing events (default)
//! - `logging-json` - JSON structured output (production)
//! - `logging-pretty` - colorful output (development)
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_di::logging;
//!
//! // Default format for the enabled feature
//! logging::init();
//!
//! // Or configure explicitly
//! logging::builder()
//!     .trace()
//!     .pretty()
//!     .container_only()
//!     .init();
//! ```

use tracing::Level;

/// Output format for the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging (production default)
    #[default]
    Json,
    /// Pretty colorful output (development)
    Pretty,
    /// Compact single-line output
    Compact,
}

/// Builder for logging configuration
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            with_file: false,
            with_line_number: false,
        }
    }
}

impl LoggingBuilder {
    /// Create a new logging builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set log level to TRACE (shows every resolve step)
    pub fn trace(mut self) -> Self {
        self.level = Level::TRACE;
        self
    }

    /// Set log level to DEBUG
    pub fn debug(mut self) -> Self {
        self.level = Level::DEBUG;
        self
    }

    /// Set log level to INFO
    pub fn info(mut self) -> Self {
        self.level = Level::INFO;
        self
    }

    /// Filter to only show logs from a specific target
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show trellis-di logs
    pub fn container_only(self) -> Self {
        self.with_target_filter("trellis_di")
    }

    /// Include file names in log output
    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    /// Include line numbers in log output
    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    /// Use JSON structured logging format
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Use pretty colorful logging format
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact single-line logging format
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Initialize the logging subscriber with the configured settings
    ///
    /// Requires either `logging-json` or `logging-pretty`.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = match self.target {
            Some(target) => EnvFilter::new(format!("{}={}", target, self.level)),
            None => EnvFilter::new(self.level.to_string()),
        };

        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(layer).init();
            }
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => {
                // JSON output not compiled in, fall back to the default layer
                let layer = fmt::layer()
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(layer).init();
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .pretty()
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(layer).init();
            }
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .compact()
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
                    .with_target(true);
                tracing_subscriber::registry().with(filter).with(layer).init();
            }
        }
    }

    /// Initialize (no-op when subscriber features not available)
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {
        // No subscriber compiled in; enable logging-json or logging-pretty
    }
}

/// Create a new logging builder
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize logging with default settings for the enabled feature
#[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
pub fn init() {
    #[cfg(feature = "logging-json")]
    builder().json().debug().init();
    #[cfg(all(feature = "logging-pretty", not(feature = "logging-json")))]
    builder().pretty().debug().init();
}

/// Initialize logging (no-op when subscriber features not available)
#[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
pub fn init() {
    // No subscriber compiled in; enable logging-json or logging-pretty
}
