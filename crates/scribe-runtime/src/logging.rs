//! Logging setup for the Scribe host.
//!
//! Thin builder over `tracing-subscriber` with `RUST_LOG` taking precedence
//! over the configured level.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// A builder for configuring logging.
///
/// ```rust,ignore
/// LoggingBuilder::new()
///     .with_level("debug")
///     .directive("scribe_bus=trace")
///     .try_init()
///     .ok();
/// ```
#[derive(Default)]
pub struct LoggingBuilder {
    level: Option<String>,
    directives: Vec<String>,
    with_target: bool,
}

impl LoggingBuilder {
    /// Creates a builder with defaults (level `info`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base log level (trace, debug, info, warn, error).
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Adds a filter directive, e.g. `"scribe_manager=debug"`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Include the target (module path) in log output.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base = self.level.clone().unwrap_or_else(|| "info".to_string());
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base));
        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    /// Initializes the logging system.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber has already been set.
    pub fn init(self) {
        let filter = self.build_filter();
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(self.with_target))
            .with(filter)
            .init();
    }

    /// Tries to initialize, returning an error instead of panicking.
    pub fn try_init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = self.build_filter();
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(self.with_target))
            .with(filter)
            .try_init()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}
