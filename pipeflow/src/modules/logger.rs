//! Name-scoped logging handle given to each module.

use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Span};

/// A logging capability scoped to one module.
///
/// Every event carries a `module` field so output from concurrent workers
/// can be attributed. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ModuleLogger {
    module: Arc<str>,
}

impl ModuleLogger {
    /// Creates a logger for the named module.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: Arc::from(module.into()),
        }
    }

    /// Returns the module name this logger is scoped to.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Logs at debug level.
    pub fn debug(&self, message: impl Display) {
        debug!(module = %self.module, "{message}");
    }

    /// Logs at info level.
    pub fn info(&self, message: impl Display) {
        info!(module = %self.module, "{message}");
    }

    /// Logs at warn level.
    pub fn warn(&self, message: impl Display) {
        warn!(module = %self.module, "{message}");
    }

    /// Logs at error level.
    pub fn error(&self, message: impl Display) {
        error!(module = %self.module, "{message}");
    }

    /// Returns a span for instrumenting work done on this module's behalf.
    #[must_use]
    pub fn span(&self) -> Span {
        info_span!("module", module = %self.module)
    }
}
