//! Base module lifecycle and the context handed to modules.

use super::ModuleLogger;
use crate::containers::ContainerStore;
use crate::errors::ModuleError;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a module receives at construction: its name, the shared
/// store and a logging handle scoped to that name.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    name: String,
    store: Arc<ContainerStore>,
    logger: ModuleLogger,
}

impl ModuleContext {
    /// Creates a context for the named module.
    #[must_use]
    pub fn new(name: impl Into<String>, store: Arc<ContainerStore>) -> Self {
        let name = name.into();
        Self {
            logger: ModuleLogger::new(name.clone()),
            name,
            store,
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shared container store.
    #[must_use]
    pub fn store(&self) -> &Arc<ContainerStore> {
        &self.store
    }

    /// Returns the module's logging handle.
    #[must_use]
    pub fn logger(&self) -> &ModuleLogger {
        &self.logger
    }
}

/// Capabilities shared by every kind of module.
pub trait BaseModule: Send + Sync + 'static {
    /// Structured configuration passed to `set_up`.
    type Config: Send + 'static;

    /// Returns the module name used for logging and diagnostics.
    fn name(&self) -> &str;

    /// One-time initialization with the module's configuration.
    fn set_up(&mut self, config: Self::Config) -> Result<(), ModuleError>;
}

/// A module whose `process` runs exactly once, on a single task.
///
/// Lifecycle: `set_up(config)` then `process()`. There is no explicit
/// teardown hook.
#[async_trait]
pub trait Module: BaseModule {
    /// Reads and writes containers in the shared store.
    async fn process(&mut self) -> Result<(), ModuleError>;
}
