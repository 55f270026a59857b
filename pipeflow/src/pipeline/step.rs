//! Type-erased module runners held by a pipeline.

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::errors::{DispatchError, ModuleError, PipeflowError};
use crate::modules::{Module, ThreadAwareModule};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Parses JSON module arguments into the module's config type.
pub(crate) fn parse_args<C: DeserializeOwned>(
    module: &str,
    args: serde_json::Value,
) -> Result<C, PipeflowError> {
    serde_json::from_value(args).map_err(|e| PipeflowError::Config {
        module: module.to_string(),
        message: e.to_string(),
    })
}

fn already_set_up() -> ModuleError {
    ModuleError::critical("module was already set up; a pipeline runs once")
}

/// An ordinary module bound to its configuration.
#[async_trait]
pub(crate) trait ModuleRunner: Send {
    fn name(&self) -> &str;
    fn set_up(&mut self) -> Result<(), ModuleError>;
    async fn process(&mut self) -> Result<(), ModuleError>;
}

/// A thread-aware module bound to its configuration.
#[async_trait]
pub(crate) trait DispatchRunner: Send {
    fn name(&self) -> &str;
    fn set_up(&mut self) -> Result<(), ModuleError>;
    async fn dispatch(&mut self, dispatcher: &Dispatcher) -> Result<DispatchReport, DispatchError>;
}

pub(crate) struct BoundModule<M: Module> {
    module: M,
    config: Option<M::Config>,
}

impl<M: Module> BoundModule<M> {
    pub(crate) fn new(module: M, config: M::Config) -> Self {
        Self {
            module,
            config: Some(config),
        }
    }
}

#[async_trait]
impl<M: Module> ModuleRunner for BoundModule<M> {
    fn name(&self) -> &str {
        self.module.name()
    }

    fn set_up(&mut self) -> Result<(), ModuleError> {
        let config = self.config.take().ok_or_else(already_set_up)?;
        self.module.set_up(config)
    }

    async fn process(&mut self) -> Result<(), ModuleError> {
        self.module.process().await
    }
}

pub(crate) struct BoundThreadAware<M: ThreadAwareModule> {
    module: Arc<M>,
    config: Option<M::Config>,
}

impl<M: ThreadAwareModule> BoundThreadAware<M> {
    pub(crate) fn new(module: M, config: M::Config) -> Self {
        Self {
            module: Arc::new(module),
            config: Some(config),
        }
    }
}

#[async_trait]
impl<M: ThreadAwareModule> DispatchRunner for BoundThreadAware<M> {
    fn name(&self) -> &str {
        self.module.name()
    }

    fn set_up(&mut self) -> Result<(), ModuleError> {
        let config = self.config.take().ok_or_else(already_set_up)?;
        let module = Arc::get_mut(&mut self.module)
            .ok_or_else(|| ModuleError::critical("module is shared and cannot be set up"))?;
        module.set_up(config)
    }

    async fn dispatch(&mut self, dispatcher: &Dispatcher) -> Result<DispatchReport, DispatchError> {
        dispatcher.dispatch(Arc::clone(&self.module)).await
    }
}

/// The closed set of module kinds a pipeline can run.
pub(crate) enum PipelineStep {
    /// Runs `process` once.
    Single(Box<dyn ModuleRunner>),
    /// Fans out through the dispatcher.
    ThreadAware(Box<dyn DispatchRunner>),
}

impl PipelineStep {
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Single(runner) => runner.name(),
            Self::ThreadAware(runner) => runner.name(),
        }
    }

    pub(crate) fn set_up(&mut self) -> Result<(), ModuleError> {
        match self {
            Self::Single(runner) => runner.set_up(),
            Self::ThreadAware(runner) => runner.set_up(),
        }
    }

    pub(crate) const fn is_thread_aware(&self) -> bool {
        matches!(self, Self::ThreadAware(_))
    }
}
