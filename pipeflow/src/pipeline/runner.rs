//! Sequential pipeline driver.

use super::result::{ModuleOutcome, PipelineRunResult};
use super::step::{parse_args, BoundModule, BoundThreadAware, PipelineStep};
use crate::containers::ContainerStore;
use crate::dispatch::Dispatcher;
use crate::errors::PipeflowError;
use crate::events::{event_types, EventSink, NoOpEventSink};
use crate::modules::{Module, ModuleContext, ThreadAwareModule};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs modules in registration order against one shared store.
///
/// A run has two phases. First every module is set up; a single set-up
/// failure aborts the run before anything is processed. Then the modules
/// run one after another: ordinary modules call `process` once, and
/// thread-aware modules fan out through a [`Dispatcher`]. A critical
/// failure stops the run and the remaining modules are reported as skipped.
pub struct Pipeline {
    name: String,
    store: Arc<ContainerStore>,
    events: Arc<dyn EventSink>,
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// Creates an empty pipeline with its own store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(ContainerStore::new()),
            events: Arc::new(NoOpEventSink),
            steps: Vec::new(),
        }
    }

    /// Sets the sink receiving module and dispatch events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<ContainerStore> {
        &self.store
    }

    /// Builds the context a module needs to be constructed for this pipeline.
    #[must_use]
    pub fn context(&self, module_name: impl Into<String>) -> ModuleContext {
        ModuleContext::new(module_name, Arc::clone(&self.store))
    }

    /// Returns the number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no module is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the registered module names, in run order.
    #[must_use]
    pub fn module_names(&self) -> Vec<&str> {
        self.steps.iter().map(PipelineStep::name).collect()
    }

    /// Adds an ordinary module with its configuration.
    pub fn add_module<M: Module>(&mut self, module: M, config: M::Config) -> &mut Self {
        self.steps
            .push(PipelineStep::Single(Box::new(BoundModule::new(module, config))));
        self
    }

    /// Adds an ordinary module, deserializing its configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PipeflowError::Config`] if `args` does not match the
    /// module's config type.
    pub fn add_module_with_args<M>(
        &mut self,
        module: M,
        args: serde_json::Value,
    ) -> Result<&mut Self, PipeflowError>
    where
        M: Module,
        M::Config: DeserializeOwned,
    {
        let config = parse_args(module.name(), args)?;
        Ok(self.add_module(module, config))
    }

    /// Adds a thread-aware module with its configuration.
    pub fn add_thread_aware_module<M: ThreadAwareModule>(
        &mut self,
        module: M,
        config: M::Config,
    ) -> &mut Self {
        self.steps.push(PipelineStep::ThreadAware(Box::new(
            BoundThreadAware::new(module, config),
        )));
        self
    }

    /// Adds a thread-aware module, deserializing its configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PipeflowError::Config`] if `args` does not match the
    /// module's config type.
    pub fn add_thread_aware_module_with_args<M>(
        &mut self,
        module: M,
        args: serde_json::Value,
    ) -> Result<&mut Self, PipeflowError>
    where
        M: ThreadAwareModule,
        M::Config: DeserializeOwned,
    {
        let config = parse_args(module.name(), args)?;
        Ok(self.add_thread_aware_module(module, config))
    }

    /// Runs the pipeline once.
    ///
    /// Modules are consumed by their set-up; running the same pipeline a
    /// second time fails every set-up.
    pub async fn run(&mut self) -> PipelineRunResult {
        let start = Instant::now();
        info!(pipeline = %self.name, modules = self.steps.len(), "Pipeline started");

        let mut outcomes = Vec::with_capacity(self.steps.len());
        let mut aborted_at = self.set_up_all(&mut outcomes);

        if aborted_at.is_none() {
            aborted_at = self.process_all(&mut outcomes).await;
        }

        let success = outcomes.iter().all(|o| o.error.is_none()) && aborted_at.is_none();
        let result = PipelineRunResult {
            pipeline: self.name.clone(),
            outcomes,
            success,
            aborted_at,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        if result.success {
            info!(pipeline = %self.name, duration_ms = result.duration_ms, "Pipeline completed");
        } else {
            warn!(
                pipeline = %self.name,
                aborted_at = ?result.aborted_at,
                errors = result.errors().len(),
                duration_ms = result.duration_ms,
                "Pipeline finished with failures"
            );
        }
        result
    }

    /// Sets up every module. Returns the name of the first module that failed.
    fn set_up_all(&mut self, outcomes: &mut Vec<ModuleOutcome>) -> Option<String> {
        let mut failed: Option<(usize, String, PipeflowError)> = None;

        for (index, step) in self.steps.iter_mut().enumerate() {
            let module = step.name().to_string();
            self.events.try_emit(
                event_types::MODULE_SETUP_STARTED,
                Some(serde_json::json!({ "module": &module })),
            );

            match step.set_up() {
                Ok(()) => {
                    debug!(module = %module, "Module set up");
                    self.events.try_emit(
                        event_types::MODULE_SETUP_COMPLETED,
                        Some(serde_json::json!({ "module": &module })),
                    );
                }
                Err(source) => {
                    warn!(module = %module, error = %source, "Module set-up failed");
                    self.events.try_emit(
                        event_types::MODULE_SETUP_FAILED,
                        Some(serde_json::json!({ "module": &module, "error": &source.message })),
                    );
                    failed = Some((index, module.clone(), PipeflowError::SetUp { module, source }));
                    break;
                }
            }
        }

        let (failed_index, module, error) = failed?;
        for (index, step) in self.steps.iter().enumerate() {
            if index == failed_index {
                outcomes.push(ModuleOutcome::failed(step.name(), error.clone()));
            } else {
                outcomes.push(ModuleOutcome::skipped(step.name()));
            }
        }
        Some(module)
    }

    /// Runs every module in order. Returns the module a critical failure
    /// stopped the run at.
    async fn process_all(&mut self, outcomes: &mut Vec<ModuleOutcome>) -> Option<String> {
        let dispatcher =
            Dispatcher::new(Arc::clone(&self.store)).with_event_sink(Arc::clone(&self.events));
        let mut aborted_at: Option<String> = None;

        for step in &mut self.steps {
            let module = step.name().to_string();
            if aborted_at.is_some() {
                outcomes.push(ModuleOutcome::skipped(module));
                continue;
            }
            debug!(module = %module, thread_aware = step.is_thread_aware(), "Running module");

            let outcome = match step {
                PipelineStep::Single(runner) => {
                    self.events.try_emit(
                        event_types::MODULE_PROCESS_STARTED,
                        Some(serde_json::json!({ "module": &module })),
                    );
                    match runner.process().await {
                        Ok(()) => {
                            self.events.try_emit(
                                event_types::MODULE_PROCESS_COMPLETED,
                                Some(serde_json::json!({ "module": &module })),
                            );
                            ModuleOutcome::ok(&module, None)
                        }
                        Err(source) => {
                            self.events.try_emit(
                                event_types::MODULE_PROCESS_FAILED,
                                Some(serde_json::json!({
                                    "module": &module,
                                    "error": &source.message,
                                    "critical": source.critical,
                                })),
                            );
                            ModuleOutcome::failed(
                                &module,
                                PipeflowError::Process {
                                    module: module.clone(),
                                    source,
                                },
                            )
                        }
                    }
                }
                PipelineStep::ThreadAware(runner) => match runner.dispatch(&dispatcher).await {
                    Ok(report) => ModuleOutcome::ok(&module, Some(report)),
                    Err(err) => ModuleOutcome::failed(&module, PipeflowError::Dispatch(err)),
                },
            };

            if let Some(error) = &outcome.error {
                if error.is_critical() {
                    warn!(module = %module, error = %error, "Critical failure; aborting pipeline");
                    aborted_at = Some(module.clone());
                } else {
                    warn!(module = %module, error = %error, "Module failed; continuing");
                }
            } else {
                debug!(module = %module, "Module completed");
            }
            outcomes.push(outcome);
        }

        aborted_at
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("modules", &self.module_names())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
