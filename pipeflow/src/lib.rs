//! # Pipeflow
//!
//! The execution core of a modular data-processing pipeline.
//!
//! Modules exchange typed attribute containers through a shared,
//! thread-safe store. Pipeflow provides:
//!
//! - **Container store**: typed storage keyed by container type, with
//!   identity-based removal, dedupe and streaming callbacks
//! - **Module contracts**: ordinary modules that run once, and thread-aware
//!   modules whose `process` step fans out over every container of one type
//! - **Bounded dispatch**: a worker pool per thread-aware module, with
//!   per-item failure isolation and a configurable retention policy
//! - **Lifecycle events**: observational events for set-up, processing and
//!   every dispatch phase
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipeflow::prelude::*;
//!
//! let mut pipeline = Pipeline::new("triage");
//! let collect = CollectModule::new(pipeline.context("collect"));
//! let parse = ParseModule::new(pipeline.context("parse"));
//! pipeline
//!     .add_module(collect, CollectConfig::default())
//!     .add_thread_aware_module(parse, ());
//!
//! let result = pipeline.run().await;
//! assert!(result.success);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod containers;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod modules;
pub mod observability;
pub mod pipeline;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::containers::{AttributeContainer, ContainerRef, ContainerStore};
    pub use crate::dispatch::{DispatchPhase, DispatchReport, Dispatcher};
    pub use crate::errors::{DispatchError, ItemFailure, ModuleError, PipeflowError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::modules::{BaseModule, Module, ModuleContext, ModuleLogger, ThreadAwareModule};
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::pipeline::{ModuleOutcome, ModuleStatus, Pipeline, PipelineRunResult};
}
