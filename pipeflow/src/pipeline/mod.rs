//! Pipeline assembly and execution.
//!
//! This module provides:
//! - A sequential driver running ordinary and thread-aware modules
//! - Typed and JSON module configuration binding
//! - Per-module run outcomes

mod result;
mod runner;
mod step;


pub use result::{ModuleOutcome, ModuleStatus, PipelineRunResult};
pub use runner::Pipeline;
