//! Module contracts.
//!
//! This module provides:
//! - `BaseModule`, the capabilities every module shares
//! - `Module`, the single-invocation lifecycle
//! - `ThreadAwareModule`, the fan-out lifecycle run by the dispatcher
//! - `ModuleContext` and `ModuleLogger`, handed to modules at construction

mod base;
mod logger;
mod thread_aware;

pub use base::{BaseModule, Module, ModuleContext};
pub use logger::ModuleLogger;
pub use thread_aware::ThreadAwareModule;
