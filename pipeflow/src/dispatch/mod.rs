//! Fan-out dispatch of thread-aware modules.
//!
//! This module provides:
//! - The `Dispatcher`, which runs one thread-aware module against the store
//! - Dispatch phases and the report returned on success

mod dispatcher;
mod phase;
mod report;

pub use dispatcher::Dispatcher;
pub use phase::DispatchPhase;
pub use report::DispatchReport;
