//! Lifecycle event sinks.
//!
//! The pipeline and the dispatcher report every lifecycle transition to an
//! `EventSink` handed to them at construction. Events are observational
//! only; nothing in the core reacts to them.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the core.
pub mod event_types {
    /// A module's `set_up` is about to run.
    pub const MODULE_SETUP_STARTED: &str = "module.setup.started";
    /// A module's `set_up` returned successfully.
    pub const MODULE_SETUP_COMPLETED: &str = "module.setup.completed";
    /// A module's `set_up` failed.
    pub const MODULE_SETUP_FAILED: &str = "module.setup.failed";
    /// An ordinary module's `process` is about to run.
    pub const MODULE_PROCESS_STARTED: &str = "module.process.started";
    /// An ordinary module's `process` returned successfully.
    pub const MODULE_PROCESS_COMPLETED: &str = "module.process.completed";
    /// An ordinary module's `process` failed.
    pub const MODULE_PROCESS_FAILED: &str = "module.process.failed";
    /// A dispatch began.
    pub const DISPATCH_STARTED: &str = "dispatch.started";
    /// `pre_process` completed and the work list was taken.
    pub const DISPATCH_PREPROCESSED: &str = "dispatch.preprocessed";
    /// One work item finished successfully.
    pub const DISPATCH_ITEM_COMPLETED: &str = "dispatch.item.completed";
    /// One work item failed or panicked.
    pub const DISPATCH_ITEM_FAILED: &str = "dispatch.item.failed";
    /// All workers finished and the retention policy was applied.
    pub const DISPATCH_MERGED: &str = "dispatch.merged";
    /// `post_process` completed.
    pub const DISPATCH_POSTPROCESSED: &str = "dispatch.postprocessed";
    /// The dispatch finished without failures.
    pub const DISPATCH_COMPLETED: &str = "dispatch.completed";
    /// The dispatch finished with a failure.
    pub const DISPATCH_FAILED: &str = "dispatch.failed";
}
