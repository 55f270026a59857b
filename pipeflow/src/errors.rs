//! Error types for the pipeflow execution core.
//!
//! Failures are split the way the dispatcher handles them: module-level
//! failures raised by a lifecycle hook, per-item failures collected during
//! fan-out, and the aggregated dispatch error the pipeline driver sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for pipeflow operations.
#[derive(Debug, Clone, Error)]
pub enum PipeflowError {
    /// Module arguments could not be turned into the module's config type.
    #[error("Invalid configuration for module '{module}': {message}")]
    Config {
        /// The module name.
        module: String,
        /// What went wrong.
        message: String,
    },

    /// A module failed during `set_up`.
    #[error("Module '{module}' failed to set up: {source}")]
    SetUp {
        /// The module name.
        module: String,
        /// The module's error.
        source: ModuleError,
    },

    /// An ordinary module failed during `process`.
    #[error("Module '{module}' failed to process: {source}")]
    Process {
        /// The module name.
        module: String,
        /// The module's error.
        source: ModuleError,
    },

    /// A thread-aware module's dispatch failed.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),
}

impl PipeflowError {
    /// Returns true if this failure should stop the rest of the pipeline.
    ///
    /// Set-up failures are always fatal. Processing failures are fatal only
    /// when the module marked them critical.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        match self {
            Self::Config { .. } | Self::SetUp { .. } => true,
            Self::Process { source, .. } => source.critical,
            Self::Dispatch(err) => err.is_critical(),
        }
    }
}

/// Error returned by a module's lifecycle hooks.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ModuleError {
    /// Human-readable description.
    pub message: String,
    /// Whether the pipeline should stop because of this error.
    pub critical: bool,
}

impl ModuleError {
    /// Creates a new, non-critical module error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            critical: false,
        }
    }

    /// Creates a critical module error.
    #[must_use]
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            critical: true,
        }
    }

    /// Marks the error as critical.
    #[must_use]
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Record of a single work item that failed during fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Position of the item in the dispatch work list.
    pub index: usize,
    /// Debug rendering of the container when the failure was recorded.
    pub container: String,
    /// The error reported for this item.
    pub error: ModuleError,
    /// Whether the worker panicked instead of returning an error.
    pub panicked: bool,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

impl ItemFailure {
    /// Creates a new item failure record.
    #[must_use]
    pub fn new(index: usize, container: impl Into<String>, error: ModuleError) -> Self {
        Self {
            index,
            container: container.into(),
            error,
            panicked: false,
            timestamp: Utc::now(),
        }
    }

    /// Marks the failure as coming from a panicking worker.
    #[must_use]
    pub fn with_panic(mut self) -> Self {
        self.panicked = true;
        self
    }

    /// Converts to a JSON object suitable for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("index".to_string(), serde_json::json!(self.index));
        map.insert("container".to_string(), serde_json::json!(self.container));
        map.insert("error".to_string(), serde_json::json!(self.error.message));
        map.insert("critical".to_string(), serde_json::json!(self.error.critical));
        map.insert("panicked".to_string(), serde_json::json!(self.panicked));
        map.insert(
            "timestamp".to_string(),
            serde_json::json!(self.timestamp.to_rfc3339()),
        );
        map
    }
}

/// Error reported for a whole dispatch of a thread-aware module.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// `pre_process` failed; no worker was started.
    #[error("Module '{module}' failed in pre-process: {source}")]
    PreProcess {
        /// The module name.
        module: String,
        /// The module's error.
        source: ModuleError,
    },

    /// One or more work items failed. Post-processing has already run.
    #[error("Module '{module}': {} of {total} items failed", failures.len())]
    ItemsFailed {
        /// The module name.
        module: String,
        /// Size of the work list.
        total: usize,
        /// The per-item failures, ordered by work list index.
        failures: Vec<ItemFailure>,
    },

    /// `post_process` failed after every worker finished.
    #[error("Module '{module}' failed in post-process: {source}")]
    PostProcess {
        /// The module name.
        module: String,
        /// The module's error.
        source: ModuleError,
        /// Item failures collected before post-processing, if any.
        failures: Vec<ItemFailure>,
    },
}

impl DispatchError {
    /// Returns the name of the module whose dispatch failed.
    #[must_use]
    pub fn module(&self) -> &str {
        match self {
            Self::PreProcess { module, .. }
            | Self::ItemsFailed { module, .. }
            | Self::PostProcess { module, .. } => module,
        }
    }

    /// Returns the per-item failures carried by this error.
    #[must_use]
    pub fn item_failures(&self) -> &[ItemFailure] {
        match self {
            Self::PreProcess { .. } => &[],
            Self::ItemsFailed { failures, .. } | Self::PostProcess { failures, .. } => failures,
        }
    }

    /// Returns true if the failure should stop the rest of the pipeline.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        match self {
            Self::PreProcess { .. } | Self::PostProcess { .. } => true,
            Self::ItemsFailed { failures, .. } => failures
                .iter()
                .any(|f| f.error.critical || f.panicked),
        }
    }
}
