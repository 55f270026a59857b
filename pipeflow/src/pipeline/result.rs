//! Outcome of a pipeline run.

use crate::dispatch::DispatchReport;
use crate::errors::PipeflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How one module fared during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// The module completed.
    Ok,
    /// The module failed.
    Fail,
    /// The module never ran because the pipeline was aborted first.
    Skip,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "fail"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Per-module entry of a [`PipelineRunResult`].
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    /// Module name.
    pub module: String,
    /// Final status.
    pub status: ModuleStatus,
    /// The failure, when `status` is `Fail`.
    pub error: Option<PipeflowError>,
    /// Dispatch report for thread-aware modules that completed.
    pub dispatch: Option<DispatchReport>,
}

impl ModuleOutcome {
    pub(crate) fn ok(module: impl Into<String>, dispatch: Option<DispatchReport>) -> Self {
        Self {
            module: module.into(),
            status: ModuleStatus::Ok,
            error: None,
            dispatch,
        }
    }

    pub(crate) fn failed(module: impl Into<String>, error: PipeflowError) -> Self {
        Self {
            module: module.into(),
            status: ModuleStatus::Fail,
            error: Some(error),
            dispatch: None,
        }
    }

    pub(crate) fn skipped(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            status: ModuleStatus::Skip,
            error: None,
            dispatch: None,
        }
    }
}

/// Result of running a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    /// Pipeline name.
    pub pipeline: String,
    /// One outcome per module, in registration order.
    pub outcomes: Vec<ModuleOutcome>,
    /// True if every module completed.
    pub success: bool,
    /// The module whose critical failure stopped the run.
    pub aborted_at: Option<String>,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
}

impl PipelineRunResult {
    /// Returns the outcome for a module.
    #[must_use]
    pub fn outcome(&self, module: &str) -> Option<&ModuleOutcome> {
        self.outcomes.iter().find(|o| o.module == module)
    }

    /// Returns every failure, in registration order.
    #[must_use]
    pub fn errors(&self) -> Vec<&PipeflowError> {
        self.outcomes.iter().filter_map(|o| o.error.as_ref()).collect()
    }

    /// Returns the number of modules with the given status.
    #[must_use]
    pub fn count(&self, status: ModuleStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Converts to a JSON-friendly summary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("pipeline".to_string(), serde_json::json!(self.pipeline));
        map.insert("success".to_string(), serde_json::json!(self.success));
        map.insert("aborted_at".to_string(), serde_json::json!(self.aborted_at));
        map.insert("duration_ms".to_string(), serde_json::json!(self.duration_ms));
        map.insert(
            "modules".to_string(),
            serde_json::json!(self
                .outcomes
                .iter()
                .map(|o| {
                    serde_json::json!({
                        "module": o.module,
                        "status": o.status.to_string(),
                        "error": o.error.as_ref().map(ToString::to_string),
                    })
                })
                .collect::<Vec<_>>()),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ModuleError;

    fn sample() -> PipelineRunResult {
        PipelineRunResult {
            pipeline: "triage".to_string(),
            outcomes: vec![
                ModuleOutcome::ok("collect", None),
                ModuleOutcome::failed(
                    "process",
                    PipeflowError::Process {
                        module: "process".to_string(),
                        source: ModuleError::critical("disk full"),
                    },
                ),
                ModuleOutcome::skipped("export"),
            ],
            success: false,
            aborted_at: Some("process".to_string()),
            duration_ms: 1.5,
        }
    }

    #[test]
    fn test_counts_and_lookup() {
        let result = sample();
        assert_eq!(result.count(ModuleStatus::Ok), 1);
        assert_eq!(result.count(ModuleStatus::Fail), 1);
        assert_eq!(result.count(ModuleStatus::Skip), 1);
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.outcome("export").unwrap().status, ModuleStatus::Skip);
        assert!(result.outcome("missing").is_none());
    }

    #[test]
    fn test_to_dict() {
        let dict = sample().to_dict();
        assert_eq!(dict.get("success").unwrap(), false);
        assert_eq!(dict.get("aborted_at").unwrap(), "process");

        let modules = dict.get("modules").unwrap().as_array().unwrap();
        assert_eq!(modules.len(), 3);
        assert_eq!(modules[1]["status"], "fail");
        assert_eq!(
            modules[1]["error"],
            "Module 'process' failed to process: disk full"
        );
    }
}
