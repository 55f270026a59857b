//! Summary of a completed dispatch.

use super::DispatchPhase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a dispatch that finished without failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Unique id of this dispatch.
    pub dispatch_id: Uuid,
    /// The module that was dispatched.
    pub module: String,
    /// The container type that drove fan-out.
    pub container_type: String,
    /// Effective worker pool size.
    pub pool_size: usize,
    /// Size of the work list snapshot.
    pub total_items: usize,
    /// Items whose `process` call succeeded.
    pub succeeded: usize,
    /// Input containers removed by the retention policy.
    pub removed: usize,
    /// Final phase reached.
    pub phase: DispatchPhase,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl DispatchReport {
    /// Converts to a JSON value for event payloads.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "dispatch_id": self.dispatch_id.to_string(),
            "module": self.module,
            "container_type": self.container_type,
            "pool_size": self.pool_size,
            "total_items": self.total_items,
            "succeeded": self.succeeded,
            "removed": self.removed,
            "phase": self.phase.to_string(),
            "duration_ms": self.duration_ms,
        })
    }
}
