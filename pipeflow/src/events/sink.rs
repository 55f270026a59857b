//! Event sink trait and implementations.

use async_trait::async_trait;
use tracing::{debug, info, Level};

/// Trait for sinks receiving module and dispatch lifecycle events.
///
/// The pipeline and the dispatcher emit through `try_emit` only, inline on
/// the emitting task. `emit` is for callers that run in async code and can
/// wait on the sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The type of event (e.g., "dispatch.started")
    /// * `data` - Optional event data
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Emits an event without blocking.
    ///
    /// Must never panic; sink failures are logged and suppressed.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// A sink that forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_event(&self, event_type: &str, data: Option<&serde_json::Value>) {
        if self.level == Level::INFO {
            info!(event_type = %event_type, event_data = ?data, "Event: {}", event_type);
        } else {
            debug!(event_type = %event_type, event_data = ?data, "Event: {}", event_type);
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// A sink that records events in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<serde_json::Value>)> {
        self.events.read().clone()
    }

    /// Returns only the event type names, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<serde_json::Value>)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns the position of the first event of the given type.
    #[must_use]
    pub fn position_of(&self, event_type: &str) -> Option<usize> {
        self.events.read().iter().position(|(t, _)| t == event_type)
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}
