//! Tracing subscriber setup.

use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging configuration for processes embedding the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Builds the filter: `RUST_LOG` wins, then the configured level.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Installs the global tracing subscriber.
///
/// Returns false if a global subscriber was already installed, in which
/// case the existing one is left untouched.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let json = config.json;
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .try_init()
        .is_ok()
}
