//! Observability for the storage services
//!
//! - Structured JSON logging on stderr
//! - Per mirror service counters
//! - Scoped begin/complete logging for fan-out operations
//!
//! Observability never changes the outcome of the operation it observes:
//! logging swallows its own I/O errors and counters cannot fail.

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity, LOG_LEVEL_ENV};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Log an event at its usual severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
