//! Log Capture Utilities for Testing
//!
//! Collects tracing events (message plus structured fields) so tests can
//! assert on warnings emitted for isolated failures.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Captured event
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// Capturing layer
#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    /// Records at `level` whose message contains `pattern`
    pub fn matching_at(&self, level: Level, pattern: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level && r.message.contains(pattern))
            .collect()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.records().iter().any(|r| r.message.contains(pattern))
    }

    /// Assert at least one warning contains `pattern` and carries `field = value`
    pub fn assert_warning_with_field(&self, pattern: &str, field: &str, value: &str) {
        let hits = self.matching_at(Level::WARN, pattern);
        assert!(
            hits.iter()
                .any(|r| r.fields.get(field).map(String::as_str) == Some(value)),
            "Expected WARN matching '{}' with {}={}, found:\n{:#?}",
            pattern,
            field,
            value,
            hits
        );
    }
}

struct EventVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = rendered.trim_matches('"').to_string();
        } else {
            self.fields.insert(field.name().to_string(), rendered);
        }
    }
}

impl<S> tracing_subscriber::Layer<S> for LogCapture
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = EventVisitor {
            message: String::new(),
            fields: BTreeMap::new(),
        };
        event.record(&mut visitor);

        self.records.lock().unwrap().push(LogRecord {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Capture events for the current thread until the guard is dropped
///
/// Scoped to the calling thread so parallel tests do not see each other's
/// events; work fanned out to other threads (rayon) is not captured.
pub fn init_test_logging() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::new();
    let guard = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("polesight_fusion=debug"))
        .with(capture.clone())
        .set_default();
    (capture, guard)
}
