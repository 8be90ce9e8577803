//! Collects tracing events in tests

use std::{
    fmt::{self, Write},
    sync::{Arc, Mutex},
};

use tracing::{field::Field, Level, Subscriber};
use tracing_subscriber::{layer::Context, prelude::*, Layer};

/// Layer recording the level and fields of every event
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<(Level, String)>>>);

impl LogCapture {
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(self.clone())
    }

    /// Captured events at the given level
    pub fn lines(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(event_level, _)| *event_level == level)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

struct FieldWriter<'a>(&'a mut String);

impl tracing::field::Visit for FieldWriter<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let _ = write!(self.0, "{}={:?} ", field.name(), value);
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut line = String::new();
        event.record(&mut FieldWriter(&mut line));
        self.0.lock().unwrap().push((*event.metadata().level(), line));
    }
}

/// Run the closure, capturing the events it logs on this thread
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, LogCapture) {
    let capture = LogCapture::default();
    let result = tracing::subscriber::with_default(capture.subscriber(), f);
    (result, capture)
}
