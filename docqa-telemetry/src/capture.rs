//! In-memory span capture.
//!
//! [`CaptureLayer`] records every span it sees, with its fields, once the
//! span closes. Tests install it with a thread-local subscriber and then
//! inspect the shared [`SpanCapture`].
//!
//! ```rust,ignore
//! let capture = SpanCapture::new();
//! let subscriber = tracing_subscriber::registry().with(CaptureLayer::new(capture.clone()));
//! let _guard = tracing::subscriber::set_default(subscriber);
//! // ... run instrumented code ...
//! assert!(capture.find("qa.ask").is_some());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Id, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// A closed span.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedSpan {
    pub name: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Nanoseconds since the Unix epoch.
    pub start_time: u128,
    pub end_time: u128,
    pub fields: HashMap<String, serde_json::Value>,
}

impl CapturedSpan {
    /// String value of a field, if it was recorded as a string or via `%`/`?`.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// Spans captured so far, shared between the layer and the test.
#[derive(Debug, Clone, Default)]
pub struct SpanCapture {
    spans: Arc<RwLock<Vec<CapturedSpan>>>,
}

impl SpanCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// All closed spans in closing order.
    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// The first closed span named `name`.
    pub fn find(&self, name: &str) -> Option<CapturedSpan> {
        self.spans.read().ok()?.iter().find(|s| s.name == name).cloned()
    }

    fn push(&self, span: CapturedSpan) {
        if let Ok(mut spans) = self.spans.write() {
            spans.push(span);
        }
    }
}

/// A tracing layer that copies closed spans into a [`SpanCapture`].
pub struct CaptureLayer {
    capture: SpanCapture,
}

impl CaptureLayer {
    pub fn new(capture: SpanCapture) -> Self {
        Self { capture }
    }
}

struct SpanFields(HashMap<String, serde_json::Value>);

struct StartTime(u128);

fn now_nanos() -> u128 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_nanos()
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        extensions.insert(StartTime(now_nanos()));
        extensions.insert(SpanFields(visitor.0));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let extensions = span.extensions();
        let metadata = span.metadata();

        self.capture.push(CapturedSpan {
            name: metadata.name().to_string(),
            target: metadata.target().to_string(),
            parent: span.parent().map(|p| p.name().to_string()),
            start_time: extensions.get::<StartTime>().map(|s| s.0).unwrap_or(0),
            end_time: now_nanos(),
            fields: extensions.get::<SpanFields>().map(|f| f.0.clone()).unwrap_or_default(),
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::json!(format!("{value:?}")));
    }
}
