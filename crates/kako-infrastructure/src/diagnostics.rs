//! Tracing layer that surfaces client diagnostics to the UI.
//!
//! Warnings such as "channel not open" or "malformed frame" are logged by
//! the core with a `[Component]` prefix. This layer captures those events
//! and forwards them to a channel so a front end can show them inline.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// A captured log event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostic {
    /// Event target (e.g., "kako_infrastructure::connection")
    pub target: String,
    pub level: String,
    /// Component from the `[Component]` message prefix, if any.
    pub component: Option<String>,
    /// Message with the component prefix stripped.
    pub message: String,
    pub fields: HashMap<String, Value>,
    pub timestamp: String,
}

/// Forwards `kako*` events at or above `min_level` to a channel.
pub struct DiagnosticsLayer {
    sender: mpsc::UnboundedSender<Diagnostic>,
    min_level: Level,
}

impl DiagnosticsLayer {
    /// Forwards WARN and ERROR events.
    pub fn new(sender: mpsc::UnboundedSender<Diagnostic>) -> Self {
        Self::with_level(sender, Level::WARN)
    }

    pub fn with_level(sender: mpsc::UnboundedSender<Diagnostic>, min_level: Level) -> Self {
        Self { sender, min_level }
    }
}

impl<S> Layer<S> for DiagnosticsLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Level ordering: ERROR < WARN < INFO.
        if *metadata.level() > self.min_level || !metadata.target().starts_with("kako") {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));

        let raw = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let (component, message) = split_component(&raw);

        let diagnostic = Diagnostic {
            target: metadata.target().to_string(),
            level: metadata.level().to_string(),
            component,
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Receiver gone means nobody is listening.
        let _ = self.sender.send(diagnostic);
    }
}

/// Splits `"[Component] text"` into its parts.
fn split_component(raw: &str) -> (Option<String>, String) {
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some((component, message)) = rest.split_once(']') {
            return (Some(component.to_string()), message.trim_start().to_string());
        }
    }
    (None, raw.to_string())
}

/// Field visitor that extracts tracing event fields into a HashMap
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn splits_component_prefix() {
        assert_eq!(
            split_component("[ChannelConnection] chat channel lost"),
            (Some("ChannelConnection".to_string()), "chat channel lost".to_string())
        );
        assert_eq!(split_component("plain"), (None, "plain".to_string()));
    }

    #[test]
    fn forwards_warnings_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(DiagnosticsLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("[SessionStore] routine");
            tracing::warn!(attempt = 2u64, "[ChannelConnection] tasks channel lost");
        });

        let diagnostic = rx.try_recv().unwrap();
        assert_eq!(diagnostic.level, "WARN");
        assert_eq!(diagnostic.component.as_deref(), Some("ChannelConnection"));
        assert_eq!(diagnostic.message, "tasks channel lost");
        assert_eq!(diagnostic.fields["attempt"], serde_json::json!(2));
        assert!(rx.try_recv().is_err());
    }
}
