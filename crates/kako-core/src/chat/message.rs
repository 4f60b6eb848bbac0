//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Identifier of a chat message in the session store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// A fresh client-side id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // History rows carry numeric ids.
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "invalid message id: {}",
                other
            ))),
        }
    }
}

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    #[default]
    Assistant,
    /// System-generated message.
    System,
}

/// Lifecycle of a tool invocation inside an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Started,
    Updated,
    Finished,
}

impl From<&str> for ToolCallStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "started" | "start" | "running" => ToolCallStatus::Started,
            "finished" | "completed" | "done" | "error" | "failed" => ToolCallStatus::Finished,
            _ => ToolCallStatus::Updated,
        }
    }
}

impl<'de> Deserialize<'de> for ToolCallStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ToolCallStatus::from(raw.as_str()))
    }
}

/// A tool-call progress event as pushed by the backend.
///
/// Everything except `name` and `status` (typically `args` and `result`)
/// lands in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub name: String,
    pub status: ToolCallStatus,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ToolCallEvent {
    pub fn new(name: impl Into<String>, status: ToolCallStatus) -> Self {
        Self {
            name: name.into(),
            status,
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// A tool call attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub status: ToolCallStatus,
    pub payload: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallRecord {
    pub fn from_event(event: ToolCallEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: event.name,
            status: event.status,
            payload: event.payload,
            timestamp: Utc::now(),
        }
    }

    /// A `Started` record is the mutable target for later progress events.
    pub fn is_open(&self) -> bool {
        self.status == ToolCallStatus::Started
    }

    /// Merges a progress event into this record. `id` and `timestamp` are kept.
    pub fn merge(&mut self, event: ToolCallEvent) {
        self.status = event.status;
        for (key, value) in event.payload {
            self.payload.insert(key, value);
        }
    }
}

/// A chat message, possibly still being streamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub id: MessageId,
    #[serde(default)]
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default, skip_deserializing)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl StreamMessage {
    /// A complete, non-streamed message.
    pub fn complete(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            streaming: false,
            tool_calls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// An empty assistant message that tokens will be appended to.
    pub fn streaming() -> Self {
        Self {
            streaming: true,
            ..Self::complete(MessageRole::Assistant, String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_status_aliases() {
        assert_eq!(ToolCallStatus::from("Started"), ToolCallStatus::Started);
        assert_eq!(ToolCallStatus::from("completed"), ToolCallStatus::Finished);
        assert_eq!(ToolCallStatus::from("ERROR"), ToolCallStatus::Finished);
        assert_eq!(ToolCallStatus::from("progress"), ToolCallStatus::Updated);
    }

    #[test]
    fn merge_keeps_identity_and_overlays_payload() {
        let mut record = ToolCallRecord::from_event(
            ToolCallEvent::new("search", ToolCallStatus::Started)
                .with("args", json!({"q": "rust"})),
        );
        let id = record.id.clone();

        record.merge(
            ToolCallEvent::new("search", ToolCallStatus::Finished).with("result", json!("3 hits")),
        );

        assert_eq!(record.id, id);
        assert_eq!(record.status, ToolCallStatus::Finished);
        assert_eq!(record.payload["args"], json!({"q": "rust"}));
        assert_eq!(record.payload["result"], json!("3 hits"));
    }

    #[test]
    fn history_rows_deserialize() {
        let message: StreamMessage = serde_json::from_value(json!({
            "id": 12,
            "session_id": "web:chat",
            "role": "user",
            "content": "hi",
            "created_at": "2026-05-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(message.id.as_str(), "12");
        assert_eq!(message.role, MessageRole::User);
        assert!(!message.streaming);
    }
}
