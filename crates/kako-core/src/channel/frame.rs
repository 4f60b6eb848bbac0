//! Push-channel wire frames.
//!
//! Every frame is a JSON object tagged by `type`. Inbound frames decode into
//! the closed [`ServerFrame`] union; outbound frames are built from
//! [`ClientFrame`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{MessageRole, ToolCallEvent};
use crate::error::{KakoError, Result};
use crate::task::{TaskId, TaskUpdate};

/// A frame pushed by the backend on either channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A streamed assistant reply begins.
    StreamStart,
    /// One token of the streamed reply.
    #[serde(rename = "stream", alias = "stream_token")]
    StreamToken {
        #[serde(default)]
        content: String,
    },
    ToolCall(ToolCallEvent),
    /// The streamed reply is complete. `content`, when non-empty, is authoritative.
    StreamEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A complete, non-streamed message.
    Message {
        #[serde(default)]
        role: MessageRole,
        #[serde(default)]
        content: String,
    },
    /// The backend finished handling the last request.
    Ready,
    /// Raw model catalog; normalized before it reaches the store.
    Models(Value),
    Error {
        #[serde(default)]
        content: String,
    },
    TaskCreated {
        task: TaskUpdate,
    },
    TaskUpdated {
        task: TaskUpdate,
    },
    TaskDeleted {
        task_id: TaskId,
    },
    /// Any other `type`; ignored by consumers.
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerFrame::StreamStart => "stream_start",
            ServerFrame::StreamToken { .. } => "stream",
            ServerFrame::ToolCall(_) => "tool_call",
            ServerFrame::StreamEnd { .. } => "stream_end",
            ServerFrame::Message { .. } => "message",
            ServerFrame::Ready => "ready",
            ServerFrame::Models(_) => "models",
            ServerFrame::Error { .. } => "error",
            ServerFrame::TaskCreated { .. } => "task_created",
            ServerFrame::TaskUpdated { .. } => "task_updated",
            ServerFrame::TaskDeleted { .. } => "task_deleted",
            ServerFrame::Unknown => "unknown",
        }
    }
}

/// Decodes one text frame.
///
/// Replies to slash-style task commands arrive as a bare
/// `{"role": ..., "content": ...}` object without a `type`; those decode as
/// [`ServerFrame::Message`].
pub fn decode_frame(text: &str) -> Result<ServerFrame> {
    let value: Value = serde_json::from_str(text)?;

    let Some(object) = value.as_object() else {
        return Err(KakoError::Serialization {
            format: "JSON".to_string(),
            message: "frame is not a JSON object".to_string(),
        });
    };

    if !object.contains_key("type") {
        if let Some(content) = object.get("content").and_then(Value::as_str) {
            let role = object
                .get("role")
                .cloned()
                .and_then(|r| serde_json::from_value(r).ok())
                .unwrap_or_default();
            return Ok(ServerFrame::Message {
                role,
                content: content.to_string(),
            });
        }
    }

    Ok(serde_json::from_value(value)?)
}

/// A user chat message sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMessage {
    pub content: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_tools: Vec<String>,
}

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Message(UserMessage),
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
