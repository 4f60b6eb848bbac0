//! REST collaborator trait.
//!
//! The sync engine only uses the backend's request/response API to bootstrap
//! and catch up; everything live arrives over the push channels.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::chat::StreamMessage;
use crate::error::Result;
use crate::task::TaskUpdate;

pub const TASKS_PATH: &str = "/api/v1/tasks";
pub const MODELS_PATH: &str = "/api/v1/models";
pub const TOOLS_PATH: &str = "/api/v1/tools";
pub const CHAT_SESSIONS_PATH: &str = "/api/v1/chat/sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An abstract request/response client for the dashboard backend.
///
/// # Implementation Notes
///
/// Implementations should handle:
/// - Attaching the current auth token
/// - Mapping non-success statuses to [`KakoError::Http`](crate::error::KakoError::Http)
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Sends one request and returns the decoded JSON body.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `path` - Path relative to the server origin, e.g. `/api/v1/tasks`
    /// * `body` - Optional JSON body
    async fn send_request(&self, method: HttpMethod, path: &str, body: Option<Value>)
    -> Result<Value>;
}

/// Path of one chat session's history.
pub fn chat_session_path(session_id: &str) -> String {
    format!(
        "{}/{}",
        CHAT_SESSIONS_PATH,
        url::form_urlencoded::byte_serialize(session_id.as_bytes()).collect::<String>()
    )
}

/// Reads `{"tasks": [...]}` or a bare array. Entries without a usable id are skipped.
pub fn parse_task_list(body: &Value) -> Vec<TaskUpdate> {
    parse_list(body, "tasks")
}

/// Reads `{"messages": [...]}` from a chat session history response.
pub fn parse_history(body: &Value) -> Vec<StreamMessage> {
    parse_list(body, "messages")
}

/// Reads `{"tools": ["name", ...]}`.
pub fn parse_tool_list(body: &Value) -> Vec<String> {
    body.get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(Value::as_str)
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_list<T: serde::de::DeserializeOwned>(body: &Value, key: &str) -> Vec<T> {
    let Some(items) = body.get(key).and_then(Value::as_array).or(body.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("[BackendApi] Skipping malformed {} entry: {}", key, e);
                None
            }
        })
        .collect()
}
