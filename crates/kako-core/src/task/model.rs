//! Task domain model.
//!
//! Task records arrive from two sources (REST bootstrap and the task push
//! channel) that disagree on the JSON type of `id`. Everything is keyed by
//! [`TaskId`], which normalizes both shapes to one comparable string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Normalized task identifier.
///
/// `7`, `7.0`, `"7"` and `" 7 "` all normalize to the key `"7"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalizes a JSON id value. Returns `None` for null, bool, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::new(s)),
            serde_json::Value::Number(n) => Some(Self::from_number(n)),
            _ => None,
        }
    }

    fn from_number(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            return Self(i.to_string());
        }
        if let Some(u) = n.as_u64() {
            return Self(u.to_string());
        }
        match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Self((f as i64).to_string())
            }
            _ => Self(n.to_string()),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for TaskId {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<i64> for TaskId {
    fn from(raw: i64) -> Self {
        Self(raw.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid task id: {}", value)))
    }
}

/// Status of a task on the board.
///
/// The five board columns are known variants. Anything else the backend
/// reports (e.g. `failed`) is preserved verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[default]
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
    Other(String),
}

impl TaskStatus {
    /// Board columns in display order.
    pub const BOARD: [TaskStatus; 5] = [
        TaskStatus::Backlog,
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Other(raw) => raw,
        }
    }

    /// `done`, `failed` and `completed` (any case) end a task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.as_str().to_ascii_lowercase().as_str(),
            "done" | "failed" | "completed"
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TaskStatus {
    /// Case-insensitive; surrounding whitespace is ignored.
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "backlog" => TaskStatus::Backlog,
            "todo" => TaskStatus::Todo,
            "in_progress" => TaskStatus::InProgress,
            "review" => TaskStatus::Review,
            "done" => TaskStatus::Done,
            _ => TaskStatus::Other(raw.to_string()),
        }
    }
}

impl Serialize for TaskStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(TaskStatus::from(raw.as_str()))
    }
}

/// Canonical task record held by the session store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub archived: bool,
}

/// Partial task fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

impl TaskPatch {
    pub fn status(status: impl Into<TaskStatus>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }
}

/// A task as delivered over the wire: an id plus whichever fields were sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub id: TaskId,
    #[serde(flatten)]
    pub patch: TaskPatch,
}

impl TaskUpdate {
    pub fn new(id: impl Into<TaskId>, patch: TaskPatch) -> Self {
        Self {
            id: id.into(),
            patch,
        }
    }
}

/// A status transition produced by applying a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

impl StatusChange {
    /// True when the task moved into `done`, `failed` or `completed`.
    pub fn entered_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}

impl TaskRecord {
    /// Builds a record from a first sighting, defaulting absent fields.
    pub fn from_update(update: TaskUpdate) -> Self {
        let TaskUpdate { id, patch } = update;
        Self {
            id,
            title: patch.title.unwrap_or_default(),
            description: patch.description,
            status: patch.status.unwrap_or_default(),
            result: patch.result,
            created_at: patch.created_at.unwrap_or_else(Utc::now),
            archived: patch.archived.unwrap_or(false),
        }
    }

    /// Applies the fields present in `patch`, last write wins per field.
    ///
    /// Returns the status transition when the status actually changed.
    pub fn apply(&mut self, patch: TaskPatch) -> Option<StatusChange> {
        let previous = self.status.clone();

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
        if let Some(created_at) = patch.created_at {
            self.created_at = created_at;
        }
        if let Some(archived) = patch.archived {
            self.archived = archived;
        }

        (self.status != previous).then(|| StatusChange {
            from: previous,
            to: self.status.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_string_ids_normalize_to_same_key() {
        let a: TaskId = serde_json::from_value(json!("7")).unwrap();
        let b: TaskId = serde_json::from_value(json!(7)).unwrap();
        let c: TaskId = serde_json::from_value(json!(7.0)).unwrap();
        let d = TaskId::from(" 7 ");

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
        assert_eq!(a.as_str(), "7");
    }

    #[test]
    fn rejects_non_scalar_ids() {
        assert!(serde_json::from_value::<TaskId>(json!(null)).is_err());
        assert!(serde_json::from_value::<TaskId>(json!({"id": 1})).is_err());
    }

    #[test]
    fn status_parses_case_insensitively_and_keeps_unknowns() {
        assert_eq!(TaskStatus::from("IN_PROGRESS"), TaskStatus::InProgress);
        assert_eq!(TaskStatus::from("done"), TaskStatus::Done);
        assert_eq!(
            TaskStatus::from("failed"),
            TaskStatus::Other("failed".to_string())
        );
        assert_eq!(TaskStatus::from("failed").to_string(), "failed");
        assert_eq!(TaskStatus::from("  Review "), TaskStatus::Review);
        assert_eq!(TaskStatus::from(" stalled "), TaskStatus::Other("stalled".to_string()));
        assert_eq!(TaskStatus::default(), TaskStatus::Backlog);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::from("Failed").is_terminal());
        assert!(TaskStatus::from("COMPLETED").is_terminal());
        assert!(!TaskStatus::Review.is_terminal());
    }

    #[test]
    fn apply_merges_present_fields_only() {
        let mut record = TaskRecord::from_update(TaskUpdate::new(
            "1",
            TaskPatch {
                title: Some("Write docs".into()),
                description: Some("all of them".into()),
                ..TaskPatch::default()
            },
        ));

        let change = record.apply(TaskPatch::status("review"));

        assert_eq!(record.title, "Write docs");
        assert_eq!(record.description.as_deref(), Some("all of them"));
        assert_eq!(
            change,
            Some(StatusChange {
                from: TaskStatus::Backlog,
                to: TaskStatus::Review
            })
        );
        assert_eq!(record.apply(TaskPatch::status("review")), None);
    }

    #[test]
    fn wire_task_deserializes_with_numeric_id() {
        let update: TaskUpdate = serde_json::from_value(json!({
            "id": 42,
            "title": "Deploy",
            "status": "todo",
            "created_at": "2026-01-02T03:04:05Z",
            "archived": false
        }))
        .unwrap();

        assert_eq!(update.id, TaskId::from("42"));
        assert_eq!(update.patch.status, Some(TaskStatus::Todo));
        assert!(update.patch.created_at.is_some());
    }
}
