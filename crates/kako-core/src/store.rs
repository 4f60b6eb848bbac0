//! Canonical in-memory session state.
//!
//! [`SessionStore`] exclusively owns the task and message collections. Every
//! mutation goes through the methods here (or through the
//! [`StreamAssembler`](crate::chat::StreamAssembler) for streamed replies),
//! and every task write is an idempotent upsert keyed by [`TaskId`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{ModelCatalog, ModelOption};
use crate::chat::{MessageId, StreamMessage};
use crate::task::{
    SortKey, StatusChange, StatusColumn, TaskFilter, TaskId, TaskNotifier, TaskPatch, TaskRecord,
    TaskUpdate, view,
};

/// Session state for one running client.
#[derive(Default)]
pub struct SessionStore {
    tasks: Vec<TaskRecord>,
    messages: Vec<StreamMessage>,
    catalog: ModelCatalog,
    selected_model: String,
    available_tools: Vec<String>,
    enabled_tools: Vec<String>,
    active_session_id: Option<String>,
    working: bool,
    filter: TaskFilter,
    sort: SortKey,
    notifier: Option<Arc<dyn TaskNotifier>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("tasks", &self.tasks.len())
            .field("messages", &self.messages.len())
            .field("selected_model", &self.selected_model)
            .field("working", &self.working)
            .field("has_notifier", &self.notifier.is_some())
            .finish()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(notifier: Arc<dyn TaskNotifier>) -> Self {
        Self {
            notifier: Some(notifier),
            ..Self::default()
        }
    }

    pub fn set_notifier(&mut self, notifier: Option<Arc<dyn TaskNotifier>>) {
        self.notifier = notifier;
    }

    // ============================================================================
    // Tasks
    // ============================================================================

    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Inserts a task or merges it into the record with the same id.
    ///
    /// Fields present in the update overwrite stored values; absent fields
    /// are kept.
    pub fn upsert_task(&mut self, update: TaskUpdate) {
        match self.tasks.iter().position(|t| t.id == update.id) {
            Some(index) => {
                let change = self.tasks[index].apply(update.patch);
                self.after_status_change(index, change);
            }
            None => {
                tracing::debug!("[SessionStore] New task {}", update.id);
                self.tasks.push(TaskRecord::from_update(update));
            }
        }
    }

    /// Replaces the whole task list.
    ///
    /// Duplicated ids collapse to one record holding the last occurrence,
    /// at the position where the id first appeared.
    pub fn set_tasks(&mut self, updates: impl IntoIterator<Item = TaskUpdate>) {
        let mut records: Vec<TaskRecord> = Vec::new();
        let mut index_of: HashMap<TaskId, usize> = HashMap::new();

        for update in updates {
            let record = TaskRecord::from_update(update);
            match index_of.get(&record.id) {
                Some(&index) => records[index] = record,
                None => {
                    index_of.insert(record.id.clone(), records.len());
                    records.push(record);
                }
            }
        }

        tracing::debug!("[SessionStore] Replaced task list ({} tasks)", records.len());
        self.tasks = records;
    }

    /// Applies a patch to an existing task.
    ///
    /// Returns false, without error, when the id is unknown.
    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> bool {
        let Some(index) = self.tasks.iter().position(|t| &t.id == id) else {
            tracing::debug!("[SessionStore] Ignoring update for unknown task {}", id);
            return false;
        };
        let change = self.tasks[index].apply(patch);
        self.after_status_change(index, change);
        true
    }

    /// Removes a task. Unknown ids are a no-op.
    pub fn remove_task(&mut self, id: &TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| &t.id != id);
        before != self.tasks.len()
    }

    fn after_status_change(&self, index: usize, change: Option<StatusChange>) {
        let Some(change) = change else {
            return;
        };
        let task = &self.tasks[index];
        tracing::debug!(
            "[SessionStore] Task {} status {} -> {}",
            task.id,
            change.from,
            change.to
        );

        if !change.entered_terminal() {
            return;
        }
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify_terminal(task) {
                tracing::warn!("[SessionStore] Task notification failed: {}", e);
            }
        }
    }

    pub fn filter(&self) -> &TaskFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }

    pub fn set_sort(&mut self, sort: SortKey) {
        self.sort = sort;
    }

    /// Tasks matching the active filter, in store order.
    pub fn filtered_tasks(&self) -> Vec<&TaskRecord> {
        self.tasks.iter().filter(|t| self.filter.matches(t)).collect()
    }

    /// Filtered tasks grouped into board columns and sorted by the active key.
    pub fn tasks_by_status(&self) -> Vec<StatusColumn<'_>> {
        view::group_by_status(self.filtered_tasks(), self.sort)
    }

    // ============================================================================
    // Messages
    // ============================================================================

    pub fn messages(&self) -> &[StreamMessage] {
        &self.messages
    }

    pub fn message(&self, id: &MessageId) -> Option<&StreamMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Appends a complete message.
    pub fn add_message(&mut self, mut message: StreamMessage) {
        message.streaming = false;
        self.messages.push(message);
    }

    /// Replaces the conversation, e.g. with fetched history.
    pub fn set_messages(&mut self, messages: Vec<StreamMessage>) {
        self.messages = messages;
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    pub(crate) fn push_message(&mut self, message: StreamMessage) {
        self.messages.push(message);
    }

    pub(crate) fn message_mut(&mut self, id: &MessageId) -> Option<&mut StreamMessage> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    pub fn set_active_session_id(&mut self, session_id: impl Into<String>) {
        self.active_session_id = Some(session_id.into());
    }

    /// True while the backend is handling a request.
    pub fn is_working(&self) -> bool {
        self.working
    }

    pub fn set_working(&mut self, working: bool) {
        self.working = working;
    }

    // ============================================================================
    // Models
    // ============================================================================

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Installs a normalized catalog and reconciles the selected model.
    ///
    /// With no selection the server default is adopted. A selection that is
    /// no longer offered falls back to the default, or to empty.
    pub fn set_catalog(&mut self, catalog: ModelCatalog) {
        self.catalog = catalog;

        if self.selected_model.is_empty() {
            self.selected_model = self.catalog.current_model.clone();
        }
        if !self.selected_model.is_empty() && !self.catalog.contains(&self.selected_model) {
            tracing::debug!(
                "[SessionStore] Selected model '{}' no longer offered",
                self.selected_model
            );
            self.selected_model = self.catalog.current_model.clone();
        }
    }

    /// Selected model override; empty means the server default.
    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    /// Selects a model from the catalog. Empty clears the override.
    pub fn select_model(&mut self, model_id: &str) -> bool {
        if !model_id.is_empty() && !self.catalog.contains(model_id) {
            return false;
        }
        self.selected_model = model_id.to_string();
        true
    }

    pub fn model_options(&self) -> Vec<ModelOption> {
        self.catalog.options()
    }

    // ============================================================================
    // Tools
    // ============================================================================

    pub fn available_tools(&self) -> &[String] {
        &self.available_tools
    }

    pub fn enabled_tools(&self) -> &[String] {
        &self.enabled_tools
    }

    /// Installs the backend's tool list. The first time, every tool is enabled.
    pub fn set_available_tools(&mut self, tools: Vec<String>) {
        if self.enabled_tools.is_empty() {
            self.enabled_tools = tools.clone();
        }
        self.available_tools = tools;
    }

    /// Flips a tool on or off and returns its new state.
    pub fn toggle_tool(&mut self, name: &str) -> bool {
        if let Some(index) = self.enabled_tools.iter().position(|t| t == name) {
            self.enabled_tools.remove(index);
            false
        } else {
            self.enabled_tools.push(name.to_string());
            true
        }
    }

    /// Available tools the user has switched off.
    pub fn excluded_tools(&self) -> Vec<String> {
        self.available_tools
            .iter()
            .filter(|t| !self.enabled_tools.contains(t))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::task::TaskStatus;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl TaskNotifier for RecordingNotifier {
        fn notify_terminal(&self, task: &TaskRecord) -> Result<(), String> {
            self.seen.lock().unwrap().push(task.id.to_string());
            if self.fail {
                Err("notifications unavailable".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn titled(id: impl Into<TaskId>, title: &str) -> TaskUpdate {
        TaskUpdate::new(
            id,
            TaskPatch {
                title: Some(title.to_string()),
                ..TaskPatch::default()
            },
        )
    }

    #[test]
    fn string_and_numeric_ids_upsert_one_record() {
        let mut store = SessionStore::new();
        store.upsert_task(titled("7", "first"));

        let numeric: TaskUpdate =
            serde_json::from_value(json!({"id": 7, "title": "second"})).unwrap();
        store.upsert_task(numeric);

        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].title, "second");
    }

    #[test]
    fn upsert_merges_per_field() {
        let mut store = SessionStore::new();
        store.upsert_task(TaskUpdate::new(
            "1",
            TaskPatch {
                title: Some("Ship".into()),
                description: Some("v1".into()),
                ..TaskPatch::default()
            },
        ));
        store.upsert_task(TaskUpdate::new("1", TaskPatch::status("in_progress")));

        let task = store.task(&TaskId::from("1")).unwrap();
        assert_eq!(task.title, "Ship");
        assert_eq!(task.description.as_deref(), Some("v1"));
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn set_tasks_keeps_last_occurrence() {
        let mut store = SessionStore::new();
        store.set_tasks(vec![
            titled("1", "old"),
            titled("2", "two"),
            titled(1i64, "new"),
        ]);

        let titles: Vec<&str> = store.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "two"]);
    }

    #[test]
    fn update_unknown_task_is_noop() {
        let mut store = SessionStore::new();
        store.upsert_task(titled("1", "one"));

        assert!(!store.update_task(&TaskId::from("99"), TaskPatch::status("done")));
        assert_eq!(store.tasks().len(), 1);
        assert!(!store.remove_task(&TaskId::from("99")));
    }

    #[test]
    fn terminal_transition_notifies_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut store = SessionStore::with_notifier(notifier.clone());
        store.upsert_task(titled("1", "one"));

        store.update_task(&TaskId::from("1"), TaskPatch::status("review"));
        store.update_task(&TaskId::from("1"), TaskPatch::status("DONE"));
        store.update_task(&TaskId::from("1"), TaskPatch::status("done"));

        assert_eq!(*notifier.seen.lock().unwrap(), vec!["1".to_string()]);
    }

    #[test]
    fn moving_between_terminal_statuses_notifies_again() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut store = SessionStore::with_notifier(notifier.clone());
        store.upsert_task(titled("1", "one"));

        store.update_task(&TaskId::from("1"), TaskPatch::status("done"));
        store.update_task(&TaskId::from("1"), TaskPatch::status("failed"));

        assert_eq!(notifier.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn failing_notifier_does_not_block_mutation() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let mut store = SessionStore::with_notifier(notifier.clone());
        store.upsert_task(titled("1", "one"));

        assert!(store.update_task(&TaskId::from("1"), TaskPatch::status("failed")));
        assert_eq!(
            store.tasks()[0].status,
            TaskStatus::Other("failed".to_string())
        );
        assert_eq!(notifier.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn board_view_uses_filter_and_sort() {
        let mut store = SessionStore::new();
        store.set_tasks(vec![
            TaskUpdate::new(
                "1",
                TaskPatch {
                    title: Some("beta report".into()),
                    status: Some(TaskStatus::Todo),
                    ..TaskPatch::default()
                },
            ),
            TaskUpdate::new(
                "2",
                TaskPatch {
                    title: Some("alpha report".into()),
                    status: Some(TaskStatus::Todo),
                    ..TaskPatch::default()
                },
            ),
            TaskUpdate::new(
                "3",
                TaskPatch {
                    title: Some("unrelated".into()),
                    status: Some(TaskStatus::Todo),
                    ..TaskPatch::default()
                },
            ),
        ]);
        store.set_filter(TaskFilter {
            search: "REPORT".into(),
            ..TaskFilter::default()
        });
        store.set_sort(SortKey::TitleAsc);

        let columns = store.tasks_by_status();
        let todo: Vec<&str> = columns[1].tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(todo, vec!["2", "1"]);
    }

    #[test]
    fn catalog_reconciles_selected_model() {
        let mut store = SessionStore::new();
        store.set_catalog(catalog::normalize(&json!({
            "current_model": "gpt-5",
            "providers": [{"name": "openai", "models": [{"id": "gpt-5"}, {"id": "gpt-5-mini"}]}]
        })));
        assert_eq!(store.selected_model(), "gpt-5");

        assert!(store.select_model("gpt-5-mini"));
        assert!(!store.select_model("missing"));
        assert_eq!(store.selected_model(), "gpt-5-mini");

        store.set_catalog(catalog::normalize(&json!({
            "current_model": "gpt-5",
            "providers": [{"name": "openai", "models": [{"id": "gpt-5"}]}]
        })));
        assert_eq!(store.selected_model(), "gpt-5");
    }

    #[test]
    fn tools_default_enabled_and_toggle() {
        let mut store = SessionStore::new();
        store.set_available_tools(vec!["web_search".into(), "shell".into()]);
        assert!(store.excluded_tools().is_empty());

        assert!(!store.toggle_tool("shell"));
        assert_eq!(store.excluded_tools(), vec!["shell".to_string()]);

        store.set_available_tools(vec!["web_search".into(), "shell".into(), "mail".into()]);
        assert_eq!(store.excluded_tools(), vec!["shell".to_string(), "mail".to_string()]);

        assert!(store.toggle_tool("shell"));
    }
}
