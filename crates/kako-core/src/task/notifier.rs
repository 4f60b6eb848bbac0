//! Task notification hook.

use super::model::TaskRecord;

/// Receives a call when a task enters a terminal status.
///
/// This is a fire-and-forget UI concern. The store ignores failures beyond
/// logging them, and implementations must not block.
pub trait TaskNotifier: Send + Sync {
    fn notify_terminal(&self, task: &TaskRecord) -> Result<(), String>;
}
