//! Task domain module.
//!
//! # Module Structure
//!
//! - `model`: `TaskId` normalization, `TaskStatus`, `TaskRecord` and the
//!   per-field `TaskPatch` merge
//! - `view`: derived, non-stored views (filter, group-by-status, sort)
//! - `notifier`: hook fired when a task reaches a terminal status

mod model;
mod notifier;
pub mod view;

pub use model::{StatusChange, TaskId, TaskPatch, TaskRecord, TaskStatus, TaskUpdate};
pub use notifier::TaskNotifier;
pub use view::{SortKey, StatusColumn, TaskFilter};
