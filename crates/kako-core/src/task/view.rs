//! Derived task views: filtering, grouping and sorting.
//!
//! Nothing here is stored. Views are recomputed from the store's canonical
//! task list every time they are requested.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum::{Display, EnumString};

use super::model::{TaskRecord, TaskStatus};

/// Active task filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Case-insensitive substring matched against title or description.
    pub search: String,
    pub status: Option<TaskStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty()
            && self.status.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    pub fn matches(&self, task: &TaskRecord) -> bool {
        let needle = self.search.trim().to_lowercase();
        if !needle.is_empty() {
            let in_title = task.title.to_lowercase().contains(&needle);
            let in_description = task
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_title && !in_description {
                return false;
            }
        }

        if let Some(status) = &self.status {
            if &task.status != status {
                return false;
            }
        }

        if let Some(from) = self.date_from {
            if task.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if task.created_at > to {
                return false;
            }
        }

        true
    }
}

/// Sort order applied inside each status column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    #[strum(serialize = "recent")]
    #[serde(rename = "recent")]
    Recent,
    #[strum(serialize = "oldest")]
    #[serde(rename = "oldest")]
    Oldest,
    #[strum(serialize = "a-z")]
    #[serde(rename = "a-z")]
    TitleAsc,
    #[strum(serialize = "z-a")]
    #[serde(rename = "z-a")]
    TitleDesc,
}

impl SortKey {
    pub fn compare(&self, a: &TaskRecord, b: &TaskRecord) -> Ordering {
        match self {
            SortKey::Recent => b.created_at.cmp(&a.created_at),
            SortKey::Oldest => a.created_at.cmp(&b.created_at),
            SortKey::TitleAsc => compare_titles(a, b),
            SortKey::TitleDesc => compare_titles(b, a),
        }
    }

    /// Stable sort, so equal keys keep store order.
    pub fn sort(&self, tasks: &mut [&TaskRecord]) {
        tasks.sort_by(|a, b| self.compare(a, b));
    }
}

fn compare_titles(a: &TaskRecord, b: &TaskRecord) -> Ordering {
    a.title
        .to_lowercase()
        .cmp(&b.title.to_lowercase())
        .then_with(|| a.title.cmp(&b.title))
}

/// One board column.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusColumn<'a> {
    pub status: TaskStatus,
    pub tasks: Vec<&'a TaskRecord>,
}

/// Groups already-filtered tasks into the board columns, sorted by `sort`.
///
/// Tasks whose status is not a board column are not shown.
pub fn group_by_status<'a>(
    tasks: impl IntoIterator<Item = &'a TaskRecord>,
    sort: SortKey,
) -> Vec<StatusColumn<'a>> {
    let mut columns: Vec<StatusColumn<'a>> = TaskStatus::BOARD
        .iter()
        .map(|status| StatusColumn {
            status: status.clone(),
            tasks: Vec::new(),
        })
        .collect();

    for task in tasks {
        if let Some(column) = columns.iter_mut().find(|c| c.status == task.status) {
            column.tasks.push(task);
        }
    }

    for column in &mut columns {
        sort.sort(&mut column.tasks);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::model::{TaskPatch, TaskUpdate};
    use chrono::TimeZone;

    fn task(id: &str, title: &str, status: &str, day: u32) -> TaskRecord {
        TaskRecord::from_update(TaskUpdate::new(
            id,
            TaskPatch {
                title: Some(title.to_string()),
                status: Some(TaskStatus::from(status)),
                created_at: Some(Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()),
                ..TaskPatch::default()
            },
        ))
    }

    #[test]
    fn search_matches_title_or_description_case_insensitively() {
        let mut with_desc = task("1", "Alpha", "todo", 1);
        with_desc.description = Some("Contains the NEEDLE".into());
        let plain = task("2", "Beta", "todo", 2);

        let filter = TaskFilter {
            search: "needle".into(),
            ..TaskFilter::default()
        };
        assert!(filter.matches(&with_desc));
        assert!(!filter.matches(&plain));

        let by_title = TaskFilter {
            search: "BET".into(),
            ..TaskFilter::default()
        };
        assert!(by_title.matches(&plain));
    }

    #[test]
    fn date_range_is_inclusive() {
        let t = task("1", "Alpha", "todo", 10);
        let filter = TaskFilter {
            date_from: Some(Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()),
            date_to: Some(Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()),
            ..TaskFilter::default()
        };
        assert!(filter.matches(&t));

        let later = TaskFilter {
            date_from: Some(Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap()),
            ..TaskFilter::default()
        };
        assert!(!later.matches(&t));
    }

    #[test]
    fn sort_keys_parse_from_board_names() {
        assert_eq!("a-z".parse::<SortKey>().unwrap(), SortKey::TitleAsc);
        assert_eq!("z-a".parse::<SortKey>().unwrap(), SortKey::TitleDesc);
        assert_eq!(SortKey::Oldest.to_string(), "oldest");
    }

    #[test]
    fn groups_into_board_columns_and_sorts() {
        let tasks = vec![
            task("1", "charlie", "todo", 1),
            task("2", "Alpha", "todo", 3),
            task("3", "bravo", "todo", 2),
            task("4", "delta", "done", 4),
            task("5", "echo", "failed", 5),
        ];

        let columns = group_by_status(&tasks, SortKey::TitleAsc);
        assert_eq!(columns.len(), 5);

        let todo: Vec<&str> = columns[1].tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(todo, vec!["Alpha", "bravo", "charlie"]);
        assert_eq!(columns[4].tasks.len(), 1);

        let total: usize = columns.iter().map(|c| c.tasks.len()).sum();
        assert_eq!(total, 4, "non-board statuses are not shown");

        let recent = group_by_status(&tasks, SortKey::Recent);
        let ids: Vec<&str> = recent[1].tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }
}
