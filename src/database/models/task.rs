use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::repository::Resource;
use crate::filter::TableSpec;

text_enum!(TaskStatus {
    Todo => "todo",
    InProgress => "in_progress",
    Done => "done",
    Cancelled => "cancelled",
});

text_enum!(TaskPriority {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub case_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Resource for Task {
    const TABLE: TableSpec = TableSpec {
        name: "tasks",
        columns: &[
            "id", "case_id", "title", "status", "priority", "due_date", "assigned_to", "completed_at",
            "created_by", "created_at", "updated_at", "deleted_at", "deleted_by",
        ],
        searchable: &["title", "description"],
        soft_delete: true,
        default_order: ("due_date", false),
    };
    const ENTITY: &'static str = "task";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// `completed_at` follows the `done` status in both directions
pub fn completed_at_transition(
    previous: &str,
    next: TaskStatus,
    now: DateTime<Utc>,
) -> Option<Option<DateTime<Utc>>> {
    let was_done = previous == TaskStatus::Done.as_str();
    match (was_done, next) {
        (false, TaskStatus::Done) => Some(Some(now)),
        (true, TaskStatus::Done) => None,
        (true, _) => Some(None),
        (false, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completing_and_reopening_moves_completed_at() {
        let now = Utc::now();
        assert_eq!(completed_at_transition("todo", TaskStatus::Done, now), Some(Some(now)));
        assert_eq!(completed_at_transition("done", TaskStatus::InProgress, now), Some(None));
        assert_eq!(completed_at_transition("done", TaskStatus::Done, now), None);
        assert_eq!(completed_at_transition("todo", TaskStatus::Cancelled, now), None);
    }

    #[test]
    fn parses_snake_case_status() {
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("finished"), None);
        assert_eq!(TaskPriority::Urgent.to_string(), "urgent");
    }
}
