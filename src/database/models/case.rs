use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::repository::Resource;
use crate::filter::TableSpec;

text_enum!(CaseStatus {
    Open => "open",
    Pending => "pending",
    Closed => "closed",
    Archived => "archived",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Case {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub case_number: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub practice_area: Option<String>,
    pub client_id: Option<Uuid>,
    pub assigned_to: Vec<Uuid>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Resource for Case {
    const TABLE: TableSpec = TableSpec {
        name: "cases",
        columns: &[
            "id", "case_number", "title", "status", "practice_area", "client_id", "assigned_to",
            "opened_at", "closed_at", "created_by", "created_at", "updated_at", "deleted_at", "deleted_by",
        ],
        searchable: &["title", "case_number", "practice_area"],
        soft_delete: true,
        default_order: ("opened_at", true),
    };
    const ENTITY: &'static str = "case";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// `YYYY-NNNN`, where the sequence comes from the firm's counter
pub fn format_case_number(at: DateTime<Utc>, sequence: i64) -> String {
    format!("{}-{:04}", at.year(), sequence)
}

/// How `closed_at` moves when the status changes
pub fn closed_at_transition(
    previous: &str,
    next: CaseStatus,
    now: DateTime<Utc>,
) -> Option<Option<DateTime<Utc>>> {
    let was_closed = previous == CaseStatus::Closed.as_str();
    match (was_closed, next) {
        (false, CaseStatus::Closed) => Some(Some(now)),
        (true, CaseStatus::Open) | (true, CaseStatus::Pending) => Some(None),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn case_numbers_are_zero_padded() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(format_case_number(at, 7), "2024-0007");
        assert_eq!(format_case_number(at, 12345), "2024-12345");
    }

    #[test]
    fn closing_and_reopening_moves_closed_at() {
        let now = Utc::now();
        assert_eq!(closed_at_transition("open", CaseStatus::Closed, now), Some(Some(now)));
        assert_eq!(closed_at_transition("closed", CaseStatus::Open, now), Some(None));
        assert_eq!(closed_at_transition("closed", CaseStatus::Closed, now), None);
        assert_eq!(closed_at_transition("closed", CaseStatus::Archived, now), None);
        assert_eq!(closed_at_transition("open", CaseStatus::Pending, now), None);
    }
}
