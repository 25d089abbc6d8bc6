use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::repository::Resource;
use crate::filter::TableSpec;

text_enum!(FirmStatus {
    Active => "active",
    Suspended => "suspended",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Firm {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: String,
    pub plan: String,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Firm {
    pub fn is_suspended(&self) -> bool {
        self.status == FirmStatus::Suspended.as_str()
    }
}

impl Resource for Firm {
    const TABLE: TableSpec = TableSpec {
        name: "firms",
        columns: &[
            "id", "name", "slug", "status", "plan", "created_at", "updated_at", "deleted_at", "deleted_by",
        ],
        searchable: &["name", "slug"],
        soft_delete: true,
        default_order: ("created_at", true),
    };
    const ENTITY: &'static str = "firm";

    fn id(&self) -> Uuid {
        self.id
    }
}
