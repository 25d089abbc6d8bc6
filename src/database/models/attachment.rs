use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::repository::Resource;
use crate::filter::TableSpec;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub case_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    #[serde(skip_serializing, default)]
    pub storage_key: String,
    pub checksum: String,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Resource for Attachment {
    const TABLE: TableSpec = TableSpec {
        name: "attachments",
        columns: &[
            "id", "case_id", "file_name", "content_type", "size_bytes", "checksum", "uploaded_by",
            "created_at", "updated_at", "deleted_at", "deleted_by",
        ],
        searchable: &["file_name"],
        soft_delete: true,
        default_order: ("created_at", true),
    };
    const ENTITY: &'static str = "attachment";

    fn id(&self) -> Uuid {
        self.id
    }
}
