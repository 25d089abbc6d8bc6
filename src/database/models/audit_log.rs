use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::repository::Resource;
use crate::filter::TableSpec;

/// Append-only; never soft deleted
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub firm_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub impersonator_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub changes: Value,
    pub created_at: DateTime<Utc>,
}

impl Resource for AuditLog {
    const TABLE: TableSpec = TableSpec {
        name: "audit_logs",
        columns: &[
            "id", "firm_id", "actor_id", "impersonator_id", "action", "entity_type", "entity_id", "created_at",
        ],
        searchable: &[],
        soft_delete: false,
        default_order: ("created_at", true),
    };
    const ENTITY: &'static str = "audit_log";

    fn id(&self) -> Uuid {
        self.id
    }
}
