use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::repository::Resource;
use crate::filter::TableSpec;

text_enum!(ClientType {
    Individual => "individual",
    Organization => "organization",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub client_type: String,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Resource for Client {
    const TABLE: TableSpec = TableSpec {
        name: "clients",
        columns: &[
            "id", "name", "email", "phone", "address", "client_type", "created_by", "created_at",
            "updated_at", "deleted_at", "deleted_by",
        ],
        searchable: &["name", "email", "phone"],
        soft_delete: true,
        default_order: ("name", false),
    };
    const ENTITY: &'static str = "client";

    fn id(&self) -> Uuid {
        self.id
    }
}
