use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::repository::Resource;
use crate::filter::TableSpec;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub firm_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: String,
    pub permission_grants: Vec<String>,
    pub permission_revokes: Vec<String>,
    pub is_active: bool,
    pub super_admin: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl User {
    /// Live and not deactivated
    pub fn can_sign_in(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

impl Resource for User {
    const TABLE: TableSpec = TableSpec {
        name: "users",
        columns: &[
            "id", "firm_id", "email", "name", "role", "is_active", "super_admin", "last_login_at",
            "created_at", "updated_at", "deleted_at", "deleted_by",
        ],
        searchable: &["name", "email"],
        soft_delete: true,
        default_order: ("name", false),
    };
    const ENTITY: &'static str = "user";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Emails are unique platform-wide and compared lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_never_serializes() {
        let user = User {
            id: Uuid::new_v4(),
            firm_id: None,
            email: "ops@docket.test".to_string(),
            name: "Ops".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            role: "admin".to_string(),
            permission_grants: vec![],
            permission_revokes: vec![],
            is_active: true,
            super_admin: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "ops@docket.test");
    }

    #[test]
    fn emails_are_lower_cased() {
        assert_eq!(normalize_email("  Jane.Doe@Firm.COM "), "jane.doe@firm.com");
    }
}
