use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::auth::Role;
use crate::database::models::User;
use crate::database::Repository;
use crate::error::ApiError;
use crate::filter::LimitPolicy;

/// Refuse to leave a firm without an active admin.
///
/// Locks the firm row first, so concurrent demotions in one firm are counted
/// one after the other.
pub async fn ensure_not_last_admin(
    conn: &mut PgConnection,
    firm_id: Uuid,
    user: &User,
    policy: LimitPolicy,
) -> Result<(), ApiError> {
    if user.role != Role::Admin.as_str() || !user.is_active {
        return Ok(());
    }
    lock_firm(conn, firm_id).await?;
    let admins = Repository::<User>::new(Some(firm_id), policy)
        .count(conn, json!({ "role": Role::Admin.as_str(), "is_active": true }))
        .await?;
    if admins <= 1 {
        return Err(ApiError::conflict("A firm must keep at least one active admin"));
    }
    Ok(())
}

/// Held until the surrounding transaction ends
async fn lock_firm(conn: &mut PgConnection, firm_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1 FROM firms WHERE id = $1 FOR UPDATE")
        .bind(firm_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// True when an update would take admin rights (or the account) away
pub fn loses_admin(user: &User, new_role: Option<Role>, new_active: Option<bool>) -> bool {
    let was_admin = user.role == Role::Admin.as_str() && user.is_active;
    let stays_admin = new_role.map_or(user.role == Role::Admin.as_str(), |r| r == Role::Admin)
        && new_active.unwrap_or(user.is_active);
    was_admin && !stays_admin
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn admin() -> User {
        User {
            id: Uuid::new_v4(),
            firm_id: Some(Uuid::new_v4()),
            email: "admin@firm.test".to_string(),
            name: "Admin".to_string(),
            password_hash: String::new(),
            role: "admin".to_string(),
            permission_grants: vec![],
            permission_revokes: vec![],
            is_active: true,
            super_admin: false,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn demotion_and_deactivation_lose_admin() {
        let user = admin();
        assert!(loses_admin(&user, Some(Role::Attorney), None));
        assert!(loses_admin(&user, None, Some(false)));
        assert!(!loses_admin(&user, Some(Role::Admin), Some(true)));
        assert!(!loses_admin(&user, None, None));
    }

    #[test]
    fn non_admins_never_lose_admin() {
        let mut user = admin();
        user.role = "staff".to_string();
        assert!(!loses_admin(&user, Some(Role::ReadOnly), Some(false)));
    }
}
