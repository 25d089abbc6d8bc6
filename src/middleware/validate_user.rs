use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use crate::audit::AuditActor;
use crate::auth::{resolve_permissions, Claims, Permission, PermissionSet, Role};
use crate::database::models::User;
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::firm_context::FirmContext;
use crate::state::AppState;

/// The authenticated caller, validated against the `users` table
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub firm_id: Option<Uuid>,
    pub super_admin: bool,
    pub permissions: PermissionSet,
    #[serde(skip)]
    pub impersonator: Option<Uuid>,
}

impl CurrentUser {
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        self.permissions.require(permission)
    }

    pub fn actor(&self, firm_id: Option<Uuid>) -> AuditActor {
        AuditActor {
            firm_id,
            actor_id: Some(self.id),
            impersonator_id: self.impersonator,
        }
    }
}

/// Middleware that validates the user from JWT claims against the users table.
/// The user must be live, active, hold the token's role and belong to the
/// resolved firm (SuperAdmins excepted).
pub async fn validate_user_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before user validation"))?;
    let firm = request.extensions().get::<FirmContext>().cloned();

    let mut conn = state.db.acquire().await?;
    let user = Repository::<User>::new(None, state.limit_policy())
        .select_id(&mut conn, claims.sub)
        .await?;
    drop(conn);

    let user = user.ok_or_else(|| {
        tracing::warn!(user_id = %claims.sub, "User validation failed: user not found or deleted");
        ApiError::unauthorized("User no longer exists")
    })?;

    let current = validate_claims(&claims, &user, firm.as_ref())?;
    tracing::debug!(
        user_id = %current.id,
        role = %current.role,
        firm_id = ?firm.as_ref().map(|f| f.firm_id),
        "User validation successful"
    );

    request.extensions_mut().insert(current);
    Ok(next.run(request).await)
}

/// Checks a loaded user row against the token and resolves permissions
pub fn validate_claims(claims: &Claims, user: &User, firm: Option<&FirmContext>) -> Result<CurrentUser, ApiError> {
    if !user.is_active {
        tracing::warn!(user_id = %user.id, "User validation failed: account deactivated");
        return Err(ApiError::forbidden("User account is deactivated"));
    }
    if user.role != claims.role {
        tracing::warn!(
            user_id = %user.id,
            "User validation failed: token role '{}' doesn't match database role '{}'",
            claims.role,
            user.role
        );
        return Err(ApiError::forbidden("User role has changed; sign in again"));
    }
    if claims.super_admin && !user.super_admin {
        tracing::warn!(user_id = %user.id, "User validation failed: SuperAdmin rights revoked");
        return Err(ApiError::forbidden("SuperAdmin access has been revoked"));
    }
    if let Some(firm) = firm {
        if !user.super_admin && user.firm_id != Some(firm.firm_id) {
            tracing::warn!(user_id = %user.id, firm_id = %firm.firm_id, "User does not belong to firm");
            return Err(ApiError::forbidden("User does not belong to this firm"));
        }
    }

    let role = Role::parse(&user.role)
        .ok_or_else(|| ApiError::forbidden(format!("Unknown role '{}'", user.role)))?;
    let permissions = resolve_permissions(role, &user.permission_grants, &user.permission_revokes, user.super_admin);

    Ok(CurrentUser {
        id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        role,
        firm_id: user.firm_id,
        super_admin: user.super_admin,
        permissions,
        impersonator: claims.impersonator,
    })
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authenticated user missing from request"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::firm_context::FirmSource;
    use chrono::Utc;

    fn user(firm_id: Option<Uuid>, role: &str, super_admin: bool) -> User {
        User {
            id: Uuid::new_v4(),
            firm_id,
            email: "a@firm.test".to_string(),
            name: "A".to_string(),
            password_hash: String::new(),
            role: role.to_string(),
            permission_grants: vec![],
            permission_revokes: vec!["cases:write".to_string()],
            is_active: true,
            super_admin,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn claims_for(user: &User) -> Claims {
        Claims::for_user(user, 1)
    }

    fn firm(id: Uuid) -> FirmContext {
        FirmContext {
            firm_id: id,
            firm_name: "Firm".to_string(),
            firm_status: "active".to_string(),
            source: FirmSource::Token,
            impersonator: None,
        }
    }

    #[test]
    fn resolves_permissions_for_member() {
        let firm_id = Uuid::new_v4();
        let u = user(Some(firm_id), "attorney", false);
        let current = validate_claims(&claims_for(&u), &u, Some(&firm(firm_id))).unwrap();
        assert_eq!(current.role, Role::Attorney);
        assert!(current.permissions.has(Permission::CasesRead));
        assert!(!current.permissions.has(Permission::CasesWrite));
    }

    #[test]
    fn stale_role_is_rejected() {
        let u = user(Some(Uuid::new_v4()), "staff", false);
        let mut claims = claims_for(&u);
        claims.role = "admin".to_string();
        assert_eq!(validate_claims(&claims, &u, None).unwrap_err().status_code(), 403);
    }

    #[test]
    fn deactivated_user_is_rejected() {
        let mut u = user(Some(Uuid::new_v4()), "staff", false);
        u.is_active = false;
        assert_eq!(validate_claims(&claims_for(&u), &u, None).unwrap_err().status_code(), 403);
    }

    #[test]
    fn member_of_other_firm_is_rejected() {
        let u = user(Some(Uuid::new_v4()), "admin", false);
        let err = validate_claims(&claims_for(&u), &u, Some(&firm(Uuid::new_v4()))).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn superadmin_acts_in_any_firm() {
        let u = user(None, "admin", true);
        let current = validate_claims(&claims_for(&u), &u, Some(&firm(Uuid::new_v4()))).unwrap();
        assert!(current.permissions.has(Permission::RecordsPurge));
    }
}
