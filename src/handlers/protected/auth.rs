// handlers/protected/auth.rs - /api/auth/* session endpoints
//
// Mounted without firm context so SuperAdmins (who have no firm) can use them.

use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{AuditAction, AuditEntry};
use crate::auth::{hash_password, issue_token, verify_password, Claims};
use crate::database::models::{Firm, User};
use crate::database::{Changeset, Repository};
use crate::error::{ApiError, ApiResult};
use crate::handlers::JsonBody;
use crate::middleware::{ApiResponse, CurrentUser, Tx};
use crate::services::validation;
use crate::state::AppState;

/// GET /api/auth/whoami
pub async fn whoami(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    user: CurrentUser,
) -> ApiResult<ApiResponse<Value>> {
    let firm = match claims.firm_id {
        Some(firm_id) => {
            let mut conn = state.db.acquire().await?;
            Repository::<Firm>::new(None, state.limit_policy())
                .select_id(&mut conn, firm_id)
                .await?
        }
        None => None,
    };

    Ok(ApiResponse::success(json!({
        "user": user,
        "firm": firm.map(|f| json!({ "id": f.id, "name": f.name, "slug": f.slug, "status": f.status })),
        "permissions": user.permissions,
        "impersonated_by": claims.impersonator,
        "expires_at": claims.exp,
    })))
}

/// POST /api/auth/refresh. Firm users lose the right to refresh once their
/// firm is suspended or deleted, as they do at login.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<ApiResponse<Value>> {
    if let (Some(firm_id), false) = (claims.firm_id, claims.super_admin) {
        let mut conn = state.db.acquire().await?;
        let firm = Repository::<Firm>::new(None, state.limit_policy())
            .select_id(&mut conn, firm_id)
            .await?;
        if firm.map_or(true, |f| f.is_suspended()) {
            tracing::warn!(user_id = %claims.sub, firm_id = %firm_id, "Refresh refused: firm suspended or deleted");
            return Err(ApiError::forbidden("Firm is suspended or no longer exists"));
        }
    }

    let security = &state.config.security;
    let fresh = claims.refreshed(security.jwt_expiry_hours, security.impersonation_expiry_minutes);
    let token = issue_token(&fresh, &security.jwt_secret)?;

    tracing::debug!(user_id = %fresh.sub, impersonation = fresh.is_impersonation(), "Token refreshed");
    Ok(ApiResponse::success(json!({
        "token": token,
        "expires_in": fresh.expires_in(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    tx: Tx,
    JsonBody(req): JsonBody<PasswordChange>,
) -> ApiResult<ApiResponse<Value>> {
    if req.current_password.is_empty() {
        return Err(ApiError::invalid_field("current_password", "is required"));
    }
    validation::password("new_password", &req.new_password)?;
    if req.new_password == req.current_password {
        return Err(ApiError::invalid_field("new_password", "must differ from the current password"));
    }

    let mut conn = tx.conn().await?;
    let users = Repository::<User>::new(None, state.limit_policy());
    let row = users.select_404(&mut conn, user.id).await?;
    if !verify_password(&req.current_password, &row.password_hash)? {
        tracing::info!(user_id = %user.id, "Password change rejected: wrong current password");
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }

    let password_hash = hash_password(&req.new_password, state.config.security.bcrypt_cost)?;
    users
        .update(&mut conn, user.id, Changeset::new().set("password_hash", password_hash))
        .await?;
    state
        .audit(
            &mut conn,
            &user.actor(user.firm_id),
            AuditEntry::new(AuditAction::PasswordChange, "user", user.id),
        )
        .await?;

    tracing::info!(user_id = %user.id, "Password changed");
    Ok(ApiResponse::success(json!({ "changed": true })))
}
