// handlers/public/login.rs - POST /auth/login

use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::{AuditAction, AuditActor, AuditEntry};
use crate::auth::{issue_token, verify_password, Claims};
use crate::database::models::{user::normalize_email, Firm, User};
use crate::database::{Changeset, Repository};
use crate::error::{ApiError, ApiResult};
use crate::handlers::JsonBody;
use crate::middleware::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

const BAD_CREDENTIALS: &str = "Invalid email or password";

/// Exchange credentials for a JWT.
///
/// Unknown emails, wrong passwords, deactivated or deleted users and users
/// of suspended firms all get the same 401.
pub async fn login(State(state): State<AppState>, JsonBody(req): JsonBody<LoginRequest>) -> ApiResult<ApiResponse<Value>> {
    if req.email.trim().is_empty() {
        return Err(ApiError::invalid_field("email", "is required"));
    }
    if req.password.is_empty() {
        return Err(ApiError::invalid_field("password", "is required"));
    }
    let email = normalize_email(&req.email);
    let policy = state.limit_policy();

    let mut tx = state.db.pool().begin().await?;
    let user = Repository::<User>::new(None, policy)
        .select_one(&mut tx, json!({ "email": email }))
        .await?
        .ok_or_else(|| {
            tracing::info!("Login failed: unknown email");
            ApiError::unauthorized(BAD_CREDENTIALS)
        })?;

    if !verify_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }
    if !user.can_sign_in() {
        tracing::warn!(user_id = %user.id, "Login refused: account deactivated");
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }
    if let Some(firm_id) = user.firm_id {
        let firm = Repository::<Firm>::new(None, policy).select_id(&mut tx, firm_id).await?;
        if firm.map_or(true, |f| f.is_suspended()) {
            tracing::warn!(user_id = %user.id, firm_id = %firm_id, "Login refused: firm suspended or deleted");
            return Err(ApiError::unauthorized(BAD_CREDENTIALS));
        }
    }

    let user = Repository::<User>::new(None, policy)
        .update(&mut tx, user.id, Changeset::new().set("last_login_at", Utc::now()))
        .await?;
    let actor = AuditActor {
        firm_id: user.firm_id,
        actor_id: Some(user.id),
        impersonator_id: None,
    };
    state
        .audit(&mut tx, &actor, AuditEntry::new(AuditAction::Login, "user", user.id))
        .await?;

    let claims = Claims::for_user(&user, state.config.security.jwt_expiry_hours);
    let token = issue_token(&claims, &state.config.security.jwt_secret)?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, firm_id = ?user.firm_id, "User signed in");
    Ok(ApiResponse::success(json!({
        "token": token,
        "expires_in": claims.expires_in(),
        "user": user,
    })))
}
