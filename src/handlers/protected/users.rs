// handlers/protected/users.rs - /api/users

use axum::extract::State;
use serde::Deserialize;

use crate::audit::{diff_records, snapshot, AuditAction, AuditEntry};
use crate::auth::{hash_password, Permission, Role};
use crate::database::models::User;
use crate::database::{Changeset, Page};
use crate::error::{ApiError, ApiResult};
use crate::filter::DeletedScope;
use crate::handlers::{Conditions, JsonBody, PathId};
use crate::middleware::{ApiResponse, CurrentUser, DeleteMode, DeletedFlags, FirmContext, ListParams, Tx};
use crate::services::{user_service, validation};
use crate::state::AppState;

use super::repo;

const ROLES: &[&str] = &["admin", "attorney", "paralegal", "staff", "read_only"];

pub async fn list(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    list: ListParams,
) -> ApiResult<ApiResponse<Page<User>>> {
    user.require(Permission::UsersRead)?;
    let conditions = Conditions::new()
        .one_of("role", list.param("role"), ROLES)?
        .boolean("is_active", list.param("is_active"))?
        .into_value();

    let mut conn = state.db.acquire().await?;
    let page = repo::<User>(&state, &firm)
        .with_deleted(list.deleted)
        .page(&mut conn, &list, conditions)
        .await?;
    Ok(ApiResponse::success(page))
}

pub async fn show(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    DeletedFlags(deleted): DeletedFlags,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<User>> {
    user.require(Permission::UsersRead)?;
    let mut conn = state.db.acquire().await?;
    let record = repo::<User>(&state, &firm).with_deleted(deleted).select_404(&mut conn, id).await?;
    Ok(ApiResponse::success(record))
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
    #[serde(default)]
    pub permission_grants: Vec<String>,
    #[serde(default)]
    pub permission_revokes: Vec<String>,
    pub is_active: Option<bool>,
}

pub async fn create(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    JsonBody(req): JsonBody<NewUser>,
) -> ApiResult<ApiResponse<User>> {
    user.require(Permission::UsersManage)?;
    let email = validation::email("email", &req.email)?;
    let name = validation::required_text("name", &req.name, 200)?;
    validation::password("password", &req.password)?;
    let role = match req.role.as_deref() {
        Some(role) => parse_role(role)?,
        None => Role::Staff,
    };
    let grants = permission_list("permission_grants", req.permission_grants)?;
    let revokes = permission_list("permission_revokes", req.permission_revokes)?;
    let password_hash = hash_password(&req.password, state.config.security.bcrypt_cost)?;

    let mut conn = tx.conn().await?;
    let created = repo::<User>(&state, &firm)
        .insert(
            &mut conn,
            Changeset::new()
                .set("email", email)
                .set("name", name)
                .set("password_hash", password_hash)
                .set("role", role.as_str())
                .set("permission_grants", grants)
                .set("permission_revokes", revokes)
                .set("is_active", req.is_active.unwrap_or(true)),
        )
        .await?;

    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Create, "user", created.id).changes(snapshot(&created)),
        )
        .await?;
    tracing::info!(firm_id = %firm.firm_id, user_id = %created.id, role = %role, "User created");
    Ok(ApiResponse::created(created))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub permission_grants: Option<Vec<String>>,
    pub permission_revokes: Option<Vec<String>>,
    /// Admin password reset
    pub password: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
    JsonBody(patch): JsonBody<UserPatch>,
) -> ApiResult<ApiResponse<User>> {
    user.require(Permission::UsersManage)?;
    let role = patch.role.as_deref().map(parse_role).transpose()?;
    let email = patch.email.as_deref().map(|e| validation::email("email", e)).transpose()?;
    let name = patch.name.as_deref().map(|n| validation::required_text("name", n, 200)).transpose()?;
    let grants = patch
        .permission_grants
        .map(|g| permission_list("permission_grants", g))
        .transpose()?;
    let revokes = patch
        .permission_revokes
        .map(|r| permission_list("permission_revokes", r))
        .transpose()?;
    let password_hash = match patch.password.as_deref() {
        Some(pw) => {
            validation::password("password", pw)?;
            Some(hash_password(pw, state.config.security.bcrypt_cost)?)
        }
        None => None,
    };

    let mut conn = tx.conn().await?;
    let users = repo::<User>(&state, &firm);
    let before = users.select_404(&mut conn, id).await?;
    if user_service::loses_admin(&before, role, patch.is_active) {
        user_service::ensure_not_last_admin(&mut conn, firm.firm_id, &before, state.limit_policy()).await?;
    }

    let after = users
        .update(
            &mut conn,
            id,
            Changeset::new()
                .maybe("email", email)
                .maybe("name", name)
                .maybe("role", role.map(|r| r.as_str()))
                .maybe("is_active", patch.is_active)
                .maybe("permission_grants", grants)
                .maybe("permission_revokes", revokes)
                .maybe("password_hash", password_hash),
        )
        .await?;

    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Update, "user", id).changes(diff_records(&before, &after)),
        )
        .await?;
    Ok(ApiResponse::success(after))
}

pub async fn delete(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    mode: DeleteMode,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<User>> {
    user.require(Permission::UsersManage)?;
    if id == user.id {
        return Err(ApiError::conflict("You cannot delete your own account"));
    }

    let mut conn = tx.conn().await?;
    let target = repo::<User>(&state, &firm)
        .with_deleted(DeletedScope::WithDeleted)
        .select_404(&mut conn, id)
        .await?;
    if target.deleted_at.is_none() {
        user_service::ensure_not_last_admin(&mut conn, firm.firm_id, &target, state.limit_policy()).await?;
    }

    let removed = super::remove::<User>(&state, &mut conn, &firm, &user, id, mode).await?;
    Ok(ApiResponse::success(removed))
}

pub async fn restore(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<User>> {
    user.require(Permission::UsersManage)?;
    user.require(Permission::RecordsRestore)?;
    let mut conn = tx.conn().await?;
    let restored = super::restore::<User>(&state, &mut conn, &firm, &user, id).await?;
    Ok(ApiResponse::success(restored))
}

fn parse_role(value: &str) -> ApiResult<Role> {
    validation::one_of("role", value, Role::parse, &ROLES.join(", "))
}

/// Permission names must be known, and are stored de-duplicated
fn permission_list(field: &str, values: Vec<String>) -> ApiResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let permission = Permission::parse(value.trim())
            .ok_or_else(|| ApiError::invalid_field(field, format!("unknown permission '{}'", value)))?;
        let name = permission.as_str().to_string();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    Ok(out)
}
