// handlers/elevated/firms.rs - /api/admin/firms

use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::audit::{diff_records, snapshot, AuditAction, AuditEntry};
use crate::auth::{issue_token, Claims};
use crate::database::models::{Firm, FirmStatus, User};
use crate::database::{Changeset, Page, Repository};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{Conditions, JsonBody, PathId};
use crate::middleware::{ApiResponse, CurrentUser, DeletedFlags, ListParams, Tx};
use crate::services::firm_service::{self, NewFirm};
use crate::services::validation;
use crate::state::AppState;

fn firms(state: &AppState) -> Repository<Firm> {
    Repository::new(None, state.limit_policy())
}

/// GET /api/admin/firms
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    list: ListParams,
) -> ApiResult<ApiResponse<Page<Firm>>> {
    let conditions = Conditions::new()
        .one_of("status", list.param("status"), &["active", "suspended"])?
        .text("plan", list.param("plan"))
        .into_value();

    let mut conn = state.db.acquire().await?;
    let page = firms(&state)
        .with_deleted(list.deleted)
        .page(&mut conn, &list, conditions)
        .await?;
    tracing::debug!(superadmin = %user.id, total = page.total, "Listed firms");
    Ok(ApiResponse::success(page))
}

#[derive(Debug, Deserialize)]
pub struct FirmAdmin {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFirm {
    #[serde(default)]
    pub name: String,
    pub slug: Option<String>,
    pub plan: Option<String>,
    pub admin: Option<FirmAdmin>,
}

/// POST /api/admin/firms - the firm and its first admin, in one transaction
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    tx: Tx,
    JsonBody(req): JsonBody<CreateFirm>,
) -> ApiResult<ApiResponse<Value>> {
    let admin = req
        .admin
        .ok_or_else(|| ApiError::invalid_field("admin", "is required"))?;

    let mut conn = tx.conn().await?;
    let (firm, admin) = firm_service::create_firm_with_admin(
        &mut conn,
        NewFirm {
            name: req.name,
            slug: req.slug,
            plan: req.plan,
            admin_email: admin.email,
            admin_name: admin.name,
            admin_password: admin.password,
        },
        state.config.security.bcrypt_cost,
        state.limit_policy(),
    )
    .await?;

    let actor = user.actor(Some(firm.id));
    state
        .audit(&mut conn, &actor, AuditEntry::new(AuditAction::Create, "firm", firm.id).changes(snapshot(&firm)))
        .await?;
    state
        .audit(&mut conn, &actor, AuditEntry::new(AuditAction::Create, "user", admin.id).changes(snapshot(&admin)))
        .await?;

    Ok(ApiResponse::created(json!({ "firm": firm, "admin": admin })))
}

pub async fn show(
    State(state): State<AppState>,
    DeletedFlags(deleted): DeletedFlags,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Firm>> {
    let mut conn = state.db.acquire().await?;
    let firm = firms(&state).with_deleted(deleted).select_404(&mut conn, id).await?;
    Ok(ApiResponse::success(firm))
}

/// Status moves through suspend/activate, not PATCH
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirmPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub plan: Option<String>,
    pub settings: Option<Value>,
}

pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
    JsonBody(patch): JsonBody<FirmPatch>,
) -> ApiResult<ApiResponse<Firm>> {
    if matches!(&patch.settings, Some(s) if !s.is_object()) {
        return Err(ApiError::invalid_field("settings", "must be an object"));
    }
    let name = patch.name.as_deref().map(|n| validation::required_text("name", n, 200)).transpose()?;
    let slug = patch.slug.as_deref().map(firm_service::validate_slug).transpose()?;
    let plan = patch.plan.as_deref().map(|p| validation::required_text("plan", p, 50)).transpose()?;

    let mut conn = tx.conn().await?;
    let before = firms(&state).select_404(&mut conn, id).await?;
    let after = firms(&state)
        .update(
            &mut conn,
            id,
            Changeset::new()
                .maybe("name", name)
                .maybe("slug", slug)
                .maybe("plan", plan)
                .maybe("settings", patch.settings),
        )
        .await?;

    state
        .audit(
            &mut conn,
            &user.actor(Some(id)),
            AuditEntry::new(AuditAction::Update, "firm", id).changes(diff_records(&before, &after)),
        )
        .await?;
    Ok(ApiResponse::success(after))
}

/// Soft delete only; a firm's rows stay referenced by its data
pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Firm>> {
    let mut conn = tx.conn().await?;
    let firm = firms(&state).soft_delete(&mut conn, id, user.id).await?;
    state
        .audit(&mut conn, &user.actor(Some(id)), AuditEntry::new(AuditAction::Delete, "firm", id))
        .await?;
    tracing::warn!(firm_id = %id, superadmin = %user.id, "Firm deleted");
    Ok(ApiResponse::success(firm))
}

pub async fn restore(
    State(state): State<AppState>,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Firm>> {
    let mut conn = tx.conn().await?;
    let firm = firms(&state).restore(&mut conn, id).await?;
    state
        .audit(&mut conn, &user.actor(Some(id)), AuditEntry::new(AuditAction::Restore, "firm", id))
        .await?;
    tracing::info!(firm_id = %id, superadmin = %user.id, "Firm restored");
    Ok(ApiResponse::success(firm))
}

pub async fn suspend(
    State(state): State<AppState>,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Firm>> {
    set_status(&state, &user, &tx, id, FirmStatus::Suspended, AuditAction::Suspend).await
}

pub async fn activate(
    State(state): State<AppState>,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Firm>> {
    set_status(&state, &user, &tx, id, FirmStatus::Active, AuditAction::Activate).await
}

async fn set_status(
    state: &AppState,
    user: &CurrentUser,
    tx: &Tx,
    id: Uuid,
    status: FirmStatus,
    action: AuditAction,
) -> ApiResult<ApiResponse<Firm>> {
    let mut conn = tx.conn().await?;
    let (before, after) = firm_service::set_status(&mut conn, id, status, state.limit_policy()).await?;
    state
        .audit(
            &mut conn,
            &user.actor(Some(id)),
            AuditEntry::new(action, "firm", id).changes(diff_records(&before, &after)),
        )
        .await?;
    Ok(ApiResponse::success(after))
}

/// POST /api/admin/firms/:id/impersonate
///
/// Issues a short-lived token scoped to the firm. The token cannot reach the
/// admin console, and every request made with it is logged.
pub async fn impersonate(
    State(state): State<AppState>,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Value>> {
    let mut conn = tx.conn().await?;
    let firm = firms(&state).select_404(&mut conn, id).await?;
    let superadmin = Repository::<User>::new(None, state.limit_policy())
        .select_404(&mut conn, user.id)
        .await?;

    let security = &state.config.security;
    let claims = Claims::impersonation(&superadmin, firm.id, security.impersonation_expiry_minutes);
    let token = issue_token(&claims, &security.jwt_secret)?;

    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.id)),
            AuditEntry::new(AuditAction::Impersonate, "firm", firm.id),
        )
        .await?;
    tracing::warn!(
        firm_id = %firm.id,
        superadmin = %user.id,
        expires_in = claims.expires_in(),
        "Impersonation token issued"
    );

    Ok(ApiResponse::success(json!({
        "token": token,
        "expires_in": claims.expires_in(),
        "firm": firm,
    })))
}
