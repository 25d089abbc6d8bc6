// handlers/protected/audit.rs - GET /api/audit

use axum::extract::State;

use crate::auth::Permission;
use crate::database::models::AuditLog;
use crate::database::Page;
use crate::error::{ApiError, ApiResult};
use crate::filter::DeletedScope;
use crate::handlers::Conditions;
use crate::middleware::{ApiResponse, CurrentUser, FirmContext, ListParams};
use crate::state::AppState;

use super::repo;

pub const ACTIONS: &[&str] = &[
    "create", "update", "delete", "restore", "purge", "login", "impersonate", "suspend", "activate",
    "password_change",
];

/// The firm's audit trail, newest first
pub async fn list(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    list: ListParams,
) -> ApiResult<ApiResponse<Page<AuditLog>>> {
    user.require(Permission::AuditRead)?;
    if list.deleted != DeletedScope::Active {
        return Err(ApiError::bad_request("Audit entries are never deleted"));
    }
    let conditions = audit_conditions(&list)?;

    let mut conn = state.db.acquire().await?;
    let page = repo::<AuditLog>(&state, &firm).page(&mut conn, &list, conditions).await?;
    Ok(ApiResponse::success(page))
}

/// Filters shared with the platform-wide trail
pub(crate) fn audit_conditions(list: &ListParams) -> ApiResult<serde_json::Value> {
    Ok(Conditions::new()
        .text("entity_type", list.param("entity_type"))
        .uuid("entity_id", list.param("entity_id"))?
        .uuid("actor_id", list.param("actor_id"))?
        .one_of("action", list.param("action"), ACTIONS)?
        .into_value())
}
