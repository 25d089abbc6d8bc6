// handlers/elevated/audit.rs - GET /api/admin/audit

use axum::extract::State;

use crate::database::models::AuditLog;
use crate::database::{Page, Repository};
use crate::error::ApiResult;
use crate::handlers::parse_uuid;
use crate::handlers::protected::audit::audit_conditions;
use crate::middleware::{ApiResponse, ListParams};
use crate::state::AppState;

/// Audit trail across every firm, optionally narrowed with `firm_id`
pub async fn list(State(state): State<AppState>, list: ListParams) -> ApiResult<ApiResponse<Page<AuditLog>>> {
    let firm_id = list.param("firm_id").map(|v| parse_uuid("firm_id", v)).transpose()?;
    let conditions = audit_conditions(&list)?;

    let mut conn = state.db.acquire().await?;
    let page = Repository::<AuditLog>::new(firm_id, state.limit_policy())
        .page(&mut conn, &list, conditions)
        .await?;
    Ok(ApiResponse::success(page))
}
