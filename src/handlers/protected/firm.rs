// handlers/protected/firm.rs - GET/PATCH /api/firm

use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use crate::audit::{diff_records, AuditAction, AuditEntry};
use crate::auth::Permission;
use crate::database::models::Firm;
use crate::database::{Changeset, Repository};
use crate::error::{ApiError, ApiResult};
use crate::handlers::JsonBody;
use crate::middleware::{ApiResponse, CurrentUser, FirmContext, Tx};
use crate::services::validation;
use crate::state::AppState;

pub async fn show(State(state): State<AppState>, firm: FirmContext, user: CurrentUser) -> ApiResult<ApiResponse<Firm>> {
    user.require(Permission::FirmRead)?;
    let mut conn = state.db.acquire().await?;
    let record = Repository::<Firm>::new(None, state.limit_policy())
        .select_404(&mut conn, firm.firm_id)
        .await?;
    Ok(ApiResponse::success(record))
}

/// Firm admins may rename the firm and replace its settings. Status, slug
/// and plan belong to the admin console.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirmPatch {
    pub name: Option<String>,
    pub settings: Option<Value>,
}

pub async fn update(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    JsonBody(patch): JsonBody<FirmPatch>,
) -> ApiResult<ApiResponse<Firm>> {
    user.require(Permission::FirmManage)?;
    if let Some(settings) = &patch.settings {
        if !settings.is_object() {
            return Err(ApiError::invalid_field("settings", "must be an object"));
        }
    }
    let name = patch.name.as_deref().map(|n| validation::required_text("name", n, 200)).transpose()?;

    let mut conn = tx.conn().await?;
    let firms = Repository::<Firm>::new(None, state.limit_policy());
    let before = firms.select_404(&mut conn, firm.firm_id).await?;
    let after = firms
        .update(
            &mut conn,
            firm.firm_id,
            Changeset::new().maybe("name", name).maybe("settings", patch.settings),
        )
        .await?;

    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Update, "firm", firm.firm_id).changes(diff_records(&before, &after)),
        )
        .await?;
    Ok(ApiResponse::success(after))
}
