// handlers/protected/clients.rs - /api/clients

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use crate::audit::{diff_records, snapshot, AuditAction, AuditEntry};
use crate::auth::Permission;
use crate::database::models::{Case, Client, ClientType};
use crate::database::{Changeset, Page};
use crate::error::{ApiError, ApiResult};
use crate::filter::{DeletedScope, FilterData};
use crate::handlers::{double_option, Conditions, JsonBody, PathId};
use crate::middleware::{ApiResponse, CurrentUser, DeleteMode, DeletedFlags, FirmContext, ListParams, Tx};
use crate::services::{case_service, validation};
use crate::state::AppState;

use super::repo;

/// GET /api/clients
pub async fn list(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    list: ListParams,
) -> ApiResult<ApiResponse<Page<Client>>> {
    user.require(Permission::ClientsRead)?;
    let conditions = Conditions::new()
        .one_of("client_type", list.param("client_type"), &["individual", "organization"])?
        .into_value();

    let mut conn = state.db.acquire().await?;
    let page = repo::<Client>(&state, &firm)
        .with_deleted(list.deleted)
        .page(&mut conn, &list, conditions)
        .await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/clients/find - filter document search
pub async fn find(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    DeletedFlags(deleted): DeletedFlags,
    JsonBody(filter): JsonBody<FilterData>,
) -> ApiResult<ApiResponse<Page<Client>>> {
    user.require(Permission::ClientsRead)?;
    let mut conn = state.db.acquire().await?;
    let page = repo::<Client>(&state, &firm).with_deleted(deleted).find(&mut conn, filter).await?;
    Ok(ApiResponse::success(page))
}

pub async fn show(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    DeletedFlags(deleted): DeletedFlags,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Client>> {
    user.require(Permission::ClientsRead)?;
    let mut conn = state.db.acquire().await?;
    let record = repo::<Client>(&state, &firm).with_deleted(deleted).select_404(&mut conn, id).await?;
    Ok(ApiResponse::success(record))
}

#[derive(Debug, Deserialize)]
pub struct NewClient {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub client_type: Option<String>,
    pub notes: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    JsonBody(req): JsonBody<NewClient>,
) -> ApiResult<ApiResponse<Client>> {
    user.require(Permission::ClientsWrite)?;
    let changes = Changeset::new()
        .set("name", validation::required_text("name", &req.name, 200)?)
        .set("email", optional_email(req.email.as_deref())?)
        .set("phone", validation::optional_text("phone", req.phone.as_deref(), 50)?)
        .set("address", validation::optional_text("address", req.address.as_deref(), 500)?)
        .set("client_type", parse_type(req.client_type.as_deref().unwrap_or("individual"))?)
        .set("notes", validation::optional_text("notes", req.notes.as_deref(), 10_000)?)
        .set("created_by", user.id);

    let mut conn = tx.conn().await?;
    let client = repo::<Client>(&state, &firm).insert(&mut conn, changes).await?;
    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Create, "client", client.id).changes(snapshot(&client)),
        )
        .await?;
    Ok(ApiResponse::created(client))
}

/// Absent fields are left alone; `null` clears an optional field
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    pub client_type: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

pub async fn update(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
    JsonBody(patch): JsonBody<ClientPatch>,
) -> ApiResult<ApiResponse<Client>> {
    user.require(Permission::ClientsWrite)?;
    let mut changes = Changeset::new();
    if let Some(name) = &patch.name {
        changes.push("name", validation::required_text("name", name, 200)?);
    }
    if let Some(email) = &patch.email {
        changes.push("email", optional_email(email.as_deref())?);
    }
    if let Some(phone) = &patch.phone {
        changes.push("phone", validation::optional_text("phone", phone.as_deref(), 50)?);
    }
    if let Some(address) = &patch.address {
        changes.push("address", validation::optional_text("address", address.as_deref(), 500)?);
    }
    if let Some(client_type) = &patch.client_type {
        changes.push("client_type", parse_type(client_type)?);
    }
    if let Some(notes) = &patch.notes {
        changes.push("notes", validation::optional_text("notes", notes.as_deref(), 10_000)?);
    }

    let mut conn = tx.conn().await?;
    let clients = repo::<Client>(&state, &firm);
    let before = clients.select_404(&mut conn, id).await?;
    let after = clients.update(&mut conn, id, changes).await?;
    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Update, "client", id).changes(diff_records(&before, &after)),
        )
        .await?;
    Ok(ApiResponse::success(after))
}

/// Live cases block a soft delete; any case, deleted or not, blocks a purge
pub async fn delete(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    mode: DeleteMode,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Client>> {
    user.require(Permission::ClientsWrite)?;
    let mut conn = tx.conn().await?;
    case_service::lock_client(&mut conn, firm.firm_id, id).await?;

    let case_scope = match mode {
        DeleteMode::Soft => DeletedScope::Active,
        DeleteMode::Purge => DeletedScope::WithDeleted,
    };
    let cases = repo::<Case>(&state, &firm)
        .with_deleted(case_scope)
        .count(&mut conn, json!({ "client_id": id.to_string() }))
        .await?;
    if cases > 0 {
        return Err(ApiError::conflict(format!(
            "Client is referenced by {} case(s); reassign or delete them first",
            cases
        )));
    }

    let removed = super::remove::<Client>(&state, &mut conn, &firm, &user, id, mode).await?;
    Ok(ApiResponse::success(removed))
}

pub async fn restore(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Client>> {
    user.require(Permission::ClientsWrite)?;
    user.require(Permission::RecordsRestore)?;
    let mut conn = tx.conn().await?;
    let restored = super::restore::<Client>(&state, &mut conn, &firm, &user, id).await?;
    Ok(ApiResponse::success(restored))
}

fn parse_type(value: &str) -> ApiResult<ClientType> {
    validation::one_of("client_type", value, ClientType::parse, "individual, organization")
}

fn optional_email(value: Option<&str>) -> ApiResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => validation::email("email", v).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_clearing_from_leaving() {
        let patch: ClientPatch = serde_json::from_value(json!({"phone": null, "name": "Acme"})).unwrap();
        assert_eq!(patch.phone, Some(None));
        assert_eq!(patch.email, None);
        assert_eq!(patch.name.as_deref(), Some("Acme"));
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let result: Result<ClientPatch, _> = serde_json::from_value(json!({"firm_id": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn blank_email_is_cleared() {
        assert_eq!(optional_email(Some("  ")).unwrap(), None);
        assert_eq!(optional_email(Some("A@B.co")).unwrap(), Some("a@b.co".to_string()));
        assert!(optional_email(Some("nope")).is_err());
    }
}
