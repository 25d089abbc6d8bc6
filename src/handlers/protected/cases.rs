// handlers/protected/cases.rs - /api/cases

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::audit::{diff_records, snapshot, AuditAction, AuditEntry};
use crate::auth::Permission;
use crate::database::models::case::closed_at_transition;
use crate::database::models::{Attachment, Case, CaseStatus, Task};
use crate::database::{Changeset, Page};
use crate::error::{ApiError, ApiResult};
use crate::filter::{DeletedScope, FilterData};
use crate::handlers::{double_option, Conditions, JsonBody, PathId};
use crate::middleware::{ApiResponse, CurrentUser, DeleteMode, DeletedFlags, FirmContext, ListParams, Tx};
use crate::services::{case_service, validation};
use crate::state::AppState;

use super::repo;

const STATUSES: &str = "open, pending, closed, archived";

/// GET /api/cases
pub async fn list(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    list: ListParams,
) -> ApiResult<ApiResponse<Page<Case>>> {
    user.require(Permission::CasesRead)?;
    let conditions = Conditions::new()
        .one_of("status", list.param("status"), &["open", "pending", "closed", "archived"])?
        .uuid("client_id", list.param("client_id"))?
        .contains("assigned_to", list.param("assigned_to"))?
        .text("practice_area", list.param("practice_area"))
        .into_value();

    let mut conn = state.db.acquire().await?;
    let page = repo::<Case>(&state, &firm)
        .with_deleted(list.deleted)
        .page(&mut conn, &list, conditions)
        .await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/cases/find
pub async fn find(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    DeletedFlags(deleted): DeletedFlags,
    JsonBody(filter): JsonBody<FilterData>,
) -> ApiResult<ApiResponse<Page<Case>>> {
    user.require(Permission::CasesRead)?;
    let mut conn = state.db.acquire().await?;
    let page = repo::<Case>(&state, &firm).with_deleted(deleted).find(&mut conn, filter).await?;
    Ok(ApiResponse::success(page))
}

pub async fn show(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    DeletedFlags(deleted): DeletedFlags,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Case>> {
    user.require(Permission::CasesRead)?;
    let mut conn = state.db.acquire().await?;
    let record = repo::<Case>(&state, &firm).with_deleted(deleted).select_404(&mut conn, id).await?;
    Ok(ApiResponse::success(record))
}

/// GET /api/cases/:id/tasks
pub async fn tasks(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    list: ListParams,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Page<Task>>> {
    user.require(Permission::CasesRead)?;
    user.require(Permission::TasksRead)?;
    let mut conn = state.db.acquire().await?;
    repo::<Case>(&state, &firm).select_404(&mut conn, id).await?;

    let case_id = id.to_string();
    let conditions = Conditions::new()
        .one_of("status", list.param("status"), &["todo", "in_progress", "done", "cancelled"])?
        .uuid("case_id", Some(&case_id))?
        .into_value();

    let page = repo::<Task>(&state, &firm)
        .with_deleted(list.deleted)
        .page(&mut conn, &list, conditions)
        .await?;
    Ok(ApiResponse::success(page))
}

#[derive(Debug, Deserialize)]
pub struct NewCase {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub practice_area: Option<String>,
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_to: Vec<Uuid>,
    pub opened_at: Option<DateTime<Utc>>,
}

pub async fn create(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    JsonBody(req): JsonBody<NewCase>,
) -> ApiResult<ApiResponse<Case>> {
    user.require(Permission::CasesWrite)?;
    let title = validation::required_text("title", &req.title, 300)?;
    let status = match req.status.as_deref() {
        Some(s) => parse_status(s)?,
        None => CaseStatus::Open,
    };
    let now = Utc::now();
    let policy = state.limit_policy();

    let mut conn = tx.conn().await?;
    if let Some(client_id) = req.client_id {
        case_service::ensure_client(&mut conn, firm.firm_id, client_id).await?;
    }
    let assigned_to = dedup(req.assigned_to);
    case_service::ensure_members(&mut conn, firm.firm_id, "assigned_to", &assigned_to, policy).await?;
    let case_number = case_service::next_case_number(&mut conn, firm.firm_id, now).await?;

    let changes = Changeset::new()
        .set("case_number", case_number)
        .set("title", title)
        .set("description", validation::optional_text("description", req.description.as_deref(), 20_000)?)
        .set("status", status)
        .set("practice_area", validation::optional_text("practice_area", req.practice_area.as_deref(), 100)?)
        .set("client_id", req.client_id)
        .set("assigned_to", assigned_to)
        .set("opened_at", req.opened_at.unwrap_or(now))
        .set("closed_at", (status == CaseStatus::Closed).then_some(now))
        .set("created_by", user.id);

    let case = repo::<Case>(&state, &firm).insert(&mut conn, changes).await?;
    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Create, "case", case.id).changes(snapshot(&case)),
        )
        .await?;
    tracing::info!(firm_id = %firm.firm_id, case_id = %case.id, case_number = %case.case_number, "Case opened");
    Ok(ApiResponse::created(case))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CasePatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub practice_area: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub client_id: Option<Option<Uuid>>,
    pub assigned_to: Option<Vec<Uuid>>,
    pub opened_at: Option<DateTime<Utc>>,
}

pub async fn update(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
    JsonBody(patch): JsonBody<CasePatch>,
) -> ApiResult<ApiResponse<Case>> {
    user.require(Permission::CasesWrite)?;
    let status = patch.status.as_deref().map(parse_status).transpose()?;
    let policy = state.limit_policy();

    let mut changes = Changeset::new();
    if let Some(title) = &patch.title {
        changes.push("title", validation::required_text("title", title, 300)?);
    }
    if let Some(description) = &patch.description {
        changes.push(
            "description",
            validation::optional_text("description", description.as_deref(), 20_000)?,
        );
    }
    if let Some(area) = &patch.practice_area {
        changes.push("practice_area", validation::optional_text("practice_area", area.as_deref(), 100)?);
    }
    if let Some(opened_at) = patch.opened_at {
        changes.push("opened_at", opened_at);
    }

    let mut conn = tx.conn().await?;
    let cases = repo::<Case>(&state, &firm);
    let before = cases.select_404(&mut conn, id).await?;

    if let Some(client_id) = patch.client_id {
        if let Some(client_id) = client_id {
            case_service::ensure_client(&mut conn, firm.firm_id, client_id).await?;
        }
        changes.push("client_id", client_id);
    }
    if let Some(assigned_to) = patch.assigned_to {
        let assigned_to = dedup(assigned_to);
        case_service::ensure_members(&mut conn, firm.firm_id, "assigned_to", &assigned_to, policy).await?;
        changes.push("assigned_to", assigned_to);
    }
    if let Some(status) = status {
        changes.push("status", status);
        if let Some(closed_at) = closed_at_transition(&before.status, status, Utc::now()) {
            changes.push("closed_at", closed_at);
        }
    }

    let after = cases.update(&mut conn, id, changes).await?;
    if before.status != after.status {
        tracing::info!(case_id = %id, "Case status {} -> {}", before.status, after.status);
    }
    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Update, "case", id).changes(diff_records(&before, &after)),
        )
        .await?;
    Ok(ApiResponse::success(after))
}

/// A purge needs the case's tasks and attachments purged first
pub async fn delete(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    mode: DeleteMode,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Case>> {
    user.require(Permission::CasesWrite)?;
    let mut conn = tx.conn().await?;

    if mode == DeleteMode::Purge {
        let by_case = json!({ "case_id": id.to_string() });
        let tasks = repo::<Task>(&state, &firm)
            .with_deleted(DeletedScope::WithDeleted)
            .count(&mut conn, by_case.clone())
            .await?;
        let attachments = repo::<Attachment>(&state, &firm)
            .with_deleted(DeletedScope::WithDeleted)
            .count(&mut conn, by_case)
            .await?;
        if tasks + attachments > 0 {
            return Err(ApiError::conflict(format!(
                "Case still has {} task(s) and {} attachment(s); purge them first",
                tasks, attachments
            )));
        }
    }

    let removed = super::remove::<Case>(&state, &mut conn, &firm, &user, id, mode).await?;
    Ok(ApiResponse::success(removed))
}

pub async fn restore(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Case>> {
    user.require(Permission::CasesWrite)?;
    user.require(Permission::RecordsRestore)?;
    let mut conn = tx.conn().await?;
    let restored = super::restore::<Case>(&state, &mut conn, &firm, &user, id).await?;
    Ok(ApiResponse::success(restored))
}

fn parse_status(value: &str) -> ApiResult<CaseStatus> {
    validation::one_of("status", value, CaseStatus::parse, STATUSES)
}

fn dedup(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignees_keep_first_occurrence_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(dedup(vec![a, b, a, b]), vec![a, b]);
    }

    #[test]
    fn patch_can_unlink_client() {
        let patch: CasePatch = serde_json::from_value(json!({"client_id": null})).unwrap();
        assert_eq!(patch.client_id, Some(None));
        let patch: CasePatch = serde_json::from_value(json!({"title": "Renamed"})).unwrap();
        assert_eq!(patch.client_id, None);
    }

    #[test]
    fn status_values_are_checked() {
        assert_eq!(parse_status("pending").unwrap(), CaseStatus::Pending);
        let err = parse_status("won").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
