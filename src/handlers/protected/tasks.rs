// handlers/protected/tasks.rs - /api/tasks

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::audit::{diff_records, snapshot, AuditAction, AuditEntry};
use crate::auth::Permission;
use crate::database::models::task::completed_at_transition;
use crate::database::models::{Case, Task, TaskPriority, TaskStatus};
use crate::database::{Changeset, Page};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{double_option, Conditions, JsonBody, PathId};
use crate::middleware::{ApiResponse, CurrentUser, DeleteMode, DeletedFlags, FirmContext, ListParams, Tx};
use crate::services::{case_service, validation};
use crate::state::AppState;

use super::repo;

/// GET /api/tasks
pub async fn list(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    list: ListParams,
) -> ApiResult<ApiResponse<Page<Task>>> {
    user.require(Permission::TasksRead)?;
    let conditions = Conditions::new()
        .one_of("status", list.param("status"), &["todo", "in_progress", "done", "cancelled"])?
        .one_of("priority", list.param("priority"), &["low", "medium", "high", "urgent"])?
        .uuid("assigned_to", list.param("assigned_to"))?
        .uuid("case_id", list.param("case_id"))?
        .before("due_date", "due_before", list.param("due_before"))?
        .into_value();

    let mut conn = state.db.acquire().await?;
    let page = repo::<Task>(&state, &firm)
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
) -> ApiResult<ApiResponse<Task>> {
    user.require(Permission::TasksRead)?;
    let mut conn = state.db.acquire().await?;
    let record = repo::<Task>(&state, &firm).with_deleted(deleted).select_404(&mut conn, id).await?;
    Ok(ApiResponse::success(record))
}

#[derive(Debug, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub case_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
}

pub async fn create(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    JsonBody(req): JsonBody<NewTask>,
) -> ApiResult<ApiResponse<Task>> {
    user.require(Permission::TasksWrite)?;
    let title = validation::required_text("title", &req.title, 300)?;
    let status = match req.status.as_deref() {
        Some(s) => parse_status(s)?,
        None => TaskStatus::Todo,
    };
    let priority = match req.priority.as_deref() {
        Some(p) => parse_priority(p)?,
        None => TaskPriority::Medium,
    };

    let mut conn = tx.conn().await?;
    check_links(&state, &mut conn, &firm, req.case_id, req.assigned_to).await?;

    let now = Utc::now();
    let changes = Changeset::new()
        .set("title", title)
        .set("description", validation::optional_text("description", req.description.as_deref(), 20_000)?)
        .set("status", status)
        .set("priority", priority)
        .set("due_date", req.due_date)
        .set("case_id", req.case_id)
        .set("assigned_to", req.assigned_to)
        .set("completed_at", (status == TaskStatus::Done).then_some(now))
        .set("created_by", user.id);

    let task = repo::<Task>(&state, &firm).insert(&mut conn, changes).await?;
    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Create, "task", task.id).changes(snapshot(&task)),
        )
        .await?;
    Ok(ApiResponse::created(task))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub case_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,
}

pub async fn update(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
    JsonBody(patch): JsonBody<TaskPatch>,
) -> ApiResult<ApiResponse<Task>> {
    user.require(Permission::TasksWrite)?;
    let status = patch.status.as_deref().map(parse_status).transpose()?;
    let priority = patch.priority.as_deref().map(parse_priority).transpose()?;

    let mut changes = Changeset::new().maybe("priority", priority).maybe("due_date", patch.due_date);
    if let Some(title) = &patch.title {
        changes.push("title", validation::required_text("title", title, 300)?);
    }
    if let Some(description) = &patch.description {
        changes.push(
            "description",
            validation::optional_text("description", description.as_deref(), 20_000)?,
        );
    }

    let mut conn = tx.conn().await?;
    let tasks = repo::<Task>(&state, &firm);
    let before = tasks.select_404(&mut conn, id).await?;

    check_links(&state, &mut conn, &firm, patch.case_id.flatten(), patch.assigned_to.flatten()).await?;
    changes = changes.maybe("case_id", patch.case_id).maybe("assigned_to", patch.assigned_to);
    if let Some(status) = status {
        changes.push("status", status);
        if let Some(completed_at) = completed_at_transition(&before.status, status, Utc::now()) {
            changes.push("completed_at", completed_at);
        }
    }

    let after = tasks.update(&mut conn, id, changes).await?;
    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Update, "task", id).changes(diff_records(&before, &after)),
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
) -> ApiResult<ApiResponse<Task>> {
    user.require(Permission::TasksWrite)?;
    let mut conn = tx.conn().await?;
    let removed = super::remove::<Task>(&state, &mut conn, &firm, &user, id, mode).await?;
    Ok(ApiResponse::success(removed))
}

pub async fn restore(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Task>> {
    user.require(Permission::TasksWrite)?;
    user.require(Permission::RecordsRestore)?;
    let mut conn = tx.conn().await?;
    let restored = super::restore::<Task>(&state, &mut conn, &firm, &user, id).await?;
    Ok(ApiResponse::success(restored))
}

/// The case and assignee, when given, must be live and in this firm
async fn check_links(
    state: &AppState,
    conn: &mut PgConnection,
    firm: &FirmContext,
    case_id: Option<Uuid>,
    assigned_to: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(case_id) = case_id {
        repo::<Case>(state, firm)
            .select_id(conn, case_id)
            .await?
            .ok_or_else(|| ApiError::invalid_field("case_id", "must reference an existing case of this firm"))?;
    }
    if let Some(user_id) = assigned_to {
        case_service::ensure_members(conn, firm.firm_id, "assigned_to", &[user_id], state.limit_policy()).await?;
    }
    Ok(())
}

fn parse_status(value: &str) -> ApiResult<TaskStatus> {
    validation::one_of("status", value, TaskStatus::parse, "todo, in_progress, done, cancelled")
}

fn parse_priority(value: &str) -> ApiResult<TaskPriority> {
    validation::one_of("priority", value, TaskPriority::parse, "low, medium, high, urgent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_can_clear_due_date() {
        let patch: TaskPatch = serde_json::from_value(json!({"due_date": null})).unwrap();
        assert_eq!(patch.due_date, Some(None));
        let patch: TaskPatch = serde_json::from_value(json!({"due_date": "2024-06-01T09:00:00Z"})).unwrap();
        assert!(matches!(patch.due_date, Some(Some(_))));
    }

    #[test]
    fn priorities_are_checked() {
        assert_eq!(parse_priority("urgent").unwrap(), TaskPriority::Urgent);
        assert!(parse_priority("asap").is_err());
    }
}
