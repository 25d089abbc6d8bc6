// handlers/protected/mod.rs - firm-scoped handlers under /api/*
//
// Every handler here runs after JWT, firm context and user validation.
// Mutating routes share the request transaction through `Tx`.

pub mod attachments;
pub mod audit;
pub mod auth;
pub mod cases;
pub mod clients;
pub mod firm;
pub mod tasks;
pub mod users;

use sqlx::PgConnection;
use uuid::Uuid;

use crate::audit::{snapshot, AuditAction, AuditEntry};
use crate::database::{Repository, Resource};
use crate::error::ApiResult;
use crate::middleware::{CurrentUser, DeleteMode, FirmContext};
use crate::state::AppState;

/// Repository bound to the request's firm
pub(crate) fn repo<T: Resource>(state: &AppState, firm: &FirmContext) -> Repository<T> {
    Repository::new(Some(firm.firm_id), state.limit_policy())
}

/// Soft delete or purge one record and write the matching audit row
pub(crate) async fn remove<T: Resource>(
    state: &AppState,
    conn: &mut PgConnection,
    firm: &FirmContext,
    user: &CurrentUser,
    id: Uuid,
    mode: DeleteMode,
) -> ApiResult<T> {
    let (record, action) = match mode {
        DeleteMode::Soft => (repo::<T>(state, firm).soft_delete(conn, id, user.id).await?, AuditAction::Delete),
        DeleteMode::Purge => (repo::<T>(state, firm).purge(conn, id).await?, AuditAction::Purge),
    };
    let mut entry = AuditEntry::new(action, T::ENTITY, id);
    if mode == DeleteMode::Purge {
        entry = entry.changes(snapshot(&record));
    }
    state.audit(conn, &user.actor(Some(firm.firm_id)), entry).await?;
    tracing::info!(firm_id = %firm.firm_id, user_id = %user.id, "{} {} {}", action.as_str(), T::ENTITY, id);
    Ok(record)
}

/// Bring a soft-deleted record back and audit it
pub(crate) async fn restore<T: Resource>(
    state: &AppState,
    conn: &mut PgConnection,
    firm: &FirmContext,
    user: &CurrentUser,
    id: Uuid,
) -> ApiResult<T> {
    let record = repo::<T>(state, firm).restore(conn, id).await?;
    state
        .audit(conn, &user.actor(Some(firm.firm_id)), AuditEntry::new(AuditAction::Restore, T::ENTITY, id))
        .await?;
    Ok(record)
}
