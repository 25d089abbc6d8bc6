// handlers/elevated/stats.rs - GET /api/admin/stats

use std::collections::BTreeMap;

use axum::extract::State;
use serde_json::{json, Value};
use sqlx::PgConnection;

use crate::database::DatabaseError;
use crate::error::ApiResult;
use crate::middleware::ApiResponse;
use crate::state::AppState;

/// Platform-wide counts of live records
pub async fn stats(State(state): State<AppState>) -> ApiResult<ApiResponse<Value>> {
    let mut conn = state.db.acquire().await?;

    let firms = grouped(&mut conn, "SELECT status, COUNT(*) FROM firms WHERE deleted_at IS NULL GROUP BY status").await?;
    let cases = grouped(&mut conn, "SELECT status, COUNT(*) FROM cases WHERE deleted_at IS NULL GROUP BY status").await?;
    let tasks = grouped(&mut conn, "SELECT status, COUNT(*) FROM tasks WHERE deleted_at IS NULL GROUP BY status").await?;
    let users = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL AND super_admin = false",
    )
    .await?;
    let superadmins = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL AND super_admin = true",
    )
    .await?;
    let clients = scalar(&mut conn, "SELECT COUNT(*) FROM clients WHERE deleted_at IS NULL").await?;
    let attachments = scalar(
        &mut conn,
        "SELECT COUNT(*) FROM attachments WHERE deleted_at IS NULL",
    )
    .await?;

    Ok(ApiResponse::success(json!({
        "firms": with_total(firms),
        "users": users,
        "superadmins": superadmins,
        "clients": clients,
        "cases": with_total(cases),
        "tasks": with_total(tasks),
        "attachments": attachments,
    })))
}

async fn grouped(conn: &mut PgConnection, sql: &str) -> Result<BTreeMap<String, i64>, DatabaseError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(conn).await?;
    Ok(rows.into_iter().collect())
}

async fn scalar(conn: &mut PgConnection, sql: &str) -> Result<i64, DatabaseError> {
    let (count,): (i64,) = sqlx::query_as(sql).fetch_one(conn).await?;
    Ok(count)
}

fn with_total(by_status: BTreeMap<String, i64>) -> Value {
    let total: i64 = by_status.values().sum();
    json!({ "total": total, "by_status": by_status })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_every_status() {
        let counts = BTreeMap::from([("active".to_string(), 3), ("suspended".to_string(), 1)]);
        assert_eq!(
            with_total(counts),
            json!({"total": 4, "by_status": {"active": 3, "suspended": 1}})
        );
    }
}
