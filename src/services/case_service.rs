use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::database::models::case::format_case_number;
use crate::database::models::User;
use crate::database::{DatabaseError, Repository};
use crate::error::ApiError;
use crate::filter::LimitPolicy;

/// Allocate the next `YYYY-NNNN` number for a firm. The counter row is
/// locked by the upsert until the surrounding transaction ends.
pub async fn next_case_number(conn: &mut PgConnection, firm_id: Uuid, now: DateTime<Utc>) -> Result<String, DatabaseError> {
    let counter = format!("case_number:{}", now.year());
    let row = sqlx::query(
        "INSERT INTO firm_counters (firm_id, name, value) VALUES ($1, $2, 1) \
         ON CONFLICT (firm_id, name) DO UPDATE SET value = firm_counters.value + 1 \
         RETURNING value",
    )
    .bind(firm_id)
    .bind(&counter)
    .fetch_one(conn)
    .await?;
    let value: i64 = row.try_get("value")?;
    Ok(format_case_number(now, value))
}

/// The client must be live and in the same firm. The row stays share-locked
/// until the transaction ends, so a concurrent client delete waits for it.
pub async fn ensure_client(conn: &mut PgConnection, firm_id: Uuid, client_id: Uuid) -> Result<(), ApiError> {
    sqlx::query("SELECT 1 FROM clients WHERE id = $1 AND firm_id = $2 AND deleted_at IS NULL FOR SHARE")
        .bind(client_id)
        .bind(firm_id)
        .fetch_optional(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::invalid_field("client_id", "must reference an existing client of this firm"))
}

/// Taken before a client delete counts the cases that reference it
pub async fn lock_client(conn: &mut PgConnection, firm_id: Uuid, client_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1 FROM clients WHERE id = $1 AND firm_id = $2 FOR UPDATE")
        .bind(client_id)
        .bind(firm_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Every user id must be a live member of the firm
pub async fn ensure_members(
    conn: &mut PgConnection,
    firm_id: Uuid,
    field: &str,
    user_ids: &[Uuid],
    policy: LimitPolicy,
) -> Result<(), ApiError> {
    if user_ids.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = user_ids.iter().map(Uuid::to_string).collect();
    let found = Repository::<User>::new(Some(firm_id), policy)
        .count(conn, json!({ "id": { "$in": ids } }))
        .await?;
    let mut distinct = user_ids.to_vec();
    distinct.sort();
    distinct.dedup();
    if found != distinct.len() as i64 {
        return Err(ApiError::invalid_field(field, "must reference users of this firm"));
    }
    Ok(())
}
