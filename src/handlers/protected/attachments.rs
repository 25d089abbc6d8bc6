// handlers/protected/attachments.rs - attachment metadata, upload and download
//
// Uploads are raw bodies: `Content-Type` is the file's type and
// `X-File-Name` carries its name.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::audit::{snapshot, AuditAction, AuditEntry};
use crate::auth::Permission;
use crate::database::models::{Attachment, Case};
use crate::database::{Changeset, Page};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{Conditions, PathId};
use crate::middleware::{ApiResponse, CurrentUser, DeleteMode, DeletedFlags, FirmContext, ListParams, Tx};
use crate::storage::attachment_key;
use crate::state::AppState;

use super::repo;

pub const FILE_NAME_HEADER: &str = "x-file-name";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// GET /api/cases/:id/attachments
pub async fn list_for_case(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    list: ListParams,
    PathId(case_id): PathId,
) -> ApiResult<ApiResponse<Page<Attachment>>> {
    user.require(Permission::AttachmentsRead)?;
    let mut conn = state.db.acquire().await?;
    repo::<Case>(&state, &firm).select_404(&mut conn, case_id).await?;

    let case_id = case_id.to_string();
    let conditions = Conditions::new()
        .uuid("case_id", Some(&case_id))?
        .text("content_type", list.param("content_type"))
        .into_value();
    let page = repo::<Attachment>(&state, &firm)
        .with_deleted(list.deleted)
        .page(&mut conn, &list, conditions)
        .await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/cases/:id/attachments
pub async fn upload(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(case_id): PathId,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<ApiResponse<Attachment>> {
    user.require(Permission::AttachmentsWrite)?;
    let file_name = file_name(&headers)?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let limit = state.config.storage.max_upload_bytes;
    let bytes = to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::payload_too_large(format!("Attachment exceeds {} bytes", limit)))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Attachment body is empty"));
    }

    let mut conn = tx.conn().await?;
    repo::<Case>(&state, &firm).select_404(&mut conn, case_id).await?;

    let id = Uuid::new_v4();
    let key = attachment_key(firm.firm_id, id);
    let changes = Changeset::new()
        .set("id", id)
        .set("case_id", case_id)
        .set("file_name", file_name)
        .set("content_type", content_type.clone())
        .set("size_bytes", bytes.len() as i64)
        .set("storage_key", key.clone())
        .set("checksum", checksum(&bytes))
        .set("uploaded_by", user.id);
    let attachment = repo::<Attachment>(&state, &firm).insert(&mut conn, changes).await?;

    // TODO: sweep blobs left behind when the transaction rolls back after this put
    state.storage.put(&key, bytes.to_vec(), &content_type).await?;

    state
        .audit(
            &mut conn,
            &user.actor(Some(firm.firm_id)),
            AuditEntry::new(AuditAction::Create, "attachment", id).changes(snapshot(&attachment)),
        )
        .await?;
    tracing::info!(
        firm_id = %firm.firm_id,
        case_id = %case_id,
        attachment_id = %id,
        size = attachment.size_bytes,
        storage = state.storage.name(),
        "Attachment stored"
    );
    Ok(ApiResponse::created(attachment))
}

/// GET /api/attachments/:id
pub async fn show(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    DeletedFlags(deleted): DeletedFlags,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Attachment>> {
    user.require(Permission::AttachmentsRead)?;
    let mut conn = state.db.acquire().await?;
    let record = repo::<Attachment>(&state, &firm).with_deleted(deleted).select_404(&mut conn, id).await?;
    Ok(ApiResponse::success(record))
}

/// GET /api/attachments/:id/content
pub async fn content(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    PathId(id): PathId,
) -> ApiResult<Response> {
    user.require(Permission::AttachmentsRead)?;
    let mut conn = state.db.acquire().await?;
    let attachment = repo::<Attachment>(&state, &firm).select_404(&mut conn, id).await?;
    drop(conn);

    let bytes = state.storage.get(&attachment.storage_key).await?;
    let content_type = HeaderValue::from_str(&attachment.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = HeaderValue::from_str(&content_disposition(&attachment.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CONTENT_DISPOSITION, disposition),
            (CONTENT_LENGTH, HeaderValue::from(bytes.len())),
        ],
        bytes,
    )
        .into_response())
}

/// DELETE /api/attachments/:id. A purge also removes the stored blob once
/// the row's deletion has committed.
pub async fn delete(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    mode: DeleteMode,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Attachment>> {
    user.require(Permission::AttachmentsWrite)?;
    let mut conn = tx.conn().await?;
    let removed = super::remove::<Attachment>(&state, &mut conn, &firm, &user, id, mode).await?;
    if mode == DeleteMode::Purge {
        let storage = state.storage.clone();
        let key = removed.storage_key.clone();
        tx.after_commit(async move {
            match storage.delete(&key).await {
                Ok(()) => tracing::info!(attachment_id = %id, "Attachment blob deleted"),
                Err(e) => tracing::warn!(attachment_id = %id, "Failed to delete attachment blob {}: {}", key, e),
            }
        });
    }
    Ok(ApiResponse::success(removed))
}

pub async fn restore(
    State(state): State<AppState>,
    firm: FirmContext,
    user: CurrentUser,
    tx: Tx,
    PathId(id): PathId,
) -> ApiResult<ApiResponse<Attachment>> {
    user.require(Permission::AttachmentsWrite)?;
    user.require(Permission::RecordsRestore)?;
    let mut conn = tx.conn().await?;
    let restored = super::restore::<Attachment>(&state, &mut conn, &firm, &user, id).await?;
    Ok(ApiResponse::success(restored))
}

fn file_name(headers: &HeaderMap) -> ApiResult<String> {
    let raw = headers
        .get(FILE_NAME_HEADER)
        .ok_or_else(|| ApiError::bad_request("X-File-Name header is required"))?
        .to_str()
        .map_err(|_| ApiError::bad_request("X-File-Name must be visible ASCII"))?;
    // Keep the last path segment only
    let name = raw.rsplit(&['/', '\\'][..]).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ApiError::bad_request("X-File-Name must name a file"));
    }
    if name.chars().count() > 255 {
        return Err(ApiError::bad_request("X-File-Name must be at most 255 characters"));
    }
    Ok(name.to_string())
}

pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(name: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FILE_NAME_HEADER, HeaderValue::from_str(name).unwrap());
        headers
    }

    #[test]
    fn file_names_drop_directories() {
        assert_eq!(file_name(&headers("engagement.pdf")).unwrap(), "engagement.pdf");
        assert_eq!(file_name(&headers("../../etc/passwd")).unwrap(), "passwd");
        assert_eq!(file_name(&headers("C:\\docs\\brief.docx")).unwrap(), "brief.docx");
        assert!(file_name(&headers("docs/")).is_err());
        assert!(file_name(&HeaderMap::new()).is_err());
    }

    #[test]
    fn checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn disposition_quotes_are_escaped() {
        assert_eq!(content_disposition("a\"b.pdf"), "attachment; filename=\"a_b.pdf\"");
    }
}
