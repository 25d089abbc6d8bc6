use std::collections::HashMap;
use std::ops::Deref;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};

use crate::auth::Permission;
use crate::error::ApiError;
use crate::filter::{list::deleted_scope, DeletedScope, ListQuery};
use crate::middleware::validate_user::CurrentUser;

/// List parameters with a permission-checked soft-delete scope
#[derive(Debug, Clone)]
pub struct ListParams(pub ListQuery);

impl Deref for ListParams {
    type Target = ListQuery;

    fn deref(&self) -> &ListQuery {
        &self.0
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ListParams {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = query_params(parts, state).await?;
        let list = ListQuery::from_params(params)?;
        require_scope(parts, list.deleted)?;
        Ok(ListParams(list))
    }
}

/// Deleted scope for single-record reads (`GET /:id?include_deleted=true`)
#[derive(Debug, Clone, Copy)]
pub struct DeletedFlags(pub DeletedScope);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for DeletedFlags {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = query_params(parts, state).await?;
        let scope = deleted_scope(&params)?;
        require_scope(parts, scope)?;
        Ok(DeletedFlags(scope))
    }
}

/// How a DELETE is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Soft,
    /// `?permanent=true`, gated by `records:purge`
    Purge,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for DeleteMode {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = query_params(parts, state).await?;
        let permanent = matches!(
            params.get("permanent").map(|s| s.trim().to_ascii_lowercase()).as_deref(),
            Some("true") | Some("1") | Some("yes")
        );
        if !permanent {
            return Ok(DeleteMode::Soft);
        }
        current_user(parts)?.require(Permission::RecordsPurge)?;
        Ok(DeleteMode::Purge)
    }
}

async fn query_params<S: Send + Sync>(parts: &mut Parts, state: &S) -> Result<HashMap<String, String>, ApiError> {
    let Query(params) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid query string: {}", e)))?;
    Ok(params)
}

fn current_user(parts: &Parts) -> Result<&CurrentUser, ApiError> {
    parts
        .extensions
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::unauthorized("Authenticated user missing from request"))
}

/// Anything but the default scope needs `records:view_deleted`
fn require_scope(parts: &Parts, scope: DeletedScope) -> Result<(), ApiError> {
    if scope == DeletedScope::Active {
        return Ok(());
    }
    current_user(parts)?.require(Permission::RecordsViewDeleted)
}
