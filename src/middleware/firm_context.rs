use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Claims;
use crate::database::models::Firm;
use crate::database::Repository;
use crate::error::ApiError;
use crate::state::AppState;

pub const FIRM_HEADER: &str = "x-firm-id";
pub const FIRM_QUERY_PARAM: &str = "firm_id";

#[derive(Debug, Error, PartialEq)]
pub enum FirmResolutionError {
    #[error("X-Firm-Id header and firm_id query parameter disagree")]
    Ambiguous,
    #[error("Firm id '{0}' is not a valid UUID")]
    Malformed(String),
    #[error("Token is not bound to a firm")]
    MissingFirmClaim,
    #[error("Token is bound to firm {token}, not {requested}")]
    Mismatch { token: Uuid, requested: Uuid },
    #[error("SuperAdmin requests must name a firm via X-Firm-Id or firm_id")]
    FirmRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmSource {
    /// The caller's own firm from the token
    Token,
    /// A SuperAdmin naming the firm explicitly
    Explicit,
    /// A SuperAdmin impersonation token
    Impersonation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFirm {
    pub firm_id: Uuid,
    pub source: FirmSource,
}

/// Decide which firm a request acts in, before touching the database
pub fn resolve_firm(
    claims: &Claims,
    header: Option<&str>,
    query: Option<&str>,
) -> Result<ResolvedFirm, FirmResolutionError> {
    let header = header.map(str::trim).filter(|s| !s.is_empty());
    let query = query.map(str::trim).filter(|s| !s.is_empty());

    let explicit = match (header, query) {
        (Some(h), Some(q)) if !h.eq_ignore_ascii_case(q) => return Err(FirmResolutionError::Ambiguous),
        (Some(v), _) | (None, Some(v)) => Some(
            Uuid::parse_str(v).map_err(|_| FirmResolutionError::Malformed(v.to_string()))?,
        ),
        (None, None) => None,
    };

    if !claims.super_admin {
        let token_firm = claims.firm_id.ok_or(FirmResolutionError::MissingFirmClaim)?;
        return bound_to(token_firm, explicit, FirmSource::Token);
    }

    if claims.is_impersonation() {
        let token_firm = claims.firm_id.ok_or(FirmResolutionError::MissingFirmClaim)?;
        return bound_to(token_firm, explicit, FirmSource::Impersonation);
    }

    explicit
        .map(|firm_id| ResolvedFirm {
            firm_id,
            source: FirmSource::Explicit,
        })
        .ok_or(FirmResolutionError::FirmRequired)
}

fn bound_to(token_firm: Uuid, explicit: Option<Uuid>, source: FirmSource) -> Result<ResolvedFirm, FirmResolutionError> {
    match explicit {
        Some(requested) if requested != token_firm => Err(FirmResolutionError::Mismatch {
            token: token_firm,
            requested,
        }),
        _ => Ok(ResolvedFirm {
            firm_id: token_firm,
            source,
        }),
    }
}

/// The firm a request operates in, injected by `firm_context_middleware`
#[derive(Debug, Clone, Serialize)]
pub struct FirmContext {
    pub firm_id: Uuid,
    pub firm_name: String,
    pub firm_status: String,
    pub source: FirmSource,
    pub impersonator: Option<Uuid>,
}

pub async fn firm_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before firm resolution"))?;

    let header = request
        .headers()
        .get(FIRM_HEADER)
        .map(|v| v.to_str().unwrap_or("<non-ascii>").to_string());
    let query = request.uri().query().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == FIRM_QUERY_PARAM)
            .map(|(_, v)| v.into_owned())
    });

    let resolved = resolve_firm(&claims, header.as_deref(), query.as_deref()).map_err(|e| {
        if matches!(e, FirmResolutionError::Mismatch { .. }) {
            tracing::warn!(user_id = %claims.sub, "Firm mismatch: {}", e);
        }
        e
    })?;

    let mut conn = state.db.acquire().await?;
    let firm = Repository::<Firm>::new(None, state.limit_policy())
        .select_id(&mut conn, resolved.firm_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Firm {} not found", resolved.firm_id)))?;
    drop(conn);

    if firm.is_suspended() && !claims.super_admin {
        tracing::warn!(firm_id = %firm.id, user_id = %claims.sub, "Request rejected for suspended firm");
        return Err(ApiError::forbidden("Firm is suspended"));
    }

    if resolved.source == FirmSource::Impersonation {
        tracing::warn!(
            firm_id = %firm.id,
            impersonator = ?claims.impersonator,
            "{} {} under impersonation",
            request.method(),
            request.uri().path()
        );
    }

    request.extensions_mut().insert(FirmContext {
        firm_id: firm.id,
        firm_name: firm.name,
        firm_status: firm.status,
        source: resolved.source,
        impersonator: claims.impersonator,
    });

    Ok(next.run(request).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for FirmContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<FirmContext>()
            .cloned()
            .ok_or_else(|| ApiError::internal_server_error("Firm context missing from request"))
    }
}
