use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::auth::{bearer_token, decode_token, Claims};
use crate::error::ApiError;
use crate::state::AppState;

/// JWT authentication middleware that validates tokens and injects `Claims`
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default());
    let token = bearer_token(header)?;
    let claims = decode_token(token, &state.config.security.jwt_secret)?;

    tracing::debug!(user_id = %claims.sub, firm_id = ?claims.firm_id, "JWT accepted");
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Rejects tokens without SuperAdmin rights on the `/api/admin` tier
pub async fn require_superadmin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required"))?;

    if !claims.super_admin {
        tracing::warn!(user_id = %claims.sub, "Non-SuperAdmin attempted to reach the admin console");
        return Err(ApiError::forbidden("SuperAdmin access required"));
    }
    if claims.is_impersonation() {
        return Err(ApiError::forbidden("Impersonation tokens cannot use the admin console"));
    }

    Ok(next.run(request).await)
}
