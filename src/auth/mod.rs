use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::User;

pub mod permissions;

pub use permissions::{resolve_permissions, Permission, PermissionSet, Role};

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,
    #[error("Authorization header must use Bearer token format")]
    MalformedHeader,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    Expired,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub firm_id: Option<Uuid>,
    pub role: String,
    #[serde(default)]
    pub super_admin: bool,
    /// Set on impersonation tokens to the SuperAdmin acting inside `firm_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonator: Option<Uuid>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn for_user(user: &User, expiry_hours: u64) -> Self {
        let now = Utc::now();
        Self {
            sub: user.id,
            firm_id: user.firm_id,
            role: user.role.clone(),
            super_admin: user.super_admin,
            impersonator: None,
            exp: (now + Duration::hours(expiry_hours as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Short-lived token that lets a SuperAdmin act inside `firm_id`
    pub fn impersonation(superadmin: &User, firm_id: Uuid, expiry_minutes: u64) -> Self {
        let now = Utc::now();
        Self {
            sub: superadmin.id,
            firm_id: Some(firm_id),
            role: superadmin.role.clone(),
            super_admin: true,
            impersonator: Some(superadmin.id),
            exp: (now + Duration::minutes(expiry_minutes as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn is_impersonation(&self) -> bool {
        self.impersonator.is_some()
    }

    /// Same identity with a fresh expiry. Impersonation keeps its short lifetime.
    pub fn refreshed(&self, expiry_hours: u64, impersonation_minutes: u64) -> Self {
        let now = Utc::now();
        let ttl = if self.is_impersonation() {
            Duration::minutes(impersonation_minutes as i64)
        } else {
            Duration::hours(expiry_hours as i64)
        };
        Self {
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            ..self.clone()
        }
    }

    /// Seconds until expiry, as reported to clients
    pub fn expires_in(&self) -> i64 {
        (self.exp - self.iat).max(0)
    }
}

pub fn issue_token(claims: &Claims, secret: &str) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::TokenGeneration("JWT secret not configured".to_string()));
    }
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => {
            tracing::debug!("Rejected JWT: {}", e);
            AuthError::InvalidToken
        }
    })?;
    Ok(data.claims)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedHeader)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Hashing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn claims(exp_offset: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: Uuid::new_v4(),
            firm_id: Some(Uuid::new_v4()),
            role: "attorney".to_string(),
            super_admin: false,
            impersonator: None,
            exp: now + exp_offset,
            iat: now,
        }
    }

    #[test]
    fn token_round_trips_claims() {
        let original = claims(3600);
        let token = issue_token(&original, SECRET).unwrap();
        assert_eq!(decode_token(&token, SECRET).unwrap(), original);
    }

    #[test]
    fn wrong_secret_and_expiry_are_distinguished() {
        let token = issue_token(&claims(3600), SECRET).unwrap();
        assert_eq!(decode_token(&token, "other").unwrap_err(), AuthError::InvalidToken);

        let expired = issue_token(&claims(-3600), SECRET).unwrap();
        assert_eq!(decode_token(&expired, SECRET).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(None).unwrap_err(), AuthError::MissingToken);
        assert_eq!(bearer_token(Some("Basic abc")).unwrap_err(), AuthError::MalformedHeader);
        assert_eq!(bearer_token(Some("Bearer   ")).unwrap_err(), AuthError::MalformedHeader);
    }

    #[test]
    fn refresh_keeps_impersonation_short() {
        let mut c = claims(60);
        c.impersonator = Some(c.sub);
        let refreshed = c.refreshed(24, 30);
        assert_eq!(refreshed.expires_in(), 30 * 60);
        assert_eq!(refreshed.impersonator, c.impersonator);
    }

    #[test]
    fn password_hashing_verifies() {
        let hash = hash_password("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
