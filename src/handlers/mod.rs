// handlers/mod.rs - tiered handler layout
//
// public    (no auth)            /, /health, /auth/*
// session   (JWT, no firm)       /api/auth/*
// protected (JWT + firm context) /api/*
// elevated  (SuperAdmin JWT)     /api/admin/*

pub mod elevated;
pub mod protected;
pub mod public;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ApiError;

/// JSON request body whose rejections use the API error envelope
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => {
                Err(ApiError::bad_request("Expected Content-Type: application/json"))
            }
            Err(e) => Err(ApiError::invalid_json(e.body_text())),
        }
    }
}

/// `:id` path segment parsed as a UUID
pub struct PathId(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PathId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Uuid::parse_str(&raw)
            .map(PathId)
            .map_err(|_| ApiError::bad_request(format!("'{}' is not a valid id", raw)))
    }
}

/// Distinguishes an absent field (`None`) from an explicit null (`Some(None)`)
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Equality filters built from list query parameters
#[derive(Debug, Default)]
pub struct Conditions(Map<String, Value>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, column: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.0.insert(column.to_string(), Value::String(value.to_string()));
        }
        self
    }

    /// Restrict a text column to one of `allowed`
    pub fn one_of(self, column: &str, value: Option<&str>, allowed: &[&str]) -> Result<Self, ApiError> {
        match value {
            Some(v) if !allowed.contains(&v) => Err(ApiError::invalid_field(
                column,
                format!("must be one of: {}", allowed.join(", ")),
            )),
            _ => Ok(self.text(column, value)),
        }
    }

    pub fn uuid(mut self, column: &str, value: Option<&str>) -> Result<Self, ApiError> {
        if let Some(value) = value {
            let id = parse_uuid(column, value)?;
            self.0.insert(column.to_string(), Value::String(id.to_string()));
        }
        Ok(self)
    }

    pub fn boolean(mut self, column: &str, value: Option<&str>) -> Result<Self, ApiError> {
        if let Some(value) = value {
            let flag = value
                .parse::<bool>()
                .map_err(|_| ApiError::invalid_field(column, "must be true or false"))?;
            self.0.insert(column.to_string(), Value::Bool(flag));
        }
        Ok(self)
    }

    /// Uuid array column contains the value
    pub fn contains(mut self, column: &str, value: Option<&str>) -> Result<Self, ApiError> {
        if let Some(value) = value {
            let id = parse_uuid(column, value)?;
            self.0.insert(column.to_string(), serde_json::json!({ "$any": id.to_string() }));
        }
        Ok(self)
    }

    pub fn before(mut self, column: &str, param: &str, value: Option<&str>) -> Result<Self, ApiError> {
        if let Some(value) = value {
            let at = parse_timestamp(param, value)?;
            self.0.insert(column.to_string(), serde_json::json!({ "$lt": at.to_rfc3339() }));
        }
        Ok(self)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

pub fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value.trim()).map_err(|_| ApiError::invalid_field(field, "must be a valid UUID"))
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` date taken as midnight UTC
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::invalid_field(field, "must be an RFC 3339 timestamp or YYYY-MM-DD date"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        notes: Option<Option<String>>,
    }

    #[test]
    fn double_option_separates_missing_from_null() {
        let missing: Patch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.notes, None);
        let null: Patch = serde_json::from_value(json!({"notes": null})).unwrap();
        assert_eq!(null.notes, Some(None));
        let set: Patch = serde_json::from_value(json!({"notes": "x"})).unwrap();
        assert_eq!(set.notes, Some(Some("x".to_string())));
    }

    #[test]
    fn conditions_validate_inputs() {
        let id = Uuid::new_v4();
        let value = Conditions::new()
            .one_of("status", Some("open"), &["open", "closed"])
            .unwrap()
            .uuid("client_id", Some(&id.to_string()))
            .unwrap()
            .into_value();
        assert_eq!(value, json!({"status": "open", "client_id": id.to_string()}));

        assert!(Conditions::new().uuid("client_id", Some("nope")).is_err());
        assert!(Conditions::new().one_of("status", Some("lost"), &["open"]).is_err());
    }

    #[test]
    fn timestamps_accept_dates() {
        let ts = parse_timestamp("due_before", "2024-06-01").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-06-01T00:00:00+00:00");
        assert!(parse_timestamp("due_before", "June 1st").is_err());
    }
}
