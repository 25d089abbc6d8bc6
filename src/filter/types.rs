use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
    NIn,
    Between,
    Null,
    Any,
}

impl FilterOp {
    pub fn parse(op_key: &str) -> Option<Self> {
        Some(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$null" => FilterOp::Null,
            "$any" => FilterOp::Any,
            _ => return None,
        })
    }
}

/// Client-facing filter document, as posted to the `find` endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterData {
    pub select: Option<Vec<String>>,
    #[serde(rename = "where")]
    pub where_clause: Option<Value>,
    pub order: Option<Value>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Which rows the soft-delete rewrite lets through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedScope {
    #[default]
    Active,
    WithDeleted,
    OnlyDeleted,
}

impl DeletedScope {
    pub fn to_sql(self) -> Option<&'static str> {
        match self {
            DeletedScope::Active => Some("\"deleted_at\" IS NULL"),
            DeletedScope::OnlyDeleted => Some("\"deleted_at\" IS NOT NULL"),
            DeletedScope::WithDeleted => None,
        }
    }
}

/// Mandatory predicates ANDed in front of every client condition
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterScope {
    pub firm_id: Option<Uuid>,
    pub deleted: DeletedScope,
}

impl FilterScope {
    pub fn firm(firm_id: Uuid) -> Self {
        Self {
            firm_id: Some(firm_id),
            deleted: DeletedScope::Active,
        }
    }

    pub fn platform() -> Self {
        Self::default()
    }

    pub fn with_deleted(mut self, deleted: DeletedScope) -> Self {
        self.deleted = deleted;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

/// Typed bind parameter. Nullable variants carry `Option` so a NULL still
/// binds with the column's type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
    TextArray(Vec<String>),
    UuidArray(Vec<Uuid>),
    Json(Value),
}

impl SqlParam {
    /// Infer a bind type from a JSON filter value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Text(None),
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlParam::Int(i)
                } else {
                    SqlParam::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => {
                if let Ok(id) = Uuid::parse_str(s) {
                    SqlParam::Uuid(Some(id))
                } else if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                    SqlParam::Timestamp(Some(ts.with_timezone(&Utc)))
                } else {
                    SqlParam::Text(Some(s.clone()))
                }
            }
            Value::Array(_) | Value::Object(_) => SqlParam::Json(value.clone()),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        SqlParam::Text(Some(value.into()))
    }

    pub fn add_to(&self, args: &mut PgArguments) {
        match self {
            SqlParam::Bool(b) => args.add(*b),
            SqlParam::Int(i) => args.add(*i),
            SqlParam::Float(f) => args.add(*f),
            SqlParam::Text(s) => args.add(s.clone()),
            SqlParam::Uuid(u) => args.add(*u),
            SqlParam::Timestamp(t) => args.add(*t),
            SqlParam::TextArray(v) => args.add(v.clone()),
            SqlParam::UuidArray(v) => args.add(v.clone()),
            SqlParam::Json(v) => args.add(sqlx::types::Json(v.clone())),
        }
    }
}

impl From<Uuid> for SqlParam {
    fn from(id: Uuid) -> Self {
        SqlParam::Uuid(Some(id))
    }
}

impl From<Option<Uuid>> for SqlParam {
    fn from(id: Option<Uuid>) -> Self {
        SqlParam::Uuid(id)
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        SqlParam::Text(Some(s))
    }
}

impl From<Option<String>> for SqlParam {
    fn from(s: Option<String>) -> Self {
        SqlParam::Text(s)
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        SqlParam::Text(Some(s.to_string()))
    }
}

impl From<bool> for SqlParam {
    fn from(b: bool) -> Self {
        SqlParam::Bool(b)
    }
}

impl From<i64> for SqlParam {
    fn from(i: i64) -> Self {
        SqlParam::Int(i)
    }
}

impl From<Option<DateTime<Utc>>> for SqlParam {
    fn from(t: Option<DateTime<Utc>>) -> Self {
        SqlParam::Timestamp(t)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(t: DateTime<Utc>) -> Self {
        SqlParam::Timestamp(Some(t))
    }
}

impl From<Value> for SqlParam {
    fn from(v: Value) -> Self {
        SqlParam::Json(v)
    }
}

impl From<Vec<Uuid>> for SqlParam {
    fn from(v: Vec<Uuid>) -> Self {
        SqlParam::UuidArray(v)
    }
}

impl From<Vec<String>> for SqlParam {
    fn from(v: Vec<String>) -> Self {
        SqlParam::TextArray(v)
    }
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}

impl SqlResult {
    pub fn arguments(&self) -> PgArguments {
        let mut args = PgArguments::default();
        for param in &self.params {
            param.add_to(&mut args);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_uuid_and_timestamp_strings() {
        let id = Uuid::new_v4();
        assert_eq!(SqlParam::from_json(&json!(id.to_string())), SqlParam::Uuid(Some(id)));
        assert!(matches!(
            SqlParam::from_json(&json!("2024-03-01T10:00:00Z")),
            SqlParam::Timestamp(Some(_))
        ));
        assert_eq!(SqlParam::from_json(&json!("open")), SqlParam::text("open"));
        assert_eq!(SqlParam::from_json(&json!(7)), SqlParam::Int(7));
    }

    #[test]
    fn filter_data_reads_where_key() {
        let data: FilterData = serde_json::from_value(json!({
            "where": {"status": "open"},
            "limit": 5
        }))
        .unwrap();
        assert_eq!(data.where_clause, Some(json!({"status": "open"})));
        assert_eq!(data.limit, Some(5));
    }
}
