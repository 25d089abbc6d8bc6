use std::collections::HashMap;

use super::error::FilterError;
use super::types::DeletedScope;

/// Query-string parameters shared by every list endpoint
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
    pub q: Option<String>,
    pub deleted: DeletedScope,
    params: HashMap<String, String>,
}

impl ListQuery {
    pub fn from_params(params: HashMap<String, String>) -> Result<Self, FilterError> {
        let limit = parse_int(&params, "limit", FilterError::InvalidLimit)?;
        let offset = parse_int(&params, "offset", FilterError::InvalidOffset)?;
        let deleted = deleted_scope(&params)?;
        Ok(Self {
            limit,
            offset,
            sort: non_empty(&params, "sort"),
            q: non_empty(&params, "q"),
            deleted,
            params,
        })
    }

    /// A resource-specific filter such as `status` or `case_id`
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// `include_deleted` and `only_deleted` are mutually exclusive
pub fn deleted_scope(params: &HashMap<String, String>) -> Result<DeletedScope, FilterError> {
    let include = flag(params, "include_deleted")?;
    let only = flag(params, "only_deleted")?;
    match (include, only) {
        (true, true) => Err(FilterError::InvalidWhereClause(
            "include_deleted and only_deleted cannot be combined".to_string(),
        )),
        (true, false) => Ok(DeletedScope::WithDeleted),
        (false, true) => Ok(DeletedScope::OnlyDeleted),
        (false, false) => Ok(DeletedScope::Active),
    }
}

fn flag(params: &HashMap<String, String>, name: &str) -> Result<bool, FilterError> {
    match params.get(name).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "" | "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(FilterError::InvalidOperatorData(format!(
                "{} must be true or false",
                name
            ))),
        },
    }
}

fn parse_int(
    params: &HashMap<String, String>,
    name: &str,
    err: fn(String) -> FilterError,
) -> Result<Option<i64>, FilterError> {
    match non_empty(params, name) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| err(format!("{} must be an integer", name))),
    }
}

fn non_empty(params: &HashMap<String, String>, name: &str) -> Option<String> {
    params
        .get(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_paging_and_search() {
        let q = ListQuery::from_params(params(&[
            ("limit", "10"),
            ("offset", "20"),
            ("sort", "-created_at"),
            ("q", " smith "),
            ("status", "open"),
        ]))
        .unwrap();
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, Some(20));
        assert_eq!(q.sort.as_deref(), Some("-created_at"));
        assert_eq!(q.q.as_deref(), Some("smith"));
        assert_eq!(q.param("status"), Some("open"));
        assert_eq!(q.deleted, DeletedScope::Active);
    }

    #[test]
    fn deleted_flags_are_exclusive() {
        assert_eq!(
            deleted_scope(&params(&[("only_deleted", "true")])).unwrap(),
            DeletedScope::OnlyDeleted
        );
        assert_eq!(
            deleted_scope(&params(&[("include_deleted", "1")])).unwrap(),
            DeletedScope::WithDeleted
        );
        assert!(deleted_scope(&params(&[("include_deleted", "true"), ("only_deleted", "true")])).is_err());
    }

    #[test]
    fn non_numeric_limit_is_rejected() {
        assert!(matches!(
            ListQuery::from_params(params(&[("limit", "ten")])),
            Err(FilterError::InvalidLimit(_))
        ));
    }
}
