use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, FilterScope, SortDirection, SqlResult};

/// Static description of a queryable table
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    /// Columns clients may filter, sort and select on
    pub columns: &'static [&'static str],
    /// Text columns searched by the `q` list parameter
    pub searchable: &'static [&'static str],
    pub soft_delete: bool,
    pub default_order: (&'static str, bool),
}

/// Limit clamping applied to every list query
#[derive(Debug, Clone, Copy)]
pub struct LimitPolicy {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl From<&crate::config::PaginationConfig> for LimitPolicy {
    fn from(config: &crate::config::PaginationConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }
}

pub struct Filter {
    spec: TableSpec,
    select_columns: Vec<String>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: i64,
    offset: i64,
    scope: FilterScope,
}

impl Filter {
    pub fn new(spec: TableSpec, scope: FilterScope, policy: LimitPolicy) -> Result<Self, FilterError> {
        Self::validate_table_name(spec.name)?;
        let (column, desc) = spec.default_order;
        Ok(Self {
            spec,
            select_columns: vec![],
            where_data: None,
            order_data: vec![FilterOrderInfo {
                column: column.to_string(),
                sort: if desc { SortDirection::Desc } else { SortDirection::Asc },
            }],
            limit: policy.default_limit.min(policy.max_limit),
            offset: 0,
            scope,
        })
    }

    pub fn assign(&mut self, data: FilterData, policy: LimitPolicy) -> Result<&mut Self, FilterError> {
        if let Some(select) = data.select {
            self.select(select)?;
        }
        if let Some(where_clause) = data.where_clause {
            self.where_clause(where_clause)?;
        }
        if let Some(order) = data.order {
            self.order(order)?;
        }
        self.limit(data.limit, data.offset, policy)?;
        Ok(self)
    }

    pub fn select(&mut self, columns: Vec<String>) -> Result<&mut Self, FilterError> {
        for column in &columns {
            if column != "*" && !self.spec.columns.contains(&column.as_str()) {
                return Err(FilterError::InvalidColumn(column.clone()));
            }
        }
        self.select_columns = columns;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = match (self.where_data.take(), conditions) {
            (_, Value::Null) => None,
            (None, c) => Some(c),
            // Successive calls narrow the result
            (Some(existing), c) => Some(serde_json::json!({ "$and": [existing, c] })),
        };
        Ok(self)
    }

    /// Case-insensitive substring search over the table's searchable columns
    pub fn search(&mut self, term: &str) -> Result<&mut Self, FilterError> {
        let term = term.trim();
        if term.is_empty() || self.spec.searchable.is_empty() {
            return Ok(self);
        }
        let pattern = format!("%{}%", escape_like(term));
        let any: Vec<Value> = self
            .spec
            .searchable
            .iter()
            .map(|col| {
                let mut condition = serde_json::Map::new();
                condition.insert(col.to_string(), serde_json::json!({ "$ilike": pattern }));
                Value::Object(condition)
            })
            .collect();
        self.where_clause(serde_json::json!({ "$or": any }))
    }

    pub fn order(&mut self, order_spec: Value) -> Result<&mut Self, FilterError> {
        let order_info = FilterOrder::validate_and_parse(&order_spec, self.spec.columns)?;
        if !order_info.is_empty() {
            self.order_data = order_info;
        }
        Ok(self)
    }

    pub fn limit(&mut self, limit: Option<i64>, offset: Option<i64>, policy: LimitPolicy) -> Result<&mut Self, FilterError> {
        let limit = limit.unwrap_or(policy.default_limit);
        if limit < 0 {
            return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string()));
        }
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string()));
        }

        if limit > policy.max_limit {
            tracing::debug!("Limit {} exceeds max {}, capping to max", limit, policy.max_limit);
        }
        self.limit = limit.min(policy.max_limit);
        self.offset = offset;
        Ok(self)
    }

    pub fn limit_value(&self) -> i64 {
        self.limit
    }

    pub fn offset_value(&self) -> i64 {
        self.offset
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let query = [
            format!("SELECT {}", self.build_select_clause()),
            format!("FROM \"{}\"", self.spec.name),
            format!("WHERE {}", where_result.query),
            FilterOrder::generate(&self.order_data),
            format!("LIMIT {} OFFSET {}", self.limit, self.offset),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlResult {
            query,
            params: where_result.params,
        })
    }

    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let (query, params) = FilterWhere::generate(
            self.spec.columns,
            self.where_data.as_ref(),
            &self.scope,
            self.spec.soft_delete,
        )?;
        Ok(SqlResult { query, params })
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        Ok(SqlResult {
            query: format!(
                "SELECT COUNT(*) AS count FROM \"{}\" WHERE {}",
                self.spec.name, where_result.query
            ),
            params: where_result.params,
        })
    }

    fn validate_table_name(name: &str) -> Result<(), FilterError> {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return Err(FilterError::InvalidTableName(name.to_string())),
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilterError::InvalidTableName(name.to_string()));
        }
        Ok(())
    }

    fn build_select_clause(&self) -> String {
        if self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*") {
            "*".to_string()
        } else {
            self.select_columns
                .iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::types::{DeletedScope, SqlParam};
    use serde_json::json;
    use uuid::Uuid;

    const CASES: TableSpec = TableSpec {
        name: "cases",
        columns: &["id", "title", "status", "case_number", "created_at"],
        searchable: &["title", "case_number"],
        soft_delete: true,
        default_order: ("created_at", true),
    };

    const POLICY: LimitPolicy = LimitPolicy {
        default_limit: 25,
        max_limit: 100,
    };

    #[test]
    fn full_select_is_firm_scoped_and_paginated() {
        let firm = Uuid::new_v4();
        let mut filter = Filter::new(CASES, FilterScope::firm(firm), POLICY).unwrap();
        filter
            .assign(
                FilterData {
                    where_clause: Some(json!({"status": "open"})),
                    limit: Some(500),
                    offset: Some(10),
                    ..Default::default()
                },
                POLICY,
            )
            .unwrap();
        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT * FROM \"cases\" WHERE \"firm_id\" = $1 AND \"deleted_at\" IS NULL AND \"status\" = $2 ORDER BY \"created_at\" DESC LIMIT 100 OFFSET 10"
        );
        assert_eq!(sql.params[0], SqlParam::from(firm));
    }

    #[test]
    fn count_shares_where_clause() {
        let firm = Uuid::new_v4();
        let scope = FilterScope::firm(firm).with_deleted(DeletedScope::WithDeleted);
        let filter = Filter::new(CASES, scope, POLICY).unwrap();
        let sql = filter.to_count_sql().unwrap();
        assert_eq!(sql.query, "SELECT COUNT(*) AS count FROM \"cases\" WHERE \"firm_id\" = $1");
    }

    #[test]
    fn search_ors_over_searchable_columns() {
        let mut filter = Filter::new(CASES, FilterScope::platform(), POLICY).unwrap();
        filter.search("50%_off").unwrap();
        let sql = filter.to_where_sql().unwrap();
        assert_eq!(
            sql.query,
            "\"deleted_at\" IS NULL AND ((\"title\" ILIKE $1) OR (\"case_number\" ILIKE $2))"
        );
        assert_eq!(sql.params[0], SqlParam::text("%50\\%\\_off%"));
    }

    #[test]
    fn negative_limit_is_rejected() {
        let mut filter = Filter::new(CASES, FilterScope::platform(), POLICY).unwrap();
        assert!(matches!(
            filter.limit(Some(-1), None, POLICY),
            Err(FilterError::InvalidLimit(_))
        ));
    }

    #[test]
    fn select_rejects_hidden_columns() {
        let mut filter = Filter::new(CASES, FilterScope::platform(), POLICY).unwrap();
        assert!(filter.select(vec!["password_hash".to_string()]).is_err());
    }
}
