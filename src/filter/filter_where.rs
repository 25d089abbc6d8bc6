use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{FilterOp, FilterScope, SqlParam};

const MAX_NESTED_DEPTH: usize = 8;

/// Compiles a JSON where-document into a parameterised SQL predicate.
///
/// Placeholders are numbered across the whole statement, so nested
/// `$and`/`$or`/`$not` groups share one parameter list.
pub struct FilterWhere<'a> {
    columns: &'a [&'a str],
    params: Vec<SqlParam>,
}

impl<'a> FilterWhere<'a> {
    pub fn new(columns: &'a [&'a str]) -> Self {
        Self {
            columns,
            params: vec![],
        }
    }

    /// Build the full predicate: scope first, then client conditions
    pub fn generate(
        columns: &'a [&'a str],
        where_data: Option<&Value>,
        scope: &FilterScope,
        soft_delete: bool,
    ) -> Result<(String, Vec<SqlParam>), FilterError> {
        let mut filter_where = Self::new(columns);
        let mut parts = vec![];

        if let Some(firm_id) = scope.firm_id {
            let placeholder = filter_where.param(SqlParam::from(firm_id));
            parts.push(format!("\"firm_id\" = {}", placeholder));
        }
        if soft_delete {
            if let Some(sql) = scope.deleted.to_sql() {
                parts.push(sql.to_string());
            }
        }
        if let Some(where_data) = where_data {
            let sql = filter_where.build(where_data, 0)?;
            if !sql.is_empty() {
                parts.push(sql);
            }
        }

        let clause = if parts.is_empty() {
            "1=1".to_string()
        } else {
            parts.join(" AND ")
        };
        Ok((clause, filter_where.params))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            Value::String(_) => Err(FilterError::InvalidWhereClause(
                "Raw SQL filters are not accepted".to_string(),
            )),
            _ => Err(FilterError::InvalidWhereClause(
                "WHERE must be an object".to_string(),
            )),
        }
    }

    fn build(&mut self, where_data: &Value, depth: usize) -> Result<String, FilterError> {
        if depth > MAX_NESTED_DEPTH {
            return Err(FilterError::TooDeep(MAX_NESTED_DEPTH));
        }
        Self::validate(where_data)?;
        let obj = match where_data {
            Value::Object(obj) => obj,
            _ => return Ok(String::new()),
        };

        let mut parts = vec![];
        for (key, value) in obj {
            let sql = if key.starts_with('$') {
                self.logical(key, value, depth)?
            } else {
                self.field(key, value)?
            };
            parts.push(sql);
        }
        Ok(parts.join(" AND "))
    }

    fn logical(&mut self, op: &str, value: &Value, depth: usize) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData(format!("{} requires array", op))
                })?;
                if arr.is_empty() {
                    // Empty conjunction is true, empty disjunction is false
                    return Ok(if op == "$and" { "1=1" } else { "1=0" }.to_string());
                }
                let mut sql_parts = Vec::with_capacity(arr.len());
                for v in arr {
                    let sql = self.build(v, depth + 1)?;
                    sql_parts.push(format!("({})", if sql.is_empty() { "1=1".to_string() } else { sql }));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            "$not" => {
                let sql = self.build(value, depth + 1)?;
                if sql.is_empty() {
                    return Ok("1=0".to_string());
                }
                Ok(format!("NOT ({})", sql))
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn field(&mut self, column: &str, value: &Value) -> Result<String, FilterError> {
        self.check_column(column)?;
        match value {
            Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) && !ops.is_empty() => {
                self.field_operators(column, ops)
            }
            // Implicit equality: { field: value }
            _ => self.condition(column, FilterOp::Eq, value),
        }
    }

    fn field_operators(&mut self, column: &str, ops: &Map<String, Value>) -> Result<String, FilterError> {
        let mut parts = vec![];
        for (op_key, op_val) in ops {
            let op = FilterOp::parse(op_key)
                .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
            parts.push(self.condition(column, op, op_val)?);
        }
        Ok(parts.join(" AND "))
    }

    fn condition(&mut self, column: &str, op: FilterOp, data: &Value) -> Result<String, FilterError> {
        let quoted = format!("\"{}\"", column);
        let sql = match op {
            FilterOp::Eq if data.is_null() => format!("{} IS NULL", quoted),
            FilterOp::Ne if data.is_null() => format!("{} IS NOT NULL", quoted),
            FilterOp::Eq => format!("{} = {}", quoted, self.scalar(data)?),
            FilterOp::Ne => format!("{} <> {}", quoted, self.scalar(data)?),
            FilterOp::Gt => format!("{} > {}", quoted, self.scalar(data)?),
            FilterOp::Gte => format!("{} >= {}", quoted, self.scalar(data)?),
            FilterOp::Lt => format!("{} < {}", quoted, self.scalar(data)?),
            FilterOp::Lte => format!("{} <= {}", quoted, self.scalar(data)?),
            FilterOp::Like => format!("{} LIKE {}", quoted, self.text(data)?),
            FilterOp::ILike => format!("{} ILIKE {}", quoted, self.text(data)?),
            FilterOp::In | FilterOp::NIn => {
                let values = data.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData("$in/$nin require an array".to_string())
                })?;
                if values.is_empty() {
                    return Ok(if op == FilterOp::In { "1=0" } else { "1=1" }.to_string());
                }
                let placeholders = values
                    .iter()
                    .map(|v| self.scalar(v))
                    .collect::<Result<Vec<_>, _>>()?;
                let keyword = if op == FilterOp::In { "IN" } else { "NOT IN" };
                format!("{} {} ({})", quoted, keyword, placeholders.join(", "))
            }
            FilterOp::Between => {
                let values = data.as_array().filter(|a| a.len() == 2).ok_or_else(|| {
                    FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string())
                })?;
                let low = self.scalar(&values[0])?;
                let high = self.scalar(&values[1])?;
                format!("{} BETWEEN {} AND {}", quoted, low, high)
            }
            FilterOp::Null => match data.as_bool() {
                Some(true) => format!("{} IS NULL", quoted),
                Some(false) => format!("{} IS NOT NULL", quoted),
                None => {
                    return Err(FilterError::InvalidOperatorData(
                        "$null requires a boolean".to_string(),
                    ))
                }
            },
            // Array column contains the value
            FilterOp::Any => format!("{} = ANY({})", self.scalar(data)?, quoted),
        };
        Ok(sql)
    }

    fn scalar(&mut self, value: &Value) -> Result<String, FilterError> {
        match value {
            Value::Array(_) | Value::Object(_) => Err(FilterError::InvalidOperatorData(
                "expected a scalar value".to_string(),
            )),
            _ => Ok(self.param(SqlParam::from_json(value))),
        }
    }

    fn text(&mut self, value: &Value) -> Result<String, FilterError> {
        match value {
            Value::String(s) => Ok(self.param(SqlParam::text(s.clone()))),
            _ => Err(FilterError::InvalidOperatorData(
                "pattern operators require a string".to_string(),
            )),
        }
    }

    fn check_column(&self, column: &str) -> Result<(), FilterError> {
        if self.columns.contains(&column) {
            Ok(())
        } else {
            Err(FilterError::InvalidColumn(column.to_string()))
        }
    }

    fn param(&mut self, value: SqlParam) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::types::DeletedScope;
    use serde_json::json;
    use uuid::Uuid;

    const COLUMNS: &[&str] = &["id", "title", "status", "assigned_to", "due_date", "deleted_at"];

    #[test]
    fn scope_comes_first_and_numbers_params() {
        let firm = Uuid::new_v4();
        let (sql, params) = FilterWhere::generate(
            COLUMNS,
            Some(&json!({"status": "open"})),
            &FilterScope::firm(firm),
            true,
        )
        .unwrap();
        assert_eq!(sql, "\"firm_id\" = $1 AND \"deleted_at\" IS NULL AND \"status\" = $2");
        assert_eq!(params, vec![SqlParam::from(firm), SqlParam::text("open")]);
    }

    #[test]
    fn only_deleted_scope_inverts_soft_delete_filter() {
        let scope = FilterScope::platform().with_deleted(DeletedScope::OnlyDeleted);
        let (sql, _) = FilterWhere::generate(COLUMNS, None, &scope, true).unwrap();
        assert_eq!(sql, "\"deleted_at\" IS NOT NULL");
    }

    #[test]
    fn tables_without_soft_delete_skip_scope() {
        let (sql, _) = FilterWhere::generate(COLUMNS, None, &FilterScope::platform(), false).unwrap();
        assert_eq!(sql, "1=1");
    }

    #[test]
    fn nested_groups_share_parameter_numbering() {
        let (sql, params) = FilterWhere::generate(
            COLUMNS,
            Some(&json!({
                "$or": [
                    {"status": "open"},
                    {"status": {"$in": ["pending", "closed"]}}
                ],
                "title": {"$ilike": "%smith%"}
            })),
            &FilterScope::platform().with_deleted(DeletedScope::WithDeleted),
            true,
        )
        .unwrap();
        assert_eq!(
            sql,
            "((\"status\" = $1) OR (\"status\" IN ($2, $3))) AND \"title\" ILIKE $4"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let err = FilterWhere::generate(
            COLUMNS,
            Some(&json!({"password_hash": "x"})),
            &FilterScope::platform(),
            true,
        )
        .unwrap_err();
        assert_eq!(err, FilterError::InvalidColumn("password_hash".to_string()));
    }

    #[test]
    fn raw_sql_is_rejected() {
        let err = FilterWhere::generate(
            COLUMNS,
            Some(&json!("1=1; DROP TABLE cases")),
            &FilterScope::platform(),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidWhereClause(_)));
    }

    #[test]
    fn null_and_any_operators() {
        let user = Uuid::new_v4();
        let (sql, _) = FilterWhere::generate(
            COLUMNS,
            Some(&json!({"due_date": {"$null": false}, "assigned_to": {"$any": user.to_string()}})),
            &FilterScope::platform().with_deleted(DeletedScope::WithDeleted),
            true,
        )
        .unwrap();
        assert_eq!(sql, "$1 = ANY(\"assigned_to\") AND \"due_date\" IS NOT NULL");
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, params) = FilterWhere::generate(
            COLUMNS,
            Some(&json!({"status": {"$in": []}})),
            &FilterScope::platform().with_deleted(DeletedScope::WithDeleted),
            true,
        )
        .unwrap();
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let mut doc = json!({"status": "open"});
        for _ in 0..12 {
            doc = json!({"$not": doc});
        }
        let err = FilterWhere::generate(COLUMNS, Some(&doc), &FilterScope::platform(), true).unwrap_err();
        assert_eq!(err, FilterError::TooDeep(MAX_NESTED_DEPTH));
    }
}
