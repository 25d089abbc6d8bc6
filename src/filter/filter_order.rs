use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts `"created_at desc, title"`, `["-created_at", "title asc"]`
    /// or `{"created_at": "desc"}`.
    pub fn validate_and_parse(order: &Value, columns: &[&str]) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::Null => vec![],
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)),
                        _ => {
                            return Err(FilterError::InvalidWhereClause(
                                "order entries must be strings".to_string(),
                            ))
                        }
                    }
                }
                out
            }
            Value::Object(obj) => obj
                .iter()
                .map(|(k, v)| FilterOrderInfo {
                    column: k.clone(),
                    sort: Self::direction(v.as_str().unwrap_or("asc")),
                })
                .collect(),
            _ => {
                return Err(FilterError::InvalidWhereClause(
                    "order must be a string, array or object".to_string(),
                ))
            }
        };

        for info in &infos {
            if !columns.contains(&info.column.as_str()) {
                return Err(FilterError::InvalidColumn(info.column.clone()));
            }
        }
        Ok(infos)
    }

    fn parse_order_string(s: &str) -> Vec<FilterOrderInfo> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let (column, sort) = match col.strip_prefix('-') {
                    Some(stripped) => (stripped, SortDirection::Desc),
                    None => (col, Self::direction(it.next().unwrap_or("asc"))),
                };
                out.push(FilterOrderInfo {
                    column: column.to_string(),
                    sort,
                });
            }
        }
        out
    }

    fn direction(dir: &str) -> SortDirection {
        if dir.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[&str] = &["created_at", "title"];

    #[test]
    fn parses_dash_prefix_as_descending() {
        let infos = FilterOrder::validate_and_parse(&json!("-created_at, title"), COLUMNS).unwrap();
        assert_eq!(
            FilterOrder::generate(&infos),
            "ORDER BY \"created_at\" DESC, \"title\" ASC"
        );
    }

    #[test]
    fn rejects_unknown_sort_column() {
        let err = FilterOrder::validate_and_parse(&json!({"secret": "desc"}), COLUMNS).unwrap_err();
        assert_eq!(err, FilterError::InvalidColumn("secret".to_string()));
    }
}
