use uuid::Uuid;

use crate::filter::{SqlParam, SqlResult};

/// Ordered column assignments for a dynamic INSERT or UPDATE.
///
/// Column names come from code, never from request bodies.
#[derive(Debug, Default, Clone)]
pub struct Changeset {
    values: Vec<(&'static str, SqlParam)>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &'static str, value: impl Into<SqlParam>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: &'static str, value: impl Into<SqlParam>) {
        let value = value.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(existing) => existing.1 = value,
            None => self.values.push((column, value)),
        }
    }

    /// Set `column` only when the caller supplied a value
    pub fn maybe<V: Into<SqlParam>>(mut self, column: &'static str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.push(column, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.iter().any(|(c, _)| *c == column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(c, _)| *c)
    }

    pub fn to_insert_sql(&self, table: &str) -> SqlResult {
        let columns: Vec<String> = self.values.iter().map(|(c, _)| format!("\"{}\"", c)).collect();
        let placeholders: Vec<String> = (1..=self.values.len()).map(|i| format!("${}", i)).collect();
        SqlResult {
            query: format!(
                "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING *",
                table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            params: self.values.iter().map(|(_, v)| v.clone()).collect(),
        }
    }

    /// UPDATE a live row by id, stamping `updated_at`
    pub fn to_update_sql(&self, table: &str, id: Uuid, firm_id: Option<Uuid>) -> SqlResult {
        let mut params: Vec<SqlParam> = self.values.iter().map(|(_, v)| v.clone()).collect();
        let mut assignments: Vec<String> = self
            .values
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("\"{}\" = ${}", c, i + 1))
            .collect();
        assignments.push("\"updated_at\" = now()".to_string());

        params.push(SqlParam::from(id));
        let mut query = format!(
            "UPDATE \"{}\" SET {} WHERE \"id\" = ${}",
            table,
            assignments.join(", "),
            params.len()
        );
        if let Some(firm_id) = firm_id {
            params.push(SqlParam::from(firm_id));
            query.push_str(&format!(" AND \"firm_id\" = ${}", params.len()));
        }
        query.push_str(" AND \"deleted_at\" IS NULL RETURNING *");
        SqlResult { query, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_lists_columns_in_order() {
        let sql = Changeset::new()
            .set("id", Uuid::nil())
            .set("name", "Acme")
            .to_insert_sql("clients");
        assert_eq!(
            sql.query,
            "INSERT INTO \"clients\" (\"id\", \"name\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(sql.params.len(), 2);
    }

    #[test]
    fn update_is_scoped_to_firm_and_live_rows() {
        let firm = Uuid::new_v4();
        let sql = Changeset::new()
            .set("title", "Renamed")
            .maybe("description", None::<String>)
            .to_update_sql("cases", Uuid::nil(), Some(firm));
        assert_eq!(
            sql.query,
            "UPDATE \"cases\" SET \"title\" = $1, \"updated_at\" = now() WHERE \"id\" = $2 AND \"firm_id\" = $3 AND \"deleted_at\" IS NULL RETURNING *"
        );
        assert_eq!(sql.params[2], SqlParam::from(firm));
    }

    #[test]
    fn setting_a_column_twice_keeps_the_last_value() {
        let changes = Changeset::new().set("status", "open").set("status", "closed");
        assert_eq!(changes.columns().count(), 1);
        assert_eq!(changes.to_insert_sql("cases").params, vec![SqlParam::text("closed")]);
    }
}
