use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::{Postgres, Row};
use uuid::Uuid;

use crate::database::collection::Collection;
use crate::database::manager::DatabaseError;
use crate::database::store::Record;
use crate::filter::filter::is_identifier;
use crate::filter::filter_where::FilterWhere;
use crate::filter::types::SqlResult;
use crate::filter::{Filter, FilterData};

pub type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Renders the SQL for one collection. Rows always come back as a single
/// `row` JSON column so callers never map Postgres types by hand.
pub struct QueryBuilder {
    collection: Collection,
    filter: Filter,
}

impl QueryBuilder {
    pub fn new(collection: Collection) -> Result<Self, DatabaseError> {
        Ok(Self {
            collection,
            filter: Filter::new(collection.table_name())?,
        })
    }

    pub fn filter(mut self, filter_data: FilterData) -> Result<Self, DatabaseError> {
        self.filter.assign(filter_data)?;
        Ok(self)
    }

    pub fn select_sql(&self) -> Result<SqlResult, DatabaseError> {
        let inner = self.filter.to_sql()?;
        Ok(SqlResult {
            query: format!("SELECT row_to_json(t) AS row FROM ({}) t", inner.query),
            params: inner.params,
        })
    }

    pub fn count_sql(&self) -> Result<SqlResult, DatabaseError> {
        Ok(self.filter.to_count_sql()?)
    }

    pub fn delete_sql(&self) -> Result<SqlResult, DatabaseError> {
        Ok(self.filter.to_delete_sql()?)
    }

    /// `$1` is the full record as JSONB.
    pub fn insert_sql(&self) -> String {
        let table = self.collection.table_name();
        format!(
            "INSERT INTO \"{t}\" SELECT * FROM jsonb_populate_record(NULL::\"{t}\", $1) RETURNING row_to_json(\"{t}\".*) AS row",
            t = table
        )
    }

    /// The caller binds `$1` (changes as JSONB) and `$2` (row id); the returned
    /// params are the guard values, numbered from `$3`.
    pub fn update_sql(&self, changes: &Record, guard: Option<&Record>) -> Result<SqlResult, DatabaseError> {
        if changes.is_empty() {
            return Err(DatabaseError::QueryError("UPDATE requires at least one column".to_string()));
        }
        let table = self.collection.table_name();
        let mut assignments = Vec::with_capacity(changes.len());
        for column in changes.keys() {
            if !is_identifier(column) || column == "id" {
                return Err(DatabaseError::QueryError(format!("Column cannot be updated: {}", column)));
            }
            // Each value goes through jsonb_populate_record so it is cast to the column type
            assignments.push(format!(
                "\"{c}\" = (SELECT r.\"{c}\" FROM jsonb_populate_record(NULL::\"{t}\", $1) r)",
                c = column,
                t = table
            ));
        }

        let mut query = format!("UPDATE \"{}\" SET {} WHERE \"id\" = $2", table, assignments.join(", "));
        let mut params = Vec::new();

        if let Some(guard) = guard.filter(|g| !g.is_empty()) {
            let (guard_sql, guard_params) = FilterWhere::generate(&Value::Object(guard.clone()), 2)?;
            query.push_str(&format!(" AND {}", guard_sql));
            params.extend(guard_params);
        }
        query.push_str(&format!(" RETURNING row_to_json(\"{}\".*) AS row", table));
        Ok(SqlResult { query, params })
    }

    pub fn exists_sql(&self) -> String {
        format!("SELECT 1 FROM \"{}\" WHERE \"id\" = $1", self.collection.table_name())
    }
}

/// Bind a filter parameter. UUID-shaped strings bind as `uuid` so they compare
/// against uuid columns; objects and arrays bind as JSONB.
pub fn bind_value(q: PgQuery<'_>, v: Value) -> PgQuery<'_> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => match Uuid::parse_str(&s) {
            Ok(id) => q.bind(id),
            Err(_) => q.bind(s),
        },
        other @ (Value::Array(_) | Value::Object(_)) => q.bind(other),
    }
}

pub fn bind_all(mut q: PgQuery<'_>, params: Vec<Value>) -> PgQuery<'_> {
    for p in params {
        q = bind_value(q, p);
    }
    q
}

/// Pull the `row` JSON column produced by every statement above.
pub fn decode_row(collection: Collection, row: &sqlx::postgres::PgRow) -> Result<Record, DatabaseError> {
    let value: Value = row.try_get("row")?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DatabaseError::InvalidRecord {
            collection: collection.to_string(),
            message: format!("unexpected row format: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_wraps_filter_in_row_to_json() {
        let sql = QueryBuilder::new(Collection::SavedProperties)
            .unwrap()
            .filter(FilterData::matching(json!({"user_id": "u"})).order_by("created_at desc"))
            .unwrap()
            .select_sql()
            .unwrap();
        assert_eq!(
            sql.query,
            "SELECT row_to_json(t) AS row FROM (SELECT * FROM \"saved_properties\" WHERE \"user_id\" = $1 ORDER BY \"created_at\" DESC) t"
        );
    }

    #[test]
    fn update_numbers_guard_params_after_id() {
        let qb = QueryBuilder::new(Collection::PropertyRequests).unwrap();
        let changes = json!({"status": "matched"}).as_object().cloned().unwrap();
        let guard = json!({"status": "in_progress"}).as_object().cloned().unwrap();
        let sql = qb.update_sql(&changes, Some(&guard)).unwrap();
        assert_eq!(
            sql.query,
            "UPDATE \"property_requests\" SET \"status\" = (SELECT r.\"status\" FROM jsonb_populate_record(NULL::\"property_requests\", $1) r) \
             WHERE \"id\" = $2 AND \"status\" = $3 RETURNING row_to_json(\"property_requests\".*) AS row"
        );
        assert_eq!(sql.params, vec![json!("in_progress")]);
    }

    #[test]
    fn update_rejects_id_and_bad_columns() {
        let qb = QueryBuilder::new(Collection::Profiles).unwrap();
        let changes = json!({"id": "x"}).as_object().cloned().unwrap();
        assert!(qb.update_sql(&changes, None).is_err());
        let changes = json!({"na me": "x"}).as_object().cloned().unwrap();
        assert!(qb.update_sql(&changes, None).is_err());
        assert!(qb.update_sql(&Record::new(), None).is_err());
    }
}
