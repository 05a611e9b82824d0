use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use super::collection::Collection;
use super::manager::{DatabaseError, DatabaseManager};
use super::query_builder::{bind_all, decode_row, QueryBuilder};
use super::store::{deleted, Record, Store, WriteOp};
use crate::filter::FilterData;

/// Postgres-backed data gateway.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn apply(tx: &mut Transaction<'_, Postgres>, op: WriteOp) -> Result<Record, DatabaseError> {
        match op {
            WriteOp::Insert { collection, record } => {
                let qb = QueryBuilder::new(collection)?;
                let sql = qb.insert_sql();
                let row = sqlx::query(&sql)
                    .bind(Value::Object(record))
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(|e| map_write_error(collection, e))?;
                decode_row(collection, &row)
            }
            WriteOp::Update { collection, id, changes, guard } => {
                let qb = QueryBuilder::new(collection)?;
                let sql = qb.update_sql(&changes, guard.as_ref())?;
                let q = sqlx::query(&sql.query).bind(Value::Object(changes)).bind(id);
                let row = bind_all(q, sql.params)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(|e| map_write_error(collection, e))?;

                match row {
                    Some(row) => decode_row(collection, &row),
                    None => {
                        // Either the row is gone or the guard no longer holds
                        let exists = sqlx::query(&qb.exists_sql()).bind(id).fetch_optional(&mut **tx).await?;
                        if exists.is_some() {
                            Err(DatabaseError::Conflict(format!("{} {} was modified concurrently", collection.label(), id)))
                        } else {
                            Err(DatabaseError::NotFound(format!("{} {} not found", collection.label(), id)))
                        }
                    }
                }
            }
            WriteOp::Delete { collection, filter } => {
                let sql = QueryBuilder::new(collection)?.filter(filter)?.delete_sql()?;
                let result = bind_all(sqlx::query(&sql.query), sql.params)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_write_error(collection, e))?;
                Ok(deleted(result.rows_affected()))
            }
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn select(&self, collection: Collection, filter: FilterData) -> Result<Vec<Record>, DatabaseError> {
        let sql = QueryBuilder::new(collection)?.filter(filter)?.select_sql()?;
        debug!(collection = %collection, sql = %sql.query, "select");
        let rows = bind_all(sqlx::query(&sql.query), sql.params).fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode_row(collection, row)).collect()
    }

    async fn count(&self, collection: Collection, filter: FilterData) -> Result<i64, DatabaseError> {
        let sql = QueryBuilder::new(collection)?.filter(filter.without_paging())?.count_sql()?;
        let row = bind_all(sqlx::query(&sql.query), sql.params).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count)
    }

    async fn write(&self, ops: Vec<WriteOp>) -> Result<Vec<Record>, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(ops.len());
        for op in ops {
            // Dropping `tx` on error rolls the batch back
            written.push(Self::apply(&mut tx, op).await?);
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn delete(&self, collection: Collection, filter: FilterData) -> Result<u64, DatabaseError> {
        let sql = QueryBuilder::new(collection)?.filter(filter.without_paging())?.delete_sql()?;
        let result = bind_all(sqlx::query(&sql.query), sql.params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}

fn map_write_error(collection: Collection, err: sqlx::Error) -> DatabaseError {
    if let sqlx::Error::Database(db_err) = &err {
        // 23505 unique_violation
        if db_err.code().as_deref() == Some("23505") {
            return DatabaseError::Conflict(format!("{} already exists", collection.label()));
        }
    }
    DatabaseError::Sqlx(err)
}
