//! In-process data gateway evaluating the same filter language as Postgres.
//! Used by the test suite and by `realty-api --memory` for local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::collection::Collection;
use super::manager::DatabaseError;
use super::store::{deleted, Record, Store, WriteOp};
use crate::filter::filter_match::FilterMatch;
use crate::filter::{Filter, FilterData};

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Collection, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(tables: &mut HashMap<Collection, Vec<Record>>, op: WriteOp) -> Result<Record, DatabaseError> {
        match op {
            WriteOp::Insert { collection, record } => {
                let id = record_id(collection, &record)?;
                let rows = tables.entry(collection).or_default();
                if rows.iter().any(|r| r.get("id") == Some(&id)) {
                    return Err(DatabaseError::Conflict(format!("{} already exists", collection.label())));
                }
                check_unique(collection, rows, &record, None)?;
                rows.push(record.clone());
                Ok(record)
            }
            WriteOp::Update { collection, id, changes, guard } => {
                if changes.contains_key("id") {
                    return Err(DatabaseError::QueryError("Column cannot be updated: id".to_string()));
                }
                let rows = tables.entry(collection).or_default();
                let id_value = Value::String(id.to_string());
                let index = rows
                    .iter()
                    .position(|r| r.get("id") == Some(&id_value))
                    .ok_or_else(|| DatabaseError::NotFound(format!("{} {} not found", collection.label(), id)))?;

                if let Some(guard) = guard {
                    if !FilterMatch::matches(&Value::Object(guard), &rows[index])? {
                        return Err(DatabaseError::Conflict(format!("{} {} was modified concurrently", collection.label(), id)));
                    }
                }

                let mut updated = rows[index].clone();
                updated.extend(changes);
                check_unique(collection, rows, &updated, Some(index))?;
                rows[index] = updated.clone();
                Ok(updated)
            }
            WriteOp::Delete { collection, filter } => {
                let removed = remove_matching(tables.entry(collection).or_default(), collection, filter)?;
                Ok(deleted(removed))
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, collection: Collection, filter: FilterData) -> Result<Vec<Record>, DatabaseError> {
        let rows = self.tables.read().await.get(&collection).cloned().unwrap_or_default();
        Ok(FilterMatch::apply(rows, &filter)?)
    }

    async fn count(&self, collection: Collection, filter: FilterData) -> Result<i64, DatabaseError> {
        let rows = self.select(collection, filter.without_paging()).await?;
        Ok(rows.len() as i64)
    }

    async fn write(&self, ops: Vec<WriteOp>) -> Result<Vec<Record>, DatabaseError> {
        let mut tables = self.tables.write().await;
        // Stage copies of the touched tables only; a failing op leaves nothing behind
        let touched: HashSet<Collection> = ops.iter().map(WriteOp::collection).collect();
        let mut staged: HashMap<Collection, Vec<Record>> = touched
            .iter()
            .map(|c| (*c, tables.get(c).cloned().unwrap_or_default()))
            .collect();
        let mut written = Vec::with_capacity(ops.len());
        for op in ops {
            written.push(Self::apply(&mut staged, op)?);
        }
        tables.extend(staged);
        Ok(written)
    }

    async fn delete(&self, collection: Collection, filter: FilterData) -> Result<u64, DatabaseError> {
        let mut tables = self.tables.write().await;
        remove_matching(tables.entry(collection).or_default(), collection, filter)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

fn remove_matching(rows: &mut Vec<Record>, collection: Collection, filter: FilterData) -> Result<u64, DatabaseError> {
    let filter = filter.without_paging();
    let where_clause = filter.where_clause.clone().unwrap_or(Value::Null);
    // Same guard as the SQL path: a DELETE without a WHERE is refused
    let mut sql_filter = Filter::new(collection.table_name())?;
    sql_filter.assign(filter)?;
    sql_filter.to_delete_sql()?;

    let mut kept = Vec::with_capacity(rows.len());
    let mut removed = 0u64;
    for row in rows.drain(..) {
        if FilterMatch::matches(&where_clause, &row)? {
            removed += 1;
        } else {
            kept.push(row);
        }
    }
    *rows = kept;
    Ok(removed)
}

fn record_id(collection: Collection, record: &Record) -> Result<Value, DatabaseError> {
    match record.get("id") {
        Some(id @ Value::String(_)) => Ok(id.clone()),
        _ => Err(DatabaseError::InvalidRecord {
            collection: collection.to_string(),
            message: "record requires a string id".to_string(),
        }),
    }
}

fn check_unique(collection: Collection, rows: &[Record], candidate: &Record, skip: Option<usize>) -> Result<(), DatabaseError> {
    for key in collection.unique_keys() {
        let clash = rows.iter().enumerate().any(|(i, row)| {
            Some(i) != skip
                && key.iter().all(|column| {
                    let value = candidate.get(*column).unwrap_or(&Value::Null);
                    !value.is_null() && row.get(*column) == Some(value)
                })
        });
        if clash {
            return Err(DatabaseError::Conflict(format!("{} already exists", collection.label())));
        }
    }
    Ok(())
}
