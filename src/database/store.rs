use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::collection::Collection;
use super::manager::DatabaseError;
use crate::filter::FilterData;

/// One row, as a JSON object keyed by column name.
pub type Record = Map<String, Value>;

/// A single write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Insert {
        collection: Collection,
        record: Record,
    },
    Update {
        collection: Collection,
        id: Uuid,
        changes: Record,
        /// Column values the row must still hold for the update to apply.
        /// A mismatch fails the whole batch with `DatabaseError::Conflict`.
        guard: Option<Record>,
    },
    /// Removes rows matching a (required) where clause. Yields `{"deleted": n}`.
    Delete {
        collection: Collection,
        filter: FilterData,
    },
}

impl WriteOp {
    pub fn insert(collection: Collection, record: &impl Serialize) -> Result<Self, DatabaseError> {
        Ok(WriteOp::Insert { collection, record: to_record(collection, record)? })
    }

    pub fn update(collection: Collection, id: Uuid, changes: Value) -> Result<Self, DatabaseError> {
        Ok(WriteOp::Update { collection, id, changes: object(collection, changes)?, guard: None })
    }

    pub fn delete(collection: Collection, filter: FilterData) -> Self {
        WriteOp::Delete { collection, filter: filter.without_paging() }
    }

    /// Only apply while the row still matches `guard` (compare-and-set).
    pub fn guarded(self, guard: Value) -> Result<Self, DatabaseError> {
        match self {
            WriteOp::Update { collection, id, changes, .. } => Ok(WriteOp::Update {
                collection,
                id,
                changes,
                guard: Some(object(collection, guard)?),
            }),
            other => Ok(other),
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Insert { collection, .. } | WriteOp::Update { collection, .. } | WriteOp::Delete { collection, .. } => {
                *collection
            }
        }
    }
}

/// Data access gateway: filtered reads and atomic writes over named collections.
#[async_trait]
pub trait Store: Send + Sync {
    async fn select(&self, collection: Collection, filter: FilterData) -> Result<Vec<Record>, DatabaseError>;

    async fn count(&self, collection: Collection, filter: FilterData) -> Result<i64, DatabaseError>;

    /// Apply every op or none. Returns the stored rows in op order.
    async fn write(&self, ops: Vec<WriteOp>) -> Result<Vec<Record>, DatabaseError>;

    /// Delete rows matching a (required) where clause. Returns rows removed.
    async fn delete(&self, collection: Collection, filter: FilterData) -> Result<u64, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

pub(crate) fn deleted(count: u64) -> Record {
    let mut record = Record::new();
    record.insert("deleted".to_string(), Value::from(count));
    record
}

pub fn to_record(collection: Collection, value: &impl Serialize) -> Result<Record, DatabaseError> {
    let value = serde_json::to_value(value).map_err(|e| DatabaseError::InvalidRecord {
        collection: collection.to_string(),
        message: e.to_string(),
    })?;
    object(collection, value)
}

fn object(collection: Collection, value: Value) -> Result<Record, DatabaseError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DatabaseError::InvalidRecord {
            collection: collection.to_string(),
            message: format!("expected JSON object, got {}", other),
        }),
    }
}
