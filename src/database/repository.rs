use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::database::collection::Collection;
use crate::database::manager::DatabaseError;
use crate::database::store::{Record, Store};
use crate::filter::FilterData;

/// Typed view of one collection.
pub struct Repository<T> {
    collection: Collection,
    store: Arc<dyn Store>,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self { collection: self.collection, store: self.store.clone(), _phantom: PhantomData }
    }
}

impl<T> Repository<T>
where
    T: DeserializeOwned + Serialize + Send + Sync,
{
    pub fn new(collection: Collection, store: Arc<dyn Store>) -> Self {
        Self {
            collection,
            store,
            _phantom: PhantomData,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub async fn select_any(&self, filter_data: FilterData) -> Result<Vec<T>, DatabaseError> {
        let rows = self.store.select(self.collection, filter_data).await?;
        rows.into_iter().map(|row| self.decode(row)).collect()
    }

    pub async fn select_one(&self, filter_data: FilterData) -> Result<Option<T>, DatabaseError> {
        let mut rows = self.store.select(self.collection, filter_data.limit(1)).await?;
        match rows.pop() {
            Some(row) => Ok(Some(self.decode(row)?)),
            None => Ok(None),
        }
    }

    pub async fn select_404(&self, filter_data: FilterData) -> Result<T, DatabaseError> {
        self.select_one(filter_data)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{} not found", self.collection.label())))
    }

    pub async fn find(&self, id: Uuid) -> Result<T, DatabaseError> {
        self.select_404(FilterData::by_id(id)).await
    }

    pub async fn count(&self, filter_data: FilterData) -> Result<i64, DatabaseError> {
        self.store.count(self.collection, filter_data).await
    }

    /// One page of rows plus the unpaged total, queried concurrently.
    pub async fn select_page(&self, filter_data: FilterData, page: FilterData) -> Result<(Vec<T>, i64), DatabaseError> {
        futures::try_join!(self.select_any(page), self.count(filter_data))
    }

    pub async fn select_ids(&self, ids: Vec<Uuid>) -> Result<Vec<T>, DatabaseError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let filter = FilterData {
            where_clause: Some(json!({ "id": { "$in": ids } })),
            ..Default::default()
        };
        self.select_any(filter).await
    }

    pub fn decode(&self, row: Record) -> Result<T, DatabaseError> {
        serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| DatabaseError::InvalidRecord {
            collection: self.collection.to_string(),
            message: e.to_string(),
        })
    }
}
