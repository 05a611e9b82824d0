use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::{now, ServiceContext, ServiceError};
use crate::access::Caller;
use crate::database::models::property::PropertySummary;
use crate::database::models::{Property, SavedProperty};
use crate::database::{Collection, DatabaseError, Repository, Store, WriteOp};
use crate::filter::FilterData;

#[derive(Debug, Clone, Serialize)]
pub struct SavedPropertyView {
    pub id: Uuid,
    pub property_id: Uuid,
    pub property: Option<PropertySummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SavedPropertyService {
    saved: Repository<SavedProperty>,
    properties: Repository<Property>,
    store: Arc<dyn Store>,
}

impl SavedPropertyService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            saved: Repository::new(Collection::SavedProperties, store.clone()),
            properties: Repository::new(Collection::Properties, store.clone()),
            store,
        }
    }

    pub async fn list(&self, caller: &Caller) -> Result<Vec<SavedPropertyView>, ServiceError> {
        let rows = self
            .saved
            .select_any(FilterData::matching(json!({ "user_id": caller.id.to_string() })).order_by("created_at desc"))
            .await
            .context("Failed to list saved properties")?;

        let properties: HashMap<Uuid, PropertySummary> = self
            .properties
            .select_ids(rows.iter().map(|s| s.property_id).collect())
            .await
            .context("Failed to load saved listings")?
            .iter()
            .map(|p| (p.id, PropertySummary::from(p)))
            .collect();

        Ok(rows
            .into_iter()
            .map(|s| SavedPropertyView {
                id: s.id,
                property_id: s.property_id,
                property: properties.get(&s.property_id).cloned(),
                created_at: s.created_at,
            })
            .collect())
    }

    /// Unknown property is not found; saving twice is a conflict.
    pub async fn save(&self, caller: &Caller, property_id: Uuid) -> Result<SavedProperty, ServiceError> {
        self.properties.find(property_id).await.context("Failed to load property")?;

        let saved = SavedProperty {
            id: Uuid::new_v4(),
            user_id: caller.id,
            property_id,
            created_at: now(),
        };
        match self.store.write(vec![WriteOp::insert(Collection::SavedProperties, &saved)?]).await {
            Ok(_) => Ok(saved),
            Err(DatabaseError::Conflict(_)) => Err(ServiceError::Conflict("Property is already saved".into())),
            Err(e) => Err(ServiceError::unexpected("Failed to save property", e)),
        }
    }

    pub async fn unsave(&self, caller: &Caller, property_id: Uuid) -> Result<(), ServiceError> {
        let removed = self
            .store
            .delete(
                Collection::SavedProperties,
                FilterData::matching(json!({ "user_id": caller.id.to_string(), "property_id": property_id.to_string() })),
            )
            .await
            .context("Failed to unsave property")?;
        if removed == 0 {
            return Err(ServiceError::not_found("Saved property"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn save_twice_conflicts_and_unsave_unknown_is_not_found() {
        let ctx = TestContext::new();
        let staff = ctx.seed_profile("Rex", Role::SalesOps).await;
        let customer = Caller::new(ctx.seed_profile("Cy", Role::Customer).await.id, Role::Customer);
        let property = ctx.seed_property(staff.id).await;
        let saved = &ctx.services.saved;

        saved.save(&customer, property.id).await.unwrap();
        assert!(matches!(saved.save(&customer, property.id).await, Err(ServiceError::Conflict(_))));
        assert!(matches!(saved.save(&customer, Uuid::new_v4()).await, Err(ServiceError::NotFound(_))));

        let list = saved.list(&customer).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].property.as_ref().map(|p| p.id), Some(property.id));

        saved.unsave(&customer, property.id).await.unwrap();
        assert!(matches!(saved.unsave(&customer, property.id).await, Err(ServiceError::NotFound(_))));
    }
}
