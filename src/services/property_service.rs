use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{non_blank, now, Page, Paging, ServiceContext, ServiceError};
use crate::access::Caller;
use crate::database::models::Property;
use crate::database::{Collection, Repository, Store, WriteOp};
use crate::filter::FilterData;

/// Listing filters accepted by `GET /api/properties`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyQuery {
    pub property_type: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub available: Option<bool>,
    pub sort: Option<String>,
}

/// Body of create and update. On update only the supplied fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<String>,
}

impl PropertyInput {
    fn validate(&self, creating: bool) -> Result<(), ServiceError> {
        let mut errors = HashMap::new();
        for (field, value) in [
            ("title", &self.title),
            ("property_type", &self.property_type),
            ("location", &self.location),
        ] {
            match value {
                Some(v) if v.trim().is_empty() => {
                    errors.insert(field.to_string(), format!("{} cannot be empty", field));
                }
                None if creating => {
                    errors.insert(field.to_string(), format!("{} is required", field));
                }
                _ => {}
            }
        }
        if matches!(self.price, Some(p) if p < 0.0 || !p.is_finite()) {
            errors.insert("price".into(), "Price must be zero or greater".into());
        }
        for (field, value) in [("bedrooms", self.bedrooms), ("bathrooms", self.bathrooms)] {
            if matches!(value, Some(n) if n < 0) {
                errors.insert(field.to_string(), format!("{} cannot be negative", field));
            }
        }
        if matches!(self.area_size, Some(a) if a < 0.0) {
            errors.insert("area_size".into(), "Area size cannot be negative".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::fields("Invalid property", errors))
        }
    }
}

#[derive(Clone)]
pub struct PropertyService {
    properties: Repository<Property>,
    store: Arc<dyn Store>,
}

impl PropertyService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            properties: Repository::new(Collection::Properties, store.clone()),
            store,
        }
    }

    /// Customers only ever see available listings.
    pub async fn list(&self, caller: &Caller, query: PropertyQuery, paging: Paging) -> Result<Page<Property>, ServiceError> {
        let mut filter = FilterData::new();

        if let Some(kind) = non_blank(query.property_type.as_deref()) {
            filter = filter.and_where(json!({ "property_type": kind }));
        }
        if let Some(location) = non_blank(query.location.as_deref()) {
            filter = filter.and_where(json!({ "location": { "$ilike": format!("%{}%", escape_like(&location)) } }));
        }
        let mut price = Map::new();
        if let Some(min) = query.min_price {
            price.insert("$gte".into(), json!(min));
        }
        if let Some(max) = query.max_price {
            price.insert("$lte".into(), json!(max));
        }
        if !price.is_empty() {
            filter = filter.and_where(json!({ "price": price }));
        }
        if let Some(n) = query.bedrooms {
            filter = filter.and_where(json!({ "bedrooms": { "$gte": n } }));
        }
        if let Some(n) = query.bathrooms {
            filter = filter.and_where(json!({ "bathrooms": { "$gte": n } }));
        }
        let available = if caller.role.is_staff() { query.available } else { Some(true) };
        if let Some(available) = available {
            filter = filter.and_where(json!({ "available": available }));
        }

        let order = match query.sort.as_deref().unwrap_or("newest") {
            "newest" => "created_at desc",
            "price_asc" => "price asc",
            "price_desc" => "price desc",
            "popular" => "views_count desc, created_at desc",
            other => {
                return Err(ServiceError::field(
                    "sort",
                    format!("Unknown sort '{}', expected newest, price_asc, price_desc or popular", other),
                ))
            }
        };

        let (items, total) = self
            .properties
            .select_page(filter.clone(), paging.apply(filter.order_by(order)))
            .await
            .context("Failed to list properties")?;
        Ok(Page::new(items, total, paging))
    }

    /// Counts a view. Concurrent reads may lose increments (last write wins).
    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<Property, ServiceError> {
        let property = self.find_visible(caller, id).await?;
        let op = WriteOp::update(Collection::Properties, id, json!({ "views_count": property.views_count + 1 }))?;
        match self.store.write(vec![op]).await.context("Failed to record property view")?.pop() {
            Some(row) => Ok(self.properties.decode(row)?),
            None => Ok(property),
        }
    }

    /// Plain lookup without counting a view. Unavailable listings are hidden from customers.
    pub async fn find_visible(&self, caller: &Caller, id: Uuid) -> Result<Property, ServiceError> {
        let property = self.properties.find(id).await.context("Failed to load property")?;
        if !property.available && !caller.role.is_staff() {
            return Err(ServiceError::not_found("Property"));
        }
        Ok(property)
    }

    pub async fn create(&self, caller: &Caller, input: PropertyInput) -> Result<Property, ServiceError> {
        input.validate(true)?;
        let timestamp = now();
        let property = Property {
            id: Uuid::new_v4(),
            title: input.title.unwrap_or_default().trim().to_string(),
            description: non_blank(input.description.as_deref()),
            property_type: input.property_type.unwrap_or_default().trim().to_string(),
            location: input.location.unwrap_or_default().trim().to_string(),
            price: input.price.unwrap_or(0.0),
            bedrooms: input.bedrooms,
            bathrooms: input.bathrooms,
            area_size: input.area_size,
            available: input.available.unwrap_or(true),
            featured_image: non_blank(input.featured_image.as_deref()),
            created_by: caller.id,
            views_count: 0,
            created_at: timestamp,
            updated_at: timestamp,
        };
        self.store
            .write(vec![WriteOp::insert(Collection::Properties, &property)?])
            .await
            .context("Failed to create property")?;
        tracing::info!(property_id = %property.id, created_by = %caller.id, "Property created");
        Ok(property)
    }

    pub async fn update(&self, id: Uuid, input: PropertyInput) -> Result<Property, ServiceError> {
        input.validate(false)?;
        let changes = match serde_json::to_value(&input) {
            Ok(Value::Object(map)) if !map.is_empty() => map,
            Ok(_) => return Err(ServiceError::validation("No property fields to update")),
            Err(e) => return Err(ServiceError::unexpected("Failed to encode property update", e)),
        };
        self.properties.find(id).await.context("Failed to load property")?;
        self.write_update(id, changes).await
    }

    pub async fn set_availability(&self, id: Uuid, available: bool) -> Result<Property, ServiceError> {
        self.properties.find(id).await.context("Failed to load property")?;
        let mut changes = Map::new();
        changes.insert("available".into(), Value::Bool(available));
        self.write_update(id, changes).await
    }

    /// Removes the listing with its saved-property rows and viewings.
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.properties.find(id).await.context("Failed to load property")?;
        let by_property = FilterData::matching(json!({ "property_id": id.to_string() }));
        let ops = vec![
            WriteOp::delete(Collection::SavedProperties, by_property.clone()),
            WriteOp::delete(Collection::ScheduledViewings, by_property),
            WriteOp::delete(Collection::Properties, FilterData::by_id(id)),
        ];
        self.store.write(ops).await.context("Failed to delete property")?;
        tracing::info!(property_id = %id, "Property deleted");
        Ok(())
    }

    async fn write_update(&self, id: Uuid, mut changes: Map<String, Value>) -> Result<Property, ServiceError> {
        changes.insert("updated_at".into(), json!(now()));
        let op = WriteOp::update(Collection::Properties, id, Value::Object(changes))?;
        let row = self
            .store
            .write(vec![op])
            .await
            .context("Failed to update property")?
            .pop()
            .ok_or_else(|| ServiceError::not_found("Property"))?;
        Ok(self.properties.decode(row)?)
    }
}

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
