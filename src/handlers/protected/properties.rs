use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::Property;
use crate::handlers::{path_id, query};
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::property_service::PropertyQuery;
use crate::services::{Page, Paging};

#[derive(Debug, Default, Deserialize)]
pub struct PropertyListParams {
    pub property_type: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub available: Option<bool>,
    pub sort: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

impl PropertyListParams {
    fn split(self) -> (PropertyQuery, Paging) {
        let paging = Paging::new(self.page, self.limit);
        let query = PropertyQuery {
            property_type: self.property_type,
            location: self.location,
            min_price: self.min_price,
            max_price: self.max_price,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            available: self.available,
            sort: self.sort,
        };
        (query, paging)
    }
}

/// GET /api/properties - browse listings; customers only see available ones
pub async fn properties_get(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    params: Result<Query<PropertyListParams>, QueryRejection>,
) -> ApiResult<Page<Property>> {
    let (filters, paging) = query(params)?.split();
    let page = state.services.properties.list(&user.caller(), filters, paging).await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/properties/:id - single listing, counts as a view
pub async fn property_get(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Property> {
    let id = path_id(path)?;
    let property = state.services.properties.get(&user.caller(), id).await?;
    Ok(ApiResponse::success(property))
}
