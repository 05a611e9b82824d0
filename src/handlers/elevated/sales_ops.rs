use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use axum::Extension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::profile::ProfileSummary;
use crate::database::models::Property;
use crate::handlers::{body, path_id};
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::property_service::PropertyInput;
use crate::services::request_service::{AssignInput, RequestView, StatusUpdate};
use crate::services::viewing_service::{CompleteInput, ProposeInput, ViewingView};
use crate::services::ServiceError;

#[derive(Debug, Deserialize)]
pub struct AvailabilityInput {
    pub available: Option<bool>,
}

/// GET /api/sales-ops/team - active sales_ops members for assignment
pub async fn team_get(State(state): State<AppState>) -> ApiResult<Vec<ProfileSummary>> {
    let team = state.services.profiles.team().await?;
    Ok(ApiResponse::success(team))
}

// Properties

/// POST /api/sales-ops/properties
pub async fn properties_post(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<PropertyInput>, JsonRejection>,
) -> ApiResult<Property> {
    let input = body(payload)?;
    let property = state.services.properties.create(&user.caller(), input).await?;
    Ok(ApiResponse::created(property))
}

/// PUT /api/sales-ops/properties/:id
pub async fn property_put(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PropertyInput>, JsonRejection>,
) -> ApiResult<Property> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let property = state.services.properties.update(id, input).await?;
    Ok(ApiResponse::success(property))
}

/// PATCH /api/sales-ops/properties/:id/availability
pub async fn property_availability_patch(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AvailabilityInput>, JsonRejection>,
) -> ApiResult<Property> {
    let id = path_id(path)?;
    let available = body(payload)?
        .available
        .ok_or_else(|| ServiceError::field("available", "available is required"))?;
    let property = state.services.properties.set_availability(id, available).await?;
    Ok(ApiResponse::success(property))
}

/// DELETE /api/sales-ops/properties/:id - also drops bookmarks and viewings of the listing
pub async fn property_delete(State(state): State<AppState>, path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Value> {
    let id = path_id(path)?;
    state.services.properties.delete(id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

// Property requests

/// POST /api/sales-ops/property-requests/:id/assign
pub async fn request_assign(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AssignInput>, JsonRejection>,
) -> ApiResult<RequestView> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let view = state.services.requests.assign(&user.caller(), id, input).await?;
    Ok(ApiResponse::success(view))
}

/// POST /api/sales-ops/property-requests/:id/status - status change with a history note
pub async fn request_status(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<RequestView> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let view = state.services.requests.add_status_update(&user.caller(), id, input).await?;
    Ok(ApiResponse::success(view))
}

// Scheduled viewings

/// POST /api/sales-ops/scheduled-viewings/:id/propose
pub async fn viewing_propose(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ProposeInput>, JsonRejection>,
) -> ApiResult<ViewingView> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let view = state.services.viewings.propose(&user.caller(), id, input).await?;
    Ok(ApiResponse::success(view))
}

/// POST /api/sales-ops/scheduled-viewings/:id/confirm
pub async fn viewing_confirm(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ViewingView> {
    let id = path_id(path)?;
    let view = state.services.viewings.confirm(&user.caller(), id).await?;
    Ok(ApiResponse::success(view))
}

/// POST /api/sales-ops/scheduled-viewings/:id/complete
pub async fn viewing_complete(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CompleteInput>, JsonRejection>,
) -> ApiResult<ViewingView> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let view = state.services.viewings.complete(&user.caller(), id, input).await?;
    Ok(ApiResponse::success(view))
}
