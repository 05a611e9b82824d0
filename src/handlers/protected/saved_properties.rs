use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::Extension;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::SavedProperty;
use crate::handlers::path_id;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::saved_property_service::SavedPropertyView;

/// GET /api/saved-properties - the caller's bookmarks with a property summary each
pub async fn saved_get(State(state): State<AppState>, Extension(user): Extension<ValidatedUser>) -> ApiResult<Vec<SavedPropertyView>> {
    let saved = state.services.saved.list(&user.caller()).await?;
    Ok(ApiResponse::success(saved))
}

/// POST /api/saved-properties/:property_id - 409 when already saved
pub async fn saved_post(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<SavedProperty> {
    let property_id = path_id(path)?;
    let saved = state.services.saved.save(&user.caller(), property_id).await?;
    Ok(ApiResponse::created(saved))
}

/// DELETE /api/saved-properties/:property_id
pub async fn saved_delete(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Value> {
    let property_id = path_id(path)?;
    state.services.saved.unsave(&user.caller(), property_id).await?;
    Ok(ApiResponse::success(json!({ "property_id": property_id, "deleted": true })))
}
