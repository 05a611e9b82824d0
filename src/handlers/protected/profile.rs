use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::Extension;

use crate::app::AppState;
use crate::database::models::Profile;
use crate::handlers::body;
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::profile_service::ProfileUpdate;

/// GET /api/profile - the caller's own profile
pub async fn profile_get(State(state): State<AppState>, Extension(user): Extension<ValidatedUser>) -> ApiResult<Profile> {
    let profile = state.services.profiles.me(&user.caller()).await?;
    Ok(ApiResponse::success(profile))
}

/// PUT /api/profile - update name and phone
pub async fn profile_put(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Profile> {
    let update = body(payload)?;
    let profile = state.services.profiles.update_me(&user.caller(), update).await?;
    Ok(ApiResponse::success(profile))
}
