use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::Profile;
use crate::handlers::{body, path_id, query};
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::profile_service::{AdminProfileUpdate, NewProfile};
use crate::services::{Page, Paging};

#[derive(Debug, Default, Deserialize)]
pub struct UserListParams {
    pub role: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// GET /api/admin/users?role=&page=&limit=
pub async fn users_get(
    State(state): State<AppState>,
    params: Result<Query<UserListParams>, QueryRejection>,
) -> ApiResult<Page<Profile>> {
    let params = query(params)?;
    let paging = Paging::new(params.page, params.limit);
    let page = state.services.profiles.list(params.role.as_deref(), paging).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/admin/users - 409 on a duplicate email
pub async fn users_post(
    State(state): State<AppState>,
    payload: Result<Json<NewProfile>, JsonRejection>,
) -> ApiResult<Profile> {
    let input = body(payload)?;
    let profile = state.services.profiles.create(input).await?;
    Ok(ApiResponse::created(profile))
}

/// GET /api/admin/users/:id
pub async fn user_get(State(state): State<AppState>, path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Profile> {
    let id = path_id(path)?;
    let profile = state.services.profiles.get(id).await?;
    Ok(ApiResponse::success(profile))
}

/// PATCH /api/admin/users/:id - role and active flag
pub async fn user_patch(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AdminProfileUpdate>, JsonRejection>,
) -> ApiResult<Profile> {
    let id = path_id(path)?;
    let update = body(payload)?;
    let profile = state.services.profiles.admin_update(&user.caller(), id, update).await?;
    Ok(ApiResponse::success(profile))
}
