use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::RequestStatusHistory;
use crate::handlers::{body, path_id, query};
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::request_service::{NewRequest, RequestListQuery, RequestView};
use crate::services::{Page, Paging};

#[derive(Debug, Default, Deserialize)]
pub struct RequestListParams {
    #[serde(rename = "viewAll")]
    pub view_all: Option<bool>,
    pub mine: Option<bool>,
    pub status: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// GET /api/property-requests - list visible requests
///
/// Customers always get their own. Staff get the requests they opened unless
/// they pass `viewAll=true`; `mine=true` lists the ones assigned to them.
pub async fn requests_get(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    params: Result<Query<RequestListParams>, QueryRejection>,
) -> ApiResult<Page<RequestView>> {
    let params = query(params)?;
    let paging = Paging::new(params.page, params.limit);
    let list = RequestListQuery {
        view_all: params.view_all.unwrap_or(false),
        mine: params.mine.unwrap_or(false),
        status: params.status,
    };
    let page = state.services.requests.list(&user.caller(), list, paging).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/property-requests - open a new request
pub async fn requests_post(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<NewRequest>, JsonRejection>,
) -> ApiResult<RequestView> {
    let input = body(payload)?;
    let view = state.services.requests.create(&user.caller(), input).await?;
    Ok(ApiResponse::created(view))
}

/// GET /api/property-requests/:id - request with parties and visible history
pub async fn request_get(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<RequestView> {
    let id = path_id(path)?;
    let view = state.services.requests.get(&user.caller(), id).await?;
    Ok(ApiResponse::success(view))
}

/// PUT /api/property-requests/:id - partial update, field whitelist depends on role
pub async fn request_put(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<RequestView> {
    let id = path_id(path)?;
    let changes = body(payload)?;
    let view = state.services.requests.update(&user.caller(), id, changes).await?;
    Ok(ApiResponse::success(view))
}

/// DELETE /api/property-requests/:id - owner or admin
pub async fn request_delete(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Value> {
    let id = path_id(path)?;
    state.services.requests.delete(&user.caller(), id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

/// GET /api/property-requests/:id/history - oldest first, private rows hidden from customers
pub async fn request_history_get(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<RequestStatusHistory>> {
    let id = path_id(path)?;
    let history = state.services.requests.history(&user.caller(), id).await?;
    Ok(ApiResponse::success(history))
}
