use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::handlers::{body, path_id, query};
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::viewing_service::{CancelInput, NewViewing, SelectInput, ViewingListQuery, ViewingView};
use crate::services::{Page, Paging};

#[derive(Debug, Default, Deserialize)]
pub struct ViewingListParams {
    #[serde(rename = "viewAll")]
    pub view_all: Option<bool>,
    pub mine: Option<bool>,
    pub status: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// GET /api/scheduled-viewings - own viewings; staff widen with `viewAll=true` or switch to the ones they handle with `mine=true`
pub async fn viewings_get(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    params: Result<Query<ViewingListParams>, QueryRejection>,
) -> ApiResult<Page<ViewingView>> {
    let params = query(params)?;
    let paging = Paging::new(params.page, params.limit);
    let list = ViewingListQuery {
        view_all: params.view_all.unwrap_or(false),
        mine: params.mine.unwrap_or(false),
        status: params.status,
    };
    let page = state.services.viewings.list(&user.caller(), list, paging).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/scheduled-viewings - ask for a viewing of an available property
pub async fn viewings_post(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    payload: Result<Json<NewViewing>, JsonRejection>,
) -> ApiResult<ViewingView> {
    let input = body(payload)?;
    let view = state.services.viewings.create(&user.caller(), input).await?;
    Ok(ApiResponse::created(view))
}

/// GET /api/scheduled-viewings/:id
pub async fn viewing_get(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ViewingView> {
    let id = path_id(path)?;
    let view = state.services.viewings.get(&user.caller(), id).await?;
    Ok(ApiResponse::success(view))
}

/// POST /api/scheduled-viewings/:id/select - customer picks one of the proposed slots
pub async fn viewing_select(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SelectInput>, JsonRejection>,
) -> ApiResult<ViewingView> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let view = state.services.viewings.select(&user.caller(), id, input).await?;
    Ok(ApiResponse::success(view))
}

/// POST /api/scheduled-viewings/:id/cancel
pub async fn viewing_cancel(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CancelInput>, JsonRejection>,
) -> ApiResult<ViewingView> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let view = state.services.viewings.cancel(&user.caller(), id, input).await?;
    Ok(ApiResponse::success(view))
}
