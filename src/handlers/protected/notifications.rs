use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Extension;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::Notification;
use crate::handlers::{path_id, query};
use crate::middleware::{ApiResponse, ApiResult, ValidatedUser};
use crate::services::{Page, Paging};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationListParams {
    pub unread: Option<bool>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// GET /api/notifications - newest first, `unread=true` for the unread ones only
pub async fn notifications_get(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    params: Result<Query<NotificationListParams>, QueryRejection>,
) -> ApiResult<Page<Notification>> {
    let params = query(params)?;
    let paging = Paging::new(params.page, params.limit);
    let page = state
        .services
        .notifications
        .list(&user.caller(), params.unread.unwrap_or(false), paging)
        .await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/notifications/unread-count
pub async fn unread_count_get(State(state): State<AppState>, Extension(user): Extension<ValidatedUser>) -> ApiResult<Value> {
    let count = state.services.notifications.unread_count(&user.caller()).await?;
    Ok(ApiResponse::success(json!({ "count": count })))
}

/// PUT /api/notifications/:id/read
pub async fn notification_read_put(
    State(state): State<AppState>,
    Extension(user): Extension<ValidatedUser>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Notification> {
    let id = path_id(path)?;
    let notification = state.services.notifications.mark_read(&user.caller(), id).await?;
    Ok(ApiResponse::success(notification))
}

/// PUT /api/notifications/read-all
pub async fn read_all_put(State(state): State<AppState>, Extension(user): Extension<ValidatedUser>) -> ApiResult<Value> {
    let updated = state.services.notifications.mark_all_read(&user.caller()).await?;
    Ok(ApiResponse::success(json!({ "updated": updated })))
}
