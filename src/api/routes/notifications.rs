use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use sprintify_core::models::Notification;
use uuid::Uuid;

use crate::api::auth::AuthUser;
use crate::api::{ApiError, ApiPath, ApiQuery, ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read-all", put(read_all))
        .route("/{id}/read", put(mark_read))
        .route("/{id}", delete(remove))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Count {
    pub count: u64,
}

async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Json<ApiResponse<Vec<Notification>>>, ApiError> {
    let notifications = state
        .db
        .list_notifications(&user.uid, query.unread, query.limit)?;
    Ok(Json(ApiResponse::success(notifications)))
}

async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Count>>, ApiError> {
    let count = state.db.unread_count(&user.uid)?;
    Ok(Json(ApiResponse::success(Count { count })))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Notification>>, ApiError> {
    let notification = state
        .db
        .mark_read(&user.uid, id)?
        .ok_or_else(|| ApiError::not_found("notification"))?;
    Ok(Json(ApiResponse::success(notification)))
}

async fn read_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Count>>, ApiError> {
    let count = state.db.mark_all_read(&user.uid)?;
    Ok(Json(ApiResponse::success(Count { count })))
}

async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if !state.db.delete_notification(&user.uid, id)? {
        return Err(ApiError::not_found("notification"));
    }
    Ok(Json(ApiResponse::message("notification deleted")))
}
