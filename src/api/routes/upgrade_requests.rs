use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use sprintify_core::models::{
    CreateUpgradeRequestInput, ReviewUpgradeInput, Role, UpgradeRequest, UpgradeReview,
    UpgradeStatus,
};
use uuid::Uuid;

use crate::api::auth::AuthUser;
use crate::api::{optional_json, ApiError, ApiJson, ApiPath, ApiQuery, ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/mine", get(my_requests))
        .route("/{id}/approve", post(approve))
        .route("/{id}/reject", post(reject))
}

#[derive(Debug, Deserialize)]
pub struct UpgradeListQuery {
    pub status: Option<UpgradeStatus>,
}

async fn create_request(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<CreateUpgradeRequestInput>,
) -> Result<(StatusCode, Json<ApiResponse<UpgradeRequest>>), ApiError> {
    let request = state.db.create_upgrade_request(&user.uid, input)?;
    tracing::info!(user = %user.uid, request = %request.id, "upgrade requested");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(request).with_message("upgrade request submitted")),
    ))
}

async fn my_requests(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<UpgradeRequest>>>, ApiError> {
    let requests = state.db.list_user_upgrade_requests(&user.uid)?;
    Ok(Json(ApiResponse::success(requests)))
}

async fn list_requests(
    State(state): State<AppState>,
    admin: AuthUser,
    ApiQuery(query): ApiQuery<UpgradeListQuery>,
) -> Result<Json<ApiResponse<Vec<UpgradeRequest>>>, ApiError> {
    admin.require(Role::Admin)?;
    let requests = state.db.list_upgrade_requests(query.status)?;
    Ok(Json(ApiResponse::success(requests)))
}

async fn approve(
    State(state): State<AppState>,
    admin: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<UpgradeReview>>, ApiError> {
    admin.require(Role::Admin)?;
    let note = optional_json::<ReviewUpgradeInput>(&body)?.note;
    let review = state
        .db
        .approve_upgrade_request(id, &admin.uid, note)?
        .ok_or_else(|| ApiError::not_found("upgrade request"))?;
    tracing::info!(admin = %admin.uid, user = %review.request.user_id, "upgrade approved");
    state.notify(review.notification.clone());
    Ok(Json(ApiResponse::success(review)))
}

async fn reject(
    State(state): State<AppState>,
    admin: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Bytes,
) -> Result<Json<ApiResponse<UpgradeReview>>, ApiError> {
    admin.require(Role::Admin)?;
    let note = optional_json::<ReviewUpgradeInput>(&body)?.note;
    let review = state
        .db
        .reject_upgrade_request(id, &admin.uid, note)?
        .ok_or_else(|| ApiError::not_found("upgrade request"))?;
    tracing::info!(admin = %admin.uid, user = %review.request.user_id, "upgrade rejected");
    state.notify(review.notification.clone());
    Ok(Json(ApiResponse::success(review)))
}
