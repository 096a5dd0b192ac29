use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use sprintify_core::models::{CreateUserInput, UpdateProfileInput, User};
use sprintify_core::quota::QuotaStatus;

use crate::api::auth::{AuthUser, Identity};
use crate::api::{optional_json, ApiError, ApiJson, ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/me", get(me))
        .route("/profile", put(update_profile))
        .route("/fcm-token", post(add_fcm_token).delete(remove_fcm_token))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub ai_usage: QuotaStatus,
}

#[derive(Debug, Deserialize)]
pub struct FcmTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct FcmTokens {
    pub fcm_tokens: Vec<String>,
}

async fn register(
    State(state): State<AppState>,
    Identity(caller): Identity,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<User>>), ApiError> {
    if caller.registered {
        return Err(ApiError::Conflict("user already registered".into()));
    }
    let request: RegisterRequest = optional_json(&body)?;
    let display_name = request
        .display_name
        .or(caller.name)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let user = state.db.create_user(CreateUserInput {
        uid: caller.uid,
        email: caller.email,
        display_name,
        role: None,
    })?;
    state.db.touch_login(&user.uid)?;
    tracing::info!(user = %user.uid, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(user).with_message("registration complete")),
    ))
}

async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<MeResponse>>, ApiError> {
    state.db.touch_login(&user.uid)?;
    let profile = state
        .db
        .get_user(&user.uid)?
        .ok_or_else(|| ApiError::not_found("user"))?;
    let limits = state.quota_policy().limits_for(profile.role);
    let usage = state.db.get_ai_usage(&user.uid, chrono::Utc::now())?;
    Ok(Json(ApiResponse::success(MeResponse {
        user: profile,
        ai_usage: sprintify_core::quota::status(&usage, limits),
    })))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<UpdateProfileInput>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let updated = state
        .db
        .update_profile(&user.uid, input)?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn add_fcm_token(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<FcmTokenRequest>,
) -> Result<Json<ApiResponse<FcmTokens>>, ApiError> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("token must not be empty".into()));
    }
    let fcm_tokens = state
        .db
        .add_fcm_token(&user.uid, token)?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(ApiResponse::success(FcmTokens { fcm_tokens })))
}

async fn remove_fcm_token(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<FcmTokenRequest>,
) -> Result<Json<ApiResponse<FcmTokens>>, ApiError> {
    let fcm_tokens = state
        .db
        .remove_fcm_token(&user.uid, request.token.trim())?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(ApiResponse::success(FcmTokens { fcm_tokens })))
}
