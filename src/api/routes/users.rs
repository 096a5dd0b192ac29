//! Admin-only user management.

use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use sprintify_core::models::{
    CreateNotificationInput, NotificationKind, Role, User, UserFilter, UserPage,
};

use crate::api::auth::{self, AuthUser};
use crate::api::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/{uid}", get(get_user).delete(delete_user))
        .route("/{uid}/role", put(set_role))
        .route("/{uid}/disabled", put(set_disabled))
        .route_layer(middleware::from_fn(auth::require_admin))
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetDisabledRequest {
    pub disabled: bool,
}

async fn list_users(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> Result<Json<ApiResponse<UserPage>>, ApiError> {
    let page = state.db.list_users(&filter)?;
    Ok(Json(ApiResponse::success(page)))
}

async fn get_user(
    State(state): State<AppState>,
    ApiPath(uid): ApiPath<String>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state
        .db
        .get_user(&uid)?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(ApiResponse::success(user)))
}

fn load_user(state: &AppState, uid: &str) -> Result<User, ApiError> {
    state
        .db
        .get_user(uid)?
        .ok_or_else(|| ApiError::not_found("user"))
}

async fn set_role(
    State(state): State<AppState>,
    admin: AuthUser,
    ApiPath(uid): ApiPath<String>,
    ApiJson(request): ApiJson<SetRoleRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    if uid == admin.uid && request.role != Role::Admin {
        return Err(ApiError::BadRequest("you cannot demote yourself".into()));
    }
    let before = load_user(&state, &uid)?;
    if before.role == request.role {
        return Ok(Json(ApiResponse::success(before)));
    }

    state.db.set_role(&uid, request.role)?;
    tracing::info!(admin = %admin.uid, user = %uid, from = ?before.role, to = ?request.role, "role changed");

    let notification = state.db.create_notification(
        CreateNotificationInput::new(
            &uid,
            NotificationKind::System,
            "Account role changed",
            format!(
                "Your account role changed from {} to {}.",
                before.role.as_str(),
                request.role.as_str()
            ),
        )
        .with_link("/profile"),
    )?;
    state.notify(notification);

    let user = load_user(&state, &uid)?;
    Ok(Json(ApiResponse::success(user)))
}

async fn set_disabled(
    State(state): State<AppState>,
    admin: AuthUser,
    ApiPath(uid): ApiPath<String>,
    ApiJson(request): ApiJson<SetDisabledRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    if uid == admin.uid && request.disabled {
        return Err(ApiError::BadRequest("you cannot disable your own account".into()));
    }
    if !state.db.set_disabled(&uid, request.disabled)? {
        return Err(ApiError::not_found("user"));
    }
    tracing::info!(admin = %admin.uid, user = %uid, disabled = request.disabled, "account status changed");
    let user = load_user(&state, &uid)?;
    Ok(Json(ApiResponse::success(user)))
}

async fn delete_user(
    State(state): State<AppState>,
    admin: AuthUser,
    ApiPath(uid): ApiPath<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if uid == admin.uid {
        return Err(ApiError::BadRequest("you cannot delete your own account".into()));
    }
    if !state.db.delete_user(&uid)? {
        return Err(ApiError::not_found("user"));
    }
    tracing::info!(admin = %admin.uid, user = %uid, "user deleted");
    Ok(Json(ApiResponse::message("user deleted")))
}
