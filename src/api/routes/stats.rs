use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use sprintify_core::models::{AdminOverview, SprintReport, UserOverview};
use uuid::Uuid;

use crate::api::auth::{self, AuthUser};
use crate::api::{ApiError, ApiPath, ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    let admin = Router::new()
        .route("/admin", get(admin_overview))
        .route_layer(middleware::from_fn(auth::require_admin));

    Router::new()
        .route("/overview", get(overview))
        .route("/sprints/{id}", get(sprint_report))
        .merge(admin)
}

async fn overview(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<UserOverview>>, ApiError> {
    let overview = state.db.user_overview(&user.uid, Utc::now())?;
    Ok(Json(ApiResponse::success(overview)))
}

async fn sprint_report(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<SprintReport>>, ApiError> {
    let report = state
        .db
        .sprint_report(&user.uid, id, Utc::now())?
        .ok_or_else(|| ApiError::not_found("sprint"))?;
    Ok(Json(ApiResponse::success(report)))
}

async fn admin_overview(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AdminOverview>>, ApiError> {
    let overview = state.db.admin_overview(Utc::now())?;
    Ok(Json(ApiResponse::success(overview)))
}
