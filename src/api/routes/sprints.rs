//! Sprints and their tasks and milestones. Every route is scoped to the caller's own sprints.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use sprintify_core::models::*;
use uuid::Uuid;

use crate::api::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResponse, AppState};
use crate::api::auth::AuthUser;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sprints).post(create_sprint))
        .route(
            "/{id}",
            get(get_sprint).put(update_sprint).delete(delete_sprint),
        )
        .route("/{id}/tasks", get(list_tasks).post(create_task))
        .route("/{id}/tasks/reorder", put(reorder_tasks))
        .route(
            "/{id}/tasks/{task_id}",
            put(update_task).delete(delete_task),
        )
        .route(
            "/{id}/milestones",
            get(list_milestones).post(create_milestone),
        )
        .route(
            "/{id}/milestones/{milestone_id}",
            put(update_milestone).delete(delete_milestone),
        )
        .route(
            "/{id}/milestones/{milestone_id}/complete",
            post(complete_milestone),
        )
}

#[derive(Debug, Deserialize)]
pub struct SprintListQuery {
    pub status: Option<SprintStatus>,
}

async fn list_sprints(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<SprintListQuery>,
) -> Result<Json<ApiResponse<Vec<Sprint>>>, ApiError> {
    let sprints = state.db.list_sprints(&user.uid, query.status)?;
    Ok(Json(ApiResponse::success(sprints)))
}

/// Normal users may hold a limited number of open sprints at once.
pub(crate) fn ensure_sprint_capacity(state: &AppState, user: &AuthUser) -> Result<(), ApiError> {
    if user.role != Role::Normal {
        return Ok(());
    }
    let open = state.db.count_open_sprints(&user.uid)?;
    if open >= state.config.max_open_sprints {
        return Err(ApiError::Forbidden(format!(
            "normal accounts may have at most {} open sprints, upgrade to premium for more",
            state.config.max_open_sprints
        )));
    }
    Ok(())
}

async fn create_sprint(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<CreateSprintInput>,
) -> Result<(StatusCode, Json<ApiResponse<Sprint>>), ApiError> {
    ensure_sprint_capacity(&state, &user)?;
    let sprint = state.db.create_sprint(&user.uid, input)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(sprint).with_message("sprint created")),
    ))
}

async fn get_sprint(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<SprintDetail>>, ApiError> {
    let detail = state
        .db
        .get_sprint_detail(&user.uid, id)?
        .ok_or_else(|| ApiError::not_found("sprint"))?;
    Ok(Json(ApiResponse::success(detail)))
}

async fn update_sprint(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<UpdateSprintInput>,
) -> Result<Json<ApiResponse<Sprint>>, ApiError> {
    let sprint = state
        .db
        .update_sprint(&user.uid, id, input)?
        .ok_or_else(|| ApiError::not_found("sprint"))?;
    Ok(Json(ApiResponse::success(sprint)))
}

async fn delete_sprint(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if !state.db.delete_sprint(&user.uid, id)? {
        return Err(ApiError::not_found("sprint"));
    }
    tracing::info!(user = %user.uid, sprint = %id, "sprint deleted");
    Ok(Json(ApiResponse::message("sprint deleted")))
}

async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = state
        .db
        .list_tasks(&user.uid, id)?
        .ok_or_else(|| ApiError::not_found("sprint"))?;
    Ok(Json(ApiResponse::success(tasks)))
}

async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<CreateTaskInput>,
) -> Result<(StatusCode, Json<ApiResponse<Task>>), ApiError> {
    let task = state
        .db
        .create_task(&user.uid, id, input)?
        .ok_or_else(|| ApiError::not_found("sprint"))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(task))))
}

async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((id, task_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(input): ApiJson<UpdateTaskInput>,
) -> Result<Json<ApiResponse<Task>>, ApiError> {
    let task = state
        .db
        .update_task(&user.uid, id, task_id, input)?
        .ok_or_else(|| ApiError::not_found("task"))?;
    Ok(Json(ApiResponse::success(task)))
}

async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((id, task_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if !state.db.delete_task(&user.uid, id, task_id)? {
        return Err(ApiError::not_found("task"));
    }
    Ok(Json(ApiResponse::message("task deleted")))
}

async fn reorder_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ReorderTasksInput>,
) -> Result<Json<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = state
        .db
        .reorder_tasks(&user.uid, id, &input.task_ids)?
        .ok_or_else(|| ApiError::not_found("sprint"))?;
    Ok(Json(ApiResponse::success(tasks)))
}

async fn list_milestones(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<Milestone>>>, ApiError> {
    let milestones = state
        .db
        .list_milestones(&user.uid, id)?
        .ok_or_else(|| ApiError::not_found("sprint"))?;
    Ok(Json(ApiResponse::success(milestones)))
}

async fn create_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<CreateMilestoneInput>,
) -> Result<(StatusCode, Json<ApiResponse<Milestone>>), ApiError> {
    let milestone = state
        .db
        .create_milestone(&user.uid, id, input)?
        .ok_or_else(|| ApiError::not_found("sprint"))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(milestone))))
}

async fn update_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((id, milestone_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(input): ApiJson<UpdateMilestoneInput>,
) -> Result<Json<ApiResponse<Milestone>>, ApiError> {
    let milestone = state
        .db
        .update_milestone(&user.uid, id, milestone_id, input)?
        .ok_or_else(|| ApiError::not_found("milestone"))?;
    Ok(Json(ApiResponse::success(milestone)))
}

async fn complete_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((id, milestone_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<Milestone>>, ApiError> {
    let milestone = state
        .db
        .set_milestone_completed(&user.uid, id, milestone_id, true)?
        .ok_or_else(|| ApiError::not_found("milestone"))?;
    Ok(Json(ApiResponse::success(milestone).with_message("milestone completed")))
}

async fn delete_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath((id, milestone_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if !state.db.delete_milestone(&user.uid, id, milestone_id)? {
        return Err(ApiError::not_found("milestone"));
    }
    Ok(Json(ApiResponse::message("milestone deleted")))
}
