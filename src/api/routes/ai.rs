use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sprintify_core::models::{AiUsage, CreateNotificationInput, NotificationKind, Role, Sprint};
use sprintify_core::db::validate_new_sprint;
use sprintify_core::quota::{self, QuotaStatus};

use super::sprints::ensure_sprint_capacity;
use crate::ai::{generate_plan, GeneratedPlan, PlanRequest, MAX_DURATION_DAYS};
use crate::api::auth::AuthUser;
use crate::api::{rate_limit, ApiError, ApiJson, ApiResponse, AppState};

const MAX_GOAL_CHARS: usize = 500;
const MAX_CONTEXT_CHARS: usize = 2000;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/generate-plan", post(generate))
        .route("/usage", get(usage))
        .route_layer(middleware::from_fn_with_state(
            state,
            rate_limit::limit_ai_requests,
        ))
}

#[derive(Debug, Deserialize)]
pub struct GeneratePlanRequest {
    pub goal: String,
    pub duration_days: u32,
    pub context: Option<String>,
    /// Defaults to today (UTC).
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Serialize)]
pub struct GeneratePlanResponse {
    pub plan: GeneratedPlan,
    pub sprint: Option<Sprint>,
    pub usage: QuotaStatus,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub role: Role,
    pub usage: AiUsage,
    pub quota: QuotaStatus,
}

impl GeneratePlanRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let goal = self.goal.trim();
        if goal.is_empty() {
            return Err(ApiError::BadRequest("goal must not be empty".into()));
        }
        if goal.chars().count() > MAX_GOAL_CHARS {
            return Err(ApiError::BadRequest(format!(
                "goal must be at most {MAX_GOAL_CHARS} characters"
            )));
        }
        if !(1..=MAX_DURATION_DAYS).contains(&self.duration_days) {
            return Err(ApiError::BadRequest(format!(
                "duration_days must be between 1 and {MAX_DURATION_DAYS}"
            )));
        }
        if self
            .context
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_CONTEXT_CHARS)
        {
            return Err(ApiError::BadRequest(format!(
                "context must be at most {MAX_CONTEXT_CHARS} characters"
            )));
        }
        Ok(())
    }
}

async fn generate(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<GeneratePlanRequest>,
) -> Result<Json<ApiResponse<GeneratePlanResponse>>, ApiError> {
    request.validate()?;
    let limits = state.quota_policy().limits_for(user.role);
    state.db.check_ai_quota(&user.uid, limits, Utc::now())?;
    if request.save {
        ensure_sprint_capacity(&state, &user)?;
    }

    let plan_request = PlanRequest {
        goal: request.goal.trim().to_string(),
        duration_days: request.duration_days,
        context: request.context,
        start_date: request.start_date.unwrap_or_else(|| Utc::now().date_naive()),
    };
    let plan = generate_plan(state.ai.as_ref(), &plan_request).await?;

    // Anything that would stop the save must fail before the call is counted.
    let sprint_input = if request.save {
        let title = state.db.unique_sprint_title(&user.uid, &plan.title)?;
        let input = plan.clone().into_sprint_input(title);
        validate_new_sprint(&input)?;
        Some(input)
    } else {
        None
    };

    let usage = state.db.record_ai_usage(&user.uid, limits, Utc::now())?;
    tracing::info!(
        user = %user.uid,
        tasks = plan.tasks.len(),
        milestones = plan.milestones.len(),
        "AI plan generated"
    );

    let sprint = if let Some(input) = sprint_input {
        let sprint = state.db.create_sprint(&user.uid, input)?;
        let notification = state.db.create_notification(
            CreateNotificationInput::new(
                &user.uid,
                NotificationKind::Ai,
                "AI plan ready",
                format!(
                    "\"{}\" was drafted with {} tasks.",
                    sprint.title, sprint.stats.total_tasks
                ),
            )
            .with_link(format!("/sprints/{}", sprint.id)),
        )?;
        state.notify(notification);
        Some(sprint)
    } else {
        None
    };

    Ok(Json(ApiResponse::success(GeneratePlanResponse {
        plan,
        sprint,
        usage,
    })))
}

async fn usage(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<UsageResponse>>, ApiError> {
    let usage = state.db.get_ai_usage(&user.uid, Utc::now())?;
    let limits = state.quota_policy().limits_for(user.role);
    Ok(Json(ApiResponse::success(UsageResponse {
        role: user.role,
        quota: quota::status(&usage, limits),
        usage,
    })))
}
