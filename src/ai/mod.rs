//! AI-assisted sprint planning.

mod gemini;
mod plan;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;

pub use gemini::{GeminiClient, GeminiError};
pub use plan::{
    build_plan_prompt, parse_plan, GeneratedPlan, PlanRequest, PlannedMilestone, PlannedTask,
    MAX_DURATION_DAYS, MAX_PLAN_MILESTONES, MAX_PLAN_TASKS,
};

/// Text-completion backend used to draft plans.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GeminiError>;
}

/// Stand-in used when no API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl PlanGenerator for Unconfigured {
    async fn complete(&self, _prompt: &str) -> Result<String, GeminiError> {
        Err(GeminiError::NotConfigured)
    }
}

/// Gemini when an API key is configured, otherwise [`Unconfigured`].
pub fn plan_generator(config: &Config) -> Arc<dyn PlanGenerator> {
    let Some(key) = config.gemini_api_key.as_deref() else {
        return Arc::new(Unconfigured);
    };
    match GeminiClient::new(key, &config.gemini_model, &config.gemini_base_url) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "Gemini client unavailable, AI planning disabled");
            Arc::new(Unconfigured)
        }
    }
}

pub async fn generate_plan(
    generator: &dyn PlanGenerator,
    request: &PlanRequest,
) -> Result<GeneratedPlan, GeminiError> {
    let prompt = build_plan_prompt(&request.goal, request.duration_days, request.context.as_deref());
    let text = generator.complete(&prompt).await?;
    parse_plan(&text, request)
}
