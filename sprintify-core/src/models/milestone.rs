use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MILESTONE_TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: Uuid,
    pub sprint_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub target_date: Option<NaiveDate>,
    /// Completion criteria, free text.
    pub criteria: Vec<String>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMilestoneInput {
    pub title: String,
    pub description: Option<String>,
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMilestoneInput {
    pub title: Option<String>,
    /// `null` clears the field; leaving it out keeps the current value.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    pub target_date: Option<Option<NaiveDate>>,
    pub criteria: Option<Vec<String>>,
    pub completed: Option<bool>,
}
