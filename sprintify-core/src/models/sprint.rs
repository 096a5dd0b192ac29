use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::milestone::{CreateMilestoneInput, Milestone};
use super::task::{CreateTaskInput, Task};

pub const SPRINT_TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub goal: Option<String>,
    pub status: SprintStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub stats: SprintStats,
    pub ai_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Draft,
    Active,
    Completed,
    Paused,
    Cancelled,
}

impl SprintStatus {
    pub const ALL: [SprintStatus; 5] = [
        Self::Draft,
        Self::Active,
        Self::Completed,
        Self::Paused,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "paused" => Some(Self::Paused),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Draft, active and paused sprints count against the open-sprint cap.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Draft | Self::Active | Self::Paused)
    }

    pub fn can_transition_to(&self, next: SprintStatus) -> bool {
        use SprintStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Draft, Active)
                | (Draft, Cancelled)
                | (Active, Paused)
                | (Active, Completed)
                | (Active, Cancelled)
                | (Paused, Active)
                | (Paused, Completed)
                | (Paused, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SprintStats {
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub total_milestones: u32,
    pub completed_milestones: u32,
    /// Percentage of completed tasks, 0..=100.
    pub progress: u8,
}

impl SprintStats {
    pub fn compute(
        total_tasks: u32,
        completed_tasks: u32,
        total_milestones: u32,
        completed_milestones: u32,
    ) -> Self {
        let progress = if total_tasks == 0 {
            0
        } else {
            ((completed_tasks as u64 * 100) / total_tasks as u64).min(100) as u8
        };
        Self {
            total_tasks,
            completed_tasks,
            total_milestones,
            completed_milestones,
            progress,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSprintInput {
    pub title: String,
    pub description: Option<String>,
    pub goal: Option<String>,
    pub status: Option<SprintStatus>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub ai_generated: bool,
    #[serde(default)]
    pub tasks: Vec<CreateTaskInput>,
    #[serde(default)]
    pub milestones: Vec<CreateMilestoneInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSprintInput {
    pub title: Option<String>,
    /// `null` clears the field; leaving it out keeps the current value.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    pub goal: Option<Option<String>>,
    pub status: Option<SprintStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintDetail {
    #[serde(flatten)]
    pub sprint: Sprint,
    pub tasks: Vec<Task>,
    pub milestones: Vec<Milestone>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_do_not_reopen() {
        for next in SprintStatus::ALL {
            if next != SprintStatus::Completed {
                assert!(!SprintStatus::Completed.can_transition_to(next));
            }
            if next != SprintStatus::Cancelled {
                assert!(!SprintStatus::Cancelled.can_transition_to(next));
            }
        }
    }

    #[test]
    fn draft_cannot_pause() {
        assert!(!SprintStatus::Draft.can_transition_to(SprintStatus::Paused));
        assert!(SprintStatus::Draft.can_transition_to(SprintStatus::Active));
    }

    #[test]
    fn progress_rounds_down() {
        let stats = SprintStats::compute(3, 2, 0, 0);
        assert_eq!(stats.progress, 66);
        assert_eq!(SprintStats::compute(0, 0, 1, 1).progress, 0);
    }
}
